pub mod evidence;
pub mod guard;
pub mod persistence;
pub mod retry;
pub mod submitter;
pub mod types;
