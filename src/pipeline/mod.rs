pub mod dispatcher;
pub mod handler;
