pub mod contract;
pub mod listener;
pub mod scanner;
pub mod types;
