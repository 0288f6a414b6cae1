pub mod engine;
pub mod gate;
pub mod gemini;
pub mod prompt;
pub mod types;
