//! Hosted model integrations.

pub mod openai;

pub use openai::OpenAIService;
