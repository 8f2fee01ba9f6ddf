pub mod error;
pub mod language;
pub mod llm_config;
pub mod prompt;
pub mod query;
pub mod schema;
