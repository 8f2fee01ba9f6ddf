pub mod gemini;

use crate::domain::error::Result;
use async_trait::async_trait;

pub use gemini::GeminiClient;

/// Remote text generator turning a constrained prompt into raw (untrusted)
/// SQL text. Implementations fail fast and never retry.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}
