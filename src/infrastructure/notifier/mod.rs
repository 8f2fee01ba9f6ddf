pub mod whatsapp;

use crate::domain::error::Result;
use async_trait::async_trait;
use tracing::info;

pub use whatsapp::{WhatsAppConfig, WhatsAppNotifier};

/// Delivers a text reply back to the requester.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<()>;
}

/// Writes replies to the log instead of sending them.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        info!(to = %to, chars = body.chars().count(), "Reply (delivery disabled): {}", body);
        Ok(())
    }
}
