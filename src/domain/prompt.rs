use serde::{Deserialize, Serialize};
use validator::Validate;

/// Inbound chat message as posted by the messaging transport.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InboundMessage {
    #[serde(default)]
    #[validate(length(min = 1, max = 32))]
    pub phone: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 4096))]
    pub text: String,
}

impl InboundMessage {
    pub fn new(phone: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            text: text.into(),
        }
    }
}
