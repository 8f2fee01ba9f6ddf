pub mod allowlist_validator;
pub mod gateway;
pub mod intent_matcher;
pub mod localization;
pub mod prompt_builder;
pub mod rate_limiter;
pub mod response_cache;
