//! Text codec for object preferences

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Turns objects into text for storage and back
pub trait PrefCodec: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String>;

    /// Fails on malformed text
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T>;
}

/// JSON codec backed by `serde_json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PrefCodec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String> {
        serde_json::to_string(value).context("Failed to encode object as JSON")
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        serde_json::from_str(text).context("Failed to decode object from JSON")
    }
}
