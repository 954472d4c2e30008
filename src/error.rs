//! External service failure types

use thiserror::Error;

/// Failure talking to a geocoding or routing service
#[derive(Error, Debug)]
pub enum SourceError {
    /// Transport level failure: DNS, connect, timeout
    #[error("network failure: {0}")]
    Network(String),
    /// Service answered with a non success status
    #[error("service answered with status {0}")]
    Status(u16),
    /// Body did not match the expected shape
    #[error("unreadable response: {0}")]
    Decode(String),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return SourceError::Status(status.as_u16());
        }
        if e.is_decode() {
            return SourceError::Decode(e.to_string());
        }

        SourceError::Network(e.to_string())
    }
}
