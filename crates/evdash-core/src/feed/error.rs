//! Feed errors

use thiserror::Error;

/// Errors that can occur while setting up or running a feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported broker scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected to broker")]
    NotConnected,

    #[error("Subscription to '{topic}' failed: {message}")]
    SubscribeFailed { topic: String, message: String },
}
