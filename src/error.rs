//! Error types for media-dl
//!
//! This module provides the error taxonomy shared by every stage of the engine:
//! - Resolution errors raised while expanding item references through the catalog
//! - Per-attempt errors raised by sessions and media streams (metadata, stream, connectivity)
//! - Post-processing errors (convert, tag, thumbnail, lyrics) which never fail a job
//! - Local errors (I/O, templates, configuration) which fail an attempt outright

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
///
/// Session and catalog implementations report failures through these variants so the
/// worker can decide between retrying, re-authenticating and giving up.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "chunk_size")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catalog lookup failed while resolving an item reference
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Metadata for a media item could not be fetched
    #[error("metadata error for {media_id}: {reason}")]
    Metadata {
        /// The media id whose metadata fetch failed
        media_id: String,
        /// The reason reported by the session
        reason: String,
    },

    /// DNS resolution or connection failure talking to the remote service
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// A network operation timed out
    #[error("timed out: {0}")]
    Timeout(String),

    /// The transport delivered data it could not decode
    #[error("decode error: {0}")]
    Decode(String),

    /// No session is registered under the given uuid
    #[error("session {0} not found")]
    SessionNotFound(String),

    /// Re-authenticating a session did not finish in time
    #[error("re-authentication of session {session} timed out after {seconds}s")]
    ReauthTimeout {
        /// The session uuid that was being re-authenticated
        session: String,
        /// The timeout that elapsed, in seconds
        seconds: u64,
    },

    /// A path template could not be rendered
    #[error("template error in \"{template}\": {reason}")]
    Template {
        /// The template text
        template: String,
        /// What went wrong (e.g., unknown field name)
        reason: String,
    },

    /// A string could not be classified as an item reference
    #[error("unknown item reference: {0}")]
    UnknownReference(String),

    /// Post-processing error (convert, tag, thumbnail, lyrics)
    #[error("post-processing error: {0}")]
    PostProcess(#[from] PostProcessError),

    /// External tool execution failed (ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Whether this error means the remote service is unreachable
    ///
    /// Connectivity failures trigger session re-authentication instead of a plain retry.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Error::Connectivity(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

/// Post-processing errors
///
/// These are reported through events but never fail the job: the downloaded bytes stay on disk.
#[derive(Debug, Error)]
pub enum PostProcessError {
    /// Transcoding the raw container failed
    #[error("conversion of {path} failed: {reason}")]
    ConversionFailed {
        /// The raw file that could not be converted
        path: PathBuf,
        /// The reason conversion failed
        reason: String,
    },

    /// Writing tags failed
    #[error("writing metadata to {path} failed: {reason}")]
    TaggingFailed {
        /// The file that could not be tagged
        path: PathBuf,
        /// The reason tagging failed
        reason: String,
    },

    /// Attaching cover art failed
    #[error("setting thumbnail on {path} failed: {reason}")]
    ThumbnailFailed {
        /// The file that could not receive cover art
        path: PathBuf,
        /// The reason the thumbnail could not be set
        reason: String,
    },

    /// Fetching, writing or embedding lyrics failed
    #[error("lyrics for {media_id} failed: {reason}")]
    LyricsFailed {
        /// The media id whose lyrics failed
        media_id: String,
        /// The reason the lyrics stage failed
        reason: String,
    },
}
