//! Error types for stockwatch.
//!
//! All errors are strongly typed using thiserror. Errors local to one source
//! or one notification channel never abort a whole round; only a config
//! failure at startup halts the process.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading settings or the monitored source list.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    Missing {
        path: PathBuf,
    },

    #[error("Failed to read config file {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
    },

    #[error("Config file {path} is malformed: {message}")]
    Malformed {
        path: PathBuf,
        message: String,
    },

    #[error("'monitor_urls' in {path} must be a non-empty list")]
    EmptySourceList {
        path: PathBuf,
    },

    #[error("Invalid source '{source_url}': {reason}")]
    InvalidSource {
        source_url: String,
        reason: String,
    },

    #[error("Invalid setting '{name}': {reason}")]
    InvalidSetting {
        name: &'static str,
        reason: String,
    },
}

/// Errors raised while fetching a product page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout {
        url: String,
    },

    #[error("Network error for {url}: {message}")]
    Network {
        url: String,
        message: String,
    },

    #[error("Server error for {url} (status {status})")]
    ServerError {
        url: String,
        status: u16,
    },

    #[error("Failed to read body of {url}: {message}")]
    Body {
        url: String,
        message: String,
    },
}

impl FetchError {
    /// Returns true if another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } | Self::ServerError { .. } => true,
            Self::Body { .. } => false,
        }
    }
}

/// Failure to deliver a new message to a notification channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendFailure {
    #[error("Send timed out")]
    Timeout,

    #[error("Send rejected: {reason}")]
    Rejected {
        reason: String,
    },

    #[error("Transport failure: {message}")]
    Transport {
        message: String,
    },
}

impl SendFailure {
    /// Only timeouts are retried; rejections will not change on retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Errors from the durable product store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The mapping could not be serialized; the durable file is untouched.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Writing or renaming the state file failed.
    #[error("I/O error on {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
    },

    /// Another process holds the state file lock.
    #[error("State file is locked: {0}")]
    Locked(String),

    #[error("Poisoned lock: {0}")]
    Poisoned(&'static str),
}

/// Top-level error type for stockwatch.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Notification error: {0}")]
    Notification(#[from] SendFailure),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl MonitorError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a config error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_retryable(),
            Self::Notification(e) => e.is_retryable(),
            Self::Config(_) | Self::Storage(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for stockwatch operations.
pub type MonitorResult<T> = Result<T, MonitorError>;
