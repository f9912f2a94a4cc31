use std::{fmt, io, path::StripPrefixError};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use tokio::task::JoinError;

#[cfg(feature = "service")]
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum CuratorError {
    #[error("Asset cache error: {0}")]
    Cache(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("Asset type handler error: {0}")]
    Handler(String),
    #[error("Invalid file name '{name}', try '{suggestion}' instead")]
    InvalidName { name: String, suggestion: String },
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("File is locked or temporarily unreadable: {0}")]
    Locked(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Curator service error: {0}")]
    Service(String),
}

impl CuratorError {
    /// Transient conditions are retried on the next scan rather than surfaced to the user.
    pub fn is_transient(&self) -> bool {
        matches!(self, CuratorError::Locked(_))
    }
}

impl From<StripPrefixError> for CuratorError {
    fn from(src: StripPrefixError) -> CuratorError {
        CuratorError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for CuratorError {
    fn from(src: toml::de::Error) -> CuratorError {
        CuratorError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for CuratorError {
    fn from(src: toml::ser::Error) -> CuratorError {
        CuratorError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<toml_edit::TomlError> for CuratorError {
    fn from(src: toml_edit::TomlError) -> CuratorError {
        CuratorError::Config(format!("Toml document error: {src}"))
    }
}

impl From<JsonError> for CuratorError {
    fn from(src: JsonError) -> CuratorError {
        CuratorError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<uuid::Error> for CuratorError {
    fn from(src: uuid::Error) -> CuratorError {
        CuratorError::Serialization(format!("UUID conversion failed: {src}"))
    }
}

impl From<io::Error> for CuratorError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => CuratorError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock => {
                CuratorError::Locked(format!("{x}"))
            }
            _ => CuratorError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<walkdir::Error> for CuratorError {
    fn from(x: walkdir::Error) -> Self {
        match x.into_io_error() {
            Some(io_err) => io_err.into(),
            None => CuratorError::Io("Directory walk hit a file system loop".to_string()),
        }
    }
}

impl From<fmt::Error> for CuratorError {
    fn from(x: fmt::Error) -> Self {
        CuratorError::Custom(format!("{x}"))
    }
}

impl From<RegexError> for CuratorError {
    fn from(x: RegexError) -> Self {
        CuratorError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<JoinError> for CuratorError {
    fn from(x: JoinError) -> Self {
        CuratorError::Service(format!("Background task failed to complete: {x}"))
    }
}

#[cfg(feature = "service")]
impl From<NotifyError> for CuratorError {
    fn from(x: NotifyError) -> Self {
        match x.kind {
            NotifyErrorKind::Io(io_err) => io_err.into(),
            NotifyErrorKind::PathNotFound => {
                CuratorError::NotFound(format!("Watch path not found: {:?}", x.paths))
            }
            NotifyErrorKind::WatchNotFound => {
                CuratorError::NotFound("Watch not found".to_string())
            }
            NotifyErrorKind::Generic(msg) => CuratorError::Service(msg),
            NotifyErrorKind::InvalidConfig(cfg) => {
                CuratorError::Config(format!("Invalid watcher configuration: {cfg:?}"))
            }
            NotifyErrorKind::MaxFilesWatch => {
                CuratorError::Service("Maximum number of watched files reached".to_string())
            }
        }
    }
}
