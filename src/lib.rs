use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Metadata source not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to parse metadata source {}: {message}", path.display())]
    Parse {
        path: PathBuf,
        message: String,
        line: Option<usize>,
        column: Option<usize>,
    },

    #[error("Search engine is not ready: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index storage error: {0}")]
    Index(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Caller-facing classification of a [`CatalogError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    ParseError,
    Unavailable,
    InternalError,
}

impl CatalogError {
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Parse { .. } => ErrorKind::ParseError,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            _ => ErrorKind::InternalError,
        }
    }
}

pub mod catalog;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod lifecycle;
pub mod mcp;
pub mod ranking;
pub mod service;
