//! Error types for pageflow.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("factory failed to open page-frame cursor: {reason}")]
    FactoryOpenFailed { reason: String },

    #[error("reducer initialization failed: {reason}")]
    ReducerInitFailed { reason: String },

    #[error("unexpected error: {message}")]
    Unexpected { message: String },
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    pub fn factory_open_failed(reason: impl Into<String>) -> Self {
        Self::FactoryOpenFailed { reason: reason.into() }
    }

    pub fn reducer_init_failed(reason: impl Into<String>) -> Self {
        Self::ReducerInitFailed { reason: reason.into() }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected { message: message.into() }
    }
}
