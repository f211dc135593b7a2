//! The module contains the errors the engine can return.
//!
//! The errors are:
//!
//! - [`Transport`] when the HTTP collaborator could not complete a request.
//! - [`MalformedPayload`] when the server answered with an unexpected shape.
//! - [`Validation`] when an entry draft fails client-side validation.
//!
//!  [`Transport`]: EngineError::Transport
//!  [`MalformedPayload`]: EngineError::MalformedPayload
//!  [`Validation`]: EngineError::Validation
use thiserror::Error;

use crate::{transport::TransportError, validation::ValidationErrors};

/// Engine custom errors.
#[derive(Error, Debug, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
}

impl From<ValidationErrors> for EngineError {
    fn from(value: ValidationErrors) -> Self {
        Self::Validation(value)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(value: serde_json::Error) -> Self {
        Self::MalformedPayload(value.to_string())
    }
}
