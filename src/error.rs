//! Error and control-flow types.
//!
//! Handlers return [`HandlerResult`]. `Err` carries a [`Signal`] that the
//! dispatcher turns into a response: an [`HttpError`] is rendered through the
//! error registry, a `Shortcut` body is emitted as is, and anything else
//! becomes a 500.

use std::io;

use thiserror::Error;

use crate::body::Body;

pub type HandlerResult = Result<Body, Signal>;

/// Interrupts a handler with a status code and a message for the error page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}: {text}")]
pub struct HttpError {
    pub status: u16,
    pub text: String,
}

impl HttpError {
    pub fn new(status: u16, text: impl Into<String>) -> Self {
        HttpError {
            status,
            text: text.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Signal {
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Early return with a ready body. Not an error.
    #[error("shortcut ({0:?})")]
    Shortcut(Body),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Signal {
    pub fn shortcut(body: impl Into<Body>) -> Self {
        Signal::Shortcut(body.into())
    }

    pub fn internal<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Signal::Internal(anyhow::Error::new(error))
    }
}

impl From<io::Error> for Signal {
    fn from(error: io::Error) -> Self {
        Signal::internal(error)
    }
}

/// What an error handler is asked to render.
#[derive(Debug)]
pub enum Fault {
    Http(HttpError),
    Internal(anyhow::Error),
}

impl Fault {
    pub fn status(&self) -> u16 {
        match self {
            Fault::Http(e) => e.status,
            Fault::Internal(_) => 500,
        }
    }

    /// The `HttpError` text, or the error message for internal faults.
    pub fn text(&self) -> String {
        match self {
            Fault::Http(e) => e.text.clone(),
            Fault::Internal(e) => e.to_string(),
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fault::Http(e) => write!(f, "{}", e),
            Fault::Internal(e) => write!(f, "{:#}", e),
        }
    }
}

/// Raised at registration time when a route pattern cannot be compiled.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("capture `{name}` opens an inline regex with `{delimiter}` but never closes it")]
    UnbalancedDelimiter { name: String, delimiter: char },

    #[error("capture `{name}` has an empty inline regex")]
    EmptyRegex { name: String },

    #[error("capture name `{name}` is used twice")]
    DuplicateName { name: String },

    #[error("invalid route regex `{pattern}`: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
