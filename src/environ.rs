//! The per-request environment handed to the dispatcher.
//!
//! Mirrors the WSGI contract: a string-keyed map of CGI variables
//! (`REQUEST_METHOD`, `PATH_INFO`, `QUERY_STRING`, `CONTENT_LENGTH`,
//! `HTTP_*`, ...) plus the input stream, the error stream and an optional
//! file-wrapper hint.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};

use crate::body::FileWrapper;

pub struct Environ {
    pub vars: HashMap<String, String>,
    /// `wsgi.input`
    pub input: Box<dyn Read + Send>,
    /// `wsgi.errors`
    pub errors: Box<dyn Write + Send>,
    /// `wsgi.file_wrapper`
    pub file_wrapper: Option<FileWrapper>,
}

impl Environ {
    /// An empty environment with no input and a discarding error stream.
    pub fn new() -> Self {
        Environ {
            vars: HashMap::new(),
            input: Box::new(io::empty()),
            errors: Box::new(io::sink()),
            file_wrapper: None,
        }
    }

    /// A `GET` environment for `path`, split at `?` into `PATH_INFO` and
    /// `QUERY_STRING`.
    pub fn get(target: &str) -> Self {
        Environ::new().method("GET").target(target)
    }

    pub fn var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn method(self, method: &str) -> Self {
        self.var("REQUEST_METHOD", method)
    }

    pub fn target(self, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        self.var("PATH_INFO", path).var("QUERY_STRING", query)
    }

    /// Adds a request header as its `HTTP_*` variable.
    pub fn header(self, name: &str, value: &str) -> Self {
        let key = header_key(name);
        self.var(&key, value)
    }

    pub fn cookie(self, cookie: &str) -> Self {
        self.var("HTTP_COOKIE", cookie)
    }

    /// Sets `wsgi.input`, `CONTENT_LENGTH` and `CONTENT_TYPE`.
    pub fn body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.vars
            .insert("CONTENT_LENGTH".to_string(), body.len().to_string());
        self.vars
            .insert("CONTENT_TYPE".to_string(), content_type.to_string());
        self.input = Box::new(io::Cursor::new(body));
        self
    }

    pub fn input(mut self, input: impl Read + Send + 'static) -> Self {
        self.input = Box::new(input);
        self
    }

    pub fn errors(mut self, errors: impl Write + Send + 'static) -> Self {
        self.errors = Box::new(errors);
        self
    }

    pub fn file_wrapper(mut self, wrapper: FileWrapper) -> Self {
        self.file_wrapper = Some(wrapper);
        self
    }

    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

impl Default for Environ {
    fn default() -> Self {
        Environ::new()
    }
}

impl fmt::Debug for Environ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environ")
            .field("vars", &self.vars)
            .field("file_wrapper", &self.file_wrapper.is_some())
            .finish_non_exhaustive()
    }
}

/// `Content-Type` -> `CONTENT_TYPE`, `X-Token` -> `HTTP_X_TOKEN`.
pub fn header_key(name: &str) -> String {
    let key = name.trim().to_ascii_uppercase().replace('-', "_");
    match key.as_str() {
        "CONTENT_TYPE" | "CONTENT_LENGTH" => key,
        _ => format!("HTTP_{}", key),
    }
}
