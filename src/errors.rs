//! Error registry: status code -> handler, with built-in pages as fallback.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::body::Body;
use crate::error::{Fault, HandlerResult};
use crate::request::Request;
use crate::response::Response;
use crate::status::reason_phrase;

pub type ErrorHandler = Arc<dyn Fn(&Request, &mut Response, &Fault) -> HandlerResult + Send + Sync>;

/// Body emitted when an error handler fails itself.
pub const DOUBLE_FAULT: &str = "Exception within error handler!";

#[derive(Default)]
pub struct ErrorRegistry {
    handlers: RwLock<HashMap<u16, ErrorHandler>>,
}

impl ErrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, status: u16, handler: ErrorHandler) {
        self.handlers.write().insert(status, handler);
    }

    pub fn get(&self, status: u16) -> Option<ErrorHandler> {
        self.handlers.read().get(&status).cloned()
    }

    pub fn remove(&self, status: u16) -> Option<ErrorHandler> {
        self.handlers.write().remove(&status)
    }

    pub fn contains(&self, status: u16) -> bool {
        self.handlers.read().contains_key(&status)
    }
}

/// Built-in page used when no handler is registered for a status.
pub fn default_error_page(request: &Request, fault: &Fault, debug: bool) -> Body {
    let status = fault.status();
    if status == 500 {
        return internal_error_page(fault, debug);
    }

    let reason = reason_phrase(status);
    Body::from(format!(
        "<!DOCTYPE HTML PUBLIC \"-//IETF//DTD HTML 2.0//EN\">\n\
         <html><head><title>Error {status}: {reason}</title></head>\n\
         <body><h1>Error {status}: {reason}</h1>\n\
         <p>Sorry, the requested URL {path} caused an error:</p>\n\
         <pre>{text}</pre>\n\
         </body></html>\n",
        path = escape_html(request.path()),
        text = escape_html(&fault.text()),
    ))
}

/// Generic 500 body; in debug mode the full error chain replaces it.
pub fn internal_error_page(fault: &Fault, debug: bool) -> Body {
    if debug {
        let detail = match fault {
            Fault::Internal(e) => format!("{:?}", e),
            Fault::Http(e) => e.to_string(),
        };
        Body::from(format!(
            "<h1>Error: Internal server error.</h1>\n<pre>{}</pre>\n",
            escape_html(&detail)
        ))
    } else {
        Body::from("Error: Internal server error.")
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}
