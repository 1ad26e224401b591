//! The application object: route registration and the WSGI-style entry point.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::body::{Body, ResponseBody};
use crate::config::Config;
use crate::environ::Environ;
use crate::error::{Fault, HandlerResult, HttpError, PatternError, Signal};
use crate::errors::{DOUBLE_FAULT, ErrorHandler, ErrorRegistry, default_error_page};
use crate::pattern::RouteKind;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Handler, Params, Route, Router};
use crate::status::status_line;

/// Route table, error registry and dispatcher in one.
///
/// Registration methods take `&self`, so an `Arc<Application>` can be shared
/// with the server while routes are still being added at startup.
pub struct Application {
    router: Router,
    errors: ErrorRegistry,
    debug: AtomicBool,
}

impl Application {
    pub fn new() -> Self {
        Application {
            router: Router::new(),
            errors: ErrorRegistry::new(),
            debug: AtomicBool::new(false),
        }
    }

    /// Applies `debug`, `optimize_routes` and `error_pages` from `config`.
    pub fn from_config(config: &Config) -> Self {
        let app = Application::new();
        app.set_debug(config.debug);
        app.set_optimize(config.optimize_routes);
        for (status, path) in &config.error_pages {
            app.error_page(*status, path);
        }
        app
    }

    /// Debug mode puts error details into 500 pages.
    pub fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::Relaxed);
    }

    pub fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Lets frequently hit regex routes drift towards the front of the scan.
    pub fn set_optimize(&self, enabled: bool) {
        self.router.set_optimize(enabled);
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Registers a `GET` route.
    pub fn route<F>(&self, pattern: &str, handler: F) -> Result<Arc<Route>, PatternError>
    where
        F: Fn(&Request, &mut Response, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route("GET", pattern, handler, RouteKind::Auto)
    }

    pub fn get<F>(&self, pattern: &str, handler: F) -> Result<Arc<Route>, PatternError>
    where
        F: Fn(&Request, &mut Response, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route("GET", pattern, handler, RouteKind::Auto)
    }

    pub fn post<F>(&self, pattern: &str, handler: F) -> Result<Arc<Route>, PatternError>
    where
        F: Fn(&Request, &mut Response, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route("POST", pattern, handler, RouteKind::Auto)
    }

    pub fn put<F>(&self, pattern: &str, handler: F) -> Result<Arc<Route>, PatternError>
    where
        F: Fn(&Request, &mut Response, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route("PUT", pattern, handler, RouteKind::Auto)
    }

    pub fn delete<F>(&self, pattern: &str, handler: F) -> Result<Arc<Route>, PatternError>
    where
        F: Fn(&Request, &mut Response, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route("DELETE", pattern, handler, RouteKind::Auto)
    }

    pub fn add_route<F>(
        &self,
        method: &str,
        pattern: &str,
        handler: F,
        kind: RouteKind,
    ) -> Result<Arc<Route>, PatternError>
    where
        F: Fn(&Request, &mut Response, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.router.add(method, pattern, handler, kind)
    }

    /// Registers the handler rendering `status` errors.
    pub fn error_handler<F>(&self, status: u16, handler: F)
    where
        F: Fn(&Request, &mut Response, &Fault) -> HandlerResult + Send + Sync + 'static,
    {
        let handler: ErrorHandler = Arc::new(handler);
        self.errors.set(status, handler);
    }

    pub fn remove_error_handler(&self, status: u16) -> bool {
        self.errors.remove(status).is_some()
    }

    /// Serves the file at `path` for `status` errors, or the built-in page if
    /// it cannot be read.
    pub fn error_page(&self, status: u16, path: impl Into<PathBuf>) {
        let path = path.into();
        let debug = self.debug();
        self.error_handler(status, move |request, response, fault| {
            match fs::read(&path) {
                Ok(content) => {
                    response.set_content_type("text/html");
                    Ok(Body::from(content))
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "error page unreadable");
                    Ok(default_error_page(request, fault, debug))
                }
            }
        });
    }

    /// Handles one request.
    ///
    /// `start_response` is called exactly once, with the final status line
    /// and header list, before the body is returned. Nothing raised by a
    /// handler escapes this call.
    pub fn call<S>(&self, environ: Environ, start_response: S) -> ResponseBody
    where
        S: FnOnce(&str, &[(String, String)]),
    {
        let request = Request::new(environ);
        let mut response = Response::new();

        let span = tracing::debug_span!(
            "dispatch",
            request_id = %Uuid::new_v4(),
            method = %request.method(),
            path = request.path(),
        );
        let _entered = span.enter();

        let body = self.handle(&request, &mut response);

        if !response.headers().contains("Content-Length") {
            if let Some(len) = body.len() {
                response.set_header("Content-Length", &len.to_string());
            }
        }
        let status = status_line(response.status());
        debug!(status = %status, "response ready");

        let body = body.into_response_body(request.file_wrapper());
        let headers = response.into_header_list();
        start_response(&status, &headers);
        body
    }

    fn handle(&self, request: &Request, response: &mut Response) -> Body {
        let outcome = match self.router.route(request.path(), request.method()) {
            Some(found) => {
                let handler = Arc::clone(found.route.handler());
                let params = found.params;
                run_guarded(|| handler(request, response, &params))
            }
            None => Err(Signal::Http(HttpError::new(404, "Not found"))),
        };

        match outcome {
            Ok(body) | Err(Signal::Shortcut(body)) => body,
            Err(Signal::Http(e)) => self.render_fault(request, response, Fault::Http(e)),
            Err(Signal::Internal(e)) => self.render_fault(request, response, Fault::Internal(e)),
        }
    }

    fn render_fault(&self, request: &Request, response: &mut Response, fault: Fault) -> Body {
        let status = fault.status();
        response.set_status(status);
        if status == 500 {
            error!(path = request.path(), error = %fault, "internal server error");
            request.log_error(&format!("Error (500) on '{}': {}", request.path(), fault));
        }

        let Some(handler) = self.errors.get(status) else {
            return default_error_page(request, &fault, self.debug());
        };
        match run_guarded(|| handler(request, response, &fault)) {
            Ok(body) | Err(Signal::Shortcut(body)) => body,
            Err(signal) => {
                warn!(status, error = %signal, "error handler failed");
                response.set_status(status);
                Body::from(DOUBLE_FAULT)
            }
        }
    }
}

impl Default for Application {
    fn default() -> Self {
        Application::new()
    }
}

/// Runs a handler, turning a panic into an internal error.
fn run_guarded<F>(f: F) -> HandlerResult
where
    F: FnOnce() -> HandlerResult,
{
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = panic_message(&*payload);
        Err(Signal::Internal(anyhow::anyhow!("handler panicked: {}", message)))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_and_body(app: &Application, path: &str) -> (String, Vec<u8>) {
        let mut status = String::new();
        let body = app.call(Environ::get(path), |s, _| status = s.to_string());
        (status, body.into_bytes().unwrap())
    }

    #[test]
    fn config_wires_error_pages_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("404.html");
        fs::write(&page, "<h1>lost</h1>").unwrap();

        let mut config = Config::default();
        config.debug = true;
        config.optimize_routes = true;
        config.error_pages.insert(404, page.display().to_string());
        config.error_pages.insert(403, dir.path().join("gone.html").display().to_string());

        let app = Application::from_config(&config);
        assert!(app.debug());
        assert!(app.router().optimize());

        let (status, body) = status_and_body(&app, "/nowhere");
        assert_eq!(status, "404 NOT FOUND");
        assert_eq!(body, b"<h1>lost</h1>");

        app.route("/deny", |_, _, _| Err(crate::helpers::abort(403, "nope")))
            .unwrap();
        let (status, body) = status_and_body(&app, "/deny");
        assert_eq!(status, "403 FORBIDDEN");
        assert!(String::from_utf8(body).unwrap().contains("Error 403: FORBIDDEN"));
    }

    #[test]
    fn panic_message_extracts_strings() {
        let result = run_guarded(|| panic!("with {}", "format"));
        match result {
            Err(Signal::Internal(e)) => assert_eq!(e.to_string(), "handler panicked: with format"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
