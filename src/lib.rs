//! A small request dispatcher in the WSGI mould.
//!
//! An [`Application`] holds the route table and the error-handler registry.
//! Each call to [`Application::call`] takes one [`Environ`], matches it
//! against the registered routes, runs the handler with the per-request
//! [`Request`] and [`Response`], and returns the status line, headers and a
//! chunk iterator for the body.

pub mod app;
pub mod body;
pub mod config;
pub mod environ;
pub mod error;
pub mod errors;
pub mod helpers;
pub mod pattern;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod status;
pub mod utils;
pub mod validate;

pub use app::Application;
pub use body::{Body, FileWrapper, ResponseBody};
pub use config::{Config, ServerConfig, load_config};
pub use environ::Environ;
pub use error::{Fault, HandlerResult, HttpError, PatternError, Signal};
pub use helpers::{abort, redirect, redirect_with, static_file, static_file_as};
pub use pattern::RouteKind;
pub use request::Request;
pub use response::Response;
pub use router::{Params, Route};
pub use server::Server;
pub use utils::{Cookie, HttpMethod, SameSite};
pub use validate::Validator;
