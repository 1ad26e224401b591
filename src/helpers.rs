//! Shortcuts for leaving a handler early.
//!
//! Each helper returns the [`Signal`] to propagate, e.g.
//! `return Err(redirect(res, "/login"));`.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::body::Body;
use crate::error::{HttpError, Signal};
use crate::response::Response;
use crate::utils::mime::guess_content_type;

/// Content type used when the extension is not recognised.
pub const FALLBACK_MIMETYPE: &str = "text/plain";

/// Aborts the handler and renders the error page for `status`.
pub fn abort(status: u16, text: impl Into<String>) -> Signal {
    Signal::Http(HttpError::new(status, text))
}

/// Temporary (307) redirect to `url`.
pub fn redirect(response: &mut Response, url: &str) -> Signal {
    redirect_with(response, url, 307)
}

pub fn redirect_with(response: &mut Response, url: &str, status: u16) -> Signal {
    response.set_status(status);
    response.set_header("Location", url);
    Signal::Shortcut(Body::Empty)
}

/// Serves `filename` from inside `root`, guessing the content type.
pub fn static_file(response: &mut Response, filename: &str, root: impl AsRef<Path>) -> Signal {
    serve(response, filename, root.as_ref(), None)
}

/// Like [`static_file`] but with a fixed content type.
pub fn static_file_as(
    response: &mut Response,
    filename: &str,
    root: impl AsRef<Path>,
    mimetype: &str,
) -> Signal {
    serve(response, filename, root.as_ref(), Some(mimetype))
}

fn serve(response: &mut Response, filename: &str, root: &Path, mimetype: Option<&str>) -> Signal {
    match open_static(response, filename, root, mimetype) {
        Ok(file) => Signal::Shortcut(Body::from(file)),
        Err(signal) => signal,
    }
}

fn open_static(
    response: &mut Response,
    filename: &str,
    root: &Path,
    mimetype: Option<&str>,
) -> Result<File, Signal> {
    let root = normalize(&std::path::absolute(root)?);
    let path = normalize(&root.join(filename.trim_matches('/')));

    if path == root || !path.starts_with(&root) {
        return Err(abort(401, "Access denied."));
    }
    let metadata = match fs::metadata(&path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Err(abort(404, "File does not exist.")),
    };
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(abort(401, "You do not have permission to access this file."));
        }
        Err(e) => return Err(e.into()),
    };

    let content_type = mimetype
        .or_else(|| guess_content_type(&path))
        .unwrap_or(FALLBACK_MIMETYPE);
    response.set_content_type(content_type);
    response.set_header("Content-Length", &metadata.len().to_string());
    if let Ok(modified) = metadata.modified() {
        response.set_header("Last-Modified", &last_modified(modified));
    }
    debug!(path = %path.display(), content_type, "serving static file");
    Ok(file)
}

/// `Wed, 15 Nov 1995 04:58:08 +0000`
pub fn last_modified(time: SystemTime) -> String {
    let date = httpdate::fmt_http_date(time);
    match date.strip_suffix("GMT") {
        Some(prefix) => format!("{}+0000", prefix),
        None => date,
    }
}

/// Resolves `.` and `..` lexically, without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                out.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
        }
    }
    out
}
