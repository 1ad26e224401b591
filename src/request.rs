use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};

use once_cell::unsync::OnceCell;
use tracing::warn;

use crate::body::FileWrapper;
use crate::environ::{Environ, header_key};
use crate::utils::form::{self, FormDict, Upload};
use crate::utils::{Cookie, HttpMethod};

/// The request being dispatched, bound to one [`Environ`].
///
/// Owned by a single dispatch and handed to handlers by reference, so no
/// other request can observe it. Derived fields are parsed on first access
/// and cached.
pub struct Request {
    env: HashMap<String, String>,
    path: String,
    method: HttpMethod,
    input: RefCell<Option<Box<dyn Read + Send>>>,
    errors: RefCell<Box<dyn Write + Send>>,
    file_wrapper: Option<FileWrapper>,
    query: OnceCell<FormDict>,
    body: OnceCell<Vec<u8>>,
    form: OnceCell<(FormDict, Vec<Upload>)>,
    params: OnceCell<FormDict>,
    cookies: OnceCell<HashMap<String, String>>,
}

impl Request {
    pub fn new(environ: Environ) -> Self {
        let Environ {
            vars,
            input,
            errors,
            file_wrapper,
        } = environ;

        let path = vars.get("PATH_INFO").map(|p| p.trim()).unwrap_or("/");
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        let method = HttpMethod::parse(vars.get("REQUEST_METHOD").map(String::as_str).unwrap_or("GET"));

        Request {
            env: vars,
            path,
            method,
            input: RefCell::new(Some(input)),
            errors: RefCell::new(errors),
            file_wrapper,
            query: OnceCell::new(),
            body: OnceCell::new(),
            form: OnceCell::new(),
            params: OnceCell::new(),
            cookies: OnceCell::new(),
        }
    }

    /// `PATH_INFO`, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &HttpMethod {
        &self.method
    }

    pub fn query_string(&self) -> &str {
        self.env("QUERY_STRING").unwrap_or("")
    }

    /// `CONTENT_LENGTH`; absent or non-numeric means 0.
    pub fn content_length(&self) -> usize {
        self.env("CONTENT_LENGTH")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.env("CONTENT_TYPE")
    }

    /// A request header by name, read from its `HTTP_*` variable.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.env(&header_key(name))
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// The raw environment variables.
    pub fn raw_env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn query(&self) -> &FormDict {
        self.query.get_or_init(|| form::parse_query(self.query_string()))
    }

    /// The request body, `CONTENT_LENGTH` bytes of `wsgi.input`.
    pub fn body(&self) -> io::Result<&[u8]> {
        self.body
            .get_or_try_init(|| {
                let Some(input) = self.input.borrow_mut().take() else {
                    return Ok(Vec::new());
                };
                let length = self.content_length();
                let mut body = Vec::with_capacity(length.min(64 * 1024));
                input.take(length as u64).read_to_end(&mut body)?;
                Ok(body)
            })
            .map(Vec::as_slice)
    }

    /// Fields of an url-encoded or multipart body.
    pub fn form(&self) -> io::Result<&FormDict> {
        self.parsed_form().map(|(fields, _)| fields)
    }

    /// File parts of a multipart body.
    pub fn files(&self) -> io::Result<&[Upload]> {
        self.parsed_form().map(|(_, files)| files.as_slice())
    }

    fn parsed_form(&self) -> io::Result<&(FormDict, Vec<Upload>)> {
        self.form.get_or_try_init(|| {
            let body = self.body()?;
            let content_type = self.content_type().unwrap_or("");
            if content_type.starts_with("multipart/form-data") {
                match form::extract_boundary(content_type) {
                    Some(boundary) => Ok(form::parse_multipart(body, &boundary)),
                    None => {
                        warn!(path = %self.path, "multipart body without boundary");
                        Ok((FormDict::new(), Vec::new()))
                    }
                }
            } else {
                let text = String::from_utf8_lossy(body);
                Ok((form::parse_query(&text), Vec::new()))
            }
        })
    }

    /// Query parameters overlaid with form fields; the form wins.
    pub fn params(&self) -> io::Result<&FormDict> {
        self.params.get_or_try_init(|| {
            let mut params = self.query().clone();
            params.merge(self.form()?);
            Ok(params)
        })
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        self.cookies
            .get_or_init(|| Cookie::parse(self.env("HTTP_COOKIE").unwrap_or("")))
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name).map(String::as_str)
    }

    pub(crate) fn file_wrapper(&self) -> Option<&FileWrapper> {
        self.file_wrapper.as_ref()
    }

    /// Writes one line to `wsgi.errors`.
    pub(crate) fn log_error(&self, line: &str) {
        let mut errors = self.errors.borrow_mut();
        if let Err(e) = writeln!(errors, "{}", line).and_then(|_| errors.flush()) {
            warn!(error = %e, "cannot write to wsgi.errors");
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query_string", &self.query_string())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_normalised() {
        let req = Request::new(Environ::new().var("PATH_INFO", ""));
        assert_eq!(req.path(), "/");
        let req = Request::new(Environ::new().var("PATH_INFO", " hello/x "));
        assert_eq!(req.path(), "/hello/x");
        let req = Request::new(Environ::new());
        assert_eq!(req.path(), "/");
        assert_eq!(req.method(), &HttpMethod::GET);
    }

    #[test]
    fn content_length_defaults_to_zero() {
        let req = Request::new(Environ::new().var("CONTENT_LENGTH", "abc"));
        assert_eq!(req.content_length(), 0);
        let req = Request::new(Environ::new());
        assert_eq!(req.content_length(), 0);
        assert_eq!(req.body().unwrap(), b"");
    }

    #[test]
    fn body_reads_only_content_length_bytes() {
        let env = Environ::new()
            .input(io::Cursor::new(b"a=1&b=2trailing".to_vec()))
            .var("CONTENT_LENGTH", "7");
        let req = Request::new(env);
        assert_eq!(req.body().unwrap(), b"a=1&b=2");
        assert_eq!(req.body().unwrap(), b"a=1&b=2");
    }

    #[test]
    fn params_prefer_form_values() {
        let env = Environ::get("/submit?a=query&b=query&tag=x&tag=y")
            .method("POST")
            .body("application/x-www-form-urlencoded", "b=form&c=form");
        let req = Request::new(env);
        assert_eq!(req.method(), &HttpMethod::POST);
        assert_eq!(req.query().get_str("b"), Some("query"));
        assert_eq!(req.form().unwrap().get_str("b"), Some("form"));

        let params = req.params().unwrap();
        assert_eq!(params.get_str("a"), Some("query"));
        assert_eq!(params.get_str("b"), Some("form"));
        assert_eq!(params.get_str("c"), Some("form"));
        assert_eq!(params.get("tag").map(|v| v.values().len()), Some(2));
    }

    #[test]
    fn multipart_files_are_separate() {
        let body = "--b1\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n\
--b1\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"d.bin\"\r\n\r\n\x01\x02\r\n--b1--\r\n";
        let env = Environ::new()
            .method("POST")
            .body("multipart/form-data; boundary=b1", body);
        let req = Request::new(env);
        assert_eq!(req.form().unwrap().get_str("note"), Some("hi"));
        let files = req.files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].data, vec![1, 2]);
    }

    #[test]
    fn cookies_and_headers() {
        let env = Environ::new()
            .cookie("counter=1; theme=dark; counter=5")
            .header("X-Token", "abc");
        let req = Request::new(env);
        assert_eq!(req.cookie("counter"), Some("5"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.header("x-token"), Some("abc"));
        assert_eq!(req.raw_env().len(), 2);
    }
}
