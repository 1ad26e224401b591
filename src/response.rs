use crate::utils::{Cookie, CookieJar, HttpHeaders};

pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Status, headers and cookies accumulated while a request is handled.
///
/// A fresh `Response` is created for every dispatch and consumed when the
/// status line is sent, so nothing written afterwards can reach the client.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: HttpHeaders,
    cookies: CookieJar,
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: HttpHeaders::new(),
            cookies: CookieJar::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Sets `key`, replacing previous values.
    pub fn set_header(&mut self, key: &str, value: &str) {
        self.headers.insert(key, value);
    }

    /// Adds another `key` header next to existing ones.
    pub fn add_header(&mut self, key: &str, value: &str) {
        self.headers.append(key, value);
    }

    /// The `Content-Type` header, `text/html` unless set.
    pub fn content_type(&self) -> &str {
        self.headers.get("Content-Type").unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    pub fn set_content_type(&mut self, value: &str) {
        self.headers.insert("Content-Type", value);
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.cookies.set(cookie);
    }

    /// Asks the client to drop `name`.
    pub fn delete_cookie(&mut self, name: &str) {
        self.cookies.set(Cookie::new(name, "").path("/").max_age(0));
    }

    /// Final header list: regular headers, then one `Set-Cookie` per cookie.
    pub fn into_header_list(self) -> Vec<(String, String)> {
        let mut headers = self.headers;
        if !headers.contains("Content-Type") {
            let mut with_type = HttpHeaders::new();
            with_type.insert("Content-Type", DEFAULT_CONTENT_TYPE);
            for (key, value) in headers.iter() {
                with_type.append(key, value);
            }
            headers = with_type;
        }
        for cookie in self.cookies.iter() {
            headers.append("Set-Cookie", &cookie.to_header_value());
        }
        headers.into_vec()
    }
}

impl Default for Response {
    fn default() -> Self {
        Response::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_response_defaults() {
        let res = Response::new();
        assert_eq!(res.status(), 200);
        assert!(res.headers().is_empty());
        assert!(res.cookies().is_empty());
        assert_eq!(res.content_type(), "text/html");
    }

    #[test]
    fn header_list_appends_cookies_after_headers() {
        let mut res = Response::new();
        res.set_header("x-powered-by", "decanter");
        res.set_content_type("text/plain; charset=utf-8");
        res.set_cookie(Cookie::new("a", "1"));
        res.set_cookie(Cookie::new("b", "2").path("/"));
        assert_eq!(
            res.into_header_list(),
            vec![
                ("X-Powered-By".to_string(), "decanter".to_string()),
                ("Content-Type".to_string(), "text/plain; charset=utf-8".to_string()),
                ("Set-Cookie".to_string(), "a=1".to_string()),
                ("Set-Cookie".to_string(), "b=2; Path=/".to_string()),
            ]
        );
    }

    #[test]
    fn default_content_type_is_emitted_first() {
        let mut res = Response::new();
        res.set_header("Location", "/x");
        let headers = res.into_header_list();
        assert_eq!(headers[0], ("Content-Type".to_string(), "text/html".to_string()));
        assert_eq!(headers[1], ("Location".to_string(), "/x".to_string()));
    }

    #[test]
    fn delete_cookie_expires_immediately() {
        let mut res = Response::new();
        res.delete_cookie("session");
        let headers = res.into_header_list();
        assert!(headers.contains(&(
            "Set-Cookie".to_string(),
            "session=; Max-Age=0; Path=/".to_string()
        )));
    }
}
