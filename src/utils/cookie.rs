use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    path: Option<String>,
    domain: Option<String>,
    max_age: Option<Duration>,
    expires: Option<SystemTime>,
    comment: Option<String>,
    version: Option<u32>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl Cookie {
    /// Create a new cookie
    pub fn new(name: &str, value: &str) -> Self {
        Cookie {
            name: name.to_string(),
            value: value.to_string(),
            path: None,
            domain: None,
            max_age: None,
            expires: None,
            comment: None,
            version: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    /// Set the cookie max age in seconds
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(Duration::from_secs(seconds));
        self
    }

    pub fn expires(mut self, time: SystemTime) -> Self {
        self.expires = Some(time);
        self
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Mark cookie as secure (HTTPS only)
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Mark cookie as HTTP only (inaccessible to JavaScript)
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Value of one `Set-Cookie` header.
    pub fn to_header_value(&self) -> String {
        let mut parts = vec![format!(
            "{}={}",
            self.name,
            urlencoding::encode(&self.value)
        )];

        if let Some(comment) = &self.comment {
            parts.push(format!("Comment={}", comment));
        }
        if let Some(domain) = &self.domain {
            parts.push(format!("Domain={}", domain));
        }
        if let Some(expires) = &self.expires {
            parts.push(format!("Expires={}", httpdate::fmt_http_date(*expires)));
        }
        if let Some(max_age) = &self.max_age {
            parts.push(format!("Max-Age={}", max_age.as_secs()));
        }
        if let Some(path) = &self.path {
            parts.push(format!("Path={}", path));
        }
        if let Some(version) = self.version {
            parts.push(format!("Version={}", version));
        }
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }
        if let Some(same_site) = &self.same_site {
            let value = match same_site {
                SameSite::Strict => "Strict",
                SameSite::Lax => "Lax",
                SameSite::None => "None",
            };
            parts.push(format!("SameSite={}", value));
        }

        parts.join("; ")
    }

    /// Parses a request `Cookie` header. Later duplicates overwrite earlier ones.
    pub fn parse(cookie_string: &str) -> HashMap<String, String> {
        let mut cookies = HashMap::new();
        for part in cookie_string.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some((name, value)) = part.split_once('=') {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                let value = urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                cookies.insert(name.to_string(), value);
            }
        }
        cookies
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_header_value())
    }
}

/// Response cookies keyed by name, in first-set order.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `cookie`, replacing a previous cookie of the same name.
    pub fn set(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Cookie> {
        let pos = self.cookies.iter().position(|c| c.name == name)?;
        Some(self.cookies.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn header_value_carries_attributes() {
        let cookie = Cookie::new("session", "a b")
            .path("/")
            .max_age(60)
            .secure(true)
            .http_only(true)
            .expires(UNIX_EPOCH + Duration::from_secs(784111777));
        assert_eq!(
            cookie.to_header_value(),
            "session=a%20b; Expires=Sun, 06 Nov 1994 08:49:37 GMT; Max-Age=60; Path=/; Secure; HttpOnly"
        );
    }

    #[test]
    fn parse_last_duplicate_wins() {
        let cookies = Cookie::parse("a=1; b=\"two\"; a=3;; junk");
        assert_eq!(cookies.get("a").map(String::as_str), Some("3"));
        assert_eq!(cookies.get("b").map(String::as_str), Some("two"));
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn jar_replaces_by_name() {
        let mut jar = CookieJar::new();
        jar.set(Cookie::new("counter", "1"));
        jar.set(Cookie::new("other", "x"));
        jar.set(Cookie::new("counter", "2"));
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.get("counter").map(Cookie::value), Some("2"));
        assert_eq!(jar.iter().next().map(Cookie::name), Some("counter"));
    }
}
