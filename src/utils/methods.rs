use std::fmt;

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
    Other(String),
}

impl HttpMethod {
    /// Normalises a verb to upper case; an empty verb means `GET`.
    pub fn parse(method: &str) -> HttpMethod {
        let method = method.trim().to_uppercase();
        match method.as_str() {
            "" | "GET" => HttpMethod::GET,
            "POST" => HttpMethod::POST,
            "PUT" => HttpMethod::PUT,
            "DELETE" => HttpMethod::DELETE,
            "PATCH" => HttpMethod::PATCH,
            "HEAD" => HttpMethod::HEAD,
            "OPTIONS" => HttpMethod::OPTIONS,
            _ => Self::Other(method),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::Other(method) => method.as_str(),
        }
    }
}

impl From<&str> for HttpMethod {
    fn from(method: &str) -> Self {
        HttpMethod::parse(method)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_upper_cases_and_defaults_to_get() {
        assert_eq!(HttpMethod::parse("post"), HttpMethod::POST);
        assert_eq!(HttpMethod::parse(" get "), HttpMethod::GET);
        assert_eq!(HttpMethod::parse(""), HttpMethod::GET);
        assert_eq!(
            HttpMethod::parse("purge"),
            HttpMethod::Other("PURGE".to_string())
        );
        assert_eq!(HttpMethod::parse("purge").as_str(), "PURGE");
    }
}
