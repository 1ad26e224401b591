//! Canonical reason phrases.

/// Reason phrase for `code`, upper case. Unrecognised codes give `"Unknown"`.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "CONTINUE",
        101 => "SWITCHING PROTOCOLS",
        200 => "OK",
        201 => "CREATED",
        202 => "ACCEPTED",
        203 => "NON-AUTHORITATIVE INFORMATION",
        204 => "NO CONTENT",
        205 => "RESET CONTENT",
        206 => "PARTIAL CONTENT",
        300 => "MULTIPLE CHOICES",
        301 => "MOVED PERMANENTLY",
        302 => "FOUND",
        303 => "SEE OTHER",
        304 => "NOT MODIFIED",
        305 => "USE PROXY",
        306 => "RESERVED",
        307 => "TEMPORARY REDIRECT",
        400 => "BAD REQUEST",
        401 => "UNAUTHORIZED",
        402 => "PAYMENT REQUIRED",
        403 => "FORBIDDEN",
        404 => "NOT FOUND",
        405 => "METHOD NOT ALLOWED",
        406 => "NOT ACCEPTABLE",
        407 => "PROXY AUTHENTICATION REQUIRED",
        408 => "REQUEST TIMEOUT",
        409 => "CONFLICT",
        410 => "GONE",
        411 => "LENGTH REQUIRED",
        412 => "PRECONDITION FAILED",
        413 => "REQUEST ENTITY TOO LARGE",
        414 => "REQUEST-URI TOO LONG",
        415 => "UNSUPPORTED MEDIA TYPE",
        416 => "REQUESTED RANGE NOT SATISFIABLE",
        417 => "EXPECTATION FAILED",
        500 => "INTERNAL SERVER ERROR",
        501 => "NOT IMPLEMENTED",
        502 => "BAD GATEWAY",
        503 => "SERVICE UNAVAILABLE",
        504 => "GATEWAY TIMEOUT",
        505 => "HTTP VERSION NOT SUPPORTED",
        _ => "Unknown",
    }
}

/// `"404 NOT FOUND"`.
pub fn status_line(code: u16) -> String {
    format!("{} {}", code, reason_phrase(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lines() {
        assert_eq!(status_line(200), "200 OK");
        assert_eq!(status_line(307), "307 TEMPORARY REDIRECT");
        assert_eq!(status_line(418), "418 Unknown");
    }

    #[test]
    fn table_covers_required_ranges() {
        let codes = [100, 101]
            .into_iter()
            .chain(200..=206)
            .chain(300..=307)
            .chain(400..=417)
            .chain(500..=505);
        for code in codes {
            assert_ne!(reason_phrase(code), "Unknown", "missing {code}");
        }
    }
}
