//! Incremental HTTP/1.1 request parser fed from a non-blocking socket.

use thiserror::Error;

use crate::utils::HttpHeaders;

#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    /// Request target as sent, including any query string.
    pub target: String,
    pub version: String,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// HTTP/1.1 keeps the connection open unless told otherwise, 1.0 only on request.
    pub fn keep_alive(&self) -> bool {
        let connection = self.headers.get("connection").map(str::to_ascii_lowercase);
        match connection.as_deref() {
            Some("close") => false,
            Some("keep-alive") => true,
            _ => self.version.eq_ignore_ascii_case("HTTP/1.1"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing request line")]
    MissingRequestLine,
    #[error("invalid request line")]
    InvalidRequestLine,
    #[error("invalid chunk size")]
    InvalidChunkSize,
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

#[derive(Debug)]
enum ParserState {
    ParsingHeaders,
    ParsingBody { body_start: usize, body_type: BodyType },
    Complete,
}

#[derive(Debug, Clone, Copy)]
enum BodyType {
    ContentLength(usize),
    Chunked,
    None,
}

#[derive(Debug)]
pub struct HttpRequestBuilder {
    buffer: Vec<u8>,
    state: ParserState,
    request: Option<HttpRequest>,
    max_body_size: usize,
    /// End of the completed request in `buffer`; later bytes belong to the next one.
    consumed: usize,
}

impl HttpRequestBuilder {
    pub fn new(max_body_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            state: ParserState::ParsingHeaders,
            request: None,
            max_body_size,
            consumed: 0,
        }
    }

    pub fn append(&mut self, data: &[u8]) -> Result<(), ParseError> {
        self.buffer.extend_from_slice(data);

        match &self.state {
            ParserState::ParsingHeaders => {
                if let Some((headers_end, body_start)) = self.find_headers_end() {
                    self.parse_headers(headers_end, body_start)?;
                }
            }
            ParserState::ParsingBody { .. } => self.parse_body()?,
            ParserState::Complete => {}
        }
        Ok(())
    }

    fn find_headers_end(&self) -> Option<(usize, usize)> {
        if let Some(pos) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            return Some((pos, pos + 4));
        }
        self.buffer
            .windows(2)
            .position(|w| w == b"\n\n")
            .map(|pos| (pos, pos + 2))
    }

    fn parse_headers(&mut self, headers_end: usize, body_start: usize) -> Result<(), ParseError> {
        let head = String::from_utf8_lossy(&self.buffer[..headers_end]).into_owned();
        let mut lines = head.lines();

        let request_line = lines.next().ok_or(ParseError::MissingRequestLine)?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let [method, target, version] = parts[..] else {
            return Err(ParseError::InvalidRequestLine);
        };

        let mut headers = HttpHeaders::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if let Some((key, val)) = line.split_once(':') {
                headers.append(key.trim(), val.trim());
            }
        }

        let body_type = determine_body_type(&headers);
        if let BodyType::ContentLength(length) = body_type {
            if length > self.max_body_size {
                return Err(ParseError::BodyTooLarge {
                    limit: self.max_body_size,
                });
            }
        }

        self.request = Some(HttpRequest {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
            headers,
            body: Vec::new(),
        });
        self.state = ParserState::ParsingBody {
            body_start,
            body_type,
        };
        self.parse_body()
    }

    fn parse_body(&mut self) -> Result<(), ParseError> {
        let ParserState::ParsingBody {
            body_start,
            body_type,
        } = self.state
        else {
            return Ok(());
        };

        match body_type {
            BodyType::None => self.finish(Vec::new(), body_start),
            BodyType::ContentLength(expected) => {
                if self.buffer.len().saturating_sub(body_start) >= expected {
                    let end = body_start + expected;
                    let body = self.buffer[body_start..end].to_vec();
                    self.finish(body, end);
                }
            }
            BodyType::Chunked => self.parse_chunked_body(body_start)?,
        }
        Ok(())
    }

    fn parse_chunked_body(&mut self, body_start: usize) -> Result<(), ParseError> {
        let mut body = Vec::new();
        let mut pos = body_start;

        loop {
            let Some(line_end) = self.buffer[pos..]
                .windows(2)
                .position(|w| w == b"\r\n")
                .map(|p| pos + p)
            else {
                return Ok(());
            };

            let size_line = String::from_utf8_lossy(&self.buffer[pos..line_end]);
            let size_str = size_line.split(';').next().unwrap_or("").trim();
            let chunk_size =
                usize::from_str_radix(size_str, 16).map_err(|_| ParseError::InvalidChunkSize)?;
            pos = line_end + 2;

            if chunk_size == 0 {
                if let Some(end) = self.trailer_end(pos) {
                    self.finish(body, end);
                }
                return Ok(());
            }
            if chunk_size > self.max_body_size.saturating_sub(body.len()) {
                return Err(ParseError::BodyTooLarge {
                    limit: self.max_body_size,
                });
            }
            let data_end = pos + chunk_size;
            if self.buffer.len() < data_end + 2 {
                return Ok(());
            }
            body.extend_from_slice(&self.buffer[pos..data_end]);
            pos = data_end + 2;
        }
    }

    /// End of the trailer section that follows the last chunk, if buffered.
    fn trailer_end(&self, pos: usize) -> Option<usize> {
        let rest = self.buffer.get(pos..)?;
        if rest.starts_with(b"\r\n") {
            return Some(pos + 2);
        }
        rest.windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map(|p| pos + p + 4)
    }

    fn finish(&mut self, body: Vec<u8>, end: usize) {
        if let Some(request) = self.request.as_mut() {
            request.body = body;
        }
        self.consumed = end;
        self.state = ParserState::Complete;
    }

    pub fn done(&self) -> bool {
        matches!(self.state, ParserState::Complete)
    }

    /// The parsed request once complete, leaving the builder empty.
    pub fn take(&mut self) -> Option<HttpRequest> {
        if self.done() { self.request.take() } else { None }
    }

    /// Bytes received after the completed request, e.g. a pipelined one.
    pub fn leftover(&mut self) -> Vec<u8> {
        if self.done() {
            self.buffer.split_off(self.consumed.min(self.buffer.len()))
        } else {
            Vec::new()
        }
    }
}

fn determine_body_type(headers: &HttpHeaders) -> BodyType {
    if let Some(transfer_encoding) = headers.get("transfer-encoding") {
        if transfer_encoding.to_ascii_lowercase().contains("chunked") {
            return BodyType::Chunked;
        }
    }
    headers
        .get("content-length")
        .and_then(|length| length.trim().parse().ok())
        .map_or(BodyType::None, BodyType::ContentLength)
}
