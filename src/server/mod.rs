//! Single-threaded development server: a mio event loop that parses HTTP/1.1,
//! builds an [`Environ`] for each request and hands it to the application.

pub mod parser;

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::time::SystemTime;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use crate::app::Application;
use crate::body::ResponseBody;
use crate::config::ServerConfig;
use crate::environ::Environ;
use crate::status::status_line;

use parser::{HttpRequest, HttpRequestBuilder, ParseError};

const SERVER_TOKEN: Token = Token(0);
const READ_BUFFER_SIZE: usize = 4096;

#[derive(PartialEq, Debug)]
enum Status {
    Read,
    Write,
}

/// A response on its way to the socket. The body is pulled one chunk at a
/// time as the socket accepts data.
pub struct Outgoing {
    buffer: Vec<u8>,
    written: usize,
    body: Option<ResponseBody>,
    chunked: bool,
    keep_alive: bool,
}

impl Outgoing {
    fn fixed(bytes: Vec<u8>, keep_alive: bool) -> Self {
        Outgoing {
            buffer: bytes,
            written: 0,
            body: None,
            chunked: false,
            keep_alive,
        }
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Writes until the response is complete. `WouldBlock` from `out` is
    /// returned as is and the next call resumes where this one stopped; a
    /// failing body is returned as its own error.
    pub fn write_to<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        loop {
            while self.written < self.buffer.len() {
                match out.write(&self.buffer[self.written..]) {
                    Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                    Ok(n) => self.written += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            if !self.refill()? {
                return Ok(());
            }
        }
    }

    /// Loads the next body chunk into the buffer; `false` once nothing is left.
    fn refill(&mut self) -> io::Result<bool> {
        self.buffer.clear();
        self.written = 0;
        let Some(body) = self.body.as_mut() else {
            return Ok(false);
        };
        loop {
            match body.next() {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    if self.chunked {
                        self.buffer
                            .extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                        self.buffer.extend_from_slice(&chunk);
                        self.buffer.extend_from_slice(b"\r\n");
                    } else {
                        self.buffer = chunk;
                    }
                    return Ok(true);
                }
                Some(Err(e)) => {
                    self.body = None;
                    self.keep_alive = false;
                    return Err(io::Error::other(BodyFailed(e)));
                }
                None => {
                    self.body = None;
                    if self.chunked {
                        self.buffer.extend_from_slice(b"0\r\n\r\n");
                        return Ok(true);
                    }
                    return Ok(false);
                }
            }
        }
    }
}

/// Marks an error raised by the response body rather than by the socket.
#[derive(Debug, thiserror::Error)]
#[error("response body failed: {0}")]
struct BodyFailed(#[source] io::Error);

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    status: Status,
    request: HttpRequestBuilder,
    response: Option<Outgoing>,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr, max_body_size: usize) -> Self {
        Connection {
            stream,
            peer,
            status: Status::Read,
            request: HttpRequestBuilder::new(max_body_size),
            response: None,
        }
    }

    /// Prepares for the next request, starting from any pipelined bytes
    /// already received.
    fn reset(&mut self, max_body_size: usize) {
        let leftover = self.request.leftover();
        self.status = Status::Read;
        self.response = None;
        self.request = HttpRequestBuilder::new(max_body_size);
        if let Err(e) = self.request.append(&leftover) {
            self.reject(&e);
        }
    }

    fn reject(&mut self, error: &ParseError) {
        warn!(peer = %self.peer, error = %error, "rejecting request");
        self.response = Some(error_response(error));
        self.status = Status::Write;
    }
}

enum ReadOutcome {
    Ready,
    Pending,
    Closed,
}

pub struct Server {
    app: Arc<Application>,
    config: ServerConfig,
    poll: Poll,
    events: Events,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    next_token: usize,
}

impl Server {
    /// Binds `host:port` from `config`.
    pub fn new(app: Arc<Application>, config: ServerConfig) -> io::Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(addr)?;
        poll.registry()
            .register(&mut listener, SERVER_TOKEN, Interest::READABLE)?;

        Ok(Self {
            app,
            config,
            poll,
            events: Events::with_capacity(1024),
            listener,
            connections: HashMap::new(),
            next_token: 1,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn run(&mut self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "server listening");

        loop {
            if let Err(e) = self.poll.poll(&mut self.events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }

            let tokens: Vec<Token> = self.events.iter().map(|event| event.token()).collect();
            for token in tokens {
                if token == SERVER_TOKEN {
                    self.accept()?;
                } else if !self.handle(token) {
                    self.close(token);
                }
            }
        }
    }

    fn accept(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE.add(Interest::WRITABLE),
                    )?;
                    let connection =
                        Connection::new(stream, peer, self.config.client_max_body_size);
                    self.connections.insert(token, connection);
                    debug!(?token, %peer, "accepted connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return Ok(());
                }
            }
        }
    }

    fn close(&mut self, token: Token) {
        if let Some(mut connection) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut connection.stream);
            let _ = connection.stream.shutdown(Shutdown::Both);
            debug!(?token, "connection closed");
        }
    }

    /// Drives one connection until it would block; `false` means it should
    /// be closed.
    fn handle(&mut self, token: Token) -> bool {
        let Some(connection) = self.connections.get_mut(&token) else {
            return true;
        };
        let max_body_size = self.config.client_max_body_size;

        loop {
            if connection.status == Status::Read {
                match read_request(connection, &self.app, &self.config) {
                    ReadOutcome::Ready => {}
                    ReadOutcome::Pending => return true,
                    ReadOutcome::Closed => return false,
                }
            }

            let Some(response) = connection.response.as_mut() else {
                return false;
            };
            match response.write_to(&mut connection.stream) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(e) => {
                    warn!(peer = %connection.peer, error = %e, "response aborted");
                    return false;
                }
            }
            if !response.keep_alive() {
                return false;
            }
            connection.reset(max_body_size);
        }
    }
}

/// Reads until a full request is parsed and dispatched, or the socket runs dry.
fn read_request(
    connection: &mut Connection,
    app: &Application,
    config: &ServerConfig,
) -> ReadOutcome {
    let mut buffer = [0; READ_BUFFER_SIZE];
    loop {
        if let Some(request) = connection.request.take() {
            connection.response = Some(dispatch(app, config, request, connection.peer));
            connection.status = Status::Write;
            return ReadOutcome::Ready;
        }
        match connection.stream.read(&mut buffer) {
            Ok(0) => return ReadOutcome::Closed,
            Ok(n) => {
                if let Err(e) = connection.request.append(&buffer[..n]) {
                    connection.reject(&e);
                    return ReadOutcome::Ready;
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return ReadOutcome::Pending,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return ReadOutcome::Closed,
        }
    }
}

/// Runs `request` through the application. Bodies of unknown length are sent
/// chunked to HTTP/1.1 clients and close the connection otherwise.
pub fn dispatch(
    app: &Application,
    config: &ServerConfig,
    request: HttpRequest,
    peer: SocketAddr,
) -> Outgoing {
    let mut keep_alive = request.keep_alive();
    let http11 = request.version.eq_ignore_ascii_case("HTTP/1.1");
    let environ = build_environ(config, request, peer);

    let mut head: Option<(String, Vec<(String, String)>)> = None;
    let body = app.call(environ, |status, headers| {
        head = Some((status.to_string(), headers.to_vec()));
    });
    let (status, mut headers) = head.unwrap_or_else(|| (status_line(500), Vec::new()));

    let has_length = headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("content-length"));
    let chunked = !has_length && http11;
    if chunked {
        headers.push(("Transfer-Encoding".to_string(), "chunked".to_string()));
    } else if !has_length {
        keep_alive = false;
    }

    Outgoing {
        buffer: serialize_head(&status, &headers, keep_alive),
        written: 0,
        body: Some(body),
        chunked,
        keep_alive,
    }
}

/// Translates a parsed request into the variables the dispatcher expects.
pub fn build_environ(config: &ServerConfig, request: HttpRequest, peer: SocketAddr) -> Environ {
    let (path, query) = request
        .target
        .split_once('?')
        .unwrap_or((request.target.as_str(), ""));
    let path_info = urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string());

    let mut environ = Environ::new()
        .method(&request.method)
        .var("PATH_INFO", &path_info)
        .var("QUERY_STRING", query)
        .var("SERVER_NAME", &config.host)
        .var("SERVER_PORT", &config.port.to_string())
        .var("SERVER_PROTOCOL", &request.version)
        .var("REMOTE_ADDR", &peer.ip().to_string());

    for (name, value) in request.headers.iter() {
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        environ = environ.header(name, value);
    }

    environ
        .var("CONTENT_LENGTH", &request.body.len().to_string())
        .input(Cursor::new(request.body))
        .errors(io::stderr())
}

fn serialize_head(status: &str, headers: &[(String, String)], keep_alive: bool) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {}\r\n", status).into_bytes();
    for (name, value) in headers {
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    let date = httpdate::fmt_http_date(SystemTime::now());
    out.extend_from_slice(format!("Date: {}\r\n", date).as_bytes());
    let connection = if keep_alive { "keep-alive" } else { "close" };
    out.extend_from_slice(format!("Connection: {}\r\n\r\n", connection).as_bytes());
    out
}

fn error_response(error: &ParseError) -> Outgoing {
    let status = match error {
        ParseError::BodyTooLarge { .. } => 413,
        _ => 400,
    };
    let body = error.to_string();
    let headers = [
        ("Content-Type".to_string(), "text/plain".to_string()),
        ("Content-Length".to_string(), body.len().to_string()),
    ];
    let mut bytes = serialize_head(&status_line(status), &headers, false);
    bytes.extend_from_slice(body.as_bytes());
    Outgoing::fixed(bytes, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn parse(raw: &[u8]) -> HttpRequest {
        let mut builder = HttpRequestBuilder::new(1024);
        builder.append(raw).unwrap();
        builder.take().unwrap()
    }

    fn peer() -> SocketAddr {
        "10.0.0.7:5000".parse().unwrap()
    }

    fn render(mut outgoing: Outgoing) -> String {
        let mut out = Vec::new();
        outgoing.write_to(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn environ_from_request() {
        let request = parse(
            b"POST /hello%20world?a=1 HTTP/1.1\r\nContent-Type: text/plain\r\nX-Token: t\r\nContent-Length: 2\r\n\r\nhi",
        );
        let environ = build_environ(&ServerConfig::default(), request, peer());
        assert_eq!(environ.get_var("REQUEST_METHOD"), Some("POST"));
        assert_eq!(environ.get_var("PATH_INFO"), Some("/hello world"));
        assert_eq!(environ.get_var("QUERY_STRING"), Some("a=1"));
        assert_eq!(environ.get_var("CONTENT_TYPE"), Some("text/plain"));
        assert_eq!(environ.get_var("CONTENT_LENGTH"), Some("2"));
        assert_eq!(environ.get_var("HTTP_X_TOKEN"), Some("t"));
        assert_eq!(environ.get_var("REMOTE_ADDR"), Some("10.0.0.7"));
        assert_eq!(environ.get_var("SERVER_PORT"), Some("8080"));
    }

    #[test]
    fn dispatch_writes_full_response() {
        let app = Application::new();
        app.route("/hello/:name", |_, _, params| {
            Ok(Body::from(format!("Hello {}!", params.get("name").unwrap_or(""))))
        })
        .unwrap();

        let request = parse(b"GET /hello/Tim HTTP/1.1\r\n\r\n");
        let text = render(dispatch(&app, &ServerConfig::default(), request, peer()));
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 10\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("\r\n\r\nHello Tim!"));
    }

    #[test]
    fn unknown_length_is_chunked_for_http11() {
        let app = Application::new();
        app.route("/parts", |_, _, _| {
            Ok(Body::chunks(vec![b"ab".to_vec(), Vec::new(), b"cde".to_vec()]))
        })
        .unwrap();

        let request = parse(b"GET /parts HTTP/1.1\r\n\r\n");
        let outgoing = dispatch(&app, &ServerConfig::default(), request, peer());
        assert!(outgoing.keep_alive());
        let text = render(outgoing);
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(text.ends_with("\r\n\r\n2\r\nab\r\n3\r\ncde\r\n0\r\n\r\n"));

        let request = parse(b"GET /parts HTTP/1.0\r\nConnection: keep-alive\r\n\r\n");
        let outgoing = dispatch(&app, &ServerConfig::default(), request, peer());
        assert!(!outgoing.keep_alive());
        assert!(render(outgoing).ends_with("\r\n\r\nabcde"));
    }

    struct Failing {
        served: bool,
        dropped: Arc<AtomicBool>,
    }

    impl Read for Failing {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::other("disk gone"));
            }
            self.served = true;
            buf[..4].copy_from_slice(b"part");
            Ok(4)
        }
    }

    impl Drop for Failing {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn failing_body_aborts_the_connection() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&dropped);
        let app = Application::new();
        app.route("/broken", move |_, res, _| {
            res.set_header("Content-Length", "100");
            Ok(Body::stream(Failing {
                served: false,
                dropped: Arc::clone(&flag),
            }))
        })
        .unwrap();

        let request = parse(b"GET /broken HTTP/1.1\r\n\r\n");
        let mut outgoing = dispatch(&app, &ServerConfig::default(), request, peer());
        let mut out = Vec::new();
        let err = outgoing.write_to(&mut out).unwrap_err();
        assert!(err.to_string().contains("disk gone"));
        assert!(!outgoing.keep_alive());
        assert!(dropped.load(Ordering::SeqCst));
        assert!(out.ends_with(b"\r\n\r\npart"));
    }

    #[test]
    fn oversized_body_is_413() {
        let text = render(error_response(&ParseError::BodyTooLarge { limit: 1 }));
        assert!(text.starts_with("HTTP/1.1 413 REQUEST ENTITY TOO LARGE\r\n"));
        assert!(text.contains("Connection: close\r\n"));
    }
}
