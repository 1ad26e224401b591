use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::sync::Arc;

/// Read size used when streaming a readable body without a file wrapper.
pub const CHUNK_SIZE: usize = 8 * 1024;

pub type Chunks = Box<dyn Iterator<Item = io::Result<Vec<u8>>> + Send>;

/// Server-provided hint for turning a readable body into chunks
/// (the `wsgi.file_wrapper` slot).
pub type FileWrapper = Arc<dyn Fn(Box<dyn Read + Send>) -> Chunks + Send + Sync>;

/// What a handler produces. Text is carried as UTF-8 bytes.
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    Stream(Box<dyn Read + Send>),
    Chunks(Box<dyn Iterator<Item = Vec<u8>> + Send>),
}

impl Body {
    pub fn stream<R: Read + Send + 'static>(reader: R) -> Self {
        Body::Stream(Box::new(reader))
    }

    pub fn chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
        I::IntoIter: Send + 'static,
    {
        Body::Chunks(Box::new(chunks.into_iter()))
    }

    /// Length when known without consuming the body.
    pub fn len(&self) -> Option<usize> {
        match self {
            Body::Empty => Some(0),
            Body::Bytes(bytes) => Some(bytes.len()),
            Body::Stream(_) | Body::Chunks(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Turns the body into the chunk iterator handed back to the server.
    pub fn into_response_body(self, file_wrapper: Option<&FileWrapper>) -> ResponseBody {
        let inner = match self {
            Body::Empty => Inner::Once(None),
            Body::Bytes(bytes) => Inner::Once(Some(bytes)),
            Body::Stream(reader) => match file_wrapper {
                Some(wrap) => Inner::Wrapped(wrap(reader)),
                None => Inner::Reader(Some(reader)),
            },
            Body::Chunks(chunks) => Inner::Chunks(chunks),
        };
        ResponseBody { inner }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Bytes(bytes) => write!(f, "Body::Bytes({} bytes)", bytes.len()),
            Body::Stream(_) => f.write_str("Body::Stream"),
            Body::Chunks(_) => f.write_str("Body::Chunks"),
        }
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Bytes(text.as_bytes().to_vec())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Bytes(text.into_bytes())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Body::Bytes(bytes.to_vec())
    }
}

impl From<File> for Body {
    fn from(file: File) -> Self {
        Body::stream(file)
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Body::Empty
    }
}

/// The iterable of byte chunks returned by [`crate::Application::call`].
///
/// Dropping it releases whatever the body holds, so a server that stops
/// consuming early still closes open files.
pub struct ResponseBody {
    inner: Inner,
}

enum Inner {
    Once(Option<Vec<u8>>),
    Reader(Option<Box<dyn Read + Send>>),
    Chunks(Box<dyn Iterator<Item = Vec<u8>> + Send>),
    Wrapped(Chunks),
}

impl ResponseBody {
    /// Drains every chunk into one buffer.
    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        for chunk in self {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

impl Iterator for ResponseBody {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Once(bytes) => bytes.take().map(Ok),
            Inner::Reader(slot) => {
                let reader = slot.as_mut()?;
                let mut buf = vec![0; CHUNK_SIZE];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => {
                            *slot = None;
                            return None;
                        }
                        Ok(n) => {
                            buf.truncate(n);
                            return Some(Ok(buf));
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            *slot = None;
                            return Some(Err(e));
                        }
                    }
                }
            }
            Inner::Chunks(chunks) => chunks.next().map(Ok),
            Inner::Wrapped(chunks) => chunks.next(),
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn text_is_one_chunk() {
        let chunks: Vec<_> = Body::from("Hello")
            .into_response_body(None)
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(chunks, vec![b"Hello".to_vec()]);
    }

    #[test]
    fn readers_stream_in_fixed_chunks() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 5];
        let chunks: Vec<_> = Body::stream(Cursor::new(data.clone()))
            .into_response_body(None)
            .collect::<io::Result<_>>()
            .unwrap();
        let sizes: Vec<_> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![CHUNK_SIZE, CHUNK_SIZE, 5]);
        assert_eq!(chunks.concat(), data);
    }

    #[test]
    fn file_wrapper_takes_precedence() {
        let used = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&used);
        let wrapper: FileWrapper = Arc::new(move |mut reader: Box<dyn Read + Send>| {
            flag.store(true, Ordering::SeqCst);
            let mut all = Vec::new();
            let result = reader.read_to_end(&mut all).map(|_| all);
            Box::new(std::iter::once(result)) as Chunks
        });
        let bytes = Body::stream(Cursor::new(b"abc".to_vec()))
            .into_response_body(Some(&wrapper))
            .into_bytes()
            .unwrap();
        assert_eq!(bytes, b"abc");
        assert!(used.load(Ordering::SeqCst));
    }

    struct Tracked {
        data: Cursor<Vec<u8>>,
        closed: Arc<AtomicBool>,
    }

    impl Read for Tracked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.data.read(buf)
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn tracked(closed: &Arc<AtomicBool>) -> Body {
        Body::stream(Tracked {
            data: Cursor::new(vec![1u8; CHUNK_SIZE * 4]),
            closed: Arc::clone(closed),
        })
    }

    #[test]
    fn abandoned_body_closes_its_reader() {
        let closed = Arc::new(AtomicBool::new(false));
        let mut body = tracked(&closed).into_response_body(None);
        assert_eq!(body.next().unwrap().unwrap().len(), CHUNK_SIZE);
        assert!(!closed.load(Ordering::SeqCst));
        drop(body);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn abandoned_wrapped_body_closes_its_reader() {
        let wrapper: FileWrapper = Arc::new(|mut reader: Box<dyn Read + Send>| {
            let chunks = std::iter::from_fn(move || {
                let mut buf = vec![0; 16];
                match reader.read(&mut buf) {
                    Ok(0) => None,
                    Ok(n) => {
                        buf.truncate(n);
                        Some(Ok(buf))
                    }
                    Err(e) => Some(Err(e)),
                }
            });
            Box::new(chunks) as Chunks
        });

        let closed = Arc::new(AtomicBool::new(false));
        let mut body = tracked(&closed).into_response_body(Some(&wrapper));
        assert_eq!(body.next().unwrap().unwrap().len(), 16);
        assert!(!closed.load(Ordering::SeqCst));
        drop(body);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn chunk_iterators_pass_through() {
        let body = Body::chunks(vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(body.len(), None);
        assert_eq!(body.into_response_body(None).into_bytes().unwrap(), b"ab");
        assert_eq!(Body::Empty.into_response_body(None).count(), 0);
    }
}
