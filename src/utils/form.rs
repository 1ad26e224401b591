use std::collections::HashMap;

/// A query or form field: one value stays a scalar, repeats become a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Single(String),
    Multi(Vec<String>),
}

impl FormValue {
    /// The scalar value, or the first of several.
    pub fn first(&self) -> &str {
        match self {
            FormValue::Single(v) => v,
            FormValue::Multi(vs) => vs.first().map(String::as_str).unwrap_or(""),
        }
    }

    pub fn as_single(&self) -> Option<&str> {
        match self {
            FormValue::Single(v) => Some(v),
            FormValue::Multi(_) => None,
        }
    }

    pub fn values(&self) -> &[String] {
        match self {
            FormValue::Single(v) => std::slice::from_ref(v),
            FormValue::Multi(vs) => vs,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormDict {
    inner: HashMap<String, FormValue>,
}

impl FormDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups repeated keys; a key seen once keeps a scalar value.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in pairs {
            grouped.entry(key).or_default().push(value);
        }
        let inner = grouped
            .into_iter()
            .map(|(key, mut values)| {
                let value = if values.len() == 1 {
                    FormValue::Single(values.remove(0))
                } else {
                    FormValue::Multi(values)
                };
                (key, value)
            })
            .collect();
        FormDict { inner }
    }

    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.inner.get(name)
    }

    /// Shorthand for `get(name).map(FormValue::first)`.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(FormValue::first)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn insert(&mut self, name: String, value: FormValue) {
        self.inner.insert(name, value);
    }

    /// Copies every entry of `other` over this dict.
    pub fn merge(&mut self, other: &FormDict) {
        for (key, value) in &other.inner {
            self.inner.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormValue)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A file part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Splits an url-encoded string on `&` and `;`, keeping blank values.
pub fn parse_query(query: &str) -> FormDict {
    FormDict::from_pairs(query_pairs(query))
}

fn query_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split(['&', ';'])
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

pub fn extract_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|s| s.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

/// Parses a `multipart/form-data` body into plain fields and file uploads.
/// Malformed parts are skipped.
pub fn parse_multipart(body: &[u8], boundary: &str) -> (FormDict, Vec<Upload>) {
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();
    let mut fields = Vec::new();
    let mut uploads = Vec::new();

    let mut positions = Vec::new();
    let mut start = 0;
    while let Some(offset) = find(&body[start..], delimiter) {
        positions.push(start + offset);
        start += offset + delimiter.len();
    }

    for window in positions.windows(2) {
        let part = &body[window[0] + delimiter.len()..window[1]];
        let part = part.strip_prefix(b"\r\n").unwrap_or(part);
        let part = part.strip_suffix(b"\r\n").unwrap_or(part);

        let Some(header_end) = find(part, b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&part[..header_end]);
        let data = &part[header_end + 4..];

        let mut name = None;
        let mut filename = None;
        let mut content_type = None;
        for line in headers.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("content-disposition") {
                name = disposition_param(value, "name");
                filename = disposition_param(value, "filename");
            } else if key.trim().eq_ignore_ascii_case("content-type") {
                content_type = Some(value.trim().to_string());
            }
        }

        let Some(name) = name else {
            continue;
        };
        match filename {
            Some(filename) => uploads.push(Upload {
                name,
                filename,
                content_type,
                data: data.to_vec(),
            }),
            None => fields.push((name, String::from_utf8_lossy(data).into_owned())),
        }
    }

    (FormDict::from_pairs(fields), uploads)
}

fn disposition_param(disposition: &str, param: &str) -> Option<String> {
    disposition.split(';').map(str::trim).find_map(|segment| {
        let (key, value) = segment.split_once('=')?;
        if key.trim() == param {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
