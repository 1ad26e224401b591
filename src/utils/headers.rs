/// Ordered header list.
///
/// Names are compared case-insensitively and stored Title-Cased. The same
/// name may appear more than once (`Set-Cookie` relies on it).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HttpHeaders {
    inner: Vec<(String, String)>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        HttpHeaders { inner: Vec::new() }
    }

    /// Replaces every header called `key` with a single entry.
    pub fn insert(&mut self, key: &str, value: &str) {
        let name = title_case(key);
        match self.inner.iter().position(|(k, _)| *k == name) {
            Some(pos) => {
                self.inner[pos].1 = value.to_string();
                let mut index = 0;
                self.inner.retain(|(k, _)| {
                    let keep = index <= pos || *k != name;
                    index += 1;
                    keep
                });
            }
            None => self.inner.push((name, value.to_string())),
        }
    }

    /// Appends a header without touching existing ones.
    pub fn append(&mut self, key: &str, value: &str) {
        self.inner.push((title_case(key), value.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes every header called `key`, returning the first value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let first = self.get(key).map(str::to_string);
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        first
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_vec(self) -> Vec<(String, String)> {
        self.inner
    }
}

/// `content-TYPE` -> `Content-Type`, `x-www-thing` -> `X-Www-Thing`.
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = true;
    for c in name.trim().chars() {
        if c.is_alphabetic() {
            if upper_next {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            upper_next = false;
        } else {
            out.push(c);
            upper_next = true;
        }
    }
    out
}
