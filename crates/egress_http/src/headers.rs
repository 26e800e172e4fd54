//! Name-preserving HTTP header map.
//!
//! Lookup and replacement are case-insensitive; the case and insertion order
//! given by the caller are preserved for writing. Multi-valued headers
//! (`set-cookie`) keep every value.

#[derive(Debug, Default, Clone)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// First value for a header, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.find(name)
            .and_then(|i| self.entries[i].1.first())
            .map(String::as_str)
    }

    /// Every value for a header. Empty slice when absent.
    pub fn get_all(&self, name: &str) -> &[String] {
        match self.find(name) {
            Some(i) => &self.entries[i].1,
            None => &[],
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Replace a header with a single value, keeping its position when it
    /// already exists. The stored name keeps the caller's case.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.find(&name) {
            Some(i) => self.entries[i] = (name, vec![value]),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Replace a header with a full value list.
    pub fn set_all(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        match self.find(&name) {
            Some(i) => self.entries[i] = (name, values),
            None => self.entries.push((name, values)),
        }
    }

    /// Add one more value to a header, creating it if absent.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.find(&name) {
            Some(i) => self.entries[i].1.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let i = self.find(name)?;
        Some(self.entries.remove(i).1)
    }

    /// Merge a value into `vary`, without duplicating entries. An existing
    /// or incoming `*` collapses the header to `*`.
    pub fn vary(&mut self, value: &str) {
        match self.get("vary") {
            None => self.set("vary", value),
            Some("*") => {}
            Some(existing) => {
                if value == "*" {
                    self.set("vary", "*");
                } else if !existing
                    .split(',')
                    .any(|v| v.trim().eq_ignore_ascii_case(value))
                {
                    let merged = format!("{existing},{value}");
                    self.set("vary", merged);
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}
