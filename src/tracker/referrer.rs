// src/tracker/referrer.rs — Page locations and the in-app referrer chain

/// A route as reported by the navigation layer: path plus raw query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    /// Query string without the leading `?`. Empty when there is none.
    pub query: String,
}

impl Location {
    pub fn new(path: &str, query: &str) -> Self {
        let path = if path.is_empty() { "/" } else { path };
        Self {
            path: path.to_string(),
            query: query.strip_prefix('?').unwrap_or(query).to_string(),
        }
    }

    /// Split `/path?query#fragment`. The fragment is dropped.
    pub fn parse(target: &str) -> Self {
        let target = target.split('#').next().unwrap_or_default();
        match target.split_once('?') {
            Some((path, query)) => Self::new(path, query),
            None => Self::new(target, ""),
        }
    }

    /// Path plus `?query` when present.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }

    /// Absolute URL: origin + path + search.
    pub fn full_url(&self, origin: &str) -> String {
        format!("{}{}", origin.trim_end_matches('/'), self.path_and_query())
    }
}

/// URL of the page view that ended most recently.
#[derive(Debug, Clone, Default)]
pub struct ReferrerContext {
    previous: String,
}

impl ReferrerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> &str {
        &self.previous
    }

    pub fn record(&mut self, url: &str) {
        self.previous = url.to_string();
    }

    /// Referrer for the next `start`: the previous in-app URL, else the
    /// document referrer, else nothing.
    pub fn referrer_for_start(&self, document_referrer: Option<String>) -> Option<String> {
        if !self.previous.is_empty() {
            return Some(self.previous.clone());
        }
        document_referrer.filter(|r| !r.is_empty())
    }
}
