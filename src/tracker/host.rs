// src/tracker/host.rs — Capability interface to the page runtime
//
// Everything the tracker needs from its environment goes through `Host`:
// the clock, document visibility, the page origin, the native referrer and
// the cookie jar. Tests and the `simulate` command drive `ScriptedHost`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::infra::errors::TrackerError;
use crate::tracker::session::SessionCookie;

pub trait Host: Send + Sync {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> u64;

    fn is_visible(&self) -> bool;

    /// Scheme and authority of the page, e.g. `https://example.com`.
    fn origin(&self) -> String;

    /// Referrer reported by the document on first load.
    fn document_referrer(&self) -> Option<String>;

    /// Decoded value of the named cookie, if set.
    fn read_cookie(&self, name: &str) -> Result<Option<String>, TrackerError>;

    fn write_cookie(&self, cookie: &SessionCookie) -> Result<(), TrackerError>;

    fn is_secure(&self) -> bool {
        self.origin().starts_with("https://")
    }
}

/// In-memory host with a manual clock and scripted visibility.
pub struct ScriptedHost {
    origin: String,
    clock_ms: AtomicU64,
    visible: AtomicBool,
    referrer: Mutex<Option<String>>,
    cookies: Mutex<HashMap<String, String>>,
    cookies_blocked: AtomicBool,
    set_cookie_headers: Mutex<Vec<String>>,
}

impl ScriptedHost {
    pub fn new(origin: &str, start_ms: u64) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            clock_ms: AtomicU64::new(start_ms),
            visible: AtomicBool::new(true),
            referrer: Mutex::new(None),
            cookies: Mutex::new(HashMap::new()),
            cookies_blocked: AtomicBool::new(false),
            set_cookie_headers: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.clock_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    pub fn set_document_referrer(&self, referrer: Option<&str>) {
        if let Ok(mut r) = self.referrer.lock() {
            *r = referrer.map(str::to_string);
        }
    }

    /// Simulate privacy mode: reads and writes fail.
    pub fn block_cookies(&self, blocked: bool) {
        self.cookies_blocked.store(blocked, Ordering::SeqCst);
    }

    pub fn insert_cookie(&self, name: &str, value: &str) {
        if let Ok(mut jar) = self.cookies.lock() {
            jar.insert(name.to_string(), value.to_string());
        }
    }

    pub fn clear_cookies(&self) {
        if let Ok(mut jar) = self.cookies.lock() {
            jar.clear();
        }
    }

    /// Every `Set-Cookie` value written so far, in order.
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.set_cookie_headers
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

impl Host for ScriptedHost {
    fn now_ms(&self) -> u64 {
        self.clock_ms.load(Ordering::SeqCst)
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn document_referrer(&self) -> Option<String> {
        self.referrer.lock().ok().and_then(|r| r.clone())
    }

    fn read_cookie(&self, name: &str) -> Result<Option<String>, TrackerError> {
        if self.cookies_blocked.load(Ordering::SeqCst) {
            return Err(TrackerError::CookieStorage("cookies are blocked".into()));
        }
        let jar = self
            .cookies
            .lock()
            .map_err(|_| TrackerError::CookieStorage("cookie jar poisoned".into()))?;
        Ok(jar.get(name).cloned())
    }

    fn write_cookie(&self, cookie: &SessionCookie) -> Result<(), TrackerError> {
        if self.cookies_blocked.load(Ordering::SeqCst) {
            return Err(TrackerError::CookieStorage("cookies are blocked".into()));
        }
        let mut jar = self
            .cookies
            .lock()
            .map_err(|_| TrackerError::CookieStorage("cookie jar poisoned".into()))?;
        jar.insert(cookie.name.clone(), cookie.value.clone());
        if let Ok(mut headers) = self.set_cookie_headers.lock() {
            headers.push(cookie.header_value());
        }
        Ok(())
    }
}

/// Wall-clock host for native embedding: always visible, cookies live as
/// long as the process.
pub struct SystemHost {
    origin: String,
    cookies: Mutex<HashMap<String, String>>,
}

impl SystemHost {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            cookies: Mutex::new(HashMap::new()),
        }
    }
}

impl Host for SystemHost {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }

    fn is_visible(&self) -> bool {
        true
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn document_referrer(&self) -> Option<String> {
        None
    }

    fn read_cookie(&self, name: &str) -> Result<Option<String>, TrackerError> {
        let jar = self
            .cookies
            .lock()
            .map_err(|_| TrackerError::CookieStorage("cookie jar poisoned".into()))?;
        Ok(jar.get(name).cloned())
    }

    fn write_cookie(&self, cookie: &SessionCookie) -> Result<(), TrackerError> {
        let mut jar = self
            .cookies
            .lock()
            .map_err(|_| TrackerError::CookieStorage("cookie jar poisoned".into()))?;
        jar.insert(cookie.name.clone(), cookie.value.clone());
        Ok(())
    }
}
