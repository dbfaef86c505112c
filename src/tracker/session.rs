// src/tracker/session.rs — Durable session identity (cookie-backed)

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::infra::config::SessionConfig;
use crate::tracker::host::Host;

/// Characters left alone by `encodeURIComponent`; everything else is escaped,
/// so a browser-side `decodeURIComponent` recovers the value exactly.
const COOKIE_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// The session cookie as written to the jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    /// Decoded value. Encoding happens in `header_value`.
    pub value: String,
    pub max_age_secs: u64,
    pub secure: bool,
}

impl SessionCookie {
    pub fn new(name: &str, value: &str, max_age_secs: u64, secure: bool) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            max_age_secs,
            secure,
        }
    }

    /// `Set-Cookie` / `document.cookie` form of this cookie.
    pub fn header_value(&self) -> String {
        let encoded = utf8_percent_encode(&self.value, COOKIE_VALUE);
        let mut header = format!(
            "{}={}; Path=/; Max-Age={}; SameSite=Lax",
            self.name, encoded, self.max_age_secs
        );
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }
}

/// Issues and remembers the session id.
///
/// Cookie values are accepted verbatim whatever their format. When the jar is
/// unavailable the id lives in memory for the rest of this page load.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    config: SessionConfig,
    in_memory: Option<String>,
}

impl SessionIdentity {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            in_memory: None,
        }
    }

    pub fn ensure_session_id(&mut self, host: &dyn Host) -> String {
        match host.read_cookie(&self.config.cookie_name) {
            Ok(Some(value)) if !value.is_empty() => value,
            Ok(_) => {
                let id = self.in_memory.clone().unwrap_or_else(random_id);
                let cookie = SessionCookie::new(
                    &self.config.cookie_name,
                    &id,
                    self.config.max_age_secs,
                    host.is_secure(),
                );
                match host.write_cookie(&cookie) {
                    Ok(()) => {
                        tracing::debug!(cookie = %self.config.cookie_name, "Issued new session id");
                        self.in_memory = None;
                    }
                    Err(e) => {
                        tracing::warn!("Session cookie not persisted, keeping id in memory: {}", e);
                        self.in_memory = Some(id.clone());
                    }
                }
                id
            }
            Err(e) => {
                tracing::warn!("Session cookie unreadable, using in-memory id: {}", e);
                self.in_memory.get_or_insert_with(random_id).clone()
            }
        }
    }
}

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Random v4 UUID, or a time-and-counter string when the OS RNG is
/// unavailable. Bytes come from `getrandom` directly because
/// `Uuid::new_v4` panics on RNG failure.
pub fn random_id() -> String {
    let mut bytes = [0u8; 16];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string(),
        Err(e) => {
            tracing::warn!("OS randomness unavailable, using fallback id: {}", e);
            fallback_id()
        }
    }
}

fn fallback_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}-{}-{seq:x}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::host::ScriptedHost;

    fn identity() -> SessionIdentity {
        SessionIdentity::new(SessionConfig::default())
    }

    #[test]
    fn test_consecutive_calls_return_same_id() {
        let host = ScriptedHost::new("https://example.com", 0);
        let mut ident = identity();
        let first = ident.ensure_session_id(&host);
        let second = ident.ensure_session_id(&host);
        assert_eq!(first, second);
        assert_eq!(host.set_cookie_headers().len(), 1);
    }

    #[test]
    fn test_existing_cookie_returned_verbatim() {
        let host = ScriptedHost::new("https://example.com", 0);
        host.insert_cookie("mc_sid", "legacy id/with odd chars");
        let mut ident = identity();
        assert_eq!(ident.ensure_session_id(&host), "legacy id/with odd chars");
        assert!(host.set_cookie_headers().is_empty());
    }

    #[test]
    fn test_empty_cookie_is_replaced() {
        let host = ScriptedHost::new("https://example.com", 0);
        host.insert_cookie("mc_sid", "");
        let mut ident = identity();
        let id = ident.ensure_session_id(&host);
        assert!(!id.is_empty());
        assert_eq!(host.read_cookie("mc_sid").unwrap(), Some(id));
    }

    #[test]
    fn test_cookie_attributes_on_https() {
        let host = ScriptedHost::new("https://example.com", 0);
        let id = identity().ensure_session_id(&host);
        let headers = host.set_cookie_headers();
        assert_eq!(
            headers[0],
            format!("mc_sid={id}; Path=/; Max-Age=2592000; SameSite=Lax; Secure")
        );
    }

    #[test]
    fn test_no_secure_flag_on_http() {
        let host = ScriptedHost::new("http://localhost:3000", 0);
        identity().ensure_session_id(&host);
        assert!(!host.set_cookie_headers()[0].contains("Secure"));
    }

    #[test]
    fn test_blocked_storage_keeps_in_memory_id() {
        let host = ScriptedHost::new("https://example.com", 0);
        host.block_cookies(true);
        let mut ident = identity();
        let first = ident.ensure_session_id(&host);
        let second = ident.ensure_session_id(&host);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_cleared_cookie_issues_new_identity() {
        let host = ScriptedHost::new("https://example.com", 0);
        let mut ident = identity();
        let first = ident.ensure_session_id(&host);
        host.clear_cookies();
        let second = ident.ensure_session_id(&host);
        assert_ne!(first, second);
    }

    #[test]
    fn test_header_value_url_encodes() {
        let cookie = SessionCookie::new("mc_sid", "a b;c", 60, false);
        assert_eq!(
            cookie.header_value(),
            "mc_sid=a%20b%3Bc; Path=/; Max-Age=60; SameSite=Lax"
        );
    }

    #[test]
    fn test_header_value_decodes_back_exactly() {
        let value = "a b+c/é(1)";
        let header = SessionCookie::new("mc_sid", value, 60, false).header_value();
        let encoded = header
            .strip_prefix("mc_sid=")
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        assert!(!encoded.contains('+'));
        let decoded = percent_encoding::percent_decode_str(encoded)
            .decode_utf8()
            .unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_random_ids_are_unique() {
        let a = random_id();
        let b = random_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_fallback_ids_are_unique() {
        assert_ne!(fallback_id(), fallback_id());
    }
}
