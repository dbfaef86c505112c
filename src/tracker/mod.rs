// src/tracker/mod.rs — Navigation-driven page-view tracker
//
// `Tracker` is the single owner of cross-navigation state: the session
// identity, the referrer chain, the exit guard, the live page view and its
// heartbeat timer. The navigation layer and the page runtime call into it;
// events flow one way into the transport. No call here ever fails.

pub mod event;
pub mod exit;
pub mod heartbeat;
pub mod host;
pub mod lifecycle;
pub mod referrer;
pub mod session;
pub mod transport;
pub mod utm;

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::infra::config::Config;
use event::Event;
use exit::{ExitCoordinator, ExitSignal};
use heartbeat::{HeartbeatHandle, HeartbeatMode};
use host::Host;
use lifecycle::{PageViewSession, StartParams};
use referrer::{Location, ReferrerContext};
use session::SessionIdentity;
use transport::{EventSink, EventTransport};

/// Cheap to clone; clones share one tracker.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    host: Arc<dyn Host>,
    transport: EventTransport,
    heartbeat_mode: HeartbeatMode,
    state: Mutex<TrackerState>,
}

struct TrackerState {
    identity: SessionIdentity,
    referrer: ReferrerContext,
    exit: ExitCoordinator,
    current: Option<PageViewSession>,
    heartbeat: HeartbeatHandle,
}

impl Tracker {
    pub fn new(config: Config, host: Arc<dyn Host>, sink: Arc<dyn EventSink>) -> Self {
        Self::with_mode(config, host, sink, HeartbeatMode::Timer)
    }

    pub fn with_mode(
        config: Config,
        host: Arc<dyn Host>,
        sink: Arc<dyn EventSink>,
        heartbeat_mode: HeartbeatMode,
    ) -> Self {
        let url = config.collector.url_for(&host.origin());
        let state = TrackerState {
            identity: SessionIdentity::new(config.session.clone()),
            referrer: ReferrerContext::new(),
            exit: ExitCoordinator::new(),
            current: None,
            heartbeat: HeartbeatHandle::inert(),
        };

        Self {
            inner: Arc::new(Inner {
                transport: EventTransport::new(url, sink),
                config,
                host,
                heartbeat_mode,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn collector_url(&self) -> &str {
        self.inner.transport.url()
    }

    /// Id of the live page view, if one is open.
    pub fn current_page_view_id(&self) -> Option<String> {
        self.inner
            .lock()
            .current
            .as_ref()
            .filter(|pv| !pv.is_ended())
            .map(|pv| pv.id().to_string())
    }

    /// Route changed to `target` (`/path?query`).
    pub fn navigate(&self, target: &str) {
        self.navigate_to(Location::parse(target));
    }

    pub fn navigate_to(&self, location: Location) {
        if !self.inner.config.tracking.enabled {
            return;
        }
        let now = self.inner.host.now_ms();
        let mut guard = self.inner.lock();
        let st = &mut *guard;

        if let Some(current) = st.current.as_ref() {
            if !current.is_ended() && current.location() == &location {
                tracing::trace!(path = %location.path, "Same location, page view continues");
                return;
            }
        }

        self.inner.finalize(st, ExitSignal::RouteChange, now);

        if self.inner.config.tracking.is_excluded(&location.path) {
            tracing::debug!(path = %location.path, "Path excluded from tracking");
            st.current = None;
            return;
        }

        self.inner.open_page_view(st, location, now);
    }

    /// The document's visibility changed; the new state is read from the host.
    pub fn visibility_changed(&self) {
        if !self.inner.config.tracking.enabled {
            return;
        }
        let visible = self.inner.host.is_visible();
        let now = self.inner.host.now_ms();
        let mut guard = self.inner.lock();

        if let Some(current) = guard.current.as_mut() {
            if let Some(event) = current.set_visible(visible, now) {
                self.inner.transport.send(&event);
            }
        }
    }

    pub fn page_hide(&self) {
        self.exit_signal(ExitSignal::PageHide);
    }

    pub fn before_unload(&self) {
        self.exit_signal(ExitSignal::BeforeUnload);
    }

    pub fn unload(&self) {
        self.exit_signal(ExitSignal::Unload);
    }

    /// Tracker is being torn down by its owner.
    pub fn shutdown(&self) {
        self.exit_signal(ExitSignal::Teardown);
    }

    /// `pageshow`. A page restored from the back/forward cache after its
    /// page view was closed gets a fresh page view for the same location.
    pub fn page_show(&self, persisted: bool) {
        if !persisted || !self.inner.config.tracking.enabled {
            return;
        }
        let now = self.inner.host.now_ms();
        let mut guard = self.inner.lock();
        let st = &mut *guard;

        let location = match st.current.as_ref() {
            Some(current) if current.is_ended() => current.location().clone(),
            _ => return,
        };
        tracing::debug!(path = %location.path, "Page restored from cache, reopening page view");
        self.inner.open_page_view(st, location, now);
    }

    /// Fire a heartbeat for the live page view. Used directly in
    /// `HeartbeatMode::Manual`.
    pub fn tick(&self) {
        let id = match self.current_page_view_id() {
            Some(id) => id,
            None => return,
        };
        self.inner.heartbeat_for(&id);
    }

    fn exit_signal(&self, signal: ExitSignal) {
        if !self.inner.config.tracking.enabled {
            return;
        }
        let now = self.inner.host.now_ms();
        let mut guard = self.inner.lock();
        self.inner.finalize(&mut guard, signal, now);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Close the live page view for `signal` and stop its timer. The guard is
    /// claimed before the `end` event is handed to the transport.
    fn finalize(&self, st: &mut TrackerState, signal: ExitSignal, now: u64) {
        let Some(current) = st.current.as_mut() else {
            return;
        };
        if let Some(event) = st.exit.finalize(current, signal, now) {
            tracing::debug!(
                page_view = current.id(),
                path = %current.location().path,
                exit = %signal.exit_type(),
                active_ms = event.active_ms().unwrap_or_default(),
                "Page view ended"
            );
            self.transport.send(&event);
        }
        st.heartbeat = HeartbeatHandle::inert();
    }

    fn open_page_view(self: &Arc<Self>, st: &mut TrackerState, location: Location, now: u64) {
        let host = self.host.as_ref();
        let session_id = st.identity.ensure_session_id(host);
        let referrer = st.referrer.referrer_for_start(host.document_referrer());
        let origin = host.origin();

        let (session, start) = PageViewSession::start(StartParams {
            session_id,
            location,
            origin: &origin,
            referrer,
            now_ms: now,
            visible: host.is_visible(),
            interval_ms: self.config.heartbeat.interval_ms,
        });

        tracing::debug!(page_view = session.id(), path = %session.location().path, "Page view started");
        self.transport.send(&start);
        st.referrer.record(session.url());

        st.heartbeat = match self.heartbeat_mode {
            HeartbeatMode::Timer => {
                let weak = Arc::downgrade(self);
                let id = session.id().to_string();
                heartbeat::spawn(self.config.heartbeat.interval(), move || {
                    on_timer(&weak, &id)
                })
            }
            HeartbeatMode::Manual => HeartbeatHandle::inert(),
        };
        st.current = Some(session);
    }

    /// Heartbeat for `page_view_id`. Ticks for a page view that has been
    /// replaced or closed are dropped. Returns whether the page view is still live.
    fn heartbeat_for(&self, page_view_id: &str) -> bool {
        let now = self.host.now_ms();
        let mut guard = self.lock();
        let st = &mut *guard;

        let Some(current) = st.current.as_mut() else {
            return false;
        };
        if current.id() != page_view_id || st.exit.is_finalized(page_view_id) {
            tracing::trace!(page_view = page_view_id, "Dropping heartbeat for finished page view");
            return false;
        }
        match current.tick(now) {
            Some(event) => {
                self.transport.send(&event);
                true
            }
            None => false,
        }
    }
}

fn on_timer(inner: &Weak<Inner>, page_view_id: &str) -> bool {
    match inner.upgrade() {
        Some(inner) => inner.heartbeat_for(page_view_id),
        None => false,
    }
}

/// Every event carries at most one heartbeat interval of active time.
pub fn within_slice_bound(event: &Event, interval_ms: u64) -> bool {
    event.active_ms().is_none_or(|ms| ms <= interval_ms)
}
