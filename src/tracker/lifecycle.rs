// src/tracker/lifecycle.rs — State machine for a single page view
//
// ```text
// start ──► Active ◄──── visible ────┐
//             │ tick: heartbeat(slice) │
//             ├──── hidden ──► Hidden ─┘   (flush heartbeat on entry)
//             │                  │ tick: heartbeat(0)
//             └── terminate ─────┴──► Ended (one end event, then inert)
// ```
//
// Active time is reported in slices: each heartbeat or end carries the time
// since the previous beat, capped at the heartbeat interval.

use crate::infra::config::MAX_HEARTBEAT_INTERVAL_MS;
use crate::tracker::event::{EndEvent, Event, ExitType, HeartbeatEvent, StartEvent};
use crate::tracker::referrer::Location;
use crate::tracker::session::random_id;
use crate::tracker::utm::UtmParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageViewState {
    /// Visible; the heartbeat clock is running.
    Active,
    /// Backgrounded; nothing is counted.
    Hidden,
    /// Terminal. No further events for this page view.
    Ended,
}

/// Identity and timestamps of one page view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    pub page_view_id: String,
    pub session_id: String,
    pub location: Location,
    /// Absolute URL, recorded as the next page view's referrer.
    pub url: String,
    pub started_at: u64,
    pub last_beat_at: u64,
}

/// Everything needed to open a page view.
#[derive(Debug, Clone)]
pub struct StartParams<'a> {
    pub session_id: String,
    pub location: Location,
    pub origin: &'a str,
    pub referrer: Option<String>,
    pub now_ms: u64,
    pub visible: bool,
    pub interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PageViewSession {
    view: PageView,
    state: PageViewState,
    interval_ms: u64,
}

impl PageViewSession {
    /// Open a page view and produce its `start` event. UTM parameters are
    /// read here and nowhere else.
    pub fn start(params: StartParams<'_>) -> (Self, Event) {
        let utm = UtmParams::from_query(&params.location.query);
        let view = PageView {
            page_view_id: random_id(),
            session_id: params.session_id,
            url: params.location.full_url(params.origin),
            location: params.location,
            started_at: params.now_ms,
            last_beat_at: params.now_ms,
        };

        let event = Event::Start(StartEvent {
            session_id: view.session_id.clone(),
            page_view_id: view.page_view_id.clone(),
            path: view.location.path.clone(),
            referrer: params.referrer,
            utm_source: utm.source,
            utm_medium: utm.medium,
            utm_campaign: utm.campaign,
        });

        let state = if params.visible {
            PageViewState::Active
        } else {
            PageViewState::Hidden
        };

        let session = Self {
            view,
            state,
            interval_ms: params.interval_ms.clamp(1, MAX_HEARTBEAT_INTERVAL_MS),
        };
        (session, event)
    }

    pub fn id(&self) -> &str {
        &self.view.page_view_id
    }

    pub fn view(&self) -> &PageView {
        &self.view
    }

    pub fn location(&self) -> &Location {
        &self.view.location
    }

    pub fn url(&self) -> &str {
        &self.view.url
    }

    pub fn state(&self) -> PageViewState {
        self.state
    }

    pub fn is_ended(&self) -> bool {
        self.state == PageViewState::Ended
    }

    /// Heartbeat timer fired. Hidden page views report a zero slice and keep
    /// their clock where it is.
    pub fn tick(&mut self, now_ms: u64) -> Option<Event> {
        let active_ms = match self.state {
            PageViewState::Ended => return None,
            PageViewState::Hidden => 0,
            PageViewState::Active => self.take_slice(now_ms),
        };
        Some(self.heartbeat(active_ms))
    }

    /// Apply a visibility change. Hiding flushes the running slice as a
    /// heartbeat; showing restarts the clock so hidden time is never counted.
    pub fn set_visible(&mut self, visible: bool, now_ms: u64) -> Option<Event> {
        match (self.state, visible) {
            (PageViewState::Active, false) => {
                let active_ms = self.take_slice(now_ms);
                self.state = PageViewState::Hidden;
                Some(self.heartbeat(active_ms))
            }
            (PageViewState::Hidden, true) => {
                self.view.last_beat_at = now_ms;
                self.state = PageViewState::Active;
                None
            }
            _ => None,
        }
    }

    /// Close the page view. Only the first call produces an event.
    pub fn terminate(&mut self, exit_type: ExitType, now_ms: u64) -> Option<Event> {
        let active_ms = match self.state {
            PageViewState::Ended => return None,
            PageViewState::Hidden => 0,
            PageViewState::Active => self.take_slice(now_ms),
        };
        self.state = PageViewState::Ended;

        Some(Event::End(EndEvent {
            session_id: self.view.session_id.clone(),
            page_view_id: self.view.page_view_id.clone(),
            path: self.view.location.path.clone(),
            active_ms,
            exit_type,
        }))
    }

    fn take_slice(&mut self, now_ms: u64) -> u64 {
        let slice = now_ms
            .saturating_sub(self.view.last_beat_at)
            .min(self.interval_ms);
        self.view.last_beat_at = now_ms.max(self.view.last_beat_at);
        slice
    }

    fn heartbeat(&self, active_ms: u64) -> Event {
        Event::Heartbeat(HeartbeatEvent {
            session_id: self.view.session_id.clone(),
            page_view_id: self.view.page_view_id.clone(),
            path: self.view.location.path.clone(),
            active_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const INTERVAL: u64 = 30_000;

    fn open(target: &str, now_ms: u64, visible: bool) -> (PageViewSession, Event) {
        PageViewSession::start(StartParams {
            session_id: "sid".into(),
            location: Location::parse(target),
            origin: "https://example.com",
            referrer: None,
            now_ms,
            visible,
            interval_ms: INTERVAL,
        })
    }

    #[test]
    fn test_start_event_carries_utm_and_path() {
        let (pv, event) = open("/landing?utm_source=ads&utm_medium=cpc", 0, true);
        match event {
            Event::Start(start) => {
                assert_eq!(start.path, "/landing");
                assert_eq!(start.page_view_id, pv.id());
                assert_eq!(start.utm_source.as_deref(), Some("ads"));
                assert_eq!(start.utm_medium.as_deref(), Some("cpc"));
                assert_eq!(start.utm_campaign, None);
            }
            other => panic!("expected start, got {other:?}"),
        }
        assert_eq!(pv.state(), PageViewState::Active);
        assert_eq!(pv.url(), "https://example.com/landing?utm_source=ads&utm_medium=cpc");
    }

    #[test]
    fn test_starts_hidden_when_document_hidden() {
        let (pv, _) = open("/", 0, false);
        assert_eq!(pv.state(), PageViewState::Hidden);
    }

    #[test]
    fn test_page_view_ids_are_fresh() {
        let (a, _) = open("/", 0, true);
        let (b, _) = open("/", 0, true);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_tick_reports_elapsed_slice() {
        let (mut pv, _) = open("/", 1_000, true);
        let event = pv.tick(31_000).unwrap();
        assert_eq!(event.active_ms(), Some(30_000));
        assert_eq!(pv.view().last_beat_at, 31_000);
    }

    #[test]
    fn test_late_tick_is_clamped() {
        let (mut pv, _) = open("/", 0, true);
        // Tab frozen for five minutes.
        let event = pv.tick(300_000).unwrap();
        assert_eq!(event.active_ms(), Some(INTERVAL));
    }

    #[test]
    fn test_clock_going_backwards_reports_zero() {
        let (mut pv, _) = open("/", 10_000, true);
        assert_eq!(pv.tick(5_000).unwrap().active_ms(), Some(0));
        assert_eq!(pv.view().last_beat_at, 10_000);
    }

    #[test]
    fn test_hide_flushes_heartbeat() {
        let (mut pv, _) = open("/", 0, true);
        let event = pv.set_visible(false, 12_000).unwrap();
        assert_eq!(event.kind(), "heartbeat");
        assert_eq!(event.active_ms(), Some(12_000));
        assert_eq!(pv.state(), PageViewState::Hidden);
    }

    #[test]
    fn test_tick_while_hidden_reports_zero() {
        let (mut pv, _) = open("/", 0, true);
        pv.set_visible(false, 0);
        assert_eq!(pv.tick(30_000).unwrap().active_ms(), Some(0));
        assert_eq!(pv.tick(60_000).unwrap().active_ms(), Some(0));
    }

    #[test]
    fn test_show_resets_clock() {
        let (mut pv, _) = open("/", 0, true);
        pv.set_visible(false, 10_000);
        assert!(pv.set_visible(true, 30_000).is_none());
        assert_eq!(pv.state(), PageViewState::Active);
        let end = pv.terminate(ExitType::Navigate, 40_000).unwrap();
        assert_eq!(end.active_ms(), Some(10_000));
    }

    #[test]
    fn test_redundant_visibility_changes_are_ignored() {
        let (mut pv, _) = open("/", 0, true);
        assert!(pv.set_visible(true, 5_000).is_none());
        assert_eq!(pv.view().last_beat_at, 0);
        pv.set_visible(false, 5_000);
        assert!(pv.set_visible(false, 6_000).is_none());
    }

    #[test]
    fn test_terminate_once() {
        let (mut pv, _) = open("/a", 0, true);
        let end = pv.terminate(ExitType::Pagehide, 2_500).unwrap();
        assert_eq!(
            end,
            Event::End(EndEvent {
                session_id: "sid".into(),
                page_view_id: pv.id().to_string(),
                path: "/a".into(),
                active_ms: 2_500,
                exit_type: ExitType::Pagehide,
            })
        );
        assert!(pv.is_ended());
        assert!(pv.terminate(ExitType::Unload, 3_000).is_none());
        assert!(pv.tick(30_000).is_none());
        assert!(pv.set_visible(false, 30_000).is_none());
    }

    #[test]
    fn test_terminate_while_hidden_reports_zero() {
        let (mut pv, _) = open("/", 0, true);
        pv.set_visible(false, 8_000);
        let end = pv.terminate(ExitType::Unload, 20_000).unwrap();
        assert_eq!(end.active_ms(), Some(0));
    }

    #[test]
    fn test_terminate_clamped_to_interval() {
        let (mut pv, _) = open("/", 0, true);
        let end = pv.terminate(ExitType::End, 90_000).unwrap();
        assert_eq!(end.active_ms(), Some(INTERVAL));
    }

    #[test]
    fn test_long_interval_still_capped_at_ceiling() {
        let (mut pv, _) = PageViewSession::start(StartParams {
            session_id: "sid".into(),
            location: Location::parse("/"),
            origin: "https://example.com",
            referrer: None,
            now_ms: 0,
            visible: true,
            interval_ms: 120_000,
        });
        assert_eq!(pv.tick(100_000).unwrap().active_ms(), Some(MAX_HEARTBEAT_INTERVAL_MS));
        let end = pv.terminate(ExitType::Navigate, 200_000).unwrap();
        assert_eq!(end.active_ms(), Some(MAX_HEARTBEAT_INTERVAL_MS));
    }
}
