// src/cli/simulate.rs — Replay a scripted browsing timeline
//
// Drives a `Tracker` against a `ScriptedHost` on a virtual clock. Heartbeat
// ticks fire at interval boundaries measured from each page view's start,
// exactly as a per-page-view timer would.

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use crate::infra::config::Config;
use crate::tracker::heartbeat::HeartbeatMode;
use crate::tracker::host::{Host, ScriptedHost};
use crate::tracker::transport::{Delivery, HttpSink, MemorySink};
use crate::tracker::{within_slice_bound, Tracker};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Native referrer of the first page load.
    #[serde(default)]
    pub document_referrer: Option<String>,
    /// Epoch milliseconds the virtual clock starts at.
    #[serde(default)]
    pub start_ms: u64,
    /// Pre-existing session cookie.
    #[serde(default)]
    pub session_cookie: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_origin() -> String {
    "https://example.com".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Navigate { to: String },
    Wait { ms: u64 },
    Hide,
    Show,
    PageHide,
    BeforeUnload,
    Unload,
    PageShow {
        #[serde(default)]
        persisted: bool,
    },
    Shutdown,
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

struct Simulation {
    host: Arc<ScriptedHost>,
    sink: Arc<MemorySink>,
    tracker: Tracker,
    interval_ms: u64,
    live: Option<String>,
    next_tick_at: Option<u64>,
}

impl Simulation {
    fn new(scenario: &Scenario, config: &Config) -> Self {
        let host = Arc::new(ScriptedHost::new(&scenario.origin, scenario.start_ms));
        host.set_document_referrer(scenario.document_referrer.as_deref());
        if let Some(ref sid) = scenario.session_cookie {
            host.insert_cookie(&config.session.cookie_name, sid);
        }
        let sink = Arc::new(MemorySink::new());
        let tracker = Tracker::with_mode(
            config.clone(),
            host.clone(),
            sink.clone(),
            HeartbeatMode::Manual,
        );

        Self {
            host,
            sink,
            tracker,
            interval_ms: config.heartbeat.interval_ms.max(1),
            live: None,
            next_tick_at: None,
        }
    }

    fn apply(&mut self, step: &Step) {
        match step {
            Step::Navigate { to } => self.tracker.navigate(to),
            Step::Wait { ms } => self.wait(*ms),
            Step::Hide => {
                self.host.set_visible(false);
                self.tracker.visibility_changed();
            }
            Step::Show => {
                self.host.set_visible(true);
                self.tracker.visibility_changed();
            }
            Step::PageHide => self.tracker.page_hide(),
            Step::BeforeUnload => self.tracker.before_unload(),
            Step::Unload => self.tracker.unload(),
            Step::PageShow { persisted } => self.tracker.page_show(*persisted),
            Step::Shutdown => self.tracker.shutdown(),
        }
        self.sync_timer();
    }

    /// Restart the virtual timer whenever the live page view changes.
    fn sync_timer(&mut self) {
        let live = self.tracker.current_page_view_id();
        if live != self.live {
            self.next_tick_at = live
                .as_ref()
                .map(|_| self.host.now_ms() + self.interval_ms);
            self.live = live;
        }
    }

    fn wait(&mut self, ms: u64) {
        let target = self.host.now_ms() + ms;
        while let Some(at) = self.next_tick_at.filter(|at| *at <= target) {
            self.host.advance(at.saturating_sub(self.host.now_ms()));
            self.tracker.tick();
            self.next_tick_at = Some(at + self.interval_ms);
        }
        self.host.advance(target.saturating_sub(self.host.now_ms()));
    }
}

/// Run every step and return the payloads in emission order.
pub fn replay(scenario: &Scenario, config: &Config) -> Vec<Delivery> {
    let mut sim = Simulation::new(scenario, config);
    for step in &scenario.steps {
        sim.apply(step);
    }
    sim.sink.drain()
}

/// `pagepulse simulate`
pub async fn run_simulate(path: &Path, config: &Config, send: bool) -> anyhow::Result<()> {
    let scenario = Scenario::load(path)?;
    let deliveries = replay(&scenario, config);

    let http = if send {
        Some(HttpSink::new(config.collector.timeout())?)
    } else {
        None
    };

    for delivery in &deliveries {
        println!("{}", delivery.body);

        if let Ok(event) = serde_json::from_str(&delivery.body) {
            if !within_slice_bound(&event, config.heartbeat.interval_ms) {
                tracing::warn!("Event exceeds heartbeat slice bound: {}", delivery.body);
            }
        }

        if let Some(ref http) = http {
            if let Err(e) = http.deliver(&delivery.url, delivery.body.clone()).await {
                tracing::warn!("Delivery to {} failed: {}", delivery.url, e);
            }
        }
    }

    tracing::info!(
        "Replayed {} steps, {} events",
        scenario.steps.len(),
        deliveries.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::event::Event;

    fn events(scenario: &str) -> Vec<Event> {
        let scenario: Scenario = toml::from_str(scenario).unwrap();
        replay(&scenario, &Config::default())
            .iter()
            .map(|d| serde_json::from_str(&d.body).unwrap())
            .collect()
    }

    #[test]
    fn test_parse_scenario() {
        let scenario: Scenario = toml::from_str(
            r#"
origin = "https://shop.example"
document_referrer = "https://search.example/"

[[steps]]
action = "navigate"
to = "/a"

[[steps]]
action = "wait"
ms = 1000

[[steps]]
action = "page_show"
persisted = true

[[steps]]
action = "before_unload"
"#,
        )
        .unwrap();
        assert_eq!(scenario.origin, "https://shop.example");
        assert_eq!(scenario.steps.len(), 4);
        assert_eq!(scenario.steps[0], Step::Navigate { to: "/a".into() });
        assert_eq!(scenario.steps[2], Step::PageShow { persisted: true });
        assert_eq!(scenario.steps[3], Step::BeforeUnload);
    }

    #[test]
    fn test_virtual_ticks_follow_page_view_start() {
        let events = events(
            r#"
[[steps]]
action = "navigate"
to = "/a"

[[steps]]
action = "wait"
ms = 75000

[[steps]]
action = "navigate"
to = "/b"
"#,
        );
        let summary: Vec<(&str, Option<u64>)> =
            events.iter().map(|e| (e.kind(), e.active_ms())).collect();
        assert_eq!(
            summary,
            vec![
                ("start", None),
                ("heartbeat", Some(30_000)),
                ("heartbeat", Some(30_000)),
                ("end", Some(15_000)),
                ("start", None),
            ]
        );
    }

    #[test]
    fn test_existing_cookie_is_reused() {
        let events = events(
            r#"
session_cookie = "returning-visitor"

[[steps]]
action = "navigate"
to = "/"
"#,
        );
        match &events[0] {
            Event::Start(start) => assert_eq!(start.session_id, "returning-visitor"),
            other => panic!("expected start, got {other:?}"),
        }
    }

    #[test]
    fn test_payload_urls_point_at_collector() {
        let scenario: Scenario = toml::from_str(
            "origin = \"http://localhost:3000\"\n[[steps]]\naction = \"navigate\"\nto = \"/\"\n",
        )
        .unwrap();
        let deliveries = replay(&scenario, &Config::default());
        assert_eq!(deliveries[0].url, "http://localhost:3000/api/metrics/v2/events");
    }
}
