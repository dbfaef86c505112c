// src/tracker/heartbeat.rs — Recurring heartbeat timer
//
// One timer per page view. The handle owns the task and aborts it on drop,
// so replacing a page view's handle is enough to cancel its timer.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Who drives heartbeat ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeartbeatMode {
    /// A tokio interval per page view.
    #[default]
    Timer,
    /// The owner calls `Tracker::tick` itself.
    Manual,
}

pub struct HeartbeatHandle {
    task: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    /// A handle with no timer behind it.
    pub fn inert() -> Self {
        Self { task: None }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Call `on_tick` every `period`, first one `period` from now. The loop ends
/// when `on_tick` returns `false` or the handle is dropped. Outside a tokio
/// runtime nothing is scheduled and the returned handle is inert.
///
/// A timer that falls behind (suspended process, frozen tab) fires once on
/// resume rather than in a burst.
pub fn spawn<F>(period: Duration, mut on_tick: F) -> HeartbeatHandle
where
    F: FnMut() -> bool + Send + 'static,
{
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::debug!("No async runtime, heartbeat timer not started");
        return HeartbeatHandle::inert();
    };

    let period = period.max(Duration::from_millis(1));
    let task = runtime.spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !on_tick() {
                break;
            }
        }
    });

    HeartbeatHandle { task: Some(task) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _handle = spawn(Duration::from_secs(30), move || {
            c.fetch_add(1, Ordering::SeqCst);
            true
        });

        advance(29).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        advance(2).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        advance(30).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = spawn(Duration::from_secs(30), move || {
            c.fetch_add(1, Ordering::SeqCst);
            true
        });
        assert!(handle.is_running());

        drop(handle);
        advance(120).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returning_false_stops_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = spawn(Duration::from_secs(10), move || {
            c.fetch_add(1, Ordering::SeqCst);
            false
        });

        advance(60).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!handle.is_running());
    }

    #[test]
    fn test_inert_outside_runtime() {
        let handle = spawn(Duration::from_secs(1), || true);
        assert!(!handle.is_running());
    }
}
