//! Retransmission timer on the tokio clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::core::RetransmitTimer;
use crate::fsm::{Event, EventRegistry};

#[derive(Debug, Default)]
struct TimerState {
    /// Bumped on every start/stop; a countdown only fires if it still matches.
    generation: AtomicU64,
    running: AtomicBool,
}

/// Single-shot timer raising [`Event::Timeout`] on expiry.
///
/// Each `start` spawns one countdown task on the runtime the timer was
/// created in. `stop` aborts it; a timeout that already fired stays raised.
#[derive(Debug)]
pub struct TokioTimer {
    duration: Duration,
    registry: Arc<EventRegistry>,
    runtime: Handle,
    state: Arc<TimerState>,
    task: Option<JoinHandle<()>>,
}

impl TokioTimer {
    /// Create a stopped timer.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(duration: Duration, registry: Arc<EventRegistry>) -> Self {
        Self::with_handle(duration, registry, Handle::current())
    }

    /// Create a stopped timer bound to a specific runtime.
    pub fn with_handle(duration: Duration, registry: Arc<EventRegistry>, runtime: Handle) -> Self {
        Self {
            duration,
            registry,
            runtime,
            state: Arc::new(TimerState::default()),
            task: None,
        }
    }

    /// Countdown duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    fn cancel(&mut self) -> u64 {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.state.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl RetransmitTimer for TokioTimer {
    fn start(&mut self) {
        let generation = self.cancel();
        self.state.running.store(true, Ordering::Release);

        let state = Arc::clone(&self.state);
        let registry = Arc::clone(&self.registry);
        let duration = self.duration;
        self.task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            if state.generation.load(Ordering::Acquire) == generation {
                state.running.store(false, Ordering::Release);
                registry.set(Event::Timeout);
            }
        }));
    }

    fn stop(&mut self) {
        self.cancel();
        self.state.running.store(false, Ordering::Release);
    }

    fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn test_fires_once() {
        let registry = Arc::new(EventRegistry::new());
        let mut timer = TokioTimer::new(TIMEOUT, registry.clone());

        timer.start();
        assert!(timer.is_running());
        tokio::time::sleep(TIMEOUT / 2).await;
        assert!(!registry.check(Event::Timeout));

        tokio::time::sleep(TIMEOUT).await;
        assert!(registry.check(Event::Timeout));
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_timeout() {
        let registry = Arc::new(EventRegistry::new());
        let mut timer = TokioTimer::new(TIMEOUT, registry.clone());

        timer.start();
        tokio::time::sleep(TIMEOUT / 2).await;
        timer.stop();
        assert!(!timer.is_running());

        tokio::time::sleep(TIMEOUT * 2).await;
        assert!(!registry.check(Event::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_extends_deadline() {
        let registry = Arc::new(EventRegistry::new());
        let mut timer = TokioTimer::new(TIMEOUT, registry.clone());

        timer.start();
        tokio::time::sleep(TIMEOUT * 3 / 4).await;
        timer.start();
        tokio::time::sleep(TIMEOUT * 3 / 4).await;
        assert!(!registry.check(Event::Timeout));
        assert!(timer.is_running());

        tokio::time::sleep(TIMEOUT).await;
        assert!(registry.check(Event::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_does_not_retract_fired_timeout() {
        let registry = Arc::new(EventRegistry::new());
        let mut timer = TokioTimer::new(TIMEOUT, registry.clone());

        timer.start();
        tokio::time::sleep(TIMEOUT * 2).await;
        timer.stop();
        assert!(registry.check(Event::Timeout));
    }
}
