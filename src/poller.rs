use crate::config::SyncConfig;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

/// Timing of a polling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between probes. The first probe runs one interval after start.
    pub interval: Duration,
    /// Fixed deadline measured from session start; never extended by ticks.
    pub timeout: Duration,
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl From<&SyncConfig> for PollConfig {
    fn from(config: &SyncConfig) -> Self {
        Self::new(config.poll_interval, config.convergence_timeout)
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Converged { ticks: u32 },
    TimedOut { ticks: u32 },
    Cancelled { ticks: u32 },
}

impl PollOutcome {
    pub fn ticks(self) -> u32 {
        match self {
            PollOutcome::Converged { ticks }
            | PollOutcome::TimedOut { ticks }
            | PollOutcome::Cancelled { ticks } => ticks,
        }
    }
}

/// Owner side of a session's cancellation token.
#[derive(Debug)]
pub struct CancelHandle(oneshot::Sender<()>);

impl CancelHandle {
    pub fn cancel(self) {
        let _ = self.0.send(());
    }
}

/// Session side of a cancellation token.
#[derive(Debug)]
pub struct CancelToken(oneshot::Receiver<()>);

/// Create a linked cancellation pair.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = oneshot::channel();
    (CancelHandle(tx), CancelToken(rx))
}

/// Run one polling session.
///
/// Returns exactly one [`PollOutcome`]. Dropping or cancelling the session's
/// [`CancelHandle`] ends it at its next scheduling point without probing again.
///
/// `probe` is called once per tick and must not block; ticks never overlap.
/// Cancellation wins over the deadline, and the deadline wins over a tick
/// that falls due at the same instant.
pub async fn poll_until<P>(config: PollConfig, mut probe: P, cancel: CancelToken) -> PollOutcome
where
    P: FnMut() -> bool,
{
    let start = Instant::now();
    let deadline = sleep_until(start + config.timeout);
    tokio::pin!(deadline);

    let mut ticker = interval_at(start + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut cancel = cancel.0;
    let mut ticks = 0;

    loop {
        tokio::select! {
            biased;
            _ = &mut cancel => return PollOutcome::Cancelled { ticks },
            _ = &mut deadline => return PollOutcome::TimedOut { ticks },
            _ = ticker.tick() => {
                ticks += 1;
                if probe() {
                    return PollOutcome::Converged { ticks };
                }
            }
        }
    }
}
