//! Health watchdog: probe on staleness, escalate on silence.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::health::HealthMonitor;

/// Watchdog timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Check period.
    pub interval: Duration,
    /// Staleness that triggers a probe.
    pub timeout: Duration,
    /// How long a probe may go unanswered.
    pub probe_grace: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(45),
            probe_grace: Duration::from_secs(5),
        }
    }
}

/// Request from a watchdog run to the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchdogAction {
    /// Send a manual `ping`.
    Probe,
    /// Tear down and reconnect.
    Reconnect,
}

/// A [`WatchdogAction`] tagged with the run that raised it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchdogSignal {
    /// Run id given to [`run_watchdog`].
    pub run: u64,
    /// Requested action.
    pub action: WatchdogAction,
}

/// How a watchdog run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// A probe went unanswered and a reconnect was requested.
    Escalated,
    /// Stopped from outside.
    Cancelled,
}

/// Watch `health` until cancelled or escalated.
///
/// Every `interval` the staleness of the sample is compared with `timeout`.
/// When stale, a [`WatchdogAction::Probe`] is sent and the run waits
/// `probe_grace`; if no newer signal arrived by then a single
/// [`WatchdogAction::Reconnect`] is sent and the run ends. The watchdog only
/// reads the sample.
pub async fn run_watchdog(
    run: u64,
    health: HealthMonitor,
    config: WatchdogConfig,
    signals: mpsc::UnboundedSender<WatchdogSignal>,
    cancel: CancellationToken,
) -> WatchdogOutcome {
    let mut ticker = time::interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = cancel.cancelled() => return WatchdogOutcome::Cancelled,
        }

        let before = health.snapshot();
        let Some(staleness) = before.staleness(Instant::now()) else {
            continue;
        };
        if staleness <= config.timeout {
            continue;
        }

        debug!(run, staleness_ms = staleness.as_millis(), "connection stale, probing");
        if signals
            .send(WatchdogSignal {
                run,
                action: WatchdogAction::Probe,
            })
            .is_err()
        {
            return WatchdogOutcome::Cancelled;
        }

        tokio::select! {
            () = time::sleep(config.probe_grace) => {}
            () = cancel.cancelled() => return WatchdogOutcome::Cancelled,
        }

        if health.snapshot().last_signal() > before.last_signal() {
            debug!(run, "probe answered");
            ticker.reset();
            continue;
        }

        warn!(run, grace_ms = config.probe_grace.as_millis(), "probe unanswered, forcing reconnect");
        let _ = signals.send(WatchdogSignal {
            run,
            action: WatchdogAction::Reconnect,
        });
        return WatchdogOutcome::Escalated;
    }
}
