//! Poll loop - drives the presence tracker at a fixed interval
//!
//! One cycle: fetch latest position -> tracker -> enqueue notification.
//! Cycles never overlap. Any per-cycle failure is logged and the loop keeps
//! going; only the shutdown signal ends it.

use crate::domain::geofence::{evaluate, GeofenceError};
use crate::domain::types::{PresenceState, Transition, TransitionEvent};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::notifier::{format_timestamp, Notification};
use crate::io::position_source::PositionSource;
use crate::services::notify_worker::NotifySender;
use crate::services::presence::{Observation, PresenceTracker};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::UtcOffset;
use tokio::sync::watch;
use tracing::{info, warn};

/// What happened during one poll cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Source reachable, device has no position yet
    NoData,
    /// Query or transport failure
    SourceError,
    /// Source returned coordinates the evaluator rejected
    InvalidSample,
    /// Same or older row than the last processed one
    Stale,
    /// New sample, presence unchanged
    Unchanged { distance_m: f64, state: PresenceState },
    /// New sample caused a presence change
    Transition(Transition),
}

pub struct PollLoop {
    source: Arc<dyn PositionSource>,
    tracker: PresenceTracker,
    notify_tx: NotifySender,
    metrics: Arc<Metrics>,
    device_id: String,
    device_label: String,
    display_offset: UtcOffset,
    notify_initial_away: bool,
    interval: Duration,
    report_every_cycles: u64,
}

impl PollLoop {
    pub fn new(
        config: &Config,
        source: Arc<dyn PositionSource>,
        notify_tx: NotifySender,
        metrics: Arc<Metrics>,
    ) -> Result<Self, GeofenceError> {
        let tracker = PresenceTracker::with_hysteresis(*config.zone(), config.hysteresis_m())?;
        Ok(Self {
            source,
            tracker,
            notify_tx,
            metrics,
            device_id: config.device_id().to_string(),
            device_label: config.device_label().to_string(),
            display_offset: config.display_offset(),
            notify_initial_away: config.notify_initial_away(),
            interval: config.poll_interval(),
            report_every_cycles: config.report_every_cycles(),
        })
    }

    pub fn tracker(&self) -> &PresenceTracker {
        &self.tracker
    }

    /// Whether an event should produce a notification
    fn should_notify(&self, event: TransitionEvent) -> bool {
        match event {
            TransitionEvent::InitialAway => self.notify_initial_away,
            TransitionEvent::InitialHome | TransitionEvent::LeftHome | TransitionEvent::BackHome => {
                true
            }
        }
    }

    /// Run a single fetch-evaluate-notify cycle
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.metrics.record_cycle();

        let fetch_start = Instant::now();
        let fetched = self.source.fetch_latest(&self.device_id).await;
        self.metrics.record_fetch(fetch_start.elapsed().as_millis() as u64);

        let sample = match fetched {
            Ok(Some(sample)) => sample,
            Ok(None) => {
                self.metrics.record_no_data();
                warn!(device_id = %self.device_id, "no_position_yet");
                return CycleOutcome::NoData;
            }
            Err(e) => {
                self.metrics.record_source_error();
                warn!(device_id = %self.device_id, error = %e, "position_query_failed");
                return CycleOutcome::SourceError;
            }
        };
        self.metrics.record_sample();

        let observation = match self.tracker.observe(&sample) {
            Ok(observation) => observation,
            Err(e) => {
                self.metrics.record_invalid_sample();
                warn!(
                    device_id = %self.device_id,
                    timestamp_ms = %sample.timestamp_ms,
                    error = %e,
                    "position_sample_rejected"
                );
                return CycleOutcome::InvalidSample;
            }
        };

        match observation {
            Observation::Stale { timestamp_ms, .. } => {
                // Tracker skips validation for rows it already processed
                let distance_m = match evaluate(&sample, self.tracker.zone()) {
                    Ok(evaluation) => evaluation.distance_m,
                    Err(e) => {
                        self.metrics.record_invalid_sample();
                        warn!(
                            device_id = %self.device_id,
                            timestamp_ms = %timestamp_ms,
                            error = %e,
                            "position_sample_rejected"
                        );
                        return CycleOutcome::InvalidSample;
                    }
                };
                self.metrics.record_stale_sample();
                self.log_cycle(timestamp_ms, distance_m, self.tracker.state(), false);
                CycleOutcome::Stale
            }
            Observation::Evaluated { evaluation, state, transition } => {
                self.log_cycle(sample.timestamp_ms, evaluation.distance_m, state, true);

                match transition {
                    Some(t) => {
                        self.metrics.record_transition();
                        self.dispatch(&t);
                        CycleOutcome::Transition(t)
                    }
                    None => CycleOutcome::Unchanged { distance_m: evaluation.distance_m, state },
                }
            }
        }
    }

    /// The per-cycle status line, emitted for every cycle that saw a sample
    fn log_cycle(&self, timestamp_ms: i64, distance_m: f64, state: PresenceState, new_sample: bool) {
        info!(
            sample_time = %format_timestamp(timestamp_ms, self.display_offset),
            dist = %(distance_m as i64),
            in_home = %(state == PresenceState::Home),
            new_sample = %new_sample,
            "poll_cycle"
        );
    }

    fn dispatch(&self, transition: &Transition) {
        if !self.should_notify(transition.event) {
            info!(event = %transition.event, "notification_suppressed");
            return;
        }
        let notification =
            Notification::for_transition(transition, &self.device_label, self.display_offset);
        self.notify_tx.enqueue(notification);
    }

    /// Run cycles until the shutdown flag flips to true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            device_id = %self.device_id,
            interval_secs = %self.interval.as_secs(),
            "poll_loop_started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_cycle().await;

            if self.report_every_cycles > 0 && self.metrics.cycles() % self.report_every_cycles == 0 {
                self.metrics.report().log();
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    // Sender gone also means stop
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(device_id = %self.device_id, state = %self.tracker.state(), "poll_loop_stopped");
    }
}
