//! Round-trip measurement and clock-offset estimation.
//!
//! On connect a short burst of pings seeds the offset with the mean of `rtt / 2`; after that
//! one ping per interval folds into the offset with exponential smoothing. The estimator is a
//! scheduled task polled from the frame loop: [`LatencyEstimator::start`] arms it and
//! [`LatencyEstimator::stop`] cancels it, including any ping still in flight.

use crate::transport::Transport;
use log::{debug, warn};
use shared::{AckId, ClientEvent};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyConfig {
    pub burst_samples: u32,
    pub burst_spacing: Duration,
    pub interval: Duration,
    /// Weight given to a new sample; the running offset keeps `1 - smoothing`.
    pub smoothing: f64,
    /// An unanswered ping older than this is abandoned.
    pub timeout: Duration,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            burst_samples: 5,
            burst_spacing: Duration::from_millis(200),
            interval: Duration::from_millis(2000),
            smoothing: 0.2,
            timeout: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Burst { collected: u32, half_rtt_total_ms: f64 },
    Periodic,
}

#[derive(Debug)]
pub struct LatencyEstimator {
    config: LatencyConfig,
    phase: Phase,
    next_due: Option<Instant>,
    in_flight: Option<(AckId, Instant)>,
    ping_ms: Option<u64>,
    clock_offset_ms: f64,
}

impl LatencyEstimator {
    pub fn new(config: LatencyConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            next_due: None,
            in_flight: None,
            ping_ms: None,
            clock_offset_ms: 0.0,
        }
    }

    /// Arms the connect-time burst; the first ping goes out on the next poll.
    pub fn start(&mut self, now: Instant) {
        self.phase = Phase::Burst {
            collected: 0,
            half_rtt_total_ms: 0.0,
        };
        self.next_due = Some(now);
        self.in_flight = None;
    }

    pub fn stop(&mut self) {
        self.phase = Phase::Idle;
        self.next_due = None;
        self.in_flight = None;
        self.ping_ms = None;
    }

    pub fn is_running(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn in_burst(&self) -> bool {
        matches!(self.phase, Phase::Burst { .. })
    }

    /// Sends a ping if one is due. Returns its ack id so the caller can route the reply.
    pub fn poll<T: Transport + ?Sized>(&mut self, now: Instant, transport: &mut T) -> Option<AckId> {
        if let Some((id, sent_at)) = self.in_flight {
            if now.saturating_duration_since(sent_at) < self.config.timeout {
                return None;
            }
            debug!("Ping {} timed out", id);
            self.in_flight = None;
            self.next_due = Some(now);
        }

        let due = self.next_due?;
        if now < due {
            return None;
        }

        if !transport.is_connected() {
            self.next_due = Some(now + self.retry_delay());
            return None;
        }

        match transport.call(ClientEvent::Ping {}) {
            Ok(id) => {
                self.in_flight = Some((id, now));
                self.next_due = None;
                Some(id)
            }
            Err(e) => {
                warn!("Failed to send ping: {}", e);
                self.next_due = Some(now + self.retry_delay());
                None
            }
        }
    }

    /// Folds the reply to ping `id` into the estimate. Replies that do not match the ping in
    /// flight are ignored.
    pub fn on_pong(&mut self, id: AckId, now: Instant) -> Option<Duration> {
        match self.in_flight {
            Some((expected, _)) if expected == id => {}
            _ => return None,
        }
        let (_, sent_at) = self.in_flight.take()?;

        let rtt = now.saturating_duration_since(sent_at);
        let rtt_ms = rtt.as_secs_f64() * 1000.0;
        let half_rtt_ms = rtt_ms / 2.0;
        self.ping_ms = Some(rtt_ms.round() as u64);

        match self.phase {
            Phase::Burst {
                collected,
                half_rtt_total_ms,
            } => {
                let collected = collected + 1;
                let half_rtt_total_ms = half_rtt_total_ms + half_rtt_ms;

                if collected >= self.config.burst_samples {
                    self.clock_offset_ms = half_rtt_total_ms / f64::from(collected);
                    self.phase = Phase::Periodic;
                    self.next_due = Some(now + self.config.interval);
                    debug!(
                        "Latency burst done: offset {:.1}ms over {} samples",
                        self.clock_offset_ms, collected
                    );
                } else {
                    self.phase = Phase::Burst {
                        collected,
                        half_rtt_total_ms,
                    };
                    self.next_due = Some(now + self.config.burst_spacing);
                }
            }
            Phase::Periodic => {
                let weight = self.config.smoothing;
                self.clock_offset_ms = self.clock_offset_ms * (1.0 - weight) + half_rtt_ms * weight;
                self.next_due = Some(now + self.config.interval);
            }
            Phase::Idle => {}
        }

        Some(rtt)
    }

    /// Last measured round trip, in whole milliseconds.
    pub fn ping_ms(&self) -> Option<u64> {
        self.ping_ms
    }

    pub fn clock_offset_ms(&self) -> f64 {
        self.clock_offset_ms
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    fn retry_delay(&self) -> Duration {
        match self.phase {
            Phase::Burst { .. } => self.config.burst_spacing,
            _ => self.config.interval,
        }
    }
}
