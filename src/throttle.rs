use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub const MIN_UTILIZATION: f64 = 0.05;
pub const MAX_UTILIZATION: f64 = 0.95;

fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Sliding-window rate limiter: at most `rate` calls within any
/// `window`-second interval. The open variant never slows anything and is
/// used for ancillary status probes that must not be rate limited.
#[derive(Debug, Clone)]
pub enum Throttle {
    Sliding {
        window: f64,
        ready_times: VecDeque<f64>,
    },
    Open,
}

impl Throttle {
    pub fn sliding(rate: usize, window: f64) -> Self {
        // A queue slot per rate unit, initialized to "always ready".
        let ready_times = vec![0.0; rate.max(1)].into();
        Throttle::Sliding {
            window,
            ready_times,
        }
    }

    pub fn open() -> Self {
        Throttle::Open
    }

    /// Build a throttle from a remote service's advertised rate limit and
    /// reset window, scaled by a utilization factor. Factors outside
    /// [0.05, 0.95] are clamped with a warning.
    pub fn calibrated(rate: u32, window: f64, utilization_factor: f64, purpose: &str) -> Self {
        let factor = if (MIN_UTILIZATION..=MAX_UTILIZATION).contains(&utilization_factor) {
            utilization_factor
        } else {
            warn!(
                purpose,
                rate,
                window,
                utilization_factor,
                "utilization factor must be between {MIN_UTILIZATION:.2} and {MAX_UTILIZATION:.2}; clamping"
            );
            utilization_factor.clamp(MIN_UTILIZATION, MAX_UTILIZATION)
        };
        let allocated_rate = ((rate as f64 * factor).round() as usize).max(1);
        debug!(purpose, rate = allocated_rate, window, "calibrated throttle");
        Throttle::sliding(allocated_rate, window)
    }

    /// Whether another call may proceed at `now` (epoch seconds).
    pub fn is_ready(&self, now: f64) -> bool {
        match self {
            Throttle::Sliding { ready_times, .. } => {
                ready_times.front().map_or(true, |next| now >= *next)
            }
            Throttle::Open => true,
        }
    }

    /// Record a call at `now`: the oldest slot is consumed and becomes ready
    /// again one window later.
    pub fn record(&mut self, now: f64) {
        if let Throttle::Sliding {
            window,
            ready_times,
        } = self
        {
            ready_times.pop_front();
            ready_times.push_back(now + *window);
        }
    }

    /// Block until the throttle is ready, then record the call.
    pub async fn throttle(&mut self) {
        loop {
            let now = epoch_seconds();
            if self.is_ready(now) {
                self.record(now);
                return;
            }
            if let Throttle::Sliding { ready_times, .. } = &*self {
                if let Some(next) = ready_times.front() {
                    tokio::time::sleep(Duration::from_secs_f64(next - now)).await;
                }
            }
        }
    }
}
