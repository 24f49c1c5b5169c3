//! Trial timing for the validator progress bar (feature `progress`).
//!
//! * [`IterTimer`] – per-trial durations smoothed with an exponential moving average,
//!   `ema ← α·dt + (1–α)·ema`, so the bar shows a stable throughput even though small
//!   subsamples fit much faster than large ones.
//! * [`fmt_dur`] – compact human-readable durations (`"253µs"`, `"42ms"`, `"3.14s"`).
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Smoothed duration of the trials seen so far.
pub(crate) struct IterTimer {
    last: Instant,
    alpha: f64,
    /// `None` until the first tick
    ema_secs: Option<f64>,
}

impl IterTimer {
    pub(crate) fn new(alpha: f64) -> Self {
        Self {
            last: Instant::now(),
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            ema_secs: None,
        }
    }

    /// Close the current trial and fold its duration into the average.
    pub(crate) fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now - self.last;
        self.last = now;

        let secs = dt.as_secs_f64();
        self.ema_secs = Some(match self.ema_secs {
            Some(ema) => self.alpha * secs + (1.0 - self.alpha) * ema,
            None => secs,
        });
        dt
    }

    pub(crate) fn avg(&self) -> Duration {
        self.ema_secs
            .map_or(Duration::ZERO, Duration::from_secs_f64)
    }
}

pub(crate) fn fmt_dur(d: Duration) -> String {
    match d.as_micros() {
        us if us < 1_000 => format!("{us}µs"),
        us if us < 1_000_000 => format!("{}ms", us / 1_000),
        _ => format!("{:.2}s", d.as_secs_f64()),
    }
}

/// Progress bar over the total number of resampling trials.
pub(crate) fn trial_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total.max(1));
    if let Ok(style) = ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} trials ({percent:>3}%) | ETA {eta_precise} | {msg}",
    ) {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

#[cfg(test)]
mod progress_bar_test {
    use super::*;

    #[test]
    fn test_fmt_dur() {
        assert_eq!(fmt_dur(Duration::from_micros(253)), "253µs");
        assert_eq!(fmt_dur(Duration::from_millis(42)), "42ms");
        assert_eq!(fmt_dur(Duration::from_millis(3140)), "3.14s");
    }

    #[test]
    fn test_timer_first_tick_sets_average() {
        let mut timer = IterTimer::new(0.2);
        assert_eq!(timer.avg(), Duration::ZERO);
        let dt = timer.tick();
        let avg = timer.avg();
        assert!((avg.as_secs_f64() - dt.as_secs_f64()).abs() < 1e-9);
    }
}
