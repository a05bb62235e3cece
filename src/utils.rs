//! Small shared helpers: phase math and log rate-limiting.

use std::time::{Duration, Instant};

// -------------------------------------------------------------------------------------------------

/// Asserts that two float expressions are equal within the given epsilon.
macro_rules! assert_eq_with_epsilon {
    ($x:expr, $y:expr, $d:expr) => {
        let (x, y) = ($x, $y);
        if (x - y).abs() > $d {
            panic!("assertion failed: {} != {} (epsilon {})", x, y, $d);
        }
    };
}
pub(crate) use assert_eq_with_epsilon;

// -------------------------------------------------------------------------------------------------

/// Wraps an arbitrary phase value into the radial unit range `[0, 1)`.
///
/// All periodic quantities in the engine (angles, wave positions, hue offsets) are phases in
/// `[0, 1)`; nothing downstream ever works in radians or degrees.
#[inline]
pub fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase - phase.floor();
    // phase.floor() of e.g. -1e-18 rounds the difference up to exactly 1.0
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wraps a phase and narrows it to `f32` for a wire record, keeping the result strictly below
/// one (a wrapped value just under 1.0 can round up to exactly 1.0 in `f32`).
#[inline]
pub fn phase_to_f32(phase: f64) -> f32 {
    let narrowed = wrap_phase(phase) as f32;
    if narrowed >= 1.0 {
        0.0
    } else {
        narrowed
    }
}

/// Clamps a unipolar knob value into `[0, 1]`.
#[inline]
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Clamps a bipolar knob value into `[-0.5, 0.5]`.
#[inline]
pub fn clamp_bipolar(value: f64) -> f64 {
    value.clamp(-0.5, 0.5)
}

// -------------------------------------------------------------------------------------------------

/// Rate limiter for repeating log messages, so transient per-device I/O errors surface once per
/// interval instead of once per tick.
#[derive(Debug)]
pub struct LogThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl LogThrottle {
    /// Create a throttle which allows one message per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Create a throttle with the default one minute interval.
    pub fn once_per_minute() -> Self {
        Self::new(Duration::from_secs(60))
    }

    /// Returns true if a message should be logged now, consuming the interval.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_wrapping() {
        assert_eq!(wrap_phase(0.0), 0.0);
        assert_eq!(wrap_phase(0.25), 0.25);
        assert_eq!(wrap_phase(1.0), 0.0);
        assert_eq!(wrap_phase(2.75), 0.75);
        assert_eq_with_epsilon!(wrap_phase(-0.25), 0.75, 1e-12);
        assert!(wrap_phase(-1e-18) < 1.0);
        for step in 0..1000 {
            let phase = step as f64 * 0.137 - 50.0;
            let wrapped = wrap_phase(phase);
            assert!((0.0..1.0).contains(&wrapped), "{phase} wrapped to {wrapped}");
        }
    }

    #[test]
    fn throttle() {
        let mut throttle = LogThrottle::new(Duration::from_secs(3600));
        assert!(throttle.allow());
        assert!(!throttle.allow());
    }
}
