//! Inter-command pacing.
//!
//! U-Boot offers no flow control on its console, and its line parser falls
//! behind at full serial line rate. A pacer blocks after each command so the
//! receive buffer never overruns. Nothing is read back from the device.

use std::time::Duration;

/// Backpressure policy applied after every command.
pub trait Pacer {
    /// Block until the next command may be sent.
    fn wait(&mut self);
}

/// Sleep for a fixed duration after every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    /// Delay used when nothing else is configured.
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(5);

    /// Create a pacer that sleeps `delay` after each command.
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// The configured delay.
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

impl Pacer for FixedDelay {
    fn wait(&mut self) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }
}

impl<P: Pacer + ?Sized> Pacer for &mut P {
    fn wait(&mut self) {
        (**self).wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_fixed_delay_blocks_at_least_delay() {
        let mut pacer = FixedDelay::new(Duration::from_millis(20));
        let start = Instant::now();
        pacer.wait();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_zero_delay_returns_immediately() {
        let mut pacer = FixedDelay::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..1000 {
            pacer.wait();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_default_delay() {
        assert_eq!(FixedDelay::default().delay(), Duration::from_millis(5));
    }
}
