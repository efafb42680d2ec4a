//! Retransmission timer and timeout configuration.
//!
//! Go-Back-N needs a single timer for the oldest unacknowledged frame.  Here
//! that timer is the bounded wait on every channel receive: it restarts each
//! time a receive returns, and when it expires with frames outstanding the
//! whole window is retransmitted.  There is no timer task.
//!
//! The wait is fixed; there is no RTT estimation or back-off.
//! [`RetransmitTimer`] only counts consecutive expiries so a dead peer can be
//! detected when [`TimerConfig::max_retries`] is set.

use std::time::Duration;

use crate::error::GbnError;

/// Adjustable timeout parameters shared by both engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    /// How long a receive waits before reporting a timeout.
    pub ack_timeout: Duration,
    /// EOT transmissions before the sender gives up on an EOT-ACK.
    pub eot_attempts: u32,
    /// Consecutive unanswered retransmission rounds before the sender aborts.
    /// `None` retransmits forever.
    pub max_retries: Option<u32>,
    /// How long the receiver keeps answering repeated EOTs after the first.
    pub linger: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(2),
            eot_attempts: 6,
            max_retries: None,
            linger: Duration::ZERO,
        }
    }
}

impl TimerConfig {
    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn with_eot_attempts(mut self, eot_attempts: u32) -> Self {
        self.eot_attempts = eot_attempts;
        self
    }

    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }
}

/// Bookkeeping for the sender's single retransmission timer.
#[derive(Debug)]
pub struct RetransmitTimer {
    config: TimerConfig,
    /// Expiries since the window last advanced.
    consecutive: u32,
}

impl RetransmitTimer {
    pub fn new(config: TimerConfig) -> Self {
        Self {
            config,
            consecutive: 0,
        }
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Bound for the next receive.
    pub fn wait(&self) -> Duration {
        self.config.ack_timeout
    }

    /// The timer expired with frames outstanding.
    ///
    /// Fails once more than `max_retries` expiries happen in a row.
    pub fn expired(&mut self) -> Result<(), GbnError> {
        self.consecutive += 1;
        match self.config.max_retries {
            Some(max) if self.consecutive > max => Err(GbnError::RetriesExceeded(max)),
            _ => Ok(()),
        }
    }

    /// An ACK advanced the window.
    pub fn restart(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive_expiries(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_listener_timeout() {
        let cfg = TimerConfig::default();
        assert_eq!(cfg.ack_timeout, Duration::from_secs(2));
        assert_eq!(cfg.eot_attempts, 6);
        assert_eq!(cfg.max_retries, None);
        assert!(cfg.linger.is_zero());
    }

    #[test]
    fn unlimited_retries_never_fail() {
        let mut t = RetransmitTimer::new(TimerConfig::default());
        for _ in 0..1000 {
            t.expired().unwrap();
        }
        assert_eq!(t.consecutive_expiries(), 1000);
    }

    #[test]
    fn retry_budget_exhausts_then_restart_clears() {
        let mut t = RetransmitTimer::new(TimerConfig::default().with_max_retries(Some(2)));
        t.expired().unwrap();
        t.expired().unwrap();
        assert!(matches!(t.expired(), Err(GbnError::RetriesExceeded(2))));

        t.restart();
        assert_eq!(t.consecutive_expiries(), 0);
        t.expired().unwrap();
    }
}
