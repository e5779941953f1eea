//! Outbound ping supervision

use crate::error::{MarketDataError, Result};

/// Tracks whether the last ping we sent has been answered.
///
/// A ping that is still unanswered when the next one is due fails the
/// connection. Pings sent by the peer are not tracked here.
#[derive(Debug, Default)]
pub struct PingTracker {
    outstanding: bool,
    sent: u64,
    answered: u64,
}

impl PingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check before sending the next ping
    pub fn ping_due(&self) -> Result<()> {
        if self.outstanding {
            return Err(MarketDataError::PingTimeout);
        }
        Ok(())
    }

    /// Record that a ping went out
    pub fn ping_sent(&mut self) {
        self.outstanding = true;
        self.sent += 1;
    }

    /// Record a pong; returns whether a ping was outstanding
    pub fn pong_received(&mut self) -> bool {
        let was_outstanding = std::mem::replace(&mut self.outstanding, false);
        if was_outstanding {
            self.answered += 1;
        }
        was_outstanding
    }

    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn answered(&self) -> u64 {
        self.answered
    }
}
