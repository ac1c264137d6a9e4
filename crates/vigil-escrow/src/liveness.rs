//! Liveness window evaluation.
//!
//! Pure logic — no I/O, no network, no clock. Takes blockchain heights,
//! returns a recommendation. The caller (scheduler, daemon, UI) decides
//! whether to act on it.
//!
//! The CSV timelock is relative to the escrow output's confirmation height,
//! so the fraction of the window that has elapsed is just
//! `(tip - confirmation) / ttl`:
//!
//! ```text
//! |--- Healthy ---|--- RefreshRecommended ---|--- RefreshRequired ---|--- Expired
//! 0%             50%                        90%                    100%
//! ```
//!
//! Thresholds are configurable.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vigil_script::Timelock;

#[derive(Error, Debug)]
pub enum LivenessError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Tip height {tip} is below the confirmation height {confirmation}")]
    HeightsReversed { confirmation: u32, tip: u32 },
}

/// When to recommend a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Fraction of the window elapsed before recommending a refresh
    /// (0.0–1.0). Default: 0.5.
    pub refresh_threshold: f64,

    /// Fraction elapsed before a refresh is critical (0.0–1.0).
    /// Default: 0.9.
    pub critical_threshold: f64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            refresh_threshold: 0.5,
            critical_threshold: 0.9,
        }
    }
}

impl LivenessConfig {
    /// Validate that thresholds are sensible.
    pub fn validate(&self) -> Result<(), LivenessError> {
        if self.refresh_threshold <= 0.0 || self.refresh_threshold >= 1.0 {
            return Err(LivenessError::InvalidThreshold(
                "refresh_threshold must be between 0.0 and 1.0 exclusive".into(),
            ));
        }
        if self.critical_threshold <= self.refresh_threshold || self.critical_threshold >= 1.0 {
            return Err(LivenessError::InvalidThreshold(
                "critical_threshold must be between refresh_threshold and 1.0 exclusive".into(),
            ));
        }
        Ok(())
    }
}

/// What the evaluation recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LivenessAction {
    /// Far from expiry. No action needed.
    Healthy,
    /// Past the refresh threshold. Should refresh soon.
    RefreshRecommended,
    /// Past the critical threshold. Must refresh now.
    RefreshRequired,
    /// Window expired. The disclosure path is (or is about to be)
    /// satisfiable; a refresh now races the disclosure transaction.
    Expired,
}

/// Full status of one escrow instance's liveness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessStatus {
    /// Blocks since the instance's confirmation.
    pub blocks_elapsed: u32,
    /// Blocks until the disclosure path matures (0 when expired).
    pub blocks_remaining: u32,
    pub action: LivenessAction,
}

impl LivenessStatus {
    /// True once the disclosure transaction is valid to broadcast.
    pub fn disclosure_ready(&self) -> bool {
        self.action == LivenessAction::Expired
    }
}

/// Evaluate the liveness window of an instance confirmed at
/// `confirmation_height`, as of `tip_height`.
pub fn evaluate(
    confirmation_height: u32,
    tip_height: u32,
    timelock: Timelock,
    config: &LivenessConfig,
) -> Result<LivenessStatus, LivenessError> {
    config.validate()?;
    if tip_height < confirmation_height {
        return Err(LivenessError::HeightsReversed {
            confirmation: confirmation_height,
            tip: tip_height,
        });
    }

    let blocks_elapsed = tip_height - confirmation_height;
    let ttl = timelock.blocks() as u32;
    let blocks_remaining = ttl.saturating_sub(blocks_elapsed);
    let elapsed_fraction = blocks_elapsed as f64 / ttl as f64;

    let action = if blocks_elapsed >= ttl {
        LivenessAction::Expired
    } else if elapsed_fraction >= config.critical_threshold {
        LivenessAction::RefreshRequired
    } else if elapsed_fraction >= config.refresh_threshold {
        LivenessAction::RefreshRecommended
    } else {
        LivenessAction::Healthy
    };

    Ok(LivenessStatus {
        blocks_elapsed,
        blocks_remaining,
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ttl() -> Timelock {
        Timelock::from_blocks(1000).unwrap()
    }

    #[test]
    fn test_healthy_early_in_window() {
        let status = evaluate(100_000, 100_100, ttl(), &LivenessConfig::default()).unwrap();
        assert_eq!(status.action, LivenessAction::Healthy);
        assert_eq!(status.blocks_elapsed, 100);
        assert_eq!(status.blocks_remaining, 900);
        assert!(!status.disclosure_ready());
    }

    #[test]
    fn test_thresholds() {
        let config = LivenessConfig::default();
        // At exactly 50%: recommended
        let status = evaluate(100_000, 100_500, ttl(), &config).unwrap();
        assert_eq!(status.action, LivenessAction::RefreshRecommended);
        // At 90%: required
        let status = evaluate(100_000, 100_900, ttl(), &config).unwrap();
        assert_eq!(status.action, LivenessAction::RefreshRequired);
        // Just before 50%: healthy
        let status = evaluate(100_000, 100_499, ttl(), &config).unwrap();
        assert_eq!(status.action, LivenessAction::Healthy);
    }

    #[test]
    fn test_expired_at_and_past_ttl() {
        let status = evaluate(100_000, 101_000, ttl(), &LivenessConfig::default()).unwrap();
        assert_eq!(status.action, LivenessAction::Expired);
        assert_eq!(status.blocks_remaining, 0);
        assert!(status.disclosure_ready());

        let status = evaluate(100_000, 105_000, ttl(), &LivenessConfig::default()).unwrap();
        assert_eq!(status.action, LivenessAction::Expired);
        assert_eq!(status.blocks_remaining, 0);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let config = LivenessConfig {
            refresh_threshold: 0.0,
            critical_threshold: 0.9,
        };
        assert!(config.validate().is_err());

        let config = LivenessConfig {
            refresh_threshold: 0.5,
            critical_threshold: 0.4,
        };
        assert!(config.validate().is_err());

        let config = LivenessConfig {
            refresh_threshold: 0.5,
            critical_threshold: 1.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reversed_heights_rejected() {
        assert!(matches!(
            evaluate(100_000, 99_999, ttl(), &LivenessConfig::default()),
            Err(LivenessError::HeightsReversed { .. })
        ));
    }
}
