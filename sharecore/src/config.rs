//! Engine configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// How the engine treats a failed payment attempt on an approved
/// investment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentRetryPolicy {
    /// A failed payment rejects the investment and frees its claim.
    /// The default: shares are never held for a payment that did not
    /// clear.
    #[default]
    FailClosed,
    /// Allow further payment attempts after a failure as long as the
    /// approval window is still open.
    RetryUntilExpiry,
}

/// Tunable parameters for the market engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long an approved investment has to complete payment.
    /// Stamped onto the investment at approval time.
    pub approval_window: Duration,
    /// How long a PROCESSING investment may sit without a payment
    /// outcome before the sweep rejects it and frees its claim.
    pub processing_timeout: Duration,
    /// Policy for payment attempts near or past the approval deadline.
    pub payment_retry: PaymentRetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approval_window: Duration::days(7),
            processing_timeout: Duration::hours(24),
            payment_retry: PaymentRetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Sets the approval window, clamped to a minimum of one day.
    #[must_use]
    pub fn with_approval_window(mut self, window: Duration) -> Self {
        self.approval_window = window.max(Duration::days(1));
        self
    }

    /// Sets the processing timeout.
    #[must_use]
    pub const fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = timeout;
        self
    }

    /// Sets the payment retry policy.
    #[must_use]
    pub const fn with_payment_retry(mut self, policy: PaymentRetryPolicy) -> Self {
        self.payment_retry = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.approval_window, Duration::days(7));
        assert_eq!(config.processing_timeout, Duration::hours(24));
        assert_eq!(config.payment_retry, PaymentRetryPolicy::FailClosed);
    }

    #[test]
    fn approval_window_clamps_to_one_day() {
        let config = EngineConfig::default().with_approval_window(Duration::hours(2));
        assert_eq!(config.approval_window, Duration::days(1));

        let config = EngineConfig::default().with_approval_window(Duration::days(14));
        assert_eq!(config.approval_window, Duration::days(14));
    }
}
