//! Per-venue payment counters.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::VenueId;

/// Running payment counters for one venue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VenuePaymentMetrics {
    /// Payments that reached the breaker.
    pub total_payments: u64,
    /// Payments the gateway accepted.
    pub successful_payments: u64,
    /// Payments that failed.
    pub failed_payments: u64,
    /// Sum of accepted amounts in minor units.
    pub total_amount: i64,
    /// Time of the most recent accepted payment.
    pub last_payment_time: Option<DateTime<Utc>>,
}

impl VenuePaymentMetrics {
    /// Counts an accepted payment of `amount`.
    pub fn record_success(&mut self, amount: i64) {
        self.total_payments = self.total_payments.saturating_add(1);
        self.successful_payments = self.successful_payments.saturating_add(1);
        self.total_amount = self.total_amount.saturating_add(amount);
        self.last_payment_time = Some(Utc::now());
    }

    /// Counts a failed payment.
    pub fn record_failure(&mut self) {
        self.total_payments = self.total_payments.saturating_add(1);
        self.failed_payments = self.failed_payments.saturating_add(1);
    }

    /// Moves one accepted payment of `amount` to failed.
    pub fn reclassify_as_failed(&mut self, amount: i64) {
        self.successful_payments = self.successful_payments.saturating_sub(1);
        self.failed_payments = self.failed_payments.saturating_add(1);
        self.total_amount = self.total_amount.saturating_sub(amount);
    }

    /// Moves one failed payment of `amount` to accepted.
    pub fn reclassify_as_succeeded(&mut self, amount: i64) {
        self.failed_payments = self.failed_payments.saturating_sub(1);
        self.successful_payments = self.successful_payments.saturating_add(1);
        self.total_amount = self.total_amount.saturating_add(amount);
    }

    /// Success percentage; 100 when there are no payments yet.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_payments == 0 {
            return 100.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.successful_payments as f64 / self.total_payments as f64 * 100.0;
        rate
    }

    /// Builds a serializable snapshot for `venue_id`.
    #[must_use]
    pub fn snapshot(&self, venue_id: VenueId) -> PaymentMetricsSnapshot {
        PaymentMetricsSnapshot {
            venue_id,
            total_payments: self.total_payments,
            successful_payments: self.successful_payments,
            failed_payments: self.failed_payments,
            total_amount: self.total_amount,
            last_payment_time: self.last_payment_time,
            success_rate: self.success_rate(),
        }
    }
}

/// Point-in-time payment metrics for a venue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentMetricsSnapshot {
    /// Venue reported.
    pub venue_id: VenueId,
    /// Payments that reached the breaker.
    pub total_payments: u64,
    /// Payments the gateway accepted.
    pub successful_payments: u64,
    /// Payments that failed.
    pub failed_payments: u64,
    /// Sum of accepted amounts in minor units.
    pub total_amount: i64,
    /// Time of the most recent accepted payment.
    pub last_payment_time: Option<DateTime<Utc>>,
    /// `successful_payments / total_payments * 100`, or 100 with no payments.
    pub success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_venue_reports_full_success() {
        let metrics = VenuePaymentMetrics::default();
        assert!((metrics.success_rate() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn one_success_one_failure_is_fifty_percent() {
        let mut metrics = VenuePaymentMetrics::default();
        metrics.record_success(1000);
        metrics.record_failure();
        let snapshot = metrics.snapshot(VenueId::new("v1"));
        assert!((snapshot.success_rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.total_amount, 1000);
        assert!(snapshot.last_payment_time.is_some());
    }

    #[test]
    fn reclassification_moves_counts() {
        let mut metrics = VenuePaymentMetrics::default();
        metrics.record_success(500);
        metrics.reclassify_as_failed(500);
        assert_eq!(metrics.successful_payments, 0);
        assert_eq!(metrics.failed_payments, 1);
        assert_eq!(metrics.total_amount, 0);
        assert_eq!(metrics.total_payments, 1);
    }
}
