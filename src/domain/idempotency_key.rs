//! Deterministic idempotency keys for payment intents.
//!
//! A key is `<VENUE_CODE>_<hex>` where `<hex>` is the first 128 bits of a
//! SHA-256 digest over a canonical encoding of the intent's venue, amount,
//! currency, and metadata. Metadata is hashed in key order, so two intents
//! that differ only in insertion order produce the same key.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::PaymentIntent;

/// Hex characters of the digest kept in the key.
const DIGEST_HEX_LEN: usize = 32;

/// Idempotency key for one logical payment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derives the key for an intent.
    #[must_use]
    pub fn for_intent(intent: &PaymentIntent) -> Self {
        let mut hasher = Sha256::new();
        hash_field(&mut hasher, intent.venue_id.as_str());
        hash_field(&mut hasher, &intent.amount.to_string());
        hash_field(&mut hasher, &intent.currency.to_ascii_lowercase());
        for (key, value) in &intent.metadata {
            hash_field(&mut hasher, key);
            hash_field(&mut hasher, value);
        }
        let digest = hex::encode(hasher.finalize());
        let short = digest.get(..DIGEST_HEX_LEN).unwrap_or(&digest);
        Self(format!("{}_{short}", intent.venue_id.short_code()))
    }

    /// Wraps an existing key string (e.g. one echoed back by a gateway).
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Length-prefixes each field so `("ab", "c")` and `("a", "bc")` differ.
fn hash_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field.as_bytes());
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> PaymentIntent {
        PaymentIntent::new(2500, "usd", "club-nova", "cus_1")
            .with_metadata("order_id", "o-17")
            .with_metadata("pass", "vip")
    }

    #[test]
    fn same_intent_same_key() {
        assert_eq!(
            IdempotencyKey::for_intent(&intent()),
            IdempotencyKey::for_intent(&intent())
        );
    }

    #[test]
    fn key_is_prefixed_with_venue_code() {
        let key = IdempotencyKey::for_intent(&intent());
        assert!(key.as_str().starts_with("CLUB_"));
        assert_eq!(key.as_str().len(), "CLUB_".len() + DIGEST_HEX_LEN);
    }

    #[test]
    fn metadata_order_does_not_matter() {
        let reordered = PaymentIntent::new(2500, "usd", "club-nova", "cus_1")
            .with_metadata("pass", "vip")
            .with_metadata("order_id", "o-17");
        assert_eq!(
            IdempotencyKey::for_intent(&intent()),
            IdempotencyKey::for_intent(&reordered)
        );
    }

    #[test]
    fn any_field_change_changes_key() {
        let base = IdempotencyKey::for_intent(&intent());

        let mut amount = intent();
        amount.amount = 2501;
        assert_ne!(base, IdempotencyKey::for_intent(&amount));

        let mut currency = intent();
        currency.currency = "eur".to_string();
        assert_ne!(base, IdempotencyKey::for_intent(&currency));

        let mut venue = intent();
        venue.venue_id = "club-nova-2".into();
        assert_ne!(base, IdempotencyKey::for_intent(&venue));

        let metadata = intent().with_metadata("seat", "12");
        assert_ne!(base, IdempotencyKey::for_intent(&metadata));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let a = PaymentIntent::new(1, "usd", "v1", "c").with_metadata("ab", "c");
        let b = PaymentIntent::new(1, "usd", "v1", "c").with_metadata("a", "bc");
        assert_ne!(IdempotencyKey::for_intent(&a), IdempotencyKey::for_intent(&b));
    }
}
