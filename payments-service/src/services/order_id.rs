//! Order identity generation.
//!
//! Ids follow the `ORD{unix_millis}{n}` shape the rest of the ecosystem
//! already stores and shares, but `n` comes from a randomly-seeded atomic
//! counter instead of a live document count, so two creations in the same
//! millisecond can never mint the same id. The unique index on
//! `custom_order_id` stays as the final guard.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct OrderIdGenerator {
    counter: AtomicU64,
}

impl OrderIdGenerator {
    pub fn new() -> Self {
        // Random seed keeps ids from colliding across process restarts
        // within the same millisecond.
        let seed: u16 = rand::random();
        Self {
            counter: AtomicU64::new(seed as u64),
        }
    }

    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("ORD{}{}", Utc::now().timestamp_millis(), n)
    }
}

impl Default for OrderIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
