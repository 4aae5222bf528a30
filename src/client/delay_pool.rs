// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use tokio::time::{Instant, sleep_until};

/// Hands out pool items in randomized rotation, spacing allocations so that
/// a full traversal of the pool consumes at least the configured budget.
///
/// The session engine uses this for ensemble endpoints: the spacing prevents
/// reconnect storms, and the budget (the session timeout) guarantees every
/// replica is tried before the session can expire. The PRNG is injectable so
/// tests get a deterministic rotation.
#[derive(Debug)]
pub struct DelayPool<T> {
    items: Vec<T>,
    rng: StdRng,
    next_item_index: usize,
    number_of_allocations: usize,
    max_number_of_allocations: usize,
    delay_duration: Duration,
    next_item_allocable_time: Instant,
    last_item: Option<T>,
}

impl<T: Clone + PartialEq> DelayPool<T> {
    /// `reuse_factor` (≥ 1.0) scales how many allocations a traversal may
    /// make: at most `ceil(reuse_factor × items)` before the pool reports
    /// exhaustion. `budget` is the wall-clock window those allocations are
    /// spread over.
    pub fn new(items: Vec<T>, reuse_factor: f64, budget: Duration) -> Self {
        Self::with_rng(items, reuse_factor, budget, StdRng::from_rng(&mut rand::rng()))
    }

    pub fn with_rng(
        items: Vec<T>,
        reuse_factor: f64,
        budget: Duration,
        rng: StdRng,
    ) -> Self {
        assert!(!items.is_empty());

        let mut pool = Self {
            items,
            rng,
            next_item_index: 0,
            number_of_allocations: 0,
            max_number_of_allocations: 0,
            delay_duration: Duration::ZERO,
            next_item_allocable_time: Instant::now(),
            last_item: None,
        };
        pool.reset(reuse_factor, budget);
        pool
    }

    /// Re-randomizes the rotation and restores the allocation budget. The
    /// most recently handed-out item is moved to the tail so a restart does
    /// not retry the same server first.
    pub fn reset(&mut self, reuse_factor: f64, budget: Duration) {
        assert!(reuse_factor >= 1.0);
        assert!(budget > Duration::ZERO);

        self.items.shuffle(&mut self.rng);

        if let Some(last_item) = &self.last_item
            && self.items.len() >= 2
            && let Some(position) = self.items.iter().position(|item| item == last_item)
        {
            let tail = self.items.len() - 1;
            self.items.swap(position, tail);
        }

        self.next_item_index = 0;
        self.number_of_allocations = 0;
        self.max_number_of_allocations =
            (reuse_factor * self.items.len() as f64).ceil() as usize;
        self.delay_duration = budget / self.max_number_of_allocations as u32;
    }

    /// Returns the next item, sleeping out the mandatory spacing first, or
    /// `None` once the allocation budget is exhausted.
    pub async fn allocate_item(&mut self) -> Option<T> {
        if self.number_of_allocations == self.max_number_of_allocations {
            return None;
        }

        let now = Instant::now();

        if self.number_of_allocations == 0 {
            self.next_item_allocable_time = now;
        } else if self.next_item_allocable_time > now {
            sleep_until(self.next_item_allocable_time).await;
        }

        let item = self.items[self.next_item_index].clone();
        self.next_item_index = (self.next_item_index + 1) % self.items.len();
        self.number_of_allocations += 1;
        self.next_item_allocable_time += self.delay_duration;
        self.last_item = Some(item.clone());
        Some(item)
    }

    /// The monotonic time at which the next allocation is permitted; the
    /// engine uses it as the deadline for the current connect attempt.
    pub fn when_next_item_allocable(&self) -> Instant {
        self.next_item_allocable_time
    }
}
