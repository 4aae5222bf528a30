// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashSet, time::Duration};

use anyhow::Result;
use rand::{SeedableRng, rngs::StdRng};
use tokio::time::Instant;
use zk_client_rs::client::delay_pool::DelayPool;

fn pool_of(items: &[&str], reuse_factor: f64, budget: Duration) -> DelayPool<String> {
    DelayPool::with_rng(
        items.iter().map(|item| (*item).to_owned()).collect(),
        reuse_factor,
        budget,
        StdRng::seed_from_u64(7),
    )
}

#[tokio::test(start_paused = true)]
async fn test_allocations_are_capped() -> Result<()> {
    let mut pool = pool_of(&["a", "b", "c"], 1.0, Duration::from_secs(3));

    let mut allocated = Vec::new();
    while let Some(item) = pool.allocate_item().await {
        allocated.push(item);
    }

    assert_eq!(allocated.len(), 3);
    let distinct: HashSet<&String> = allocated.iter().collect();
    assert_eq!(distinct.len(), 3);
    assert!(pool.allocate_item().await.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reuse_factor_repeats_the_rotation() -> Result<()> {
    let mut pool = pool_of(&["only"], 3.0, Duration::from_secs(3));

    for _ in 0..3 {
        assert_eq!(pool.allocate_item().await.as_deref(), Some("only"));
    }
    assert!(pool.allocate_item().await.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_allocations_are_spaced_over_the_budget() -> Result<()> {
    let mut pool = pool_of(&["a", "b"], 1.0, Duration::from_secs(4));

    let start = Instant::now();
    pool.allocate_item().await;
    assert_eq!(start.elapsed(), Duration::ZERO);

    // budget / cap = 2s between allocations
    pool.allocate_item().await;
    assert_eq!(start.elapsed(), Duration::from_secs(2));

    assert!(pool.allocate_item().await.is_none());
    // The last allocation happened strictly inside the budget window.
    assert!(start.elapsed() < Duration::from_secs(4));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_next_allocable_time_is_the_connect_deadline() -> Result<()> {
    let mut pool = pool_of(&["a", "b"], 1.0, Duration::from_secs(4));

    let start = Instant::now();
    pool.allocate_item().await;
    assert_eq!(pool.when_next_item_allocable(), start + Duration::from_secs(2));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reset_moves_last_item_to_the_tail() -> Result<()> {
    let mut pool = pool_of(&["a", "b", "c"], 1.0, Duration::from_secs(3));

    let last = pool
        .allocate_item()
        .await
        .expect("pool must hand out an item");

    pool.reset(1.0, Duration::from_secs(3));

    let mut rotation = Vec::new();
    while let Some(item) = pool.allocate_item().await {
        rotation.push(item);
    }

    assert_eq!(rotation.len(), 3);
    assert_eq!(rotation.last(), Some(&last));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reset_restores_the_allocation_budget() -> Result<()> {
    let mut pool = pool_of(&["a"], 1.0, Duration::from_secs(1));

    assert!(pool.allocate_item().await.is_some());
    assert!(pool.allocate_item().await.is_none());

    pool.reset(2.0, Duration::from_secs(1));
    assert!(pool.allocate_item().await.is_some());
    assert!(pool.allocate_item().await.is_some());
    assert!(pool.allocate_item().await.is_none());
    Ok(())
}
