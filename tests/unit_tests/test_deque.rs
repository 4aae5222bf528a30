// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use zk_client_rs::{client::deque::Deque, errors::ErrorKind};

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[test]
fn test_capacity_bound() {
    let deque: Deque<u32> = Deque::new(2);

    assert!(deque.try_insert_tail(1));
    assert!(deque.try_insert_tail(2));
    assert!(!deque.try_insert_tail(3));
    assert_eq!(deque.len(), 2);
}

#[test]
fn test_head_tail_order() {
    let deque: Deque<u32> = Deque::new(4);

    assert!(deque.try_insert_tail(1));
    assert!(deque.try_insert_tail(2));
    assert!(deque.try_insert_head(0));

    assert_eq!(deque.try_remove_head(true), Some(0));
    assert_eq!(deque.try_remove_tail(true), Some(2));
    assert_eq!(deque.try_remove_head(true), Some(1));
    assert_eq!(deque.try_remove_head(true), None);
}

#[test]
fn test_try_remove_item() {
    let deque: Deque<u32> = Deque::new(4);

    for item in [1, 2, 3] {
        assert!(deque.try_insert_tail(item));
    }

    assert_eq!(deque.try_remove_item(|item| *item == 2, true), Some(2));
    assert_eq!(deque.try_remove_item(|item| *item == 2, true), None);
    assert_eq!(deque.try_remove_head(true), Some(1));
    assert_eq!(deque.try_remove_head(true), Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_insert_blocks_until_removal() -> Result<()> {
    let deque: Arc<Deque<u32>> = Arc::new(Deque::new(1));
    assert!(deque.try_insert_tail(1));

    let blocked = {
        let deque = Arc::clone(&deque);
        tokio::spawn(async move { deque.insert_tail(2).await })
    };

    settle().await;
    assert!(!blocked.is_finished());

    assert_eq!(deque.try_remove_head(true), Some(1));
    blocked.await??;
    assert_eq!(deque.try_remove_head(true), Some(2));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_two_phase_removal_keeps_slot_reserved() -> Result<()> {
    let deque: Arc<Deque<u32>> = Arc::new(Deque::new(1));
    assert!(deque.try_insert_tail(1));

    // Reserved removal: the item is out, but the capacity slot is not.
    assert_eq!(deque.try_remove_head(false), Some(1));
    assert!(!deque.try_insert_tail(2));

    deque.commit_item_removals(1);
    assert!(deque.try_insert_tail(2));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_commit_wakes_blocked_inserter() -> Result<()> {
    let deque: Arc<Deque<u32>> = Arc::new(Deque::new(1));
    assert!(deque.try_insert_tail(1));
    assert_eq!(deque.try_remove_head(false), Some(1));

    let blocked = {
        let deque = Arc::clone(&deque);
        tokio::spawn(async move { deque.insert_tail(2).await })
    };

    settle().await;
    assert!(!blocked.is_finished());

    deque.commit_item_removals(1);
    blocked.await??;
    assert_eq!(deque.len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_remove_blocks_until_insert_fifo() -> Result<()> {
    let deque: Arc<Deque<u32>> = Arc::new(Deque::new(4));

    let first = {
        let deque = Arc::clone(&deque);
        tokio::spawn(async move { deque.remove_head(true).await })
    };
    settle().await;
    let second = {
        let deque = Arc::clone(&deque);
        tokio::spawn(async move { deque.remove_head(true).await })
    };
    settle().await;
    assert!(!first.is_finished());
    assert!(!second.is_finished());

    assert!(deque.try_insert_tail(10));
    settle().await;
    assert_eq!(first.await??, 10);
    assert!(!second.is_finished());

    assert!(deque.try_insert_tail(11));
    assert_eq!(second.await??, 11);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_close_fails_waiters_with_kind() -> Result<()> {
    let deque: Arc<Deque<u32>> = Arc::new(Deque::new(1));

    let blocked_remove = {
        let deque = Arc::clone(&deque);
        tokio::spawn(async move { deque.remove_head(true).await })
    };
    settle().await;

    deque.close(ErrorKind::SessionExpired);
    let error = blocked_remove.await?.expect_err("waiter must fail on close");
    assert_eq!(error.kind(), ErrorKind::SessionExpired);

    assert!(deque.is_closed());
    assert!(!deque.try_insert_tail(1));

    deque.reset(2);
    assert!(!deque.is_closed());
    assert!(deque.try_insert_tail(1));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reset_fails_waiters_parked_across_close() -> Result<()> {
    let deque: Arc<Deque<u32>> = Arc::new(Deque::new(1));
    assert!(deque.try_insert_tail(1));

    let blocked_insert = {
        let deque = Arc::clone(&deque);
        tokio::spawn(async move { deque.insert_tail(2).await })
    };
    settle().await;

    // The waiter only gets to poll after the queue has already been
    // reopened; it must still observe the close, not join the new instance.
    deque.close(ErrorKind::SessionExpired);
    deque.reset(1);

    let error = blocked_insert
        .await?
        .expect_err("waiter must fail with the close kind");
    assert_eq!(error.kind(), ErrorKind::SessionExpired);

    assert!(deque.try_insert_tail(3));
    assert_eq!(deque.len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_waiter_hands_grant_over() -> Result<()> {
    let deque: Arc<Deque<u32>> = Arc::new(Deque::new(4));

    let first = {
        let deque = Arc::clone(&deque);
        tokio::spawn(async move { deque.remove_head(true).await })
    };
    settle().await;
    let second = {
        let deque = Arc::clone(&deque);
        tokio::spawn(async move { deque.remove_head(true).await })
    };
    settle().await;

    // Head waiter gives up; the grant must pass to the next in line.
    first.abort();
    let _ = first.await;
    settle().await;

    assert!(deque.try_insert_tail(7));
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(1), second).await???,
        7
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_commit_and_reinsert_is_atomic_for_capacity() -> Result<()> {
    let deque: Arc<Deque<u32>> = Arc::new(Deque::new(2));
    assert!(deque.try_insert_tail(1));
    assert!(deque.try_insert_tail(2));

    // Both items handed out with their slots still reserved.
    assert_eq!(deque.try_remove_head(false), Some(1));
    assert_eq!(deque.try_remove_head(false), Some(2));
    assert!(!deque.try_insert_tail(3));

    // One slot committed back, one item re-queued; net capacity use is
    // unchanged and the bound holds.
    deque.commit_and_reinsert(2, [2]);
    assert_eq!(deque.len(), 1);
    assert!(deque.try_insert_tail(3));
    assert!(!deque.try_insert_tail(4));

    assert_eq!(deque.try_remove_head(true), Some(2));
    assert_eq!(deque.try_remove_head(true), Some(3));
    Ok(())
}
