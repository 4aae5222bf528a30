// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use bytes::Bytes;

use crate::{
    client::client::Client,
    errors::{ErrorKind, Result},
    proto::{data::CreateMode, request::Request},
    recipes::lock::Lock,
    utils::{random_token, sequence_suffix},
};

/// Highest priority a [`PriorityQueue`] item may carry.
pub const MAX_ITEM_PRIORITY: u32 = 999;

struct QueueCore {
    client: Arc<Client>,
    path: String,
    lock: Lock,
}

impl QueueCore {
    fn new(client: Arc<Client>, path: &str, lock: Lock) -> Self {
        let path = client.normalize_path(path);
        Self { client, path, lock }
    }

    /// Appends a batch of items as one transaction. The batch lands exactly
    /// once: on connection loss the children are searched for the batch's
    /// unique name prefix before retrying.
    async fn enqueue(&self, item_name_prefix_end: &str, item_data: &[&[u8]]) -> Result<()> {
        debug_assert!(!item_name_prefix_end.contains('-'));
        let item_name_prefix = format!("{}-{item_name_prefix_end}", random_token());
        let item_path = format!("{}/{item_name_prefix}", self.path);

        loop {
            let ops: Vec<Request> = item_data
                .iter()
                .map(|data| {
                    self.client
                        .create_op(&item_path, data, CreateMode::PersistentSequential)
                })
                .collect();

            match self.client.multi(ops, false).await {
                Ok(_) => return Ok(()),
                Err(error) if error.kind() == ErrorKind::ConnectionLoss => {},
                Err(error) => return Err(error),
            }

            let children = self.client.get_children(&self.path, true).await?;

            if children
                .iter()
                .any(|child| child.starts_with(&item_name_prefix))
            {
                return Ok(());
            }
        }
    }

    /// Takes up to `max_number_of_items` items off the queue head (all of
    /// them when `None`), serialized against other consumers by the lock.
    async fn dequeue(&mut self, max_number_of_items: Option<usize>) -> Result<Vec<Bytes>> {
        self.lock.acquire().await?;

        let result = self.dequeue_locked(max_number_of_items).await;

        match result {
            Ok(item_data) => {
                self.lock.release().await?;
                Ok(item_data)
            },
            Err(error) => {
                if self.client.is_running() {
                    let _ = self.lock.release().await;
                }
                Err(error)
            },
        }
    }

    async fn dequeue_locked(
        &self,
        max_number_of_items: Option<usize>,
    ) -> Result<Vec<Bytes>> {
        let mut item_names;

        loop {
            let (names, watcher) = self.client.get_children_w(&self.path, true).await?;
            item_names = names;

            if !item_names.is_empty() {
                watcher.remove();
                break;
            }

            watcher.wait_for_event().await?;
        }

        item_names.sort_by(|a, b| sequence_suffix(a).cmp(sequence_suffix(b)));
        if let Some(max_number_of_items) = max_number_of_items {
            item_names.truncate(max_number_of_items);
        }

        let mut item_data = Vec::with_capacity(item_names.len());
        for item_name in &item_names {
            let response = self
                .client
                .get_data(&format!("{}/{item_name}", self.path), true)
                .await?;
            item_data.push(response.data);
        }

        let ops: Vec<Request> = item_names
            .iter()
            .map(|item_name| {
                self.client
                    .delete_op(&format!("{}/{item_name}", self.path), -1)
            })
            .collect();
        self.client.multi(ops, true).await?;

        Ok(item_data)
    }
}

/// FIFO queue of opaque items under a parent node, ordered by the sequence
/// numbers the server assigns.
pub struct Queue {
    core: QueueCore,
}

impl Queue {
    pub fn new(client: Arc<Client>, path: &str, lock: Lock) -> Self {
        Self {
            core: QueueCore::new(client, path, lock),
        }
    }

    pub async fn enqueue(&self, item_data: &[&[u8]]) -> Result<()> {
        self.core.enqueue("", item_data).await
    }

    pub async fn dequeue(
        &mut self,
        max_number_of_items: Option<usize>,
    ) -> Result<Vec<Bytes>> {
        self.core.dequeue(max_number_of_items).await
    }
}

/// Queue variant whose items dequeue highest-priority first; the priority is
/// folded into the node name so lexicographic order is priority order.
pub struct PriorityQueue {
    core: QueueCore,
}

impl PriorityQueue {
    pub fn new(client: Arc<Client>, path: &str, lock: Lock) -> Self {
        Self {
            core: QueueCore::new(client, path, lock),
        }
    }

    pub async fn enqueue(&self, item_priority: u32, item_data: &[&[u8]]) -> Result<()> {
        debug_assert!(item_priority <= MAX_ITEM_PRIORITY);
        let item_name_prefix_end = format!("{:03}.", MAX_ITEM_PRIORITY - item_priority);
        self.core.enqueue(&item_name_prefix_end, item_data).await
    }

    pub async fn dequeue(
        &mut self,
        max_number_of_items: Option<usize>,
    ) -> Result<Vec<Bytes>> {
        self.core.dequeue(max_number_of_items).await
    }
}
