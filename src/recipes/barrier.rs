// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use crate::{
    client::client::Client,
    errors::{ErrorKind, Result},
    proto::data::CreateMode,
    utils::random_token,
};

/// Gate signalled by the node's data: non-empty data raises the barrier for
/// waiters, empty data clears it.
pub struct Barrier {
    client: Arc<Client>,
    path: String,
}

impl Barrier {
    pub fn new(client: Arc<Client>, path: &str) -> Self {
        let path = client.normalize_path(path);
        Self { client, path }
    }

    pub async fn set(&self) -> Result<()> {
        self.client.set_data(&self.path, b"\0", -1, true).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.client.set_data(&self.path, b"", -1, true).await?;
        Ok(())
    }

    pub async fn wait_for(&self) -> Result<()> {
        loop {
            let (response, watcher) = self.client.get_data_w(&self.path, true).await?;

            if !response.data.is_empty() {
                return Ok(());
            }

            watcher.wait_for_event().await?;
        }
    }
}

/// Rendezvous of a fixed party size: `enter` blocks until the party is
/// complete, `leave` blocks until the whole party has left.
///
/// Members register ephemeral waiter nodes; the member that completes the
/// party creates a `ready` signal node. Leaving tears the waiter nodes down
/// in an order that wakes at most one member per deletion.
pub struct DoubleBarrier {
    client: Arc<Client>,
    path: String,
    length: usize,
    ready_signal_path: String,
    my_waiter_path: String,
}

impl DoubleBarrier {
    pub fn new(client: Arc<Client>, path: &str, length: usize) -> Self {
        let path = client.normalize_path(path);
        let ready_signal_path = format!("{path}/ready");
        Self {
            client,
            path,
            length,
            ready_signal_path,
            my_waiter_path: String::new(),
        }
    }

    pub async fn enter(&mut self) -> Result<()> {
        debug_assert!(self.my_waiter_path.is_empty());
        let my_waiter_path = format!("{}/{}", self.path, random_token());

        loop {
            let (result, watcher) =
                self.client.exists_w(&self.ready_signal_path, true).await?;

            match self
                .client
                .create(&my_waiter_path, b"", CreateMode::Ephemeral, true)
                .await
            {
                Ok(_) => {},
                Err(error) if error.kind() == ErrorKind::NodeExists => {},
                Err(error) => return Err(error),
            }

            if result.is_some() {
                break;
            }

            let children = self.client.get_children(&self.path, true).await?;

            if children.len() >= self.length {
                match self
                    .client
                    .create(&self.ready_signal_path, b"", CreateMode::Persistent, true)
                    .await
                {
                    Ok(_) => {},
                    Err(error) if error.kind() == ErrorKind::NodeExists => {},
                    Err(error) => return Err(error),
                }

                break;
            }

            watcher.wait_for_event().await?;
        }

        self.my_waiter_path = my_waiter_path;
        Ok(())
    }

    pub async fn leave(&mut self) -> Result<()> {
        debug_assert!(!self.my_waiter_path.is_empty());
        let ready_signal_name = last_name(&self.ready_signal_path).to_owned();
        let my_waiter_name = last_name(&self.my_waiter_path).to_owned();
        let mut my_waiter_index: isize = 0;
        let is_left;

        loop {
            let children = self.client.get_children(&self.path, true).await?;
            let mut waiter_names: Vec<String> = children
                .iter()
                .filter(|child| **child != ready_signal_name)
                .cloned()
                .collect();
            waiter_names.sort();
            let left_now = waiter_names.len() == children.len();

            if my_waiter_index < 0 {
                if left_now || waiter_names.is_empty() {
                    is_left = left_now;
                    break;
                }
            } else {
                if left_now || waiter_names.len() == 1 {
                    debug_assert!(left_now || my_waiter_name == waiter_names[0]);

                    match self.client.delete(&self.my_waiter_path, -1, true).await {
                        Ok(()) => {},
                        Err(error) if error.kind() == ErrorKind::NoNode => {},
                        Err(error) => return Err(error),
                    }

                    is_left = left_now;
                    break;
                }

                my_waiter_index = waiter_names
                    .iter()
                    .position(|name| *name == my_waiter_name)
                    .map_or(-1, |index| index as isize);

                if my_waiter_index == 0 {
                    // Lowest member waits on the highest; everyone else
                    // deletes itself and waits on the lowest.
                    let last_path =
                        format!("{}/{}", self.path, waiter_names[waiter_names.len() - 1]);
                    let (result, watcher) = self.client.exists_w(&last_path, true).await?;

                    if result.is_some() {
                        watcher.wait_for_event().await?;
                    }
                } else {
                    match self.client.delete(&self.my_waiter_path, -1, true).await {
                        Ok(()) => {},
                        Err(error) if error.kind() == ErrorKind::NoNode => {},
                        Err(error) => return Err(error),
                    }

                    my_waiter_index = -1;
                }
            }

            if my_waiter_index < 0 {
                let first_path = format!("{}/{}", self.path, waiter_names[0]);
                let (result, watcher) = self.client.exists_w(&first_path, true).await?;

                if result.is_some() {
                    watcher.wait_for_event().await?;
                }
            }
        }

        if !is_left {
            match self.client.delete(&self.ready_signal_path, -1, true).await {
                Ok(()) => {},
                Err(error) if error.kind() == ErrorKind::NoNode => {},
                Err(error) => return Err(error),
            }
        }

        self.my_waiter_path.clear();
        Ok(())
    }
}

fn last_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}
