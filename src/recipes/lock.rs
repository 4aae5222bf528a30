// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use crate::{
    client::client::Client,
    errors::{ErrorKind, Result, ZkError},
    proto::data::CreateMode,
    utils::{random_token, sequence_suffix},
};

const SHARED_LOCKER_NAME_PREFIX: &str = "shared-";

/// Distributed mutex over ephemeral-sequential locker nodes.
///
/// Each candidate creates a locker under the lock path and waits on its
/// predecessor, so exactly one candidate owns the lock and hand-over wakes a
/// single waiter. The create is retried across connection loss with orphan
/// detection: if the first attempt may or may not have landed, the children
/// listing is searched for the candidate's unique prefix before retrying.
pub struct Lock {
    client: Arc<Client>,
    path: String,
    my_locker_path: String,
}

impl Lock {
    pub fn new(client: Arc<Client>, path: &str) -> Self {
        let path = client.normalize_path(path);
        Self {
            client,
            path,
            my_locker_path: String::new(),
        }
    }

    pub async fn acquire(&mut self) -> Result<()> {
        debug_assert!(!self.locked());
        let my_locker_path = self
            .acquire_with(&format!("{}-", random_token()), |_| true)
            .await?;
        self.my_locker_path = my_locker_path;
        Ok(())
    }

    pub async fn release(&mut self) -> Result<()> {
        debug_assert!(self.locked());
        self.client.delete(&self.my_locker_path, -1, true).await?;
        self.my_locker_path.clear();
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.locked()
    }

    fn locked(&self) -> bool {
        !self.my_locker_path.is_empty()
    }

    /// Creates a locker node named by `my_locker_name_prefix` and waits until
    /// every preceding locker accepted by `contends` is gone. Returns the
    /// locker path; the caller records it as ownership.
    async fn acquire_with(
        &self,
        my_locker_name_prefix: &str,
        contends: impl Fn(&str) -> bool,
    ) -> Result<String> {
        let mut my_locker_path: Option<String> = None;
        let mut locker_names: Vec<String>;

        loop {
            match self
                .client
                .create(
                    &format!("{}/{my_locker_name_prefix}", self.path),
                    b"",
                    CreateMode::EphemeralSequential,
                    false,
                )
                .await
            {
                Ok(path) => my_locker_path = Some(path),
                Err(error) if error.kind() == ErrorKind::ConnectionLoss => {},
                Err(error) => return Err(error),
            }

            locker_names = self.client.get_children(&self.path, true).await?;

            if my_locker_path.is_some() {
                break;
            }

            // The create may have landed before the connection dropped; the
            // unique prefix tells our orphan apart.
            for locker_name in &locker_names {
                if locker_name.starts_with(my_locker_name_prefix) {
                    my_locker_path = Some(format!("{}/{locker_name}", self.path));
                    break;
                }
            }

            if my_locker_path.is_some() {
                break;
            }
        }

        let my_locker_path = my_locker_path.ok_or_else(|| {
            ZkError::new(ErrorKind::NoNode, "locker node was never created")
        })?;
        let my_locker_name = my_locker_path
            .rsplit_once('/')
            .map_or(my_locker_path.as_str(), |(_, name)| name)
            .to_owned();

        loop {
            let mut contenders: Vec<&String> = locker_names
                .iter()
                .filter(|name| contends(name) || **name == my_locker_name)
                .collect();
            contenders.sort_by(|a, b| sequence_suffix(a).cmp(sequence_suffix(b)));

            let my_locker_index = contenders
                .iter()
                .position(|name| **name == my_locker_name)
                .ok_or_else(|| {
                    ZkError::new(
                        ErrorKind::NoNode,
                        format!("locker node disappeared: {my_locker_path:?}"),
                    )
                })?;

            if my_locker_index == 0 {
                break;
            }

            let predecessor_path =
                format!("{}/{}", self.path, contenders[my_locker_index - 1]);
            let (result, watcher) = self.client.exists_w(&predecessor_path, true).await?;

            if result.is_some() {
                watcher.wait_for_event().await?;
            }

            locker_names = self.client.get_children(&self.path, true).await?;
        }

        Ok(my_locker_path)
    }
}

/// Read/write variant: shared holders are prefixed `shared-` and only
/// contend with exclusive lockers, while exclusive holders contend with
/// everyone.
pub struct SharedLock {
    lock: Lock,
}

impl SharedLock {
    pub fn new(client: Arc<Client>, path: &str) -> Self {
        Self {
            lock: Lock::new(client, path),
        }
    }

    /// Acquires the lock exclusively.
    pub async fn acquire(&mut self) -> Result<()> {
        self.lock.acquire().await
    }

    /// Acquires the lock shared with other shared holders.
    pub async fn acquire_shared(&mut self) -> Result<()> {
        debug_assert!(!self.lock.locked());
        let my_locker_name_prefix =
            format!("{SHARED_LOCKER_NAME_PREFIX}{}-", random_token());
        let my_locker_path = self
            .lock
            .acquire_with(&my_locker_name_prefix, |name| {
                !name.starts_with(SHARED_LOCKER_NAME_PREFIX)
            })
            .await?;
        self.lock.my_locker_path = my_locker_path;
        Ok(())
    }

    pub async fn release(&mut self) -> Result<()> {
        self.lock.release().await
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}
