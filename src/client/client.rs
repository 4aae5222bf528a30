// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    cfg::config::Config,
    client::{
        delay_pool::DelayPool,
        session::{
            AuthInfo, CompletionCallback, Session, SessionListener, SessionState,
            Watcher, WatcherType,
        },
    },
    errors::{ErrorKind, Result, ZkError},
    proto::{
        data::{Acl, CreateMode, OPEN_ACL_UNSAFE, Stat},
        multi::{MultiRequest, OpResult},
        request::{
            CheckVersionRequest, Create2Request, CreateRequest, DeleteRequest,
            ExistsRequest, GetAclRequest, GetChildren2Request, GetChildrenRequest,
            GetDataRequest, Request, SetAclRequest, SetDataRequest, SyncRequest,
        },
        response::{
            Create2Response, GetAclResponse, GetChildren2Response, GetDataResponse,
            Response,
        },
    },
};

pub type ServerAddress = (String, u16);

/// User-facing client: owns the session engine and its reconnect loop, and
/// translates typed operations into engine submissions.
///
/// `start`/`stop` must be serialized per client; everything else may be
/// called from any number of tasks concurrently.
pub struct Client {
    session: Arc<Session>,
    server_addresses: Arc<AsyncMutex<DelayPool<ServerAddress>>>,
    path_prefix: String,
    auth_infos: Arc<Vec<AuthInfo>>,
    default_acl: Vec<Acl>,
    stop_token: Mutex<Option<CancellationToken>>,
    running: Arc<watch::Sender<bool>>,
    stopping: Arc<AtomicBool>,
}

impl Client {
    pub fn new(config: &Config) -> Result<Self> {
        let server_addresses = config.server_addresses()?;
        let session_timeout = config.session.timeout;
        let auth_infos: Vec<AuthInfo> = config
            .session
            .auth
            .iter()
            .map(|entry| {
                (
                    entry.scheme.clone(),
                    Bytes::copy_from_slice(entry.credentials.as_bytes()),
                )
            })
            .collect();

        let (running, _) = watch::channel(false);

        Ok(Self {
            session: Arc::new(Session::new(session_timeout)),
            server_addresses: Arc::new(AsyncMutex::new(DelayPool::new(
                server_addresses,
                1.0,
                session_timeout,
            ))),
            path_prefix: normalize_prefix(&config.session.path_prefix),
            auth_infos: Arc::new(auth_infos),
            default_acl: vec![OPEN_ACL_UNSAFE.clone()],
            stop_token: Mutex::new(None),
            running: Arc::new(running),
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn add_session_listener(&self) -> SessionListener {
        self.session.add_listener()
    }

    pub fn remove_session_listener(&self, listener: SessionListener) {
        self.session.remove_listener(listener);
    }

    /// Spawns the reconnect loop and returns once the session reports its
    /// first state change.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Err(ZkError::new(
                ErrorKind::InvalidState,
                "client is already running",
            ));
        }

        let token = CancellationToken::new();
        *self.lock_stop_token() = Some(token.clone());
        self.running.send_replace(true);

        let mut listener = self.session.add_listener();

        tokio::spawn(run(
            Arc::clone(&self.session),
            Arc::clone(&self.server_addresses),
            Arc::clone(&self.auth_infos),
            Arc::clone(&self.stopping),
            Arc::clone(&self.running),
            token,
        ));

        let _ = listener.get_state_change().await;
        self.session.remove_listener(listener);
        Ok(())
    }

    /// Requests the reconnect loop to finish; outstanding work fails as if
    /// the session had expired. Idempotent while stopping.
    pub fn stop(&self) {
        if !self.is_running() || self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(token) = self.lock_stop_token().take() {
            token.cancel();
        }
    }

    pub async fn wait_for_stopped(&self) {
        let mut running = self.running.subscribe();
        let _ = running.wait_for(|is_running| !is_running).await;
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub fn session_id(&self) -> i64 {
        self.session.get_id()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.get_state()
    }

    /// Highest transaction id observed on any reply of this session.
    pub fn last_zxid(&self) -> i64 {
        self.session.get_last_zxid()
    }

    /// Collapses duplicate slashes, strips the trailing slash (except for
    /// the root) and applies the configured prefix to relative paths.
    pub fn normalize_path(&self, path: &str) -> String {
        debug_assert!(!path.is_empty());
        let mut normalized = collapse_slashes(path);

        if !normalized.ends_with('/') {
            normalized.push('/');
        }

        if normalized.starts_with('/') {
            if normalized != "/" {
                normalized.pop();
            }
            normalized
        } else {
            normalized.pop();
            format!("{}{normalized}", self.path_prefix)
        }
    }

    pub fn create_op(&self, path: &str, data: &[u8], mode: CreateMode) -> Request {
        Request::Create(CreateRequest {
            path: self.normalize_path(path),
            data: Bytes::copy_from_slice(data),
            acl: self.default_acl.clone(),
            flags: mode.code(),
        })
    }

    pub async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
        auto_retry: bool,
    ) -> Result<String> {
        let request = self.create_op(path, data, mode);
        match self.execute(request, auto_retry).await? {
            Some(Response::Create(response)) => Ok(response.path),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn create2(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
        auto_retry: bool,
    ) -> Result<Create2Response> {
        let request = Request::Create2(Create2Request {
            path: self.normalize_path(path),
            data: Bytes::copy_from_slice(data),
            acl: self.default_acl.clone(),
            flags: mode.code(),
        });
        match self.execute(request, auto_retry).await? {
            Some(Response::Create2(response)) => Ok(response),
            other => Err(unexpected_response(other)),
        }
    }

    pub fn delete_op(&self, path: &str, version: i32) -> Request {
        Request::Delete(DeleteRequest {
            path: self.normalize_path(path),
            version,
        })
    }

    pub async fn delete(&self, path: &str, version: i32, auto_retry: bool) -> Result<()> {
        let request = self.delete_op(path, version);
        self.execute(request, auto_retry).await?;
        Ok(())
    }

    pub fn set_data_op(&self, path: &str, data: &[u8], version: i32) -> Request {
        Request::SetData(SetDataRequest {
            path: self.normalize_path(path),
            data: Bytes::copy_from_slice(data),
            version,
        })
    }

    pub async fn set_data(
        &self,
        path: &str,
        data: &[u8],
        version: i32,
        auto_retry: bool,
    ) -> Result<Stat> {
        let request = self.set_data_op(path, data, version);
        match self.execute(request, auto_retry).await? {
            Some(Response::SetData(response)) => Ok(response.stat),
            other => Err(unexpected_response(other)),
        }
    }

    pub fn check_op(&self, path: &str, version: i32) -> Request {
        Request::Check(CheckVersionRequest {
            path: self.normalize_path(path),
            version,
        })
    }

    pub async fn check(&self, path: &str, version: i32, auto_retry: bool) -> Result<()> {
        let request = self.check_op(path, version);
        self.execute(request, auto_retry).await?;
        Ok(())
    }

    /// Submits the given operations as one transaction; they all succeed or
    /// all fail.
    pub async fn multi(
        &self,
        ops: Vec<Request>,
        auto_retry: bool,
    ) -> Result<Vec<OpResult>> {
        let request = Request::Multi(MultiRequest::new(ops));
        match self.execute(request, auto_retry).await? {
            Some(Response::Multi(response)) => Ok(response.op_results),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn exists(&self, path: &str, auto_retry: bool) -> Result<Option<Stat>> {
        let request = Request::Exists(ExistsRequest {
            path: self.normalize_path(path),
            watch: false,
        });
        match self
            .session
            .execute_operation(request, auto_retry, &[ErrorKind::NoNode], None)
            .await?
        {
            Some(Response::Exists(response)) => Ok(Some(response.stat)),
            None => Ok(None),
            other => Err(unexpected_response(other)),
        }
    }

    /// `exists` with a watch: when the node is present a data watch is
    /// installed, otherwise an exist watch. The choice follows the error
    /// kind the server actually replied with, so the watch always lands in
    /// the right table.
    pub async fn exists_w(
        &self,
        path: &str,
        auto_retry: bool,
    ) -> Result<(Option<Stat>, Watcher)> {
        let path = self.normalize_path(path);
        let request = Request::Exists(ExistsRequest {
            path: path.clone(),
            watch: true,
        });

        let (installed, on_completed) =
            self.watch_installer(path, |non_error_kind| match non_error_kind {
                None => Some(WatcherType::Data),
                Some(ErrorKind::NoNode) => Some(WatcherType::Exist),
                Some(_) => None,
            });

        let result = self
            .session
            .execute_operation(
                request,
                auto_retry,
                &[ErrorKind::NoNode],
                Some(on_completed),
            )
            .await?;

        let watcher = take_installed(&installed)?;
        match result {
            Some(Response::Exists(response)) => Ok((Some(response.stat), watcher)),
            None => Ok((None, watcher)),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn get_data(&self, path: &str, auto_retry: bool) -> Result<GetDataResponse> {
        let request = Request::GetData(GetDataRequest {
            path: self.normalize_path(path),
            watch: false,
        });
        match self.execute(request, auto_retry).await? {
            Some(Response::GetData(response)) => Ok(response),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn get_data_w(
        &self,
        path: &str,
        auto_retry: bool,
    ) -> Result<(GetDataResponse, Watcher)> {
        let path = self.normalize_path(path);
        let request = Request::GetData(GetDataRequest {
            path: path.clone(),
            watch: true,
        });

        let (installed, on_completed) =
            self.watch_installer(path, |_| Some(WatcherType::Data));

        let result = self
            .session
            .execute_operation(request, auto_retry, &[], Some(on_completed))
            .await?;

        let watcher = take_installed(&installed)?;
        match result {
            Some(Response::GetData(response)) => Ok((response, watcher)),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn get_children(&self, path: &str, auto_retry: bool) -> Result<Vec<String>> {
        let request = Request::GetChildren(GetChildrenRequest {
            path: self.normalize_path(path),
            watch: false,
        });
        match self.execute(request, auto_retry).await? {
            Some(Response::GetChildren(response)) => Ok(response.children),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn get_children_w(
        &self,
        path: &str,
        auto_retry: bool,
    ) -> Result<(Vec<String>, Watcher)> {
        let path = self.normalize_path(path);
        let request = Request::GetChildren(GetChildrenRequest {
            path: path.clone(),
            watch: true,
        });

        let (installed, on_completed) =
            self.watch_installer(path, |_| Some(WatcherType::Child));

        let result = self
            .session
            .execute_operation(request, auto_retry, &[], Some(on_completed))
            .await?;

        let watcher = take_installed(&installed)?;
        match result {
            Some(Response::GetChildren(response)) => Ok((response.children, watcher)),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn get_children2(
        &self,
        path: &str,
        auto_retry: bool,
    ) -> Result<GetChildren2Response> {
        let request = Request::GetChildren2(GetChildren2Request {
            path: self.normalize_path(path),
            watch: false,
        });
        match self.execute(request, auto_retry).await? {
            Some(Response::GetChildren2(response)) => Ok(response),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn get_children2_w(
        &self,
        path: &str,
        auto_retry: bool,
    ) -> Result<(GetChildren2Response, Watcher)> {
        let path = self.normalize_path(path);
        let request = Request::GetChildren2(GetChildren2Request {
            path: path.clone(),
            watch: true,
        });

        let (installed, on_completed) =
            self.watch_installer(path, |_| Some(WatcherType::Child));

        let result = self
            .session
            .execute_operation(request, auto_retry, &[], Some(on_completed))
            .await?;

        let watcher = take_installed(&installed)?;
        match result {
            Some(Response::GetChildren2(response)) => Ok((response, watcher)),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn get_acl(&self, path: &str, auto_retry: bool) -> Result<GetAclResponse> {
        let request = Request::GetAcl(GetAclRequest {
            path: self.normalize_path(path),
        });
        match self.execute(request, auto_retry).await? {
            Some(Response::GetAcl(response)) => Ok(response),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn set_acl(
        &self,
        path: &str,
        acl: &[Acl],
        version: i32,
        auto_retry: bool,
    ) -> Result<Stat> {
        let acl = if acl.is_empty() {
            self.default_acl.clone()
        } else {
            acl.to_vec()
        };
        let request = Request::SetAcl(SetAclRequest {
            path: self.normalize_path(path),
            acl,
            version,
        });
        match self.execute(request, auto_retry).await? {
            Some(Response::SetAcl(response)) => Ok(response.stat),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn sync(&self, path: &str, auto_retry: bool) -> Result<String> {
        let request = Request::Sync(SyncRequest {
            path: self.normalize_path(path),
        });
        match self.execute(request, auto_retry).await? {
            Some(Response::Sync(response)) => Ok(response.path),
            other => Err(unexpected_response(other)),
        }
    }

    /// Creates the whole node hierarchy leading to `path`, tolerating nodes
    /// that already exist and restarting when an ancestor vanishes midway.
    pub async fn create_p(&self, path: &str) -> Result<()> {
        let path = self.normalize_path(path);

        if path == "/" {
            return Ok(());
        }

        let node_names: Vec<&str> = path[1..].split('/').collect();

        loop {
            let mut current = String::new();
            let mut restart = false;

            for node_name in &node_names {
                current.push('/');
                current.push_str(node_name);

                match self
                    .create(&current, b"", CreateMode::Persistent, true)
                    .await
                {
                    Ok(_) => {},
                    Err(error) if error.kind() == ErrorKind::NodeExists => {},
                    Err(error) if error.kind() == ErrorKind::NoNode => {
                        restart = true;
                        break;
                    },
                    Err(error) => return Err(error),
                }
            }

            if !restart {
                return Ok(());
            }
        }
    }

    /// Deletes `path` and everything below it, tolerating concurrent
    /// creations and deletions.
    pub async fn delete_r(&self, path: &str) -> Result<()> {
        let path = self.normalize_path(path);
        self.delete_r_at(path).await
    }

    fn delete_r_at(
        &self,
        path: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            loop {
                let children = match self.get_children(&path, true).await {
                    Ok(children) => children,
                    Err(error) if error.kind() == ErrorKind::NoNode => return Ok(()),
                    Err(error) => return Err(error),
                };

                for child in &children {
                    self.delete_r_at(format!("{path}/{child}")).await?;
                }

                match self.delete(&path, -1, true).await {
                    Ok(()) => return Ok(()),
                    Err(error) if error.kind() == ErrorKind::NotEmpty => {},
                    Err(error) if error.kind() == ErrorKind::NoNode => return Ok(()),
                    Err(error) => return Err(error),
                }
            }
        })
    }

    async fn execute(
        &self,
        request: Request,
        auto_retry: bool,
    ) -> Result<Option<Response>> {
        self.session
            .execute_operation(request, auto_retry, &[], None)
            .await
    }

    /// Builds a completion callback that registers a watcher chosen by
    /// `pick_type` from the observed non-error kind. Installation happens
    /// inside the callback so a failed submission never leaves a dangling
    /// watcher.
    fn watch_installer(
        &self,
        path: String,
        pick_type: impl Fn(Option<ErrorKind>) -> Option<WatcherType> + Send + 'static,
    ) -> (Arc<Mutex<Option<Watcher>>>, CompletionCallback) {
        let installed: Arc<Mutex<Option<Watcher>>> = Arc::new(Mutex::new(None));
        let installed_in_callback = Arc::clone(&installed);
        let session = Arc::clone(&self.session);

        let on_completed: CompletionCallback = Box::new(move |non_error_kind| {
            if let Some(watcher_type) = pick_type(non_error_kind) {
                let watcher = session.add_watcher(watcher_type, &path);
                *installed_in_callback
                    .lock()
                    .expect("watcher slot lock poisoned") = Some(watcher);
            }
        });

        (installed, on_completed)
    }

    fn lock_stop_token(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.stop_token.lock().expect("stop token lock poisoned")
    }
}

fn take_installed(installed: &Arc<Mutex<Option<Watcher>>>) -> Result<Watcher> {
    installed
        .lock()
        .expect("watcher slot lock poisoned")
        .take()
        .ok_or_else(|| ZkError::marshalling("watcher was not installed"))
}

fn unexpected_response(response: Option<Response>) -> ZkError {
    ZkError::marshalling(format!("unexpected response: {response:?}"))
}

fn collapse_slashes(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    let mut previous_was_slash = false;

    for c in path.chars() {
        if c == '/' {
            if previous_was_slash {
                continue;
            }
            previous_was_slash = true;
        } else {
            previous_was_slash = false;
        }
        collapsed.push(c);
    }

    collapsed
}

fn normalize_prefix(path_prefix: &str) -> String {
    debug_assert!(path_prefix.starts_with('/'));
    let mut prefix = collapse_slashes(path_prefix);
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

/// The reconnect loop: allocate a server, bring the session up on it, run
/// the dispatch pair, and go around on transient failures. Terminal session
/// errors, pool exhaustion, and cancellation all end the loop, which then
/// closes the session and fails whatever is still outstanding.
async fn run(
    session: Arc<Session>,
    server_addresses: Arc<AsyncMutex<DelayPool<ServerAddress>>>,
    auth_infos: Arc<Vec<AuthInfo>>,
    stopping: Arc<AtomicBool>,
    running: Arc<watch::Sender<bool>>,
    token: CancellationToken,
) {
    let outcome: Result<()> = async {
        loop {
            let server_address = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                address = async {
                    server_addresses.lock().await.allocate_item().await
                } => address,
            };

            let Some((host_name, port_number)) = server_address else {
                error!(
                    session_id = format_args!("{:#x}", session.get_id()),
                    "client connection failure"
                );
                return Ok(());
            };

            info!(
                session_id = format_args!("{:#x}", session.get_id()),
                server_address = format_args!("{host_name}:{port_number}"),
                "client connection"
            );
            let connect_deadline =
                server_addresses.lock().await.when_next_item_allocable();

            let attempt = async {
                session
                    .connect(&host_name, port_number, connect_deadline, &auth_infos)
                    .await?;

                let session_timeout = session.get_timeout();
                let read_timeout = session.get_read_timeout();
                let reuse_factor = session_timeout.as_secs_f64()
                    / (session_timeout - read_timeout).as_secs_f64();
                server_addresses
                    .lock()
                    .await
                    .reset(reuse_factor, session_timeout);

                session.dispatch().await
            };

            let result = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                result = attempt => result,
            };

            match result {
                Ok(()) => {},
                Err(error) if error.kind().is_transient() => {},
                Err(error) if error.kind().is_terminal() => return Ok(()),
                Err(error) => return Err(error),
            }
        }
    }
    .await;

    if let Err(error) = outcome {
        error!(
            session_id = format_args!("{:#x}", session.get_id()),
            %error,
            "client run failure"
        );
    }

    if stopping.load(Ordering::SeqCst) {
        info!(
            session_id = format_args!("{:#x}", session.get_id()),
            "client stop (passive)"
        );
    } else {
        info!(
            session_id = format_args!("{:#x}", session.get_id()),
            "client stop (active)"
        );
        stopping.store(true, Ordering::SeqCst);
    }

    if !session.is_closed() {
        session.close();
    }

    session.remove_all_listeners();
    let session_timeout = session.get_timeout();
    server_addresses.lock().await.reset(1.0, session_timeout);
    stopping.store(false, Ordering::SeqCst);
    running.send_replace(false);
}
