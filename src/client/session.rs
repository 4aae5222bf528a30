// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicI32, AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    client::{deque::Deque, transport::Transport},
    errors::{ErrorKind, Result, ZkError},
    proto::{
        codec::{DeserializeRecord, SerializeRecord},
        handshake::{AuthPacket, ConnectRequest, ConnectResponse},
        header::{ReplyHeader, RequestHeader},
        op_code::OpCode,
        request::Request,
        response::Response,
        watch::{SetWatches, WatcherEvent, WatcherEventType},
    },
};

/// Reserved xid of server-initiated notifications.
pub(crate) const NOTIFICATION_XID: i32 = -1;
/// Reserved xid of keepalive pings.
pub(crate) const PING_XID: i32 = -2;
/// Reserved xid of auth packets sent during connection establishment.
pub(crate) const AUTH_XID: i32 = -4;
/// Reserved xid of watch re-registration frames.
pub(crate) const SET_WATCHES_XID: i32 = -8;
/// Reserved xid of the best-effort close-session frame.
pub(crate) const CLOSE_SESSION_XID: i32 = -11;

const PROTOCOL_VERSION: i32 = 0;

/// Hard bound on pending plus in-flight operations.
const MAX_NUMBER_OF_PENDING_OPERATIONS: usize = 1 << 16;

/// A set-watches frame may not exceed this size; paths beyond it spill into
/// further frames.
const MAX_SET_WATCHES_SIZE: usize = 1 << 17;

/// Request header plus an empty set-watches body (zxid + 3 vector counts).
const SET_WATCHES_OVERHEAD_SIZE: usize = RequestHeader::SIZE + 8 + 3 * 4;

/// Length prefix of one serialized path.
const STRING_OVERHEAD_SIZE: usize = 4;

const LISTENER_MAILBOX_SIZE: usize = 64;

/// Connection state of a session. `Closed` and `AuthFailed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Closed,
    AuthFailed,
}

impl SessionState {
    /// The error kind outstanding work fails with when the session rests in
    /// this state, if it is terminal.
    pub fn terminal_error_kind(self) -> Option<ErrorKind> {
        match self {
            SessionState::Closed => Some(ErrorKind::SessionExpired),
            SessionState::AuthFailed => Some(ErrorKind::AuthFailed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.terminal_error_kind().is_some()
    }
}

/// What caused a state transition; delivered to listeners next to the new
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventType {
    Connecting,
    Disconnected,
    Connected,
    Closed,
    SessionExpired,
    AuthFailed,
}

pub type StateChange = (SessionState, SessionEventType);

/// Receiving end of a per-listener mailbox of state changes. The mailbox is
/// bounded; the engine never blocks on it and drops changes a slow listener
/// failed to drain.
#[derive(Debug)]
pub struct SessionListener {
    id: u64,
    state_changes: mpsc::Receiver<StateChange>,
}

impl SessionListener {
    /// Next state change, or `None` once the listener has been removed.
    pub async fn get_state_change(&mut self) -> Option<StateChange> {
        self.state_changes.recv().await
    }
}

/// Table a watch registration lives in; determines which notification kinds
/// fire it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherType {
    Data,
    Exist,
    Child,
}

impl WatcherType {
    fn index(self) -> usize {
        match self {
            WatcherType::Data => 0,
            WatcherType::Exist => 1,
            WatcherType::Child => 2,
        }
    }
}

/// Auth scheme plus opaque credentials, presented on every (re)connect.
pub type AuthInfo = (String, Bytes);

type WatchSlot = oneshot::Sender<Result<WatcherEventType>>;

/// One-shot registration for a future node change. Dropping the handle
/// cancels the watch; the registry skips cancelled slots when firing and
/// when re-registering after a reconnect.
#[derive(Debug)]
pub struct Watcher {
    watcher_type: WatcherType,
    path: String,
    event: oneshot::Receiver<Result<WatcherEventType>>,
}

impl Watcher {
    pub fn watcher_type(&self) -> WatcherType {
        self.watcher_type
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Resolves with the event kind once the watch fires, or with the
    /// terminal session error when the session ends first.
    pub async fn wait_for_event(self) -> Result<WatcherEventType> {
        match self.event.await {
            Ok(result) => result,
            Err(_) => Err(ZkError::connection_loss(format!(
                "watcher abandoned: path={:?}",
                self.path
            ))),
        }
    }

    /// Explicitly cancels the watch.
    pub fn remove(self) {}
}

/// Callback invoked the moment an operation is known to have been accepted
/// by the server, with the observed non-error kind. The façade installs
/// watchers in here so a failed submission never leaves a dangling watcher.
pub(crate) type CompletionCallback = Box<dyn FnOnce(Option<ErrorKind>) + Send>;

/// An operation travelling through the engine: queued, then in flight, then
/// resolved through its one-shot response slot.
pub(crate) struct Operation {
    id: u64,
    op_code: OpCode,
    request: Request,
    auto_retry: bool,
    non_error_kinds: &'static [ErrorKind],
    on_completed: Option<CompletionCallback>,
    response: oneshot::Sender<Result<Option<Response>>>,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("op_code", &self.op_code)
            .field("request", &self.request)
            .field("auto_retry", &self.auto_retry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct SessionInfo {
    timeout: Duration,
    id: i64,
    password: Bytes,
    last_zxid: i64,
}

/// The session engine: state machine, xid allocation, in-flight map, watch
/// registry, ping timer, and the sender/receiver dispatch pair.
///
/// All blocking happens in transport I/O and queue waits; every lock below
/// guards a short critical section and is never held across a suspension
/// point.
pub struct Session {
    state: Mutex<SessionState>,
    info: Mutex<SessionInfo>,
    listeners: DashMap<u64, mpsc::Sender<StateChange>>,
    next_listener_id: AtomicU64,
    next_xid: AtomicI32,
    next_operation_id: AtomicU64,
    pending_operations: Deque<Operation>,
    in_flight_operations: Mutex<BTreeMap<i32, Operation>>,
    watchers: Mutex<[HashMap<String, Vec<WatchSlot>>; 3]>,
    transport: Mutex<Option<Arc<Transport>>>,
}

impl Session {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(SessionState::Closed),
            info: Mutex::new(SessionInfo {
                timeout,
                id: 0,
                password: Bytes::new(),
                last_zxid: 0,
            }),
            listeners: DashMap::new(),
            next_listener_id: AtomicU64::new(0),
            next_xid: AtomicI32::new(1),
            next_operation_id: AtomicU64::new(0),
            pending_operations: Deque::new(MAX_NUMBER_OF_PENDING_OPERATIONS),
            in_flight_operations: Mutex::new(BTreeMap::new()),
            watchers: Mutex::new([HashMap::new(), HashMap::new(), HashMap::new()]),
            transport: Mutex::new(None),
        }
    }

    pub(crate) fn add_listener(&self) -> SessionListener {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(LISTENER_MAILBOX_SIZE);
        self.listeners.insert(id, sender);
        SessionListener {
            id,
            state_changes: receiver,
        }
    }

    pub(crate) fn remove_listener(&self, listener: SessionListener) {
        self.listeners.remove(&listener.id);
    }

    pub(crate) fn remove_all_listeners(&self) {
        self.listeners.clear();
    }

    pub(crate) fn get_timeout(&self) -> Duration {
        self.lock_info().timeout
    }

    /// Read deadline of the steady-state connection.
    pub(crate) fn get_read_timeout(&self) -> Duration {
        self.get_timeout() * 2 / 3
    }

    /// Sender idleness after which a ping is emitted.
    fn get_min_ping_interval(&self) -> Duration {
        self.get_timeout() / 3
    }

    pub(crate) fn get_id(&self) -> i64 {
        self.lock_info().id
    }

    pub(crate) fn get_last_zxid(&self) -> i64 {
        self.lock_info().last_zxid
    }

    pub(crate) fn get_state(&self) -> SessionState {
        *self.state.lock().expect("session state lock poisoned")
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.get_state().is_terminal()
    }

    /// Connects to one server and brings the session up on it: handshake,
    /// auth, watch re-registration. `connect_deadline` bounds the whole
    /// attempt; it is the time at which the delay pool permits trying the
    /// next server.
    pub(crate) async fn connect(
        &self,
        host_name: &str,
        port_number: u16,
        connect_deadline: Instant,
        auth_infos: &[AuthInfo],
    ) -> Result<()> {
        let event_type = if self.is_closed() {
            SessionEventType::Connecting
        } else {
            SessionEventType::Disconnected
        };
        self.set_state(SessionState::Connecting, event_type);

        let transport =
            Transport::connect(host_name, port_number, remaining(connect_deadline))
                .await?;

        if let Err(error) = self
            .establish(&transport, connect_deadline, auth_infos)
            .await
        {
            // A session that was never negotiated is told apart to the
            // server with a best-effort close frame.
            if self.get_id() == 0 {
                let _ = transport.write(&close_session_frame()).await;
            }
            transport.close().await;
            return Err(error);
        }

        let old_transport = self
            .transport
            .lock()
            .expect("transport lock poisoned")
            .replace(Arc::new(transport));
        if let Some(old_transport) = old_transport
            && !old_transport.is_closed()
        {
            old_transport.close().await;
        }

        self.set_state(SessionState::Connected, SessionEventType::Connected);
        Ok(())
    }

    async fn establish(
        &self,
        transport: &Transport,
        connect_deadline: Instant,
        auth_infos: &[AuthInfo],
    ) -> Result<()> {
        let request = {
            let info = self.lock_info();
            ConnectRequest {
                protocol_version: PROTOCOL_VERSION,
                last_zxid_seen: info.last_zxid,
                time_out: info.timeout.as_millis() as i32,
                session_id: info.id,
                passwd: info.password.clone(),
            }
        };

        let mut buf = BytesMut::new();
        request.serialize(&mut buf);
        transport.write(&buf).await?;

        let mut frame = transport.read(remaining(connect_deadline)).await?;
        let response = ConnectResponse::deserialize(&mut frame)?;

        if response.time_out <= 0 {
            self.reset(SessionState::Closed, SessionEventType::SessionExpired);
            return Err(ZkError::new(
                ErrorKind::SessionExpired,
                format!("request: {request:?}"),
            ));
        }

        self.authenticate(transport, connect_deadline, auth_infos)
            .await?;
        self.rewatch(transport, connect_deadline).await?;

        let mut info = self.lock_info();
        info.timeout = Duration::from_millis(response.time_out as u64);
        info.id = response.session_id;
        info.password = response.passwd;
        Ok(())
    }

    async fn authenticate(
        &self,
        transport: &Transport,
        connect_deadline: Instant,
        auth_infos: &[AuthInfo],
    ) -> Result<()> {
        for (scheme, auth) in auth_infos {
            let request = Request::Auth(AuthPacket {
                auth_type: 0,
                scheme: scheme.clone(),
                auth: auth.clone(),
            });

            match self
                .execute_connect_operation(transport, connect_deadline, AUTH_XID, &request)
                .await
            {
                Err(error) if error.kind() == ErrorKind::AuthFailed => {
                    self.reset(SessionState::AuthFailed, SessionEventType::AuthFailed);
                    return Err(error);
                },
                other => other?,
            };
        }
        Ok(())
    }

    /// Re-registers every unfired watcher on a fresh connection, packing
    /// paths into set-watches frames of at most `MAX_SET_WATCHES_SIZE`
    /// bytes, partitioned by watcher type.
    async fn rewatch(&self, transport: &Transport, connect_deadline: Instant) -> Result<()> {
        let last_zxid = self.get_last_zxid();
        let mut requests: Vec<SetWatches> = Vec::new();

        {
            let watchers = self.lock_watchers();
            let mut request_size = SET_WATCHES_OVERHEAD_SIZE;
            let mut paths: [Vec<String>; 3] = [Vec::new(), Vec::new(), Vec::new()];

            for (watcher_type, path_to_watchers) in watchers.iter().enumerate() {
                for (path, slots) in path_to_watchers {
                    if slots.iter().all(|slot| slot.is_closed()) {
                        continue;
                    }

                    let path_size = STRING_OVERHEAD_SIZE + path.len();

                    if request_size + path_size > MAX_SET_WATCHES_SIZE {
                        requests.push(SetWatches {
                            relative_zxid: last_zxid,
                            data_watches: std::mem::take(&mut paths[0]),
                            exist_watches: std::mem::take(&mut paths[1]),
                            child_watches: std::mem::take(&mut paths[2]),
                        });
                        request_size = SET_WATCHES_OVERHEAD_SIZE;
                    }

                    paths[watcher_type].push(path.clone());
                    request_size += path_size;
                }
            }

            if request_size > SET_WATCHES_OVERHEAD_SIZE {
                requests.push(SetWatches {
                    relative_zxid: last_zxid,
                    data_watches: std::mem::take(&mut paths[0]),
                    exist_watches: std::mem::take(&mut paths[1]),
                    child_watches: std::mem::take(&mut paths[2]),
                });
            }
        }

        for request in requests {
            self.execute_connect_operation(
                transport,
                connect_deadline,
                SET_WATCHES_XID,
                &Request::SetWatches(request),
            )
            .await?;
        }
        Ok(())
    }

    /// Synchronous request/reply exchange used during connection
    /// establishment, before the dispatch pair takes over. Notifications and
    /// ping replies arriving in between are processed in place.
    async fn execute_connect_operation(
        &self,
        transport: &Transport,
        connect_deadline: Instant,
        xid: i32,
        request: &Request,
    ) -> Result<Response> {
        let op_code = request.op_code();
        let mut buf = BytesMut::new();
        RequestHeader::new(xid, op_code).serialize(&mut buf);
        request.serialize(&mut buf);
        transport.write(&buf).await?;

        loop {
            let mut frame = transport.read(remaining(connect_deadline)).await?;
            let reply_header = ReplyHeader::deserialize(&mut frame)?;

            if reply_header.zxid() > 0 {
                self.lock_info().last_zxid = reply_header.zxid();
            }

            if reply_header.err() != 0 {
                let kind = error_kind_of(reply_header.err())?;
                return Err(ZkError::new(kind, format!("request: {request:?}")));
            }

            if reply_header.xid() == xid {
                return Response::deserialize(op_code, &mut frame);
            }

            match reply_header.xid() {
                NOTIFICATION_XID => {
                    let watcher_event = WatcherEvent::deserialize(&mut frame)?;
                    self.fire_watcher_event(
                        watcher_event.typed_event()?,
                        &watcher_event.path,
                    );
                },
                PING_XID => {},
                _ => warn!(reply_xid = reply_header.xid(), "ignored reply"),
            }
        }
    }

    /// Runs the sender/receiver pair until either side fails; the other side
    /// is torn down with it and the failure surfaces as a connection loss to
    /// the reconnect loop.
    pub(crate) async fn dispatch(&self) -> Result<()> {
        debug_assert_eq!(self.get_state(), SessionState::Connected);

        let transport = self
            .transport
            .lock()
            .expect("transport lock poisoned")
            .clone()
            .ok_or_else(|| ZkError::connection_loss("no established transport"))?;

        tokio::select! {
            result = self.send_requests(&transport) => result,
            result = self.receive_responses(&transport) => result,
        }
    }

    /// Ends the session explicitly. Outstanding work fails as if the session
    /// had expired.
    pub(crate) fn close(&self) {
        debug_assert!(!self.is_closed());
        self.reset(SessionState::Closed, SessionEventType::Closed);
    }

    /// Submits one operation and waits for its resolution. `non_error_kinds`
    /// lists reply errors the caller treats as a successful null response;
    /// `on_completed` runs the moment the reply is consumed, before the
    /// result is handed back.
    pub(crate) async fn execute_operation(
        &self,
        request: Request,
        auto_retry: bool,
        non_error_kinds: &'static [ErrorKind],
        on_completed: Option<CompletionCallback>,
    ) -> Result<Option<Response>> {
        if let Some(kind) = self.get_state().terminal_error_kind() {
            return Err(ZkError::new(kind, format!("request: {request:?}")));
        }

        let request_repr = format!("{request:?}");
        let operation_id = self.next_operation_id.fetch_add(1, Ordering::Relaxed);
        let (response_sender, response_receiver) = oneshot::channel();
        let operation = Operation {
            id: operation_id,
            op_code: request.op_code(),
            request,
            auto_retry,
            non_error_kinds,
            on_completed,
            response: response_sender,
        };

        self.pending_operations
            .insert_tail(operation)
            .await
            .map_err(|error| {
                ZkError::new(error.kind(), format!("request: {request_repr}"))
            })?;

        // Dropping the guard (caller cancellation) detaches the operation
        // from the pending queue if it has not been sent yet.
        let mut guard = PendingOperationGuard {
            session: self,
            operation_id,
            armed: true,
        };
        let result = response_receiver.await;
        guard.armed = false;

        match result {
            Ok(result) => result,
            Err(_) => Err(ZkError::connection_loss(format!(
                "request dropped: {request_repr}"
            ))),
        }
    }

    /// Registers a watcher and returns the user-facing handle.
    pub(crate) fn add_watcher(&self, watcher_type: WatcherType, path: &str) -> Watcher {
        let (sender, receiver) = oneshot::channel();
        self.lock_watchers()[watcher_type.index()]
            .entry(path.to_owned())
            .or_default()
            .push(sender);

        Watcher {
            watcher_type,
            path: path.to_owned(),
            event: receiver,
        }
    }

    async fn send_requests(&self, transport: &Transport) -> Result<()> {
        loop {
            let operation = match self.pending_operations.try_remove_head(false) {
                Some(operation) => operation,
                None => {
                    match timeout(
                        self.get_min_ping_interval(),
                        self.pending_operations.remove_head(false),
                    )
                    .await
                    {
                        Ok(removed) => removed?,
                        Err(_) => {
                            debug!("ping");
                            transport.write(&ping_frame()).await?;
                            continue;
                        },
                    }
                },
            };

            let xid = self.next_xid();
            let mut buf = BytesMut::new();
            RequestHeader::new(xid, operation.op_code).serialize(&mut buf);
            operation.request.serialize(&mut buf);
            debug!(xid, op_code = ?operation.op_code, "request");

            // Recorded before the write so a reply racing the write's
            // completion always finds its operation.
            self.lock_in_flight().insert(xid, operation);
            transport.write(&buf).await?;
        }
    }

    async fn receive_responses(&self, transport: &Transport) -> Result<()> {
        loop {
            let mut frame = transport.read(self.get_read_timeout()).await?;
            let reply_header = ReplyHeader::deserialize(&mut frame)?;

            if reply_header.zxid() > 0 {
                self.lock_info().last_zxid = reply_header.zxid();
            }

            let xid = reply_header.xid();

            if xid < 0 {
                match xid {
                    NOTIFICATION_XID => {
                        let watcher_event = WatcherEvent::deserialize(&mut frame)?;
                        self.fire_watcher_event(
                            watcher_event.typed_event()?,
                            &watcher_event.path,
                        );
                    },
                    PING_XID => {},
                    _ => warn!(reply_xid = xid, "ignored reply"),
                }
                continue;
            }

            let Some(mut operation) = self.lock_in_flight().remove(&xid) else {
                warn!(
                    reply_xid = xid,
                    reply_err = reply_header.err(),
                    "missing operation"
                );
                continue;
            };

            self.pending_operations.commit_item_removals(1);

            if operation.response.is_closed() {
                continue;
            }

            if reply_header.err() == 0 {
                let response = Response::deserialize(operation.op_code, &mut frame)?;

                if let Some(on_completed) = operation.on_completed.take() {
                    on_completed(None);
                }
                let _ = operation.response.send(Ok(Some(response)));
            } else {
                let kind = error_kind_of(reply_header.err())?;

                if operation.non_error_kinds.contains(&kind) {
                    if let Some(on_completed) = operation.on_completed.take() {
                        on_completed(Some(kind));
                    }
                    let _ = operation.response.send(Ok(None));
                } else {
                    let message = format!("request: {:?}", operation.request);
                    let _ = operation.response.send(Err(ZkError::new(kind, message)));
                }
            }
        }
    }

    fn next_xid(&self) -> i32 {
        loop {
            let result = self.next_xid.fetch_update(
                Ordering::Relaxed,
                Ordering::Relaxed,
                |xid| Some(xid.wrapping_add(1) & 0x7FFF_FFFF),
            );

            // 0 is the unassigned-session sentinel; skip it on wrap-around.
            if let Ok(xid) = result
                && xid != 0
            {
                return xid;
            }
        }
    }

    /// Resolves every unfired watcher a notification addresses and drops
    /// them from the registry.
    fn fire_watcher_event(&self, watcher_event_type: WatcherEventType, path: &str) {
        let watcher_types: &[WatcherType] = match watcher_event_type {
            WatcherEventType::NodeCreated => &[WatcherType::Exist],
            WatcherEventType::NodeDeleted => &[WatcherType::Data, WatcherType::Child],
            WatcherEventType::NodeDataChanged => &[WatcherType::Data],
            WatcherEventType::NodeChildrenChanged => &[WatcherType::Child],
        };

        let mut watchers = self.lock_watchers();

        for watcher_type in watcher_types {
            let Some(slots) = watchers[watcher_type.index()].remove(path) else {
                warn!(?watcher_event_type, path, "missing watcher");
                continue;
            };

            for slot in slots {
                if slot.is_closed() {
                    continue;
                }
                let _ = slot.send(Ok(watcher_event_type));
            }
        }
    }

    /// Applies a state transition and its consequences for outstanding work,
    /// then fans the change out to listeners.
    fn set_state(&self, new_state: SessionState, event_type: SessionEventType) {
        let old_state = self.get_state();
        let mut error_kind: Option<ErrorKind> = None;

        match old_state {
            SessionState::Connecting => {
                if new_state == SessionState::Connecting {
                    return;
                }

                match new_state {
                    SessionState::Connected => {},
                    SessionState::Closed => {
                        error_kind =
                            Some(if event_type == SessionEventType::SessionExpired {
                                ErrorKind::SessionExpired
                            } else {
                                ErrorKind::ConnectionLoss
                            });
                    },
                    SessionState::AuthFailed => error_kind = Some(ErrorKind::AuthFailed),
                    SessionState::Connecting => {},
                }
            },
            SessionState::Connected => {
                debug_assert!(matches!(
                    new_state,
                    SessionState::Connecting | SessionState::Closed
                ));
                error_kind = Some(ErrorKind::ConnectionLoss);
            },
            SessionState::Closed | SessionState::AuthFailed => {
                debug_assert_eq!(new_state, SessionState::Connecting);
            },
        }

        if let Some(error_kind) = error_kind {
            let need_retry = error_kind == ErrorKind::ConnectionLoss;

            match new_state.terminal_error_kind() {
                None => self.abort_in_flight_operations(need_retry, error_kind),
                Some(terminal_kind) => self.abort_session(terminal_kind),
            }
        }

        *self.state.lock().expect("session state lock poisoned") = new_state;
        info!(
            session_id = format_args!("{:#x}", self.get_id()),
            session_state = ?new_state,
            session_event_type = ?event_type,
            "session state change"
        );

        for listener in self.listeners.iter() {
            let _ = listener.value().try_send((new_state, event_type));
        }
    }

    /// Connection dropped but the session survives: retryable in-flight
    /// operations go back to the pending queue, the rest fail transiently.
    fn abort_in_flight_operations(&self, need_retry: bool, error_kind: ErrorKind) {
        let in_flight = std::mem::take(&mut *self.lock_in_flight());
        let reserved_slots = in_flight.len();
        let mut retryable = Vec::new();

        for (_xid, operation) in in_flight {
            if operation.response.is_closed() {
                continue;
            }

            if need_retry && operation.auto_retry {
                retryable.push(operation);
            } else {
                fail_operation(operation, error_kind);
            }
        }

        self.pending_operations
            .commit_and_reinsert(reserved_slots, retryable);
    }

    /// Terminal transition: everything outstanding fails with the terminal
    /// kind, the queue closes, watchers are aborted, and the connection is
    /// shut down after a best-effort close-session frame.
    fn abort_session(&self, terminal_kind: ErrorKind) {
        let transport = self
            .transport
            .lock()
            .expect("transport lock poisoned")
            .take();
        if let Some(transport) = transport
            && !transport.is_closed()
        {
            let session_id = self.get_id();
            tokio::spawn(async move {
                if session_id != 0 {
                    let _ = transport.write(&close_session_frame()).await;
                }
                transport.close().await;
            });
        }

        while let Some(operation) = self.pending_operations.try_remove_head(true) {
            if operation.response.is_closed() {
                continue;
            }
            fail_operation(operation, terminal_kind);
        }
        self.pending_operations.close(terminal_kind);

        let in_flight = std::mem::take(&mut *self.lock_in_flight());
        for (_xid, operation) in in_flight {
            if operation.response.is_closed() {
                continue;
            }
            fail_operation(operation, terminal_kind);
        }

        let mut watchers = self.lock_watchers();
        for path_to_watchers in watchers.iter_mut() {
            for (path, slots) in path_to_watchers.drain() {
                for slot in slots {
                    if slot.is_closed() {
                        continue;
                    }
                    let _ = slot.send(Err(ZkError::new(
                        terminal_kind,
                        format!("watcher: path={path:?}"),
                    )));
                }
            }
        }
    }

    /// Drives the session into a terminal state and wipes its identity so a
    /// later restart negotiates a fresh session.
    fn reset(&self, final_state: SessionState, event_type: SessionEventType) {
        debug_assert!(final_state.is_terminal());
        self.set_state(final_state, event_type);

        let mut info = self.lock_info();
        info.id = 0;
        info.password = Bytes::new();
        info.last_zxid = 0;
        drop(info);

        self.pending_operations.reset(MAX_NUMBER_OF_PENDING_OPERATIONS);
    }

    fn lock_info(&self) -> MutexGuard<'_, SessionInfo> {
        self.info.lock().expect("session info lock poisoned")
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, BTreeMap<i32, Operation>> {
        self.in_flight_operations
            .lock()
            .expect("in-flight lock poisoned")
    }

    fn lock_watchers(&self) -> MutexGuard<'_, [HashMap<String, Vec<WatchSlot>>; 3]> {
        self.watchers.lock().expect("watch registry lock poisoned")
    }
}

struct PendingOperationGuard<'a> {
    session: &'a Session,
    operation_id: u64,
    armed: bool,
}

impl Drop for PendingOperationGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session
                .pending_operations
                .try_remove_item(|operation| operation.id == self.operation_id, true);
        }
    }
}

fn fail_operation(operation: Operation, kind: ErrorKind) {
    let message = format!("request: {:?}", operation.request);
    let _ = operation.response.send(Err(ZkError::new(kind, message)));
}

fn error_kind_of(code: i32) -> Result<ErrorKind> {
    ErrorKind::from_code(code)
        .ok_or_else(|| ZkError::marshalling(format!("unknown error code: {code}")))
}

fn ping_frame() -> Bytes {
    let mut buf = BytesMut::new();
    RequestHeader::new(PING_XID, OpCode::Ping).serialize(&mut buf);
    buf.freeze()
}

fn close_session_frame() -> Bytes {
    let mut buf = BytesMut::new();
    RequestHeader::new(CLOSE_SESSION_XID, OpCode::CloseSession).serialize(&mut buf);
    buf.freeze()
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
