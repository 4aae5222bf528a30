// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context as _, Result};
use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};
use zk_client_rs::{
    cfg::config::Config,
    client::session::{SessionListener, StateChange},
    proto::{
        codec::{DeserializeRecord, SerializeRecord},
        data::Stat,
        handshake::{ConnectRequest, ConnectResponse},
        header::{ReplyHeader, RequestHeader},
        watch::{WatcherEvent, WatcherEventType},
    },
};

/// A scripted stand-in for one ensemble server; each test drives the exact
/// frame exchange it expects.
pub struct MockServer {
    listener: TcpListener,
}

impl MockServer {
    pub async fn bind() -> Result<Self> {
        Ok(Self {
            listener: TcpListener::bind("127.0.0.1:0").await?,
        })
    }

    pub fn port(&self) -> u16 {
        self.listener
            .local_addr()
            .expect("listener has a local addr")
            .port()
    }

    /// Client config pointing at this mock as a single-server ensemble.
    pub fn config(&self, timeout_secs: f64) -> Config {
        let mut config = Config::default();
        config.ensemble.servers = vec![format!("127.0.0.1:{}", self.port())];
        config.session.timeout = Duration::from_secs_f64(timeout_secs);
        config
    }

    pub async fn accept(&self) -> Result<MockConn> {
        let (stream, _) = timeout(Duration::from_secs(5), self.listener.accept())
            .await
            .context("no inbound connection")??;
        stream.set_nodelay(true)?;
        Ok(MockConn { stream })
    }
}

pub struct MockConn {
    stream: TcpStream,
}

impl MockConn {
    pub async fn read_frame(&mut self) -> Result<Bytes> {
        let frame = timeout(Duration::from_secs(5), async {
            let mut length_buf = [0u8; 4];
            self.stream.read_exact(&mut length_buf).await?;
            let length = u32::from_be_bytes(length_buf) as usize;
            let mut body = vec![0u8; length];
            self.stream.read_exact(&mut body).await?;
            Ok::<_, std::io::Error>(Bytes::from(body))
        })
        .await
        .context("no inbound frame")??;
        Ok(frame)
    }

    pub async fn write_frame(&mut self, body: &[u8]) -> Result<()> {
        self.stream
            .write_all(&(body.len() as u32).to_be_bytes())
            .await?;
        self.stream.write_all(body).await?;
        Ok(())
    }

    pub async fn expect_connect(&mut self) -> Result<ConnectRequest> {
        let mut frame = self.read_frame().await?;
        Ok(ConnectRequest::deserialize(&mut frame)?)
    }

    /// Handshake: consumes the connect request and acknowledges the session.
    pub async fn accept_session(
        &mut self,
        time_out: i32,
        session_id: i64,
        passwd: &[u8],
    ) -> Result<ConnectRequest> {
        let request = self.expect_connect().await?;
        let response = ConnectResponse {
            protocol_version: 0,
            time_out,
            session_id,
            passwd: Bytes::copy_from_slice(passwd),
        };
        let mut buf = BytesMut::new();
        response.serialize(&mut buf);
        self.write_frame(&buf).await?;
        Ok(request)
    }

    /// Rejects the presented session as expired (non-positive timeout).
    pub async fn accept_session_expired(&mut self) -> Result<()> {
        let response = ConnectResponse {
            protocol_version: 0,
            time_out: 0,
            session_id: 0,
            passwd: Bytes::new(),
        };
        let mut buf = BytesMut::new();
        response.serialize(&mut buf);
        self.write_frame(&buf).await
    }

    pub async fn read_request(&mut self) -> Result<(RequestHeader, Bytes)> {
        let mut frame = self.read_frame().await?;
        let header = RequestHeader::deserialize(&mut frame)?;
        Ok((header, frame))
    }

    pub async fn reply(&mut self, xid: i32, zxid: i64, err: i32) -> Result<()> {
        let mut buf = BytesMut::new();
        ReplyHeader::new(xid, zxid, err).serialize(&mut buf);
        self.write_frame(&buf).await
    }

    pub async fn reply_with(
        &mut self,
        xid: i32,
        zxid: i64,
        err: i32,
        body: &impl SerializeRecord,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        ReplyHeader::new(xid, zxid, err).serialize(&mut buf);
        body.serialize(&mut buf);
        self.write_frame(&buf).await
    }

    pub async fn send_watcher_event(
        &mut self,
        event_type: WatcherEventType,
        path: &str,
    ) -> Result<()> {
        let event = WatcherEvent {
            event_type: event_type.code(),
            state: 3,
            path: path.to_owned(),
        };
        self.reply_with(-1, 0, 0, &event).await
    }
}

pub fn stat_with_mzxid(mzxid: i64) -> Stat {
    Stat {
        mzxid,
        ..Stat::default()
    }
}

pub async fn next_change(listener: &mut SessionListener) -> Result<StateChange> {
    timeout(Duration::from_secs(5), listener.get_state_change())
        .await
        .context("no state change")?
        .context("listener detached")
}
