// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
    time::timeout,
};
use tracing::debug;

use crate::errors::{Result, ZkError};

/// Upper bound on an inbound frame; a length beyond this is treated as a
/// corrupted stream rather than an allocation request.
const MAX_FRAME_SIZE: usize = 1 << 26;

/// Byte-framed channel over a single TCP connection. Every frame is
/// length-prefixed with a 4-byte big-endian integer.
///
/// A transport is single-use: once closed it cannot reconnect. All I/O
/// failures and timeouts surface as transient connection-loss errors so the
/// session engine can distinguish them from terminal session errors.
#[derive(Debug)]
pub struct Transport {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    closed: AtomicBool,
}

impl Transport {
    /// Establishes a TCP connection within `connect_timeout`.
    pub async fn connect(
        host_name: &str,
        port_number: u16,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let stream =
            timeout(connect_timeout, TcpStream::connect((host_name, port_number)))
                .await??;
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();

        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        })
    }

    /// Writes one frame, prepending the length prefix.
    pub async fn write(&self, message: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(ZkError::connection_loss("transport is closed"));
        }

        let mut frame = BytesMut::with_capacity(4 + message.len());
        frame.put_u32(message.len() as u32);
        frame.extend_from_slice(message);

        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        debug!(frame_size = message.len(), "frame written");
        Ok(())
    }

    /// Reads one frame, failing with a connection loss when nothing arrives
    /// within `read_timeout`.
    pub async fn read(&self, read_timeout: Duration) -> Result<Bytes> {
        if self.is_closed() {
            return Err(ZkError::connection_loss("transport is closed"));
        }

        let mut reader = self.reader.lock().await;
        let frame = timeout(read_timeout, read_frame(&mut reader)).await??;
        debug!(frame_size = frame.len(), "frame read");
        Ok(frame)
    }

    /// Marks the transport closed and half-closes the write side. Pending
    /// reads on the other half fail on their own once the peer drops us.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Bytes> {
    let mut length_buf = [0u8; 4];
    reader.read_exact(&mut length_buf).await?;
    let length = u32::from_be_bytes(length_buf) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ZkError::marshalling(format!(
            "inbound frame of {length} bytes exceeds the {MAX_FRAME_SIZE} byte cap"
        )));
    }

    let mut frame = BytesMut::zeroed(length);
    reader.read_exact(&mut frame).await?;
    Ok(frame.freeze())
}
