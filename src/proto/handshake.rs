// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{Bytes, BytesMut};

use crate::{
    errors::Result,
    proto::codec::{
        DeserializeRecord, SerializeRecord, get_buffer, get_int, get_long, get_string,
        put_buffer, put_int, put_long, put_string,
    },
};

/// First frame of every connection; carries the session identity to resume
/// (all zeros/empty for a fresh session).
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRequest {
    pub protocol_version: i32,
    pub last_zxid_seen: i64,
    pub time_out: i32,
    pub session_id: i64,
    pub passwd: Bytes,
}

impl SerializeRecord for ConnectRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        put_int(buf, self.protocol_version);
        put_long(buf, self.last_zxid_seen);
        put_int(buf, self.time_out);
        put_long(buf, self.session_id);
        put_buffer(buf, &self.passwd);
    }
}

impl DeserializeRecord for ConnectRequest {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            protocol_version: get_int(data)?,
            last_zxid_seen: get_long(data)?,
            time_out: get_int(data)?,
            session_id: get_long(data)?,
            passwd: get_buffer(data)?,
        })
    }
}

/// Server's answer to a [`ConnectRequest`]. A non-positive `time_out` means
/// the presented session is expired.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectResponse {
    pub protocol_version: i32,
    pub time_out: i32,
    pub session_id: i64,
    pub passwd: Bytes,
}

impl SerializeRecord for ConnectResponse {
    fn serialize(&self, buf: &mut BytesMut) {
        put_int(buf, self.protocol_version);
        put_int(buf, self.time_out);
        put_long(buf, self.session_id);
        put_buffer(buf, &self.passwd);
    }
}

impl DeserializeRecord for ConnectResponse {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            protocol_version: get_int(data)?,
            time_out: get_int(data)?,
            session_id: get_long(data)?,
            passwd: get_buffer(data)?,
        })
    }
}

/// Credentials presented right after the handshake, one packet per
/// configured auth entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthPacket {
    pub auth_type: i32,
    pub scheme: String,
    pub auth: Bytes,
}

impl SerializeRecord for AuthPacket {
    fn serialize(&self, buf: &mut BytesMut) {
        put_int(buf, self.auth_type);
        put_string(buf, &self.scheme);
        put_buffer(buf, &self.auth);
    }
}

impl DeserializeRecord for AuthPacket {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            auth_type: get_int(data)?,
            scheme: get_string(data)?,
            auth: get_buffer(data)?,
        })
    }
}
