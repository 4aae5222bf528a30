// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{Bytes, BytesMut};

use crate::{
    errors::{Result, ZkError},
    proto::codec::{
        DeserializeRecord, SerializeRecord, get_int, get_long, get_string,
        get_string_vec, put_int, put_long, put_string, put_string_vec,
    },
};

/// Kind of node change announced by a server notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherEventType {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

impl WatcherEventType {
    pub fn code(self) -> i32 {
        match self {
            WatcherEventType::NodeCreated => 1,
            WatcherEventType::NodeDeleted => 2,
            WatcherEventType::NodeDataChanged => 3,
            WatcherEventType::NodeChildrenChanged => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => WatcherEventType::NodeCreated,
            2 => WatcherEventType::NodeDeleted,
            3 => WatcherEventType::NodeDataChanged,
            4 => WatcherEventType::NodeChildrenChanged,
            _ => return None,
        })
    }
}

/// Body of a server notification (reply header xid −1).
#[derive(Debug, Clone, PartialEq)]
pub struct WatcherEvent {
    pub event_type: i32,
    pub state: i32,
    pub path: String,
}

impl WatcherEvent {
    /// Decodes the event type, rejecting kinds the engine does not route.
    pub fn typed_event(&self) -> Result<WatcherEventType> {
        WatcherEventType::from_code(self.event_type).ok_or_else(|| {
            ZkError::marshalling(format!("unknown watcher event type: {}", self.event_type))
        })
    }
}

impl SerializeRecord for WatcherEvent {
    fn serialize(&self, buf: &mut BytesMut) {
        put_int(buf, self.event_type);
        put_int(buf, self.state);
        put_string(buf, &self.path);
    }
}

impl DeserializeRecord for WatcherEvent {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            event_type: get_int(data)?,
            state: get_int(data)?,
            path: get_string(data)?,
        })
    }
}

/// Re-registration frame sent after a reconnect (xid −8), carrying the
/// surviving watch paths partitioned by watcher type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetWatches {
    pub relative_zxid: i64,
    pub data_watches: Vec<String>,
    pub exist_watches: Vec<String>,
    pub child_watches: Vec<String>,
}

impl SerializeRecord for SetWatches {
    fn serialize(&self, buf: &mut BytesMut) {
        put_long(buf, self.relative_zxid);
        put_string_vec(buf, &self.data_watches);
        put_string_vec(buf, &self.exist_watches);
        put_string_vec(buf, &self.child_watches);
    }
}

impl DeserializeRecord for SetWatches {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            relative_zxid: get_long(data)?,
            data_watches: get_string_vec(data)?,
            exist_watches: get_string_vec(data)?,
            child_watches: get_string_vec(data)?,
        })
    }
}
