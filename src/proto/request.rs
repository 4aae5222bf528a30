// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{Bytes, BytesMut};
use enum_dispatch::enum_dispatch;

use crate::{
    errors::Result,
    proto::{
        codec::{
            DeserializeRecord, SerializeRecord, get_boolean, get_buffer, get_int,
            get_long, get_string, get_vec, put_boolean, put_buffer, put_int, put_long,
            put_string, put_vec,
        },
        data::Acl,
        handshake::AuthPacket,
        multi::MultiRequest,
        op_code::OpCode,
        watch::SetWatches,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub path: String,
    pub data: Bytes,
    pub acl: Vec<Acl>,
    pub flags: i32,
}

impl SerializeRecord for CreateRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
        put_buffer(buf, &self.data);
        put_vec(buf, &self.acl);
        put_int(buf, self.flags);
    }
}

impl DeserializeRecord for CreateRequest {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
            data: get_buffer(data)?,
            acl: get_vec(data)?,
            flags: get_int(data)?,
        })
    }
}

/// Same layout as [`CreateRequest`]; the reply carries the created node's
/// stat in addition to its path.
#[derive(Debug, Clone, PartialEq)]
pub struct Create2Request {
    pub path: String,
    pub data: Bytes,
    pub acl: Vec<Acl>,
    pub flags: i32,
}

impl SerializeRecord for Create2Request {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
        put_buffer(buf, &self.data);
        put_vec(buf, &self.acl);
        put_int(buf, self.flags);
    }
}

impl DeserializeRecord for Create2Request {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
            data: get_buffer(data)?,
            acl: get_vec(data)?,
            flags: get_int(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub path: String,
    pub version: i32,
}

impl SerializeRecord for DeleteRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
        put_int(buf, self.version);
    }
}

impl DeserializeRecord for DeleteRequest {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
            version: get_int(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExistsRequest {
    pub path: String,
    pub watch: bool,
}

impl SerializeRecord for ExistsRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
        put_boolean(buf, self.watch);
    }
}

impl DeserializeRecord for ExistsRequest {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
            watch: get_boolean(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetDataRequest {
    pub path: String,
    pub watch: bool,
}

impl SerializeRecord for GetDataRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
        put_boolean(buf, self.watch);
    }
}

impl DeserializeRecord for GetDataRequest {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
            watch: get_boolean(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetDataRequest {
    pub path: String,
    pub data: Bytes,
    pub version: i32,
}

impl SerializeRecord for SetDataRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
        put_buffer(buf, &self.data);
        put_int(buf, self.version);
    }
}

impl DeserializeRecord for SetDataRequest {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
            data: get_buffer(data)?,
            version: get_int(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetAclRequest {
    pub path: String,
}

impl SerializeRecord for GetAclRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
    }
}

impl DeserializeRecord for GetAclRequest {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetAclRequest {
    pub path: String,
    pub acl: Vec<Acl>,
    pub version: i32,
}

impl SerializeRecord for SetAclRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
        put_vec(buf, &self.acl);
        put_int(buf, self.version);
    }
}

impl DeserializeRecord for SetAclRequest {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
            acl: get_vec(data)?,
            version: get_int(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetChildrenRequest {
    pub path: String,
    pub watch: bool,
}

impl SerializeRecord for GetChildrenRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
        put_boolean(buf, self.watch);
    }
}

impl DeserializeRecord for GetChildrenRequest {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
            watch: get_boolean(data)?,
        })
    }
}

/// Same layout as [`GetChildrenRequest`]; the reply adds the parent stat.
#[derive(Debug, Clone, PartialEq)]
pub struct GetChildren2Request {
    pub path: String,
    pub watch: bool,
}

impl SerializeRecord for GetChildren2Request {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
        put_boolean(buf, self.watch);
    }
}

impl DeserializeRecord for GetChildren2Request {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
            watch: get_boolean(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    pub path: String,
}

impl SerializeRecord for SyncRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
    }
}

impl DeserializeRecord for SyncRequest {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckVersionRequest {
    pub path: String,
    pub version: i32,
}

impl SerializeRecord for CheckVersionRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
        put_int(buf, self.version);
    }
}

impl DeserializeRecord for CheckVersionRequest {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
            version: get_int(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconfigRequest {
    pub joining_servers: String,
    pub leaving_servers: String,
    pub new_members: String,
    pub cur_config_id: i64,
}

impl SerializeRecord for ReconfigRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.joining_servers);
        put_string(buf, &self.leaving_servers);
        put_string(buf, &self.new_members);
        put_long(buf, self.cur_config_id);
    }
}

impl DeserializeRecord for ReconfigRequest {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            joining_servers: get_string(data)?,
            leaving_servers: get_string(data)?,
            new_members: get_string(data)?,
            cur_config_id: get_long(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveWatchesRequest {
    pub path: String,
    pub watcher_type: i32,
}

impl SerializeRecord for RemoveWatchesRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
        put_int(buf, self.watcher_type);
    }
}

impl DeserializeRecord for RemoveWatchesRequest {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
            watcher_type: get_int(data)?,
        })
    }
}

/// Every request body the engine can frame behind a request header. Ping and
/// close-session frames are header-only and never appear here.
#[enum_dispatch(SerializeRecord)]
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Create(CreateRequest),
    Create2(Create2Request),
    Delete(DeleteRequest),
    Exists(ExistsRequest),
    GetData(GetDataRequest),
    SetData(SetDataRequest),
    GetAcl(GetAclRequest),
    SetAcl(SetAclRequest),
    GetChildren(GetChildrenRequest),
    GetChildren2(GetChildren2Request),
    Sync(SyncRequest),
    Check(CheckVersionRequest),
    Multi(MultiRequest),
    Reconfig(ReconfigRequest),
    RemoveWatches(RemoveWatchesRequest),
    Auth(AuthPacket),
    SetWatches(SetWatches),
}

impl Request {
    /// The op code this request is framed under.
    pub fn op_code(&self) -> OpCode {
        match self {
            Request::Create(_) => OpCode::Create,
            Request::Create2(_) => OpCode::Create2,
            Request::Delete(_) => OpCode::Delete,
            Request::Exists(_) => OpCode::Exists,
            Request::GetData(_) => OpCode::GetData,
            Request::SetData(_) => OpCode::SetData,
            Request::GetAcl(_) => OpCode::GetAcl,
            Request::SetAcl(_) => OpCode::SetAcl,
            Request::GetChildren(_) => OpCode::GetChildren,
            Request::GetChildren2(_) => OpCode::GetChildren2,
            Request::Sync(_) => OpCode::Sync,
            Request::Check(_) => OpCode::Check,
            Request::Multi(_) => OpCode::Multi,
            Request::Reconfig(_) => OpCode::Reconfig,
            Request::RemoveWatches(_) => OpCode::RemoveWatches,
            Request::Auth(_) => OpCode::Auth,
            Request::SetWatches(_) => OpCode::SetWatches,
        }
    }
}
