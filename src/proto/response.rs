// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{Bytes, BytesMut};

use crate::{
    errors::Result,
    proto::{
        codec::{
            DeserializeRecord, SerializeRecord, get_buffer, get_int, get_string,
            get_string_vec, get_vec, put_buffer, put_int, put_string, put_string_vec,
            put_vec,
        },
        data::{Acl, Stat},
        multi::MultiResponse,
        op_code::OpCode,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct CreateResponse {
    pub path: String,
}

impl SerializeRecord for CreateResponse {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
    }
}

impl DeserializeRecord for CreateResponse {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Create2Response {
    pub path: String,
    pub stat: Stat,
}

impl SerializeRecord for Create2Response {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
        self.stat.serialize(buf);
    }
}

impl DeserializeRecord for Create2Response {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
            stat: Stat::deserialize(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExistsResponse {
    pub stat: Stat,
}

impl SerializeRecord for ExistsResponse {
    fn serialize(&self, buf: &mut BytesMut) {
        self.stat.serialize(buf);
    }
}

impl DeserializeRecord for ExistsResponse {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            stat: Stat::deserialize(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetDataResponse {
    pub data: Bytes,
    pub stat: Stat,
}

impl SerializeRecord for GetDataResponse {
    fn serialize(&self, buf: &mut BytesMut) {
        put_buffer(buf, &self.data);
        self.stat.serialize(buf);
    }
}

impl DeserializeRecord for GetDataResponse {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            data: get_buffer(data)?,
            stat: Stat::deserialize(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetDataResponse {
    pub stat: Stat,
}

impl SerializeRecord for SetDataResponse {
    fn serialize(&self, buf: &mut BytesMut) {
        self.stat.serialize(buf);
    }
}

impl DeserializeRecord for SetDataResponse {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            stat: Stat::deserialize(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetAclResponse {
    pub acl: Vec<Acl>,
    pub stat: Stat,
}

impl SerializeRecord for GetAclResponse {
    fn serialize(&self, buf: &mut BytesMut) {
        put_vec(buf, &self.acl);
        self.stat.serialize(buf);
    }
}

impl DeserializeRecord for GetAclResponse {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            acl: get_vec(data)?,
            stat: Stat::deserialize(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetAclResponse {
    pub stat: Stat,
}

impl SerializeRecord for SetAclResponse {
    fn serialize(&self, buf: &mut BytesMut) {
        self.stat.serialize(buf);
    }
}

impl DeserializeRecord for SetAclResponse {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            stat: Stat::deserialize(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetChildrenResponse {
    pub children: Vec<String>,
}

impl SerializeRecord for GetChildrenResponse {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string_vec(buf, &self.children);
    }
}

impl DeserializeRecord for GetChildrenResponse {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            children: get_string_vec(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetChildren2Response {
    pub children: Vec<String>,
    pub stat: Stat,
}

impl SerializeRecord for GetChildren2Response {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string_vec(buf, &self.children);
        self.stat.serialize(buf);
    }
}

impl DeserializeRecord for GetChildren2Response {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            children: get_string_vec(data)?,
            stat: Stat::deserialize(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncResponse {
    pub path: String,
}

impl SerializeRecord for SyncResponse {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
    }
}

impl DeserializeRecord for SyncResponse {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            path: get_string(data)?,
        })
    }
}

/// Per-sub-operation failure body inside a multi response.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub err: i32,
}

impl SerializeRecord for ErrorResponse {
    fn serialize(&self, buf: &mut BytesMut) {
        put_int(buf, self.err);
    }
}

impl DeserializeRecord for ErrorResponse {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            err: get_int(data)?,
        })
    }
}

/// Decoded reply body, keyed by the op code of the originating request.
/// Operations whose replies carry no body (delete, check, auth, set-watches,
/// reconfig, remove-watches, ping) decode to `Empty`.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Create(CreateResponse),
    Create2(Create2Response),
    Exists(ExistsResponse),
    GetData(GetDataResponse),
    SetData(SetDataResponse),
    GetAcl(GetAclResponse),
    SetAcl(SetAclResponse),
    GetChildren(GetChildrenResponse),
    GetChildren2(GetChildren2Response),
    Sync(SyncResponse),
    Multi(MultiResponse),
    Error(ErrorResponse),
    Empty,
}

impl Response {
    pub fn deserialize(op_code: OpCode, data: &mut Bytes) -> Result<Self> {
        Ok(match op_code {
            OpCode::Create => Response::Create(CreateResponse::deserialize(data)?),
            OpCode::Create2 => Response::Create2(Create2Response::deserialize(data)?),
            OpCode::Exists => Response::Exists(ExistsResponse::deserialize(data)?),
            OpCode::GetData => Response::GetData(GetDataResponse::deserialize(data)?),
            OpCode::SetData => Response::SetData(SetDataResponse::deserialize(data)?),
            OpCode::GetAcl => Response::GetAcl(GetAclResponse::deserialize(data)?),
            OpCode::SetAcl => Response::SetAcl(SetAclResponse::deserialize(data)?),
            OpCode::GetChildren => {
                Response::GetChildren(GetChildrenResponse::deserialize(data)?)
            },
            OpCode::GetChildren2 => {
                Response::GetChildren2(GetChildren2Response::deserialize(data)?)
            },
            OpCode::Sync => Response::Sync(SyncResponse::deserialize(data)?),
            OpCode::Multi => Response::Multi(MultiResponse::deserialize(data)?),
            OpCode::Error => Response::Error(ErrorResponse::deserialize(data)?),
            _ => Response::Empty,
        })
    }
}
