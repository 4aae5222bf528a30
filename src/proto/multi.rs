// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{Bytes, BytesMut};

use crate::{
    errors::{Result, ZkError},
    proto::{
        codec::{DeserializeRecord, SerializeRecord},
        header::MultiHeader,
        op_code::OpCode,
        request::Request,
        response::Response,
    },
};

/// Transactional envelope: sub-operations framed back to back, each behind a
/// [`MultiHeader`], terminated by a `done` marker. The frame size is whatever
/// the serialized sub-op headers and bodies add up to; there is no separate
/// size computation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiRequest {
    pub ops: Vec<Request>,
}

impl MultiRequest {
    pub fn new(ops: Vec<Request>) -> Self {
        Self { ops }
    }
}

impl SerializeRecord for MultiRequest {
    fn serialize(&self, buf: &mut BytesMut) {
        for op in &self.ops {
            MultiHeader::op(op.op_code()).serialize(buf);
            op.serialize(buf);
        }
        MultiHeader::terminator().serialize(buf);
    }
}

/// Per-sub-operation outcome of a multi reply. Failed sub-operations come
/// back as [`Response::Error`] under [`OpCode::Error`].
pub type OpResult = (OpCode, Response);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiResponse {
    pub op_results: Vec<OpResult>,
}

impl SerializeRecord for MultiResponse {
    fn serialize(&self, buf: &mut BytesMut) {
        for (op_code, response) in &self.op_results {
            let err = match response {
                Response::Error(error) => error.err,
                _ => 0,
            };
            MultiHeader::result(*op_code, err).serialize(buf);
            response.serialize_body(buf);
        }
        MultiHeader::terminator().serialize(buf);
    }
}

impl DeserializeRecord for MultiResponse {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        let mut op_results = Vec::new();

        loop {
            let header = MultiHeader::deserialize(data)?;

            if header.is_done() {
                break;
            }

            let op_code = OpCode::from_code(header.op_code_raw()).ok_or_else(|| {
                ZkError::marshalling(format!(
                    "unknown op code in multi response: {}",
                    header.op_code_raw()
                ))
            })?;
            let response = Response::deserialize(op_code, data)?;
            op_results.push((op_code, response));
        }

        Ok(Self { op_results })
    }
}

impl Response {
    /// Serializes the body of one decoded response; used to build multi
    /// replies in tests and mock servers.
    pub(crate) fn serialize_body(&self, buf: &mut BytesMut) {
        match self {
            Response::Create(r) => r.serialize(buf),
            Response::Create2(r) => r.serialize(buf),
            Response::Exists(r) => r.serialize(buf),
            Response::GetData(r) => r.serialize(buf),
            Response::SetData(r) => r.serialize(buf),
            Response::GetAcl(r) => r.serialize(buf),
            Response::SetAcl(r) => r.serialize(buf),
            Response::GetChildren(r) => r.serialize(buf),
            Response::GetChildren2(r) => r.serialize(buf),
            Response::Sync(r) => r.serialize(buf),
            Response::Multi(r) => r.serialize(buf),
            Response::Error(r) => r.serialize(buf),
            Response::Empty => {},
        }
    }
}
