// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{Buf, Bytes, BytesMut};
use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, I32, I64, Immutable, IntoBytes, KnownLayout,
};

use crate::{
    errors::{Result, ZkError},
    proto::{
        codec::{DeserializeRecord, SerializeRecord},
        op_code::OpCode,
    },
};

fn read_header<T: ZFromBytes + Copy>(data: &mut Bytes, name: &str) -> Result<T> {
    let size = size_of::<T>();
    if data.remaining() < size {
        return Err(ZkError::marshalling(format!(
            "buffer underflow: {name} needs {size} bytes, {} left",
            data.remaining()
        )));
    }
    let header = T::read_from_bytes(&data[..size])
        .map_err(|_| ZkError::marshalling(format!("failed to read {name}")))?;
    data.advance(size);
    Ok(header)
}

/// Fixed 8-byte header preceding every request body on an established
/// connection.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RequestHeader {
    xid: I32<BigEndian>,
    op_code: I32<BigEndian>,
}

impl RequestHeader {
    pub const SIZE: usize = size_of::<Self>();

    pub fn new(xid: i32, op_code: OpCode) -> Self {
        Self {
            xid: I32::new(xid),
            op_code: I32::new(op_code.code()),
        }
    }

    pub fn xid(&self) -> i32 {
        self.xid.get()
    }

    pub fn op_code_raw(&self) -> i32 {
        self.op_code.get()
    }
}

impl SerializeRecord for RequestHeader {
    fn serialize(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(self.as_bytes());
    }
}

impl DeserializeRecord for RequestHeader {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        read_header(data, "request header")
    }
}

/// Fixed 16-byte header preceding every reply body.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ReplyHeader {
    xid: I32<BigEndian>,
    zxid: I64<BigEndian>,
    err: I32<BigEndian>,
}

impl ReplyHeader {
    pub const SIZE: usize = size_of::<Self>();

    pub fn new(xid: i32, zxid: i64, err: i32) -> Self {
        Self {
            xid: I32::new(xid),
            zxid: I64::new(zxid),
            err: I32::new(err),
        }
    }

    pub fn xid(&self) -> i32 {
        self.xid.get()
    }

    pub fn zxid(&self) -> i64 {
        self.zxid.get()
    }

    pub fn err(&self) -> i32 {
        self.err.get()
    }
}

impl SerializeRecord for ReplyHeader {
    fn serialize(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(self.as_bytes());
    }
}

impl DeserializeRecord for ReplyHeader {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        read_header(data, "reply header")
    }
}

/// 9-byte sub-operation header of the transactional envelope. A `done`
/// marker with `op_code = -1` terminates the sequence.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct MultiHeader {
    op_code: I32<BigEndian>,
    done: u8,
    err: I32<BigEndian>,
}

impl MultiHeader {
    pub const SIZE: usize = size_of::<Self>();

    pub fn op(op_code: OpCode) -> Self {
        Self {
            op_code: I32::new(op_code.code()),
            done: 0,
            err: I32::new(-1),
        }
    }

    pub fn result(op_code: OpCode, err: i32) -> Self {
        Self {
            op_code: I32::new(op_code.code()),
            done: 0,
            err: I32::new(err),
        }
    }

    pub fn terminator() -> Self {
        Self {
            op_code: I32::new(-1),
            done: 1,
            err: I32::new(-1),
        }
    }

    pub fn op_code_raw(&self) -> i32 {
        self.op_code.get()
    }

    pub fn is_done(&self) -> bool {
        self.done != 0
    }

    pub fn err(&self) -> i32 {
        self.err.get()
    }
}

impl SerializeRecord for MultiHeader {
    fn serialize(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(self.as_bytes());
    }
}

impl DeserializeRecord for MultiHeader {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        read_header(data, "multi header")
    }
}
