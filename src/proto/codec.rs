// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{Buf, BufMut, Bytes, BytesMut};
use enum_dispatch::enum_dispatch;

use crate::errors::{Result, ZkError};

/// Serialization half of a wire record.
///
/// A record is the concatenation of its fields in declaration order; all
/// primitives are big-endian. Framing (the 4-byte length prefix) is applied
/// by the transport, never here.
#[enum_dispatch]
pub trait SerializeRecord {
    fn serialize(&self, buf: &mut BytesMut);
}

/// Deserialization half of a wire record. `data` is advanced past the
/// consumed bytes so records can be decoded back to back out of one frame.
pub trait DeserializeRecord: Sized {
    fn deserialize(data: &mut Bytes) -> Result<Self>;
}

pub fn put_boolean(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

pub fn put_int(buf: &mut BytesMut, value: i32) {
    buf.put_i32(value);
}

pub fn put_long(buf: &mut BytesMut, value: i64) {
    buf.put_i64(value);
}

pub fn put_buffer(buf: &mut BytesMut, value: &[u8]) {
    buf.put_i32(value.len() as i32);
    buf.put_slice(value);
}

pub fn put_string(buf: &mut BytesMut, value: &str) {
    put_buffer(buf, value.as_bytes());
}

pub fn put_string_vec(buf: &mut BytesMut, values: &[String]) {
    buf.put_i32(values.len() as i32);
    for value in values {
        put_string(buf, value);
    }
}

pub fn put_vec<T: SerializeRecord>(buf: &mut BytesMut, values: &[T]) {
    buf.put_i32(values.len() as i32);
    for value in values {
        value.serialize(buf);
    }
}

fn check_remaining(data: &Bytes, needed: usize) -> Result<()> {
    if data.remaining() < needed {
        return Err(ZkError::marshalling(format!(
            "buffer underflow: needed {needed} bytes, {} left",
            data.remaining()
        )));
    }
    Ok(())
}

pub fn get_boolean(data: &mut Bytes) -> Result<bool> {
    check_remaining(data, 1)?;
    Ok(data.get_u8() != 0)
}

pub fn get_int(data: &mut Bytes) -> Result<i32> {
    check_remaining(data, 4)?;
    Ok(data.get_i32())
}

pub fn get_long(data: &mut Bytes) -> Result<i64> {
    check_remaining(data, 8)?;
    Ok(data.get_i64())
}

fn get_length(data: &mut Bytes) -> Result<usize> {
    let length = get_int(data)?;
    if length < 0 {
        return Err(ZkError::marshalling(format!("negative length: {length}")));
    }
    check_remaining(data, length as usize)?;
    Ok(length as usize)
}

pub fn get_buffer(data: &mut Bytes) -> Result<Bytes> {
    let length = get_length(data)?;
    Ok(data.split_to(length))
}

pub fn get_string(data: &mut Bytes) -> Result<String> {
    let raw = get_buffer(data)?;
    String::from_utf8(raw.to_vec())
        .map_err(|e| ZkError::marshalling(format!("invalid utf-8 string: {e}")))
}

pub fn get_string_vec(data: &mut Bytes) -> Result<Vec<String>> {
    let count = get_int(data)?;
    if count < 0 {
        return Err(ZkError::marshalling(format!("negative element count: {count}")));
    }
    let mut values = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        values.push(get_string(data)?);
    }
    Ok(values)
}

pub fn get_vec<T: DeserializeRecord>(data: &mut Bytes) -> Result<Vec<T>> {
    let count = get_int(data)?;
    if count < 0 {
        return Err(ZkError::marshalling(format!("negative element count: {count}")));
    }
    let mut values = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        values.push(T::deserialize(data)?);
    }
    Ok(values)
}
