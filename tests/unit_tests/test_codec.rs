// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use bytes::{Bytes, BytesMut};
use zk_client_rs::{
    errors::ErrorKind,
    proto::{
        codec::{
            DeserializeRecord, SerializeRecord, get_buffer, get_int, get_string,
        },
        data::{OPEN_ACL_UNSAFE, Stat},
        handshake::{AuthPacket, ConnectRequest, ConnectResponse},
        header::{MultiHeader, ReplyHeader, RequestHeader},
        multi::{MultiRequest, MultiResponse},
        op_code::OpCode,
        request::{CreateRequest, DeleteRequest, Request},
        response::{CreateResponse, ErrorResponse, Response},
        watch::{SetWatches, WatcherEvent},
    },
};

use super::decode_hex;

fn serialize(record: &impl SerializeRecord) -> Vec<u8> {
    let mut buf = BytesMut::new();
    record.serialize(&mut buf);
    buf.to_vec()
}

#[test]
fn test_connect_request_layout() -> Result<()> {
    let request = ConnectRequest {
        protocol_version: 0,
        last_zxid_seen: 0,
        time_out: 4000,
        session_id: 0,
        passwd: Bytes::new(),
    };

    let expected = decode_hex(
        "00000000 0000000000000000 00000fa0 0000000000000000 00000000",
    )?;
    assert_eq!(serialize(&request), expected);
    Ok(())
}

#[test]
fn test_connect_response_decode() -> Result<()> {
    let raw = decode_hex("00000000 00000fa0 0000000100000045 00000004 01020304")?;
    let mut data = Bytes::from(raw);
    let response = ConnectResponse::deserialize(&mut data)?;

    assert_eq!(response.protocol_version, 0);
    assert_eq!(response.time_out, 4000);
    assert_eq!(response.session_id, 0x0000000100000045);
    assert_eq!(&response.passwd[..], &[1, 2, 3, 4]);
    assert!(data.is_empty());
    Ok(())
}

#[test]
fn test_headers_layout() -> Result<()> {
    let expected = decode_hex("00000001 00000001")?;
    assert_eq!(serialize(&RequestHeader::new(1, OpCode::Create)), expected);

    let raw = decode_hex("00000001 0000000000000005 00000000")?;
    let mut data = Bytes::from(raw);
    let reply_header = ReplyHeader::deserialize(&mut data)?;
    assert_eq!(reply_header.xid(), 1);
    assert_eq!(reply_header.zxid(), 5);
    assert_eq!(reply_header.err(), 0);
    Ok(())
}

#[test]
fn test_auth_packet_layout() -> Result<()> {
    let packet = AuthPacket {
        auth_type: 0,
        scheme: "digest".to_owned(),
        auth: Bytes::from_static(b"u:p"),
    };

    let expected = decode_hex("00000000 00000006 646967657374 00000003 753a70")?;
    assert_eq!(serialize(&packet), expected);
    Ok(())
}

#[test]
fn test_set_watches_layout() -> Result<()> {
    let request = SetWatches {
        relative_zxid: 5,
        data_watches: vec!["/a".to_owned()],
        exist_watches: vec![],
        child_watches: vec!["/b".to_owned(), "/c".to_owned()],
    };

    let expected = decode_hex(
        "0000000000000005
         00000001 00000002 2f61
         00000000
         00000002 00000002 2f62 00000002 2f63",
    )?;
    assert_eq!(serialize(&request), expected);
    Ok(())
}

#[test]
fn test_watcher_event_decode() -> Result<()> {
    let raw = decode_hex("00000001 00000003 00000002 2f7a")?;
    let mut data = Bytes::from(raw);
    let event = WatcherEvent::deserialize(&mut data)?;

    assert_eq!(event.event_type, 1);
    assert_eq!(event.state, 3);
    assert_eq!(event.path, "/z");
    Ok(())
}

#[test]
fn test_multi_request_envelope() -> Result<()> {
    let request = MultiRequest::new(vec![
        Request::Create(CreateRequest {
            path: "/a".to_owned(),
            data: Bytes::from_static(b"x"),
            acl: vec![OPEN_ACL_UNSAFE.clone()],
            flags: 0,
        }),
        Request::Delete(DeleteRequest {
            path: "/b".to_owned(),
            version: -1,
        }),
    ]);

    let expected = decode_hex(
        "00000001 00 ffffffff
         00000002 2f61 00000001 78
         00000001 0000001f 00000005 776f726c64 00000006 616e796f6e65
         00000000
         00000002 00 ffffffff
         00000002 2f62 ffffffff
         ffffffff 01 ffffffff",
    )?;
    assert_eq!(serialize(&request), expected);

    // The terminator closes the envelope.
    let mut data = Bytes::from(serialize(&request));
    let first = MultiHeader::deserialize(&mut data)?;
    assert_eq!(first.op_code_raw(), OpCode::Create.code());
    assert!(!first.is_done());
    assert_eq!(first.err(), -1);
    Ok(())
}

#[test]
fn test_multi_response_decode() -> Result<()> {
    let reply = MultiResponse {
        op_results: vec![
            (
                OpCode::Create,
                Response::Create(CreateResponse {
                    path: "/a".to_owned(),
                }),
            ),
            (OpCode::Error, Response::Error(ErrorResponse { err: -110 })),
        ],
    };

    let mut data = Bytes::from(serialize(&reply));
    let decoded = MultiResponse::deserialize(&mut data)?;

    assert_eq!(decoded.op_results.len(), 2);
    assert_eq!(decoded.op_results[0].0, OpCode::Create);
    assert!(matches!(
        &decoded.op_results[0].1,
        Response::Create(response) if response.path == "/a"
    ));
    assert_eq!(decoded.op_results[1].0, OpCode::Error);
    assert!(matches!(
        &decoded.op_results[1].1,
        Response::Error(response) if response.err == -110
    ));
    assert!(data.is_empty());
    Ok(())
}

#[test]
fn test_stat_decode() -> Result<()> {
    let stat = Stat {
        czxid: 3,
        mzxid: 5,
        ctime: 1_700_000_000_000,
        mtime: 1_700_000_000_500,
        version: 2,
        cversion: 1,
        aversion: 0,
        ephemeral_owner: 0x45,
        data_length: 11,
        num_children: 4,
        pzxid: 6,
    };

    let mut data = Bytes::from(serialize(&stat));
    assert_eq!(Stat::deserialize(&mut data)?, stat);
    assert!(data.is_empty());
    Ok(())
}

#[test]
fn test_rejects_truncated_input() {
    let mut data = Bytes::from_static(&[0, 1]);
    let error = get_int(&mut data).expect_err("must reject short int");
    assert_eq!(error.kind(), ErrorKind::Marshalling);

    let mut data = Bytes::from_static(&[0, 0, 0, 9, b'x']);
    let error = get_buffer(&mut data).expect_err("must reject short buffer");
    assert_eq!(error.kind(), ErrorKind::Marshalling);
}

#[test]
fn test_rejects_negative_length() {
    let mut data = Bytes::from_static(&[0xff, 0xff, 0xff, 0xff]);
    let error = get_buffer(&mut data).expect_err("must reject negative length");
    assert_eq!(error.kind(), ErrorKind::Marshalling);
}

#[test]
fn test_rejects_invalid_utf8() {
    let mut data = Bytes::from_static(&[0, 0, 0, 1, 0xff]);
    let error = get_string(&mut data).expect_err("must reject invalid utf-8");
    assert_eq!(error.kind(), ErrorKind::Marshalling);
}
