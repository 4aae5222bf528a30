// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use zk_client_rs::{
    client::{
        client::Client,
        session::{SessionEventType, SessionState},
    },
    proto::{
        codec::DeserializeRecord, data::CreateMode, op_code::OpCode,
        request::CreateRequest, response::CreateResponse,
    },
};

use crate::integration_tests::common::{MockConn, MockServer, next_change};

#[tokio::test]
async fn test_create_happy_path() -> Result<()> {
    let server = MockServer::bind().await?;
    let config = server.config(4.0);
    let client = Client::new(&config)?;
    let mut listener = client.add_session_listener();

    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await?;

        let connect_request = conn.accept_session(4000, 0x1234, b"pw").await?;
        assert_eq!(connect_request.protocol_version, 0);
        assert_eq!(connect_request.session_id, 0);
        assert_eq!(connect_request.last_zxid_seen, 0);
        assert_eq!(connect_request.time_out, 4000);

        let (header, mut body) = conn.read_request().await?;
        assert_eq!(header.xid(), 1);
        assert_eq!(header.op_code_raw(), OpCode::Create.code());

        let create_request = CreateRequest::deserialize(&mut body)?;
        assert_eq!(create_request.path, "/a");
        assert_eq!(&create_request.data[..], b"x");
        assert_eq!(create_request.flags, 0);
        assert!(body.is_empty());

        conn.reply_with(
            1,
            5,
            0,
            &CreateResponse {
                path: "/a".to_owned(),
            },
        )
        .await?;

        Ok::<MockConn, anyhow::Error>(conn)
    });

    client.start().await?;

    let created_path = client.create("/a", b"x", CreateMode::Persistent, false).await?;
    assert_eq!(created_path, "/a");
    assert_eq!(client.session_id(), 0x1234);
    assert_eq!(client.last_zxid(), 5);

    assert_eq!(
        next_change(&mut listener).await?,
        (SessionState::Connecting, SessionEventType::Connecting)
    );
    assert_eq!(
        next_change(&mut listener).await?,
        (SessionState::Connected, SessionEventType::Connected)
    );

    let _conn = server_task.await??;
    client.stop();
    client.wait_for_stopped().await;
    Ok(())
}
