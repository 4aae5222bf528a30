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
async fn test_reconnect_resends_retryable_operation() -> Result<()> {
    let server = MockServer::bind().await?;
    let config = server.config(4.0);
    let client = Client::new(&config)?;
    let mut listener = client.add_session_listener();

    let server_task = tokio::spawn(async move {
        // First connection: accept the session, swallow the request, drop.
        let mut conn = server.accept().await?;
        conn.accept_session(4000, 0x77, b"secret").await?;

        let (header, _body) = conn.read_request().await?;
        assert_eq!(header.xid(), 1);
        assert_eq!(header.op_code_raw(), OpCode::Create.code());
        drop(conn);

        // Second connection: the session identity comes back to us and the
        // operation is re-sent under a fresh xid.
        let mut conn = server.accept().await?;
        let connect_request = conn.accept_session(4000, 0x77, b"secret").await?;
        assert_eq!(connect_request.session_id, 0x77);
        assert_eq!(&connect_request.passwd[..], b"secret");

        let (header, mut body) = conn.read_request().await?;
        assert_eq!(header.xid(), 2);
        assert_eq!(header.op_code_raw(), OpCode::Create.code());
        let create_request = CreateRequest::deserialize(&mut body)?;
        assert_eq!(create_request.path, "/a");

        conn.reply_with(
            2,
            6,
            0,
            &CreateResponse {
                path: "/a".to_owned(),
            },
        )
        .await?;

        Ok::<MockConn, anyhow::Error>(conn)
    });

    client.start().await?;

    let created_path = client.create("/a", b"x", CreateMode::Persistent, true).await?;
    assert_eq!(created_path, "/a");
    assert_eq!(client.last_zxid(), 6);

    assert_eq!(
        next_change(&mut listener).await?,
        (SessionState::Connecting, SessionEventType::Connecting)
    );
    assert_eq!(
        next_change(&mut listener).await?,
        (SessionState::Connected, SessionEventType::Connected)
    );
    assert_eq!(
        next_change(&mut listener).await?,
        (SessionState::Connecting, SessionEventType::Disconnected)
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
