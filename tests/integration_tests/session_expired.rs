// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::Result;
use zk_client_rs::{
    client::{
        client::Client,
        session::{SessionEventType, SessionState},
    },
    errors::ErrorKind,
    proto::op_code::OpCode,
};

use crate::integration_tests::common::{MockServer, next_change};

#[tokio::test]
async fn test_session_expiry_is_terminal() -> Result<()> {
    let server = MockServer::bind().await?;
    let config = server.config(4.0);
    let client = Arc::new(Client::new(&config)?);
    let mut listener = client.add_session_listener();

    let server_task = tokio::spawn(async move {
        // First connection: the session is granted, a request arrives but is
        // never answered, then the connection drops.
        let mut conn = server.accept().await?;
        conn.accept_session(4000, 0x5, b"pw").await?;

        let (header, _body) = conn.read_request().await?;
        assert_eq!(header.op_code_raw(), OpCode::GetData.code());
        drop(conn);

        // Second connection: the server declares the session expired.
        let mut conn = server.accept().await?;
        let connect_request = conn.expect_connect().await?;
        assert_eq!(connect_request.session_id, 0x5);
        conn.accept_session_expired().await?;

        Ok::<MockServer, anyhow::Error>(server)
    });

    client.start().await?;

    let pending = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.get_data("/a", true).await })
    };

    let error = pending.await?.expect_err("operation must fail on expiry");
    assert_eq!(error.kind(), ErrorKind::SessionExpired);

    // CONNECTING → CONNECTED → DISCONNECTED → CLOSED(SESSION_EXPIRED)
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
        (SessionState::Closed, SessionEventType::SessionExpired)
    );

    // The run loop stops without trying another server.
    client.wait_for_stopped().await;
    assert_eq!(client.session_state(), SessionState::Closed);

    // Later submissions fail fast with the terminal kind.
    let error = client
        .get_data("/a", true)
        .await
        .expect_err("closed session must reject submissions");
    assert_eq!(error.kind(), ErrorKind::SessionExpired);

    let _server = server_task.await??;
    Ok(())
}
