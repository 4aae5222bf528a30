// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::Result;
use zk_client_rs::{
    cfg::config::AuthEntry,
    client::{
        client::Client,
        session::{SessionEventType, SessionState},
    },
    errors::ErrorKind,
    proto::{codec::DeserializeRecord, handshake::AuthPacket, op_code::OpCode},
};

use crate::integration_tests::common::{MockServer, next_change};

#[tokio::test]
async fn test_auth_failure_is_terminal() -> Result<()> {
    let server = MockServer::bind().await?;
    let mut config = server.config(4.0);
    config.session.auth.push(AuthEntry {
        scheme: "digest".to_owned(),
        credentials: "user:pass".to_owned(),
    });
    let client = Arc::new(Client::new(&config)?);
    let mut listener = client.add_session_listener();

    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await?;
        conn.accept_session(4000, 0x6, b"pw").await?;

        // Auth exchange on the reserved xid.
        let (header, mut body) = conn.read_request().await?;
        assert_eq!(header.xid(), -4);
        assert_eq!(header.op_code_raw(), OpCode::Auth.code());
        let auth_packet = AuthPacket::deserialize(&mut body)?;
        assert_eq!(auth_packet.scheme, "digest");
        assert_eq!(&auth_packet.auth[..], b"user:pass");

        conn.reply(-4, 0, -115).await?;

        Ok::<MockServer, anyhow::Error>(server)
    });

    client.start().await?;

    let pending = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.get_data("/a", true).await })
    };

    let error = pending.await?.expect_err("operation must fail on auth failure");
    assert_eq!(error.kind(), ErrorKind::AuthFailed);

    assert_eq!(
        next_change(&mut listener).await?,
        (SessionState::Connecting, SessionEventType::Connecting)
    );
    assert_eq!(
        next_change(&mut listener).await?,
        (SessionState::AuthFailed, SessionEventType::AuthFailed)
    );

    // No other server is tried past an auth failure.
    client.wait_for_stopped().await;
    assert_eq!(client.session_state(), SessionState::AuthFailed);

    let error = client
        .get_data("/a", true)
        .await
        .expect_err("failed session must reject submissions");
    assert_eq!(error.kind(), ErrorKind::AuthFailed);

    let _server = server_task.await??;
    Ok(())
}
