// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use zk_client_rs::{
    client::{client::Client, session::SessionState},
    proto::op_code::OpCode,
};

use crate::integration_tests::common::{MockConn, MockServer};

#[tokio::test]
async fn test_idle_sender_pings() -> Result<()> {
    let server = MockServer::bind().await?;
    // timeout 1.2s → pings after 0.4s of sender idleness
    let config = server.config(1.2);
    let client = Client::new(&config)?;

    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await?;
        conn.accept_session(1200, 0x3, b"pw").await?;

        for _ in 0..2 {
            let (header, body) = conn.read_request().await?;
            assert_eq!(header.xid(), -2);
            assert_eq!(header.op_code_raw(), OpCode::Ping.code());
            assert!(body.is_empty());
            conn.reply(-2, 0, 0).await?;
        }

        Ok::<MockConn, anyhow::Error>(conn)
    });

    client.start().await?;

    // Two ping round trips happen while we sit idle; the connection must
    // survive them.
    let _conn = server_task.await??;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.session_state(), SessionState::Connected);

    client.stop();
    client.wait_for_stopped().await;
    Ok(())
}
