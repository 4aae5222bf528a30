// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use zk_client_rs::{
    client::{client::Client, session::WatcherType},
    proto::{
        codec::DeserializeRecord, op_code::OpCode, request::ExistsRequest,
        watch::WatcherEventType,
    },
};

use crate::integration_tests::common::{MockConn, MockServer};

#[tokio::test]
async fn test_exists_watch_on_missing_node() -> Result<()> {
    let server = MockServer::bind().await?;
    let config = server.config(4.0);
    let client = Client::new(&config)?;

    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await?;
        conn.accept_session(4000, 0x9, b"pw").await?;

        let (header, mut body) = conn.read_request().await?;
        assert_eq!(header.xid(), 1);
        assert_eq!(header.op_code_raw(), OpCode::Exists.code());
        let exists_request = ExistsRequest::deserialize(&mut body)?;
        assert_eq!(exists_request.path, "/z");
        assert!(exists_request.watch);

        // NO_NODE; the client registers an exist watch instead of a data
        // watch.
        conn.reply(1, 0, -101).await?;

        Ok::<MockConn, anyhow::Error>(conn)
    });

    client.start().await?;

    let (result, watcher) = client.exists_w("/z", false).await?;
    assert!(result.is_none());
    assert_eq!(watcher.watcher_type(), WatcherType::Exist);
    assert_eq!(watcher.path(), "/z");

    let mut conn = server_task.await??;
    conn.send_watcher_event(WatcherEventType::NodeCreated, "/z")
        .await?;

    let event = watcher.wait_for_event().await?;
    assert_eq!(event, WatcherEventType::NodeCreated);

    client.stop();
    client.wait_for_stopped().await;
    Ok(())
}
