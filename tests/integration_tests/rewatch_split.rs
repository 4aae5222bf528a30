// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::HashSet;

use anyhow::Result;
use bytes::Bytes;
use zk_client_rs::{
    client::client::Client,
    proto::{
        codec::DeserializeRecord, op_code::OpCode, response::GetDataResponse,
        watch::SetWatches,
    },
};

use crate::integration_tests::common::{MockServer, stat_with_mzxid};

const WATCH_COUNT: usize = 5000;

fn watched_path(index: usize) -> String {
    format!("/watched-node-{index:04}-abcdefghijklm")
}

#[tokio::test]
async fn test_rewatch_partitions_paths_across_frames() -> Result<()> {
    let server = MockServer::bind().await?;
    let config = server.config(4.0);
    let client = Client::new(&config)?;

    let server_task = tokio::spawn(async move {
        // First connection: grant every read, installing a data watch each,
        // with zxid 7 on every reply.
        let mut conn = server.accept().await?;
        conn.accept_session(4000, 0x42, b"pw").await?;

        let mut served = 0;
        while served < WATCH_COUNT {
            let (header, _body) = conn.read_request().await?;

            if header.xid() == -2 {
                conn.reply(-2, 0, 0).await?;
                continue;
            }

            assert_eq!(header.op_code_raw(), OpCode::GetData.code());
            conn.reply_with(
                header.xid(),
                7,
                0,
                &GetDataResponse {
                    data: Bytes::new(),
                    stat: stat_with_mzxid(7),
                },
            )
            .await?;
            served += 1;
        }
        drop(conn);

        // Second connection: collect the re-registration frames.
        let mut conn = server.accept().await?;
        let connect_request = conn.accept_session(4000, 0x42, b"pw").await?;
        assert_eq!(connect_request.session_id, 0x42);
        assert_eq!(connect_request.last_zxid_seen, 7);

        let mut frames: Vec<SetWatches> = Vec::new();
        loop {
            let (header, mut body) = conn.read_request().await?;

            match header.xid() {
                -8 => {
                    assert_eq!(header.op_code_raw(), OpCode::SetWatches.code());
                    frames.push(SetWatches::deserialize(&mut body)?);
                    conn.reply(-8, 0, 0).await?;
                },
                -2 => conn.reply(-2, 0, 0).await?,
                xid => {
                    // The sentinel read marks the end of the rewatch phase.
                    assert_eq!(header.op_code_raw(), OpCode::Exists.code());
                    conn.reply(xid, 0, -101).await?;
                    break;
                },
            }
        }

        Ok::<Vec<SetWatches>, anyhow::Error>(frames)
    });

    client.start().await?;

    let mut watchers = Vec::with_capacity(WATCH_COUNT);
    for index in 0..WATCH_COUNT {
        let (_, watcher) = client.get_data_w(&watched_path(index), true).await?;
        watchers.push(watcher);
    }
    assert_eq!(client.last_zxid(), 7);

    // The server has dropped the connection; this submission rides the next
    // one and therefore follows the whole rewatch exchange.
    let result = client.exists("/sentinel", true).await?;
    assert!(result.is_none());

    let frames = server_task.await??;

    // The combined path bytes exceed one frame's cap, so the registration
    // splits, every frame pinned to the last seen zxid.
    assert!(frames.len() >= 2, "expected >= 2 frames, got {}", frames.len());

    let mut seen: HashSet<String> = HashSet::new();
    for frame in &frames {
        assert_eq!(frame.relative_zxid, 7);
        assert!(frame.exist_watches.is_empty());
        assert!(frame.child_watches.is_empty());

        for path in &frame.data_watches {
            assert!(seen.insert(path.clone()), "duplicated path {path}");
        }
    }

    let expected: HashSet<String> = (0..WATCH_COUNT).map(watched_path).collect();
    assert_eq!(seen, expected);

    client.stop();
    client.wait_for_stopped().await;
    Ok(())
}
