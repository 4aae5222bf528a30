// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use tracing::info;
use zk_client_rs::{
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    client::client::Client,
    proto::data::CreateMode,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _init_logger = init_logger("tests/config_logger.yaml")?;

    // Load config
    let cfg = resolve_config_path("tests/config.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let client = Client::new(&cfg).context("failed to build client")?;

    client.start().await.context("start failed")?;
    info!(
        session_id = format_args!("{:#x}", client.session_id()),
        "session started"
    );

    // Build a small hierarchy and read it back
    client.create_p("demo/greetings").await?;
    client
        .set_data("demo/greetings", b"hello", -1, true)
        .await?;

    let response = client.get_data("demo/greetings", true).await?;
    info!(
        data = format_args!("{:?}", response.data),
        version = response.stat.version,
        "read back"
    );

    // Watch for a change made by our own write
    let (_, watcher) = client.get_data_w("demo/greetings", true).await?;
    client
        .set_data("demo/greetings", b"hello again", -1, true)
        .await?;
    let event = watcher.wait_for_event().await?;
    info!(event = ?event, "watch fired");

    let children = client.get_children("demo", true).await?;
    info!(children = ?children, "listing");

    client.delete_r("demo").await?;

    client.stop();
    client.wait_for_stopped().await;
    info!("session stopped");

    Ok(())
}
