// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use zk_client_rs::{cfg::config::Config, client::client::Client};

fn client_with_prefix(path_prefix: &str) -> Result<Client> {
    let mut config = Config::default();
    config.session.path_prefix = path_prefix.to_owned();
    Ok(Client::new(&config)?)
}

#[test]
fn test_absolute_paths() -> Result<()> {
    let client = client_with_prefix("/")?;

    assert_eq!(client.normalize_path("/"), "/");
    assert_eq!(client.normalize_path("///"), "/");
    assert_eq!(client.normalize_path("/a"), "/a");
    assert_eq!(client.normalize_path("/a/b/"), "/a/b");
    assert_eq!(client.normalize_path("/a//b///c"), "/a/b/c");
    Ok(())
}

#[test]
fn test_relative_paths_get_the_prefix() -> Result<()> {
    let client = client_with_prefix("/apps/demo")?;

    assert_eq!(client.normalize_path("a"), "/apps/demo/a");
    assert_eq!(client.normalize_path("a/b/"), "/apps/demo/a/b");
    assert_eq!(client.normalize_path("/a"), "/a");
    Ok(())
}

#[test]
fn test_prefix_slashes_are_collapsed() -> Result<()> {
    let client = client_with_prefix("//apps///demo")?;
    assert_eq!(client.normalize_path("x"), "/apps/demo/x");
    Ok(())
}
