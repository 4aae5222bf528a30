// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    client::client::ServerAddress,
    errors::{ErrorKind, ZkError},
};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// The server ensemble any member of which can serve the session.
    pub ensemble: EnsembleConfig,
    /// Session negotiation knobs and auth credentials.
    pub session: SessionConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EnsembleConfig {
    /// `host:port` endpoints; tried in randomized rotation.
    pub servers: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SessionConfig {
    #[serde(rename = "timeout_secs", with = "serde_secs_f64")]
    /// Requested session timeout; the server may negotiate it down.
    pub timeout: Duration,

    #[serde(default = "default_path_prefix")]
    /// Prefix applied to relative paths before submission.
    pub path_prefix: String,

    #[serde(default)]
    /// Credentials presented on every (re)connect.
    pub auth: Vec<AuthEntry>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AuthEntry {
    /// Auth scheme, e.g. `digest`.
    pub scheme: String,
    /// Scheme-specific credential string.
    pub credentials: String,
}

fn default_path_prefix() -> String {
    "/".to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ensemble: EnsembleConfig {
                servers: vec!["127.0.0.1:2181".to_owned()],
            },
            session: SessionConfig {
                timeout: Duration::from_secs(5),
                path_prefix: default_path_prefix(),
                auth: Vec::new(),
            },
        }
    }
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            !self.ensemble.servers.is_empty(),
            "ensemble.servers must not be empty"
        );

        for server in &self.ensemble.servers {
            ensure!(
                parse_server_address(server).is_some(),
                "invalid server endpoint {server:?}, expected host:port"
            );
        }

        ensure!(
            self.session.timeout > Duration::ZERO,
            "session.timeout_secs must be positive"
        );
        ensure!(
            self.session.path_prefix.starts_with('/'),
            "session.path_prefix must be absolute"
        );

        for entry in &self.session.auth {
            ensure!(!entry.scheme.is_empty(), "auth scheme must not be empty");
        }

        Ok(())
    }

    /// The parsed ensemble endpoints.
    pub fn server_addresses(&self) -> crate::errors::Result<Vec<ServerAddress>> {
        self.ensemble
            .servers
            .iter()
            .map(|server| {
                parse_server_address(server).ok_or_else(|| {
                    ZkError::new(
                        ErrorKind::BadArguments,
                        format!("invalid server endpoint: {server:?}"),
                    )
                })
            })
            .collect()
    }
}

fn parse_server_address(server: &str) -> Option<ServerAddress> {
    let (host, port) = server.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    let port: u16 = port.parse().ok()?;
    Some((host.to_owned(), port))
}

/// Serde helpers for representing `Duration` as fractional seconds.
mod serde_secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("invalid duration"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
