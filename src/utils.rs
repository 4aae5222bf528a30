// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt::Write;

use rand::RngExt;

/// Generates a random 128-bit token as 32 lowercase hex characters; used by
/// the recipes to give node names a collision-free owner prefix.
pub fn random_token() -> String {
    let mut raw = [0u8; 16];
    rand::rng().fill(&mut raw);

    let mut hex = String::with_capacity(32);
    for byte in &raw {
        write!(&mut hex, "{byte:02x}").expect("Writing to String cannot fail");
    }

    hex
}

/// The sequence suffix a sequential node name sorts by (everything after the
/// last dash).
pub fn sequence_suffix(node_name: &str) -> &str {
    node_name
        .rsplit_once('-')
        .map_or(node_name, |(_, suffix)| suffix)
}
