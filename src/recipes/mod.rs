// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Coordination recipes layered purely on the client façade.

pub mod barrier;
pub mod lock;
pub mod queue;
