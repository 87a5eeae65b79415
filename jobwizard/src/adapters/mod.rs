// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod bindings;
pub mod catalog;
pub mod cli;
pub mod db;
pub mod notify;
pub mod telemetry;
