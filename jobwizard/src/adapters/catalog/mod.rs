// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod file_catalog;

pub use file_catalog::FileCatalog;
