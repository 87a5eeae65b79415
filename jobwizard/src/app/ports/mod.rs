// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod bindings;
pub mod catalog;
pub mod job_store;
pub mod notifier;
pub mod telemetry;

pub use bindings::BindingsPort;
pub use catalog::CatalogPort;
pub use job_store::JobStorePort;
pub use notifier::{Notification, NotificationPort, Severity};
#[allow(unused_imports)]
pub use telemetry::{NoopTelemetry, TelemetryEvent, TelemetryPort};
