// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::ports::{TelemetryEvent, TelemetryPort};

#[derive(Clone, Default)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    pub fn new() -> Self {
        Self
    }
}

impl TelemetryPort for TracingTelemetry {
    fn event(&self, name: &'static str, fields: TelemetryEvent) {
        let TelemetryEvent {
            job_id,
            solutions,
            provider,
            image,
            options,
            error,
        } = fields;

        tracing::info!(
            target: "jobwizard::telemetry",
            event = name,
            job_id = job_id,
            solutions = solutions,
            provider = provider.as_deref(),
            image = image.as_deref(),
            options = options,
            error = error.as_deref(),
        );
    }
}
