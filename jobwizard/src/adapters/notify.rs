// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::{Mutex, PoisonError};

use crate::app::ports::{Notification, NotificationPort, Severity};

/// Writes notifications to the log and keeps the ones still on screen, so
/// the CLI can print whatever the last operation left behind.
#[derive(Default)]
pub struct LogNotifier {
    shown: Mutex<Vec<Notification>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<Notification> {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationPort for LogNotifier {
    fn notify(&self, notification: Notification) {
        let severity = notification.severity.as_str();
        match notification.severity {
            Severity::Error => tracing::error!(
                target: "jobwizard::notify",
                severity,
                sticky = notification.sticky,
                "{}: {}",
                notification.summary,
                notification.detail
            ),
            Severity::Warn => tracing::warn!(
                target: "jobwizard::notify",
                severity,
                sticky = notification.sticky,
                "{}: {}",
                notification.summary,
                notification.detail
            ),
            Severity::Info | Severity::Success => tracing::info!(
                target: "jobwizard::notify",
                severity,
                sticky = notification.sticky,
                "{}: {}",
                notification.summary,
                notification.detail
            ),
        }
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }

    fn clear(&self) {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
