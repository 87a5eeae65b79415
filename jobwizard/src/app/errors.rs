// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;

pub mod codes {
    pub const CATALOG_UNAVAILABLE: &str = "catalog_unavailable";
    pub const JOB_INCOMPLETE: &str = "job_incomplete";
    pub const SAVE_FAILED: &str = "save_failed";
    pub const SUBMIT_FAILED: &str = "submit_failed";
    pub const OPERATION_IN_FLIGHT: &str = "operation_in_flight";
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const NOT_FOUND: &str = "not_found";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Error taxonomy of the wizard core.
///
/// `Catalog` failures are recovered inside the cascade; `Validation`,
/// `Persistence` and `Submission` are surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    Catalog,
    Validation,
    Persistence,
    Submission,
    Busy,
    InvalidArgument,
    NotFound,
    Internal,
}

impl AppErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AppErrorKind::Catalog => "CATALOG_ERROR",
            AppErrorKind::Validation => "VALIDATION_FAILURE",
            AppErrorKind::Persistence => "PERSISTENCE_ERROR",
            AppErrorKind::Submission => "SUBMISSION_ERROR",
            AppErrorKind::Busy => "BUSY",
            AppErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            AppErrorKind::NotFound => "NOT_FOUND",
            AppErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppError {
    kind: AppErrorKind,
    code: &'static str,
    message: String,
    context: Option<String>,
}

impl AppError {
    pub fn with_message(
        kind: AppErrorKind,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Catalog, codes::CATALOG_UNAVAILABLE, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Validation, codes::JOB_INCOMPLETE, message)
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Persistence, codes::SAVE_FAILED, message)
    }

    pub fn submission(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Submission, codes::SUBMIT_FAILED, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::with_message(
            AppErrorKind::InvalidArgument,
            codes::INVALID_ARGUMENT,
            message,
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::NotFound, codes::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Internal, codes::INTERNAL_ERROR, message)
    }

    pub fn kind(&self) -> AppErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ctx) = &self.context {
            write!(f, "{} ({})", self.message, ctx)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;
