// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::db::{JobStore, JobStoreError};
use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::JobStorePort;
use crate::app::types::Job;

#[derive(Clone)]
pub struct SqliteJobStoreAdapter {
    store: Arc<JobStore>,
}

impl SqliteJobStoreAdapter {
    pub fn new(store: JobStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

/// Persistence failures stay `Persistence` so the orchestrator can report
/// them as save failures; the submit path re-labels them itself.
fn map_store_error(err: JobStoreError) -> AppError {
    match err {
        JobStoreError::JobNotFound(id) => AppError::with_message(
            AppErrorKind::Persistence,
            codes::NOT_FOUND,
            format!("job {id} does not exist"),
        ),
        JobStoreError::NotSaved => AppError::with_message(
            AppErrorKind::InvalidArgument,
            codes::INVALID_ARGUMENT,
            "job must be saved before it can be submitted",
        ),
        JobStoreError::Serde(err) => AppError::internal(format!("stored job is corrupt: {err}")),
        other => AppError::persistence(other.to_string()),
    }
}

#[async_trait]
impl JobStorePort for SqliteJobStoreAdapter {
    async fn save_job(&self, job: &Job) -> AppResult<Job> {
        self.store.save_job(job).await.map_err(map_store_error)
    }

    async fn get_job(&self, id: i64) -> AppResult<Option<Job>> {
        self.store.get_job(id).await.map_err(map_store_error)
    }

    async fn list_jobs(&self) -> AppResult<Vec<Job>> {
        self.store.list_jobs().await.map_err(map_store_error)
    }

    async fn submit_job(&self, job: &Job) -> AppResult<()> {
        let submitted_at = self.store.submit_job(job).await.map_err(map_store_error)?;
        tracing::debug!("job marked submitted id={:?} at={}", job.id, submitted_at);
        Ok(())
    }
}
