// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::Job;

#[async_trait]
pub trait JobStorePort: Send + Sync {
    /// Inserts a job without an id or updates the stored one; returns the
    /// stored copy carrying its identifier.
    async fn save_job(&self, job: &Job) -> AppResult<Job>;
    async fn get_job(&self, id: i64) -> AppResult<Option<Job>>;
    async fn list_jobs(&self) -> AppResult<Vec<Job>>;
    async fn submit_job(&self, job: &Job) -> AppResult<()>;
}
