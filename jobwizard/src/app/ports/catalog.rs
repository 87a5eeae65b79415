// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{ComputeProvider, MachineImage, ResourceProfile, SolutionId};

#[async_trait]
/// Source of the provider/image/resource options for a job.
/// Empty lists are valid answers; transport or server failures are errors.
pub trait CatalogPort: Send + Sync {
    async fn list_providers(&self, solution_ids: &[SolutionId]) -> AppResult<Vec<ComputeProvider>>;
    async fn list_images(
        &self,
        provider_id: &str,
        solution_ids: &[SolutionId],
    ) -> AppResult<Vec<MachineImage>>;
    async fn list_resources(
        &self,
        provider_id: &str,
        image_id: &str,
    ) -> AppResult<Vec<ResourceProfile>>;
}
