// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::SolutionBindings;

#[async_trait]
/// Read side of the per-solution variable bindings.
pub trait BindingsPort: Send + Sync {
    /// `None` when nothing is known about the solution.
    async fn get_bindings(&self, solution_id: &str) -> AppResult<Option<SolutionBindings>>;
}
