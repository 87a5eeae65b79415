// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::app::errors::{AppError, AppResult};
use crate::app::ports::BindingsPort;
use crate::app::types::{SolutionBinding, SolutionBindings, SolutionId};

/// Solution variable values kept in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct BindingsTable {
    table: RwLock<BTreeMap<SolutionId, SolutionBindings>>,
}

impl BindingsTable {
    pub fn new(declared: BTreeMap<SolutionId, SolutionBindings>) -> Self {
        Self {
            table: RwLock::new(declared),
        }
    }

    /// Sets a value; a variable nobody declared becomes an optional binding.
    pub fn bind(&self, solution_id: &str, variable: &str, value: Value) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table
            .entry(solution_id.to_string())
            .or_default()
            .entry(variable.to_string())
            .or_insert_with(SolutionBinding::optional)
            .value = Some(value);
    }

    /// Applies a `solution.variable=value` assignment.
    pub fn bind_assignment(&self, assignment: &str) -> AppResult<()> {
        let (solution_id, variable, value) = parse_assignment(assignment)?;
        self.bind(solution_id, variable, value);
        Ok(())
    }
}

/// Splits `solution.variable=value`. The value is read as JSON when it
/// parses as JSON, otherwise as a plain string.
pub fn parse_assignment(assignment: &str) -> AppResult<(&str, &str, Value)> {
    let invalid = || {
        AppError::invalid_argument(format!(
            "binding '{assignment}' must look like solution.variable=value"
        ))
    };
    let (key, raw) = assignment.split_once('=').ok_or_else(invalid)?;
    let (solution_id, variable) = key.split_once('.').ok_or_else(invalid)?;
    let (solution_id, variable) = (solution_id.trim(), variable.trim());
    if solution_id.is_empty() || variable.is_empty() {
        return Err(invalid());
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((solution_id, variable, value))
}

#[async_trait]
impl BindingsPort for BindingsTable {
    async fn get_bindings(&self, solution_id: &str) -> AppResult<Option<SolutionBindings>> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.get(solution_id).cloned())
    }
}
