// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;

use serde::Serialize;

use crate::app::errors::AppResult;
use crate::app::ports::BindingsPort;
use crate::app::services::resolver::CascadeSnapshot;
use crate::app::types::{SolutionBindings, SolutionId};

pub type BindingsBySolution = BTreeMap<SolutionId, SolutionBindings>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingBinding {
    pub solution_id: SolutionId,
    pub variable: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormIssue {
    MissingName,
    MissingProvider,
    MissingImage,
    MissingResource,
    MissingWalltime,
}

impl FormIssue {
    pub fn describe(self) -> &'static str {
        match self {
            FormIssue::MissingName => "job name is empty",
            FormIssue::MissingProvider => "no compute provider selected",
            FormIssue::MissingImage => "no toolbox selected",
            FormIssue::MissingResource => "no resource profile selected",
            FormIssue::MissingWalltime => "walltime is enabled but not set",
        }
    }
}

/// Result of checking a draft. Every condition is evaluated, so the report
/// lists all reasons a job is not ready, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completeness {
    pub has_solutions: bool,
    pub missing_bindings: Vec<MissingBinding>,
    pub form_issues: Vec<FormIssue>,
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        self.has_solutions && self.missing_bindings.is_empty() && self.form_issues.is_empty()
    }

    pub fn reasons(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.has_solutions {
            out.push("no solutions selected".to_string());
        }
        for missing in &self.missing_bindings {
            out.push(format!(
                "solution '{}' requires a value for '{}'",
                missing.solution_id, missing.variable
            ));
        }
        out.extend(self.form_issues.iter().map(|issue| issue.describe().to_string()));
        out
    }
}

pub fn evaluate(snapshot: &CascadeSnapshot, bindings: &BindingsBySolution) -> Completeness {
    Completeness {
        has_solutions: !snapshot.job.solution_ids.is_empty(),
        missing_bindings: missing_bindings(&snapshot.job.solution_ids, bindings),
        form_issues: form_issues(snapshot),
    }
}

/// Required, unfilled variables of the selected solutions. A solution
/// without a bindings entry has nothing required.
pub fn missing_bindings(
    solution_ids: &[SolutionId],
    bindings: &BindingsBySolution,
) -> Vec<MissingBinding> {
    solution_ids
        .iter()
        .filter_map(|solution_id| bindings.get(solution_id).map(|vars| (solution_id, vars)))
        .flat_map(|(solution_id, vars)| {
            vars.iter()
                .filter(|(_, binding)| binding.required && !binding.is_filled())
                .map(move |(variable, _)| MissingBinding {
                    solution_id: solution_id.clone(),
                    variable: variable.clone(),
                })
        })
        .collect()
}

/// Structural checks on the compute section of the draft.
pub fn form_issues(snapshot: &CascadeSnapshot) -> Vec<FormIssue> {
    let job = &snapshot.job;
    let mut issues = Vec::new();
    if job.name.trim().is_empty() {
        issues.push(FormIssue::MissingName);
    }
    let provider = snapshot.selected_provider();
    if provider.is_none() {
        issues.push(FormIssue::MissingProvider);
    }
    if snapshot.selected_image().is_none() {
        issues.push(FormIssue::MissingImage);
    }
    if provider.is_some_and(|provider| provider.is_cloud()) && job.compute_resource_id.is_none() {
        issues.push(FormIssue::MissingResource);
    }
    if snapshot.use_walltime && job.walltime.is_none_or(|minutes| minutes == 0) {
        issues.push(FormIssue::MissingWalltime);
    }
    issues
}

/// Fetches the bindings of every selected solution.
pub async fn collect_bindings(
    port: &dyn BindingsPort,
    solution_ids: &[SolutionId],
) -> AppResult<BindingsBySolution> {
    let mut out = BindingsBySolution::new();
    for solution_id in solution_ids {
        if let Some(vars) = port.get_bindings(solution_id).await? {
            out.insert(solution_id.clone(), vars);
        }
    }
    Ok(out)
}
