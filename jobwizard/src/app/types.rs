// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type SolutionId = String;

/// Backend classification of a compute provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Cloud,
    Hpc,
}

/// Compute provider offered by the catalog for a set of solutions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeProvider {
    pub id: String,
    pub name: String,
    pub kind: ProviderKind,
}

impl ComputeProvider {
    pub fn is_cloud(&self) -> bool {
        self.kind == ProviderKind::Cloud
    }

    pub fn is_hpc(&self) -> bool {
        self.kind == ProviderKind::Hpc
    }
}

/// Machine image ("toolbox"). Only meaningful for the provider and
/// solution set it was listed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineImage {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub run_command: Option<String>,
}

/// Resource profile (instance type) for a provider + image pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub id: String,
    pub vcpus: u32,
    pub ram_mb: u64,
    pub root_disk_gb: u32,
    pub ephemeral_disk_gb: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
    pub name: String,
    pub url: String,
    pub local_path: String,
}

/// Job-specific data carried through save untouched by the cascade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub downloads: Vec<Download>,
    pub template_vars: BTreeMap<String, String>,
    pub uploaded_files: Vec<String>,
}

/// Job under construction.
///
/// `compute_vm_run_command` is either `None` or the run command of the image
/// identified by `compute_vm_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Assigned by the job store on first save.
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub solution_ids: Vec<SolutionId>,
    pub compute_service_id: Option<String>,
    pub compute_vm_id: Option<String>,
    pub compute_vm_run_command: Option<String>,
    pub compute_resource_id: Option<String>,
    /// Minutes; dropped on save unless walltime is in use.
    pub walltime: Option<u32>,
    pub payload: JobPayload,
    pub submitted_at: Option<String>, // RFC3339
}

/// One solution variable and its current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolutionBinding {
    pub required: bool,
    pub value: Option<Value>,
}

impl SolutionBinding {
    pub fn optional() -> Self {
        Self::default()
    }

    /// Absent, null, blank strings and empty arrays count as unfilled.
    pub fn is_filled(&self) -> bool {
        match &self.value {
            None | Some(Value::Null) => false,
            Some(Value::String(text)) => !text.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        }
    }
}

/// Variable name -> binding, for one solution.
pub type SolutionBindings = BTreeMap<String, SolutionBinding>;
