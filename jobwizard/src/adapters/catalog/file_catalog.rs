// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::app::errors::AppResult;
use crate::app::ports::CatalogPort;
use crate::app::types::{
    ComputeProvider, MachineImage, ProviderKind, ResourceProfile, SolutionBinding,
    SolutionBindings, SolutionId,
};

#[derive(Debug, Error)]
pub enum CatalogFileError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate provider id '{0}'")]
    DuplicateProvider(String),
    #[error("{item} '{id}' references unknown provider '{provider}'")]
    UnknownProvider {
        item: &'static str,
        id: String,
        provider: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    providers: Vec<ProviderEntry>,
    #[serde(default)]
    images: Vec<ImageEntry>,
    #[serde(default)]
    resources: Vec<ResourceEntry>,
    #[serde(default)]
    solutions: Vec<SolutionEntry>,
}

#[derive(Debug, Deserialize)]
struct ProviderEntry {
    id: String,
    name: Option<String>,
    kind: ProviderKind,
    /// Empty means every solution.
    #[serde(default)]
    solutions: Vec<SolutionId>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    id: String,
    provider: String,
    name: Option<String>,
    description: Option<String>,
    run_command: Option<String>,
    #[serde(default)]
    solutions: Vec<SolutionId>,
}

#[derive(Debug, Deserialize)]
struct ResourceEntry {
    id: String,
    provider: String,
    /// Empty means every image of the provider.
    #[serde(default)]
    images: Vec<String>,
    vcpus: u32,
    ram_mb: u64,
    #[serde(default)]
    root_disk_gb: u32,
    #[serde(default)]
    ephemeral_disk_gb: u32,
}

#[derive(Debug, Deserialize)]
struct SolutionEntry {
    id: SolutionId,
    #[serde(default)]
    variables: Vec<VariableEntry>,
}

#[derive(Debug, Deserialize)]
struct VariableEntry {
    name: String,
    #[serde(default)]
    required: bool,
    default: Option<serde_json::Value>,
}

fn supports_all(supported: &[SolutionId], wanted: &[SolutionId]) -> bool {
    supported.is_empty() || wanted.iter().all(|id| supported.contains(id))
}

/// Catalog read from a TOML file. Every listing keeps file order.
#[derive(Debug, Default)]
pub struct FileCatalog {
    file: CatalogFile,
}

impl FileCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogFileError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_toml_str(&contents)?;
        tracing::debug!(
            "catalog loaded path={} providers={} images={} resources={}",
            path.display(),
            catalog.file.providers.len(),
            catalog.file.images.len(),
            catalog.file.resources.len()
        );
        Ok(catalog)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, CatalogFileError> {
        let file: CatalogFile = toml::from_str(contents)?;

        let mut seen = HashSet::new();
        for provider in &file.providers {
            if !seen.insert(provider.id.as_str()) {
                return Err(CatalogFileError::DuplicateProvider(provider.id.clone()));
            }
        }
        let unknown = |item: &'static str, id: &str, provider: &str| {
            (!seen.contains(provider)).then(|| CatalogFileError::UnknownProvider {
                item,
                id: id.to_string(),
                provider: provider.to_string(),
            })
        };
        for image in &file.images {
            if let Some(err) = unknown("image", &image.id, &image.provider) {
                return Err(err);
            }
        }
        for resource in &file.resources {
            if let Some(err) = unknown("resource", &resource.id, &resource.provider) {
                return Err(err);
            }
        }

        Ok(Self { file })
    }

    pub fn providers_for(&self, solution_ids: &[SolutionId]) -> Vec<ComputeProvider> {
        if solution_ids.is_empty() {
            return Vec::new();
        }
        self.file
            .providers
            .iter()
            .filter(|entry| supports_all(&entry.solutions, solution_ids))
            .map(|entry| ComputeProvider {
                id: entry.id.clone(),
                name: entry.name.clone().unwrap_or_else(|| entry.id.clone()),
                kind: entry.kind,
            })
            .collect()
    }

    pub fn images_for(&self, provider_id: &str, solution_ids: &[SolutionId]) -> Vec<MachineImage> {
        self.file
            .images
            .iter()
            .filter(|entry| entry.provider == provider_id)
            .filter(|entry| supports_all(&entry.solutions, solution_ids))
            .map(|entry| MachineImage {
                id: entry.id.clone(),
                name: entry.name.clone().unwrap_or_else(|| entry.id.clone()),
                description: entry.description.clone(),
                run_command: entry.run_command.clone(),
            })
            .collect()
    }

    pub fn resources_for(&self, provider_id: &str, image_id: &str) -> Vec<ResourceProfile> {
        self.file
            .resources
            .iter()
            .filter(|entry| entry.provider == provider_id)
            .filter(|entry| entry.images.is_empty() || entry.images.iter().any(|i| i == image_id))
            .map(|entry| ResourceProfile {
                id: entry.id.clone(),
                vcpus: entry.vcpus,
                ram_mb: entry.ram_mb,
                root_disk_gb: entry.root_disk_gb,
                ephemeral_disk_gb: entry.ephemeral_disk_gb,
            })
            .collect()
    }

    /// Declared variables per solution, with defaults as initial values.
    pub fn solution_variables(&self) -> BTreeMap<SolutionId, SolutionBindings> {
        self.file
            .solutions
            .iter()
            .map(|solution| {
                let vars = solution
                    .variables
                    .iter()
                    .map(|var| {
                        (
                            var.name.clone(),
                            SolutionBinding {
                                required: var.required,
                                value: var.default.clone(),
                            },
                        )
                    })
                    .collect();
                (solution.id.clone(), vars)
            })
            .collect()
    }
}

#[async_trait]
impl CatalogPort for FileCatalog {
    async fn list_providers(&self, solution_ids: &[SolutionId]) -> AppResult<Vec<ComputeProvider>> {
        Ok(self.providers_for(solution_ids))
    }

    async fn list_images(
        &self,
        provider_id: &str,
        solution_ids: &[SolutionId],
    ) -> AppResult<Vec<MachineImage>> {
        Ok(self.images_for(provider_id, solution_ids))
    }

    async fn list_resources(
        &self,
        provider_id: &str,
        image_id: &str,
    ) -> AppResult<Vec<ResourceProfile>> {
        Ok(self.resources_for(provider_id, image_id))
    }
}
