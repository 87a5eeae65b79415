// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use serde::Serialize;

use crate::app::errors::{AppError, AppResult};
use crate::app::ports::{
    BindingsPort, CatalogPort, JobStorePort, Notification, NotificationPort, Severity,
    TelemetryPort,
};
use crate::app::services::completion::{self, Completeness};
use crate::app::services::resolver::{CascadeReport, CascadeSnapshot, ComputeResolver};
use crate::app::services::submission::{SubmissionOrchestrator, SubmissionStatus};
use crate::app::types::{Job, JobPayload, SolutionId};

/// Form input for one job, as a user would fill it in.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    /// Edit a stored job instead of starting a new draft.
    pub job_id: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Empty keeps the stored job's solutions.
    pub solution_ids: Vec<SolutionId>,
    pub provider: Option<String>,
    pub image: Option<String>,
    pub resource: Option<String>,
    pub walltime: Option<u32>,
    pub payload: Option<JobPayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job: Job,
    pub status: SubmissionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionsReport {
    #[serde(flatten)]
    pub snapshot: CascadeSnapshot,
    /// Catalog failures the cascade recovered from.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftReport {
    pub snapshot: CascadeSnapshot,
    pub completeness: Completeness,
}

#[derive(Clone)]
pub struct UseCases {
    pub(crate) catalog: Arc<dyn CatalogPort>,
    pub(crate) jobs: Arc<dyn JobStorePort>,
    pub(crate) bindings: Arc<dyn BindingsPort>,
    pub(crate) notifier: Arc<dyn NotificationPort>,
    pub(crate) telemetry: Arc<dyn TelemetryPort>,
}

impl UseCases {
    pub fn new(
        catalog: Arc<dyn CatalogPort>,
        jobs: Arc<dyn JobStorePort>,
        bindings: Arc<dyn BindingsPort>,
        notifier: Arc<dyn NotificationPort>,
        telemetry: Arc<dyn TelemetryPort>,
    ) -> Self {
        Self {
            catalog,
            jobs,
            bindings,
            notifier,
            telemetry,
        }
    }

    fn resolver(&self) -> Arc<ComputeResolver> {
        Arc::new(ComputeResolver::new(
            self.catalog.clone(),
            self.telemetry.clone(),
        ))
    }

    fn orchestrator(&self, resolver: Arc<ComputeResolver>) -> SubmissionOrchestrator {
        SubmissionOrchestrator::new(
            resolver,
            self.jobs.clone(),
            self.bindings.clone(),
            self.notifier.clone(),
            self.telemetry.clone(),
        )
    }

    /// Resolves the cascade for a solution set, optionally walking explicit
    /// provider and image choices.
    pub async fn options(
        &self,
        solution_ids: Vec<SolutionId>,
        provider: Option<&str>,
        image: Option<&str>,
    ) -> AppResult<OptionsReport> {
        let resolver = self.resolver();
        let mut reports = vec![resolver.on_solutions_changed(solution_ids).await?];
        if let Some(provider) = provider {
            reports.push(resolver.on_provider_selected(provider).await?);
        }
        if let Some(image) = image {
            reports.push(resolver.on_image_selected(image).await?);
        }
        let warnings = reports
            .iter()
            .flat_map(CascadeReport::errors)
            .map(ToString::to_string)
            .collect();
        Ok(OptionsReport {
            snapshot: resolver.snapshot(),
            warnings,
        })
    }

    pub async fn show_job(&self, id: i64) -> AppResult<Job> {
        self.jobs
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("job {id} does not exist")))
    }

    pub async fn list_jobs(&self) -> AppResult<Vec<Job>> {
        self.jobs.list_jobs().await
    }

    /// Builds the draft without persisting it and reports what is missing.
    pub async fn check(&self, request: &JobRequest) -> AppResult<DraftReport> {
        let resolver = self.draft(request).await?;
        let snapshot = resolver.snapshot();
        let bindings =
            completion::collect_bindings(self.bindings.as_ref(), &snapshot.job.solution_ids)
                .await?;
        let completeness = completion::evaluate(&snapshot, &bindings);
        Ok(DraftReport {
            snapshot,
            completeness,
        })
    }

    pub async fn save_job(&self, request: &JobRequest) -> AppResult<JobOutcome> {
        let resolver = self.draft(request).await?;
        let orchestrator = self.orchestrator(resolver);
        let id = orchestrator.save().await?;
        Ok(JobOutcome {
            job: self.show_job(id).await?,
            status: orchestrator.current().status,
        })
    }

    pub async fn submit_job(&self, request: &JobRequest) -> AppResult<JobOutcome> {
        let resolver = self.draft(request).await?;
        let orchestrator = self.orchestrator(resolver);
        let id = orchestrator.submit().await?;
        Ok(JobOutcome {
            job: self.show_job(id).await?,
            status: orchestrator.current().status,
        })
    }

    /// Replays a request against a fresh resolver in the order a form
    /// would: solutions, then provider, image, resource, then free fields.
    async fn draft(&self, request: &JobRequest) -> AppResult<Arc<ComputeResolver>> {
        let resolver = self.resolver();
        match request.job_id {
            Some(id) => {
                let mut job = self.show_job(id).await?;
                if !request.solution_ids.is_empty() {
                    job.solution_ids = request.solution_ids.clone();
                }
                resolver.hydrate(job).await?;
                self.notifier.notify(Notification::new(
                    Severity::Success,
                    "Load success",
                    format!("Job {id} loaded successfully."),
                ));
            }
            None => {
                resolver
                    .on_solutions_changed(request.solution_ids.clone())
                    .await?;
            }
        }

        if let Some(provider) = request.provider.as_deref() {
            resolver.on_provider_selected(provider).await?;
        }
        if let Some(image) = request.image.as_deref() {
            resolver.on_image_selected(image).await?;
        }
        if let Some(resource) = request.resource.as_deref() {
            resolver.on_resource_selected(resource)?;
        }
        if let Some(name) = request.name.as_deref() {
            resolver.set_name(name);
        }
        if request.description.is_some() {
            resolver.set_description(request.description.clone());
        }
        if let Some(minutes) = request.walltime {
            resolver.set_walltime(Some(minutes));
            resolver.set_use_walltime(true);
        }
        if let Some(payload) = &request.payload {
            resolver.set_payload(payload.clone());
        }
        Ok(resolver)
    }
}
