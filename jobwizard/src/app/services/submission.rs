// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::watch;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{
    BindingsPort, JobStorePort, Notification, NotificationPort, Severity, TelemetryEvent,
    TelemetryPort,
};
use crate::app::services::completion;
use crate::app::services::resolver::ComputeResolver;
use crate::app::types::Job;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionStatus {
    Idle,
    Incomplete { reasons: Vec<String> },
    Saving,
    Saved { id: i64 },
    SaveFailed { message: String },
    Submitting { id: i64 },
    Submitted { id: i64 },
    SubmitFailed { id: i64, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrchestratorState {
    pub busy: bool,
    pub status: SubmissionStatus,
}

/// Sequences save and submit for the draft owned by the resolver.
/// Only one of them may run at a time.
pub struct SubmissionOrchestrator {
    resolver: Arc<ComputeResolver>,
    jobs: Arc<dyn JobStorePort>,
    bindings: Arc<dyn BindingsPort>,
    notifier: Arc<dyn NotificationPort>,
    telemetry: Arc<dyn TelemetryPort>,
    in_flight: AtomicBool,
    state: watch::Sender<OrchestratorState>,
}

/// Held for the duration of one save/submit; releases the in-flight flag
/// and clears `busy` however the operation ends.
struct InFlight<'a> {
    owner: &'a SubmissionOrchestrator,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.owner.in_flight.store(false, Ordering::Release);
        self.owner.state.send_modify(|state| state.busy = false);
    }
}

impl SubmissionOrchestrator {
    pub fn new(
        resolver: Arc<ComputeResolver>,
        jobs: Arc<dyn JobStorePort>,
        bindings: Arc<dyn BindingsPort>,
        notifier: Arc<dyn NotificationPort>,
        telemetry: Arc<dyn TelemetryPort>,
    ) -> Self {
        let (state, _) = watch::channel(OrchestratorState {
            busy: false,
            status: SubmissionStatus::Idle,
        });
        Self {
            resolver,
            jobs,
            bindings,
            notifier,
            telemetry,
            in_flight: AtomicBool::new(false),
            state,
        }
    }

    /// Status feed for a long-lived view. The one-shot CLI reads
    /// [`Self::current`] after the operation instead.
    #[allow(dead_code)]
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> OrchestratorState {
        self.state.borrow().clone()
    }

    fn begin(&self) -> AppResult<InFlight<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AppError::with_message(
                AppErrorKind::Busy,
                codes::OPERATION_IN_FLIGHT,
                "a save or submit is already in progress",
            ));
        }
        Ok(InFlight { owner: self })
    }

    fn publish(&self, status: SubmissionStatus) {
        self.state.send_replace(OrchestratorState { busy: true, status });
    }

    /// Persists the draft and adopts the identifier assigned by the store.
    pub async fn save(&self) -> AppResult<i64> {
        let _in_flight = self.begin()?;
        let saved = self.persist("Saving job...").await?;
        Ok(saved_id(&saved))
    }

    /// Checks completeness, persists, then submits the persisted job.
    ///
    /// A failed submission leaves the job saved; calling `submit` again
    /// retries against the same identifier.
    pub async fn submit(&self) -> AppResult<i64> {
        let _in_flight = self.begin()?;

        let snapshot = self.resolver.snapshot();
        let bindings =
            completion::collect_bindings(self.bindings.as_ref(), &snapshot.job.solution_ids)
                .await?;
        let completeness = completion::evaluate(&snapshot, &bindings);
        if !completeness.is_complete() {
            let reasons = completeness.reasons();
            let detail = reasons.join("; ");
            self.notifier.clear();
            self.notifier.notify(Notification::new(
                Severity::Warn,
                "Job incomplete",
                detail.clone(),
            ));
            self.publish(SubmissionStatus::Incomplete { reasons });
            return Err(AppError::validation(format!("job is not ready to submit: {detail}")));
        }

        let saved = self.persist("Submitting job...").await?;
        let id = saved_id(&saved);

        self.publish(SubmissionStatus::Submitting { id });
        match self.jobs.submit_job(&saved).await {
            Ok(()) => {
                tracing::info!("job submitted id={}", id);
                self.notifier.clear();
                self.notifier.notify(Notification::new(
                    Severity::Success,
                    "Submitted",
                    format!("Job {id} submitted successfully."),
                ));
                self.publish(SubmissionStatus::Submitted { id });
                self.telemetry.event(
                    "job.submitted",
                    TelemetryEvent {
                        job_id: Some(id),
                        provider: saved.compute_service_id.clone(),
                        image: saved.compute_vm_id.clone(),
                        ..TelemetryEvent::default()
                    },
                );
                Ok(id)
            }
            Err(err) => {
                tracing::warn!("job submission failed id={} error={}", id, err);
                let message = err.to_string();
                self.notifier.clear();
                self.notifier.notify(
                    Notification::new(Severity::Error, "Submit failed!", message.clone()).sticky(),
                );
                self.publish(SubmissionStatus::SubmitFailed {
                    id,
                    message: message.clone(),
                });
                Err(AppError::submission(message).with_context(format!("job {id} remains saved")))
            }
        }
    }

    async fn persist(&self, progress: &str) -> AppResult<Job> {
        self.publish(SubmissionStatus::Saving);
        self.notifier.clear();
        self.notifier
            .notify(Notification::new(Severity::Info, progress, "").sticky());

        let job = self.resolver.job_for_save();
        let result = match self.jobs.save_job(&job).await {
            Ok(saved) if saved.id.is_some() => Ok(saved),
            Ok(_) => Err(AppError::persistence("job store returned a job without an identifier")),
            Err(err) if err.kind() == AppErrorKind::Persistence => Err(err),
            Err(err) => Err(AppError::persistence(err.to_string())),
        };

        match result {
            Ok(saved) => {
                let id = saved_id(&saved);
                self.resolver.assign_id(id);
                tracing::info!("job saved id={}", id);
                self.notifier.clear();
                self.notifier.notify(Notification::new(
                    Severity::Success,
                    "Saved",
                    format!("Job {id} saved successfully."),
                ));
                self.publish(SubmissionStatus::Saved { id });
                self.telemetry.event(
                    "job.saved",
                    TelemetryEvent {
                        job_id: Some(id),
                        solutions: Some(saved.solution_ids.len()),
                        ..TelemetryEvent::default()
                    },
                );
                Ok(saved)
            }
            Err(err) => {
                tracing::warn!("job save failed error={}", err);
                self.notifier.clear();
                self.notifier.notify(
                    Notification::new(Severity::Error, "Save failed!", err.to_string()).sticky(),
                );
                self.publish(SubmissionStatus::SaveFailed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

fn saved_id(job: &Job) -> i64 {
    // persist() only hands back jobs that carry an identifier
    job.id.unwrap_or_default()
}
