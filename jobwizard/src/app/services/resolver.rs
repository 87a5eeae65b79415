// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Dependent compute configuration: solutions -> provider -> image -> resource.
//!
//! Every trigger claims its stage and all stages below it with a fresh token.
//! A catalog answer is applied only while its token still owns the stage, so
//! results of superseded fetches are dropped instead of overwriting newer
//! state. All state changes happen under the lock and never span an await.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::app::errors::{AppError, AppResult};
use crate::app::ports::{CatalogPort, TelemetryEvent, TelemetryPort};
use crate::app::types::{
    ComputeProvider, Job, JobPayload, MachineImage, ResourceProfile, SolutionId,
};

const STAGES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Providers,
    Images,
    Resources,
}

impl Stage {
    fn index(self) -> usize {
        match self {
            Stage::Providers => 0,
            Stage::Images => 1,
            Stage::Resources => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Unresolved,
    Loading,
    ResolvedEmpty,
    ResolvedNonEmpty,
}

impl StageStatus {
    fn for_len(len: usize) -> Self {
        if len == 0 {
            StageStatus::ResolvedEmpty
        } else {
            StageStatus::ResolvedNonEmpty
        }
    }
}

/// What a single cascade run did at one stage.
#[derive(Debug, Clone, Default)]
pub enum StageOutcome {
    #[default]
    NotRun,
    Applied,
    /// Required input was missing; the stage was cleared without a fetch.
    Skipped,
    /// A newer trigger owns the stage; this run's answer was dropped.
    Superseded,
    /// The fetch failed and the stage fell back to an empty list.
    Recovered(AppError),
}

#[derive(Debug, Clone, Default)]
pub struct CascadeReport {
    pub providers: StageOutcome,
    pub images: StageOutcome,
    pub resources: StageOutcome,
}

impl CascadeReport {
    pub fn errors(&self) -> Vec<&AppError> {
        [&self.providers, &self.images, &self.resources]
            .into_iter()
            .filter_map(|outcome| match outcome {
                StageOutcome::Recovered(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    #[cfg(test)]
    pub fn superseded(&self) -> bool {
        [&self.providers, &self.images, &self.resources]
            .into_iter()
            .any(|outcome| matches!(outcome, StageOutcome::Superseded))
    }
}

/// Owned, read-only view of the draft and its options.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeSnapshot {
    pub job: Job,
    pub use_walltime: bool,
    pub providers: Vec<ComputeProvider>,
    pub images: Vec<MachineImage>,
    pub resources: Vec<ResourceProfile>,
    pub provider_status: StageStatus,
    pub image_status: StageStatus,
    pub resource_status: StageStatus,
}

impl CascadeSnapshot {
    pub fn selected_provider(&self) -> Option<&ComputeProvider> {
        let id = self.job.compute_service_id.as_deref()?;
        self.providers.iter().find(|provider| provider.id == id)
    }

    pub fn selected_image(&self) -> Option<&MachineImage> {
        let id = self.job.compute_vm_id.as_deref()?;
        self.images.iter().find(|image| image.id == id)
    }
}

struct CascadeState {
    job: Job,
    use_walltime: bool,
    providers: Vec<ComputeProvider>,
    images: Vec<MachineImage>,
    resources: Vec<ResourceProfile>,
    status: [StageStatus; STAGES],
    tokens: [u64; STAGES],
    last_token: u64,
}

impl CascadeState {
    fn new(job: Job) -> Self {
        Self {
            use_walltime: job.walltime.is_some(),
            job,
            providers: Vec::new(),
            images: Vec::new(),
            resources: Vec::new(),
            status: [StageStatus::Unresolved; STAGES],
            tokens: [0; STAGES],
            last_token: 0,
        }
    }

    /// Takes ownership of `stage` and everything downstream of it.
    fn claim(&mut self, stage: Stage) -> u64 {
        self.last_token += 1;
        for slot in &mut self.tokens[stage.index()..] {
            *slot = self.last_token;
        }
        self.last_token
    }

    fn owns(&self, stage: Stage, token: u64) -> bool {
        self.tokens[stage.index()] == token
    }

    fn provider(&self) -> Option<&ComputeProvider> {
        let id = self.job.compute_service_id.as_deref()?;
        self.providers.iter().find(|provider| provider.id == id)
    }

    fn image(&self) -> Option<&MachineImage> {
        let id = self.job.compute_vm_id.as_deref()?;
        self.images.iter().find(|image| image.id == id)
    }

    fn clear_image_selection(&mut self) {
        self.job.compute_vm_id = None;
        self.job.compute_vm_run_command = None;
        self.job.compute_resource_id = None;
    }

    fn sync_run_command(&mut self) {
        let command = self.image().and_then(|image| image.run_command.clone());
        self.job.compute_vm_run_command = command;
    }

    fn select_image(&mut self, image_id: &str) {
        if self.job.compute_vm_id.as_deref() != Some(image_id) {
            self.job.compute_vm_id = Some(image_id.to_string());
            self.job.compute_resource_id = None;
        }
        self.sync_run_command();
    }

    fn apply_providers(&mut self, providers: Vec<ComputeProvider>) {
        let current = self.job.compute_service_id.as_deref();
        match providers.first() {
            None => {
                self.clear_image_selection();
                self.job.compute_service_id = None;
            }
            Some(first) if !providers.iter().any(|p| Some(p.id.as_str()) == current) => {
                self.clear_image_selection();
                self.job.compute_service_id = Some(first.id.clone());
            }
            Some(_) => {}
        }
        self.status[Stage::Providers.index()] = StageStatus::for_len(providers.len());
        self.providers = providers;
    }

    fn apply_images(&mut self, images: Vec<MachineImage>) {
        let current = self.job.compute_vm_id.clone();
        self.status[Stage::Images.index()] = StageStatus::for_len(images.len());
        self.images = images;
        match self.images.first().map(|image| image.id.clone()) {
            None => self.clear_image_selection(),
            Some(first) => {
                let keep = current.filter(|id| self.images.iter().any(|image| &image.id == id));
                self.select_image(&keep.unwrap_or(first));
            }
        }
    }

    fn clear_images(&mut self) {
        self.images.clear();
        self.status[Stage::Images.index()] = StageStatus::ResolvedEmpty;
        self.clear_image_selection();
    }

    fn apply_resources(&mut self, resources: Vec<ResourceProfile>) {
        let selected = self.job.compute_resource_id.as_deref();
        if !resources.iter().any(|r| Some(r.id.as_str()) == selected) {
            self.job.compute_resource_id = None;
        }
        self.status[Stage::Resources.index()] = StageStatus::for_len(resources.len());
        self.resources = resources;
    }

    fn snapshot(&self) -> CascadeSnapshot {
        CascadeSnapshot {
            job: self.job.clone(),
            use_walltime: self.use_walltime,
            providers: self.providers.clone(),
            images: self.images.clone(),
            resources: self.resources.clone(),
            provider_status: self.status[Stage::Providers.index()],
            image_status: self.status[Stage::Images.index()],
            resource_status: self.status[Stage::Resources.index()],
        }
    }
}

/// Single owner of the job draft and its provider/image/resource options.
pub struct ComputeResolver {
    catalog: Arc<dyn CatalogPort>,
    telemetry: Arc<dyn TelemetryPort>,
    state: Mutex<CascadeState>,
}

impl ComputeResolver {
    pub fn new(catalog: Arc<dyn CatalogPort>, telemetry: Arc<dyn TelemetryPort>) -> Self {
        Self::with_job(catalog, telemetry, Job::default())
    }

    pub fn with_job(
        catalog: Arc<dyn CatalogPort>,
        telemetry: Arc<dyn TelemetryPort>,
        job: Job,
    ) -> Self {
        Self {
            catalog,
            telemetry,
            state: Mutex::new(CascadeState::new(job)),
        }
    }

    fn state(&self) -> MutexGuard<'_, CascadeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> CascadeSnapshot {
        self.state().snapshot()
    }

    /// Copy of the job as it should be persisted.
    pub fn job_for_save(&self) -> Job {
        let state = self.state();
        let mut job = state.job.clone();
        if !state.use_walltime {
            job.walltime = None;
        }
        job
    }

    /// Replaces the draft with a stored job and re-resolves from Stage 1.
    pub async fn hydrate(&self, job: Job) -> AppResult<CascadeReport> {
        let solutions = job.solution_ids.clone();
        {
            let mut state = self.state();
            let last_token = state.last_token;
            *state = CascadeState::new(job);
            // Tokens stay monotonic so fetches started before the reset stay stale.
            state.last_token = last_token;
        }
        self.on_solutions_changed(solutions).await
    }

    pub fn assign_id(&self, id: i64) {
        self.state().job.id = Some(id);
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.state().job.name = name.into();
    }

    pub fn set_description(&self, description: Option<String>) {
        self.state().job.description = description;
    }

    pub fn set_walltime(&self, minutes: Option<u32>) {
        self.state().job.walltime = minutes;
    }

    pub fn set_use_walltime(&self, enabled: bool) {
        self.state().use_walltime = enabled;
    }

    pub fn set_payload(&self, payload: JobPayload) {
        self.state().job.payload = payload;
    }

    /// Stage 1: re-resolve providers for a new solution set, then cascade.
    ///
    /// A failed provider fetch leaves every stage cleared and is returned as
    /// a catalog error.
    pub async fn on_solutions_changed(
        &self,
        solution_ids: Vec<SolutionId>,
    ) -> AppResult<CascadeReport> {
        let (token, solutions) = {
            let mut state = self.state();
            state.job.solution_ids = solution_ids;
            let token = state.claim(Stage::Providers);
            state.status[Stage::Providers.index()] = StageStatus::Loading;
            (token, state.job.solution_ids.clone())
        };

        let fetched = self.catalog.list_providers(&solutions).await;

        let mut report = CascadeReport::default();
        let failure = {
            let mut state = self.state();
            if !state.owns(Stage::Providers, token) {
                tracing::debug!("provider fetch superseded solutions={}", solutions.len());
                report.providers = StageOutcome::Superseded;
                return Ok(report);
            }
            match fetched {
                Ok(providers) => {
                    state.apply_providers(providers);
                    report.providers = StageOutcome::Applied;
                    None
                }
                Err(err) => {
                    tracing::warn!("provider fetch failed solutions={} error={}", solutions.len(), err);
                    state.apply_providers(Vec::new());
                    report.providers = StageOutcome::Recovered(err.clone());
                    Some(err)
                }
            }
        };

        let snapshot = self.snapshot();
        self.telemetry.event(
            "cascade.providers.resolved",
            TelemetryEvent {
                job_id: snapshot.job.id,
                solutions: Some(snapshot.job.solution_ids.len()),
                provider: snapshot.job.compute_service_id.clone(),
                options: Some(snapshot.providers.len()),
                error: failure.as_ref().map(ToString::to_string),
                ..TelemetryEvent::default()
            },
        );

        self.resolve_images(&mut report).await;
        match failure {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Stage 2 entry point for an explicit provider choice.
    pub async fn on_provider_selected(&self, provider_id: &str) -> AppResult<CascadeReport> {
        {
            let mut state = self.state();
            if !state.providers.iter().any(|p| p.id == provider_id) {
                return Err(AppError::invalid_argument(format!(
                    "provider '{provider_id}' is not available for the selected solutions"
                )));
            }
            state.job.compute_service_id = Some(provider_id.to_string());
        }
        let mut report = CascadeReport::default();
        self.resolve_images(&mut report).await;
        Ok(report)
    }

    /// Stage 3 entry point for an explicit image choice.
    pub async fn on_image_selected(&self, image_id: &str) -> AppResult<CascadeReport> {
        {
            let mut state = self.state();
            if !state.images.iter().any(|image| image.id == image_id) {
                return Err(AppError::invalid_argument(format!(
                    "image '{image_id}' is not available for the selected provider"
                )));
            }
            state.select_image(image_id);
        }
        let mut report = CascadeReport::default();
        self.resolve_resources(&mut report).await;
        Ok(report)
    }

    /// Resources are never defaulted; this is the only way to pick one.
    pub fn on_resource_selected(&self, resource_id: &str) -> AppResult<()> {
        let mut state = self.state();
        if !state.resources.iter().any(|r| r.id == resource_id) {
            return Err(AppError::invalid_argument(format!(
                "resource '{resource_id}' is not available for the selected image"
            )));
        }
        state.job.compute_resource_id = Some(resource_id.to_string());
        Ok(())
    }

    async fn resolve_images(&self, report: &mut CascadeReport) {
        let request = {
            let mut state = self.state();
            let token = state.claim(Stage::Images);
            match state.job.compute_service_id.clone().filter(|id| !id.is_empty()) {
                None => {
                    state.clear_images();
                    state.resources.clear();
                    state.status[Stage::Resources.index()] = StageStatus::ResolvedEmpty;
                    report.images = StageOutcome::Skipped;
                    report.resources = StageOutcome::Skipped;
                    None
                }
                Some(provider_id) => {
                    if state.provider().is_some_and(ComputeProvider::is_hpc) {
                        state.use_walltime = true;
                    }
                    state.status[Stage::Images.index()] = StageStatus::Loading;
                    Some((token, provider_id, state.job.solution_ids.clone()))
                }
            }
        };
        let Some((token, provider_id, solutions)) = request else {
            return;
        };

        let fetched = self.catalog.list_images(&provider_id, &solutions).await;

        {
            let mut state = self.state();
            if !state.owns(Stage::Images, token) {
                tracing::debug!("image fetch superseded provider={}", provider_id);
                report.images = StageOutcome::Superseded;
                return;
            }
            match fetched {
                Ok(images) => {
                    state.apply_images(images);
                    report.images = StageOutcome::Applied;
                }
                Err(err) => {
                    tracing::warn!("image fetch failed provider={} error={}", provider_id, err);
                    state.apply_images(Vec::new());
                    report.images = StageOutcome::Recovered(err);
                }
            }
            self.telemetry.event(
                "cascade.images.resolved",
                TelemetryEvent {
                    job_id: state.job.id,
                    provider: Some(provider_id.clone()),
                    image: state.job.compute_vm_id.clone(),
                    options: Some(state.images.len()),
                    ..TelemetryEvent::default()
                },
            );
        }

        self.resolve_resources(report).await;
    }

    async fn resolve_resources(&self, report: &mut CascadeReport) {
        let request = {
            let mut state = self.state();
            let token = state.claim(Stage::Resources);
            let image = state.image().cloned();
            let cloud_provider = state
                .provider()
                .filter(|provider| provider.is_cloud())
                .map(|provider| provider.id.clone());
            match (image, cloud_provider) {
                (Some(image), Some(provider_id)) => {
                    state.job.compute_vm_run_command = image.run_command.clone();
                    state.status[Stage::Resources.index()] = StageStatus::Loading;
                    Some((token, provider_id, image.id))
                }
                (image, _) => {
                    state.job.compute_vm_run_command = image.and_then(|image| image.run_command);
                    state.apply_resources(Vec::new());
                    report.resources = StageOutcome::Skipped;
                    None
                }
            }
        };
        let Some((token, provider_id, image_id)) = request else {
            return;
        };

        let fetched = self.catalog.list_resources(&provider_id, &image_id).await;

        let mut state = self.state();
        if !state.owns(Stage::Resources, token) {
            tracing::debug!(
                "resource fetch superseded provider={} image={}",
                provider_id,
                image_id
            );
            report.resources = StageOutcome::Superseded;
            return;
        }
        match fetched {
            Ok(resources) => {
                state.apply_resources(resources);
                report.resources = StageOutcome::Applied;
            }
            Err(err) => {
                tracing::warn!(
                    "resource fetch failed provider={} image={} error={}",
                    provider_id,
                    image_id,
                    err
                );
                state.apply_resources(Vec::new());
                report.resources = StageOutcome::Recovered(err);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};

    use async_trait::async_trait;
    use tokio::sync::oneshot;

    use crate::app::errors::AppErrorKind;
    use crate::app::ports::NoopTelemetry;
    use crate::app::types::ProviderKind;

    /// Catalog fake with per-call answers and optional gates that hold a call
    /// until the test releases it.
    #[derive(Default)]
    pub(crate) struct ScriptedCatalog {
        providers: Mutex<HashMap<String, AppResult<Vec<ComputeProvider>>>>,
        images: Mutex<HashMap<String, AppResult<Vec<MachineImage>>>>,
        resources: Mutex<HashMap<(String, String), AppResult<Vec<ResourceProfile>>>>,
        provider_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
        image_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
        image_calls: Mutex<usize>,
        resource_calls: Mutex<usize>,
    }

    impl ScriptedCatalog {
        pub(crate) fn set_providers(&self, solutions: &[&str], answer: AppResult<Vec<ComputeProvider>>) {
            self.providers
                .lock()
                .expect("providers lock")
                .insert(solutions.join(","), answer);
        }

        pub(crate) fn set_images(&self, provider: &str, answer: AppResult<Vec<MachineImage>>) {
            self.images
                .lock()
                .expect("images lock")
                .insert(provider.to_string(), answer);
        }

        pub(crate) fn set_resources(
            &self,
            provider: &str,
            image: &str,
            answer: AppResult<Vec<ResourceProfile>>,
        ) {
            self.resources
                .lock()
                .expect("resources lock")
                .insert((provider.to_string(), image.to_string()), answer);
        }

        fn gate_providers(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.provider_gates.lock().expect("gates lock").push_back(rx);
            tx
        }

        fn gate_images(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.image_gates.lock().expect("gates lock").push_back(rx);
            tx
        }

        fn image_calls(&self) -> usize {
            *self.image_calls.lock().expect("image_calls lock")
        }

        fn resource_calls(&self) -> usize {
            *self.resource_calls.lock().expect("resource_calls lock")
        }
    }

    #[async_trait]
    impl CatalogPort for ScriptedCatalog {
        async fn list_providers(
            &self,
            solution_ids: &[SolutionId],
        ) -> AppResult<Vec<ComputeProvider>> {
            let gate = self.provider_gates.lock().expect("gates lock").pop_front();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.providers
                .lock()
                .expect("providers lock")
                .get(&solution_ids.join(","))
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn list_images(
            &self,
            provider_id: &str,
            _solution_ids: &[SolutionId],
        ) -> AppResult<Vec<MachineImage>> {
            *self.image_calls.lock().expect("image_calls lock") += 1;
            let gate = self.image_gates.lock().expect("gates lock").pop_front();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.images
                .lock()
                .expect("images lock")
                .get(provider_id)
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn list_resources(
            &self,
            provider_id: &str,
            image_id: &str,
        ) -> AppResult<Vec<ResourceProfile>> {
            *self.resource_calls.lock().expect("resource_calls lock") += 1;
            self.resources
                .lock()
                .expect("resources lock")
                .get(&(provider_id.to_string(), image_id.to_string()))
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    pub(crate) fn provider(id: &str, kind: ProviderKind) -> ComputeProvider {
        ComputeProvider {
            id: id.to_string(),
            name: id.to_uppercase(),
            kind,
        }
    }

    pub(crate) fn image(id: &str) -> MachineImage {
        MachineImage {
            id: id.to_string(),
            name: format!("{id} toolbox"),
            description: None,
            run_command: Some(format!("run-{id}")),
        }
    }

    pub(crate) fn resource(id: &str) -> ResourceProfile {
        ResourceProfile {
            id: id.to_string(),
            vcpus: 4,
            ram_mb: 16_384,
            root_disk_gb: 40,
            ephemeral_disk_gb: 100,
        }
    }

    fn solutions(ids: &[&str]) -> Vec<SolutionId> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn resolver(catalog: &Arc<ScriptedCatalog>) -> ComputeResolver {
        ComputeResolver::new(catalog.clone(), Arc::new(NoopTelemetry))
    }

    /// Two cloud providers `a`, `b` with two images each and a resource list
    /// for `a`/`a-1`.
    fn standard_catalog() -> Arc<ScriptedCatalog> {
        let catalog = Arc::new(ScriptedCatalog::default());
        catalog.set_providers(
            &["s1"],
            Ok(vec![provider("a", ProviderKind::Cloud), provider("b", ProviderKind::Cloud)]),
        );
        catalog.set_images("a", Ok(vec![image("a-1"), image("a-2")]));
        catalog.set_images("b", Ok(vec![image("b-1"), image("b-2")]));
        catalog.set_resources("a", "a-1", Ok(vec![resource("small"), resource("large")]));
        catalog
    }

    fn assert_consistent(snapshot: &CascadeSnapshot) {
        match snapshot.job.compute_vm_id.as_deref() {
            None => assert!(snapshot.job.compute_vm_run_command.is_none()),
            Some(id) => {
                if !snapshot.images.is_empty() {
                    let image = snapshot
                        .images
                        .iter()
                        .find(|image| image.id == id)
                        .expect("selected image must be listed");
                    assert_eq!(snapshot.job.compute_vm_run_command, image.run_command);
                }
            }
        }
        if let Some(id) = snapshot.job.compute_resource_id.as_deref() {
            assert!(snapshot.resources.iter().any(|r| r.id == id));
        }
    }

    #[tokio::test]
    async fn first_provider_and_image_are_selected_by_default() {
        let catalog = standard_catalog();
        let resolver = resolver(&catalog);

        let report = resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();

        assert!(matches!(report.providers, StageOutcome::Applied));
        assert!(matches!(report.images, StageOutcome::Applied));
        assert!(matches!(report.resources, StageOutcome::Applied));
        let snapshot = resolver.snapshot();
        assert_eq!(snapshot.job.compute_service_id.as_deref(), Some("a"));
        assert_eq!(snapshot.job.compute_vm_id.as_deref(), Some("a-1"));
        assert_eq!(snapshot.job.compute_vm_run_command.as_deref(), Some("run-a-1"));
        assert_eq!(snapshot.resources.len(), 2);
        assert_eq!(snapshot.resource_status, StageStatus::ResolvedNonEmpty);
        assert!(snapshot.job.compute_resource_id.is_none());
        assert_consistent(&snapshot);
    }

    #[tokio::test]
    async fn current_provider_survives_refresh() {
        let catalog = standard_catalog();
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();
        resolver.on_provider_selected("b").await.unwrap();
        resolver.on_image_selected("b-2").await.unwrap();

        catalog.set_providers(
            &["s1"],
            Ok(vec![
                provider("a", ProviderKind::Cloud),
                provider("b", ProviderKind::Cloud),
                provider("c", ProviderKind::Cloud),
            ]),
        );
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();

        let snapshot = resolver.snapshot();
        assert_eq!(snapshot.job.compute_service_id.as_deref(), Some("b"));
        assert_eq!(snapshot.job.compute_vm_id.as_deref(), Some("b-2"));
        assert_eq!(snapshot.providers.len(), 3);
    }

    #[tokio::test]
    async fn empty_provider_refresh_clears_every_stage() {
        let catalog = standard_catalog();
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();
        resolver.on_resource_selected("small").unwrap();

        let report = resolver.on_solutions_changed(solutions(&["s2"])).await.unwrap();

        assert!(matches!(report.images, StageOutcome::Skipped));
        let snapshot = resolver.snapshot();
        assert!(snapshot.job.compute_service_id.is_none());
        assert!(snapshot.job.compute_vm_id.is_none());
        assert!(snapshot.job.compute_vm_run_command.is_none());
        assert!(snapshot.job.compute_resource_id.is_none());
        assert!(snapshot.images.is_empty());
        assert!(snapshot.resources.is_empty());
        assert_eq!(snapshot.provider_status, StageStatus::ResolvedEmpty);
    }

    #[tokio::test]
    async fn dropped_provider_resets_image_and_defaults_to_first() {
        let catalog = standard_catalog();
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();
        resolver.on_image_selected("a-2").await.unwrap();

        catalog.set_providers(&["s1"], Ok(vec![provider("b", ProviderKind::Cloud)]));
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();

        let snapshot = resolver.snapshot();
        assert_eq!(snapshot.job.compute_service_id.as_deref(), Some("b"));
        assert_eq!(snapshot.job.compute_vm_id.as_deref(), Some("b-1"));
        assert_eq!(snapshot.job.compute_vm_run_command.as_deref(), Some("run-b-1"));
        assert_consistent(&snapshot);
    }

    #[tokio::test]
    async fn provider_fetch_failure_is_returned_and_clears_state() {
        let catalog = standard_catalog();
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();

        catalog.set_providers(&["s1"], Err(AppError::catalog("catalog offline")));
        let err = resolver
            .on_solutions_changed(solutions(&["s1"]))
            .await
            .expect_err("provider failure must surface");

        assert_eq!(err.kind(), AppErrorKind::Catalog);
        let snapshot = resolver.snapshot();
        assert!(snapshot.providers.is_empty());
        assert!(snapshot.job.compute_service_id.is_none());
        assert!(snapshot.job.compute_vm_id.is_none());
        assert!(snapshot.job.compute_vm_run_command.is_none());
        assert!(snapshot.resources.is_empty());
    }

    #[tokio::test]
    async fn image_fetch_failure_is_recovered_locally() {
        let catalog = standard_catalog();
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();

        catalog.set_images("b", Err(AppError::catalog("image service down")));
        let report = resolver.on_provider_selected("b").await.unwrap();

        assert_eq!(report.errors().len(), 1);
        assert!(matches!(report.images, StageOutcome::Recovered(_)));
        assert!(matches!(report.resources, StageOutcome::Skipped));
        let snapshot = resolver.snapshot();
        assert_eq!(snapshot.job.compute_service_id.as_deref(), Some("b"));
        assert!(snapshot.images.is_empty());
        assert!(snapshot.job.compute_vm_id.is_none());
        assert!(snapshot.job.compute_vm_run_command.is_none());
        assert!(snapshot.resources.is_empty());
    }

    #[tokio::test]
    async fn resource_fetch_failure_clears_selection() {
        let catalog = standard_catalog();
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();
        resolver.on_resource_selected("small").unwrap();

        catalog.set_resources("a", "a-1", Err(AppError::catalog("nova down")));
        let report = resolver.on_image_selected("a-1").await.unwrap();

        assert!(matches!(report.resources, StageOutcome::Recovered(_)));
        assert_eq!(report.errors().len(), 1);
        let snapshot = resolver.snapshot();
        assert!(snapshot.resources.is_empty());
        assert_eq!(snapshot.resource_status, StageStatus::ResolvedEmpty);
        assert!(snapshot.job.compute_resource_id.is_none());
        assert_eq!(snapshot.job.compute_vm_id.as_deref(), Some("a-1"));
        assert_eq!(snapshot.job.compute_vm_run_command.as_deref(), Some("run-a-1"));
        assert_consistent(&snapshot);
    }

    #[tokio::test]
    async fn image_pick_with_failing_resources_during_provider_switch() {
        let catalog = standard_catalog();
        catalog.set_resources("b", "a-2", Err(AppError::catalog("nova down")));
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();

        let release = catalog.gate_images();
        let (switch, pick) = tokio::join!(resolver.on_provider_selected("b"), async {
            // Still picks from provider a's list while b's images are loading.
            let report = resolver.on_image_selected("a-2").await;
            let _ = release.send(());
            report
        });

        let pick = pick.unwrap();
        assert!(matches!(pick.resources, StageOutcome::Recovered(_)));
        let switch = switch.unwrap();
        assert!(matches!(switch.images, StageOutcome::Applied));
        assert!(matches!(switch.resources, StageOutcome::Applied));
        let snapshot = resolver.snapshot();
        assert_eq!(snapshot.job.compute_service_id.as_deref(), Some("b"));
        assert_eq!(snapshot.job.compute_vm_id.as_deref(), Some("b-1"));
        assert_eq!(snapshot.job.compute_vm_run_command.as_deref(), Some("run-b-1"));
        assert!(snapshot.job.compute_resource_id.is_none());
        assert_consistent(&snapshot);
    }

    #[tokio::test]
    async fn hpc_provider_turns_walltime_on_and_cloud_keeps_it() {
        let catalog = standard_catalog();
        catalog.set_providers(
            &["s1"],
            Ok(vec![provider("a", ProviderKind::Cloud), provider("nci", ProviderKind::Hpc)]),
        );
        catalog.set_images("nci", Err(AppError::catalog("down")));
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();
        assert!(!resolver.snapshot().use_walltime);

        resolver.on_provider_selected("nci").await.unwrap();
        assert!(resolver.snapshot().use_walltime);

        resolver.on_provider_selected("a").await.unwrap();
        assert!(resolver.snapshot().use_walltime);
    }

    #[tokio::test]
    async fn non_cloud_provider_clears_resources() {
        let catalog = standard_catalog();
        catalog.set_providers(
            &["s1"],
            Ok(vec![provider("a", ProviderKind::Cloud), provider("nci", ProviderKind::Hpc)]),
        );
        catalog.set_images("nci", Ok(vec![image("nci-1")]));
        catalog.set_resources("nci", "nci-1", Ok(vec![resource("never")]));
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();
        resolver.on_resource_selected("large").unwrap();
        let calls_before = catalog.resource_calls();

        let report = resolver.on_provider_selected("nci").await.unwrap();

        assert!(matches!(report.resources, StageOutcome::Skipped));
        assert_eq!(catalog.resource_calls(), calls_before);
        let snapshot = resolver.snapshot();
        assert_eq!(snapshot.job.compute_vm_run_command.as_deref(), Some("run-nci-1"));
        assert!(snapshot.resources.is_empty());
        assert!(snapshot.job.compute_resource_id.is_none());
    }

    #[tokio::test]
    async fn image_selection_updates_run_command_and_resources() {
        let catalog = standard_catalog();
        catalog.set_resources("a", "a-2", Ok(vec![resource("gpu")]));
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();
        resolver.on_resource_selected("small").unwrap();

        resolver.on_image_selected("a-2").await.unwrap();

        let snapshot = resolver.snapshot();
        assert_eq!(snapshot.job.compute_vm_run_command.as_deref(), Some("run-a-2"));
        assert_eq!(snapshot.resources, vec![resource("gpu")]);
        assert!(snapshot.job.compute_resource_id.is_none());
        assert_consistent(&snapshot);
    }

    #[tokio::test]
    async fn resource_selection_survives_refresh_that_still_lists_it() {
        let catalog = standard_catalog();
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();
        resolver.on_resource_selected("large").unwrap();

        resolver.on_image_selected("a-1").await.unwrap();

        assert_eq!(
            resolver.snapshot().job.compute_resource_id.as_deref(),
            Some("large")
        );
    }

    #[tokio::test]
    async fn unknown_selections_are_rejected_without_mutation() {
        let catalog = standard_catalog();
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();
        let before = resolver.snapshot();

        let err = resolver.on_provider_selected("zzz").await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::InvalidArgument);
        let err = resolver.on_image_selected("b-1").await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::InvalidArgument);
        let err = resolver.on_resource_selected("huge").unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::InvalidArgument);

        assert_eq!(resolver.snapshot(), before);
    }

    #[tokio::test]
    async fn repeated_solution_change_is_idempotent() {
        let catalog = standard_catalog();
        let resolver = resolver(&catalog);

        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();
        let first = resolver.snapshot();
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();
        let second = resolver.snapshot();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn superseded_image_fetch_is_discarded() {
        let catalog = standard_catalog();
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();

        let release = catalog.gate_images();
        let (stale, fresh) = tokio::join!(resolver.on_provider_selected("b"), async {
            let report = resolver.on_provider_selected("a").await;
            let _ = release.send(());
            report
        });

        assert!(stale.unwrap().superseded());
        assert!(!fresh.unwrap().superseded());
        let snapshot = resolver.snapshot();
        assert_eq!(snapshot.job.compute_service_id.as_deref(), Some("a"));
        assert_eq!(snapshot.job.compute_vm_id.as_deref(), Some("a-1"));
        assert_eq!(snapshot.images, vec![image("a-1"), image("a-2")]);
        assert_consistent(&snapshot);
    }

    #[tokio::test]
    async fn superseded_provider_fetch_is_discarded() {
        let catalog = standard_catalog();
        catalog.set_providers(&["s2"], Ok(vec![provider("b", ProviderKind::Cloud)]));
        let resolver = resolver(&catalog);

        let release = catalog.gate_providers();
        let (stale, fresh) = tokio::join!(
            resolver.on_solutions_changed(solutions(&["s1"])),
            async {
                let report = resolver.on_solutions_changed(solutions(&["s2"])).await;
                let _ = release.send(());
                report
            }
        );

        assert!(matches!(stale.unwrap().providers, StageOutcome::Superseded));
        assert!(matches!(fresh.unwrap().providers, StageOutcome::Applied));
        let snapshot = resolver.snapshot();
        assert_eq!(snapshot.job.solution_ids, solutions(&["s2"]));
        assert_eq!(snapshot.job.compute_service_id.as_deref(), Some("b"));
        assert_eq!(snapshot.job.compute_vm_id.as_deref(), Some("b-1"));
        assert_eq!(catalog.image_calls(), 1);
    }

    #[tokio::test]
    async fn solution_change_cancels_outstanding_image_fetch() {
        let catalog = standard_catalog();
        catalog.set_providers(&["s2"], Ok(vec![]));
        let resolver = resolver(&catalog);
        resolver.on_solutions_changed(solutions(&["s1"])).await.unwrap();

        let release = catalog.gate_images();
        let (stale, fresh) = tokio::join!(resolver.on_provider_selected("b"), async {
            let report = resolver.on_solutions_changed(solutions(&["s2"])).await;
            let _ = release.send(());
            report
        });

        assert!(stale.unwrap().superseded());
        fresh.unwrap();
        let snapshot = resolver.snapshot();
        assert!(snapshot.job.compute_service_id.is_none());
        assert!(snapshot.job.compute_vm_id.is_none());
        assert!(snapshot.images.is_empty());
    }

    #[tokio::test]
    async fn hydrate_keeps_valid_selections_and_repairs_stale_run_command() {
        let catalog = standard_catalog();
        let resolver = resolver(&catalog);
        let stored = Job {
            id: Some(12),
            name: "gravity inversion".to_string(),
            solution_ids: solutions(&["s1"]),
            compute_service_id: Some("b".to_string()),
            compute_vm_id: Some("b-2".to_string()),
            compute_vm_run_command: Some("outdated".to_string()),
            walltime: Some(90),
            ..Job::default()
        };

        resolver.hydrate(stored).await.unwrap();

        let snapshot = resolver.snapshot();
        assert_eq!(snapshot.job.id, Some(12));
        assert_eq!(snapshot.job.compute_service_id.as_deref(), Some("b"));
        assert_eq!(snapshot.job.compute_vm_id.as_deref(), Some("b-2"));
        assert_eq!(snapshot.job.compute_vm_run_command.as_deref(), Some("run-b-2"));
        assert!(snapshot.use_walltime);
    }

    #[tokio::test]
    async fn job_for_save_drops_walltime_when_unused() {
        let catalog = standard_catalog();
        let resolver = resolver(&catalog);
        resolver.set_walltime(Some(60));

        assert_eq!(resolver.job_for_save().walltime, None);
        resolver.set_use_walltime(true);
        assert_eq!(resolver.job_for_save().walltime, Some(60));
        assert_eq!(resolver.snapshot().job.walltime, Some(60));
    }
}
