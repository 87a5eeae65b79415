// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{path::Path, str::FromStr, time::Duration};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::app::types::{Job, JobPayload};

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("job not found: {0}")]
    JobNotFound(i64),
    #[error("job has not been saved")]
    NotSaved,
    #[error("walltime out of range: {0}")]
    InvalidWalltime(i64),
}

pub type Result<T> = std::result::Result<T, JobStoreError>;

/// Async job store
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

const JOB_COLUMNS: &str = "id, name, description, solution_ids, compute_service_id, \
     compute_vm_id, compute_vm_run_command, compute_resource_id, walltime, payload, submitted_at";

impl JobStore {
    /// Open (or create) a file-backed SQLite DB.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| JobStoreError::Sqlx(sqlx::Error::Io(e)))?;
        }
        let url = format!("sqlite://{}", path_ref.to_string_lossy());
        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    /// Open an in-memory store (handy for tests).
    #[allow(dead_code)]
    pub async fn open_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    async fn bootstrap(&self) -> Result<()> {
        // Improve concurrency for file DBs.
        let _ = sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL,
              description TEXT,
              solution_ids TEXT NOT NULL,      -- JSON array
              compute_service_id TEXT,
              compute_vm_id TEXT,
              compute_vm_run_command TEXT,
              compute_resource_id TEXT,
              walltime INTEGER,                -- minutes
              payload TEXT NOT NULL,           -- JSON object
              created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
              updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
              submitted_at TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts a job without an id, otherwise updates the stored row.
    /// Returns the job as stored.
    pub async fn save_job(&self, job: &Job) -> Result<Job> {
        let solution_ids = serde_json::to_string(&job.solution_ids)?;
        let payload = serde_json::to_string(&job.payload)?;
        let walltime = job.walltime.map(i64::from);

        let id = match job.id {
            None => {
                let rec = sqlx::query(
                    r#"
                    insert into jobs(
                        name, description, solution_ids, compute_service_id, compute_vm_id,
                        compute_vm_run_command, compute_resource_id, walltime, payload
                    )
                    values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    returning id;
                    "#,
                )
                .bind(&job.name)
                .bind(&job.description)
                .bind(&solution_ids)
                .bind(&job.compute_service_id)
                .bind(&job.compute_vm_id)
                .bind(&job.compute_vm_run_command)
                .bind(&job.compute_resource_id)
                .bind(walltime)
                .bind(&payload)
                .fetch_one(&self.pool)
                .await?;
                rec.try_get::<i64, _>("id")?
            }
            Some(id) => {
                let result = sqlx::query(
                    r#"
                    update jobs
                    set name = ?1,
                        description = ?2,
                        solution_ids = ?3,
                        compute_service_id = ?4,
                        compute_vm_id = ?5,
                        compute_vm_run_command = ?6,
                        compute_resource_id = ?7,
                        walltime = ?8,
                        payload = ?9,
                        updated_at = ?10
                    where id = ?11
                    "#,
                )
                .bind(&job.name)
                .bind(&job.description)
                .bind(&solution_ids)
                .bind(&job.compute_service_id)
                .bind(&job.compute_vm_id)
                .bind(&job.compute_vm_run_command)
                .bind(&job.compute_resource_id)
                .bind(walltime)
                .bind(&payload)
                .bind(now_rfc3339())
                .bind(id)
                .execute(&self.pool)
                .await?;
                if result.rows_affected() == 0 {
                    return Err(JobStoreError::JobNotFound(id));
                }
                id
            }
        };

        self.get_job(id).await?.ok_or(JobStoreError::JobNotFound(id))
    }

    pub async fn get_job(&self, id: i64) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("select {JOB_COLUMNS} from jobs where id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_job).transpose()
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!("select {JOB_COLUMNS} from jobs order by id"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_job).collect()
    }

    /// Marks a stored job as submitted and returns the timestamp recorded.
    pub async fn mark_submitted(&self, id: i64) -> Result<String> {
        let now = now_rfc3339();
        let result = sqlx::query(
            r#"
            update jobs
            set submitted_at = ?1,
                updated_at = ?1
            where id = ?2
            "#,
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(JobStoreError::JobNotFound(id));
        }
        Ok(now)
    }

    pub async fn submit_job(&self, job: &Job) -> Result<String> {
        let id = job.id.ok_or(JobStoreError::NotSaved)?;
        self.mark_submitted(id).await
    }
}

// -- helpers

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".into())
}

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<Job> {
    let solution_ids: String = row.try_get("solution_ids")?;
    let payload: String = row.try_get("payload")?;
    let walltime = match row.try_get::<Option<i64>, _>("walltime")? {
        Some(minutes) => {
            Some(u32::try_from(minutes).map_err(|_| JobStoreError::InvalidWalltime(minutes))?)
        }
        None => None,
    };
    Ok(Job {
        id: Some(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        solution_ids: serde_json::from_str(&solution_ids)?,
        compute_service_id: row.try_get("compute_service_id")?,
        compute_vm_id: row.try_get("compute_vm_id")?,
        compute_vm_run_command: row.try_get("compute_vm_run_command")?,
        compute_resource_id: row.try_get("compute_resource_id")?,
        walltime,
        payload: serde_json::from_str::<JobPayload>(&payload)?,
        submitted_at: row.try_get("submitted_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::types::Download;

    fn make_job(name: &str) -> Job {
        Job {
            name: name.into(),
            description: Some("bouguer anomaly".into()),
            solution_ids: vec!["gravity-inversion".into(), "mesh".into()],
            compute_service_id: Some("aws".into()),
            compute_vm_id: Some("escript".into()),
            compute_vm_run_command: Some("python3 run.py".into()),
            compute_resource_id: Some("m5.large".into()),
            walltime: None,
            payload: JobPayload {
                downloads: vec![Download {
                    name: "grav.nc".into(),
                    url: "https://data.example.org/grav.nc".into(),
                    local_path: "input/grav.nc".into(),
                }],
                template_vars: [("iterations".to_string(), "40".to_string())].into(),
                uploaded_files: vec!["mesh.msh".into()],
            },
            ..Job::default()
        }
    }

    #[tokio::test]
    async fn insert_assigns_id_and_round_trips() {
        let db = JobStore::open_memory().await.unwrap();
        let saved = db.save_job(&make_job("survey")).await.unwrap();
        let id = saved.id.unwrap();

        let got = db.get_job(id).await.unwrap().unwrap();
        let mut expected = make_job("survey");
        expected.id = Some(id);
        assert_eq!(got, expected);
        assert_eq!(saved, got);
    }

    #[tokio::test]
    async fn update_keeps_identifier() {
        let db = JobStore::open_memory().await.unwrap();
        let mut job = db.save_job(&make_job("survey")).await.unwrap();
        job.name = "survey v2".into();
        job.compute_resource_id = None;
        job.walltime = Some(90);

        let updated = db.save_job(&job).await.unwrap();

        assert_eq!(updated.id, job.id);
        assert_eq!(updated.name, "survey v2");
        assert_eq!(updated.walltime, Some(90));
        assert!(updated.compute_resource_id.is_none());
        assert_eq!(db.list_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_of_unknown_job_is_rejected() {
        let db = JobStore::open_memory().await.unwrap();
        let mut job = make_job("ghost");
        job.id = Some(42);
        let err = db.save_job(&job).await.unwrap_err();
        assert!(matches!(err, JobStoreError::JobNotFound(42)));
    }

    #[tokio::test]
    async fn get_job_not_found_returns_none() {
        let db = JobStore::open_memory().await.unwrap();
        assert!(db.get_job(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn submit_records_timestamp() {
        let db = JobStore::open_memory().await.unwrap();
        let saved = db.save_job(&make_job("survey")).await.unwrap();

        let stamp = db.submit_job(&saved).await.unwrap();

        OffsetDateTime::parse(&stamp, &Rfc3339).unwrap();
        let got = db.get_job(saved.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(got.submitted_at.as_deref(), Some(stamp.as_str()));
    }

    #[tokio::test]
    async fn submit_requires_saved_job() {
        let db = JobStore::open_memory().await.unwrap();
        let err = db.submit_job(&make_job("draft")).await.unwrap_err();
        assert!(matches!(err, JobStoreError::NotSaved));

        let mut unknown = make_job("ghost");
        unknown.id = Some(9);
        let err = db.submit_job(&unknown).await.unwrap_err();
        assert!(matches!(err, JobStoreError::JobNotFound(9)));
    }

    #[tokio::test]
    async fn file_store_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jobs.sqlite");

        let db = JobStore::open(&path).await.unwrap();
        db.save_job(&make_job("survey")).await.unwrap();

        assert!(path.exists());
    }
}
