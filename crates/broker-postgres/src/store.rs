//! `PgStore`: the PostgreSQL implementation of `broker_core::Store`.
//!
//! Two invariants drive every query here (spec §4.1-§4.3):
//!
//! - The readiness-gated NEW -> QUEUED transition is always one `UPDATE ...
//!   RETURNING id` statement, never a read followed by a conditional write,
//!   so two concurrent uploads can't both observe "not ready yet" and lose
//!   the transition.
//! - Claiming a job runs the retry sweep and the claim itself inside a
//!   single transaction, so a job can't be swept and claimed by two
//!   different callers.

use crate::rows::{role_name, EngineRow, ImageRow, JobRow, KeyRow};
use async_trait::async_trait;
use broker_core::{
    ArtifactKind, CancelOutcome, ClaimOutcome, CompleteOutcome, Engine, FailOutcome, HeartbeatOutcome, Image, Job,
    Key, KeyRole, NewImage, ProcessingState, ProgressOutcome, ReleaseOutcome, Requirements, Store, StoreError,
    SweeperPolicy, UploadOutcome,
};
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

fn transient(e: sqlx::Error) -> StoreError {
    StoreError::Transient(e.into())
}

fn not_found_or_transient(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => transient(other),
    }
}

/// Maps a unique-violation on `constraint` to `StoreError::Conflict`,
/// anything else to `Transient`. `field`/`value` describe the conflict in
/// application terms since the raw constraint name is a SQL-layer detail.
fn conflict_or_transient(e: sqlx::Error, constraint: &str, field: &'static str, value: String) -> StoreError {
    let is_this_constraint = e
        .as_database_error()
        .map(|d| d.code().as_deref() == Some("23505") && d.constraint() == Some(constraint))
        .unwrap_or(false);
    if is_this_constraint {
        StoreError::Conflict { field, value }
    } else {
        transient(e)
    }
}

/// The readiness predicate, composed as one `UPDATE` so the flag write and
/// the gate it unlocks commit atomically (spec §4.2).
const TRY_ENQUEUE_SQL: &str = r#"
UPDATE jobs
SET state = 'queued', last_change = now()
WHERE id = $1
  AND state = 'new'
  AND NOT EXISTS (
    SELECT 1 FROM images i
    WHERE i.job_id = jobs.id
      AND (
        NOT i.image_uploaded
        OR (jobs.alto_required AND NOT i.alto_uploaded)
        OR (jobs.page_required AND NOT i.page_uploaded)
      )
  )
  AND (NOT jobs.meta_json_required OR jobs.meta_json_uploaded)
RETURNING id
"#;

const JOB_COLUMNS: &str = r#"
    id, owner_key_id, worker_key_id, engine_id, definition,
    alto_required, page_required, meta_json_required, meta_json_uploaded,
    state::text AS state, progress, previous_attempts,
    created_date, started_date, last_change, finished_date, log, log_user
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn try_enqueue(tx: &mut Transaction<'_, Postgres>, job_id: Uuid) -> Result<bool, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(TRY_ENQUEUE_SQL)
            .bind(job_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(transient)?;
        Ok(row.is_some())
    }

    async fn fetch_job_for_update(tx: &mut Transaction<'_, Postgres>, job_id: Uuid) -> Result<JobRow, StoreError> {
        sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE"))
            .bind(job_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(not_found_or_transient)
    }

    /// The two bulk `UPDATE`s of spec §4.3, shared by `claim_one` (which runs
    /// them inline before claiming) and the optional standalone `sweep`.
    async fn run_sweep(tx: &mut Transaction<'_, Postgres>, policy: &SweeperPolicy) -> Result<(), StoreError> {
        let timeout_threshold = Utc::now() - policy.timeout_with_grace();

        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'queued', worker_key_id = NULL, progress = 0.0, last_change = now()
            WHERE ((state = 'processing' AND last_change < $1) OR state = 'error')
              AND previous_attempts < $2 - 1
            "#,
        )
        .bind(timeout_threshold)
        .bind(policy.max_attempts)
        .execute(&mut **tx)
        .await
        .map_err(transient)?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'failed', finished_date = now(), last_change = now(), progress = 1.0
            WHERE ((state = 'processing' AND last_change < $1) OR state = 'error')
              AND previous_attempts >= $2 - 1
            "#,
        )
        .bind(timeout_threshold)
        .bind(policy.max_attempts)
        .execute(&mut **tx)
        .await
        .map_err(transient)?;

        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_job(
        &self,
        owner_key_id: Uuid,
        engine_id: Option<Uuid>,
        definition: serde_json::Value,
        requirements: Requirements,
        images: Vec<NewImage>,
    ) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await.map_err(transient)?;

        let row: JobRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO jobs (owner_key_id, engine_id, definition, alto_required, page_required, meta_json_required)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(owner_key_id)
        .bind(engine_id)
        .bind(&definition)
        .bind(requirements.alto_required)
        .bind(requirements.page_required)
        .bind(requirements.meta_json_required)
        .fetch_one(&mut *tx)
        .await
        .map_err(transient)?;

        for image in &images {
            sqlx::query(r#"INSERT INTO images (job_id, name, "order") VALUES ($1, $2, $3)"#)
                .bind(row.id)
                .bind(&image.name)
                .bind(image.order)
                .execute(&mut *tx)
                .await
                .map_err(transient)?;
        }

        tx.commit().await.map_err(transient)?;
        Ok(row.into())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Job, StoreError> {
        let row: JobRow = sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(job_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_transient)?;
        Ok(row.into())
    }

    async fn list_jobs(&self, owner_key_id: Option<Uuid>) -> Result<Vec<Job>, StoreError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE $1::uuid IS NULL OR owner_key_id = $1 ORDER BY created_date DESC"
        ))
        .bind(owner_key_id)
        .fetch_all(&self.pool)
        .await
        .map_err(transient)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_image_uploaded(
        &self,
        job_id: Uuid,
        image_name: &str,
        kind: ArtifactKind,
        imagehash: Option<String>,
    ) -> Result<UploadOutcome, StoreError> {
        let column = match kind {
            ArtifactKind::Image => "image_uploaded",
            ArtifactKind::Alto => "alto_uploaded",
            ArtifactKind::Page => "page_uploaded",
        };

        let mut tx = self.pool.begin().await.map_err(transient)?;

        let previous: bool = sqlx::query_scalar(&format!(
            "SELECT {column} FROM images WHERE job_id = $1 AND name = $2 FOR UPDATE"
        ))
        .bind(job_id)
        .bind(image_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(not_found_or_transient)?;

        sqlx::query(&format!(
            r#"UPDATE images SET {column} = true, imagehash = COALESCE($3, imagehash) WHERE job_id = $1 AND name = $2"#
        ))
        .bind(job_id)
        .bind(image_name)
        .bind(imagehash)
        .execute(&mut *tx)
        .await
        .map_err(transient)?;

        let enqueued = Self::try_enqueue(&mut tx, job_id).await?;
        tx.commit().await.map_err(transient)?;

        Ok(if enqueued {
            UploadOutcome::RecordedAndEnqueued
        } else if previous {
            UploadOutcome::Reuploaded
        } else {
            UploadOutcome::Recorded
        })
    }

    async fn mark_meta_uploaded(&self, job_id: Uuid) -> Result<UploadOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(transient)?;

        let previous: bool = sqlx::query_scalar("SELECT meta_json_uploaded FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(not_found_or_transient)?;

        sqlx::query("UPDATE jobs SET meta_json_uploaded = true WHERE id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(transient)?;

        let enqueued = Self::try_enqueue(&mut tx, job_id).await?;
        tx.commit().await.map_err(transient)?;

        Ok(if enqueued {
            UploadOutcome::RecordedAndEnqueued
        } else if previous {
            UploadOutcome::Reuploaded
        } else {
            UploadOutcome::Recorded
        })
    }

    async fn cancel_job(&self, job_id: Uuid) -> Result<CancelOutcome, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET state = 'cancelled', finished_date = now(), last_change = now()
            WHERE id = $1 AND state IN ('new', 'queued', 'processing')
            RETURNING id
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?;

        if row.is_some() {
            return Ok(CancelOutcome::Cancelled);
        }

        // Distinguish "already terminal" from "doesn't exist" for the caller.
        self.get_job(job_id).await?;
        Ok(CancelOutcome::AlreadyTerminal)
    }

    async fn claim_one(&self, worker_key_id: Uuid, policy: &SweeperPolicy) -> Result<ClaimOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(transient)?;
        Self::run_sweep(&mut tx, policy).await?;

        let claimed: Option<JobRow> = sqlx::query_as(&format!(
            r#"
            WITH next_job AS (
                SELECT id FROM jobs
                WHERE state = 'queued'
                ORDER BY created_date ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET state = 'processing',
                worker_key_id = $1,
                started_date = COALESCE(started_date, now()),
                last_change = now(),
                previous_attempts = previous_attempts + 1
            WHERE id IN (SELECT id FROM next_job)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(worker_key_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(transient)?;

        tx.commit().await.map_err(transient)?;

        Ok(match claimed {
            Some(row) => ClaimOutcome::Claimed(row.into()),
            None => ClaimOutcome::QueueEmpty,
        })
    }

    /// Standalone sweep with no claim attached, for the optional periodic
    /// background task (spec §5, §9).
    async fn sweep(&self, policy: &SweeperPolicy) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(transient)?;
        Self::run_sweep(&mut tx, policy).await?;
        tx.commit().await.map_err(transient)?;
        Ok(())
    }

    async fn heartbeat(&self, job_id: Uuid, worker_key_id: Uuid) -> Result<HeartbeatOutcome, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "UPDATE jobs SET last_change = now() WHERE id = $1 AND worker_key_id = $2 AND state = 'processing' RETURNING id",
        )
        .bind(job_id)
        .bind(worker_key_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?;

        Ok(if row.is_some() {
            HeartbeatOutcome::Accepted
        } else {
            HeartbeatOutcome::Rejected
        })
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        worker_key_id: Uuid,
        progress: Option<f64>,
        log: Option<String>,
        log_user: Option<String>,
    ) -> Result<ProgressOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(transient)?;

        let current: Option<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT log, log_user FROM jobs WHERE id = $1 AND worker_key_id = $2 AND state = 'processing' FOR UPDATE",
        )
        .bind(job_id)
        .bind(worker_key_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(transient)?;

        let Some((existing_log, existing_log_user)) = current else {
            return Ok(ProgressOutcome::Rejected);
        };

        let new_log = log
            .as_deref()
            .map(|entry| broker_core::append_log(existing_log.as_deref(), entry));
        let new_log_user = log_user
            .as_deref()
            .map(|entry| broker_core::append_log(existing_log_user.as_deref(), entry));

        sqlx::query(
            r#"
            UPDATE jobs
            SET progress = COALESCE($3, progress),
                log = COALESCE($4, log),
                log_user = COALESCE($5, log_user),
                last_change = now()
            WHERE id = $1 AND worker_key_id = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_key_id)
        .bind(progress)
        .bind(new_log)
        .bind(new_log_user)
        .execute(&mut *tx)
        .await
        .map_err(transient)?;

        tx.commit().await.map_err(transient)?;
        Ok(ProgressOutcome::Accepted)
    }

    async fn release_lease(&self, job_id: Uuid, worker_key_id: Uuid) -> Result<ReleaseOutcome, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET state = 'queued', worker_key_id = NULL, last_change = now()
            WHERE id = $1 AND worker_key_id = $2 AND state = 'processing'
            RETURNING id
            "#,
        )
        .bind(job_id)
        .bind(worker_key_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?;

        Ok(if row.is_some() {
            ReleaseOutcome::Released
        } else {
            ReleaseOutcome::Rejected
        })
    }

    async fn complete_job(&self, job_id: Uuid, worker_key_id: Uuid) -> Result<CompleteOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(transient)?;
        let row = Self::fetch_job_for_update(&mut tx, job_id).await?;

        if row.state.as_str() == "done" {
            tx.commit().await.map_err(transient)?;
            return Ok(CompleteOutcome::AlreadyCompleted);
        }

        if row.state.as_str() != "processing" || row.worker_key_id != Some(worker_key_id) {
            return Ok(CompleteOutcome::Rejected);
        }

        sqlx::query(
            "UPDATE jobs SET state = 'done', progress = 1.0, finished_date = now(), last_change = now() WHERE id = $1",
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await
        .map_err(transient)?;

        tx.commit().await.map_err(transient)?;
        Ok(CompleteOutcome::Completed)
    }

    async fn fail_job(&self, job_id: Uuid, worker_key_id: Uuid) -> Result<FailOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(transient)?;
        let row = Self::fetch_job_for_update(&mut tx, job_id).await?;
        let state: Job = row.into();

        if state.state.is_terminal() {
            tx.commit().await.map_err(transient)?;
            return Ok(FailOutcome::AlreadyTerminal);
        }

        if state.state != ProcessingState::Processing || state.worker_key_id != Some(worker_key_id) {
            return Ok(FailOutcome::Rejected);
        }

        sqlx::query("UPDATE jobs SET state = 'error', last_change = now() WHERE id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(transient)?;

        tx.commit().await.map_err(transient)?;
        Ok(FailOutcome::Accepted)
    }

    async fn get_images(&self, job_id: Uuid) -> Result<Vec<Image>, StoreError> {
        let rows: Vec<ImageRow> = sqlx::query_as(
            r#"SELECT id, job_id, name, "order", imagehash, image_uploaded, alto_uploaded, page_uploaded
               FROM images WHERE job_id = $1 ORDER BY "order" ASC"#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(transient)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_image(&self, job_id: Uuid, image_name: &str) -> Result<Image, StoreError> {
        let row: ImageRow = sqlx::query_as(
            r#"SELECT id, job_id, name, "order", imagehash, image_uploaded, alto_uploaded, page_uploaded
               FROM images WHERE job_id = $1 AND name = $2"#,
        )
        .bind(job_id)
        .bind(image_name)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_transient)?;
        Ok(row.into())
    }

    async fn lookup_key_by_hash(&self, key_hash: &str) -> Result<Key, StoreError> {
        let row: KeyRow = sqlx::query_as(
            "SELECT id, label, role::text AS role, active, created_date, last_used FROM keys WHERE key_hash = $1",
        )
        .bind(key_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_transient)?;
        Ok(row.into())
    }

    async fn create_key(&self, label: String, role: KeyRole, key_hash: String) -> Result<Key, StoreError> {
        let row: KeyRow = sqlx::query_as(
            r#"
            INSERT INTO keys (key_hash, label, role)
            VALUES ($1, $2, $3::key_role)
            RETURNING id, label, role::text AS role, active, created_date, last_used
            "#,
        )
        .bind(&key_hash)
        .bind(&label)
        .bind(role_name(role))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error().and_then(|d| d.constraint()) {
            Some("keys_key_hash_key") => StoreError::Conflict { field: "key_hash", value: key_hash.clone() },
            Some("keys_label_key") => StoreError::Conflict { field: "label", value: label.clone() },
            _ => transient(e),
        })?;
        Ok(row.into())
    }

    async fn key_hash_in_use(&self, key_hash: &str) -> Result<bool, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM keys WHERE key_hash = $1")
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(transient)?;
        Ok(row.is_some())
    }

    async fn touch_key_last_used(&self, key_id: Uuid) {
        // Best-effort: a failure here must never fail the caller's request
        // (spec §6 Auth; grounded on the original's silent-rollback touch).
        if let Err(error) = sqlx::query("UPDATE keys SET last_used = now() WHERE id = $1")
            .bind(key_id)
            .execute(&self.pool)
            .await
        {
            tracing::warn!(%key_id, %error, "failed to record key last_used");
        }
    }

    async fn update_key(&self, key_id: Uuid, active: Option<bool>) -> Result<Key, StoreError> {
        let row: KeyRow = sqlx::query_as(
            r#"
            UPDATE keys SET active = COALESCE($2, active) WHERE id = $1
            RETURNING id, label, role::text AS role, active, created_date, last_used
            "#,
        )
        .bind(key_id)
        .bind(active)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_transient)?;
        Ok(row.into())
    }

    async fn list_keys(&self) -> Result<Vec<Key>, StoreError> {
        let rows: Vec<KeyRow> = sqlx::query_as(
            "SELECT id, label, role::text AS role, active, created_date, last_used FROM keys ORDER BY created_date ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(transient)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_engine(&self, name: String, version: String) -> Result<Engine, StoreError> {
        let row: EngineRow = sqlx::query_as(
            "INSERT INTO engines (name, version) VALUES ($1, $2) RETURNING id, name, version, active",
        )
        .bind(&name)
        .bind(&version)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_transient(e, "engines_name_version_key", "name_version", format!("{name}/{version}")))?;
        Ok(row.into())
    }

    async fn get_engine(&self, engine_id: Uuid) -> Result<Engine, StoreError> {
        let row: EngineRow = sqlx::query_as("SELECT id, name, version, active FROM engines WHERE id = $1")
            .bind(engine_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_transient)?;
        Ok(row.into())
    }

    async fn list_engines(&self) -> Result<Vec<Engine>, StoreError> {
        let rows: Vec<EngineRow> = sqlx::query_as("SELECT id, name, version, active FROM engines ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(transient)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_engine(&self, engine_id: Uuid, active: Option<bool>) -> Result<Engine, StoreError> {
        let row: EngineRow = sqlx::query_as(
            "UPDATE engines SET active = COALESCE($2, active) WHERE id = $1 RETURNING id, name, version, active",
        )
        .bind(engine_id)
        .bind(active)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_transient)?;
        Ok(row.into())
    }
}
