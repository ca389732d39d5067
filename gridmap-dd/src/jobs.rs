//! Compute job bookkeeping
//!
//! Scenarios carry a handle to the external capacity-analysis job run for
//! them: job id, last reported status and failure reason. Jobs themselves
//! are started elsewhere; this module records their status and revokes the
//! ones whose scenario is about to be purged.

use gridmap_common::db::models::{parse_guid, JobStatus, Network};
use gridmap_common::{Error, Result};
use sqlx::{Row, SqliteConnection};
use std::time::Duration;
use uuid::Uuid;

/// Distributed task queue client
pub trait JobQueue: Send + Sync {
    /// Request revocation of `job_id`.
    ///
    /// Must not wait for the revocation to take effect. An `Err` means the
    /// request could not even be issued.
    fn cancel(&self, job_id: &str) -> Result<()>;
}

/// Task queue monitor reachable over HTTP (Flower API)
pub struct FlowerJobQueue {
    client: reqwest::Client,
    base_url: String,
}

impl FlowerJobQueue {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build job queue client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Revocation endpoint for `job_id`
    pub fn revoke_url(&self, job_id: &str) -> String {
        format!("{}/api/task/revoke/{}?terminate=true", self.base_url, job_id)
    }
}

impl JobQueue for FlowerJobQueue {
    fn cancel(&self, job_id: &str) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("No async runtime to revoke job: {}", e)))?;

        let client = self.client.clone();
        let url = self.revoke_url(job_id);
        let job_id = job_id.to_string();

        handle.spawn(async move {
            match client.post(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(job_id = %job_id, "Compute job revoked");
                }
                Ok(response) => {
                    tracing::warn!(
                        job_id = %job_id,
                        status_code = response.status().as_u16(),
                        "Job queue rejected revocation"
                    );
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Job revocation request failed");
                }
            }
        });

        Ok(())
    }
}

/// Used when no job queue is configured; revocations are dropped
pub struct DisabledJobQueue;

impl JobQueue for DisabledJobQueue {
    fn cancel(&self, job_id: &str) -> Result<()> {
        tracing::warn!(job_id = %job_id, "No job queue configured, job not revoked");
        Ok(())
    }
}

/// Scenario holding a job that may still be running
#[derive(Debug, Clone, PartialEq)]
pub struct PendingJob {
    pub scenario_id: Uuid,
    pub job_id: String,
    pub status: Option<JobStatus>,
}

/// Mark a scenario's job as queued
pub async fn record_job_queued(
    conn: &mut SqliteConnection,
    scenario_id: Uuid,
    job_id: &str,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE scenarios
        SET solver_task_id = ?, solver_task_status = ?, solver_task_status_reason = NULL,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(job_id)
    .bind(JobStatus::Pending.as_str())
    .bind(scenario_id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("scenario {}", scenario_id)));
    }

    tracing::debug!(scenario_id = %scenario_id, job_id = %job_id, "Compute job queued");
    Ok(())
}

/// Apply a reported status transition to the scenario holding `job_id`.
///
/// Returns the number of scenarios updated; zero when the job belongs to a
/// scenario that no longer exists.
pub async fn record_job_status(
    conn: &mut SqliteConnection,
    job_id: &str,
    status: JobStatus,
    reason: Option<&str>,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE scenarios
        SET solver_task_status = ?, solver_task_status_reason = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE solver_task_id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(reason)
    .bind(job_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        tracing::debug!(job_id = %job_id, status = %status, "Status for unknown job ignored");
    }

    Ok(result.rows_affected())
}

/// Non-default scenarios of `network` whose job has not reached a terminal state.
///
/// A job id with no reported status counts as pending.
pub async fn pending_jobs(conn: &mut SqliteConnection, network: &Network) -> Result<Vec<PendingJob>> {
    let [success, failure, revoked] = JobStatus::terminal_codes();

    let rows = sqlx::query(
        r#"
        SELECT id, solver_task_id, solver_task_status
        FROM scenarios
        WHERE net_id = ?
          AND id IS NOT ?
          AND solver_task_id IS NOT NULL
          AND (solver_task_status IS NULL OR solver_task_status NOT IN (?, ?, ?))
        ORDER BY rowid
        "#,
    )
    .bind(network.id.to_string())
    .bind(network.default_scenario_id.map(|id| id.to_string()))
    .bind(success)
    .bind(failure)
    .bind(revoked)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let status: Option<String> = row.get("solver_task_status");
            Ok(PendingJob {
                scenario_id: parse_guid(&id)?,
                job_id: row.get("solver_task_id"),
                status: status.as_deref().map(str::parse::<JobStatus>).transpose()?,
            })
        })
        .collect()
}
