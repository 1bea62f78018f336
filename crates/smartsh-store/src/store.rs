//! Embedded job store.
//!
//! A single SQLite file holding two tables, `jobs` and `approvals`, each
//! shaped as `(id TEXT PRIMARY KEY, json TEXT NOT NULL, updated_at INTEGER
//! NOT NULL)`. The row's `json` column is the canonical representation;
//! `updated_at` is duplicated out of it purely so `ORDER BY` and prune
//! queries don't need to deserialize every row first.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use smartsh_core::{Approval, ApprovalStatus, Error, Job, Result};

use crate::lock::StoreLock;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Embedded store for jobs and approvals, backed by a SQLite file and an
/// adjacent lock file held exclusively for this handle's lifetime.
pub struct JobStore {
    pool: SqlitePool,
    _lock: StoreLock,
    path: PathBuf,
}

impl JobStore {
    /// Open (creating if absent) the store rooted at `dir`, e.g.
    /// `~/.smartsh/store/`. Fails if another process already holds the
    /// adjacent lock file.
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let lock_path = dir.join("store.lock");
        let lock = StoreLock::acquire(&lock_path)?;

        let db_path = dir.join("jobs.db");
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| Error::message(format!("opening job store at {db_path:?}: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                 id TEXT PRIMARY KEY,
                 json TEXT NOT NULL,
                 updated_at INTEGER NOT NULL
             )",
        )
        .execute(&pool)
        .await
        .map_err(|e| Error::message(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS approvals (
                 id TEXT PRIMARY KEY,
                 json TEXT NOT NULL,
                 updated_at INTEGER NOT NULL
             )",
        )
        .execute(&pool)
        .await
        .map_err(|e| Error::message(e.to_string()))?;

        Ok(Self {
            pool,
            _lock: lock,
            path: db_path,
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.path
    }

    pub async fn save_job(&self, job: &Job) -> Result<()> {
        let json = serde_json::to_string(job)?;
        sqlx::query(
            "INSERT INTO jobs (id, json, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET json = excluded.json, updated_at = excluded.updated_at",
        )
        .bind(&job.id)
        .bind(json)
        .bind(now_ms())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::message(e.to_string()))?;
        Ok(())
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let row: Option<String> = sqlx::query_scalar("SELECT json FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::message(e.to_string()))?;
        row.map(|j| serde_json::from_str(&j).map_err(Error::from))
            .transpose()
    }

    /// Most recently updated jobs first, capped at `limit`.
    pub async fn list_jobs(&self, limit: i64) -> Result<Vec<Job>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT json FROM jobs ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::message(e.to_string()))?;
        rows.iter()
            .map(|j| serde_json::from_str(j).map_err(Error::from))
            .collect()
    }

    pub async fn save_approval(&self, approval: &Approval) -> Result<()> {
        let json = serde_json::to_string(approval)?;
        sqlx::query(
            "INSERT INTO approvals (id, json, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET json = excluded.json, updated_at = excluded.updated_at",
        )
        .bind(&approval.id)
        .bind(json)
        .bind(now_ms())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::message(e.to_string()))?;
        Ok(())
    }

    pub async fn get_approval(&self, id: &str) -> Result<Option<Approval>> {
        let row: Option<String> = sqlx::query_scalar("SELECT json FROM approvals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::message(e.to_string()))?;
        row.map(|j| serde_json::from_str(&j).map_err(Error::from))
            .transpose()
    }

    /// All approvals still in `Pending`, oldest first, so callers reconnect
    /// to the longest-waiting prompt first after a daemon restart.
    pub async fn list_pending_approvals(&self) -> Result<Vec<Approval>> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT json FROM approvals ORDER BY updated_at ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::message(e.to_string()))?;
        let mut approvals = Vec::new();
        for row in rows {
            let approval: Approval = serde_json::from_str(&row)?;
            if approval.status == ApprovalStatus::Pending {
                approvals.push(approval);
            }
        }
        Ok(approvals)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use smartsh_core::{Approval, ApprovalStatus, Job, RunRequest, RunResponse, RunStatus};

    use super::*;

    fn sample_job(id: &str) -> Job {
        Job {
            id: id.to_string(),
            request: RunRequest::new("echo hi"),
            result: Some(RunResponse::new(id, RunStatus::Completed)),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn sample_approval(id: &str, status: ApprovalStatus) -> Approval {
        Approval {
            id: id.to_string(),
            job_id: None,
            request: RunRequest::new("rm -rf /tmp/x"),
            resolved_command: "rm -rf /tmp/x".to_string(),
            resolved_risk: "high".to_string(),
            risk_reason: "recursive delete".to_string(),
            risk_targets: vec!["/tmp/x".to_string()],
            status,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn save_and_get_job_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JobStore::open(dir.path()).await.expect("open store");

        let job = sample_job("job_1");
        store.save_job(&job).await.expect("save");

        let fetched = store.get_job("job_1").await.expect("get").expect("present");
        assert_eq!(fetched.id, "job_1");
        assert_eq!(fetched.request.command, "echo hi");
    }

    #[tokio::test]
    async fn get_job_missing_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JobStore::open(dir.path()).await.expect("open store");
        assert!(store.get_job("nope").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn list_jobs_orders_most_recent_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JobStore::open(dir.path()).await.expect("open store");

        store.save_job(&sample_job("job_1")).await.expect("save 1");
        store.save_job(&sample_job("job_2")).await.expect("save 2");

        let jobs = store.list_jobs(10).await.expect("list");
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, "job_2");
    }

    #[tokio::test]
    async fn pending_approvals_excludes_resolved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JobStore::open(dir.path()).await.expect("open store");

        store
            .save_approval(&sample_approval("approval_1", ApprovalStatus::Pending))
            .await
            .expect("save pending");
        store
            .save_approval(&sample_approval("approval_2", ApprovalStatus::Rejected))
            .await
            .expect("save rejected");

        let pending = store.list_pending_approvals().await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "approval_1");
    }

    #[tokio::test]
    async fn reopening_store_survives_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = JobStore::open(dir.path()).await.expect("open store");
            store.save_job(&sample_job("job_1")).await.expect("save");
        }
        let store = JobStore::open(dir.path()).await.expect("reopen store");
        let job = store.get_job("job_1").await.expect("get").expect("present");
        assert_eq!(job.id, "job_1");
    }
}
