// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns a blast request into persisted, staggered send tasks.

use serde::{Deserialize, Serialize};
use tracing::info;

use wawa_config::model::BlastConfig;
use wawa_core::WawaError;
use wawa_core::types::DeviceId;
use wawa_storage::Database;
use wawa_storage::queries::{blasts, queue};

/// The payload of one `send_queue` entry: everything a worker needs to
/// deliver and account for a single recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendTask {
    pub job_id: String,
    pub device_id: String,
    pub recipient_id: String,
    pub phone: String,
    pub message: String,
}

/// Creates blast jobs and schedules their per-recipient tasks.
#[derive(Clone)]
pub struct BlastDispatcher {
    db: Database,
    config: BlastConfig,
}

impl BlastDispatcher {
    pub fn new(db: Database, config: BlastConfig) -> Self {
        Self { db, config }
    }

    /// Persist a blast job and enqueue one send task per recipient.
    ///
    /// Recipient `i` becomes claimable at `now + i × stagger_ms`, spreading
    /// the job across the rate limit window instead of slamming it. The job
    /// is marked PROCESSING (with `started_at`) before this returns, so a
    /// caller observing the job never sees it PENDING with tasks in flight.
    ///
    /// Returns the number of scheduled tasks.
    pub async fn enqueue_blast_job(
        &self,
        job_id: &str,
        device_id: &DeviceId,
        message: &str,
        phones: &[String],
    ) -> Result<usize, WawaError> {
        let recipients: Vec<(String, String)> = phones
            .iter()
            .map(|phone| (uuid::Uuid::new_v4().to_string(), phone.clone()))
            .collect();

        blasts::create_job(&self.db, job_id, device_id, message, &recipients).await?;

        for (i, (recipient_id, phone)) in recipients.iter().enumerate() {
            let task = SendTask {
                job_id: job_id.to_string(),
                device_id: device_id.0.clone(),
                recipient_id: recipient_id.clone(),
                phone: phone.clone(),
                message: message.to_string(),
            };
            let payload = serde_json::to_string(&task)
                .map_err(|e| WawaError::Internal(format!("serialize send task: {e}")))?;
            queue::enqueue(
                &self.db,
                &payload,
                i as u64 * self.config.stagger_ms,
                self.config.max_attempts as i32,
            )
            .await?;
        }

        blasts::mark_processing(&self.db, job_id).await?;

        info!(
            job_id,
            device_id = %device_id,
            recipients = recipients.len(),
            stagger_ms = self.config.stagger_ms,
            "blast job enqueued"
        );
        Ok(recipients.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wawa_core::types::JobStatus;
    use wawa_test_utils::harness::{memory_db, seed_user_device};

    fn test_config(stagger_ms: u64) -> BlastConfig {
        BlastConfig {
            stagger_ms,
            ..BlastConfig::default()
        }
    }

    async fn queue_run_ats(db: &Database) -> Vec<String> {
        db.connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt =
                    conn.prepare("SELECT run_at FROM send_queue ORDER BY id ASC")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap()
    }

    fn parse_ms(ts: &str) -> i64 {
        chrono::DateTime::parse_from_rfc3339(ts)
            .unwrap()
            .timestamp_millis()
    }

    #[tokio::test]
    async fn enqueue_creates_job_and_tasks() {
        let db = memory_db().await;
        let device_id = seed_user_device(&db, "user-1", "dev-1").await;
        let dispatcher = BlastDispatcher::new(db.clone(), test_config(0));

        let phones = vec!["628111".to_string(), "628222".to_string()];
        let count = dispatcher
            .enqueue_blast_job("job-1", &device_id, "promo text", &phones)
            .await
            .unwrap();
        assert_eq!(count, 2);

        let job = blasts::find_job(&db, "job-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.recipient_count, 2);
        assert!(job.started_at.is_some());

        let entry = queue::claim_ready(&db).await.unwrap().unwrap();
        let task: SendTask = serde_json::from_str(&entry.payload).unwrap();
        assert_eq!(task.job_id, "job-1");
        assert_eq!(task.device_id, "dev-1");
        assert_eq!(task.phone, "628111");
        assert_eq!(task.message, "promo text");
    }

    #[tokio::test]
    async fn stagger_spaces_run_at_by_configured_delay() {
        let db = memory_db().await;
        let device_id = seed_user_device(&db, "user-1", "dev-1").await;
        let dispatcher = BlastDispatcher::new(db.clone(), test_config(2000));

        let phones = vec![
            "628111".to_string(),
            "628222".to_string(),
            "628333".to_string(),
        ];
        dispatcher
            .enqueue_blast_job("job-1", &device_id, "m", &phones)
            .await
            .unwrap();

        let run_ats = queue_run_ats(&db).await;
        assert_eq!(run_ats.len(), 3);
        let base = parse_ms(&run_ats[0]);
        let d1 = parse_ms(&run_ats[1]) - base;
        let d2 = parse_ms(&run_ats[2]) - base;
        // Timestamps are taken per enqueue call, so allow a little skew.
        assert!((1900..=2300).contains(&d1), "first offset was {d1}ms");
        assert!((3900..=4300).contains(&d2), "second offset was {d2}ms");
    }
}
