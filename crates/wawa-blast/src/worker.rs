// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The blast worker: claims due send tasks and drives them to a terminal
//! outcome.
//!
//! One worker processes one task at a time; throughput scales by running
//! more workers against the same queue and limiter. Delivery outcomes are
//! recorded through the single-transaction accounting in
//! `wawa_storage::queries::blasts`, so a crash between send and ack can at
//! worst redeliver — never double-credit.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use wawa_config::model::BlastConfig;
use wawa_core::WawaError;
use wawa_core::types::{DeviceId, JobStatus, QueueEntry};
use wawa_session::ConnectionRegistry;
use wawa_storage::Database;
use wawa_storage::queries::queue::FailOutcome;
use wawa_storage::queries::{blasts, queue};

use crate::dispatcher::SendTask;
use crate::rate_limit::RateLimiter;

/// Poll-loop worker over the `send_queue` table.
pub struct BlastWorker {
    db: Database,
    registry: ConnectionRegistry,
    limiter: Arc<RateLimiter>,
    config: BlastConfig,
}

impl BlastWorker {
    pub fn new(
        db: Database,
        registry: ConnectionRegistry,
        limiter: Arc<RateLimiter>,
        config: BlastConfig,
    ) -> Self {
        Self {
            db,
            registry,
            limiter,
            config,
        }
    }

    /// Run until `shutdown` is cancelled. Claims every due task on each
    /// poll tick, processing them strictly one at a time.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            "blast worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("blast worker stopped");
                    return;
                }
                _ = interval.tick() => {}
            }

            loop {
                if shutdown.is_cancelled() {
                    info!("blast worker stopped");
                    return;
                }
                match queue::claim_ready(&self.db).await {
                    Ok(Some(entry)) => {
                        if let Err(e) = self.process(entry).await {
                            // Storage failures leave the entry processing;
                            // it will be retried after an operator restart.
                            error!(error = %e, "task processing hit a storage error");
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "claiming from send queue failed");
                        break;
                    }
                }
            }
        }
    }

    async fn process(&self, entry: QueueEntry) -> Result<(), WawaError> {
        let task: SendTask = match serde_json::from_str(&entry.payload) {
            Ok(task) => task,
            Err(e) => {
                warn!(entry_id = entry.id, error = %e, "malformed send task, dropping");
                queue::ack(&self.db, entry.id).await?;
                return Ok(());
            }
        };
        let device_id = DeviceId(task.device_id.clone());

        self.limiter.acquire().await;

        let report = self
            .registry
            .send_message(&device_id, &task.phone, &task.message)
            .await;

        if report.success {
            blasts::record_send_success(
                &self.db,
                &task.job_id,
                &task.recipient_id,
                &device_id,
                self.config.commission_amount,
            )
            .await?;
            queue::ack(&self.db, entry.id).await?;
            info!(
                job_id = %task.job_id,
                device_id = %device_id,
                recipient = %task.phone,
                "recipient sent"
            );
            self.log_if_finalized(&task.job_id).await?;
        } else {
            let error_msg = report
                .error
                .unwrap_or_else(|| "unknown send failure".to_string());
            match queue::fail(&self.db, entry.id, self.config.retry_base_delay_ms).await? {
                FailOutcome::Retry { attempts, .. } => {
                    blasts::record_attempt_error(&self.db, &task.recipient_id, &error_msg).await?;
                    warn!(
                        job_id = %task.job_id,
                        recipient = %task.phone,
                        attempts,
                        error = %error_msg,
                        "send failed, retry scheduled"
                    );
                }
                FailOutcome::Exhausted { attempts } => {
                    blasts::record_send_failure(
                        &self.db,
                        &task.job_id,
                        &task.recipient_id,
                        &device_id,
                        &error_msg,
                    )
                    .await?;
                    warn!(
                        job_id = %task.job_id,
                        recipient = %task.phone,
                        attempts,
                        error = %error_msg,
                        "send failed permanently"
                    );
                    self.log_if_finalized(&task.job_id).await?;
                }
            }
        }
        Ok(())
    }

    /// Job lifecycle logging once the last recipient settles.
    async fn log_if_finalized(&self, job_id: &str) -> Result<(), WawaError> {
        if let Some(job) = blasts::find_job(&self.db, job_id).await? {
            match job.status {
                JobStatus::Completed => info!(
                    job_id,
                    sent = job.sent_count,
                    failed = job.failed_count,
                    "blast job completed"
                ),
                JobStatus::Failed => error!(
                    job_id,
                    failed = job.failed_count,
                    "blast job failed, nothing was delivered"
                ),
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::BlastDispatcher;
    use wawa_core::types::{DeviceStatus, RecipientStatus};
    use wawa_session::{ConnectOptions, ConnectionRegistry};
    use wawa_storage::queries::users;
    use wawa_test_utils::MockTransport;
    use wawa_test_utils::harness::{memory_db, seed_user_device};

    // Delays collapsed so tests run on the wall clock.
    fn fast_config() -> BlastConfig {
        BlastConfig {
            stagger_ms: 0,
            retry_base_delay_ms: 0,
            poll_interval_ms: 10,
            ..BlastConfig::default()
        }
    }

    struct Pipeline {
        db: Database,
        registry: ConnectionRegistry,
        dispatcher: BlastDispatcher,
        transport: Arc<MockTransport>,
        device_id: DeviceId,
        shutdown: CancellationToken,
    }

    async fn start_pipeline(connect_device: bool) -> Pipeline {
        let db = memory_db().await;
        let device_id = seed_user_device(&db, "user-1", "dev-1").await;
        let transport = Arc::new(MockTransport::auto_open("628555"));
        let registry = ConnectionRegistry::new(
            db.clone(),
            transport.clone(),
            wawa_config::model::SessionConfig::default(),
        );

        if connect_device {
            registry
                .connect(&device_id, ConnectOptions::default())
                .await
                .unwrap();
            for _ in 0..100 {
                let connected = registry
                    .get_device(&device_id)
                    .await
                    .unwrap()
                    .map(|s| s.status == DeviceStatus::Connected)
                    .unwrap_or(false);
                if connected {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }

        let config = fast_config();
        let dispatcher = BlastDispatcher::new(db.clone(), config.clone());
        let limiter = Arc::new(RateLimiter::from_config(&config));
        let worker = BlastWorker::new(db.clone(), registry.clone(), limiter, config);
        let shutdown = CancellationToken::new();
        tokio::spawn(worker.run(shutdown.clone()));

        Pipeline {
            db,
            registry,
            dispatcher,
            transport,
            device_id,
            shutdown,
        }
    }

    async fn wait_for_terminal_job(db: &Database, job_id: &str) -> wawa_core::types::BlastJob {
        for _ in 0..400 {
            let job = blasts::find_job(db, job_id).await.unwrap().unwrap();
            if matches!(job.status, JobStatus::Completed | JobStatus::Failed) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached a terminal status");
    }

    #[tokio::test]
    async fn blast_of_two_recipients_completes() {
        let p = start_pipeline(true).await;

        p.dispatcher
            .enqueue_blast_job(
                "job-1",
                &p.device_id,
                "hello",
                &["628111".to_string(), "628222".to_string()],
            )
            .await
            .unwrap();

        let job = wait_for_terminal_job(&p.db, "job-1").await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.sent_count, 2);
        assert_eq!(job.failed_count, 0);

        assert_eq!(p.transport.sent_count().await, 2);
        assert_eq!(users::wallet_balance(&p.db, "user-1").await.unwrap(), 50);
        assert_eq!(queue::outstanding(&p.db).await.unwrap(), 0);

        let device = p.registry.get_device(&p.device_id).await.unwrap().unwrap();
        assert_eq!(device.status, DeviceStatus::Connected);
        p.shutdown.cancel();
    }

    #[tokio::test]
    async fn persistent_failure_exhausts_retries_then_fails_job() {
        let p = start_pipeline(true).await;
        p.transport.fail_sends(u32::MAX).await;

        p.dispatcher
            .enqueue_blast_job("job-1", &p.device_id, "hello", &["628111".to_string()])
            .await
            .unwrap();

        let job = wait_for_terminal_job(&p.db, "job-1").await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.sent_count, 0);
        assert_eq!(job.failed_count, 1);

        let recipients = blasts::recipients_for_job(&p.db, "job-1").await.unwrap();
        assert_eq!(recipients[0].status, RecipientStatus::Failed);
        assert!(recipients[0].error_msg.is_some());

        // Terminal policy: the counter moves once, not once per attempt.
        let device = wawa_storage::queries::devices::find_device(&p.db, &p.device_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(device.total_failed, 1);
        assert_eq!(users::wallet_balance(&p.db, "user-1").await.unwrap(), 0);
        p.shutdown.cancel();
    }

    #[tokio::test]
    async fn success_on_second_attempt_credits_once() {
        let p = start_pipeline(true).await;
        p.transport.fail_sends(1).await;

        p.dispatcher
            .enqueue_blast_job("job-1", &p.device_id, "hello", &["628111".to_string()])
            .await
            .unwrap();

        let job = wait_for_terminal_job(&p.db, "job-1").await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.sent_count, 1);
        assert_eq!(job.failed_count, 0);

        assert_eq!(users::wallet_balance(&p.db, "user-1").await.unwrap(), 25);
        let device = wawa_storage::queries::devices::find_device(&p.db, &p.device_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(device.total_success, 1);
        assert_eq!(device.total_failed, 0);
        assert_eq!(p.transport.sent_count().await, 1);
        p.shutdown.cancel();
    }

    #[tokio::test]
    async fn disconnected_device_fails_without_transport_calls() {
        let p = start_pipeline(false).await;

        p.dispatcher
            .enqueue_blast_job("job-1", &p.device_id, "hello", &["628111".to_string()])
            .await
            .unwrap();

        let job = wait_for_terminal_job(&p.db, "job-1").await;
        assert_eq!(job.status, JobStatus::Failed);

        let recipients = blasts::recipients_for_job(&p.db, "job-1").await.unwrap();
        assert!(recipients[0]
            .error_msg
            .as_deref()
            .unwrap()
            .contains("device not connected"));
        assert_eq!(p.transport.sent_count().await, 0);
        p.shutdown.cancel();
    }
}
