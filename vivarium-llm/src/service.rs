//! Oracle service — the worker pool behind [`BehaviorOracle`].
//!
//! A fixed number of worker tasks drain the priority queue; a semaphore
//! carries one permit per queued job, so idle workers park on `acquire`
//! instead of polling. Stopping the service closes the semaphore: workers
//! exit after finishing their current call, and results of in-flight
//! calls are discarded by the dropped reply receivers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::OracleClient;
use crate::error::OracleError;
use crate::queue::{JobQueue, QueueStats};
use crate::types::{OracleRequest, OracleResponse};
use vivarium_core::config::OracleConfig;
use vivarium_core::oracle::{BehaviorOracle, OracleRole, error_text};

/// Cheap-to-clone handle for submitting oracle work.
#[derive(Clone)]
pub struct OracleHandle {
    queue: Arc<JobQueue>,
    jobs: Arc<Semaphore>,
    enabled: bool,
    timeout_ms: u64,
    max_tokens: u32,
    temperature: f32,
}

impl OracleHandle {
    /// Submit a request and await its result.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Unavailable`] when the queue is full or the
    /// service has stopped, [`OracleError::Expired`] when the job waited
    /// past its deadline, or whatever the backend call produced.
    pub async fn request(
        &self,
        role: OracleRole,
        request: OracleRequest,
    ) -> Result<OracleResponse, OracleError> {
        if self.jobs.is_closed() {
            return Err(OracleError::Unavailable("oracle service stopped".into()));
        }
        let (tx, rx) = oneshot::channel();
        // Jobs may wait in line behind one full backend timeout.
        let deadline = Duration::from_millis(self.timeout_ms * 2);
        if self
            .queue
            .enqueue(role.into(), request, deadline, tx)
            .is_none()
        {
            return Err(OracleError::Unavailable("oracle queue is full".into()));
        }
        self.jobs.add_permits(1);

        rx.await
            .map_err(|_| OracleError::Unavailable("oracle service stopped".into()))?
    }

    /// Build a request with this handle's configured defaults.
    #[must_use]
    pub fn request_with_defaults(&self, system: &str, user: &str) -> OracleRequest {
        OracleRequest {
            system: system.to_string(),
            user: user.to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout_ms: self.timeout_ms,
        }
    }

    /// Queue statistics.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

#[async_trait]
impl BehaviorOracle for OracleHandle {
    async fn invoke(&self, role: OracleRole, system: &str, user: &str) -> String {
        let request = self.request_with_defaults(system, user);
        match self.request(role, request).await {
            Ok(response) if response.text.trim().is_empty() => {
                error_text("backend returned empty output")
            }
            Ok(response) => {
                debug!(
                    latency_ms = response.latency_ms,
                    model = %response.model,
                    "oracle response"
                );
                response.text
            }
            Err(e) => {
                warn!(error = %e, "oracle call failed");
                error_text(&e.to_string())
            }
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// The running oracle service: queue + worker pool.
pub struct OracleService {
    handle: OracleHandle,
    workers: Vec<JoinHandle<()>>,
}

impl OracleService {
    /// Spawn the worker pool.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(client: OracleClient, config: &OracleConfig) -> Self {
        let queue = Arc::new(JobQueue::new(config.queue_size));
        let jobs = Arc::new(Semaphore::new(0));
        let enabled = client.is_available();
        let client = Arc::new(client);

        let worker_count = config.workers.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let jobs = Arc::clone(&jobs);
            let client = Arc::clone(&client);
            workers.push(tokio::spawn(async move {
                loop {
                    let permit = match jobs.acquire().await {
                        Ok(permit) => permit,
                        // Semaphore closed: service is shutting down.
                        Err(_) => break,
                    };
                    permit.forget();

                    // A permit may outnumber live jobs when entries expired.
                    let Some(job) = queue.dequeue() else { continue };
                    debug!(worker_id, job = job.id, "oracle job started");
                    let result = client.generate(&job.request).await;
                    // The requester may have stopped waiting; that just
                    // discards the result.
                    let _ = job.reply.send(result);
                }
                debug!(worker_id, "oracle worker stopped");
            }));
        }

        info!(workers = worker_count, enabled, "oracle service started");

        Self {
            handle: OracleHandle {
                queue,
                jobs,
                enabled,
                timeout_ms: config.request_timeout_ms,
                max_tokens: config.max_tokens,
                temperature: config.temperature,
            },
            workers,
        }
    }

    /// The submission handle.
    #[must_use]
    pub fn handle(&self) -> OracleHandle {
        self.handle.clone()
    }

    /// Stop the workers. In-flight backend calls run to completion; their
    /// results are discarded.
    pub async fn shutdown(self) {
        self.handle.jobs.close();
        for worker in self.workers {
            let _ = worker.await;
        }
        info!("oracle service stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use vivarium_core::oracle::is_error_text;

    fn none_config() -> OracleConfig {
        OracleConfig {
            workers: 2,
            queue_size: 8,
            ..OracleConfig::default()
        }
    }

    #[tokio::test]
    async fn disabled_backend_yields_sentinel_text() {
        let service = OracleService::spawn(OracleClient::none(), &none_config());
        let handle = service.handle();

        assert!(!handle.is_enabled());
        let text = handle.invoke(OracleRole::Dialogue, "sys", "user").await;
        assert!(is_error_text(&text), "expected sentinel, got: {text}");

        service.shutdown().await;
    }

    #[tokio::test]
    async fn requests_after_shutdown_fail_cleanly() {
        let service = OracleService::spawn(OracleClient::none(), &none_config());
        let handle = service.handle();
        service.shutdown().await;

        let request = handle.request_with_defaults("sys", "user");
        let result = handle.request(OracleRole::Plan, request).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn many_concurrent_requests_all_resolve() {
        let service = OracleService::spawn(OracleClient::none(), &none_config());
        let handle = service.handle();

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle.invoke(OracleRole::Analysis, "sys", "user").await
            }));
        }
        for task in tasks {
            let text = task.await.expect("join");
            assert!(is_error_text(&text));
        }

        let stats = handle.stats();
        assert_eq!(stats.depth, 0);
        assert!(stats.total_enqueued >= 6);

        service.shutdown().await;
    }
}
