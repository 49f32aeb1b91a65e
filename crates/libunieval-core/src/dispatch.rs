//! Workload dispatcher - drives a load test against one backend adapter

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adapter::BackendAdapter;
use crate::error::EvalError;
use crate::metrics::{RunWindow, Summary};
use crate::types::{ConnectorRef, QueryPattern, QuerySpec, RequestOutcome};

/// Parameters of one load test run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTestConfig {
    pub total_requests: usize,
    /// Maximum number of requests in flight at once
    pub concurrency: usize,
    /// Connectors assigned round-robin by dispatch index
    pub connector_pool: Vec<ConnectorRef>,
    pub dataset: String,
    pub pattern: QueryPattern,
    pub row_limit: Option<u64>,
}

impl LoadTestConfig {
    pub fn new(
        total_requests: usize,
        concurrency: usize,
        connector_pool: Vec<ConnectorRef>,
        dataset: impl Into<String>,
        pattern: QueryPattern,
    ) -> Self {
        Self {
            total_requests,
            concurrency,
            connector_pool,
            dataset: dataset.into(),
            pattern,
            row_limit: None,
        }
    }

    pub fn with_row_limit(mut self, rows: Option<u64>) -> Self {
        self.row_limit = rows;
        self
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        if self.total_requests == 0 {
            return Err(EvalError::Config("total_requests must be at least 1".to_string()));
        }
        if self.concurrency == 0 {
            return Err(EvalError::Config("concurrency must be at least 1".to_string()));
        }
        if self.connector_pool.is_empty() {
            return Err(EvalError::Config("connector pool is empty".to_string()));
        }
        if self.dataset.trim().is_empty() {
            return Err(EvalError::Config("dataset name is empty".to_string()));
        }
        Ok(())
    }

    /// Build the request for dispatch index `index`
    pub fn spec_for(&self, index: usize) -> QuerySpec {
        let connector = self.connector_pool[index % self.connector_pool.len()].clone();
        QuerySpec::new(index, connector, self.dataset.clone(), self.pattern)
            .with_row_limit(self.row_limit)
    }
}

/// Completion progress, reported after every sealed outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub backend: String,
    pub pattern: QueryPattern,
    pub dataset: String,
    pub configured_requests: usize,
    /// Sealed outcomes in completion order
    pub outcomes: Vec<RequestOutcome>,
    pub window: RunWindow,
    /// True when the run was cancelled before every request completed
    pub cancelled: bool,
}

impl RunReport {
    pub fn summary(&self) -> Summary {
        Summary::from_outcomes(&self.outcomes, self.window, self.configured_requests)
    }

    pub fn duration(&self) -> Duration {
        self.window.duration()
    }
}

/// Per-run shared state
struct RunState {
    next_index: AtomicUsize,
}

/// Drives one load test run through a bounded pool of workers
pub struct Dispatcher {
    adapter: Arc<dyn BackendAdapter>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(adapter: Arc<dyn BackendAdapter>) -> Self {
        Self {
            adapter,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels the run: no new dispatches, in-flight requests sealed as cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the load test to completion or cancellation.
    ///
    /// The adapter is closed once the last worker finishes.
    pub async fn run<P>(self, config: &LoadTestConfig, mut progress: P) -> Result<RunReport, EvalError>
    where
        P: FnMut(Progress) + Send,
    {
        config.validate()?;
        if !self.adapter.supports(config.pattern) {
            return Err(EvalError::UnsupportedPattern {
                backend: self.adapter.name().to_string(),
                pattern: config.pattern.to_string(),
            });
        }

        let run_id = Uuid::new_v4();
        let total = config.total_requests;
        info!(
            %run_id,
            backend = self.adapter.name(),
            requests = total,
            concurrency = config.concurrency,
            pattern = %config.pattern,
            "starting load test"
        );

        let shared = Arc::new(config.clone());
        let state = Arc::new(RunState {
            next_index: AtomicUsize::new(0),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let started_at = Instant::now();
        let mut workers = JoinSet::new();
        for worker_id in 0..config.concurrency {
            let adapter = Arc::clone(&self.adapter);
            let config = Arc::clone(&shared);
            let state = Arc::clone(&state);
            let cancel = self.cancel.clone();
            let tx = tx.clone();
            workers.spawn(async move {
                run_worker(worker_id, adapter, config, state, cancel, tx).await;
            });
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
            progress(Progress {
                completed: outcomes.len(),
                total,
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(%run_id, "worker task failed: {}", e);
            }
        }

        self.adapter.close().await;

        let finished_at = outcomes
            .iter()
            .map(RequestOutcome::completed_at)
            .max()
            .unwrap_or(started_at);
        let cancelled = self.cancel.is_cancelled()
            && (outcomes.len() < total || outcomes.iter().any(RequestOutcome::is_cancelled));

        let report = RunReport {
            run_id,
            backend: self.adapter.name().to_string(),
            pattern: config.pattern,
            dataset: config.dataset.clone(),
            configured_requests: total,
            outcomes,
            window: RunWindow::new(started_at, finished_at),
            cancelled,
        };

        info!(
            %run_id,
            completed = report.outcomes.len(),
            cancelled = report.cancelled,
            elapsed_ms = report.duration().as_millis() as u64,
            "load test finished"
        );

        Ok(report)
    }
}

async fn run_worker(
    worker_id: usize,
    adapter: Arc<dyn BackendAdapter>,
    config: Arc<LoadTestConfig>,
    state: Arc<RunState>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<RequestOutcome>,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let index = state.next_index.fetch_add(1, Ordering::SeqCst);
        if index >= config.total_requests {
            break;
        }

        let outcome = adapter.execute(config.spec_for(index), &cancel).await;
        if let Some(kind) = outcome.error_kind() {
            warn!(
                worker_id,
                index,
                connector = %outcome.spec().connector,
                error_kind = %kind,
                "request failed: {}",
                outcome.error().unwrap_or_default()
            );
        }

        if tx.send(outcome).is_err() {
            break;
        }
    }

    debug!(worker_id, "worker finished");
}
