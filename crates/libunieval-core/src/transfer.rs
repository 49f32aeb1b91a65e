//! Timed transfer driver
//!
//! Turns an adapter's [`Transfer`] into a sealed [`RequestOutcome`]. All
//! adapters execute through [`drive_with`], so first-byte, timeout and
//! cancellation semantics are identical across backends.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adapter::Transfer;
use crate::error::TransferError;
use crate::types::{OutcomeBuilder, QuerySpec, RequestOutcome};

/// Execute one request under `timeout`, aborting early if `cancel` fires.
///
/// `started_at` is taken before `open` is called. Bytes received before a
/// failure stay on the outcome.
pub async fn drive<F, Fut>(
    spec: QuerySpec,
    timeout: Duration,
    cancel: &CancellationToken,
    open: F,
) -> RequestOutcome
where
    F: FnOnce(QuerySpec) -> Fut,
    Fut: Future<Output = Result<Transfer, TransferError>>,
{
    drive_with(spec, timeout, cancel, open, |_: &Bytes| {}).await
}

/// [`drive`], passing every payload chunk to `sink` once it is recorded
pub async fn drive_with<F, Fut, S>(
    spec: QuerySpec,
    timeout: Duration,
    cancel: &CancellationToken,
    open: F,
    mut sink: S,
) -> RequestOutcome
where
    F: FnOnce(QuerySpec) -> Fut,
    Fut: Future<Output = Result<Transfer, TransferError>>,
    S: FnMut(&Bytes),
{
    let mut builder = OutcomeBuilder::start(spec.clone());

    let result = {
        let transfer = pump(open(spec), &mut builder, &mut sink);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            res = tokio::time::timeout(timeout, transfer) => {
                res.unwrap_or_else(|_| Err(TransferError::Timeout(timeout)))
            }
        }
    };

    let outcome = match result {
        Ok(()) => builder.succeed(),
        Err(e) => builder.fail(e.kind(), e.to_string()),
    };

    debug!(
        index = outcome.spec().index,
        connector = %outcome.spec().connector,
        success = outcome.is_success(),
        bytes = outcome.total_bytes(),
        elapsed_ms = outcome.total_time().as_millis() as u64,
        "request sealed"
    );

    outcome
}

async fn pump<Fut, S>(open: Fut, builder: &mut OutcomeBuilder, sink: &mut S) -> Result<(), TransferError>
where
    Fut: Future<Output = Result<Transfer, TransferError>>,
    S: FnMut(&Bytes),
{
    let Transfer { mut payload, metadata_at } = open.await?;
    if let Some(at) = metadata_at {
        builder.record_metadata_at(at);
    }
    while let Some(chunk) = payload.next().await {
        let chunk = chunk?;
        if builder.record_chunk(chunk.len() as u64).is_some() {
            sink(&chunk);
        }
    }
    Ok(())
}
