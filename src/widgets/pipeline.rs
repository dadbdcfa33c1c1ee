//! Bounded batch translation.
//!
//! Items are cut into batches of [`BATCH_SIZE`]; at most [`NUM_WORKERS`]
//! spawned workers translate batches concurrently and publish them on a
//! bounded channel. Batches arrive in completion order; items keep their
//! input order within a batch.

use crate::error::{EngineError, Result};

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

pub const BATCH_SIZE: usize = 500;
pub const NUM_WORKERS: usize = 8;

/// Spawn the batch workers and return the receiving end of their channel.
/// The channel closes once every batch has been published or the token is
/// canceled.
pub fn spawn_batches<T, U, F>(items: Vec<T>, translate: Arc<F>, cancel: CancellationToken) -> mpsc::Receiver<Vec<U>>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Option<U> + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(NUM_WORKERS);

    tokio::spawn(async move {
        let semaphore = Arc::new(Semaphore::new(NUM_WORKERS));
        let mut items = items.into_iter().peekable();
        let mut batch_no = 0usize;

        while items.peek().is_some() {
            let batch: Vec<T> = items.by_ref().take(BATCH_SIZE).collect();
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let tx = tx.clone();
            let translate = translate.clone();
            let cancel = cancel.clone();
            let n = batch_no;
            batch_no += 1;

            tokio::spawn(async move {
                let _permit = permit; // Hold permit until the batch is published

                if cancel.is_cancelled() {
                    return;
                }
                let out: Vec<U> = batch.into_iter().filter_map(|item| (*translate)(item)).collect();

                tokio::select! {
                    _ = cancel.cancelled() => {}
                    sent = tx.send(out) => {
                        if sent.is_err() {
                            tracing::debug!("Batch {} dropped, receiver closed", n);
                        }
                    }
                }
            });
        }

        tracing::debug!("Dispatched {} batches", batch_no);
    });

    rx
}

/// Translate every item and concatenate the batches in completion order.
pub async fn translate_all<T, U, F>(items: Vec<T>, translate: F, cancel: &CancellationToken) -> Result<Vec<U>>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Option<U> + Send + Sync + 'static,
{
    if cancel.is_cancelled() {
        return Err(EngineError::Canceled);
    }
    let expected = items.len();
    let mut rx = spawn_batches(items, Arc::new(translate), cancel.clone());
    let mut out = Vec::with_capacity(expected);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Canceled),
            batch = rx.recv() => match batch {
                Some(batch) => out.extend(batch),
                None => break,
            },
        }
    }

    // Workers stop publishing once canceled; a closed channel is not proof
    // that every batch arrived.
    if cancel.is_cancelled() {
        return Err(EngineError::Canceled);
    }
    Ok(out)
}
