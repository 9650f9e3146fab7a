//! Purpose: Page unbounded put/delete work into protocol-legal batch writes.
//! Exports: `BatchWritePager`, `BatchWriteSummary`.
//! Role: Drives `Client::batch_write` until every request has been accepted.
//! Invariants: At most `page_size` requests per call; one call in flight at a time.
//! Invariants: Unprocessed entries are requeued in wire form and retried.
//! Notes: Retries are unbounded unless `with_max_rounds` is set. A store that keeps
//! rejecting work keeps this loop running.
#![allow(clippy::result_large_err)]

use super::client::{ApiResult, Client, Execute, Pending, WriteRequest};
use crate::core::error::{Error, ErrorKind};
use crate::core::pool::RequestPool;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const MAX_WRITE_PAGE_SIZE: usize = 25;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct BatchWriteSummary {
    /// Batch calls issued.
    pub rounds: usize,
    /// Requests sent across all calls, retries included.
    pub sent: usize,
    /// Requests the store handed back as unprocessed.
    pub retried: usize,
}

pub struct BatchWritePager<'a, E> {
    client: &'a Client<E>,
    page_size: usize,
    max_rounds: Option<usize>,
    retry_delay: Duration,
}

impl<'a, E: Execute> BatchWritePager<'a, E> {
    pub fn new(client: &'a Client<E>) -> Self {
        Self {
            client,
            page_size: DEFAULT_PAGE_SIZE,
            max_rounds: None,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    /// Sleep before any call that follows a partially rejected one.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn run(
        &self,
        requests_by_table: BTreeMap<String, Vec<WriteRequest>>,
    ) -> ApiResult<BatchWriteSummary> {
        check_page_size(self.page_size, MAX_WRITE_PAGE_SIZE)?;
        let mut pool: RequestPool<Pending<WriteRequest>> = requests_by_table
            .into_iter()
            .map(|(table, requests)| (table, requests.into_iter().map(Pending::Native).collect()))
            .collect();

        let mut summary = BatchWriteSummary::default();
        let mut backing_off = false;
        loop {
            if pool.is_empty() {
                return Ok(summary);
            }
            if let Some(max_rounds) = self.max_rounds {
                if summary.rounds >= max_rounds {
                    return Err(rounds_exhausted(pool.len(), summary.rounds));
                }
            }
            if backing_off && !self.retry_delay.is_zero() {
                std::thread::sleep(self.retry_delay);
            }

            let page = pool.take_page(self.page_size);
            let sent: usize = page.values().map(Vec::len).sum();
            tracing::debug!(round = summary.rounds + 1, sent, tables = page.len(), "sending batch write page");
            let unprocessed = self.client.batch_write(&page)?;
            summary.rounds += 1;
            summary.sent += sent;

            backing_off = false;
            for (table, entries) in unprocessed {
                tracing::warn!(table = %table, count = entries.len(), "requeueing unprocessed writes");
                summary.retried += entries.len();
                pool.requeue(&table, entries.into_iter().map(Pending::Wire));
                backing_off = true;
            }
        }
    }
}

pub(crate) fn check_page_size(page_size: usize, max: usize) -> ApiResult<()> {
    if page_size == 0 || page_size > max {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("page size must be between 1 and {max}"))
            .with_raw(page_size.to_string()));
    }
    Ok(())
}

pub(crate) fn rounds_exhausted(remaining: usize, rounds: usize) -> Error {
    Error::new(ErrorKind::Unprocessed)
        .with_message(format!(
            "{remaining} requests still unprocessed after {rounds} batch calls"
        ))
        .with_hint("Raise the round limit or retry the remaining work later.")
}
