//! Purpose: Page unbounded key lookups into protocol-legal batch gets.
//! Exports: `BatchGetPager`, `BatchGetResult`.
//! Role: Drives `Client::batch_get` until every key has been answered.
//! Invariants: At most `page_size` keys per call; read parameters ride along per table.
//! Invariants: Results are accumulated per table in the order they arrive.
#![allow(clippy::result_large_err)]

use super::batch_write::{DEFAULT_PAGE_SIZE, check_page_size, rounds_exhausted};
use super::client::{ApiResult, Client, Execute, KeysAndAttributes, Pending};
use crate::core::pool::RequestPool;
use crate::core::value::{Item, NativeValue};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

pub const MAX_GET_PAGE_SIZE: usize = 100;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchGetResult {
    pub responses: BTreeMap<String, Vec<Item>>,
    pub rounds: usize,
}

impl BatchGetResult {
    /// `{ Responses: { table: [item, ...] } }`
    pub fn to_native(&self) -> NativeValue {
        let tables: Item = self
            .responses
            .iter()
            .map(|(table, items)| {
                let items = items.iter().cloned().map(NativeValue::Map).collect();
                (table.clone(), NativeValue::List(items))
            })
            .collect();
        let mut out = Item::new();
        out.insert("Responses".to_string(), NativeValue::Map(tables));
        NativeValue::Map(out)
    }
}

pub struct BatchGetPager<'a, E> {
    client: &'a Client<E>,
    page_size: usize,
    max_rounds: Option<usize>,
    retry_delay: Duration,
}

impl<'a, E: Execute> BatchGetPager<'a, E> {
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

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn run(
        &self,
        request_items: BTreeMap<String, KeysAndAttributes>,
    ) -> ApiResult<BatchGetResult> {
        check_page_size(self.page_size, MAX_GET_PAGE_SIZE)?;

        let mut result = BatchGetResult::default();
        let mut read_params: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        let mut pool: RequestPool<Pending<Item>> = RequestPool::new();
        for (table, request) in request_items {
            result.responses.insert(table.clone(), Vec::new());
            pool.requeue(&table, request.keys.into_iter().map(Pending::Native));
            read_params.insert(table, request.read_params);
        }

        let mut backing_off = false;
        while !pool.is_empty() {
            if let Some(max_rounds) = self.max_rounds {
                if result.rounds >= max_rounds {
                    return Err(rounds_exhausted(pool.len(), result.rounds));
                }
            }
            if backing_off && !self.retry_delay.is_zero() {
                std::thread::sleep(self.retry_delay);
            }

            let page: BTreeMap<String, KeysAndAttributes<Pending<Item>>> = pool
                .take_page(self.page_size)
                .into_iter()
                .map(|(table, keys)| {
                    let params = read_params.get(&table).cloned().unwrap_or_default();
                    let request = KeysAndAttributes {
                        keys,
                        read_params: params,
                    };
                    (table, request)
                })
                .collect();
            let sent: usize = page.values().map(|request| request.keys.len()).sum();
            tracing::debug!(round = result.rounds + 1, sent, "sending batch get page");
            let answered = self.client.batch_get(&page)?;
            result.rounds += 1;

            for (table, items) in answered.responses {
                result.responses.entry(table).or_default().extend(items);
            }
            backing_off = !answered.unprocessed.is_empty();
            for (table, keys) in answered.unprocessed {
                tracing::warn!(table = %table, count = keys.len(), "requeueing unprocessed keys");
                pool.requeue(&table, keys.into_iter().map(Pending::Wire));
            }
        }
        Ok(result)
    }
}
