//! Purpose: In-memory `Execute` fake for unit tests.
//! Exports: `ScriptedTransport`.
//! Role: Records every call and replays scripted responses in order.
//! Invariants: An exhausted script answers `{}`.
use super::client::{ApiResult, Execute, Operation};
use crate::core::error::Error;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;

pub(crate) struct ScriptedTransport {
    calls: Mutex<Vec<(Operation, Value)>>,
    script: Mutex<VecDeque<ApiResult<Value>>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn respond(self, response: Value) -> Self {
        self.push(Ok(response));
        self
    }

    pub(crate) fn fail(self, err: Error) -> Self {
        self.push(Err(err));
        self
    }

    pub(crate) fn calls(&self) -> Vec<(Operation, Value)> {
        self.calls
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    fn push(&self, entry: ApiResult<Value>) {
        self.script
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push_back(entry);
    }
}

impl Execute for ScriptedTransport {
    fn execute(&self, operation: Operation, params: &Value) -> ApiResult<Value> {
        self.calls
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push((operation, params.clone()));
        self.script
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }
}
