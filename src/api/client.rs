//! Purpose: Native-value client over a single signed-request capability.
//! Exports: `Client`, `Execute`, `Operation`, `WriteRequest`, `Pending`,
//! `KeysAndAttributes`, `BatchGetPage`.
//! Role: One method per protocol operation; converts parameters in, results out.
//! Invariants: Only the operation's value-bearing fields are wire-encoded.
//! Invariants: Transport and protocol errors are returned unchanged.
#![allow(clippy::result_large_err)]

use super::batch_get::{BatchGetPager, BatchGetResult};
use super::batch_write::{BatchWritePager, BatchWriteSummary};
use super::scan::{ScanAggregator, ScanResult};
use crate::core::attr::wire_item_json;
use crate::core::convert::{ConversionOptions, decode_object, decode_response, encode_object, encode_request};
use crate::core::error::{Error, ErrorKind};
use crate::core::set::TypedSet;
use crate::core::value::{Item, NativeValue};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type ApiResult<T> = Result<T, Error>;

const QUERY_FIELDS: &[&str] = &["ExclusiveStartKey", "ExpressionAttributeValues"];
const SCAN_FIELDS: &[&str] = &["ExclusiveStartKey", "ExpressionAttributeValues"];
const GET_FIELDS: &[&str] = &["Key"];
const PUT_FIELDS: &[&str] = &["Item", "ExpressionAttributeValues"];
const UPDATE_FIELDS: &[&str] = &["Key", "ExpressionAttributeValues"];
const DELETE_FIELDS: &[&str] = &["Key", "ExpressionAttributeValues"];

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    Query,
    Scan,
    GetItem,
    PutItem,
    UpdateItem,
    DeleteItem,
    BatchGetItem,
    BatchWriteItem,
    CreateTable,
    DeleteTable,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Query => "Query",
            Operation::Scan => "Scan",
            Operation::GetItem => "GetItem",
            Operation::PutItem => "PutItem",
            Operation::UpdateItem => "UpdateItem",
            Operation::DeleteItem => "DeleteItem",
            Operation::BatchGetItem => "BatchGetItem",
            Operation::BatchWriteItem => "BatchWriteItem",
            Operation::CreateTable => "CreateTable",
            Operation::DeleteTable => "DeleteTable",
        }
    }

    /// Value of the `X-Amz-Target` header for this operation.
    pub fn target(self) -> String {
        format!("DynamoDB_20120810.{}", self.as_str())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Perform one signed request and return the raw wire-shaped response.
pub trait Execute {
    fn execute(&self, operation: Operation, params: &Value) -> ApiResult<Value>;
}

impl<E: Execute + ?Sized> Execute for &E {
    fn execute(&self, operation: Operation, params: &Value) -> ApiResult<Value> {
        (**self).execute(operation, params)
    }
}

impl<E: Execute + ?Sized> Execute for Arc<E> {
    fn execute(&self, operation: Operation, params: &Value) -> ApiResult<Value> {
        (**self).execute(operation, params)
    }
}

impl<E: Execute + ?Sized> Execute for Box<E> {
    fn execute(&self, operation: Operation, params: &Value) -> ApiResult<Value> {
        (**self).execute(operation, params)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WriteRequest {
    Put(Item),
    Delete(Item),
}

impl WriteRequest {
    fn to_wire(&self, options: ConversionOptions) -> ApiResult<Value> {
        let wire = match self {
            WriteRequest::Put(item) => {
                json!({ "PutRequest": { "Item": wire_item_json(&encode_object(item, options)?) } })
            }
            WriteRequest::Delete(key) => {
                json!({ "DeleteRequest": { "Key": wire_item_json(&encode_object(key, options)?) } })
            }
        };
        Ok(wire)
    }
}

/// Queued batch work: still native, or already wire-encoded (as the store
/// hands back unprocessed entries).
#[derive(Clone, Debug, PartialEq)]
pub enum Pending<T> {
    Native(T),
    Wire(Value),
}

/// Keys for one table plus the read parameters that accompany them
/// (`ProjectionExpression`, `ConsistentRead`, ...), sent verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct KeysAndAttributes<K = Item> {
    pub keys: Vec<K>,
    pub read_params: Map<String, Value>,
}

impl<K> KeysAndAttributes<K> {
    pub fn new(keys: Vec<K>) -> Self {
        Self {
            keys,
            read_params: Map::new(),
        }
    }

    pub fn with_read_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.read_params.insert(name.into(), value);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchGetPage {
    pub responses: BTreeMap<String, Vec<Item>>,
    pub unprocessed: BTreeMap<String, Vec<Value>>,
}

#[derive(Clone, Debug)]
pub struct Client<E> {
    transport: E,
    options: ConversionOptions,
}

impl<E: Execute> Client<E> {
    pub fn new(transport: E) -> Self {
        Self {
            transport,
            options: ConversionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ConversionOptions {
        self.options
    }

    pub fn transport(&self) -> &E {
        &self.transport
    }

    pub fn create_set(&self, values: Vec<NativeValue>) -> ApiResult<TypedSet> {
        TypedSet::new(values)
    }

    pub fn query(&self, params: &Item) -> ApiResult<Item> {
        self.request(Operation::Query, params)
    }

    pub fn scan(&self, params: &Item) -> ApiResult<Item> {
        self.request(Operation::Scan, params)
    }

    pub fn get(&self, params: &Item) -> ApiResult<Item> {
        self.request(Operation::GetItem, params)
    }

    pub fn put(&self, params: &Item) -> ApiResult<Item> {
        self.request(Operation::PutItem, params)
    }

    pub fn update(&self, params: &Item) -> ApiResult<Item> {
        self.request(Operation::UpdateItem, params)
    }

    pub fn delete(&self, params: &Item) -> ApiResult<Item> {
        self.request(Operation::DeleteItem, params)
    }

    pub fn create_table(&self, params: &Value) -> ApiResult<Value> {
        self.execute(Operation::CreateTable, params)
    }

    pub fn delete_table(&self, params: &Value) -> ApiResult<Value> {
        self.execute(Operation::DeleteTable, params)
    }

    /// One `BatchGetItem` call. Returned items are decoded; unprocessed keys
    /// are handed back in wire form.
    pub fn batch_get(
        &self,
        request_items: &BTreeMap<String, KeysAndAttributes<Pending<Item>>>,
    ) -> ApiResult<BatchGetPage> {
        let mut tables = Map::new();
        for (table, request) in request_items {
            let keys = request
                .keys
                .iter()
                .map(|key| match key {
                    Pending::Native(key) => {
                        Ok(Value::Object(wire_item_json(&encode_object(key, self.options)?)))
                    }
                    Pending::Wire(wire) => Ok(wire.clone()),
                })
                .collect::<ApiResult<Vec<_>>>()?;
            let mut entry = request.read_params.clone();
            entry.insert("Keys".to_string(), Value::Array(keys));
            tables.insert(table.clone(), Value::Object(entry));
        }
        let response = self.execute(
            Operation::BatchGetItem,
            &json!({ "RequestItems": tables }),
        )?;

        let mut page = BatchGetPage::default();
        for (table, items) in response_tables(&response, "Responses")? {
            let items = items.as_array().ok_or_else(|| invalid_response("Responses", &table))?;
            let decoded = items
                .iter()
                .map(|item| {
                    item.as_object()
                        .ok_or_else(|| invalid_response("Responses", &table))
                        .and_then(decode_object)
                })
                .collect::<ApiResult<Vec<_>>>()?;
            page.responses.insert(table, decoded);
        }
        for (table, pending) in response_tables(&response, "UnprocessedKeys")? {
            let keys = pending
                .get("Keys")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid_response("UnprocessedKeys", &table))?;
            if !keys.is_empty() {
                page.unprocessed.insert(table, keys.clone());
            }
        }
        Ok(page)
    }

    /// One `BatchWriteItem` call. Returns the unprocessed entries per table in wire form.
    pub fn batch_write(
        &self,
        request_items: &BTreeMap<String, Vec<Pending<WriteRequest>>>,
    ) -> ApiResult<BTreeMap<String, Vec<Value>>> {
        let mut tables = Map::new();
        for (table, requests) in request_items {
            let encoded = requests
                .iter()
                .map(|request| match request {
                    Pending::Native(request) => request.to_wire(self.options),
                    Pending::Wire(wire) => Ok(wire.clone()),
                })
                .collect::<ApiResult<Vec<_>>>()?;
            tables.insert(table.clone(), Value::Array(encoded));
        }
        let response = self.execute(
            Operation::BatchWriteItem,
            &json!({ "RequestItems": tables }),
        )?;

        let mut unprocessed = BTreeMap::new();
        for (table, entries) in response_tables(&response, "UnprocessedItems")? {
            let entries = entries
                .as_array()
                .ok_or_else(|| invalid_response("UnprocessedItems", &table))?;
            if !entries.is_empty() {
                unprocessed.insert(table, entries.clone());
            }
        }
        Ok(unprocessed)
    }

    pub fn scan_all(
        &self,
        params: &Item,
        scan_limit: Option<u64>,
        item_limit: Option<u64>,
    ) -> ApiResult<ScanResult> {
        let mut aggregator = ScanAggregator::new(self);
        if let Some(limit) = scan_limit {
            aggregator = aggregator.with_scan_limit(limit);
        }
        if let Some(limit) = item_limit {
            aggregator = aggregator.with_item_limit(limit);
        }
        aggregator.run(params)
    }

    pub fn query_all(&self, params: &Item, item_limit: Option<u64>) -> ApiResult<ScanResult> {
        let mut aggregator = ScanAggregator::for_query(self);
        if let Some(limit) = item_limit {
            aggregator = aggregator.with_item_limit(limit);
        }
        aggregator.run(params)
    }

    pub fn batch_get_all(
        &self,
        request_items: BTreeMap<String, KeysAndAttributes>,
    ) -> ApiResult<BatchGetResult> {
        BatchGetPager::new(self).run(request_items)
    }

    pub fn batch_write_all(
        &self,
        request_items: BTreeMap<String, Vec<WriteRequest>>,
    ) -> ApiResult<BatchWriteSummary> {
        BatchWritePager::new(self).run(request_items)
    }

    /// Encode the operation's value-bearing fields, execute, decode the result.
    fn request(&self, operation: Operation, params: &Item) -> ApiResult<Item> {
        let response = self.request_wire(operation, params, Map::new())?;
        response_item(operation, &response)
    }

    /// Like `request`, but `wire_fields` are sent as given and the response
    /// comes back undecoded.
    pub(crate) fn request_wire(
        &self,
        operation: Operation,
        params: &Item,
        wire_fields: Map<String, Value>,
    ) -> ApiResult<Value> {
        let fields = match operation {
            Operation::Query => QUERY_FIELDS,
            Operation::Scan => SCAN_FIELDS,
            Operation::GetItem => GET_FIELDS,
            Operation::PutItem => PUT_FIELDS,
            Operation::UpdateItem => UPDATE_FIELDS,
            Operation::DeleteItem => DELETE_FIELDS,
            other => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("{other} does not take native parameters")));
            }
        };
        let mut encoded = encode_request(params, fields, self.options)?;
        encoded.extend(wire_fields);
        tracing::debug!(%operation, params = ?encoded, "converted parameters");
        self.execute(operation, &Value::Object(encoded))
    }

    fn execute(&self, operation: Operation, params: &Value) -> ApiResult<Value> {
        tracing::info!(%operation, "starting request");
        let response = self.transport.execute(operation, params)?;
        tracing::info!(%operation, "response received");
        Ok(response)
    }
}

pub(crate) fn response_item(operation: Operation, response: &Value) -> ApiResult<Item> {
    match decode_response(response)? {
        NativeValue::Map(map) => Ok(map),
        NativeValue::Null => Ok(Item::new()),
        other => Err(Error::new(ErrorKind::Internal)
            .with_message(format!("{operation} response is not an object"))
            .with_raw(other.kind_name())),
    }
}

fn response_tables(response: &Value, field: &str) -> ApiResult<Vec<(String, Value)>> {
    match response.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(tables)) => Ok(tables
            .iter()
            .map(|(table, value)| (table.clone(), value.clone()))
            .collect()),
        Some(_) => Err(Error::new(ErrorKind::Internal)
            .with_message(format!("response field {field} is not an object"))),
    }
}

fn invalid_response(field: &str, table: &str) -> Error {
    Error::new(ErrorKind::Internal)
        .with_message(format!("malformed {field} entry in batch response"))
        .with_field(table)
}
