//! Purpose: Fold a cursor-paged Scan (or Query) into one logical result.
//! Exports: `ScanAggregator`, `ScanResult`.
//! Role: Issues one page at a time, resuming from the previous page's cursor.
//! Invariants: The first page seeds every non-counter field of the result.
//! Invariants: Limits are soft; they only decide whether another page is fetched.
//! Invariants: The returned result never carries a cursor.
//! Invariants: The cursor stays in wire form and is re-sent exactly as received.
#![allow(clippy::result_large_err)]

use super::client::{ApiResult, Client, Execute, Operation, response_item};
use crate::core::attr::{WireItem, wire_item_from_json, wire_item_json};
use crate::core::error::{Error, ErrorKind};
use crate::core::value::{Item, NativeValue};
use serde_json::{Map, Value};

const ITEMS: &str = "Items";
const COUNT: &str = "Count";
const SCANNED_COUNT: &str = "ScannedCount";
const CURSOR: &str = "LastEvaluatedKey";
const START_KEY: &str = "ExclusiveStartKey";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanResult {
    pub items: Vec<NativeValue>,
    pub count: u64,
    pub scanned_count: u64,
    /// Remaining top-level fields of the first page (`ConsumedCapacity`, ...).
    pub extra: Item,
    pub pages: usize,
}

impl ScanResult {
    pub fn to_native(&self) -> NativeValue {
        let mut out = self.extra.clone();
        out.insert(ITEMS.to_string(), NativeValue::List(self.items.clone()));
        out.insert(COUNT.to_string(), NativeValue::from(self.count));
        out.insert(SCANNED_COUNT.to_string(), NativeValue::from(self.scanned_count));
        NativeValue::Map(out)
    }
}

struct ScanAccumulator {
    result: ScanResult,
    cursor: Option<WireItem>,
}

impl ScanAccumulator {
    fn seed(page: Page) -> Self {
        let Page {
            mut fields,
            cursor,
        } = page;
        let (items, count, scanned_count) = take_counters(&mut fields);
        Self {
            result: ScanResult {
                items,
                count,
                scanned_count,
                extra: fields,
                pages: 1,
            },
            cursor,
        }
    }

    fn merge(&mut self, page: Page) {
        let Page {
            mut fields,
            cursor,
        } = page;
        let (items, count, scanned_count) = take_counters(&mut fields);
        self.result.items.extend(items);
        self.result.count += count;
        self.result.scanned_count += scanned_count;
        self.result.pages += 1;
        self.cursor = cursor;
    }

    fn should_continue(&self, scan_limit: Option<u64>, item_limit: Option<u64>) -> bool {
        self.cursor.is_some()
            && scan_limit.is_none_or(|limit| self.result.scanned_count < limit)
            && item_limit.is_none_or(|limit| self.result.count < limit)
    }
}

/// One response page: the cursor split off in wire form, the rest decoded.
struct Page {
    fields: Item,
    cursor: Option<WireItem>,
}

impl Page {
    fn from_response(operation: Operation, mut response: Value) -> ApiResult<Self> {
        let cursor = match response.as_object_mut().and_then(|map| map.remove(CURSOR)) {
            None | Some(Value::Null) => None,
            Some(Value::Object(key)) => {
                Some(wire_item_from_json(&key)?).filter(|key| !key.is_empty())
            }
            Some(other) => {
                return Err(Error::new(ErrorKind::UnknownWireType)
                    .with_message(format!("{operation} cursor is not an attribute map"))
                    .with_field(CURSOR)
                    .with_raw(other.to_string()));
            }
        };
        let fields = response_item(operation, &response)?;
        Ok(Self { fields, cursor })
    }
}

fn take_counters(page: &mut Item) -> (Vec<NativeValue>, u64, u64) {
    let items = match page.remove(ITEMS) {
        Some(NativeValue::List(items)) => items,
        _ => Vec::new(),
    };
    let count = page
        .remove(COUNT)
        .and_then(|value| value.as_f64())
        .map(|count| count as u64)
        .unwrap_or(items.len() as u64);
    let scanned_count = page
        .remove(SCANNED_COUNT)
        .and_then(|value| value.as_f64())
        .map(|count| count as u64)
        .unwrap_or(count);
    (items, count, scanned_count)
}

pub struct ScanAggregator<'a, E> {
    client: &'a Client<E>,
    operation: Operation,
    scan_limit: Option<u64>,
    item_limit: Option<u64>,
}

impl<'a, E: Execute> ScanAggregator<'a, E> {
    pub fn new(client: &'a Client<E>) -> Self {
        Self {
            client,
            operation: Operation::Scan,
            scan_limit: None,
            item_limit: None,
        }
    }

    pub fn for_query(client: &'a Client<E>) -> Self {
        Self {
            operation: Operation::Query,
            ..Self::new(client)
        }
    }

    /// Stop fetching once this many items have been examined.
    pub fn with_scan_limit(mut self, limit: u64) -> Self {
        self.scan_limit = Some(limit);
        self
    }

    /// Stop fetching once this many items have matched.
    pub fn with_item_limit(mut self, limit: u64) -> Self {
        self.item_limit = Some(limit);
        self
    }

    pub fn run(&self, params: &Item) -> ApiResult<ScanResult> {
        let mut acc = ScanAccumulator::seed(self.fetch(params, Map::new())?);
        while acc.should_continue(self.scan_limit, self.item_limit) {
            let Some(cursor) = acc.cursor.take() else {
                break;
            };
            tracing::debug!(
                operation = %self.operation,
                page = acc.result.pages + 1,
                count = acc.result.count,
                "fetching next page"
            );
            let mut start = Map::new();
            start.insert(START_KEY.to_string(), Value::Object(wire_item_json(&cursor)));
            acc.merge(self.fetch(params, start)?);
        }
        Ok(acc.result)
    }

    fn fetch(&self, params: &Item, wire_fields: Map<String, Value>) -> ApiResult<Page> {
        let response = self.client.request_wire(self.operation, params, wire_fields)?;
        Page::from_response(self.operation, response)
    }
}

#[cfg(test)]
mod tests {
    use super::ScanAggregator;
    use crate::api::client::{Client, Operation};
    use crate::api::testing::ScriptedTransport;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::value::{NativeValue, item_from};
    use serde_json::{Value, json};

    fn page(name: &str, cursor: Option<&str>) -> Value {
        let mut page = json!({
            "Count": 1,
            "ScannedCount": 1,
            "Items": [{ "name": { "S": name } }],
        });
        if let Some(cursor) = cursor {
            page["LastEvaluatedKey"] = json!({ "name": { "S": cursor } });
        }
        page
    }

    fn three_pages() -> ScriptedTransport {
        ScriptedTransport::new()
            .respond(page("a", Some("a")))
            .respond(page("b", Some("b")))
            .respond(page("c", None))
    }

    fn params() -> crate::core::value::Item {
        item_from([("TableName", "t")])
    }

    #[test]
    fn three_pages_fold_into_one_result() {
        let client = Client::new(three_pages());
        let result = ScanAggregator::new(&client).run(&params()).expect("scan");
        assert_eq!(result.items.len(), 3);
        assert_eq!(result.count, 3);
        assert_eq!(result.scanned_count, 3);
        assert_eq!(result.pages, 3);
        let native = result.to_native();
        assert!(native.get("LastEvaluatedKey").is_none());
        assert_eq!(native.get("Count"), Some(&NativeValue::Number(3.0)));
    }

    #[test]
    fn cursor_is_sent_encoded() {
        let client = Client::new(three_pages());
        ScanAggregator::new(&client).run(&params()).expect("scan");
        let calls = client.transport().calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(op, _)| *op == Operation::Scan));
        assert!(calls[0].1.get("ExclusiveStartKey").is_none());
        assert_eq!(calls[1].1["ExclusiveStartKey"], json!({ "name": { "S": "a" } }));
        assert_eq!(calls[2].1["ExclusiveStartKey"], json!({ "name": { "S": "b" } }));
    }

    #[test]
    fn scan_limit_stops_with_cursor_remaining() {
        let client = Client::new(three_pages());
        let result = ScanAggregator::new(&client)
            .with_scan_limit(2)
            .run(&params())
            .expect("scan");
        assert_eq!(client.transport().calls().len(), 2);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.scanned_count, 2);
        assert!(result.to_native().get("LastEvaluatedKey").is_none());
    }

    #[test]
    fn item_limit_stops_after_enough_matches() {
        let client = Client::new(three_pages());
        let result = ScanAggregator::new(&client)
            .with_item_limit(1)
            .run(&params())
            .expect("scan");
        assert_eq!(client.transport().calls().len(), 1);
        assert_eq!(result.count, 1);
    }

    #[test]
    fn first_page_seeds_extra_fields() {
        let client = Client::new(
            ScriptedTransport::new()
                .respond(json!({ "Count": 0, "ScannedCount": 0, "Items": [],
                    "ConsumedCapacity": { "TableName": "t" },
                    "LastEvaluatedKey": { "id": { "N": "1" } } }))
                .respond(json!({ "Count": 0, "ScannedCount": 0, "Items": [],
                    "ConsumedCapacity": { "TableName": "other" } })),
        );
        let result = ScanAggregator::new(&client).run(&params()).expect("scan");
        assert_eq!(
            result.extra.get("ConsumedCapacity"),
            Some(&NativeValue::Map(item_from([("TableName", "t")])))
        );
    }

    #[test]
    fn query_mode_issues_query_calls() {
        let client = Client::new(three_pages());
        let result = client.query_all(&params(), None).expect("query");
        assert_eq!(result.items.len(), 3);
        assert!(client.transport().calls().iter().all(|(op, _)| *op == Operation::Query));
    }

    #[test]
    fn numeric_cursor_is_resent_digit_for_digit() {
        let key = json!({ "id": { "N": "12345678901234567891" } });
        let client = Client::new(
            ScriptedTransport::new()
                .respond(json!({ "Count": 1, "ScannedCount": 1,
                    "Items": [{ "id": { "N": "1" } }],
                    "LastEvaluatedKey": key.clone() }))
                .respond(json!({ "Count": 0, "ScannedCount": 0, "Items": [] })),
        );
        let mut params = params();
        params.insert(
            "ExclusiveStartKey".to_string(),
            NativeValue::Map(item_from([("id", 0)])),
        );
        let result = ScanAggregator::new(&client).run(&params).expect("scan");
        assert_eq!(result.pages, 2);
        let calls = client.transport().calls();
        assert_eq!(calls[0].1["ExclusiveStartKey"], json!({ "id": { "N": "0" } }));
        assert_eq!(calls[1].1["ExclusiveStartKey"], key);
    }

    #[test]
    fn malformed_cursor_is_rejected() {
        let client = Client::new(ScriptedTransport::new().respond(json!({
            "Count": 0, "ScannedCount": 0, "Items": [],
            "LastEvaluatedKey": { "id": { "N": 7 } },
        })));
        let err = ScanAggregator::new(&client).run(&params()).expect_err("cursor");
        assert_eq!(err.kind(), ErrorKind::UnknownWireType);
        assert_eq!(err.field(), Some("id"));
        assert_eq!(client.transport().calls().len(), 1);
    }

    #[test]
    fn page_errors_abort() {
        let client = Client::new(
            ScriptedTransport::new()
                .respond(page("a", Some("a")))
                .fail(Error::new(ErrorKind::Transport).with_message("reset")),
        );
        let err = ScanAggregator::new(&client).run(&params()).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
