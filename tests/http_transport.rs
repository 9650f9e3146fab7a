//! Purpose: End-to-end tests for the signed HTTP transport and the paging helpers.
//! Exports: None (integration test module).
//! Role: Drive `Client<HttpTransport>` against a loopback stub endpoint.
//! Invariants: No test touches the process environment or a real AWS endpoint.

mod stub;

use dynamite::api::{
    Client, ClientConfig, Credentials, ErrorKind, Execute, HttpTransport, KeysAndAttributes,
    NativeValue, Operation, WriteRequest, item_from,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use stub::{JSON_1_0, StubResponse, StubStore};

fn client_for(store: &StubStore) -> Client<HttpTransport> {
    let config = ClientConfig::new("us-east-1", Credentials::new("AKIDTEST", "secret"))
        .with_endpoint(&store.base_url)
        .expect("endpoint");
    Client::new(HttpTransport::new(&config).expect("transport"))
}

#[test]
fn get_item_is_signed_and_converted() {
    let store = StubStore::start(vec![StubResponse::json(json!({
        "Item": { "name": { "S": "1" }, "age": { "N": "20" }, "tags": { "SS": ["a", "b"] } }
    }))]);
    let client = client_for(&store);

    let result = client
        .get(&item_from([
            ("TableName", NativeValue::from("test-table")),
            ("Key", NativeValue::Map(item_from([("name", "1")]))),
        ]))
        .expect("get");

    let item = result.get("Item").and_then(NativeValue::as_map).expect("item");
    assert_eq!(item.get("age"), Some(&NativeValue::Number(20.0)));
    assert!(matches!(item.get("tags"), Some(NativeValue::Set(set)) if set.values().len() == 2));

    let requests = store.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.target, "DynamoDB_20120810.GetItem");
    assert_eq!(request.content_type, JSON_1_0);
    assert!(request.authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDTEST/"));
    assert!(request.authorization.contains("/us-east-1/dynamodb/aws4_request"));
    assert_eq!(request.amz_date.len(), "20150830T123600Z".len());
    assert!(request.security_token.is_none());
    assert_eq!(
        request.body,
        json!({ "TableName": "test-table", "Key": { "name": { "S": "1" } } })
    );
}

#[test]
fn session_token_header_is_sent() {
    let store = StubStore::start(Vec::new());
    let credentials = Credentials::new("AKIDTEST", "secret").with_session_token("session-token");
    let config = ClientConfig::new("us-east-1", credentials)
        .with_endpoint(&store.base_url)
        .expect("endpoint");
    let transport = HttpTransport::new(&config).expect("transport");
    transport
        .execute(Operation::DeleteTable, &json!({ "TableName": "t" }))
        .expect("delete");

    let requests = store.requests();
    assert_eq!(requests[0].security_token.as_deref(), Some("session-token"));
    assert!(requests[0].authorization.contains("x-amz-security-token"));
}

#[test]
fn store_rejections_become_protocol_errors() {
    let store = StubStore::start(vec![StubResponse::error(
        400,
        JSON_1_0,
        json!({
            "__type": "com.amazonaws.dynamodb.v20120810#ResourceNotFoundException",
            "message": "Requested resource not found"
        })
        .to_string(),
    )]);
    let client = client_for(&store);
    let err = client
        .put(&item_from([
            ("TableName", NativeValue::from("missing")),
            ("Item", NativeValue::Map(item_from([("id", 1)]))),
        ]))
        .expect_err("rejected");
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(err.message(), Some("Bad Request: Requested resource not found"));
    assert_eq!(err.code(), Some("ResourceNotFoundException"));
    assert_eq!(err.status(), Some(400));
}

#[test]
fn xml_rejections_use_message_element() {
    let store = StubStore::start(vec![StubResponse::error(
        403,
        "application/xml",
        "<ErrorResponse><Error><Message>Signature expired</Message></Error></ErrorResponse>",
    )]);
    let client = client_for(&store);
    let err = client
        .scan(&item_from([("TableName", "t")]))
        .expect_err("rejected");
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(err.message(), Some("Forbidden: Signature expired"));
}

#[test]
fn unreachable_endpoint_is_a_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let config = ClientConfig::new("us-east-1", Credentials::new("AKIDTEST", "secret"))
        .with_endpoint(&format!("http://127.0.0.1:{port}"))
        .expect("endpoint");
    let client = Client::new(HttpTransport::new(&config).expect("transport"));
    let err = client
        .get(&item_from([("TableName", "t")]))
        .expect_err("refused");
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[test]
fn batch_write_all_pages_over_http() {
    let store = StubStore::start(vec![
        StubResponse::json(json!({ "UnprocessedItems": { "t": [
            { "PutRequest": { "Item": { "clientId": { "S": "test_delete_me_0" } } } }
        ]}})),
        StubResponse::json(json!({ "UnprocessedItems": {} })),
        StubResponse::json(json!({ "UnprocessedItems": {} })),
    ]);
    let client = client_for(&store);
    let puts = (0..30)
        .map(|i| WriteRequest::Put(item_from([("clientId", format!("test_delete_me_{i}"))])))
        .collect();
    let mut request = BTreeMap::new();
    request.insert("t".to_string(), puts);

    let summary = client.batch_write_all(request).expect("write");
    assert_eq!(summary.rounds, 2);
    assert_eq!(summary.retried, 1);

    let sizes: Vec<usize> = store
        .requests()
        .iter()
        .map(|request| {
            assert_eq!(request.target, "DynamoDB_20120810.BatchWriteItem");
            request.body["RequestItems"]["t"].as_array().map(Vec::len).unwrap_or(0)
        })
        .collect();
    // The retried entry joins the tail of the queue, so it rides with the last five.
    assert_eq!(sizes, vec![25, 6]);
}

#[test]
fn batch_get_all_collects_every_table() {
    let store = StubStore::start(vec![StubResponse::json(json!({
        "Responses": {
            "a": [{ "id": { "N": "1" } }],
            "b": [{ "id": { "N": "2" } }],
        },
        "UnprocessedKeys": {},
    }))]);
    let client = client_for(&store);
    let mut request = BTreeMap::new();
    request.insert("a".to_string(), KeysAndAttributes::new(vec![item_from([("id", 1)])]));
    request.insert("b".to_string(), KeysAndAttributes::new(vec![item_from([("id", 2)])]));

    let result = client.batch_get_all(request).expect("get");
    assert_eq!(result.responses["a"], vec![item_from([("id", 1)])]);
    assert_eq!(result.responses["b"], vec![item_from([("id", 2)])]);
    assert_eq!(
        store.requests()[0].body,
        json!({ "RequestItems": {
            "a": { "Keys": [{ "id": { "N": "1" } }] },
            "b": { "Keys": [{ "id": { "N": "2" } }] },
        }})
    );
}

#[test]
fn scan_all_follows_cursor_over_http() {
    let page = |name: &str, cursor: Option<&str>| {
        let mut page = json!({ "Count": 1, "ScannedCount": 1, "Items": [{ "name": { "S": name } }] });
        if let Some(cursor) = cursor {
            page["LastEvaluatedKey"] = json!({ "name": { "S": cursor } });
        }
        StubResponse::json(page)
    };
    let store = StubStore::start(vec![page("a", Some("a")), page("b", Some("b")), page("c", None)]);
    let client = client_for(&store);

    let result = client
        .scan_all(&item_from([("TableName", "t")]), None, None)
        .expect("scan");
    assert_eq!(
        result.items,
        vec![
            NativeValue::Map(item_from([("name", "a")])),
            NativeValue::Map(item_from([("name", "b")])),
            NativeValue::Map(item_from([("name", "c")])),
        ]
    );
    let bodies: Vec<Value> = store.requests().into_iter().map(|r| r.body).collect();
    assert_eq!(bodies[0], json!({ "TableName": "t" }));
    assert_eq!(
        bodies[2],
        json!({ "TableName": "t", "ExclusiveStartKey": { "name": { "S": "b" } } })
    );
}
