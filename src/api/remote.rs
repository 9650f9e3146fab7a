//! Purpose: Signed HTTP transport for the DynamoDB JSON protocol.
//! Exports: `HttpTransport`.
//! Role: The production `Execute`: one SigV4-signed POST per operation.
//! Invariants: Every request is a POST to `/` with the JSON 1.0 content type.
//! Invariants: Status >= 400 maps to a Protocol error; socket faults map to Transport.
//! Invariants: Response bodies are returned raw (still wire-tagged).
#![allow(clippy::result_large_err)]

use super::client::{ApiResult, Execute, Operation};
use super::config::{ClientConfig, Credentials};
use super::sign::{CONTENT_TYPE, sign_request};
use crate::core::error::{Error, ErrorKind};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use url::Url;

#[derive(Clone)]
pub struct HttpTransport {
    inner: Arc<HttpTransportInner>,
}

struct HttpTransportInner {
    endpoint: Url,
    host: String,
    region: String,
    credentials: Credentials,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let endpoint = normalize_endpoint(config.endpoint_url()?)?;
        let host = host_header(&endpoint)?;
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self {
            inner: Arc::new(HttpTransportInner {
                endpoint,
                host,
                region: config.region.clone(),
                credentials: config.credentials.clone(),
                agent,
            }),
        })
    }

    /// Overall per-request timeout; unset means the agent default.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_agent(ureq::AgentBuilder::new().timeout(timeout).build())
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    fn with_agent(mut self, agent: ureq::Agent) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.agent = agent;
        } else {
            self.inner = Arc::new(HttpTransportInner {
                endpoint: self.inner.endpoint.clone(),
                host: self.inner.host.clone(),
                region: self.inner.region.clone(),
                credentials: self.inner.credentials.clone(),
                agent,
            });
        }
        self
    }
}

impl Execute for HttpTransport {
    fn execute(&self, operation: Operation, params: &Value) -> ApiResult<Value> {
        let inner = &self.inner;
        let body = serde_json::to_vec(params).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode request json")
                .with_source(err)
        })?;
        let target = operation.target();
        let signed = sign_request(
            &inner.credentials,
            &inner.region,
            &inner.host,
            &target,
            &body,
            OffsetDateTime::now_utc(),
        )?;

        tracing::debug!(
            %operation,
            endpoint = %inner.endpoint,
            body = %String::from_utf8_lossy(&body),
            "sending request"
        );
        let mut request = inner
            .agent
            .post(inner.endpoint.as_str())
            .set("Content-Type", CONTENT_TYPE)
            .set("X-Amz-Target", &target)
            .set("X-Amz-Date", &signed.amz_date)
            .set("Authorization", &signed.authorization);
        if let Some(token) = &signed.security_token {
            request = request.set("X-Amz-Security-Token", token);
        }

        match request.send_bytes(&body) {
            Ok(resp) => {
                tracing::info!(%operation, status = resp.status(), "response status");
                read_json_response(resp)
            }
            Err(ureq::Error::Status(code, resp)) => {
                tracing::info!(%operation, status = code, "response status");
                let err = parse_error_response(code, resp);
                tracing::error!(%operation, error = %err, "request rejected");
                Err(err)
            }
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Transport)
                .with_message("request failed")
                .with_source(err)),
        }
    }
}

fn normalize_endpoint(mut url: Url) -> ApiResult<Url> {
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage).with_message("endpoint must use http or https"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("endpoint must not include a path"));
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn host_header(url: &Url) -> ApiResult<String> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::new(ErrorKind::Usage).with_message("endpoint is missing a host"))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn read_json_response(response: ureq::Response) -> ApiResult<Value> {
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Transport)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    tracing::debug!(body = %body, "received raw data");
    if body.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let status_text = response.status_text().to_string();
    let content_type = response.content_type().to_string();
    let body = response.into_string().unwrap_or_default();
    let (message, code) = error_details(&status_text, &content_type, &body);
    let mut err = Error::new(ErrorKind::Protocol)
        .with_message(message)
        .with_status(status);
    if let Some(code) = code {
        if code.contains("Throughput") || code == "ThrottlingException" {
            err = err.with_hint("The request was throttled; retry after a short delay.");
        }
        err = err.with_code(code);
    }
    err
}

/// Message from the status text plus the body's own error text; the code is
/// the `__type` suffix after `#`.
fn error_details(status_text: &str, content_type: &str, body: &str) -> (String, Option<String>) {
    let mut message = String::new();
    if !status_text.is_empty() {
        message.push_str(status_text);
        message.push_str(": ");
    }
    let mut code = None;
    if content_type.contains("xml") {
        if let Some(text) = xml_message(body) {
            message.push_str(text);
        }
    } else if content_type.contains("json") {
        if let Ok(parsed) = serde_json::from_str::<Value>(body) {
            let error_type = parsed.get("__type").and_then(Value::as_str);
            let text = parsed
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| parsed.get("Message").and_then(Value::as_str))
                .or(error_type);
            if let Some(text) = text {
                message.push_str(text);
            }
            code = error_type.map(|kind| {
                kind.rsplit_once('#')
                    .map(|(_, suffix)| suffix)
                    .unwrap_or(kind)
                    .to_string()
            });
        }
    }
    let message = message.trim_end_matches([' ', ':']).to_string();
    if message.is_empty() {
        return ("request rejected".to_string(), code);
    }
    (message, code)
}

fn xml_message(body: &str) -> Option<&str> {
    let start = body.find("<Message>")? + "<Message>".len();
    let end = body[start..].find("</Message>")? + start;
    Some(&body[start..end])
}

#[cfg(test)]
mod tests {
    use super::{error_details, host_header, normalize_endpoint, xml_message};
    use crate::core::error::ErrorKind;
    use url::Url;

    fn url(raw: &str) -> Url {
        Url::parse(raw).expect("url")
    }

    #[test]
    fn normalize_endpoint_rejects_paths() {
        let normalized = normalize_endpoint(url("http://localhost:8000")).expect("url");
        assert_eq!(normalized.as_str(), "http://localhost:8000/");
        let err = normalize_endpoint(url("http://localhost:8000/tables")).expect_err("path");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn host_header_keeps_explicit_port() {
        assert_eq!(host_header(&url("http://127.0.0.1:8000/")).expect("host"), "127.0.0.1:8000");
        assert_eq!(
            host_header(&url("https://dynamodb.eu-west-1.amazonaws.com/")).expect("host"),
            "dynamodb.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn json_error_uses_message_and_type_suffix() {
        let (message, code) = error_details(
            "Bad Request",
            "application/x-amz-json-1.0",
            r#"{"__type":"com.amazonaws.dynamodb.v20120810#ResourceNotFoundException","message":"Requested resource not found"}"#,
        );
        assert_eq!(message, "Bad Request: Requested resource not found");
        assert_eq!(code.as_deref(), Some("ResourceNotFoundException"));
    }

    #[test]
    fn json_error_accepts_capitalized_message_or_bare_type() {
        let (message, _) = error_details(
            "Bad Request",
            "application/x-amz-json-1.0",
            r#"{"__type":"com.amazon.coral.service#SerializationException","Message":"Start of structure expected"}"#,
        );
        assert_eq!(message, "Bad Request: Start of structure expected");

        let (message, code) = error_details(
            "Bad Request",
            "application/x-amz-json-1.0",
            r#"{"__type":"com.amazon.coral.validate#ValidationException"}"#,
        );
        assert_eq!(message, "Bad Request: com.amazon.coral.validate#ValidationException");
        assert_eq!(code.as_deref(), Some("ValidationException"));
    }

    #[test]
    fn xml_error_uses_message_element() {
        let body = "<ErrorResponse><Error><Code>InvalidSignature</Code><Message>Signature mismatch</Message></Error></ErrorResponse>";
        assert_eq!(xml_message(body), Some("Signature mismatch"));
        let (message, code) = error_details("Forbidden", "application/xml", body);
        assert_eq!(message, "Forbidden: Signature mismatch");
        assert!(code.is_none());
    }

    #[test]
    fn unknown_body_falls_back_to_status_text() {
        let (message, _) = error_details("Internal Server Error", "text/plain", "oops");
        assert_eq!(message, "Internal Server Error");
        let (message, _) = error_details("", "text/plain", "");
        assert_eq!(message, "request rejected");
    }
}
