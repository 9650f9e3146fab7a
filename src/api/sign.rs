//! Purpose: AWS Signature Version 4 for JSON-protocol POST requests.
//! Exports: `SignedHeaders`, `sign_request`.
//! Role: Produces the auth headers `HttpTransport` attaches to every call.
//! Invariants: Signs `content-type`, `host`, `x-amz-date`, `x-amz-target`, and
//! `x-amz-security-token` when a session token is present.
#![allow(clippy::result_large_err)]

use super::client::ApiResult;
use super::config::Credentials;
use crate::core::error::{Error, ErrorKind};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, UtcOffset};

pub const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const SERVICE: &str = "dynamodb";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub security_token: Option<String>,
}

/// Sign a POST to `/` carrying `body` for the given target operation.
pub fn sign_request(
    credentials: &Credentials,
    region: &str,
    host: &str,
    target: &str,
    body: &[u8],
    now: OffsetDateTime,
) -> ApiResult<SignedHeaders> {
    let amz_date = amz_timestamp(now);
    let date = &amz_date[..8];

    let mut headers = vec![
        ("content-type", CONTENT_TYPE),
        ("host", host),
        ("x-amz-date", amz_date.as_str()),
    ];
    if let Some(token) = credentials.session_token.as_deref() {
        headers.push(("x-amz-security-token", token));
    }
    headers.push(("x-amz-target", target));

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "POST\n/\n\n{canonical_headers}\n{signed_headers}\n{}",
        hex_sha256(body)
    );
    let credential_scope = format!("{date}/{region}/{SERVICE}/aws4_request");
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    );
    let signature = calculate_signature(
        &credentials.secret_access_key,
        date,
        region,
        &string_to_sign,
    )?;

    Ok(SignedHeaders {
        authorization: format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
        amz_date,
        security_token: credentials.session_token.clone(),
    })
}

fn amz_timestamp(now: OffsetDateTime) -> String {
    let utc = now.to_offset(UtcOffset::UTC);
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        utc.year(),
        u8::from(utc.month()),
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second()
    )
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> ApiResult<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to initialize request signer")
            .with_source(err)
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn calculate_signature(
    secret_key: &str,
    date: &str,
    region: &str,
    string_to_sign: &str,
) -> ApiResult<String> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
    let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
    let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes())?;
    Ok(hex::encode(signature))
}

#[cfg(test)]
mod tests {
    use super::sign_request;
    use crate::api::config::Credentials;
    use time::macros::datetime;

    const HOST: &str = "dynamodb.us-east-1.amazonaws.com";
    const TARGET: &str = "DynamoDB_20120810.GetItem";
    const BODY: &[u8] = br#"{"TableName":"t"}"#;

    fn credentials(token: Option<&str>) -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: token.map(str::to_string),
        }
    }

    #[test]
    fn signs_known_request() {
        let signed = sign_request(
            &credentials(None),
            "us-east-1",
            HOST,
            TARGET,
            BODY,
            datetime!(2015-08-30 12:36:00 UTC),
        )
        .expect("sign");
        assert_eq!(signed.amz_date, "20150830T123600Z");
        assert_eq!(
            signed.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/dynamodb/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date;x-amz-target, \
             Signature=34d57dc4956829afbbe79a32430533f92e4715b170215ba27e65cf82c45a10f9"
        );
        assert!(signed.security_token.is_none());
    }

    #[test]
    fn session_token_is_signed() {
        let signed = sign_request(
            &credentials(Some("session")),
            "us-east-1",
            HOST,
            TARGET,
            BODY,
            datetime!(2015-08-30 14:36:00 +02:00),
        )
        .expect("sign");
        assert_eq!(signed.amz_date, "20150830T123600Z");
        assert!(signed.authorization.contains(
            "SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target"
        ));
        assert!(signed.authorization.ends_with(
            "Signature=71c3aa29794e6b16b3a3b0fa68140056c77339b488c645fb5ed6454aeceb596d"
        ));
        assert_eq!(signed.security_token.as_deref(), Some("session"));
    }
}
