//! Purpose: Resolve region, endpoint, credentials, and conversion policy.
//! Exports: `ClientConfig`, `Credentials`.
//! Role: Single source for how the CLI and library callers find their settings.
//! Invariants: Region is required; an empty variable counts as unset.
//! Invariants: Environment credentials win over the shared credentials file.
//! Notes: Resolution goes through a lookup function so callers (and tests) can
//! layer overrides without touching the process environment.
#![allow(clippy::result_large_err)]

use super::client::ApiResult;
use crate::core::convert::ConversionOptions;
use crate::core::error::{Error, ErrorKind};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

pub const ENDPOINT_VAR: &str = "DYNAMITE_ENDPOINT";
const DEFAULT_PROFILE: &str = "default";

#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Environment variables first, then the selected profile of the shared
    /// credentials file.
    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());
        if let (Some(access), Some(secret)) = (get("AWS_ACCESS_KEY_ID"), get("AWS_SECRET_ACCESS_KEY")) {
            let mut credentials = Credentials::new(access, secret);
            credentials.session_token = get("AWS_SESSION_TOKEN");
            return Ok(credentials);
        }

        let profile = get("AWS_PROFILE").unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        let path = get("AWS_SHARED_CREDENTIALS_FILE")
            .map(PathBuf::from)
            .or_else(|| get("HOME").map(|home| Path::new(&home).join(".aws").join("credentials")));
        let Some(path) = path else {
            return Err(missing_credentials(&profile));
        };
        if !path.exists() {
            return Err(missing_credentials(&profile));
        }
        Self::from_profile_file(&path, &profile)?.ok_or_else(|| missing_credentials(&profile))
    }

    pub fn from_profile_file(path: &Path, profile: &str) -> ApiResult<Option<Self>> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("failed to read credentials file")
                .with_field(path.display().to_string())
                .with_source(err)
        })?;
        Ok(parse_profile(&text, profile))
    }
}

fn parse_profile(text: &str, profile: &str) -> Option<Credentials> {
    let mut in_section = false;
    let mut access = None;
    let mut secret = None;
    let mut token = None;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            in_section = section.trim() == profile;
            continue;
        }
        if !in_section {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "aws_access_key_id" => access = Some(value),
            "aws_secret_access_key" => secret = Some(value),
            "aws_session_token" => token = Some(value),
            _ => {}
        }
    }
    let mut credentials = Credentials::new(access?, secret?);
    credentials.session_token = token;
    Some(credentials)
}

fn missing_credentials(profile: &str) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message("no credentials found")
        .with_field(profile)
        .with_hint(
            "Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY, or add the profile to ~/.aws/credentials.",
        )
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub region: String,
    pub endpoint: Option<Url>,
    pub credentials: Credentials,
    pub conversion: ConversionOptions,
}

impl ClientConfig {
    pub fn new(region: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            region: region.into(),
            endpoint: None,
            credentials,
            conversion: ConversionOptions::default(),
        }
    }

    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let region = get("AWS_REGION")
            .or_else(|| get("AWS_DEFAULT_REGION"))
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message("region is required")
                    .with_hint("Set AWS_REGION or pass --region.")
            })?;
        let credentials = Credentials::from_lookup(&lookup)?;
        let config = Self::new(region, credentials);
        match get(ENDPOINT_VAR) {
            Some(endpoint) => config.with_endpoint(&endpoint),
            None => Ok(config),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> ApiResult<Self> {
        let url = Url::parse(endpoint).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid endpoint url")
                .with_raw(endpoint)
                .with_source(err)
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("endpoint must use http or https")
                .with_raw(endpoint));
        }
        self.endpoint = Some(url);
        Ok(self)
    }

    pub fn with_conversion(mut self, conversion: ConversionOptions) -> Self {
        self.conversion = conversion;
        self
    }

    /// Explicit endpoint, or the regional public endpoint.
    pub fn endpoint_url(&self) -> ApiResult<Url> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }
        let default = format!("https://dynamodb.{}.amazonaws.com/", self.region);
        Url::parse(&default).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("region does not form a valid endpoint")
                .with_raw(self.region.clone())
                .with_source(err)
        })
    }
}
