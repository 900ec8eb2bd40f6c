mod record;

pub use record::{COMPLETED, Instant, NOTES, Priority, Record, RecordFields, RecordPatch, TASKS};

use jot_core::{ErrorKind, JotError, JotResult};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const CLIENT_HEADER: &str = "x-jot-client";
const CLIENT_HEADER_VALUE: &str = concat!("jot/", env!("CARGO_PKG_VERSION"));

/// Authoritative store of user-owned records, partitioned into named
/// collections and queryable by owner.
///
/// Implementations report every failure as [`ErrorKind::Remote`]; callers do
/// not distinguish offline, timeout, permission or not-found conditions.
pub trait RemoteCollectionSource {
    fn query(&self, collection: &str, owner_id: &str) -> JotResult<Vec<Record>>;

    /// Stores a new document and returns the id the store assigned to it.
    fn insert(&self, collection: &str, fields: &RecordFields) -> JotResult<String>;

    fn update(&self, collection: &str, id: &str, patch: &RecordPatch) -> JotResult<()>;

    fn delete(&self, collection: &str, id: &str) -> JotResult<()>;
}

impl<T: RemoteCollectionSource + ?Sized> RemoteCollectionSource for &T {
    fn query(&self, collection: &str, owner_id: &str) -> JotResult<Vec<Record>> {
        (**self).query(collection, owner_id)
    }

    fn insert(&self, collection: &str, fields: &RecordFields) -> JotResult<String> {
        (**self).insert(collection, fields)
    }

    fn update(&self, collection: &str, id: &str, patch: &RecordPatch) -> JotResult<()> {
        (**self).update(collection, id, patch)
    }

    fn delete(&self, collection: &str, id: &str) -> JotResult<()> {
        (**self).delete(collection, id)
    }
}

#[derive(Debug, Clone)]
pub struct DocumentStoreApi {
    base_url: String,
    client: Client,
    id_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInData {
    pub user: UserData,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct QueryResponseData {
    #[serde(default)]
    documents: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct InsertResponseData {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
    message: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl DocumentStoreApi {
    pub fn new(base_url: &str) -> JotResult<Self> {
        let trimmed = base_url.trim_end_matches('/').to_string();
        if trimmed.is_empty() {
            return Err(JotError::usage("server URL cannot be empty"));
        }
        Url::parse(&trimmed)
            .map_err(|err| JotError::usage(format!("invalid server URL '{trimmed}': {err}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("jot-cli/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| JotError::io(format!("failed to construct API client: {err}")))?;

        Ok(Self {
            base_url: trimmed,
            client,
            id_token: None,
        })
    }

    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        let token = id_token.into();
        self.id_token = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn sign_in(&self, request: &SignInRequest) -> JotResult<SignInData> {
        let email = request.email.trim();
        if email.is_empty() || request.password.is_empty() {
            return Err(JotError::usage("email and password are required for sign in"));
        }

        let url = self.endpoint(&["v1", "accounts", "sign-in"])?;
        let body = serde_json::json!({
            "email": email,
            "password": request.password,
        });

        let response = self
            .client
            .post(url)
            .header(CLIENT_HEADER, CLIENT_HEADER_VALUE)
            .json(&body)
            .send()
            .map_err(network_error)?;

        let data: SignInData = parse_json_response(response).map_err(|mut err| {
            if matches!(
                error_status_code(&err),
                Some(
                    StatusCode::BAD_REQUEST
                        | StatusCode::UNAUTHORIZED
                        | StatusCode::FORBIDDEN
                        | StatusCode::UNPROCESSABLE_ENTITY
                )
            ) {
                err.kind = ErrorKind::Auth;
            }
            err
        })?;

        if data.user.uid.trim().is_empty() || data.id_token.trim().is_empty() {
            return Err(JotError::auth(
                "sign-in response did not include a user id and token",
            ));
        }

        Ok(data)
    }

    fn documents_url(&self, collection: &str) -> JotResult<Url> {
        if collection.trim().is_empty() {
            return Err(JotError::usage("collection name cannot be empty"));
        }
        self.endpoint(&["v1", "collections", collection, "documents"])
    }

    fn document_url(&self, collection: &str, id: &str) -> JotResult<Url> {
        if id.trim().is_empty() {
            return Err(JotError::usage("document id cannot be empty"));
        }
        let mut url = self.documents_url(collection)?;
        url.path_segments_mut()
            .map_err(|_| JotError::usage(format!("server URL '{}' cannot be a base", self.base_url)))?
            .push(id);
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> JotResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| JotError::usage(format!("invalid server URL '{}': {err}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| JotError::usage(format!("server URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(CLIENT_HEADER, CLIENT_HEADER_VALUE);
        match self.id_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl RemoteCollectionSource for DocumentStoreApi {
    fn query(&self, collection: &str, owner_id: &str) -> JotResult<Vec<Record>> {
        let url = self.documents_url(collection)?;
        let response = self
            .authorized(self.client.get(url).query(&[("userId", owner_id)]))
            .send()
            .map_err(network_error)?;

        let data: QueryResponseData = parse_json_response(response)?;
        Ok(data.documents)
    }

    fn insert(&self, collection: &str, fields: &RecordFields) -> JotResult<String> {
        let url = self.documents_url(collection)?;
        let response = self
            .authorized(self.client.post(url).json(fields))
            .send()
            .map_err(network_error)?;

        let data: InsertResponseData = parse_json_response(response)?;
        if data.id.trim().is_empty() {
            return Err(JotError::remote(
                "insert response did not include a document id",
            ));
        }
        Ok(data.id)
    }

    fn update(&self, collection: &str, id: &str, patch: &RecordPatch) -> JotResult<()> {
        let url = self.document_url(collection, id)?;
        let response = self
            .authorized(self.client.patch(url).json(patch))
            .send()
            .map_err(network_error)?;

        parse_no_content_response(response)
    }

    fn delete(&self, collection: &str, id: &str) -> JotResult<()> {
        let url = self.document_url(collection, id)?;
        let response = self
            .authorized(self.client.delete(url))
            .send()
            .map_err(network_error)?;

        parse_no_content_response(response)
    }
}

fn parse_no_content_response(response: Response) -> JotResult<()> {
    let status = response.status();
    let headers = response.headers().clone();
    if status.is_success() {
        return Ok(());
    }

    let body_text = response.text().unwrap_or_default();
    Err(parse_error_response(status, &body_text, Some(&headers)))
}

fn parse_json_response<T: DeserializeOwned>(response: Response) -> JotResult<T> {
    let status = response.status();
    let headers = response.headers().clone();
    let body_text = response.text().unwrap_or_default();

    if !status.is_success() {
        return Err(parse_error_response(status, &body_text, Some(&headers)));
    }

    let value = serde_json::from_str::<Value>(&body_text)
        .map_err(|err| JotError::remote(format!("failed to decode API response JSON: {err}")))?;

    if let Some(data) = value.get("data")
        && !data.is_null()
        && let Ok(parsed) = serde_json::from_value::<T>(data.clone())
    {
        return Ok(parsed);
    }

    serde_json::from_value::<T>(value).map_err(|err| {
        JotError::remote(format!(
            "failed to map API response to expected shape: {err}"
        ))
    })
}

fn parse_error_response(
    status: StatusCode,
    body_text: &str,
    headers: Option<&HeaderMap>,
) -> JotError {
    let body_trimmed = body_text.trim();
    let fallback = if body_trimmed.is_empty() {
        format!("request failed with status {}", status.as_u16())
    } else {
        format!(
            "request failed with status {}: {}",
            status.as_u16(),
            truncate_for_error(body_trimmed, 240)
        )
    };

    let parsed = serde_json::from_str::<ErrorEnvelope>(body_text).ok();
    let message = parsed
        .as_ref()
        .and_then(|payload| payload.error.as_ref())
        .and_then(|error| error.message.clone())
        .or_else(|| parsed.as_ref().and_then(|payload| payload.message.clone()))
        .or_else(|| parsed.as_ref().and_then(|payload| payload.reason.clone()))
        .unwrap_or(fallback);

    let coded_message = parsed
        .as_ref()
        .and_then(|payload| payload.error.as_ref())
        .and_then(|error| error.code.as_ref())
        .map(|code| format!("{message} ({code})"))
        .unwrap_or(message);

    let with_retry_after = match headers.and_then(extract_retry_after_seconds) {
        Some(seconds) if status == StatusCode::TOO_MANY_REQUESTS => {
            format!("{coded_message} [retry_after_seconds={seconds}]")
        }
        _ => coded_message,
    };

    JotError::remote(format!(
        "{} [http_status={}]",
        with_retry_after,
        status.as_u16()
    ))
}

fn extract_retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .and_then(|value| value.parse::<u64>().ok())
}

fn truncate_for_error(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }

    let truncated: String = input.chars().take(max_chars).collect();
    format!("{truncated}...")
}

fn network_error(err: reqwest::Error) -> JotError {
    JotError::remote(format!("network request failed: {err}"))
}

fn error_status_code(error: &JotError) -> Option<StatusCode> {
    let marker = "[http_status=";
    let start = error.message.find(marker)?;
    let rest = &error.message[start + marker.len()..];
    let end = rest.find(']')?;
    let code = rest[..end].parse::<u16>().ok()?;
    StatusCode::from_u16(code).ok()
}
