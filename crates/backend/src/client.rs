//! REST client for the hosted backend (PostgREST data API + GoTrue auth API).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use proto::{BackendError, CredentialPair, Role, ScanRecord, UserProfile};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Endpoint used for the handle when nothing is configured. Never contacted:
/// callers check [`BackendClient::is_configured`] first.
pub const PLACEHOLDER_ENDPOINT: &str = "https://placeholder.supabase.co";

/// PostgREST code for a rejected/expired JWT.
const PGRST_JWT_REJECTED: &str = "PGRST301";
/// Postgres `insufficient_privilege`, returned for row-level-security denials.
const PG_INSUFFICIENT_PRIVILEGE: &str = "42501";

/// Session tokens persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredSession {
    /// Returns `true` if the token has a known expiry that has already passed.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| t < Utc::now())
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<String> {
        self.code.as_ref().map(|c| match c {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    fn message(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
    }
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

impl From<AuthUser> for UserProfile {
    fn from(user: AuthUser) -> Self {
        let email = user.email.unwrap_or_default();
        let meta = user.user_metadata;
        let display_name = meta
            .full_name
            .or(meta.name)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
        UserProfile {
            id: user.id,
            display_name,
            email,
            avatar_url: meta.avatar_url.or(meta.picture).unwrap_or_default(),
            role: Role::from(meta.role.as_deref().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Connection handle for one backend endpoint/key pair.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    pair: CredentialPair,
    base_url: String,
}

impl BackendClient {
    /// Builds a handle for `pair`. Unconfigured pairs get the placeholder endpoint.
    pub fn new(pair: CredentialPair) -> Self {
        let base_url = if pair.is_configured() {
            pair.endpoint_url.trim_end_matches('/').to_string()
        } else {
            PLACEHOLDER_ENDPOINT.to_string()
        };
        Self {
            http: reqwest::Client::new(),
            pair,
            base_url,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.pair.is_configured()
    }

    pub fn pair(&self) -> &CredentialPair {
        &self.pair
    }

    /// Base URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, bearer: Option<&str>) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        self.http
            .request(method, url)
            .header("apikey", &self.pair.secret_key)
            .bearer_auth(bearer.unwrap_or(&self.pair.secret_key))
    }

    /// Counts rows of `collection` without fetching them (`HEAD`, `Prefer: count=exact`).
    ///
    /// Returns the total from `Content-Range` when the server reports one.
    pub async fn count_rows(&self, collection: &str, limit: u32) -> Result<Option<u64>, BackendError> {
        let limit = limit.to_string();
        let response = self
            .request(Method::HEAD, &format!("/rest/v1/{collection}"), None)
            .query(&[("select", "count"), ("limit", limit.as_str())])
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
        debug!(collection, total = ?total, "Row count probe answered");
        Ok(total)
    }

    /// Looks up the user that owns `access_token`.
    pub async fn fetch_user(&self, access_token: &str) -> Result<UserProfile, BackendError> {
        let response = self
            .request(Method::GET, "/auth/v1/user", Some(access_token))
            .send()
            .await
            .map_err(transport_error)?;
        let user: AuthUser = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(user.into())
    }

    /// Exchanges an email/password for a session.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(StoredSession, UserProfile), BackendError> {
        let response = self
            .request(Method::POST, "/auth/v1/token", None)
            .query(&[("grant_type", "password")])
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(transport_error)?;
        let token: TokenResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        let session = StoredSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        };
        Ok((session, token.user.into()))
    }

    /// Revokes the session behind `access_token`.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let response = self
            .request(Method::POST, "/auth/v1/logout", Some(access_token))
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }

    /// Inserts one scan row.
    pub async fn insert_scan(
        &self,
        collection: &str,
        record: &ScanRecord,
        access_token: Option<&str>,
    ) -> Result<(), BackendError> {
        let response = self
            .request(Method::POST, &format!("/rest/v1/{collection}"), access_token)
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        debug!(collection, id = %record.id, "Scan row inserted");
        Ok(())
    }

    /// Lists the newest scan rows owned by `user_id`.
    pub async fn list_scans(
        &self,
        collection: &str,
        user_id: &str,
        access_token: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ScanRecord>, BackendError> {
        let owner = format!("eq.{user_id}");
        let limit = limit.to_string();
        let response = self
            .request(Method::GET, &format!("/rest/v1/{collection}"), access_token)
            .query(&[
                ("select", "*"),
                ("user_id", owner.as_str()),
                ("order", "timestamp.desc"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> BackendError {
    debug!(error = %err, "Backend transport error");
    BackendError::Unreachable(err.to_string())
}

/// Maps non-success responses onto [`BackendError`].
///
/// 401/403 and the row-level-security/JWT codes become `Unauthorized`, since
/// they prove the endpoint exists and understood the key format.
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
    let code = parsed.code();
    let message = parsed
        .message()
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    debug!(status = %status.as_u16(), code = ?code, "Backend returned error");

    let rls_or_jwt = matches!(
        code.as_deref(),
        Some(PGRST_JWT_REJECTED) | Some(PG_INSUFFICIENT_PRIVILEGE)
    );
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || rls_or_jwt {
        return Err(BackendError::Unauthorized {
            status: status.as_u16(),
            message,
        });
    }
    Err(BackendError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Extracts the total from `Content-Range: 0-0/42` or `*/42`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}
