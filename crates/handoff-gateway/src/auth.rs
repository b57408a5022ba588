use crate::error::{GatewayError, Result};
use crate::rest::RestClient;
use chrono::{DateTime, Duration, Utc};
use handoff_core::domain::{AuthSession, AuthUser};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    #[serde(default, alias = "error_description", alias = "msg")]
    message: Option<String>,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)))
            .unwrap_or(now + Duration::hours(1));
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Calls against the backend's `/auth/v1` endpoints.
#[derive(Debug, Clone)]
pub struct AuthClient {
    rest: RestClient,
}

impl AuthClient {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    pub async fn sign_in_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        let url = self.rest.endpoint("auth/v1/token")?;
        debug!("password sign-in");
        let response = self
            .rest
            .http()
            .post(url)
            .query(&[("grant_type", "password")])
            .header("apikey", self.rest.anon_key())
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let token: TokenResponse = auth_json(response).await?;
        Ok(token.into_session(Utc::now()))
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthSession> {
        let url = self.rest.endpoint("auth/v1/token")?;
        debug!("refreshing session");
        let response = self
            .rest
            .http()
            .post(url)
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", self.rest.anon_key())
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let token: TokenResponse = auth_json(response).await?;
        Ok(token.into_session(Utc::now()))
    }

    /// Sends the password-reset email; `redirect_to` is the link target inside it.
    pub async fn recover(&self, email: &str, redirect_to: Option<&str>) -> Result<()> {
        let url = self.rest.endpoint("auth/v1/recover")?;
        let mut request = self
            .rest
            .http()
            .post(url)
            .header("apikey", self.rest.anon_key())
            .json(&json!({ "email": email }));
        if let Some(redirect) = redirect_to {
            request = request.query(&[("redirect_to", redirect)]);
        }
        auth_ok(request.send().await?).await
    }

    pub async fn update_password(&self, access_token: &str, new_password: &str) -> Result<()> {
        let url = self.rest.endpoint("auth/v1/user")?;
        let response = self
            .rest
            .http()
            .put(url)
            .header("apikey", self.rest.anon_key())
            .bearer_auth(access_token)
            .json(&json!({ "password": new_password }))
            .send()
            .await?;
        auth_ok(response).await
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<()> {
        let url = self.rest.endpoint("auth/v1/logout")?;
        let response = self
            .rest
            .http()
            .post(url)
            .header("apikey", self.rest.anon_key())
            .bearer_auth(access_token)
            .send()
            .await?;
        auth_ok(response).await
    }
}

async fn auth_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = auth_checked(response).await?;
    Ok(response.json().await?)
}

async fn auth_ok(response: reqwest::Response) -> Result<()> {
    auth_checked(response).await.map(|_| ())
}

async fn auth_checked(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<AuthErrorBody>(&body)
        .ok()
        .and_then(|err| err.message)
        .unwrap_or(body);
    Err(GatewayError::Auth(format!("{} {message}", status.as_u16())))
}

#[cfg(test)]
mod tests {
    use super::TokenResponse;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn expiry_prefers_absolute_timestamp() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let token: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_in":3600,"expires_at":1893459600,"user":{"id":"agent-42","email":"a@b.c"}}"#,
        )
        .unwrap();
        let session = token.into_session(now);
        assert_eq!(session.expires_at.timestamp(), 1_893_459_600);

        let relative: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_in":60,"user":{"id":"agent-42"}}"#,
        )
        .unwrap();
        assert_eq!(relative.into_session(now).expires_at, now + Duration::seconds(60));
    }
}
