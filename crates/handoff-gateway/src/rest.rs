use crate::error::{GatewayError, Result};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// PostgREST table access with the project key and, once signed in, the agent's token.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl RestClient {
    pub fn new(base_url: Url, anon_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_http(http, base_url, anon_key))
    }

    pub fn with_http(http: reqwest::Client, base_url: Url, anon_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: with_trailing_slash(base_url),
            anon_key: anon_key.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub fn rest_url(&self, table: &str) -> Result<Url> {
        Ok(self.base_url.join(&format!("rest/v1/{table}"))?)
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {bearer}"))
    }

    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let url = self.rest_url(table)?;
        debug!(table, "select");
        let response = self
            .authorize(self.http.get(url))
            .query(query)
            .send()
            .await?;
        let response = check_response(response).await?;
        Ok(response.json().await?)
    }

    /// Inserts one row and returns it as stored.
    pub async fn insert_returning<B, T>(&self, table: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.rest_url(table)?;
        debug!(table, "insert");
        let response = self
            .authorize(self.http.post(url))
            .header("Prefer", "return=representation")
            .header("Accept", "application/vnd.pgrst.object+json")
            .json(body)
            .send()
            .await?;
        let response = check_response(response).await?;
        Ok(response.json().await?)
    }

    pub async fn insert<B: Serialize + ?Sized>(&self, table: &str, body: &B) -> Result<()> {
        let url = self.rest_url(table)?;
        debug!(table, "insert");
        let response = self
            .authorize(self.http.post(url))
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    pub async fn upsert<B: Serialize + ?Sized>(
        &self,
        table: &str,
        on_conflict: &str,
        body: &B,
    ) -> Result<()> {
        let url = self.rest_url(table)?;
        debug!(table, on_conflict, "upsert");
        let response = self
            .authorize(self.http.post(url))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(body)
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    /// Updates matching rows and returns how many were touched.
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &B,
    ) -> Result<usize> {
        let url = self.rest_url(table)?;
        debug!(table, "patch");
        let response = self
            .authorize(self.http.patch(url))
            .query(filters)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let response = check_response(response).await?;
        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(rows.len())
    }

    pub async fn delete(&self, table: &str, filters: &[(&str, String)]) -> Result<()> {
        let url = self.rest_url(table)?;
        debug!(table, "delete");
        let response = self
            .authorize(self.http.delete(url))
            .query(filters)
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url.as_str())
            .field("signed_in", &self.access_token.is_some())
            .finish_non_exhaustive()
    }
}

pub fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

pub(crate) async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "backend request failed");
    let parsed = serde_json::from_str::<PostgrestError>(&body).ok();
    let (code, message) = match parsed {
        Some(err) => {
            let message = match (err.message, err.details) {
                (Some(message), Some(details)) => format!("{message} ({details})"),
                (Some(message), None) => message,
                (None, _) => body.clone(),
            };
            (err.code, message)
        }
        None => (None, body),
    };
    Err(GatewayError::Backend {
        status: status.as_u16(),
        code,
        message,
    })
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::{eq, RestClient};
    use url::Url;

    #[test]
    fn rest_url_keeps_base_path() {
        let client = RestClient::with_http(
            reqwest::Client::new(),
            Url::parse("https://proxy.example.com/supabase").unwrap(),
            "anon",
        );
        assert_eq!(
            client.rest_url("chat_sessions_state").unwrap().as_str(),
            "https://proxy.example.com/supabase/rest/v1/chat_sessions_state"
        );
        assert_eq!(
            client.endpoint("/auth/v1/token").unwrap().as_str(),
            "https://proxy.example.com/supabase/auth/v1/token"
        );
    }

    #[test]
    fn debug_hides_keys() {
        let client = RestClient::with_http(
            reqwest::Client::new(),
            Url::parse("https://demo.supabase.co").unwrap(),
            "anon-secret",
        )
        .with_access_token("jwt-secret");
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret"));
        assert_eq!(eq("5551234567"), "eq.5551234567");
    }
}
