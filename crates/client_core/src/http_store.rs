use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::{
    domain::{Group, GroupId, GroupWithSites, Site, SiteId},
    error::{ApiError, ApiException},
    protocol::{
        ExportPayload, ImportOutcome, LoginRequest, LoginResponse, NewGroup, NewSite, OrderUpdate,
    },
};
use tokio::sync::RwLock;
use tracing::warn;
use url::Url;

use crate::NavStore;

#[derive(Debug, Deserialize)]
struct AuthStatusResponse {
    authenticated: bool,
}

#[derive(Debug, Serialize)]
struct ConfigValue<'a> {
    value: &'a str,
}

/// `NavStore` over the dashboard's HTTP API. The bearer token lives here and
/// nowhere else; logout simply drops it.
pub struct HttpNavStore {
    http: Client,
    base_url: Url,
    token: RwLock<Option<String>>,
}

impl HttpNavStore {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let mut base_url = Url::parse(base_url.as_ref())
            .with_context(|| format!("invalid server url '{}'", base_url.as_ref()))?;
        // endpoints are joined relative to the base, so the path must be a
        // directory
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            token: RwLock::new(None),
        })
    }

    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid endpoint path '{path}'"))
    }

    async fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token.read().await.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Turn a non-success response into an error, preferring the server's
/// structured `ApiError` body when it sends one.
async fn api_error(response: Response) -> anyhow::Error {
    let status = response.status();
    match response.json::<ApiError>().await {
        Ok(error) => ApiException::new(error.code, error.message).into(),
        Err(_) => anyhow!("server returned {status}"),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(response.json().await?)
}

async fn expect_ok(response: Response) -> Result<()> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(())
}

#[async_trait]
impl NavStore for HttpNavStore {
    async fn check_auth(&self) -> Result<bool> {
        if self.token.read().await.is_none() {
            return Ok(false);
        }
        let request = self.http.get(self.endpoint("auth/status")?);
        let response: AuthStatusResponse =
            decode(self.authorize(request).await.send().await?).await?;
        Ok(response.authenticated)
    }

    async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let response = self
            .http
            .post(self.endpoint("auth/login")?)
            .json(&request)
            .send()
            .await?;
        let response: LoginResponse = decode(response).await?;
        if response.success {
            match &response.token {
                Some(token) => *self.token.write().await = Some(token.clone()),
                None => warn!("login succeeded but no session token was issued"),
            }
        }
        Ok(response)
    }

    async fn logout(&self) -> Result<()> {
        self.token.write().await.take();
        Ok(())
    }

    async fn fetch_groups_with_sites(&self) -> Result<Vec<GroupWithSites>> {
        let request = self.http.get(self.endpoint("groups/with-sites")?);
        decode(self.authorize(request).await.send().await?).await
    }

    async fn update_group_order(&self, updates: &[OrderUpdate]) -> Result<bool> {
        let request = self.http.put(self.endpoint("groups/order")?).json(updates);
        decode(self.authorize(request).await.send().await?).await
    }

    async fn update_site_order(&self, updates: &[OrderUpdate]) -> Result<bool> {
        let request = self.http.put(self.endpoint("sites/order")?).json(updates);
        decode(self.authorize(request).await.send().await?).await
    }

    async fn create_group(&self, group: NewGroup) -> Result<Group> {
        let request = self.http.post(self.endpoint("groups")?).json(&group);
        decode(self.authorize(request).await.send().await?).await
    }

    async fn update_group(&self, group: Group) -> Result<Group> {
        let request = self
            .http
            .put(self.endpoint(&format!("groups/{}", group.id.0))?)
            .json(&group);
        decode(self.authorize(request).await.send().await?).await
    }

    async fn delete_group(&self, group_id: GroupId) -> Result<()> {
        let request = self
            .http
            .delete(self.endpoint(&format!("groups/{}", group_id.0))?);
        expect_ok(self.authorize(request).await.send().await?).await
    }

    async fn create_site(&self, site: NewSite) -> Result<Site> {
        let request = self.http.post(self.endpoint("sites")?).json(&site);
        decode(self.authorize(request).await.send().await?).await
    }

    async fn update_site(&self, site: Site) -> Result<Site> {
        let request = self
            .http
            .put(self.endpoint(&format!("sites/{}", site.id.0))?)
            .json(&site);
        decode(self.authorize(request).await.send().await?).await
    }

    async fn delete_site(&self, site_id: SiteId) -> Result<()> {
        let request = self
            .http
            .delete(self.endpoint(&format!("sites/{}", site_id.0))?);
        expect_ok(self.authorize(request).await.send().await?).await
    }

    async fn get_configs(&self) -> Result<HashMap<String, String>> {
        let request = self.http.get(self.endpoint("configs")?);
        decode(self.authorize(request).await.send().await?).await
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let request = self
            .http
            .put(self.endpoint(&format!("configs/{key}"))?)
            .json(&ConfigValue { value });
        expect_ok(self.authorize(request).await.send().await?).await
    }

    async fn import_data(&self, payload: ExportPayload) -> Result<ImportOutcome> {
        let request = self.http.post(self.endpoint("import")?).json(&payload);
        decode(self.authorize(request).await.send().await?).await
    }
}

#[cfg(test)]
#[path = "tests/http_store_tests.rs"]
mod tests;
