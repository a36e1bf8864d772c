use crate::domain::models::ScheduledItem;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::item_mapper::{decode_item, encode_item, RemoteItem};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

#[async_trait]
pub trait RemoteItemClient: Send + Sync {
    async fn list_items(
        &self,
        access_token: &str,
        owner_id: &str,
    ) -> Result<Vec<ScheduledItem>, InfraError>;

    async fn create_item(
        &self,
        access_token: &str,
        item: &ScheduledItem,
    ) -> Result<ScheduledItem, InfraError>;

    async fn update_item(
        &self,
        access_token: &str,
        item_id: &str,
        item: &ScheduledItem,
    ) -> Result<ScheduledItem, InfraError>;

    async fn delete_item(&self, access_token: &str, item_id: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestItemClient {
    client: Client,
    base_url: Url,
}

impl ReqwestItemClient {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, InfraError> {
        let mut base_url = Url::parse(base_url.trim()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid item api base url '{base_url}': {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "item api base url '{base_url}' cannot be a base"
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidPayload(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn items_endpoint(&self) -> Result<Url, InfraError> {
        self.base_url
            .join("items")
            .map_err(|error| InfraError::InvalidConfig(format!("invalid items endpoint: {error}")))
    }

    fn item_endpoint(&self, item_id: &str) -> Result<Url, InfraError> {
        let mut url = self.items_endpoint()?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("items endpoint URL cannot be a base".to_string())
            })?;
            segments.push(item_id.trim());
        }
        Ok(url)
    }

    fn status_error(status: StatusCode, body: &str) -> InfraError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                InfraError::Unauthenticated(format!("item api rejected credential: http {}", status.as_u16()))
            }
            StatusCode::NOT_FOUND => InfraError::NotFound(if body.trim().is_empty() {
                "item not found".to_string()
            } else {
                body.trim().to_string()
            }),
            _ => InfraError::Http {
                status: status.as_u16(),
                body: body.to_string(),
            },
        }
    }

    async fn read_body(response: reqwest::Response, action: &str) -> Result<(StatusCode, String), InfraError> {
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Network(format!("failed reading {action} response: {error}"))
        })?;
        Ok((status, body))
    }

    fn parse_item(body: &str, action: &str) -> Result<ScheduledItem, InfraError> {
        let parsed: RemoteItem = serde_json::from_str(body).map_err(|error| {
            InfraError::InvalidPayload(format!("invalid {action} payload: {error}; body={body}"))
        })?;
        decode_item(parsed)
    }
}

#[async_trait]
impl RemoteItemClient for ReqwestItemClient {
    async fn list_items(
        &self,
        access_token: &str,
        owner_id: &str,
    ) -> Result<Vec<ScheduledItem>, InfraError> {
        Self::ensure_non_empty(owner_id, "owner id")?;

        let response = self
            .client
            .get(self.items_endpoint()?)
            .query(&[("ownerId", owner_id.trim())])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while listing items: {error}")))?;

        let (status, body) = Self::read_body(response, "item list").await?;
        if !status.is_success() {
            return Err(Self::status_error(status, &body));
        }

        let parsed: Vec<RemoteItem> = serde_json::from_str(&body).map_err(|error| {
            InfraError::InvalidPayload(format!("invalid item list payload: {error}; body={body}"))
        })?;
        parsed.into_iter().map(decode_item).collect()
    }

    async fn create_item(
        &self,
        access_token: &str,
        item: &ScheduledItem,
    ) -> Result<ScheduledItem, InfraError> {
        let response = self
            .client
            .post(self.items_endpoint()?)
            .bearer_auth(access_token)
            .json(&encode_item(item))
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while creating item: {error}")))?;

        let (status, body) = Self::read_body(response, "item create").await?;
        if !status.is_success() {
            return Err(Self::status_error(status, &body));
        }

        let created = Self::parse_item(&body, "item create")?;
        if created.is_draft() {
            return Err(InfraError::InvalidPayload(
                "item create response did not include id".to_string(),
            ));
        }
        Ok(created)
    }

    async fn update_item(
        &self,
        access_token: &str,
        item_id: &str,
        item: &ScheduledItem,
    ) -> Result<ScheduledItem, InfraError> {
        Self::ensure_non_empty(item_id, "item id")?;

        let response = self
            .client
            .put(self.item_endpoint(item_id)?)
            .bearer_auth(access_token)
            .json(&encode_item(item))
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while updating item: {error}")))?;

        let (status, body) = Self::read_body(response, "item update").await?;
        if !status.is_success() {
            return Err(Self::status_error(status, &body));
        }
        Self::parse_item(&body, "item update")
    }

    async fn delete_item(&self, access_token: &str, item_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(item_id, "item id")?;

        let response = self
            .client
            .delete(self.item_endpoint(item_id)?)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while deleting item: {error}")))?;

        let (status, body) = Self::read_body(response, "item delete").await?;
        if !status.is_success() {
            return Err(Self::status_error(status, &body));
        }
        Ok(())
    }
}
