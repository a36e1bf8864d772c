use crate::application::error::{EngineError, SyncOperation};
use crate::application::item_store::{ItemStore, LocalKey};
use crate::domain::models::ScheduledItem;
use crate::infrastructure::config::RetrySettings;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::item_client::RemoteItemClient;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{sleep, Duration as TokioDuration};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay_ms: settings.base_delay_ms,
        }
    }
}

/// Applies mutations to the local store first, then confirms them remotely.
///
/// Every optimistic write records the entry version it produced. A remote
/// outcome is only applied while that version is still current, so a late
/// response never overwrites a newer local edit. Mutations are not retried;
/// only hydration is.
pub struct SyncAdapter<C>
where
    C: RemoteItemClient,
{
    item_client: Arc<C>,
    store: Arc<Mutex<ItemStore>>,
    retry_policy: RetryPolicy,
}

impl<C> SyncAdapter<C>
where
    C: RemoteItemClient,
{
    pub fn new(item_client: Arc<C>, store: Arc<Mutex<ItemStore>>) -> Self {
        Self {
            item_client,
            store,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn store(&self) -> &Arc<Mutex<ItemStore>> {
        &self.store
    }

    /// Replaces the persisted part of the store with the server's list.
    /// Returns the number of items loaded.
    pub async fn hydrate(&self, access_token: &str, owner_id: &str) -> Result<usize, EngineError> {
        if owner_id.trim().is_empty() {
            return Err(EngineError::Validation("owner id must not be empty".to_string()));
        }

        let items = self.list_items_with_retry(access_token, owner_id).await?;
        let invalid = items.iter().filter(|item| item.validate().is_err()).count();
        if invalid > 0 {
            tracing::warn!(owner_id, invalid, "server returned items that fail local validation");
        }

        let received = items.len();
        let skipped = self.lock_store()?.replace_persisted(items);
        if skipped > 0 {
            tracing::debug!(owner_id, skipped, "server items deferred to pending local writes");
        }
        let loaded = received - skipped;
        tracing::info!(owner_id, loaded, "store hydrated");
        Ok(loaded)
    }

    pub async fn create(
        &self,
        access_token: &str,
        item: ScheduledItem,
    ) -> Result<ScheduledItem, EngineError> {
        validate_item(&item)?;
        if !item.is_draft() {
            return Err(EngineError::Validation(
                "create expects an item without an id".to_string(),
            ));
        }

        let (key, version) = self.lock_store()?.insert(item.clone());
        tracing::debug!(operation = "create", local_key = %key, "optimistic insert");

        match self.item_client.create_item(access_token, &item).await {
            Ok(created) => {
                let confirmed = merge_server_item(&item, created);
                self.commit_create(key, version, confirmed.clone())?;
                tracing::info!(
                    operation = "create",
                    item_id = confirmed.persisted_id().unwrap_or_default(),
                    "remote create confirmed"
                );
                Ok(confirmed)
            }
            Err(cause) => {
                if self.lock_store()?.remove_if_version(key, version).is_none() {
                    tracing::debug!(operation = "create", local_key = %key, "rollback skipped for superseded draft");
                }
                tracing::warn!(operation = "create", error = %cause, "remote create failed; draft rolled back");
                Err(EngineError::sync_failed(SyncOperation::Create, item, cause))
            }
        }
    }

    pub async fn update(
        &self,
        access_token: &str,
        item: ScheduledItem,
    ) -> Result<ScheduledItem, EngineError> {
        validate_item(&item)?;
        self.push_update(SyncOperation::Update, access_token, item).await
    }

    /// Sends `item` with its new `completed` flag. Only persisted items can be
    /// toggled, and nothing but `completed` may differ from the stored copy.
    pub async fn toggle_completion(
        &self,
        access_token: &str,
        item: ScheduledItem,
    ) -> Result<ScheduledItem, EngineError> {
        validate_item(&item)?;
        self.push_update(SyncOperation::ToggleCompletion, access_token, item)
            .await
    }

    /// Removes the item locally, then remotely. A remote "not found" means the
    /// item is already gone, which is the requested outcome.
    pub async fn delete(&self, access_token: &str, item_id: &str) -> Result<(), EngineError> {
        let item_id = item_id.trim();
        let removed = {
            let mut store = self.lock_store()?;
            let key = store
                .key_for_id(item_id)
                .ok_or_else(|| EngineError::ItemNotFound(item_id.to_string()))?;
            let removed = store
                .remove(key)
                .ok_or_else(|| EngineError::ItemNotFound(item_id.to_string()))?;
            store.begin_delete(item_id);
            removed
        };

        let outcome = self.item_client.delete_item(access_token, item_id).await;
        let mut store = self.lock_store()?;
        store.finish_delete(item_id);
        match outcome {
            Ok(()) => {
                tracing::info!(operation = "delete", item_id, "remote delete confirmed");
                Ok(())
            }
            Err(cause) if cause.is_not_found() => {
                tracing::debug!(operation = "delete", item_id, "item already absent remotely");
                Ok(())
            }
            Err(cause) => {
                let item = removed.item.clone();
                if !store.restore(removed) {
                    tracing::debug!(operation = "delete", item_id, "rollback skipped; slot reused");
                }
                tracing::warn!(operation = "delete", item_id, error = %cause, "remote delete failed; item restored");
                Err(EngineError::sync_failed(SyncOperation::Delete, item, cause))
            }
        }
    }

    async fn push_update(
        &self,
        operation: SyncOperation,
        access_token: &str,
        item: ScheduledItem,
    ) -> Result<ScheduledItem, EngineError> {
        let item_id = item
            .persisted_id()
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                EngineError::Validation(format!("{operation} requires a persisted item id"))
            })?;

        let (key, previous, version) = {
            let mut store = self.lock_store()?;
            let key = store
                .key_for_id(&item_id)
                .ok_or_else(|| EngineError::ItemNotFound(item_id.clone()))?;
            let previous = store
                .get(key)
                .map(|entry| entry.item.clone())
                .ok_or_else(|| EngineError::ItemNotFound(item_id.clone()))?;
            if previous.owner_id != item.owner_id {
                return Err(EngineError::Validation(
                    "owner_id cannot change after creation".to_string(),
                ));
            }
            if operation == SyncOperation::ToggleCompletion {
                let mut expected = previous.clone();
                expected.completed = item.completed;
                if !expected.same_content(&item) {
                    return Err(EngineError::Validation(
                        "a completion toggle may only change `completed`".to_string(),
                    ));
                }
            }
            let version = store
                .replace(key, item.clone())
                .ok_or_else(|| EngineError::ItemNotFound(item_id.clone()))?;
            store.begin_write(key);
            (key, previous, version)
        };

        let outcome = self
            .item_client
            .update_item(access_token, &item_id, &item)
            .await;
        let mut store = self.lock_store()?;
        store.finish_write(key);
        match outcome {
            Ok(server_item) => {
                let confirmed = merge_server_item(&item, server_item);
                if store
                    .replace_if_version(key, version, confirmed.clone())
                    .is_none()
                {
                    tracing::debug!(
                        operation = operation.as_str(),
                        item_id = item_id.as_str(),
                        "stale response ignored"
                    );
                    return Ok(store.get(key).map(|entry| entry.item.clone()).unwrap_or(confirmed));
                }
                tracing::info!(
                    operation = operation.as_str(),
                    item_id = item_id.as_str(),
                    "remote update confirmed"
                );
                Ok(confirmed)
            }
            Err(cause) => {
                if store.replace_if_version(key, version, previous).is_none() {
                    tracing::debug!(
                        operation = operation.as_str(),
                        item_id = item_id.as_str(),
                        "rollback skipped for superseded write"
                    );
                }
                tracing::warn!(
                    operation = operation.as_str(),
                    item_id = item_id.as_str(),
                    error = %cause,
                    "remote update failed; local change rolled back"
                );
                Err(EngineError::sync_failed(operation, item, cause))
            }
        }
    }

    fn commit_create(
        &self,
        key: LocalKey,
        version: u64,
        confirmed: ScheduledItem,
    ) -> Result<(), EngineError> {
        let mut store = self.lock_store()?;
        let owner = confirmed.persisted_id().and_then(|id| store.key_for_id(id));
        if let Some(owner) = owner.filter(|owner| *owner != key) {
            // Hydration already loaded the server record under its own key.
            if store.remove_if_version(key, version).is_some() {
                tracing::debug!(operation = "create", local_key = %key, existing_key = %owner, "draft merged into hydrated entry");
            }
            return Ok(());
        }
        if store.replace_if_version(key, version, confirmed.clone()).is_some() {
            return Ok(());
        }
        // The draft was dropped by a newer write; the server record still
        // exists, so it has to be visible.
        if owner.is_none() {
            let (new_key, _) = store.insert(confirmed);
            tracing::debug!(operation = "create", local_key = %new_key, "confirmed item reinserted");
        }
        Ok(())
    }

    async fn list_items_with_retry(
        &self,
        access_token: &str,
        owner_id: &str,
    ) -> Result<Vec<ScheduledItem>, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self.item_client.list_items(access_token, owner_id).await {
                Ok(items) => return Ok(items),
                Err(error) if error.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt as u32));
                    tracing::debug!(attempt, delay_ms = delay, error = %error, "retrying item list");
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, ItemStore>, EngineError> {
        self.store
            .lock()
            .map_err(|_| EngineError::Store("item store lock poisoned".to_string()))
    }
}

fn validate_item(item: &ScheduledItem) -> Result<(), EngineError> {
    if let Some(rule) = &item.recurrence_rule {
        rule.validate().map_err(EngineError::InvalidRecurrenceRule)?;
    }
    item.validate().map_err(EngineError::Validation)
}

/// Server fields win; ownership never changes and a missing id falls back to
/// the one the request carried.
fn merge_server_item(sent: &ScheduledItem, mut server_item: ScheduledItem) -> ScheduledItem {
    server_item.owner_id = sent.owner_id.clone();
    if server_item.is_draft() {
        server_item.id = sent.id.clone();
    }
    server_item
}
