use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::error::EngineError;
use crate::application::item_store::ItemStore;
use crate::application::sync_adapter::{RetryPolicy, SyncAdapter};
use crate::domain::completion::{apply_plan, plan_transition, Transition, TransitionPlan};
use crate::domain::models::{
    Frequency, ItemKind, Occurrence, RecurrenceRule, ScheduledItem, TimeSpan,
};
use crate::domain::recurrence::RecurrenceExpander;
use crate::domain::view::{CalendarView, DraftDefaults, InteractionController, OpenEditor};
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::item_client::RemoteItemClient;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Entry point for embedding applications. Owns the store, the sync adapter
/// and the interaction controller, and logs every command outcome.
pub struct SchedulerEngine<C>
where
    C: RemoteItemClient,
{
    config: EngineConfig,
    expander: RecurrenceExpander,
    store: Arc<Mutex<ItemStore>>,
    sync: SyncAdapter<C>,
    controller: Mutex<InteractionController>,
    access_token: Mutex<String>,
}

impl<C> SchedulerEngine<C>
where
    C: RemoteItemClient,
{
    pub fn new(
        config: EngineConfig,
        item_client: Arc<C>,
        access_token: impl Into<String>,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Config)?;
        let time_zone = config.time_zone().map_err(EngineError::Config)?;
        let max_horizon = u32::try_from(config.recurrence.max_horizon).map_err(|_| {
            EngineError::Config(InfraError::InvalidConfig(
                "recurrence.maxHorizon is out of range".to_string(),
            ))
        })?;
        let expander = RecurrenceExpander::new(time_zone).with_max_horizon(max_horizon);
        let store = Arc::new(Mutex::new(ItemStore::new()));
        let sync = SyncAdapter::new(item_client, Arc::clone(&store))
            .with_retry_policy(RetryPolicy::from(&config.hydrate_retry));

        Ok(Self {
            config,
            expander,
            store,
            sync,
            controller: Mutex::new(InteractionController::default()),
            access_token: Mutex::new(access_token.into()),
        })
    }

    /// Bootstraps `workspace_root` and builds an engine from its config.
    ///
    /// Logging is not installed here; the host calls
    /// [`BootstrapResult::init_logging`] once per process.
    pub fn open(
        workspace_root: &Path,
        item_client: Arc<C>,
        access_token: impl Into<String>,
    ) -> Result<(Self, BootstrapResult), EngineError> {
        let bootstrap = bootstrap_workspace(workspace_root).map_err(EngineError::Config)?;
        let engine = Self::new(bootstrap.config.clone(), item_client, access_token)?;
        tracing::info!(
            workspace = %bootstrap.workspace_root.display(),
            timezone = %engine.expander.time_zone(),
            "engine opened"
        );
        Ok((engine, bootstrap))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn expander(&self) -> &RecurrenceExpander {
        &self.expander
    }

    /// Swaps the bearer credential; session refresh happens outside the engine.
    pub fn set_access_token(&self, access_token: impl Into<String>) -> Result<(), EngineError> {
        *self
            .access_token
            .lock()
            .map_err(|_| EngineError::Store("credential lock poisoned".to_string()))? =
            access_token.into();
        Ok(())
    }

    pub async fn hydrate(&self, owner_id: &str) -> Result<usize, EngineError> {
        let result = match self.access_token() {
            Ok(token) => self.sync.hydrate(&token, owner_id).await,
            Err(error) => Err(error),
        };
        finish("hydrate", result)
    }

    pub async fn create_event(&self, item: ScheduledItem) -> Result<ScheduledItem, EngineError> {
        if item.kind != ItemKind::Event {
            return finish(
                "create_event",
                Err(EngineError::Validation("create_event expects an event".to_string())),
            );
        }
        let result = self.create(item).await;
        finish("create_event", result)
    }

    /// Adds a todo from free text. Blank titles are rejected.
    pub async fn create_todo(
        &self,
        owner_id: &str,
        title: &str,
    ) -> Result<ScheduledItem, EngineError> {
        let title = title.trim();
        let result = if title.is_empty() {
            Err(EngineError::Validation("todo title must not be empty".to_string()))
        } else {
            self.create(ScheduledItem::new_todo(owner_id.trim(), title))
                .await
        };
        finish("create_todo", result)
    }

    /// Saves the result of an editor session: drafts are created, persisted
    /// items are updated.
    pub async fn save(&self, item: ScheduledItem) -> Result<ScheduledItem, EngineError> {
        let result = if item.is_draft() {
            self.create(item).await
        } else {
            self.update_item(item).await
        };
        finish("save", result)
    }

    pub async fn update(&self, item: ScheduledItem) -> Result<ScheduledItem, EngineError> {
        let result = self.update_item(item).await;
        finish("update", result)
    }

    pub async fn rename(&self, item_id: &str, title: &str) -> Result<ScheduledItem, EngineError> {
        let title = title.trim();
        let result = if title.is_empty() {
            Err(EngineError::Validation("title must not be empty".to_string()))
        } else {
            match self.find(item_id) {
                Ok(mut item) => {
                    item.title = title.to_string();
                    self.update_item(item).await
                }
                Err(error) => Err(error),
            }
        };
        finish("rename", result)
    }

    pub async fn complete(&self, item_id: &str) -> Result<ScheduledItem, EngineError> {
        let result = self.toggle(item_id, Transition::Complete).await;
        finish("complete", result)
    }

    pub async fn reopen(&self, item_id: &str) -> Result<ScheduledItem, EngineError> {
        let result = self.toggle(item_id, Transition::Reopen).await;
        finish("reopen", result)
    }

    /// Deletes a persisted item. The returned plan records the state the
    /// item left.
    pub async fn remove(&self, item_id: &str) -> Result<TransitionPlan, EngineError> {
        let result = self.remove_item(item_id).await;
        finish("remove", result)
    }

    pub fn get(&self, item_id: &str) -> Result<Option<ScheduledItem>, EngineError> {
        Ok(self.lock_store()?.get_by_id(item_id).cloned())
    }

    pub fn items(&self) -> Result<Vec<ScheduledItem>, EngineError> {
        Ok(self.lock_store()?.list())
    }

    pub fn pending_items(&self) -> Result<Vec<ScheduledItem>, EngineError> {
        Ok(self.lock_store()?.pending())
    }

    pub fn completed_items(&self) -> Result<Vec<ScheduledItem>, EngineError> {
        Ok(self.lock_store()?.completed())
    }

    pub fn events(&self) -> Result<Vec<ScheduledItem>, EngineError> {
        Ok(self.lock_store()?.of_kind(ItemKind::Event))
    }

    pub fn todos(&self) -> Result<Vec<ScheduledItem>, EngineError> {
        Ok(self.lock_store()?.of_kind(ItemKind::Todo))
    }

    /// Calendar feed: every occurrence of every stored event that overlaps
    /// `window`, ordered by start time.
    pub fn occurrences_between(&self, window: &TimeSpan) -> Result<Vec<Occurrence>, EngineError> {
        window.validate().map_err(EngineError::Validation)?;
        let events = self.events()?;

        let mut occurrences = Vec::new();
        for event in &events {
            match self.expander.expand_between(event, window) {
                Ok(found) => occurrences.extend(found),
                Err(error) => tracing::warn!(
                    command = "occurrences_between",
                    item_id = event.persisted_id().unwrap_or_default(),
                    error = %error,
                    "event skipped from calendar feed"
                ),
            }
        }
        occurrences.sort_by(|left, right| {
            left.start_time
                .cmp(&right.start_time)
                .then_with(|| left.parent_id.cmp(&right.parent_id))
                .then_with(|| left.sequence_index.cmp(&right.sequence_index))
        });
        Ok(occurrences)
    }

    pub fn occurrence_at(
        &self,
        item_id: &str,
        sequence_index: u32,
    ) -> Result<Option<Occurrence>, EngineError> {
        let item = self.find(item_id)?;
        Ok(self.expander.occurrence_at(&item, sequence_index)?)
    }

    pub fn view(&self) -> Result<CalendarView, EngineError> {
        Ok(self.controller()?.view())
    }

    pub fn set_view(&self, view: CalendarView) -> Result<(), EngineError> {
        self.controller()?.set_view(view);
        tracing::debug!(command = "set_view", view = view.as_str(), "view changed");
        Ok(())
    }

    pub fn request_create_at(&self, range: TimeSpan) -> Result<OpenEditor, EngineError> {
        let result = self.controller()?.request_create_at(range);
        if let Err(rejected) = &result {
            tracing::debug!(command = "request_create_at", reason = %rejected, "slot selection rejected");
        }
        Ok(result?)
    }

    pub fn request_create_now(&self, now: DateTime<Utc>) -> Result<OpenEditor, EngineError> {
        Ok(self.controller()?.request_create_now(now))
    }

    /// Opens the parent of `occurrence` for editing.
    pub fn open_occurrence(&self, occurrence: &Occurrence) -> Result<OpenEditor, EngineError> {
        let parent = match occurrence.parent_id.as_deref() {
            Some(parent_id) => self.get(parent_id)?,
            None => None,
        };
        let result = self
            .controller()?
            .open_occurrence(occurrence, parent.as_ref());
        if let Err(rejected) = &result {
            tracing::debug!(command = "open_occurrence", reason = %rejected, "occurrence has no parent");
        }
        Ok(result?)
    }

    pub fn draft_defaults(&self) -> DraftDefaults {
        DraftDefaults {
            color_tag: self.config.default_color_tag.clone(),
            recurrence_rule: None,
        }
    }

    /// A rule with the configured horizon for `frequency`.
    pub fn recurrence_rule(&self, frequency: Frequency) -> RecurrenceRule {
        RecurrenceRule::with_default_horizon(frequency, &self.config.recurrence)
    }

    async fn create(&self, item: ScheduledItem) -> Result<ScheduledItem, EngineError> {
        self.expander.validate_rule(&item)?;
        let token = self.access_token()?;
        self.sync.create(&token, item).await
    }

    async fn update_item(&self, item: ScheduledItem) -> Result<ScheduledItem, EngineError> {
        self.expander.validate_rule(&item)?;
        let token = self.access_token()?;
        self.sync.update(&token, item).await
    }

    async fn remove_item(&self, item_id: &str) -> Result<TransitionPlan, EngineError> {
        let current = self.find(item_id)?;
        let plan = plan_transition(&current, Transition::Remove)?;
        tracing::debug!(
            command = "remove",
            item_id,
            from = plan.from.as_str(),
            to = plan.to.as_str(),
            "transition planned"
        );
        let token = self.access_token()?;
        self.sync.delete(&token, item_id).await?;
        Ok(plan)
    }

    async fn toggle(
        &self,
        item_id: &str,
        transition: Transition,
    ) -> Result<ScheduledItem, EngineError> {
        let current = self.find(item_id)?;
        let plan = plan_transition(&current, transition)?;
        if plan.is_noop() {
            tracing::debug!(
                command = transition.as_str(),
                item_id,
                state = plan.from.as_str(),
                "transition is a no-op"
            );
            return Ok(current);
        }

        let mut next = current;
        apply_plan(&mut next, &plan);
        let token = self.access_token()?;
        self.sync.toggle_completion(&token, next).await
    }

    fn find(&self, item_id: &str) -> Result<ScheduledItem, EngineError> {
        self.get(item_id)?
            .ok_or_else(|| EngineError::ItemNotFound(item_id.trim().to_string()))
    }

    fn access_token(&self) -> Result<String, EngineError> {
        self.access_token
            .lock()
            .map(|token| token.clone())
            .map_err(|_| EngineError::Store("credential lock poisoned".to_string()))
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, ItemStore>, EngineError> {
        self.store
            .lock()
            .map_err(|_| EngineError::Store("item store lock poisoned".to_string()))
    }

    fn controller(&self) -> Result<MutexGuard<'_, InteractionController>, EngineError> {
        self.controller
            .lock()
            .map_err(|_| EngineError::Store("view controller lock poisoned".to_string()))
    }
}

fn finish<T>(command: &str, result: Result<T, EngineError>) -> Result<T, EngineError> {
    match &result {
        Ok(_) => tracing::debug!(command, "command completed"),
        Err(error) => tracing::error!(command, error = %error, "command failed"),
    }
    result
}
