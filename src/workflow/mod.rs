//! Survey workflow control
//!
//! The controller walks a respondent through the pages of a study:
//!
//! ```text
//! NotStarted --load--> InProgress --next_page (last page)--> Completed
//!                        |    ^          \--finish_survey---/
//!                        \----/ next_page
//! ```
//!
//! `next_page` is strictly sequenced: validate, queue durably, transmit,
//! advance. A failed transmission does not hold the respondent back, since
//! the response is already stored locally.

pub mod context;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use context::{coerce_index, WorkflowContext, CONTEXT_KEYS};

use crate::config::SurveyConfig;
use crate::deadline::{bounded, Interrupted};
use crate::form::RenderedForm;
use crate::queue::{QueueError, ResponseQueue};
use crate::storage::{Storage, StorageError};
use crate::transport::Transport;
use crate::validation::{Responses, ValidationEngine};

/// Error types for workflow transitions
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error("Workflow has not been loaded")]
    NotLoaded,

    #[error("Survey already completed")]
    AlreadyCompleted,
}

/// Lifecycle of a survey for one respondent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowState {
    NotStarted,
    InProgress,
    Completed,
}

/// What the page should do after `next_page`
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    /// Validation failed; scroll to the first invalid question
    Rejected { first_error: Option<String> },

    /// Designer mode: the responses validated but nothing was stored
    Previewed(Responses),

    /// Navigate to the next page
    Advanced { url: String, delivered: bool },

    /// The last page was submitted and the survey is over
    Completed { delivered: bool },
}

/// The control that triggered a transition (a "Next" or "Finish" button)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Trigger {
    disabled: bool,
    hidden: bool,
}

impl Trigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn enable(&mut self) {
        self.disabled = false;
    }

    pub fn hide(&mut self) {
        self.hidden = true;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }
}

/// Drives a respondent through a study
pub struct WorkflowController {
    config: SurveyConfig,
    storage: Arc<dyn Storage>,
    engine: ValidationEngine,
    queue: ResponseQueue,
    context: WorkflowContext,
    state: WorkflowState,

    /// Whether the most recent transmission reached the server
    delivered: bool,

    cancel: CancellationToken,
}

impl WorkflowController {
    pub fn new(
        config: SurveyConfig,
        storage: Arc<dyn Storage>,
        transport: Arc<dyn Transport>,
        engine: ValidationEngine,
    ) -> Self {
        let cancel = CancellationToken::new();
        let queue = ResponseQueue::new(storage.clone(), transport, &config, cancel.child_token());

        Self {
            config,
            storage,
            engine,
            queue,
            context: WorkflowContext::default(),
            state: WorkflowState::NotStarted,
            delivered: false,
            cancel,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.context
    }

    pub fn engine(&self) -> &ValidationEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ValidationEngine {
        &mut self.engine
    }

    pub fn queue(&self) -> &ResponseQueue {
        &self.queue
    }

    /// Abort any in-flight transition at its next I/O boundary.
    ///
    /// A cancelled controller stays cancelled; later transitions fail with
    /// [`Interrupted::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    async fn store_get(&self, key: &str) -> Result<Option<Value>, WorkflowError> {
        Ok(bounded(
            "storage read",
            self.config.storage_timeout(),
            &self.cancel,
            self.storage.get(key),
        )
        .await??)
    }

    async fn store_set(&self, key: &str, value: Value) -> Result<(), WorkflowError> {
        bounded(
            "storage write",
            self.config.storage_timeout(),
            &self.cancel,
            self.storage.set(key, value),
        )
        .await??;
        Ok(())
    }

    /// Restore the queue and the persisted context when a page loads.
    ///
    /// A missing context is replaced by defaults. A stored completion flag
    /// puts the controller straight into `Completed`.
    pub async fn load(&mut self) -> Result<WorkflowState, WorkflowError> {
        if self.config.designer_mode {
            return Ok(self.state);
        }

        if let Err(e) = self.queue.rehydrate().await {
            log::error!("Survana.Queue: {}", e);
        }

        let mut stored = Vec::with_capacity(CONTEXT_KEYS.len());
        for key in CONTEXT_KEYS {
            match self.store_get(key).await {
                Ok(value) => stored.push((key, value)),
                Err(e) => {
                    log::error!("Failed to load workflow context: {}", e);
                    return Err(e);
                }
            }
        }

        let context = WorkflowContext::from_stored(|key| {
            stored
                .iter()
                .find(|(k, _)| *k == key)
                .and_then(|(_, v)| v.as_ref())
        });

        self.state = if context.completed {
            WorkflowState::Completed
        } else {
            WorkflowState::InProgress
        };
        self.context = context;

        log::info!(
            "Workflow loaded: page {} of {} ({:?})",
            self.context.current + 1,
            self.context.workflow.len(),
            self.state
        );
        Ok(self.state)
    }

    /// Persist a fresh context for a new study
    pub async fn start_study(
        &mut self,
        workflow: Vec<String>,
        store_url: Option<String>,
    ) -> Result<(), WorkflowError> {
        if self.config.designer_mode {
            return Ok(());
        }

        let context = WorkflowContext::new(workflow, store_url);
        for (key, value) in context.to_stored() {
            self.store_set(key, value).await?;
        }

        log::info!("Study started with {} pages", context.workflow.len());
        self.context = context;
        self.state = WorkflowState::InProgress;
        self.delivered = false;
        Ok(())
    }

    /// Validate the current page and move on.
    ///
    /// The trigger is disabled while the transition runs and re-enabled
    /// whenever the respondent stays on the page.
    pub async fn next_page(
        &mut self,
        form: &mut RenderedForm,
        trigger: &mut Trigger,
    ) -> Result<Transition, WorkflowError> {
        trigger.disable();

        let Some(responses) = self.engine.validate_form(form).into_responses() else {
            trigger.enable();
            return Ok(Transition::Rejected {
                first_error: form.first_invalid().map(str::to_string),
            });
        };

        if self.config.designer_mode {
            trigger.enable();
            return Ok(Transition::Previewed(responses));
        }

        let result = self.submit(&responses).await;
        if result.is_err() {
            trigger.enable();
        }
        result
    }

    async fn submit(&mut self, responses: &Responses) -> Result<Transition, WorkflowError> {
        match self.state {
            WorkflowState::NotStarted => return Err(WorkflowError::NotLoaded),
            WorkflowState::Completed => return Err(WorkflowError::AlreadyCompleted),
            WorkflowState::InProgress => {}
        }

        if let Err(e) = self.queue.add(responses).await {
            log::error!("Failed to queue response: {}", e);
            return Err(e.into());
        }

        let delivered = match self.context.store_url.clone() {
            Some(url) => match self.queue.send(&url).await {
                Ok(()) => true,
                Err(QueueError::Interrupted(Interrupted::Cancelled(op))) => {
                    return Err(Interrupted::Cancelled(op).into())
                }
                // Already stored locally
                Err(e) => {
                    log::warn!("Failed to send queue, advancing anyway: {}", e);
                    false
                }
            },
            None => {
                log::warn!("No store-url configured; responses stay queued");
                false
            }
        };
        self.delivered = delivered;

        let next = self.context.current + 1;
        if next >= self.context.workflow.len() {
            self.finish().await?;
            return Ok(Transition::Completed { delivered });
        }

        self.store_set(context::CURRENT_KEY, Value::from(next)).await?;
        self.context.current = next;

        let url = self.context.workflow[next].clone();
        log::info!("Advancing to page {}: {}", next + 1, url);
        Ok(Transition::Advanced { url, delivered })
    }

    /// End the survey: remove the stored context and record completion.
    ///
    /// Safe to call more than once.
    pub async fn finish_survey(&mut self, trigger: Option<&mut Trigger>) -> Result<(), WorkflowError> {
        if self.config.designer_mode {
            return Ok(());
        }

        if let Some(trigger) = trigger {
            trigger.disable();
            trigger.hide();
        }

        self.finish().await
    }

    async fn finish(&mut self) -> Result<(), WorkflowError> {
        bounded(
            "storage remove",
            self.config.storage_timeout(),
            &self.cancel,
            self.storage.remove_all(&CONTEXT_KEYS),
        )
        .await??;

        self.store_set(context::COMPLETED_KEY, Value::Bool(true)).await?;

        if self.delivered && !self.queue.is_empty() {
            if let Err(e) = self.queue.clear().await {
                log::warn!("Failed to clear delivered responses: {}", e);
            }
        }

        self.context = WorkflowContext {
            completed: true,
            ..WorkflowContext::default()
        };
        self.state = WorkflowState::Completed;
        log::info!("Survey completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::Control;
    use crate::schema::{Field, FieldKind, Schema};
    use crate::storage::MemoryStorage;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        posts: Mutex<usize>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn post_json(&self, _url: &str, _payload: &Value) -> Result<(), TransportError> {
            *self.posts.lock().unwrap() += 1;
            if self.fail {
                Err(TransportError::RequestFailed("offline".into()))
            } else {
                Ok(())
            }
        }
    }

    fn engine() -> ValidationEngine {
        let mut engine = ValidationEngine::new();
        for page in ["p1", "p2"] {
            engine.register_schema(
                page,
                Schema::new(vec![Field::new("age", FieldKind::Number)
                    .with_validation(json!({"optional": false, "min": 18}))])
                .unwrap(),
            );
        }
        engine
    }

    fn page(id: &str, age: &str) -> RenderedForm {
        RenderedForm::new(id).with(Control::number("age", age))
    }

    async fn started(
        storage: Arc<MemoryStorage>,
        transport: Arc<FakeTransport>,
    ) -> WorkflowController {
        let mut controller =
            WorkflowController::new(SurveyConfig::default(), storage, transport, engine());
        controller.load().await.unwrap();
        controller
            .start_study(
                vec!["/p1".into(), "/p2".into()],
                Some("https://example.org/store".into()),
            )
            .await
            .unwrap();
        controller
    }

    #[tokio::test]
    async fn test_load_without_context_uses_defaults() {
        let storage = Arc::new(MemoryStorage::new());
        let mut controller = WorkflowController::new(
            SurveyConfig::default(),
            storage,
            Arc::new(FakeTransport::default()),
            engine(),
        );
        assert_eq!(controller.state(), WorkflowState::NotStarted);
        assert_eq!(controller.load().await.unwrap(), WorkflowState::InProgress);
        assert_eq!(controller.context().current, 0);
        assert!(!controller.context().completed);
    }

    #[tokio::test]
    async fn test_load_coerces_current() {
        let storage = Arc::new(MemoryStorage::with_entries([
            ("workflow", json!(["/p1", "/p2", "/p3"])),
            ("current", json!("2")),
        ]));
        let mut controller = WorkflowController::new(
            SurveyConfig::default(),
            storage,
            Arc::new(FakeTransport::default()),
            engine(),
        );
        controller.load().await.unwrap();
        assert_eq!(controller.context().current, 2);
    }

    #[tokio::test]
    async fn test_invalid_page_stays_put() {
        let storage = Arc::new(MemoryStorage::new());
        let mut controller = started(storage.clone(), Arc::new(FakeTransport::default())).await;

        let mut form = page("p1", "12");
        let mut trigger = Trigger::new();
        let transition = controller.next_page(&mut form, &mut trigger).await.unwrap();

        assert_eq!(
            transition,
            Transition::Rejected {
                first_error: Some("age".into())
            }
        );
        assert!(!trigger.is_disabled());
        assert_eq!(controller.context().current, 0);
        assert!(controller.queue().is_empty());
    }

    #[tokio::test]
    async fn test_valid_page_advances() {
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(FakeTransport::default());
        let mut controller = started(storage.clone(), transport.clone()).await;

        let mut trigger = Trigger::new();
        let transition = controller
            .next_page(&mut page("p1", "30"), &mut trigger)
            .await
            .unwrap();

        assert_eq!(
            transition,
            Transition::Advanced {
                url: "/p2".into(),
                delivered: true
            }
        );
        assert!(trigger.is_disabled());
        assert_eq!(*transport.posts.lock().unwrap(), 1);
        assert_eq!(storage.get("current").await.unwrap(), Some(json!(1)));
        assert_eq!(storage.all_with_prefix("response").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_still_advances() {
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(FakeTransport {
            fail: true,
            ..Default::default()
        });
        let mut controller = started(storage.clone(), transport).await;

        let transition = controller
            .next_page(&mut page("p1", "30"), &mut Trigger::new())
            .await
            .unwrap();
        assert_eq!(
            transition,
            Transition::Advanced {
                url: "/p2".into(),
                delivered: false
            }
        );
        assert_eq!(controller.queue().len(), 1);
    }

    #[tokio::test]
    async fn test_last_page_completes() {
        let storage = Arc::new(MemoryStorage::new());
        let mut controller = started(storage.clone(), Arc::new(FakeTransport::default())).await;

        controller
            .next_page(&mut page("p1", "30"), &mut Trigger::new())
            .await
            .unwrap();
        let transition = controller
            .next_page(&mut page("p2", "31"), &mut Trigger::new())
            .await
            .unwrap();

        assert_eq!(transition, Transition::Completed { delivered: true });
        assert_eq!(controller.state(), WorkflowState::Completed);

        let left = storage.snapshot().await;
        assert_eq!(left.len(), 1);
        assert_eq!(left.get("completed"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_undelivered_responses_survive_completion() {
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(FakeTransport {
            fail: true,
            ..Default::default()
        });
        let mut controller = started(storage.clone(), transport).await;

        controller
            .next_page(&mut page("p1", "30"), &mut Trigger::new())
            .await
            .unwrap();
        controller
            .next_page(&mut page("p2", "31"), &mut Trigger::new())
            .await
            .unwrap();

        assert_eq!(storage.all_with_prefix("response").await.unwrap().len(), 2);
        assert_eq!(storage.get("workflow").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_finish_survey_is_idempotent() {
        let storage = Arc::new(MemoryStorage::new());
        let mut controller = started(storage.clone(), Arc::new(FakeTransport::default())).await;

        let mut trigger = Trigger::new();
        controller.finish_survey(Some(&mut trigger)).await.unwrap();
        controller.finish_survey(None).await.unwrap();

        assert!(trigger.is_disabled() && trigger.is_hidden());
        let left = storage.snapshot().await;
        assert_eq!(left.keys().collect::<Vec<_>>(), vec!["completed"]);

        let mut reloaded = WorkflowController::new(
            SurveyConfig::default(),
            storage,
            Arc::new(FakeTransport::default()),
            engine(),
        );
        assert_eq!(reloaded.load().await.unwrap(), WorkflowState::Completed);
    }

    #[tokio::test]
    async fn test_next_page_requires_load() {
        let mut controller = WorkflowController::new(
            SurveyConfig::default(),
            Arc::new(MemoryStorage::new()),
            Arc::new(FakeTransport::default()),
            engine(),
        );
        let mut trigger = Trigger::new();
        let result = controller.next_page(&mut page("p1", "30"), &mut trigger).await;
        assert!(matches!(result, Err(WorkflowError::NotLoaded)));
        assert!(!trigger.is_disabled());
    }

    #[tokio::test]
    async fn test_designer_mode_only_validates() {
        let storage = Arc::new(MemoryStorage::new());
        let mut controller = WorkflowController::new(
            SurveyConfig::designer(),
            storage.clone(),
            Arc::new(FakeTransport::default()),
            engine(),
        );
        controller.load().await.unwrap();

        let transition = controller
            .next_page(&mut page("p1", "30"), &mut Trigger::new())
            .await
            .unwrap();
        assert!(matches!(transition, Transition::Previewed(r) if r["age"] == vec!["30".to_string()]));

        controller.finish_survey(None).await.unwrap();
        assert!(storage.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_transition_leaves_context() {
        let storage = Arc::new(MemoryStorage::new());
        let mut controller = started(storage.clone(), Arc::new(FakeTransport::default())).await;
        controller.cancel();

        let mut trigger = Trigger::new();
        let result = controller.next_page(&mut page("p1", "30"), &mut trigger).await;
        assert!(result.is_err());
        assert!(!trigger.is_disabled());
        assert_eq!(controller.context().current, 0);
        assert_eq!(storage.get("current").await.unwrap(), Some(json!(0)));
    }
}
