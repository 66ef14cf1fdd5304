//! Drives one intent through search, filtering, selection and checkout.
//!
//! The orchestrator owns the [`TaskState`] and is the only thing that mutates
//! it. Every page or model call runs under a phase timeout and is checked
//! against the task's `(tab_id, generation)` when it resolves; a result from
//! a cancelled task is discarded and the task ends [`TaskOutcome::Cancelled`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cartpilot_core::{parse_intent, AppConfig, CheckoutMode, Intent, Product, ProductDetails};
use cartpilot_extract::filter_products;
use cartpilot_filters::retain_satisfying;
use cartpilot_llm::{build_decision_prompt, parse_decision, Decision, LanguageModel, SYSTEM_INSTRUCTION};
use serde::Serialize;
use uuid::Uuid;

use crate::adapter::PlatformAdapter;
use crate::ranking::rank_products;
use crate::state::{PhaseTransition, TaskState, TaskStatus};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Attempts at starting a search.
    pub search_budget: u32,
    /// Attempts at opening a product page.
    pub selection_budget: u32,
    /// Attempts at buy-now or add-to-cart, shared across candidate controls.
    pub checkout_budget: u32,
    /// Rounds of asking the language model.
    pub escalation_budget: u32,
    pub action_timeout: Duration,
    /// One language-model call, including the client's own retries.
    pub llm_timeout: Duration,
    /// Filter application waits on several page reloads.
    pub filter_timeout: Duration,
    /// Pause between checkout attempts.
    pub retry_delay: Duration,
    pub snapshot_max_products: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            search_budget: 2,
            selection_budget: 3,
            checkout_budget: 3,
            escalation_budget: 3,
            action_timeout: Duration::from_millis(15_000),
            llm_timeout: Duration::from_millis(106_000),
            filter_timeout: Duration::from_millis(60_000),
            retry_delay: Duration::from_millis(500),
            snapshot_max_products: 20,
        }
    }
}

impl OrchestratorSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            action_timeout: Duration::from_millis(config.action_timeout_ms),
            llm_timeout: config.llm_call_budget(),
            filter_timeout: Duration::from_millis(config.action_timeout_ms.saturating_mul(4)),
            retry_delay: Duration::from_millis(config.retry_initial_delay_ms),
            snapshot_max_products: config.snapshot_max_products,
            ..Self::default()
        }
    }
}

/// Cancels whatever task the orchestrator is running.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    generation: Arc<AtomicU64>,
}

impl CancelHandle {
    /// Invalidates the running task. Results that arrive afterwards are
    /// discarded.
    pub fn cancel(&self) {
        let previous = self.generation.fetch_add(1, Ordering::SeqCst);
        tracing::info!(generation = previous + 1, "task cancelled");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidIntent,
    SearchFailed,
    NoResults,
    SelectionFailed,
    ManualInterventionRequired,
    ModelGaveUp,
    InvalidTransition,
}

impl FailureReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::InvalidIntent => "invalid intent",
            FailureReason::SearchFailed => "search failed",
            FailureReason::NoResults => "no usable results",
            FailureReason::SelectionFailed => "could not open a product",
            FailureReason::ManualInterventionRequired => "manual intervention required",
            FailureReason::ModelGaveUp => "language model gave up",
            FailureReason::InvalidTransition => "invalid phase transition",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller gets back from a task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task_id: Uuid,
    pub status: TaskOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub product: Option<Product>,
    pub details: Option<ProductDetails>,
    pub history: Vec<PhaseTransition>,
}

/// Why a task stopped early.
#[derive(Debug)]
enum Halt {
    Cancelled,
    Failed { reason: FailureReason, detail: String },
}

impl Halt {
    fn failed(reason: FailureReason, detail: impl Into<String>) -> Self {
        Halt::Failed {
            reason,
            detail: detail.into(),
        }
    }
}

/// Identity a pending result must still match when it resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    tab_id: u64,
    generation: u64,
}

#[derive(Debug, Default)]
struct Progress {
    product: Option<Product>,
    details: Option<ProductDetails>,
}

pub struct Orchestrator<A> {
    adapter: A,
    llm: Option<Arc<dyn LanguageModel>>,
    settings: OrchestratorSettings,
    tab_id: u64,
    generation: Arc<AtomicU64>,
    state: TaskState,
}

impl<A: PlatformAdapter> Orchestrator<A> {
    pub fn new(adapter: A, settings: OrchestratorSettings) -> Self {
        Self {
            adapter,
            llm: None,
            settings,
            tab_id: 0,
            generation: Arc::new(AtomicU64::new(0)),
            state: TaskState::default(),
        }
    }

    /// Enables escalation to `llm` when deterministic selection finds
    /// nothing.
    #[must_use]
    pub fn with_language_model(mut self, llm: Arc<dyn LanguageModel>) -> Self {
        self.llm = Some(llm);
        self
    }

    #[must_use]
    pub fn with_tab_id(mut self, tab_id: u64) -> Self {
        self.tab_id = tab_id;
        self
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            generation: Arc::clone(&self.generation),
        }
    }

    #[must_use]
    pub fn state(&self) -> &TaskState {
        &self.state
    }

    #[must_use]
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Parses `text` into an intent and runs it.
    pub async fn run_text(&mut self, text: &str) -> TaskReport {
        if let Err(report) = self.start() {
            return report;
        }
        match parse_intent(text) {
            Ok(intent) => self.fulfil(intent).await,
            Err(err) => self.finish(
                Err(Halt::failed(FailureReason::InvalidIntent, err.to_string())),
                Progress::default(),
            ),
        }
    }

    /// Runs `intent` to completion, failure or cancellation. The state is
    /// back at `Idle` when this returns.
    pub async fn run(&mut self, intent: Intent) -> TaskReport {
        if let Err(report) = self.start() {
            return report;
        }
        self.fulfil(intent).await
    }

    fn start(&mut self) -> Result<(), TaskReport> {
        let generation = self.generation.load(Ordering::SeqCst);
        self.state.begin(self.tab_id, generation).map_err(|err| {
            tracing::warn!(error = %err, "task already running");
            TaskReport {
                task_id: self.state.id,
                status: TaskOutcome::Failed,
                reason: Some(FailureReason::InvalidTransition),
                detail: Some(err.to_string()),
                product: None,
                details: None,
                history: Vec::new(),
            }
        })
    }

    async fn fulfil(&mut self, intent: Intent) -> TaskReport {
        tracing::info!(
            task_id = %self.state.id,
            query = %intent.product_query,
            filters = intent.filters.len(),
            checkout = ?intent.checkout,
            "task started"
        );
        self.state.intent = Some(intent.clone());
        let mut progress = Progress::default();
        let result = self.drive(&intent, &mut progress).await;
        self.finish(result, progress)
    }

    fn finish(&mut self, result: Result<(), Halt>, progress: Progress) -> TaskReport {
        let (status, reason, detail) = match result {
            Ok(()) => (TaskOutcome::Completed, None, None),
            Err(Halt::Cancelled) => (TaskOutcome::Cancelled, None, None),
            Err(Halt::Failed { reason, detail }) => {
                if let Err(err) = self.state.transition(TaskStatus::Failed, Some(detail.clone())) {
                    tracing::warn!(error = %err, "could not record failure");
                }
                (TaskOutcome::Failed, Some(reason), Some(detail))
            }
        };
        let finished = self.state.reset();
        tracing::info!(task_id = %finished.id, status = ?status, reason = ?reason, "task finished");
        TaskReport {
            task_id: finished.id,
            status,
            reason,
            detail,
            product: progress.product,
            details: progress.details,
            history: finished.history,
        }
    }

    fn ticket(&self) -> Ticket {
        Ticket {
            tab_id: self.state.tab_id,
            generation: self.state.generation,
        }
    }

    fn current(&self) -> Ticket {
        Ticket {
            tab_id: self.tab_id,
            generation: self.generation.load(Ordering::SeqCst),
        }
    }

    /// Awaits `action` under `timeout`. `Ok(None)` means it timed out; a
    /// result for a task that is no longer current is dropped.
    async fn guard<T>(&self, timeout: Duration, action: impl Future<Output = T>) -> Result<Option<T>, Halt> {
        let ticket = self.ticket();
        if self.current() != ticket {
            return Err(Halt::Cancelled);
        }
        let outcome = tokio::time::timeout(timeout, action).await.ok();
        if self.current() != ticket {
            tracing::info!(task_id = %self.state.id, "discarding result of a cancelled task");
            return Err(Halt::Cancelled);
        }
        if outcome.is_none() {
            tracing::warn!(phase = %self.state.status, timeout_ms = ?timeout.as_millis(), "action timed out");
        }
        Ok(outcome)
    }

    fn advance(&mut self, next: TaskStatus, note: Option<String>) -> Result<(), Halt> {
        if self.current() != self.ticket() {
            return Err(Halt::Cancelled);
        }
        self.state
            .transition(next, note)
            .map_err(|err| Halt::failed(FailureReason::InvalidTransition, err.to_string()))
    }

    async fn drive(&mut self, intent: &Intent, progress: &mut Progress) -> Result<(), Halt> {
        self.advance(TaskStatus::Searching, None)?;
        let mut products = self.search(intent).await?;

        let mut note = None;
        if intent.has_filters() {
            let (kept, total) = self.filter(intent, products).await?;
            note = Some(format!("{} of {total} products satisfy the filters", kept.len()));
            products = kept;
        }

        self.advance(TaskStatus::SelectingProduct, note)?;
        progress.product = self.select(intent, products).await?;

        self.advance(TaskStatus::ProductPage, None)?;
        match self.guard(self.settings.action_timeout, self.adapter.product_details()).await? {
            Some(Ok(details)) => {
                tracing::info!(title = %details.title, price = %details.price, url = %details.url, "on product page");
                progress.details = Some(details);
            }
            Some(Err(err)) => tracing::warn!(error = %err, "could not read product details"),
            None => {}
        }

        self.checkout(intent.checkout).await
    }

    async fn search(&mut self, intent: &Intent) -> Result<Vec<Product>, Halt> {
        let timeout = self.settings.action_timeout;
        loop {
            let attempt = self.state.record_attempt(TaskStatus::Searching);
            let started = self
                .guard(
                    timeout,
                    self.adapter
                        .search(&intent.product_query, &intent.filters, intent.sort),
                )
                .await?;
            if started == Some(true) {
                let products = self
                    .guard(timeout, self.adapter.search_results())
                    .await?
                    .unwrap_or_default();
                tracing::info!(attempt, products = products.len(), "search results extracted");
                return Ok(products);
            }
            tracing::warn!(attempt, budget = self.settings.search_budget, "search attempt failed");
            if attempt >= self.settings.search_budget {
                return Err(Halt::failed(
                    FailureReason::SearchFailed,
                    format!("search did not start after {attempt} attempts"),
                ));
            }
        }
    }

    /// Best-effort: whatever happens, the task moves on with the products
    /// that satisfy the filters on the page as it now is. Also returns how
    /// many products were checked.
    async fn filter(&mut self, intent: &Intent, unfiltered: Vec<Product>) -> Result<(Vec<Product>, usize), Halt> {
        self.advance(TaskStatus::ApplyingFilters, None)?;
        let applied = self
            .guard(self.settings.filter_timeout, self.adapter.apply_filters(&intent.filters))
            .await?
            .unwrap_or(false);
        let note = if applied {
            "filters applied on the site"
        } else {
            tracing::warn!("filters only partly applied, relying on attribute check");
            "filters partly applied on the site"
        };

        self.advance(TaskStatus::VerifyingFilters, Some(note.to_owned()))?;
        let fresh = self
            .guard(self.settings.action_timeout, self.adapter.search_results())
            .await?
            .unwrap_or_default();
        let listed = if fresh.is_empty() { unfiltered } else { fresh };
        let total = listed.len();
        let kept = retain_satisfying(listed, &intent.filters);
        tracing::info!(applied, kept = kept.len(), total, "filters verified");
        Ok((kept, total))
    }

    async fn select(&mut self, intent: &Intent, products: Vec<Product>) -> Result<Option<Product>, Halt> {
        let partition = filter_products(products);
        let candidates = rank_products(&intent.product_query, partition.valid);
        if !candidates.is_empty() {
            return self.open_first(candidates).await.map(Some);
        }

        tracing::info!(
            sponsored = partition.sponsored.len(),
            out_of_stock = partition.out_of_stock.len(),
            "no usable products, escalating"
        );
        if self.llm.is_some() {
            return self.escalate(intent).await;
        }
        let sponsored: Vec<Product> = partition
            .sponsored
            .into_iter()
            .filter(Product::is_purchasable)
            .collect();
        if sponsored.is_empty() {
            return Err(Halt::failed(
                FailureReason::NoResults,
                "no usable products and no language model configured",
            ));
        }
        tracing::info!(count = sponsored.len(), "falling back to sponsored products");
        let candidates = rank_products(&intent.product_query, sponsored);
        self.open_first(candidates).await.map(Some)
    }

    /// Opens the best candidate that still appears on the page, spending the
    /// selection budget.
    async fn open_first(&mut self, candidates: Vec<Product>) -> Result<Product, Halt> {
        let timeout = self.settings.action_timeout;
        let mut last_error = String::from("no candidate could be opened");
        for candidate in candidates {
            let attempt = self.state.record_attempt(TaskStatus::SelectingProduct);
            if attempt > self.settings.selection_budget {
                break;
            }
            let listed = self
                .guard(timeout, self.adapter.search_results())
                .await?
                .unwrap_or_default();
            let Some(index) = listed.iter().position(|p| p.link == candidate.link) else {
                tracing::warn!(attempt, link = %candidate.link, "candidate no longer on the page");
                last_error = format!("'{}' is no longer listed", candidate.title);
                continue;
            };
            match self.guard(timeout, self.adapter.select_product(index)).await? {
                Some(Ok(product)) => {
                    tracing::info!(attempt, index, title = %product.title, "product selected");
                    return Ok(product);
                }
                Some(Err(err)) => {
                    tracing::warn!(attempt, index, error = %err, "product selection failed");
                    last_error = err.to_string();
                }
                None => last_error = format!("opening '{}' timed out", candidate.title),
            }
        }
        Err(Halt::failed(FailureReason::SelectionFailed, last_error))
    }

    /// Asks the language model what to do until it picks a product, declares
    /// the current page done, gives up, or the budget runs out.
    async fn escalate(&mut self, intent: &Intent) -> Result<Option<Product>, Halt> {
        let Some(llm) = self.llm.clone() else {
            return Err(Halt::failed(FailureReason::NoResults, "no language model configured"));
        };
        let timeout = self.settings.action_timeout;
        let phase = self.state.status.as_str();

        for round in 1..=self.settings.escalation_budget {
            let snapshot = match self
                .guard(timeout, self.adapter.page_snapshot(self.settings.snapshot_max_products))
                .await?
            {
                Some(Ok(snapshot)) => snapshot,
                Some(Err(err)) => {
                    tracing::warn!(round, error = %err, "could not capture page snapshot");
                    continue;
                }
                None => continue,
            };
            let prompt = build_decision_prompt(&snapshot, intent, phase);
            let text = match self
                .guard(self.settings.llm_timeout, llm.generate_content(&prompt, SYSTEM_INSTRUCTION))
                .await?
            {
                Some(Ok(text)) => text,
                Some(Err(err)) => {
                    tracing::warn!(round, error = %err, "decision unavailable");
                    continue;
                }
                None => continue,
            };
            let decision = match parse_decision(&text) {
                Ok(decision) => decision,
                Err(err) => {
                    tracing::warn!(round, error = %err, "decision unavailable");
                    continue;
                }
            };
            tracing::info!(round, decision = ?decision.decision, reasoning = ?decision.reasoning, "model decision");

            match decision.decision {
                Decision::SelectProduct { index } => {
                    match self.guard(timeout, self.adapter.select_product(index)).await? {
                        Some(Ok(product)) => return Ok(Some(product)),
                        Some(Err(err)) => tracing::warn!(round, index, error = %err, "model picked an unusable product"),
                        None => {}
                    }
                }
                Decision::Click { selector } => {
                    match self.guard(timeout, self.adapter.click(&selector)).await? {
                        Some(Ok(())) => {
                            if let Some(product) = self.resume_selection(intent).await? {
                                return Ok(Some(product));
                            }
                        }
                        Some(Err(err)) => tracing::warn!(round, selector = %selector, error = %err, "model click failed"),
                        None => {}
                    }
                }
                Decision::Input { selector, value } => {
                    match self.guard(timeout, self.adapter.input(&selector, &value)).await? {
                        Some(Ok(())) => {
                            if let Some(product) = self.resume_selection(intent).await? {
                                return Ok(Some(product));
                            }
                        }
                        Some(Err(err)) => tracing::warn!(round, selector = %selector, error = %err, "model input failed"),
                        None => {}
                    }
                }
                Decision::Completed => {
                    tracing::info!(round, "model reports the product page is open");
                    return Ok(None);
                }
                Decision::Error { message } => {
                    return Err(Halt::failed(FailureReason::ModelGaveUp, message));
                }
            }
        }
        Err(Halt::failed(
            FailureReason::NoResults,
            format!(
                "no product found after {} language model rounds",
                self.settings.escalation_budget
            ),
        ))
    }

    /// Re-extracts after a model-driven action. Opens a product when the page
    /// now lists usable ones.
    async fn resume_selection(&mut self, intent: &Intent) -> Result<Option<Product>, Halt> {
        let products = self
            .guard(self.settings.action_timeout, self.adapter.search_results())
            .await?
            .unwrap_or_default();
        let products = if intent.has_filters() {
            retain_satisfying(products, &intent.filters)
        } else {
            products
        };
        let candidates = rank_products(&intent.product_query, filter_products(products).valid);
        if candidates.is_empty() {
            return Ok(None);
        }
        self.open_first(candidates).await.map(Some)
    }

    async fn checkout(&mut self, mode: CheckoutMode) -> Result<(), Halt> {
        let phase = match mode {
            CheckoutMode::None => {
                return self.advance(TaskStatus::Completed, Some("stopped at product page".to_owned()));
            }
            CheckoutMode::BuyNow => TaskStatus::BuyingNow,
            CheckoutMode::AddToCart => TaskStatus::AddingToCart,
        };
        self.advance(phase, None)?;

        let timeout = self.settings.action_timeout;
        loop {
            let attempt = self.state.record_attempt(phase);
            let clicked = match phase {
                TaskStatus::BuyingNow => self.guard(timeout, self.adapter.buy_now()).await?,
                _ => self.guard(timeout, self.adapter.add_to_cart()).await?,
            };
            let last_error = match clicked {
                Some(Ok(())) => return self.advance(TaskStatus::Completed, None),
                Some(Err(err)) => {
                    tracing::warn!(%phase, attempt, error = %err, "checkout attempt failed");
                    err.to_string()
                }
                None => "checkout control did not respond".to_owned(),
            };
            if attempt >= self.settings.checkout_budget {
                return Err(Halt::failed(
                    FailureReason::ManualInterventionRequired,
                    format!("{phase} failed after {attempt} attempts: {last_error}"),
                ));
            }
            tokio::time::sleep(self.settings.retry_delay).await;
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
