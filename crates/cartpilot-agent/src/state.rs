//! The task state machine.
//!
//! One [`TaskState`] exists per orchestrator. Transitions are checked against
//! the phase graph; `Idle` is reachable only through [`TaskState::reset`].

use std::collections::BTreeMap;

use cartpilot_core::Intent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Idle,
    ParsingIntent,
    Searching,
    ApplyingFilters,
    VerifyingFilters,
    SelectingProduct,
    ProductPage,
    AddingToCart,
    BuyingNow,
    Completed,
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::ParsingIntent => "parsing_intent",
            TaskStatus::Searching => "searching",
            TaskStatus::ApplyingFilters => "applying_filters",
            TaskStatus::VerifyingFilters => "verifying_filters",
            TaskStatus::SelectingProduct => "selecting_product",
            TaskStatus::ProductPage => "product_page",
            TaskStatus::AddingToCart => "adding_to_cart",
            TaskStatus::BuyingNow => "buying_now",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether the phase graph has an edge from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::{
            AddingToCart, ApplyingFilters, BuyingNow, Completed, Failed, Idle, ParsingIntent,
            ProductPage, Searching, SelectingProduct, VerifyingFilters,
        };
        match (self, next) {
            (from, Failed) => !from.is_terminal() && from != Idle,
            (Idle, ParsingIntent)
            | (ParsingIntent, Searching)
            | (Searching, ApplyingFilters | SelectingProduct)
            | (ApplyingFilters, VerifyingFilters)
            | (VerifyingFilters, SelectingProduct)
            | (SelectingProduct, ProductPage)
            | (ProductPage, AddingToCart | BuyingNow | Completed)
            | (AddingToCart | BuyingNow, Completed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    pub id: Uuid,
    /// Cancellation generation this task was started under.
    pub generation: u64,
    pub status: TaskStatus,
    pub tab_id: u64,
    pub intent: Option<Intent>,
    pub retry_counters: BTreeMap<TaskStatus, u32>,
    pub history: Vec<PhaseTransition>,
}

impl Default for TaskState {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            generation: 0,
            status: TaskStatus::Idle,
            tab_id: 0,
            intent: None,
            retry_counters: BTreeMap::new(),
            history: Vec::new(),
        }
    }
}

impl TaskState {
    /// Starts a new task: `Idle -> ParsingIntent` with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] unless the state is `Idle`.
    pub fn begin(&mut self, tab_id: u64, generation: u64) -> Result<(), InvalidTransition> {
        if self.status != TaskStatus::Idle {
            return Err(InvalidTransition {
                from: self.status,
                to: TaskStatus::ParsingIntent,
            });
        }
        *self = Self {
            id: Uuid::new_v4(),
            generation,
            tab_id,
            ..Self::default()
        };
        self.transition(TaskStatus::ParsingIntent, None)
    }

    /// Moves to `next`, recording the transition.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when the phase graph has no such edge.
    pub fn transition(&mut self, next: TaskStatus, note: Option<String>) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        tracing::info!(task_id = %self.id, from = %self.status, to = %next, "phase transition");
        self.history.push(PhaseTransition {
            from: self.status,
            to: next,
            at: Utc::now(),
            note,
        });
        self.status = next;
        Ok(())
    }

    /// Counts one attempt against `phase`'s budget and returns the new total.
    pub fn record_attempt(&mut self, phase: TaskStatus) -> u32 {
        let counter = self.retry_counters.entry(phase).or_insert(0);
        *counter += 1;
        *counter
    }

    #[must_use]
    pub fn attempts(&self, phase: TaskStatus) -> u32 {
        self.retry_counters.get(&phase).copied().unwrap_or(0)
    }

    /// Back to `Idle`, dropping the task. Returns the state as it was.
    pub fn reset(&mut self) -> TaskState {
        std::mem::take(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_valid() {
        let mut state = TaskState::default();
        state.begin(7, 1).unwrap();
        for next in [
            TaskStatus::Searching,
            TaskStatus::ApplyingFilters,
            TaskStatus::VerifyingFilters,
            TaskStatus::SelectingProduct,
            TaskStatus::ProductPage,
            TaskStatus::BuyingNow,
            TaskStatus::Completed,
        ] {
            state.transition(next, None).unwrap();
        }
        assert_eq!(state.history.len(), 8);
        assert_eq!(state.history[0].from, TaskStatus::Idle);
        assert_eq!(state.status, TaskStatus::Completed);
    }

    #[test]
    fn skipping_phases_is_rejected() {
        let mut state = TaskState::default();
        state.begin(1, 1).unwrap();
        assert_eq!(
            state.transition(TaskStatus::ProductPage, None),
            Err(InvalidTransition {
                from: TaskStatus::ParsingIntent,
                to: TaskStatus::ProductPage
            })
        );
        assert!(!TaskStatus::Searching.can_transition_to(TaskStatus::VerifyingFilters));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Idle));
    }

    #[test]
    fn failed_is_reachable_from_any_active_phase() {
        for from in [
            TaskStatus::ParsingIntent,
            TaskStatus::Searching,
            TaskStatus::VerifyingFilters,
            TaskStatus::BuyingNow,
        ] {
            assert!(from.can_transition_to(TaskStatus::Failed), "{from}");
        }
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Idle.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn reset_returns_to_idle_and_begin_requires_idle() {
        let mut state = TaskState::default();
        state.begin(3, 9).unwrap();
        assert!(state.begin(3, 9).is_err());
        assert_eq!(state.record_attempt(TaskStatus::Searching), 1);
        assert_eq!(state.record_attempt(TaskStatus::Searching), 2);

        let finished = state.reset();

        assert_eq!(finished.generation, 9);
        assert_eq!(finished.attempts(TaskStatus::Searching), 2);
        assert_eq!(state.status, TaskStatus::Idle);
        assert!(state.history.is_empty());
    }
}
