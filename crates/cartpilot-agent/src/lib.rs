//! Task orchestration: the platform adapters, the page-context channel, the
//! task state machine and the orchestrator that sequences them.

pub mod adapter;
pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod ranking;
pub mod snapshot;
pub mod state;

pub use adapter::{storefront, AdapterSettings, PlatformAdapter, StoreAdapter, Storefront};
pub use error::{AdapterError, ProtocolError};
pub use orchestrator::{
    CancelHandle, FailureReason, Orchestrator, OrchestratorSettings, TaskOutcome, TaskReport,
};
pub use protocol::{Envelope, PageCall, PageChannel, PageRequest, PageResponse, ReplyBody};
pub use ranking::rank_products;
pub use snapshot::build_snapshot;
pub use state::{InvalidTransition, PhaseTransition, TaskState, TaskStatus};
