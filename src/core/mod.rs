//! 核心编排层：错误分类、状态投影、事件、槽位池与主控循环

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod slots;
pub mod state;

pub use error::AgentError;
pub use events::{UiEvent, WorkerEvent};
pub use orchestrator::{
    create_orchestrator, create_provider_from_config, spawn_orchestrator, Command,
    OrchestratorHandles,
};
pub use slots::{SlotId, WorkerSlotPool, SLOT_COUNT};
pub use state::{AgentPhase, UiState};
