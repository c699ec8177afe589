//! rescuenet-core - agent messaging protocol and task coordination
//!
//! Wire message types, disaster and task models, the priority policy, the
//! coordination engine, the per-agent runtime with its role behaviours and
//! the supervisor that runs agents as tokio tasks.

pub mod agent;
pub mod disaster;
pub mod engine;
pub mod error;
pub mod priority;
pub mod roles;
pub mod supervisor;
pub mod task;
pub mod transport;
pub mod types;

pub use agent::{
    AgentContext, AgentReport, AgentRuntime, AgentState, MessageStats, RuntimeConfig, mailbox,
};
pub use disaster::{DisasterEvent, DisasterType, ResourceType, Severity};
pub use engine::{
    Assessment, Assignment, Completion, CoordinationEngine, EngineConfig, EngineStatus,
};
pub use error::{ParseError, ParseResult};
pub use priority::PriorityPolicy;
pub use roles::{Role, RoleBehaviour};
pub use supervisor::AgentSupervisor;
pub use task::{CompletionReport, Task, TaskKind, TaskStatus, TaskType};
pub use transport::MessageTransport;
pub use types::{AclMessage, Content, Performative, into_content, ontology};
