//! Offprobe: Offline Coverage Probe Runtime
//!
//! Runtime bookkeeping for code instrumented ahead of time. Every
//! instrumented unit asks the registry for its probe array and flips flags
//! in it as it executes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    OFFPROBE Architecture                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   instrumented code                                              │
//! │         │ get_probes(id, name, count)                            │
//! │         ▼                                                        │
//! │   ┌────────────┐  Cold    ┌─────────────────┐                    │
//! │   │  Probe     │─────────►│ Bootstrap cache │──┐ migrate once    │
//! │   │  Registry  │          └─────────────────┘  ▼                 │
//! │   │            │  Warm    ┌─────────────────────────┐            │
//! │   │            │─────────►│ Agent / RuntimeData     │──► dump    │
//! │   └────────────┘          └─────────────────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Early in process startup the agent cannot be built yet, so arrays live
//! in a bounded cache. Once the host reports readiness the first request
//! constructs the agent, hands it the cached arrays, and every later
//! request goes straight to the agent's data.

#![warn(missing_docs)]

pub mod agent;
pub mod config;
pub mod global;
pub mod probe;
pub mod readiness;
pub mod registry;
mod result;
pub mod store;

pub use agent::{Agent, AgentFactory, SessionSnapshot};
pub use config::{AgentOptions, ConfigLoader, OutputMode};
pub use global::{get_probes, mark_runtime_ready, shutdown};
pub use probe::{ClassId, ExecutionRecord, ExecutionSnapshot, ProbeArray};
pub use readiness::{AlwaysReady, ReadinessFlag, RuntimeReadiness};
pub use registry::{BootstrapCache, Phase, ProbeRegistry, ProbeRegistryBuilder, DEFAULT_CAPACITY};
pub use result::{ProbeError, ProbeResult};
pub use store::{ProbeStore, RuntimeData, StoreFactory};
