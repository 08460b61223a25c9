//! Process-wide entry point for instrumented code
//!
//! Instrumented units call [`get_probes`] from wherever they run, including
//! static initializers that execute before `main`. Until the host calls
//! [`mark_runtime_ready`] only the registry and its bootstrap cache are
//! allocated; configuration is not read and the agent is not started.

use crate::agent::{Agent, AgentFactory};
use crate::config::ConfigLoader;
use crate::probe::ProbeArray;
use crate::readiness::{ReadinessFlag, RuntimeReadiness};
use crate::registry::ProbeRegistry;
use crate::result::ProbeResult;
use crate::store::StoreFactory;
use std::sync::{Arc, OnceLock};

static READY: ReadinessFlag = ReadinessFlag::new();

struct ProcessReadiness;

impl RuntimeReadiness for ProcessReadiness {
    fn is_ready(&self) -> bool {
        READY.is_ready()
    }
}

fn factory() -> &'static AgentFactory {
    static FACTORY: OnceLock<AgentFactory> = OnceLock::new();
    FACTORY.get_or_init(|| AgentFactory::new(ConfigLoader::from_env()))
}

/// The process registry
pub fn registry() -> &'static ProbeRegistry {
    static REGISTRY: OnceLock<ProbeRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        ProbeRegistry::builder()
            .readiness(Arc::new(ProcessReadiness))
            .build(|| factory().construct())
    })
}

/// Probe array for an instrumented unit
///
/// # Panics
///
/// When the bootstrap cache overflows before the runtime is ready.
pub fn get_probes(id: i64, name: &str, probe_count: usize) -> ProbeArray {
    registry().request(id, name, probe_count)
}

/// Report that bootstrap is over; the next request brings the agent up
pub fn mark_runtime_ready() {
    READY.mark_ready();
}

/// The running agent, once the registry has gone Warm
pub fn agent() -> Option<Arc<Agent>> {
    factory().agent()
}

/// Write the final dump, if an agent is running and configured to
pub fn shutdown() -> ProbeResult<()> {
    match agent() {
        Some(agent) => agent.shutdown(),
        None => {
            tracing::debug!("shutdown before the agent started; nothing to dump");
            Ok(())
        }
    }
}
