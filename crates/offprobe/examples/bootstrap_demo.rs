//! Bootstrap Demo - cold cache, readiness, migration, dump
//!
//! Walks one registry through its lifecycle with in-memory output.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=offprobe=debug cargo run --example bootstrap_demo -p offprobe
//! ```

#![allow(clippy::uninlined_format_args)]

use offprobe::{
    Agent, AgentOptions, OutputMode, ProbeRegistry, ProbeResult, ProbeStore, ReadinessFlag,
};
use std::sync::{Arc, OnceLock};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== OFFPROBE BOOTSTRAP DEMO ===\n");

    let agent: Arc<OnceLock<Arc<Agent>>> = Arc::new(OnceLock::new());
    let readiness = Arc::new(ReadinessFlag::new());

    let slot = Arc::clone(&agent);
    let registry = ProbeRegistry::builder()
        .capacity(16)
        .readiness(readiness.clone())
        .build(move || -> ProbeResult<Arc<dyn ProbeStore>> {
            let started = Agent::start(
                AgentOptions::new()
                    .with_sessionid("demo")
                    .with_output(OutputMode::None),
            )?;
            let store: Arc<dyn ProbeStore> = slot.get_or_init(|| Arc::new(started)).data();
            Ok(store)
        });

    println!("1. Cold phase");
    let main_probes = registry.request(0x1001, "demo/Main", 4);
    main_probes.hit(0);
    main_probes.hit(2);
    println!("   demo/Main  -> {:?}", main_probes);
    println!("   phase={:?} cached={}\n", registry.phase(), registry.cached_len());

    println!("2. Runtime ready");
    readiness.mark_ready();
    let util_probes = registry.request(0x2002, "demo/Util", 2);
    util_probes.hit(1);
    println!("   phase={:?} cached={}\n", registry.phase(), registry.cached_len());

    println!("3. Same handle after migration");
    let again = registry.request(0x1001, "demo/Main", 4);
    println!("   shared storage: {}", again.ptr_eq(&main_probes));
    println!("   demo/Main  -> {:?}\n", again);

    println!("4. Session dump");
    if let Some(agent) = agent.get() {
        let snapshot = agent.dump(false);
        for record in &snapshot.records {
            println!("   {} {:<10} {:?}", record.id, record.name, record.probes);
        }
        println!("   covered units: {}", snapshot.covered_units());
    }
}
