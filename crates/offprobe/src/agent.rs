//! Coverage Agent
//!
//! Owns the execution data of one session and writes session dumps. The
//! [`AgentFactory`] is how the registry brings the agent up: it loads the
//! configuration, starts the agent once and hands its data out as the
//! backing store.

use crate::config::{AgentOptions, ConfigLoader, OutputMode};
use crate::probe::ExecutionSnapshot;
use crate::result::ProbeResult;
use crate::store::{ProbeStore, RuntimeData, StoreFactory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// All execution records of a session at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session id
    pub session_id: String,
    /// When the agent started
    pub started_at: DateTime<Utc>,
    /// When the snapshot was taken
    pub dumped_at: DateTime<Utc>,
    /// Records ordered by id
    pub records: Vec<ExecutionSnapshot>,
}

impl SessionSnapshot {
    /// Number of records with at least one hit
    #[must_use]
    pub fn covered_units(&self) -> usize {
        self.records.iter().filter(|r| r.has_hits()).count()
    }
}

/// A running coverage agent
#[derive(Debug)]
pub struct Agent {
    options: AgentOptions,
    started_at: DateTime<Utc>,
    data: Arc<RuntimeData>,
}

impl Agent {
    /// Start an agent
    ///
    /// With file output the destination is prepared up front (parent
    /// directories created, truncated unless appending) so an unusable
    /// path fails construction instead of the final dump.
    pub fn start(options: AgentOptions) -> ProbeResult<Self> {
        let session_id = options
            .sessionid
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if options.output == OutputMode::File {
            if let Some(parent) = options.destfile.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            OpenOptions::new()
                .create(true)
                .write(true)
                .append(options.append)
                .truncate(!options.append)
                .open(&options.destfile)?;
        }

        tracing::info!(
            session = %session_id,
            output = %options.output,
            destfile = %options.destfile.display(),
            "coverage agent started"
        );

        Ok(Self {
            options,
            started_at: Utc::now(),
            data: Arc::new(RuntimeData::new(&session_id)),
        })
    }

    /// Effective options
    #[must_use]
    pub const fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Session id
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.data.session_id()
    }

    /// Execution data of this session
    #[must_use]
    pub fn data(&self) -> Arc<RuntimeData> {
        Arc::clone(&self.data)
    }

    /// Snapshot all records, optionally clearing hits afterwards
    #[must_use]
    pub fn dump(&self, reset: bool) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id().to_string(),
            started_at: self.started_at,
            dumped_at: Utc::now(),
            records: self.data.collect(reset),
        }
    }

    /// Snapshot and, with file output, append it as one JSON line
    pub fn write_dump(&self, reset: bool) -> ProbeResult<SessionSnapshot> {
        let snapshot = self.dump(reset);
        if self.options.output == OutputMode::File {
            let mut line = serde_json::to_vec(&snapshot)?;
            line.push(b'\n');
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.options.destfile)?;
            file.write_all(&line)?;
            tracing::debug!(
                records = snapshot.records.len(),
                destfile = %self.options.destfile.display(),
                "session dump written"
            );
        }
        Ok(snapshot)
    }

    /// Final dump if the options ask for one
    pub fn shutdown(&self) -> ProbeResult<()> {
        if self.options.dumponexit && self.options.output == OutputMode::File {
            self.write_dump(false)?;
        }
        tracing::info!(session = %self.session_id(), "coverage agent stopped");
        Ok(())
    }
}

/// Builds the backing store by starting an [`Agent`] from loaded configuration
///
/// The agent is started at most once; later constructions reuse it.
#[derive(Debug, Default)]
pub struct AgentFactory {
    loader: ConfigLoader,
    agent: OnceLock<Arc<Agent>>,
}

impl AgentFactory {
    /// Create a factory using the given loader
    #[must_use]
    pub fn new(loader: ConfigLoader) -> Self {
        Self {
            loader,
            agent: OnceLock::new(),
        }
    }

    /// The started agent, if construction has succeeded
    #[must_use]
    pub fn agent(&self) -> Option<Arc<Agent>> {
        self.agent.get().cloned()
    }
}

impl StoreFactory for AgentFactory {
    fn construct(&self) -> ProbeResult<Arc<dyn ProbeStore>> {
        let agent = match self.agent.get() {
            Some(agent) => agent,
            None => {
                let started = Arc::new(Agent::start(self.loader.load()?)?);
                self.agent.get_or_init(|| started)
            }
        };
        let store: Arc<dyn ProbeStore> = agent.data();
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ClassId;
    use crate::result::ProbeError;
    use std::io::Write as _;

    fn file_options(dir: &tempfile::TempDir) -> AgentOptions {
        AgentOptions::new()
            .with_destfile(dir.path().join("out").join("cov.jsonl"))
            .with_sessionid("test-session")
    }

    #[test]
    fn test_start_creates_destination() {
        let dir = tempfile::tempdir().unwrap();
        let agent = Agent::start(file_options(&dir)).unwrap();
        assert!(agent.options().destfile.exists());
        assert_eq!(agent.session_id(), "test-session");
    }

    #[test]
    fn test_generated_session_id() {
        let agent = Agent::start(AgentOptions::new().with_output(OutputMode::None)).unwrap();
        assert!(Uuid::parse_str(agent.session_id()).is_ok());
    }

    #[test]
    fn test_unwritable_destination_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file, not dir").unwrap();
        let options = AgentOptions::new().with_destfile(blocker.join("cov.jsonl"));
        assert!(matches!(Agent::start(options), Err(ProbeError::Io(_))));
    }

    #[test]
    fn test_dump_and_reset() {
        let agent = Agent::start(AgentOptions::new().with_output(OutputMode::None)).unwrap();
        let probes = agent.data().get_or_create(ClassId::new(1), "A", 2).unwrap();
        probes.hit(1);

        let snap = agent.dump(true);
        assert_eq!(snap.records.len(), 1);
        assert_eq!(snap.records[0].probes, vec![false, true]);
        assert_eq!(snap.covered_units(), 1);
        assert!(snap.dumped_at >= snap.started_at);
        assert_eq!(probes.hit_count(), 0);
    }

    #[test]
    fn test_write_dump_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let agent = Agent::start(file_options(&dir)).unwrap();
        agent.data().get_or_create(ClassId::new(7), "G", 1).unwrap().hit(0);

        agent.write_dump(false).unwrap();
        agent.shutdown().unwrap();

        let text = fs::read_to_string(&agent.options().destfile).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let snap: SessionSnapshot = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(snap.session_id, "test-session");
        assert_eq!(snap.records[0].id, ClassId::new(7));
        assert_eq!(snap.records[0].probes, vec![true]);
    }

    #[test]
    fn test_append_false_truncates_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("cov.jsonl");
        fs::write(&dest, "stale\n").unwrap();

        let agent = Agent::start(AgentOptions::new().with_destfile(&dest).with_append(false)).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "");
        agent.write_dump(false).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_shutdown_without_dumponexit_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let agent = Agent::start(file_options(&dir).with_dumponexit(false)).unwrap();
        agent.shutdown().unwrap();
        assert_eq!(fs::read_to_string(&agent.options().destfile).unwrap(), "");
    }

    #[test]
    fn test_factory_starts_agent_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("offprobe.properties");
        let mut file = fs::File::create(&config).unwrap();
        writeln!(file, "output=none").unwrap();
        writeln!(file, "sessionid=factory").unwrap();

        let factory =
            AgentFactory::new(ConfigLoader::new(&config).with_env_prefix("OFFPROBE_TEST_NONE_"));
        assert!(factory.agent().is_none());
        let first = factory.construct().unwrap();
        let second = factory.construct().unwrap();

        let a = first.get_or_create(ClassId::new(1), "A", 1).unwrap();
        let b = second.get_or_create(ClassId::new(1), "A", 1).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(factory.agent().unwrap().session_id(), "factory");
    }

    #[test]
    fn test_factory_propagates_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("offprobe.properties");
        fs::write(&config, "bogus=1\n").unwrap();

        let factory =
            AgentFactory::new(ConfigLoader::new(&config).with_env_prefix("OFFPROBE_TEST_NONE_"));
        assert!(matches!(
            factory.construct().err(),
            Some(ProbeError::UnknownOption { .. })
        ));
        assert!(factory.agent().is_none());
    }
}
