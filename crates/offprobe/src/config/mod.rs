//! Agent configuration
//!
//! Options are read once, when the backing store is constructed, from a
//! properties resource merged with `OFFPROBE_*` environment overrides.

mod loader;

pub use loader::{parse_properties, ConfigLoader};

use crate::result::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where session dumps go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Append to the destination file
    #[default]
    File,
    /// Collect in memory only
    None,
}

impl FromStr for OutputMode {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "none" => Ok(Self::None),
            _ => Err(ProbeError::invalid_option(
                AgentOptions::OUTPUT,
                s,
                "expected `file` or `none`",
            )),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::None => f.write_str("none"),
        }
    }
}

/// Agent options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOptions {
    /// Dump destination
    pub destfile: PathBuf,
    /// Append to an existing destination instead of truncating it
    pub append: bool,
    /// Explicit session id; generated when absent
    pub sessionid: Option<String>,
    /// Write a dump when the agent shuts down
    pub dumponexit: bool,
    /// Output mode
    pub output: OutputMode,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            destfile: PathBuf::from(Self::DEFAULT_DESTFILE),
            append: true,
            sessionid: None,
            dumponexit: true,
            output: OutputMode::File,
        }
    }
}

impl AgentOptions {
    /// Key for [`Self::destfile`]
    pub const DESTFILE: &'static str = "destfile";
    /// Key for [`Self::append`]
    pub const APPEND: &'static str = "append";
    /// Key for [`Self::sessionid`]
    pub const SESSIONID: &'static str = "sessionid";
    /// Key for [`Self::dumponexit`]
    pub const DUMPONEXIT: &'static str = "dumponexit";
    /// Key for [`Self::output`]
    pub const OUTPUT: &'static str = "output";

    /// Every recognised key
    pub const KEYS: [&'static str; 5] = [
        Self::DESTFILE,
        Self::APPEND,
        Self::SESSIONID,
        Self::DUMPONEXIT,
        Self::OUTPUT,
    ];

    /// Default dump destination
    pub const DEFAULT_DESTFILE: &'static str = "offprobe.exec.jsonl";

    /// Create default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build options from merged key/value pairs
    ///
    /// Unknown keys are rejected rather than ignored so typos surface.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> ProbeResult<Self> {
        let mut options = Self::default();
        for (key, value) in properties {
            match key.as_str() {
                Self::DESTFILE => options.destfile = PathBuf::from(value),
                Self::APPEND => options.append = parse_bool(key, value)?,
                Self::SESSIONID => {
                    options.sessionid = Some(value.clone()).filter(|v| !v.is_empty());
                }
                Self::DUMPONEXIT => options.dumponexit = parse_bool(key, value)?,
                Self::OUTPUT => options.output = value.parse()?,
                _ => return Err(ProbeError::UnknownOption { key: key.clone() }),
            }
        }
        Ok(options)
    }

    /// Set the dump destination
    #[must_use]
    pub fn with_destfile(mut self, path: impl AsRef<Path>) -> Self {
        self.destfile = path.as_ref().to_path_buf();
        self
    }

    /// Set append mode
    #[must_use]
    pub const fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// Set an explicit session id
    #[must_use]
    pub fn with_sessionid(mut self, id: &str) -> Self {
        self.sessionid = Some(id.to_string());
        self
    }

    /// Set dump-on-exit
    #[must_use]
    pub const fn with_dumponexit(mut self, dump: bool) -> Self {
        self.dumponexit = dump;
        self
    }

    /// Set the output mode
    #[must_use]
    pub const fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }
}

fn parse_bool(key: &str, value: &str) -> ProbeResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ProbeError::invalid_option(key, value, "expected `true` or `false`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let options = AgentOptions::from_properties(&BTreeMap::new()).unwrap();
        assert_eq!(options, AgentOptions::default());
        assert_eq!(options.destfile, PathBuf::from("offprobe.exec.jsonl"));
        assert!(options.append);
        assert!(options.dumponexit);
        assert_eq!(options.output, OutputMode::File);
    }

    #[test]
    fn test_all_keys() {
        let options = AgentOptions::from_properties(&props(&[
            ("destfile", "/tmp/cov.jsonl"),
            ("append", "FALSE"),
            ("sessionid", "run-1"),
            ("dumponexit", "false"),
            ("output", "none"),
        ]))
        .unwrap();
        assert_eq!(options.destfile, PathBuf::from("/tmp/cov.jsonl"));
        assert!(!options.append);
        assert_eq!(options.sessionid.as_deref(), Some("run-1"));
        assert!(!options.dumponexit);
        assert_eq!(options.output, OutputMode::None);
    }

    #[test]
    fn test_empty_sessionid_is_absent() {
        let options = AgentOptions::from_properties(&props(&[("sessionid", "")])).unwrap();
        assert!(options.sessionid.is_none());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = AgentOptions::from_properties(&props(&[("destfiel", "x")])).unwrap_err();
        assert!(matches!(err, ProbeError::UnknownOption { key } if key == "destfiel"));
    }

    #[test]
    fn test_bad_bool_rejected() {
        let err = AgentOptions::from_properties(&props(&[("append", "yes")])).unwrap_err();
        assert!(matches!(err, ProbeError::InvalidOption { .. }));
    }

    #[test]
    fn test_bad_output_rejected() {
        assert!("tcpserver".parse::<OutputMode>().is_err());
        assert_eq!("FILE".parse::<OutputMode>().unwrap(), OutputMode::File);
    }

    #[test]
    fn test_builder_methods() {
        let options = AgentOptions::new()
            .with_destfile("out.jsonl")
            .with_append(false)
            .with_sessionid("s")
            .with_dumponexit(false)
            .with_output(OutputMode::None);
        assert_eq!(options.destfile, PathBuf::from("out.jsonl"));
        assert_eq!(options.sessionid.as_deref(), Some("s"));
        assert_eq!(options.output.to_string(), "none");
    }

    #[test]
    fn test_serde_uses_lowercase_output() {
        let json = serde_json::to_string(&AgentOptions::default()).unwrap();
        assert!(json.contains("\"output\":\"file\""));
    }
}
