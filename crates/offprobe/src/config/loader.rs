//! Properties resource + environment loading

use super::AgentOptions;
use crate::result::ProbeResult;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Parse `key=value` / `key:value` lines
///
/// `#` and `!` start comment lines; blank lines are skipped. A line without
/// a separator defines the key with an empty value. Later lines win.
#[must_use]
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = match line.find(['=', ':']) {
            Some(pos) => (&line[..pos], &line[pos + 1..]),
            None => (line, ""),
        };
        properties.insert(key.trim().to_string(), value.trim().to_string());
    }
    properties
}

/// Loads agent configuration from a resource and the environment
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    resource: PathBuf,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RESOURCE)
    }
}

impl ConfigLoader {
    /// Resource path used when nothing else is configured
    pub const DEFAULT_RESOURCE: &'static str = "offprobe.properties";
    /// Prefix of environment overrides
    pub const ENV_PREFIX: &'static str = "OFFPROBE_";
    /// Environment variable naming the resource path
    pub const CONFIG_ENV: &'static str = "OFFPROBE_CONFIG";

    /// Create a loader for the given resource
    #[must_use]
    pub fn new(resource: impl AsRef<Path>) -> Self {
        Self {
            resource: resource.as_ref().to_path_buf(),
            env_prefix: Self::ENV_PREFIX.to_string(),
        }
    }

    /// Create a loader whose resource path comes from `OFFPROBE_CONFIG`
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(Self::CONFIG_ENV).map_or_else(|_| Self::default(), Self::new)
    }

    /// Use a different environment prefix
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.to_string();
        self
    }

    /// Resource path
    #[must_use]
    pub fn resource(&self) -> &Path {
        &self.resource
    }

    /// Load options using the process environment
    ///
    /// Variables whose name or value is not valid UTF-8 are ignored.
    pub fn load(&self) -> ProbeResult<AgentOptions> {
        self.load_with(utf8_env(std::env::vars_os()))
    }

    /// Load options using the given environment
    pub fn load_with<I>(&self, env: I) -> ProbeResult<AgentOptions>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let properties = self.merged_properties(env)?;
        tracing::debug!(
            resource = %self.resource.display(),
            keys = properties.len(),
            "loaded agent configuration"
        );
        AgentOptions::from_properties(&properties)
    }

    /// Resource properties with environment overrides and `${VAR}` placeholders applied
    pub fn merged_properties<I>(&self, env: I) -> ProbeResult<BTreeMap<String, String>>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: HashMap<String, String> = env.into_iter().collect();
        let mut properties = match fs::read_to_string(&self.resource) {
            Ok(text) => parse_properties(&text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };

        for (name, value) in &env {
            if name == Self::CONFIG_ENV {
                continue;
            }
            if let Some(key) = name.strip_prefix(&self.env_prefix) {
                properties.insert(key.to_ascii_lowercase(), value.clone());
            }
        }

        for value in properties.values_mut() {
            *value = substitute(value, &env);
        }
        Ok(properties)
    }
}

fn utf8_env<I>(env: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    env.into_iter()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
}

/// Replace `${NAME}` with the value of `NAME`; unknown names stay verbatim
fn substitute(value: &str, env: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match env.get(name) {
                    Some(v) => out.push_str(v),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
