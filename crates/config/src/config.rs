//! Planner settings
//!
//! Settings are immutable once built. They come from defaults, an optional
//! YAML/JSON file, and `ROLLOUT_*` environment overrides, in that order.

use rollout_core::{
    constants::{
        DEFAULT_CWD, DEFAULT_PUPPET_TIMEOUT_SECS, DEFAULT_SHELL_TIMEOUT_SECS,
        DEFAULT_SYNC_TIMEOUT_SECS, POST_DEPLOYMENT_GROUP, PRE_DEPLOYMENT_GROUP,
        ROLLOUT_PRIORITY_STRATEGY_VAR, ROLLOUT_STRICT_DEPENDENCIES_VAR,
        ROLLOUT_STRICT_TASK_TYPES_VAR,
    },
    Error, Result, Stage,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// How priorities are assigned over a node's sorted task list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityStrategy {
    /// Dense strictly increasing sequence starting at 0
    #[default]
    OneByOne,
    /// Tasks on the same dependency level share a priority
    Parallel,
}

impl FromStr for PriorityStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "one_by_one" | "one-by-one" => Ok(PriorityStrategy::OneByOne),
            "parallel" => Ok(PriorityStrategy::Parallel),
            other => Err(Error::configuration(format!(
                "unknown priority strategy '{other}' (expected one_by_one or parallel)"
            ))),
        }
    }
}

impl fmt::Display for PriorityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityStrategy::OneByOne => f.write_str("one_by_one"),
            PriorityStrategy::Parallel => f.write_str("parallel"),
        }
    }
}

/// Settings consumed by the planning pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    pub priority_strategy: PriorityStrategy,
    /// Unresolved literal dependency tokens fail instead of warning
    pub strict_dependencies: bool,
    /// Task types without a serializer fail instead of being dropped
    pub strict_task_types: bool,
    pub default_cwd: String,
    pub shell_timeout: u64,
    pub puppet_timeout: u64,
    pub sync_timeout: u64,
    pub pre_deployment_group: String,
    pub post_deployment_group: String,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            priority_strategy: PriorityStrategy::default(),
            strict_dependencies: false,
            strict_task_types: false,
            default_cwd: DEFAULT_CWD.to_string(),
            shell_timeout: DEFAULT_SHELL_TIMEOUT_SECS,
            puppet_timeout: DEFAULT_PUPPET_TIMEOUT_SECS,
            sync_timeout: DEFAULT_SYNC_TIMEOUT_SECS,
            pre_deployment_group: PRE_DEPLOYMENT_GROUP.to_string(),
            post_deployment_group: POST_DEPLOYMENT_GROUP.to_string(),
        }
    }
}

impl PlannerSettings {
    pub fn builder() -> PlannerSettingsBuilder {
        PlannerSettingsBuilder::new()
    }

    /// Load and validate settings from a YAML or JSON file, chosen by extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::file_system(path, e))?;
        let settings: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `ROLLOUT_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(std::env::vars())
    }

    /// Apply `ROLLOUT_*` overrides from the given variables
    pub fn with_overrides_from<I>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                ROLLOUT_PRIORITY_STRATEGY_VAR => self.priority_strategy = value.parse()?,
                ROLLOUT_STRICT_DEPENDENCIES_VAR => {
                    self.strict_dependencies = parse_flag(&key, &value)?
                }
                ROLLOUT_STRICT_TASK_TYPES_VAR => self.strict_task_types = parse_flag(&key, &value)?,
                _ => {}
            }
        }
        Ok(self)
    }

    /// Synthetic stage groups, always part of the active group set
    pub fn stage_groups(&self) -> [&str; 2] {
        [
            self.pre_deployment_group.as_str(),
            self.post_deployment_group.as_str(),
        ]
    }

    /// Stage of a task given the groups it belongs to
    pub fn stage_of<'a, I>(&self, groups: I) -> Stage
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut stage = Stage::Deployment;
        for group in groups {
            if group == self.pre_deployment_group {
                return Stage::PreDeployment;
            }
            if group == self.post_deployment_group {
                stage = Stage::PostDeployment;
            }
        }
        stage
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_cwd.is_empty() {
            return Err(Error::configuration("default_cwd cannot be empty"));
        }
        if self.pre_deployment_group == self.post_deployment_group {
            return Err(Error::configuration(
                "pre and post deployment stage groups must differ",
            ));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::configuration(format!(
            "invalid boolean '{other}' for {key}"
        ))),
    }
}

/// Builder for [`PlannerSettings`]
#[derive(Debug, Default)]
pub struct PlannerSettingsBuilder {
    settings: PlannerSettings,
}

impl PlannerSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority_strategy(mut self, strategy: PriorityStrategy) -> Self {
        self.settings.priority_strategy = strategy;
        self
    }

    pub fn strict_dependencies(mut self, strict: bool) -> Self {
        self.settings.strict_dependencies = strict;
        self
    }

    pub fn strict_task_types(mut self, strict: bool) -> Self {
        self.settings.strict_task_types = strict;
        self
    }

    pub fn default_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.settings.default_cwd = cwd.into();
        self
    }

    pub fn shell_timeout(mut self, secs: u64) -> Self {
        self.settings.shell_timeout = secs;
        self
    }

    pub fn puppet_timeout(mut self, secs: u64) -> Self {
        self.settings.puppet_timeout = secs;
        self
    }

    pub fn sync_timeout(mut self, secs: u64) -> Self {
        self.settings.sync_timeout = secs;
        self
    }

    pub fn stage_groups(mut self, pre: impl Into<String>, post: impl Into<String>) -> Self {
        self.settings.pre_deployment_group = pre.into();
        self.settings.post_deployment_group = post.into();
        self
    }

    pub fn build(self) -> Result<PlannerSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
