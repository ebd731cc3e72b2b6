//! Normalized per-node commands handed to the dispatcher

use super::tasks::TaskId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellParameters {
    pub cmd: String,
    pub timeout: u64,
    pub cwd: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuppetParameters {
    pub puppet_manifest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub puppet_modules: Option<String>,
    pub timeout: u64,
    pub cwd: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFileParameters {
    pub path: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncParameters {
    pub src: String,
    pub dst: String,
    pub timeout: u64,
}

/// Command record for one executable task type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
pub enum TaskCommand {
    Shell(ShellParameters),
    Puppet(PuppetParameters),
    UploadFile(UploadFileParameters),
    Sync(SyncParameters),
}

impl TaskCommand {
    pub fn type_name(&self) -> &'static str {
        match self {
            TaskCommand::Shell(_) => "shell",
            TaskCommand::Puppet(_) => "puppet",
            TaskCommand::UploadFile(_) => "upload_file",
            TaskCommand::Sync(_) => "sync",
        }
    }
}

/// One row of a node's ordered plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedTask {
    pub node_uid: String,
    pub task_id: TaskId,
    pub priority: u32,
    #[serde(flatten)]
    pub command: TaskCommand,
}

/// Ordered plans for every node of a deployment, in node input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentPlan {
    nodes: IndexMap<String, Vec<SerializedTask>>,
}

impl DeploymentPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node_uid: impl Into<String>, tasks: Vec<SerializedTask>) {
        self.nodes.insert(node_uid.into(), tasks);
    }

    pub fn tasks_for(&self, node_uid: &str) -> Option<&[SerializedTask]> {
        self.nodes.get(node_uid).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SerializedTask])> {
        self.nodes
            .iter()
            .map(|(uid, tasks)| (uid.as_str(), tasks.as_slice()))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of serialized tasks across all nodes
    pub fn task_count(&self) -> usize {
        self.nodes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.task_count() == 0
    }
}
