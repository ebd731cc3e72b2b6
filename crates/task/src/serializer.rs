//! Per-node ordering, priority assignment and command normalization

use crate::graph::ExecutionGraph;
use crate::patterns::GroupPatternMatcher;
use crate::validation::{ordered_positions, ValidatedGraph};
use rollout_config::{PlannerSettings, PriorityStrategy};
use rollout_core::{
    DeploymentNode, Error, PuppetParameters, Result, Roles, SerializedTask, ShellParameters, Stage,
    SyncParameters, Task, TaskCommand, TaskType, UploadFileParameters,
};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Whether `task` runs on a node with `roles`
pub fn applies_to_node<S: AsRef<str>>(task: &Task, roles: &[S]) -> bool {
    match &task.roles {
        Roles::Any => true,
        Roles::Listed(_) => GroupPatternMatcher::new(task.membership_tokens()).applies(roles),
    }
}

/// Turns a validated graph into each node's ordered command list
#[derive(Debug, Clone)]
pub struct TaskSerializer<'a> {
    settings: &'a PlannerSettings,
}

impl<'a> TaskSerializer<'a> {
    pub fn new(settings: &'a PlannerSettings) -> Self {
        Self { settings }
    }

    /// `serialize(graph, node)`
    #[instrument(skip_all, fields(node = %node.uid))]
    pub fn serialize(
        &self,
        graph: &ValidatedGraph,
        node: &DeploymentNode,
    ) -> Result<Vec<SerializedTask>> {
        let applicable = graph
            .graph()
            .induced(|task| applies_to_node(task, &node.roles));
        let ordered = self.stage_order(&applicable)?;
        let levels = match self.settings.priority_strategy {
            PriorityStrategy::OneByOne => None,
            PriorityStrategy::Parallel => Some(dependency_levels(&applicable, &ordered)),
        };

        let mut rows = Vec::with_capacity(ordered.len());
        for (index, (task, _)) in ordered.iter().enumerate() {
            if let Some(command) = self.normalize(task)? {
                let level = levels.as_ref().map_or(0, |levels| levels[index]);
                rows.push((level, task, command));
            }
        }

        let ranks = dense_ranks(rows.iter().map(|(level, _, _)| *level));
        let tasks: Vec<SerializedTask> = rows
            .into_iter()
            .enumerate()
            .map(|(index, (level, task, command))| SerializedTask {
                node_uid: node.uid.clone(),
                task_id: task.id.clone(),
                priority: match self.settings.priority_strategy {
                    PriorityStrategy::OneByOne => to_priority(index),
                    PriorityStrategy::Parallel => ranks.get(&level).copied().unwrap_or_default(),
                },
                command,
            })
            .collect();

        debug!(
            applicable = applicable.len(),
            serialized = tasks.len(),
            "serialized node plan"
        );
        Ok(tasks)
    }

    /// Topological order in which every task of an earlier stage comes first
    fn stage_order(&self, graph: &ExecutionGraph) -> Result<Vec<(Arc<Task>, Stage)>> {
        let stages: Vec<Stage> = graph
            .tasks()
            .map(|task| self.settings.stage_of(task.groups.iter().map(String::as_str)))
            .collect();

        for (from, to) in graph.edge_positions() {
            if stages[from] > stages[to] {
                let task = graph.id_at(to).map(ToString::to_string).unwrap_or_default();
                let dependency = graph.id_at(from).map(ToString::to_string).unwrap_or_default();
                return Err(Error::StageOrderViolation { task, dependency });
            }
        }

        let tasks: Vec<&Arc<Task>> = graph.tasks().collect();
        Ok(ordered_positions(graph, |pos| stages[pos])?
            .into_iter()
            .map(|pos| (Arc::clone(tasks[pos]), stages[pos]))
            .collect())
    }

    /// Normalized command for a task, `None` for types that are never sent to a node
    pub fn normalize(&self, task: &Task) -> Result<Option<TaskCommand>> {
        let params = ParameterReader::new(task);
        let command = match task.task_type {
            TaskType::Shell => TaskCommand::Shell(ShellParameters {
                cmd: params.required("cmd")?,
                timeout: params.timeout(self.settings.shell_timeout)?,
                cwd: params.cwd(&self.settings.default_cwd)?,
            }),
            TaskType::Puppet => TaskCommand::Puppet(PuppetParameters {
                puppet_manifest: params.required("puppet_manifest")?,
                puppet_modules: params.optional("puppet_modules")?,
                timeout: params.timeout(self.settings.puppet_timeout)?,
                cwd: params.cwd(&self.settings.default_cwd)?,
            }),
            TaskType::UploadFile => TaskCommand::UploadFile(UploadFileParameters {
                path: params.required("path")?,
                data: params.required("data")?,
            }),
            TaskType::Sync => TaskCommand::Sync(SyncParameters {
                src: params.required("src")?,
                dst: params.required("dst")?,
                timeout: params.timeout(self.settings.sync_timeout)?,
            }),
            TaskType::Group | TaskType::Stage | TaskType::Skipped => {
                if self.settings.strict_task_types {
                    return Err(Error::UnsupportedTaskType {
                        task: task.id.to_string(),
                        task_type: task.task_type.to_string(),
                    });
                }
                warn!(
                    task = %task.id,
                    task_type = %task.task_type,
                    "task type has no command form, left out of the node plan"
                );
                return Ok(None);
            }
        };
        Ok(Some(command))
    }
}

/// Level of each ordered task: one past its deepest predecessor, never lower
/// than the first level after the previous stage.
fn dependency_levels(graph: &ExecutionGraph, ordered: &[(Arc<Task>, Stage)]) -> Vec<u32> {
    let mut by_id: HashMap<&str, u32> = HashMap::with_capacity(ordered.len());
    let mut levels = Vec::with_capacity(ordered.len());
    let mut current_stage = None;
    let mut floor = 0;
    let mut highest: Option<u32> = None;

    for (task, stage) in ordered {
        if current_stage != Some(*stage) {
            floor = highest.map_or(0, |h| h + 1);
            current_stage = Some(*stage);
        }
        let level = graph
            .predecessors(&task.id)
            .into_iter()
            .filter_map(|pred| by_id.get(pred.as_str()))
            .map(|level| level + 1)
            .fold(floor, u32::max);

        by_id.insert(task.id.as_str(), level);
        highest = Some(highest.map_or(level, |h| h.max(level)));
        levels.push(level);
    }
    levels
}

/// Map each distinct value to its rank among all values
fn dense_ranks(values: impl Iterator<Item = u32>) -> HashMap<u32, u32> {
    values
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .enumerate()
        .map(|(rank, value)| (value, to_priority(rank)))
        .collect()
}

fn to_priority(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

struct ParameterReader<'t> {
    task: &'t Task,
}

impl<'t> ParameterReader<'t> {
    fn new(task: &'t Task) -> Self {
        Self { task }
    }

    fn invalid(&self, message: String) -> Error {
        Error::invalid_parameters(self.task.id.as_str(), message)
    }

    fn optional(&self, key: &str) -> Result<Option<String>> {
        match self.task.parameters.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(other) => Err(self.invalid(format!("'{key}' must be a string, got {other}"))),
        }
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)?
            .ok_or_else(|| self.invalid(format!("missing required parameter '{key}'")))
    }

    fn cwd(&self, default: &str) -> Result<String> {
        Ok(self.optional("cwd")?.unwrap_or_else(|| default.to_string()))
    }

    /// Seconds, given as a non-negative integer or a numeric string
    fn timeout(&self, default: u64) -> Result<u64> {
        match self.task.parameters.get("timeout") {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
                self.invalid(format!("'timeout' must be a whole number of seconds, got {n}"))
            }),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map_err(|_| self.invalid(format!("'timeout' is not a number: '{s}'"))),
            Some(other) => Err(self.invalid(format!("'timeout' must be a number, got {other}"))),
        }
    }
}
