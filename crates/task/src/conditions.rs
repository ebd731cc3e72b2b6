//! Task conditions
//!
//! Expressions are evaluated by a collaborator against the cluster model.
//! Tasks whose condition is false are left out of the graph exactly like
//! tasks outside the active groups.

use crate::inheritance::MergedCatalog;
use rollout_core::{Error, Result, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Cluster state handed to condition evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterModel(Value);

impl ClusterModel {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Look up a value by JSON pointer, e.g. `/settings/storage/objects_ceph`
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.0.pointer(pointer)
    }
}

/// Evaluates a task's `condition` expression
pub trait ConditionEvaluator {
    fn evaluate(&self, condition: &str, cluster: &ClusterModel) -> Result<bool>;
}

impl<F> ConditionEvaluator for F
where
    F: Fn(&str, &ClusterModel) -> Result<bool>,
{
    fn evaluate(&self, condition: &str, cluster: &ClusterModel) -> Result<bool> {
        self(condition, cluster)
    }
}

/// Table of pre-computed expression results
#[derive(Debug, Clone, Default)]
pub struct StaticConditions {
    table: HashMap<String, bool>,
    fallback: bool,
}

impl StaticConditions {
    /// Unknown expressions evaluate to `fallback`
    pub fn new(fallback: bool) -> Self {
        Self {
            table: HashMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, condition: impl Into<String>, value: bool) -> Self {
        self.table.insert(condition.into(), value);
        self
    }
}

impl FromIterator<(String, bool)> for StaticConditions {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self {
            table: iter.into_iter().collect(),
            fallback: false,
        }
    }
}

impl ConditionEvaluator for StaticConditions {
    fn evaluate(&self, condition: &str, _cluster: &ClusterModel) -> Result<bool> {
        match self.table.get(condition.trim()) {
            Some(&value) => Ok(value),
            None => {
                warn!(
                    condition = %condition,
                    fallback = self.fallback,
                    "condition not in table, using fallback"
                );
                Ok(self.fallback)
            }
        }
    }
}

/// Ids of the tasks whose condition is false; tasks without one are kept.
///
/// The catalog itself is left intact so that dependencies on excluded tasks
/// still resolve and are dropped like those on tasks outside the active groups.
pub fn excluded_by_conditions(
    catalog: &MergedCatalog,
    evaluator: &dyn ConditionEvaluator,
    cluster: &ClusterModel,
) -> Result<HashSet<TaskId>> {
    let mut excluded = HashSet::new();
    for task in catalog.iter() {
        let Some(condition) = task.condition.as_deref() else {
            continue;
        };
        let keep = evaluator
            .evaluate(condition, cluster)
            .map_err(|err| match err {
                Error::Condition { .. } => err,
                other => Error::Condition {
                    task: task.id.to_string(),
                    message: other.to_string(),
                },
            })?;
        if !keep {
            debug!(task = %task.id, condition = %condition, "condition is false, task skipped");
            excluded.insert(task.id.clone());
        }
    }
    Ok(excluded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inheritance::resolve;
    use rollout_core::{TaskCatalog, TaskTemplate, TaskType};
    use serde_json::json;

    fn catalog() -> MergedCatalog {
        let templates = vec![
            TaskTemplate::new("always").with_type(TaskType::Shell),
            TaskTemplate::new("ceph")
                .with_type(TaskType::Puppet)
                .with_condition("settings:storage.objects_ceph.value == true"),
            TaskTemplate::new("swift")
                .with_type(TaskType::Puppet)
                .with_condition("settings:storage.objects_ceph.value == false"),
        ];
        resolve(&TaskCatalog::new("r", templates).unwrap()).unwrap()
    }

    fn sorted(excluded: HashSet<TaskId>) -> Vec<String> {
        let mut ids: Vec<String> = excluded.iter().map(ToString::to_string).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_static_conditions_exclude_false_tasks() {
        let evaluator = StaticConditions::new(false)
            .with("settings:storage.objects_ceph.value == true", true)
            .with("settings:storage.objects_ceph.value == false", false);

        let excluded =
            excluded_by_conditions(&catalog(), &evaluator, &ClusterModel::default()).unwrap();
        assert_eq!(sorted(excluded), vec!["swift"]);
    }

    #[test]
    fn test_unknown_expression_uses_fallback() {
        let cluster = ClusterModel::default();
        assert!(StaticConditions::new(true).evaluate("anything", &cluster).unwrap());
        assert!(!StaticConditions::new(false).evaluate("anything", &cluster).unwrap());
    }

    #[test]
    fn test_closure_evaluator_reads_cluster_model() {
        let cluster = ClusterModel::new(json!({"storage": {"objects_ceph": true}}));
        let evaluator = |condition: &str, cluster: &ClusterModel| -> Result<bool> {
            let ceph = cluster
                .pointer("/storage/objects_ceph")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Ok(condition.ends_with("true") == ceph)
        };

        let excluded = excluded_by_conditions(&catalog(), &evaluator, &cluster).unwrap();
        assert_eq!(sorted(excluded), vec!["swift"]);
    }

    #[test]
    fn test_evaluator_errors_name_the_task() {
        let evaluator = |_: &str, _: &ClusterModel| -> Result<bool> {
            Err(Error::configuration("parse error"))
        };

        match excluded_by_conditions(&catalog(), &evaluator, &ClusterModel::default()) {
            Err(Error::Condition { task, message }) => {
                assert_eq!(task, "ceph");
                assert!(message.contains("parse error"));
            }
            other => panic!("expected Condition error, got {other:?}"),
        }
    }
}
