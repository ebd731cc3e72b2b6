//! Task template inheritance
//!
//! A template may list parents in `inherits`. Its ancestry is linearized with
//! the C3 algorithm (the same ordering used for multiple-inheritance method
//! resolution) and the chain is folded from the most ancestral template to the
//! most specific one, later templates overriding earlier ones field by field.
//! `parameters` are merged key by key; `type` must agree along the chain.

use indexmap::IndexMap;
use rollout_core::{Error, Result, Roles, Task, TaskCatalog, TaskId, TaskTemplate, TaskType};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Catalog of merged tasks, in catalog order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedCatalog {
    release: String,
    tasks: IndexMap<TaskId, Arc<Task>>,
}

impl MergedCatalog {
    pub fn new(release: impl Into<String>) -> Self {
        Self {
            release: release.into(),
            tasks: IndexMap::new(),
        }
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Task>> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

enum Frame {
    Enter { id: TaskId, referenced_by: TaskId },
    Exit(TaskId),
}

/// Expands `inherits` references into merged tasks.
///
/// Linearizations are memoized per task id. A failed call leaves the memo
/// exactly as it was before the call.
#[derive(Debug)]
pub struct InheritanceResolver<'a> {
    catalog: &'a TaskCatalog,
    chains: HashMap<TaskId, Arc<[TaskId]>>,
}

impl<'a> InheritanceResolver<'a> {
    pub fn new(catalog: &'a TaskCatalog) -> Self {
        Self {
            catalog,
            chains: HashMap::new(),
        }
    }

    /// Number of memoized linearizations
    pub fn memoized(&self) -> usize {
        self.chains.len()
    }

    /// C3 linearization of `id`: the task itself followed by its ancestors
    pub fn linearize(&mut self, id: &str) -> Result<Arc<[TaskId]>> {
        if let Some(chain) = self.chains.get(id) {
            return Ok(Arc::clone(chain));
        }

        let root = TaskId::new(id);
        let mut staged: HashMap<TaskId, Arc<[TaskId]>> = HashMap::new();
        let mut on_path: HashSet<TaskId> = HashSet::new();
        let mut stack = vec![Frame::Enter {
            id: root.clone(),
            referenced_by: root.clone(),
        }];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter { id, referenced_by } => {
                    if self.chains.contains_key(&id) || staged.contains_key(&id) {
                        continue;
                    }
                    if on_path.contains(&id) {
                        return Err(Error::WrongTasksHierarchy {
                            task: id.to_string(),
                        });
                    }
                    let template = self.template(&id, &referenced_by)?;
                    on_path.insert(id.clone());
                    stack.push(Frame::Exit(id.clone()));
                    for parent in template.inherits.iter().rev() {
                        stack.push(Frame::Enter {
                            id: parent.clone(),
                            referenced_by: id.clone(),
                        });
                    }
                }
                Frame::Exit(id) => {
                    on_path.remove(&id);
                    let chain = self.merge_parents(&id, &staged)?;
                    staged.insert(id, chain);
                }
            }
        }

        let chain = staged
            .get(&root)
            .cloned()
            .ok_or_else(|| Error::task_not_found(root.as_str(), root.as_str()))?;
        self.chains.extend(staged);
        Ok(chain)
    }

    /// Fold the linearized chain of `id` into one task
    pub fn merge(&mut self, id: &str) -> Result<Task> {
        let chain = self.linearize(id)?;

        let mut task_type: Option<TaskType> = None;
        let mut groups: Option<Vec<String>> = None;
        let mut roles: Option<Roles> = None;
        let mut requires: Option<Vec<String>> = None;
        let mut required_for: Option<Vec<String>> = None;
        let mut condition: Option<String> = None;
        let mut parameters = serde_json::Map::new();

        for ancestor in chain.iter().rev() {
            let template = self.template(ancestor, &chain[0])?;
            if let Some(found) = template.task_type {
                match task_type {
                    Some(expected) if expected != found => {
                        return Err(Error::DifferentTasksTypesInheritance {
                            task: id.to_string(),
                            expected: expected.to_string(),
                            found: found.to_string(),
                        });
                    }
                    _ => task_type = Some(found),
                }
            }
            override_with(&mut groups, &template.groups);
            override_with(&mut roles, &template.roles);
            override_with(&mut requires, &template.requires);
            override_with(&mut required_for, &template.required_for);
            override_with(&mut condition, &template.condition);
            if let Some(params) = &template.parameters {
                for (key, value) in params {
                    parameters.insert(key.clone(), value.clone());
                }
            }
        }

        let task_type = task_type.ok_or_else(|| Error::UndefinedTaskType {
            task: id.to_string(),
        })?;

        Ok(Task {
            id: TaskId::new(id),
            task_type,
            groups: groups.unwrap_or_default(),
            roles: roles.unwrap_or_default(),
            requires: requires.unwrap_or_default(),
            required_for: required_for.unwrap_or_default(),
            parameters,
            condition,
        })
    }

    /// Merge every task of the catalog; any failure discards the whole result
    #[instrument(skip(self), fields(release = %self.catalog.release(), tasks = self.catalog.len()))]
    pub fn resolve_all(&mut self) -> Result<MergedCatalog> {
        let mut merged = MergedCatalog::new(self.catalog.release());
        for id in self.catalog.ids() {
            let task = self.merge(id)?;
            merged.tasks.insert(id.clone(), Arc::new(task));
        }
        debug!(memoized = self.chains.len(), "resolved task inheritance");
        Ok(merged)
    }

    fn template(&self, id: &TaskId, referenced_by: &TaskId) -> Result<&'a TaskTemplate> {
        self.catalog
            .get(id)
            .ok_or_else(|| Error::task_not_found(id.as_str(), referenced_by.as_str()))
    }

    fn chain_of(
        &self,
        id: &TaskId,
        staged: &HashMap<TaskId, Arc<[TaskId]>>,
    ) -> Option<Arc<[TaskId]>> {
        self.chains
            .get(id)
            .or_else(|| staged.get(id))
            .map(Arc::clone)
    }

    /// `id + merge(L(P1), ..., L(Pn), [P1..Pn])`
    fn merge_parents(
        &self,
        id: &TaskId,
        staged: &HashMap<TaskId, Arc<[TaskId]>>,
    ) -> Result<Arc<[TaskId]>> {
        let template = self.template(id, id)?;
        let mut sequences: Vec<Vec<TaskId>> = Vec::with_capacity(template.inherits.len() + 1);
        for parent in &template.inherits {
            let chain = self
                .chain_of(parent, staged)
                .ok_or_else(|| Error::task_not_found(parent.as_str(), id.as_str()))?;
            sequences.push(chain.to_vec());
        }
        sequences.push(template.inherits.clone());

        let mut result = vec![id.clone()];
        loop {
            sequences.retain(|seq| !seq.is_empty());
            if sequences.is_empty() {
                break;
            }

            let head = sequences
                .iter()
                .map(|seq| &seq[0])
                .find(|candidate| !sequences.iter().any(|seq| seq[1..].contains(*candidate)))
                .cloned()
                .ok_or_else(|| Error::LinearizationImpossible {
                    task: id.to_string(),
                    remaining: sequences
                        .iter()
                        .map(|seq| seq.iter().map(ToString::to_string).collect())
                        .collect(),
                })?;

            for seq in sequences.iter_mut() {
                if seq[0] == head {
                    seq.remove(0);
                }
            }
            result.push(head);
        }

        Ok(result.into())
    }
}

fn override_with<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if let Some(value) = value {
        *slot = Some(value.clone());
    }
}

/// `resolve(catalog) -> merged_catalog`
pub fn resolve(catalog: &TaskCatalog) -> Result<MergedCatalog> {
    InheritanceResolver::new(catalog).resolve_all()
}
