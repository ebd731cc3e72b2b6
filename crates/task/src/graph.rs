//! Deployment execution graph
//!
//! Nodes are merged tasks keyed by id, kept in catalog order. An edge
//! `a -> b` means `a` must complete before `b` starts.

use crate::inheritance::MergedCatalog;
use crate::patterns::{GroupPatternMatcher, GroupToken};
use indexmap::{IndexMap, IndexSet};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use rollout_config::PlannerSettings;
use rollout_core::{Error, Result, Roles, Task, TaskId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Transient dependency graph for one deployment request
#[derive(Debug, Clone, Default)]
pub struct ExecutionGraph {
    graph: DiGraph<Arc<Task>, ()>,
    index: IndexMap<TaskId, NodeIndex>,
}

impl ExecutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task. Identical re-insertion is a no-op, a different task
    /// under the same id is rejected.
    pub fn add_task(&mut self, task: Arc<Task>) -> Result<()> {
        if let Some(&existing) = self.index.get(&task.id) {
            if *self.graph[existing] == *task {
                return Ok(());
            }
            return Err(Error::cannot_build_graph(
                task.id.as_str(),
                "task is already present with different content",
            ));
        }
        let id = task.id.clone();
        let node = self.graph.add_node(task);
        self.index.insert(id, node);
        Ok(())
    }

    /// Add `from -> to`; returns false for self-loops, which are ignored
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<bool> {
        let source = self.node(from)?;
        let target = self.node(to)?;
        if source == target {
            return Ok(false);
        }
        self.graph.update_edge(source, target, ());
        Ok(true)
    }

    fn node(&self, id: &str) -> Result<NodeIndex> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| Error::cannot_build_graph(id, "task is not part of the graph"))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Task>> {
        self.index.get(id).map(|&node| &self.graph[node])
    }

    /// Insertion position, used to break ordering ties
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get_index_of(id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.index.keys()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.index.values().map(|&node| &self.graph[node])
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Direct predecessors of `id`, in insertion order
    pub fn predecessors(&self, id: &str) -> Vec<&TaskId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct successors of `id`, in insertion order
    pub fn successors(&self, id: &str) -> Vec<&TaskId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<&TaskId> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut positions: Vec<usize> = self
            .graph
            .neighbors_directed(node, direction)
            .map(NodeIndex::index)
            .collect();
        positions.sort_unstable();
        positions.dedup();
        positions
            .into_iter()
            .filter_map(|pos| self.index.get_index(pos).map(|(id, _)| id))
            .collect()
    }

    /// Edges as `(before, after)` insertion positions, sorted
    pub(crate) fn edge_positions(&self) -> Vec<(usize, usize)> {
        let mut edges: Vec<(usize, usize)> = self
            .graph
            .edge_indices()
            .filter_map(|edge| self.graph.edge_endpoints(edge))
            .map(|(a, b)| (a.index(), b.index()))
            .collect();
        edges.sort_unstable();
        edges
    }

    /// Task id at an insertion position
    pub(crate) fn id_at(&self, position: usize) -> Option<&TaskId> {
        self.index.get_index(position).map(|(id, _)| id)
    }

    /// All edges as `(before, after)`, ordered by insertion positions
    pub fn edges(&self) -> Vec<(TaskId, TaskId)> {
        self.edge_positions()
            .into_iter()
            .filter_map(|(a, b)| {
                let (from, _) = self.index.get_index(a)?;
                let (to, _) = self.index.get_index(b)?;
                Some((from.clone(), to.clone()))
            })
            .collect()
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    /// Subgraph induced by the tasks accepted by `keep`, order preserved
    pub fn induced<F>(&self, mut keep: F) -> ExecutionGraph
    where
        F: FnMut(&Task) -> bool,
    {
        let mut subgraph = ExecutionGraph::new();
        for task in self.tasks() {
            if keep(task) {
                let id = task.id.clone();
                let node = subgraph.graph.add_node(Arc::clone(task));
                subgraph.index.insert(id, node);
            }
        }
        for (from, to) in self.edges() {
            if let (Some(&a), Some(&b)) = (subgraph.index.get(&from), subgraph.index.get(&to)) {
                subgraph.graph.update_edge(a, b, ());
            }
        }
        subgraph
    }
}

/// Builds an [`ExecutionGraph`] from merged catalogs and the active groups
#[derive(Debug, Clone)]
pub struct GraphBuilder<'a> {
    settings: &'a PlannerSettings,
    excluded: Option<&'a HashSet<TaskId>>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(settings: &'a PlannerSettings) -> Self {
        Self {
            settings,
            excluded: None,
        }
    }

    /// Leave these tasks out of the graph while still resolving dependency
    /// tokens that name them
    pub fn excluding(mut self, excluded: &'a HashSet<TaskId>) -> Self {
        self.excluded = Some(excluded);
        self
    }

    /// `build(mergedCatalog, activeGroups)`
    pub fn build<S: AsRef<str>>(
        &self,
        catalog: &MergedCatalog,
        active_groups: &[S],
    ) -> Result<ExecutionGraph> {
        self.build_layered(&[catalog], active_groups)
    }

    /// Build from several catalogs (a release and its plugins). A task id
    /// present in more than one layer must carry identical content.
    #[instrument(skip_all, fields(layers = catalogs.len()))]
    pub fn build_layered<S: AsRef<str>>(
        &self,
        catalogs: &[&MergedCatalog],
        active_groups: &[S],
    ) -> Result<ExecutionGraph> {
        let active: Vec<&str> = active_groups
            .iter()
            .map(AsRef::as_ref)
            .collect::<IndexSet<&str>>()
            .into_iter()
            .collect();

        let mut all_tasks: IndexMap<TaskId, Arc<Task>> = IndexMap::new();
        for catalog in catalogs {
            for task in catalog.iter() {
                match all_tasks.get(&task.id) {
                    Some(existing) if **existing != **task => {
                        return Err(Error::cannot_build_graph(
                            task.id.as_str(),
                            "conflicting definitions across catalogs",
                        ));
                    }
                    Some(_) => {}
                    None => {
                        all_tasks.insert(task.id.clone(), Arc::clone(task));
                    }
                }
            }
        }

        let mut graph = ExecutionGraph::new();
        for task in all_tasks.values() {
            if self.excluded.is_some_and(|excluded| excluded.contains(&task.id)) {
                debug!(task = %task.id, "task excluded by its condition, omitted");
            } else if is_active(task, &active) {
                graph.add_task(Arc::clone(task))?;
            } else {
                debug!(task = %task.id, "task outside active groups, omitted");
            }
        }

        let universe = group_universe(all_tasks.values());
        let mut members: HashMap<&str, Vec<&TaskId>> = HashMap::new();
        for (id, task) in &all_tasks {
            for group in &task.groups {
                members.entry(group.as_str()).or_default().push(id);
            }
        }
        let lookup = DependencyLookup {
            tasks: &all_tasks,
            universe: &universe,
            members: &members,
            strict: self.settings.strict_dependencies,
        };

        let included: Vec<Arc<Task>> = graph.tasks().cloned().collect();
        for task in &included {
            for before in lookup.resolve(task, &task.requires)? {
                link(&mut graph, before, &task.id)?;
            }
            for after in lookup.resolve(task, &task.required_for)? {
                link(&mut graph, &task.id, after)?;
            }
        }

        debug!(
            tasks = graph.len(),
            edges = graph.edge_count(),
            "built execution graph"
        );
        Ok(graph)
    }
}

fn is_active(task: &Task, active: &[&str]) -> bool {
    if active.is_empty() {
        return false;
    }
    if task.roles == Roles::Any {
        return true;
    }
    GroupPatternMatcher::new(task.membership_tokens()).applies(active)
}

fn group_universe<'t, I>(tasks: I) -> Vec<String>
where
    I: IntoIterator<Item = &'t Arc<Task>>,
{
    let mut universe = IndexSet::new();
    for task in tasks {
        for group in &task.groups {
            universe.insert(group.clone());
        }
    }
    universe.into_iter().collect()
}

fn link(graph: &mut ExecutionGraph, before: &TaskId, after: &TaskId) -> Result<()> {
    if !graph.contains(before) || !graph.contains(after) {
        debug!(before = %before, after = %after, "dependency on omitted task dropped");
        return Ok(());
    }
    graph.add_edge(before, after)?;
    Ok(())
}

struct DependencyLookup<'g> {
    tasks: &'g IndexMap<TaskId, Arc<Task>>,
    universe: &'g [String],
    members: &'g HashMap<&'g str, Vec<&'g TaskId>>,
    strict: bool,
}

impl<'g> DependencyLookup<'g> {
    /// Concrete tasks named by dependency tokens, first-seen order, without `task` itself
    fn resolve(&self, task: &Task, tokens: &[String]) -> Result<Vec<&'g TaskId>> {
        let mut targets: IndexSet<&'g TaskId> = IndexSet::new();
        let mut patterns: Vec<&str> = Vec::new();

        for token in tokens {
            match GroupToken::parse(token) {
                GroupToken::Literal(_) => match self.tasks.get_key_value(token.as_str()) {
                    Some((id, _)) => {
                        targets.insert(id);
                    }
                    None => patterns.push(token),
                },
                _ => patterns.push(token),
            }
        }

        let resolution = GroupPatternMatcher::new(&patterns).resolve(self.universe);
        for name in &resolution.unresolved {
            if self.strict {
                return Err(Error::task_not_found(name.as_str(), task.id.as_str()));
            }
            warn!(
                task = %task.id,
                token = %name,
                "dependency names neither a task nor a known group"
            );
        }
        for group in &resolution.groups {
            if let Some(ids) = self.members.get(group.as_str()) {
                targets.extend(ids.iter().copied());
            }
        }

        targets.shift_remove(&task.id);
        Ok(targets.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inheritance::resolve;
    use rollout_core::{TaskCatalog, TaskTemplate, TaskType};
    use serde_json::json;

    fn shell(id: &str, groups: &[&str]) -> TaskTemplate {
        TaskTemplate::new(id)
            .with_type(TaskType::Shell)
            .with_groups(groups.iter().copied())
            .with_parameter("cmd", json!(format!("echo {id}")))
    }

    fn merged(templates: Vec<TaskTemplate>) -> MergedCatalog {
        resolve(&TaskCatalog::new("r", templates).unwrap()).unwrap()
    }

    fn edge_names(graph: &ExecutionGraph) -> Vec<(String, String)> {
        graph
            .edges()
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    fn edge(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn test_requires_task_id() {
        let catalog = merged(vec![
            shell("A", &["controller"]),
            shell("B", &["controller"]).with_requires(["A"]),
        ]);
        let settings = PlannerSettings::default();
        let graph = GraphBuilder::new(&settings)
            .build(&catalog, &["controller"])
            .unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(edge_names(&graph), vec![edge("A", "B")]);
        assert_eq!(graph.predecessors("B"), vec![&TaskId::from("A")]);
        assert_eq!(graph.successors("A"), vec![&TaskId::from("B")]);
    }

    #[test]
    fn test_required_for_points_outwards() {
        let catalog = merged(vec![
            shell("netconfig", &["controller"]).with_required_for(["deploy_end"]),
            shell("deploy_end", &["controller"]),
        ]);
        let settings = PlannerSettings::default();
        let graph = GraphBuilder::new(&settings)
            .build(&catalog, &["controller"])
            .unwrap();

        assert!(graph.has_edge("netconfig", "deploy_end"));
        assert!(!graph.has_edge("deploy_end", "netconfig"));
    }

    #[test]
    fn test_required_for_group_points_outwards_to_every_member() {
        let catalog = merged(vec![
            shell("hiera", &["controller"]).with_required_for(["/controller/"]),
            shell("c1", &["primary-controller"]),
            shell("c2", &["controller"]),
            shell("m1", &["compute"]),
        ]);
        let settings = PlannerSettings::default();
        let graph = GraphBuilder::new(&settings)
            .build(&catalog, &["primary-controller", "controller", "compute"])
            .unwrap();

        assert_eq!(
            edge_names(&graph),
            vec![edge("hiera", "c1"), edge("hiera", "c2")]
        );
        assert!(!graph.has_edge("hiera", "hiera"));
    }

    #[test]
    fn test_required_for_wildcard_with_exclusion() {
        let catalog = merged(vec![
            shell("a", &["controller"]),
            shell("first", &["controller"]).with_required_for(["*", "!compute"]),
            shell("b", &["compute"]),
            shell("c", &["mongo"]),
        ]);
        let settings = PlannerSettings::default();
        let graph = GraphBuilder::new(&settings)
            .build(&catalog, &["controller", "compute", "mongo"])
            .unwrap();

        assert_eq!(
            edge_names(&graph),
            vec![edge("first", "a"), edge("first", "c")]
        );
    }

    #[test]
    fn test_literal_naming_task_and_group_resolves_to_task() {
        let catalog = merged(vec![
            shell("database", &["controller"]),
            shell("mysql", &["database"]),
            shell("app", &["controller"]).with_requires(["database"]),
        ]);
        let settings = PlannerSettings::default();
        let graph = GraphBuilder::new(&settings)
            .build(&catalog, &["controller", "database"])
            .unwrap();

        assert_eq!(edge_names(&graph), vec![edge("database", "app")]);
        assert!(!graph.has_edge("mysql", "app"));
    }

    #[test]
    fn test_excluded_task_still_resolves_when_strict() {
        let catalog = merged(vec![
            shell("ceph", &["controller"]),
            shell("b", &["controller"]).with_requires(["ceph"]),
        ]);
        let settings = PlannerSettings::builder()
            .strict_dependencies(true)
            .build()
            .unwrap();
        let excluded: HashSet<TaskId> = [TaskId::from("ceph")].into_iter().collect();

        let graph = GraphBuilder::new(&settings)
            .excluding(&excluded)
            .build(&catalog, &["controller"])
            .unwrap();

        assert_eq!(graph.task_ids().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_excluded_group_member_keeps_group_known_when_strict() {
        let catalog = merged(vec![
            shell("swift", &["storage"]),
            shell("b", &["controller"]).with_requires(["storage"]),
        ]);
        let settings = PlannerSettings::builder()
            .strict_dependencies(true)
            .build()
            .unwrap();
        let excluded: HashSet<TaskId> = [TaskId::from("swift")].into_iter().collect();

        let graph = GraphBuilder::new(&settings)
            .excluding(&excluded)
            .build(&catalog, &["controller", "storage"])
            .unwrap();

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_group_token_expands_to_member_tasks() {
        let catalog = merged(vec![
            shell("c1", &["primary-controller"]),
            shell("c2", &["controller"]),
            shell("m1", &["compute"]),
            shell("final", &["compute"]).with_requires(["/controller/"]),
        ]);
        let settings = PlannerSettings::default();
        let graph = GraphBuilder::new(&settings)
            .build(&catalog, &["primary-controller", "controller", "compute"])
            .unwrap();

        assert_eq!(
            edge_names(&graph),
            vec![edge("c1", "final"), edge("c2", "final")]
        );
    }

    #[test]
    fn test_wildcard_with_exclusion_skips_self() {
        let catalog = merged(vec![
            shell("a", &["controller"]),
            shell("b", &["compute"]),
            shell("last", &["controller"]).with_requires(["*", "!compute"]),
        ]);
        let settings = PlannerSettings::default();
        let graph = GraphBuilder::new(&settings)
            .build(&catalog, &["controller", "compute"])
            .unwrap();

        assert_eq!(edge_names(&graph), vec![edge("a", "last")]);
    }

    #[test]
    fn test_omitted_task_is_not_bridged() {
        let catalog = merged(vec![
            shell("x", &["controller"]),
            shell("y", &["compute"]).with_requires(["x"]),
            shell("z", &["controller"]).with_requires(["y"]),
        ]);
        let settings = PlannerSettings::default();
        let graph = GraphBuilder::new(&settings)
            .build(&catalog, &["controller"])
            .unwrap();

        assert!(graph.contains("x"));
        assert!(!graph.contains("y"));
        assert!(graph.contains("z"));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_any_role_and_empty_active_set() {
        let catalog = merged(vec![
            shell("everywhere", &[]).with_roles(Roles::Any),
            shell("a", &["controller"]),
        ]);
        let settings = PlannerSettings::default();
        let builder = GraphBuilder::new(&settings);

        let graph = builder.build(&catalog, &["compute"]).unwrap();
        assert_eq!(graph.task_ids().collect::<Vec<_>>(), vec!["everywhere"]);

        let empty: [&str; 0] = [];
        assert!(builder.build(&catalog, &empty).unwrap().is_empty());
    }

    #[test]
    fn test_role_only_task_referenced_by_id() {
        let catalog = merged(vec![
            shell("hiera", &[]).with_roles(Roles::Listed(vec!["controller".into()])),
            shell("globals", &["controller"]).with_requires(["hiera"]),
        ]);
        let settings = PlannerSettings::default();
        let graph = GraphBuilder::new(&settings)
            .build(&catalog, &["controller"])
            .unwrap();

        assert_eq!(edge_names(&graph), vec![edge("hiera", "globals")]);
    }

    #[test]
    fn test_unresolved_literal_is_lenient_by_default() {
        let catalog = merged(vec![shell("a", &["controller"]).with_requires(["ghost"])]);
        let settings = PlannerSettings::default();
        let graph = GraphBuilder::new(&settings)
            .build(&catalog, &["controller"])
            .unwrap();

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_unresolved_literal_fails_when_strict() {
        let catalog = merged(vec![shell("a", &["controller"]).with_requires(["ghost"])]);
        let settings = PlannerSettings::builder()
            .strict_dependencies(true)
            .build()
            .unwrap();
        let result = GraphBuilder::new(&settings).build(&catalog, &["controller"]);

        match result {
            Err(Error::TaskNotFound { task, referenced_by }) => {
                assert_eq!(task, "ghost");
                assert_eq!(referenced_by, "a");
            }
            other => panic!("expected TaskNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_layers_must_agree() {
        let base = merged(vec![shell("a", &["controller"])]);
        let same = merged(vec![shell("a", &["controller"])]);
        let changed = merged(vec![shell("a", &["compute"])]);
        let settings = PlannerSettings::default();
        let builder = GraphBuilder::new(&settings);

        let graph = builder
            .build_layered(&[&base, &same], &["controller"])
            .unwrap();
        assert_eq!(graph.len(), 1);

        let result = builder.build_layered(&[&base, &changed], &["controller"]);
        assert!(matches!(result, Err(Error::CannotBuildGraph { .. })));
    }

    #[test]
    fn test_add_task_identical_is_noop() {
        let catalog = merged(vec![shell("a", &["controller"])]);
        let task = Arc::clone(catalog.get("a").unwrap());
        let mut graph = ExecutionGraph::new();

        graph.add_task(Arc::clone(&task)).unwrap();
        graph.add_task(Arc::clone(&task)).unwrap();
        assert_eq!(graph.len(), 1);

        let mut changed = (*task).clone();
        changed.groups.push("compute".into());
        let result = graph.add_task(Arc::new(changed));
        assert!(matches!(result, Err(Error::CannotBuildGraph { .. })));
    }

    #[test]
    fn test_self_loop_ignored_and_unknown_endpoint_rejected() {
        let catalog = merged(vec![shell("a", &[])]);
        let mut graph = ExecutionGraph::new();
        graph
            .add_task(Arc::clone(catalog.get("a").unwrap()))
            .unwrap();

        assert!(!graph.add_edge("a", "a").unwrap());
        assert!(graph.add_edge("a", "b").is_err());
    }

    #[test]
    fn test_induced_keeps_order_and_inner_edges() {
        let catalog = merged(vec![
            shell("a", &["g"]),
            shell("b", &["g"]).with_requires(["a"]),
            shell("c", &["g"]).with_requires(["b"]),
        ]);
        let settings = PlannerSettings::default();
        let graph = GraphBuilder::new(&settings).build(&catalog, &["g"]).unwrap();

        let sub = graph.induced(|task| task.id.as_str() != "a");
        assert_eq!(sub.task_ids().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(edge_names(&sub), vec![edge("b", "c")]);
        assert_eq!(sub.position("c"), Some(1));
    }
}
