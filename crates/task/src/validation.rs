//! Graph validation and ancestor subgraph extraction
//!
//! A freshly built graph is `DeploymentGraph<Built>`. Validation checks the
//! requested end tasks, narrows the graph to their ancestors and proves it
//! acyclic, producing `DeploymentGraph<Validated>` together with a stable
//! topological order. Only a validated graph can be serialized.

use crate::graph::ExecutionGraph;
use indexmap::IndexSet;
use rollout_core::{Error, Result, TaskId};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::marker::PhantomData;
use tracing::{debug, instrument};

/// Phantom marker for a graph straight out of the builder
#[derive(Debug, Clone, Copy)]
pub struct Built;

/// Phantom marker for a graph that passed validation
#[derive(Debug, Clone, Copy)]
pub struct Validated;

/// Execution graph tagged with its pipeline state
#[derive(Debug, Clone)]
pub struct DeploymentGraph<State = Built> {
    graph: ExecutionGraph,
    order: Vec<TaskId>,
    _state: PhantomData<State>,
}

pub type ValidatedGraph = DeploymentGraph<Validated>;

impl DeploymentGraph<Built> {
    pub fn new(graph: ExecutionGraph) -> Self {
        Self {
            graph,
            order: Vec::new(),
            _state: PhantomData,
        }
    }

    /// Validate against the requested end tasks; an empty list keeps the whole graph
    #[instrument(skip_all, fields(tasks = self.graph.len(), ends = end_tasks.len()))]
    pub fn validate<S: AsRef<str>>(self, end_tasks: &[S]) -> Result<ValidatedGraph> {
        validate_tasks_exist(end_tasks, &self.graph)?;

        let graph = if end_tasks.is_empty() {
            self.graph
        } else {
            find_ancestors_subgraph(&self.graph, end_tasks)?
        };
        let order = topological_order(&graph)?;
        debug!(tasks = graph.len(), edges = graph.edge_count(), "graph validated");

        Ok(DeploymentGraph {
            graph,
            order,
            _state: PhantomData,
        })
    }
}

impl<State> DeploymentGraph<State> {
    pub fn graph(&self) -> &ExecutionGraph {
        &self.graph
    }
}

impl DeploymentGraph<Validated> {
    /// Whole-graph topological order, ties broken by catalog order
    pub fn order(&self) -> &[TaskId] {
        &self.order
    }

    pub fn into_graph(self) -> ExecutionGraph {
        self.graph
    }
}

/// `validateTasksExist(ids, graph)`: fails once with every missing id
pub fn validate_tasks_exist<S: AsRef<str>>(ids: &[S], graph: &ExecutionGraph) -> Result<()> {
    let missing: IndexSet<&str> = ids
        .iter()
        .map(AsRef::as_ref)
        .filter(|id| !graph.contains(id))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    Err(Error::InvalidData {
        missing: missing.into_iter().map(str::to_string).collect(),
    })
}

/// `findSubgraph(graph, end)`: `end` plus all of its transitive predecessors
pub fn find_subgraph(graph: &ExecutionGraph, end: &str) -> Result<ExecutionGraph> {
    find_ancestors_subgraph(graph, &[end])
}

/// Union of the ancestor subgraphs of every end task
pub fn find_ancestors_subgraph<S: AsRef<str>>(
    graph: &ExecutionGraph,
    ends: &[S],
) -> Result<ExecutionGraph> {
    validate_tasks_exist(ends, graph)?;

    let adjacency = Adjacency::new(graph);
    let roots: Vec<usize> = ends
        .iter()
        .filter_map(|end| graph.position(end.as_ref()))
        .collect();

    let mut walk = Walk::new(graph.len());
    if let Some(stack) = walk.run(&roots, &adjacency.predecessors) {
        // The walk follows edges backwards, so the path reads against edge direction
        let mut cycle = stack;
        cycle.reverse();
        return Err(cycle_error(graph, &cycle));
    }

    let subgraph = graph.induced(|task| {
        graph
            .position(&task.id)
            .is_some_and(|pos| walk.color[pos] == Color::Done)
    });
    debug!(tasks = subgraph.len(), "extracted ancestor subgraph");
    Ok(subgraph)
}

/// `topologicalOrder(graph)`: ties go to the earlier catalog entry
pub fn topological_order(graph: &ExecutionGraph) -> Result<Vec<TaskId>> {
    Ok(ordered_positions(graph, |pos| pos)?
        .into_iter()
        .filter_map(|pos| graph.id_at(pos).cloned())
        .collect())
}

/// Kahn's algorithm over insertion positions; among ready tasks the smallest
/// `key` goes first, then the earlier position.
pub(crate) fn ordered_positions<K, F>(graph: &ExecutionGraph, key: F) -> Result<Vec<usize>>
where
    K: Ord,
    F: Fn(usize) -> K,
{
    let adjacency = Adjacency::new(graph);
    let mut in_degree: Vec<usize> = adjacency.predecessors.iter().map(Vec::len).collect();

    let mut ready: BinaryHeap<Reverse<(K, usize)>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &degree)| degree == 0)
        .map(|(pos, _)| Reverse((key(pos), pos)))
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(Reverse((_, pos))) = ready.pop() {
        order.push(pos);
        for &next in &adjacency.successors[pos] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse((key(next), next)));
            }
        }
    }

    if order.len() < graph.len() {
        let cycle = find_cycle_positions(graph, &adjacency)
            .unwrap_or_else(|| (0..graph.len()).filter(|p| in_degree[*p] > 0).collect());
        return Err(cycle_error(graph, &cycle));
    }
    Ok(order)
}

/// First dependency cycle in catalog order, closed (first id repeated at the end)
pub fn find_cycle(graph: &ExecutionGraph) -> Option<Vec<TaskId>> {
    let adjacency = Adjacency::new(graph);
    let cycle = find_cycle_positions(graph, &adjacency)?;
    Some(close_cycle(graph, &cycle))
}

fn find_cycle_positions(graph: &ExecutionGraph, adjacency: &Adjacency) -> Option<Vec<usize>> {
    let roots: Vec<usize> = (0..graph.len()).collect();
    Walk::new(graph.len()).run(&roots, &adjacency.successors)
}

fn close_cycle(graph: &ExecutionGraph, cycle: &[usize]) -> Vec<TaskId> {
    let mut ids: Vec<TaskId> = cycle
        .iter()
        .filter_map(|&pos| graph.id_at(pos).cloned())
        .collect();
    if let Some(first) = ids.first().cloned() {
        ids.push(first);
    }
    ids
}

fn cycle_error(graph: &ExecutionGraph, cycle: &[usize]) -> Error {
    Error::CyclicGraphError {
        cycle: close_cycle(graph, cycle)
            .iter()
            .map(ToString::to_string)
            .collect(),
    }
}

struct Adjacency {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl Adjacency {
    fn new(graph: &ExecutionGraph) -> Self {
        let mut successors = vec![Vec::new(); graph.len()];
        let mut predecessors = vec![Vec::new(); graph.len()];
        for (from, to) in graph.edge_positions() {
            successors[from].push(to);
            predecessors[to].push(from);
        }
        Self {
            successors,
            predecessors,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Unseen,
    OnPath,
    Done,
}

/// Iterative depth-first walk with three-color cycle detection
struct Walk {
    color: Vec<Color>,
}

impl Walk {
    fn new(len: usize) -> Self {
        Self {
            color: vec![Color::Unseen; len],
        }
    }

    /// Visit everything reachable from `roots` through `edges`. Returns the
    /// positions on the current path from the re-entered node onwards when a
    /// cycle is found.
    fn run(&mut self, roots: &[usize], edges: &[Vec<usize>]) -> Option<Vec<usize>> {
        for &root in roots {
            if self.color[root] != Color::Unseen {
                continue;
            }
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            self.color[root] = Color::OnPath;

            while let Some(frame) = stack.last_mut() {
                let (node, cursor) = *frame;
                match edges[node].get(cursor) {
                    Some(&next) => {
                        frame.1 += 1;
                        match self.color[next] {
                            Color::Unseen => {
                                self.color[next] = Color::OnPath;
                                stack.push((next, 0));
                            }
                            Color::OnPath => {
                                let start = stack.iter().position(|(pos, _)| *pos == next)?;
                                return Some(stack[start..].iter().map(|(pos, _)| *pos).collect());
                            }
                            Color::Done => {}
                        }
                    }
                    None => {
                        self.color[node] = Color::Done;
                        stack.pop();
                    }
                }
            }
        }
        None
    }
}
