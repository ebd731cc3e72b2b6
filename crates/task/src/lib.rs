//! Deployment task planning
//!
//! Takes a release's task catalog and the target nodes and computes, for every
//! node, a dependency-respecting ordered list of commands:
//!
//! 1. [`inheritance`] folds `inherits` chains (C3 linearization) into merged tasks
//! 2. [`graph`] builds the dependency graph, expanding group patterns from [`patterns`]
//! 3. [`validation`] checks requested tasks, extracts ancestor subgraphs, rejects cycles
//! 4. [`serializer`] orders and prioritises each node's tasks and normalizes commands
//!
//! [`planner::Planner`] runs the whole pipeline.

pub mod conditions;
pub mod dispatch;
pub mod graph;
pub mod inheritance;
pub mod patterns;
pub mod planner;
pub mod serializer;
pub mod validation;

pub use conditions::{excluded_by_conditions, ClusterModel, ConditionEvaluator, StaticConditions};
pub use dispatch::{DispatchPlan, Dispatcher, RecordingDispatcher};
pub use graph::{ExecutionGraph, GraphBuilder};
pub use inheritance::{resolve, InheritanceResolver, MergedCatalog};
pub use patterns::{all_matches, matches, GroupPatternMatcher, GroupToken, Resolution};
pub use planner::{PlanRequest, Planner};
pub use serializer::{applies_to_node, TaskSerializer};
pub use validation::{
    find_ancestors_subgraph, find_cycle, find_subgraph, topological_order, validate_tasks_exist,
    Built, DeploymentGraph, Validated, ValidatedGraph,
};
