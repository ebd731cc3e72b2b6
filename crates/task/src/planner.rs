//! End-to-end planning: catalog and nodes in, per-node plan out

use crate::conditions::{excluded_by_conditions, ClusterModel, ConditionEvaluator};
use crate::graph::GraphBuilder;
use crate::inheritance::resolve;
use crate::serializer::TaskSerializer;
use crate::validation::{DeploymentGraph, ValidatedGraph};
use indexmap::IndexSet;
use rollout_config::PlannerSettings;
use rollout_core::{DeploymentNode, DeploymentPlan, Error, Result, TaskCatalog};
use std::collections::HashSet;
use tracing::{info, instrument};

/// Per-request inputs beyond the catalog and nodes
#[derive(Default)]
pub struct PlanRequest<'r> {
    end_tasks: Vec<String>,
    conditions: Option<(&'r dyn ConditionEvaluator, &'r ClusterModel)>,
}

impl<'r> PlanRequest<'r> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the plan to these tasks and everything they depend on
    pub fn with_end_tasks<I, S>(mut self, end_tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.end_tasks = end_tasks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_conditions(
        mut self,
        evaluator: &'r dyn ConditionEvaluator,
        cluster: &'r ClusterModel,
    ) -> Self {
        self.conditions = Some((evaluator, cluster));
        self
    }

    pub fn end_tasks(&self) -> &[String] {
        &self.end_tasks
    }
}

/// Runs inheritance, graph construction, validation and serialization
#[derive(Debug, Clone, Default)]
pub struct Planner {
    settings: PlannerSettings,
}

impl Planner {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Every role of every node followed by the stage groups, de-duplicated
    pub fn active_groups(&self, nodes: &[DeploymentNode]) -> Vec<String> {
        let mut active: IndexSet<&str> = nodes
            .iter()
            .flat_map(|node| node.roles.iter().map(String::as_str))
            .collect();
        active.extend(self.settings.stage_groups());
        active.into_iter().map(str::to_string).collect()
    }

    /// Plan every node. Nothing is returned unless every step succeeds.
    #[instrument(skip_all, fields(release = %catalog.release(), nodes = nodes.len()))]
    pub fn plan(
        &self,
        catalog: &TaskCatalog,
        nodes: &[DeploymentNode],
        request: &PlanRequest<'_>,
    ) -> Result<DeploymentPlan> {
        let graph = self.validated_graph(catalog, nodes, request)?;
        let serializer = TaskSerializer::new(&self.settings);

        let mut plan = DeploymentPlan::new();
        for node in nodes {
            plan.insert(node.uid.clone(), serializer.serialize(&graph, node)?);
        }

        info!(
            nodes = plan.node_count(),
            tasks = plan.task_count(),
            strategy = %self.settings.priority_strategy,
            "deployment plan computed"
        );
        Ok(plan)
    }

    /// Steps up to and including validation
    pub fn validated_graph(
        &self,
        catalog: &TaskCatalog,
        nodes: &[DeploymentNode],
        request: &PlanRequest<'_>,
    ) -> Result<ValidatedGraph> {
        check_unique_uids(nodes)?;

        let merged = resolve(catalog)?;
        let excluded = match request.conditions {
            Some((evaluator, cluster)) => excluded_by_conditions(&merged, evaluator, cluster)?,
            None => HashSet::new(),
        };

        let active = self.active_groups(nodes);
        let graph = GraphBuilder::new(&self.settings)
            .excluding(&excluded)
            .build(&merged, &active)?;
        DeploymentGraph::new(graph).validate(request.end_tasks())
    }
}

fn check_unique_uids(nodes: &[DeploymentNode]) -> Result<()> {
    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !seen.insert(node.uid.as_str()) {
            return Err(Error::configuration(format!(
                "node '{}' is listed more than once",
                node.uid
            )));
        }
    }
    Ok(())
}
