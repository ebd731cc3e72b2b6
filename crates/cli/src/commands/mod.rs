use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use rollout_config::{load_nodes, CatalogLoader, FsCatalogLoader, PlannerSettings};
use rollout_core::{DeploymentNode, TaskCatalog};
use rollout_task::{ClusterModel, Planner, StaticConditions};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub mod graph;
pub mod plan;

#[derive(Subcommand)]
pub enum Commands {
    /// Compute and print the ordered task list of every node
    Plan {
        #[command(flatten)]
        inputs: PlanInputs,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Print the validated dependency graph
    Graph {
        #[command(flatten)]
        inputs: PlanInputs,
    },
}

impl Commands {
    pub fn execute(self, out: &mut dyn Write) -> Result<()> {
        match self {
            Commands::Plan { inputs, format } => plan::execute(&inputs, format, out),
            Commands::Graph { inputs } => graph::execute(&inputs, out),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

/// Inputs shared by every planning command
#[derive(Args, Debug, Clone)]
pub struct PlanInputs {
    /// Directory holding one sub-directory of task files per release
    #[arg(long, value_name = "DIR")]
    pub catalog: PathBuf,

    /// Release to plan for
    #[arg(long)]
    pub release: String,

    /// YAML or JSON list of nodes with their roles
    #[arg(long, value_name = "FILE")]
    pub nodes: PathBuf,

    /// Planner settings file
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// YAML map of condition expression to its pre-computed result
    #[arg(long, value_name = "FILE")]
    pub conditions: Option<PathBuf>,

    /// Only plan these tasks and what they depend on (repeatable)
    #[arg(long = "end", value_name = "TASK")]
    pub end: Vec<String>,
}

/// Everything a planning command needs, read from disk
pub struct Loaded {
    pub planner: Planner,
    pub catalog: TaskCatalog,
    pub nodes: Vec<DeploymentNode>,
    pub conditions: Option<StaticConditions>,
    pub cluster: ClusterModel,
}

impl PlanInputs {
    pub fn load(&self) -> Result<Loaded> {
        let settings = match &self.settings {
            Some(path) => PlannerSettings::from_path(path)
                .with_context(|| format!("failed to read settings from {}", path.display()))?,
            None => PlannerSettings::default(),
        }
        .with_env_overrides()?;
        settings.validate()?;

        let catalog = FsCatalogLoader::new(&self.catalog)
            .load(&self.release)
            .with_context(|| format!("failed to load catalog for release {}", self.release))?;
        let nodes = load_nodes(&self.nodes)
            .with_context(|| format!("failed to read nodes from {}", self.nodes.display()))?;
        let conditions = self
            .conditions
            .as_deref()
            .map(load_conditions)
            .transpose()?;

        Ok(Loaded {
            planner: Planner::new(settings),
            catalog,
            nodes,
            conditions,
            cluster: ClusterModel::default(),
        })
    }
}

fn load_conditions(path: &Path) -> Result<StaticConditions> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read conditions from {}", path.display()))?;
    let table: HashMap<String, bool> = serde_yaml::from_str(&content)
        .with_context(|| format!("invalid conditions file {}", path.display()))?;
    Ok(table.into_iter().collect())
}
