//! Target nodes and deployment stages

use serde::{Deserialize, Serialize};

/// A cluster node that receives a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentNode {
    pub uid: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl DeploymentNode {
    pub fn new<I, S>(uid: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uid: uid.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

/// Synthetic deployment stage; every task of an earlier stage is dispatched
/// before any task of a later one
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreDeployment,
    Deployment,
    PostDeployment,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PreDeployment => "pre_deployment",
            Stage::Deployment => "deployment",
            Stage::PostDeployment => "post_deployment",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::PreDeployment < Stage::Deployment);
        assert!(Stage::Deployment < Stage::PostDeployment);
    }

    #[test]
    fn test_node_roles_default_to_empty() {
        let node: DeploymentNode = serde_json::from_str(r#"{"uid": "1"}"#).unwrap();
        assert!(node.roles.is_empty());
    }
}
