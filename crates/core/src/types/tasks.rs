//! Task templates as found in a release catalog and their merged form

use crate::constants::ANY_ROLE;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

/// Type-specific key/value parameters of a task
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Identifier of a task, unique within one catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for TaskId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TaskId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TaskId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of work a task performs on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Shell,
    Puppet,
    UploadFile,
    Sync,
    /// Marker grouping other tasks; never sent to a node
    #[serde(alias = "role")]
    Group,
    /// Marker delimiting a deployment stage
    Stage,
    /// Placeholder that keeps ordering but does nothing
    Skipped,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Shell => "shell",
            TaskType::Puppet => "puppet",
            TaskType::UploadFile => "upload_file",
            TaskType::Sync => "sync",
            TaskType::Group => "group",
            TaskType::Stage => "stage",
            TaskType::Skipped => "skipped",
        }
    }

    /// Marker types take part in ordering only
    pub fn is_marker(&self) -> bool {
        matches!(self, TaskType::Group | TaskType::Stage | TaskType::Skipped)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roles a task applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RolesRepr", into = "RolesRepr")]
pub enum Roles {
    /// The `"*"` wildcard: every node
    Any,
    /// Role names or group pattern tokens
    Listed(Vec<String>),
}

impl Default for Roles {
    fn default() -> Self {
        Roles::Listed(Vec::new())
    }
}

impl Roles {
    pub fn is_any(&self) -> bool {
        matches!(self, Roles::Any)
    }

    /// Listed tokens, empty for the wildcard
    pub fn tokens(&self) -> &[String] {
        match self {
            Roles::Any => &[],
            Roles::Listed(tokens) => tokens,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RolesRepr {
    Single(String),
    List(Vec<String>),
}

impl TryFrom<RolesRepr> for Roles {
    type Error = String;

    fn try_from(repr: RolesRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            RolesRepr::Single(role) if role == ANY_ROLE => Ok(Roles::Any),
            RolesRepr::Single(role) if role.is_empty() => Err("role name cannot be empty".into()),
            RolesRepr::Single(role) => Ok(Roles::Listed(vec![role])),
            RolesRepr::List(roles) => Ok(Roles::Listed(roles)),
        }
    }
}

impl From<Roles> for RolesRepr {
    fn from(roles: Roles) -> Self {
        match roles {
            Roles::Any => RolesRepr::Single(ANY_ROLE.to_string()),
            Roles::Listed(roles) => RolesRepr::List(roles),
        }
    }
}

/// A raw catalog entry before inheritance is applied.
///
/// Every field except `id` and `inherits` is optional so that a child can
/// leave it to its ancestors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: TaskId,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Roles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_for: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inherits: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl TaskTemplate {
    /// Create an empty template with only an id
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            task_type: None,
            groups: None,
            roles: None,
            requires: None,
            required_for: None,
            parameters: None,
            inherits: Vec::new(),
            condition: None,
        }
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_roles(mut self, roles: Roles) -> Self {
        self.roles = Some(roles);
        self
    }

    pub fn with_requires<I, S>(mut self, requires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = Some(requires.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_required_for<I, S>(mut self, required_for: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_for = Some(required_for.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters
            .get_or_insert_with(Parameters::new)
            .insert(key.into(), value);
        self
    }

    pub fn with_inherits<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.inherits = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// A task after its inheritance chain has been folded into it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub groups: Vec<String>,
    pub roles: Roles,
    pub requires: Vec<String>,
    pub required_for: Vec<String>,
    pub parameters: Parameters,
    pub condition: Option<String>,
}

impl Task {
    /// Group and role tokens that decide where this task applies
    pub fn membership_tokens(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .chain(self.roles.tokens())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_roles_wildcard_round_trip() {
        let roles: Roles = serde_json::from_value(json!("*")).unwrap();
        assert_eq!(roles, Roles::Any);
        assert_eq!(serde_json::to_value(&roles).unwrap(), json!("*"));
    }

    #[test]
    fn test_roles_list_and_single() {
        let roles: Roles = serde_json::from_value(json!(["controller", "compute"])).unwrap();
        assert_eq!(roles.tokens(), ["controller", "compute"]);

        let roles: Roles = serde_json::from_value(json!("mongo")).unwrap();
        assert_eq!(roles.tokens(), ["mongo"]);
    }

    #[test]
    fn test_template_deserialization() {
        let template: TaskTemplate = serde_json::from_value(json!({
            "id": "netconfig",
            "type": "puppet",
            "groups": ["controller"],
            "requires": ["hiera"],
            "parameters": {"puppet_manifest": "netconfig.pp", "timeout": 300}
        }))
        .unwrap();

        assert_eq!(template.id.as_str(), "netconfig");
        assert_eq!(template.task_type, Some(TaskType::Puppet));
        assert_eq!(template.roles, None);
        assert!(template.inherits.is_empty());
        assert_eq!(template.parameters.unwrap()["timeout"], json!(300));
    }

    #[test]
    fn test_role_alias_maps_to_group() {
        let task_type: TaskType = serde_json::from_value(json!("role")).unwrap();
        assert_eq!(task_type, TaskType::Group);
        assert!(task_type.is_marker());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_value::<TaskType>(json!("reboot"));
        assert!(result.is_err());
    }
}
