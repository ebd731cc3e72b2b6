use std::path::PathBuf;

/// Result type alias for rollout operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for deployment planning
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A referenced task id is absent from the catalog
    #[error("task '{task}' referenced by '{referenced_by}' not found in catalog")]
    TaskNotFound { task: String, referenced_by: String },

    /// C3 merge could not pick a consistent head
    #[error("cannot linearize inheritance of task '{task}': conflicting order among {remaining:?}")]
    LinearizationImpossible {
        task: String,
        remaining: Vec<Vec<String>>,
    },

    /// The `inherits` relation contains a cycle
    #[error("wrong tasks hierarchy: task '{task}' inherits from itself")]
    WrongTasksHierarchy { task: String },

    /// Ancestors of a task disagree on its type
    #[error("task '{task}' inherits type '{found}' but its hierarchy declares '{expected}'")]
    DifferentTasksTypesInheritance {
        task: String,
        expected: String,
        found: String,
    },

    /// No task in the inheritance chain declares a type
    #[error("task '{task}' has no type in its inheritance chain")]
    UndefinedTaskType { task: String },

    /// Two templates with the same id but different content
    #[error("duplicate task id '{task}' with conflicting content")]
    DuplicateTaskId { task: String },

    /// The execution graph could not be assembled
    #[error("cannot build graph: task '{task}': {message}")]
    CannotBuildGraph { task: String, message: String },

    /// Requested task ids are missing from the graph
    #[error("tasks not present in deployment graph: {}", .missing.join(", "))]
    InvalidData { missing: Vec<String> },

    /// A dependency cycle
    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    CyclicGraphError { cycle: Vec<String> },

    /// A dependency crosses stage barriers backwards
    #[error("task '{task}' cannot depend on '{dependency}' which runs in a later stage")]
    StageOrderViolation { task: String, dependency: String },

    /// Task type without a serializer (strict mode only)
    #[error("task '{task}' has unsupported type '{task_type}'")]
    UnsupportedTaskType { task: String, task_type: String },

    /// Type-specific parameters are missing or malformed
    #[error("invalid parameters for task '{task}': {message}")]
    InvalidTaskParameters { task: String, message: String },

    /// A task condition could not be evaluated
    #[error("failed to evaluate condition of task '{task}': {message}")]
    Condition { task: String, message: String },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// File system operations
    #[error("file system operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// YAML serialization/deserialization errors
    #[error("YAML error: {message}")]
    Yaml {
        message: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::Yaml {
            message: error.to_string(),
            source: error,
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    /// Create a task-not-found error
    #[must_use]
    pub fn task_not_found(task: impl Into<String>, referenced_by: impl Into<String>) -> Self {
        Error::TaskNotFound {
            task: task.into(),
            referenced_by: referenced_by.into(),
        }
    }

    /// Create a graph construction error
    #[must_use]
    pub fn cannot_build_graph(task: impl Into<String>, message: impl Into<String>) -> Self {
        Error::CannotBuildGraph {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Create an invalid parameters error
    #[must_use]
    pub fn invalid_parameters(task: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidTaskParameters {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a file system error
    #[must_use]
    pub fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::FileSystem {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_data_lists_every_missing_id() {
        let err = Error::InvalidData {
            missing: vec!["missing1".to_string(), "missing2".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "tasks not present in deployment graph: missing1, missing2"
        );
    }

    #[test]
    fn test_cycle_display() {
        let err = Error::CyclicGraphError {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_json_conversion() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = source.into();
        assert!(matches!(err, Error::Json { .. }));
    }
}
