/// Constants used throughout the rollout codebase
// Role wildcard accepted in the `roles` field of a task template
pub const ANY_ROLE: &str = "*";

// Synthetic stage groups
pub const PRE_DEPLOYMENT_GROUP: &str = "pre_deployment";
pub const POST_DEPLOYMENT_GROUP: &str = "post_deployment";

// Serializer defaults
pub const DEFAULT_CWD: &str = "/";
pub const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_PUPPET_TIMEOUT_SECS: u64 = 360;
pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 180;

// Environment variable names
pub const ROLLOUT_LOG_VAR: &str = "ROLLOUT_LOG";
pub const ROLLOUT_PRIORITY_STRATEGY_VAR: &str = "ROLLOUT_PRIORITY_STRATEGY";
pub const ROLLOUT_STRICT_DEPENDENCIES_VAR: &str = "ROLLOUT_STRICT_DEPENDENCIES";
pub const ROLLOUT_STRICT_TASK_TYPES_VAR: &str = "ROLLOUT_STRICT_TASK_TYPES";

// Catalog file extensions understood by the filesystem loader
pub const CATALOG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];
