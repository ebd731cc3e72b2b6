use super::{OutputFormat, PlanInputs};
use anyhow::Result;
use rollout_task::PlanRequest;
use std::io::Write;
use tracing::info;

pub fn execute(inputs: &PlanInputs, format: OutputFormat, out: &mut dyn Write) -> Result<()> {
    let loaded = inputs.load()?;

    let mut request = PlanRequest::new().with_end_tasks(inputs.end.iter().cloned());
    if let Some(conditions) = &loaded.conditions {
        request = request.with_conditions(conditions, &loaded.cluster);
    }

    let plan = loaded.planner.plan(&loaded.catalog, &loaded.nodes, &request)?;
    info!(nodes = plan.node_count(), tasks = plan.task_count(), "plan ready");

    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&plan)?)?,
        OutputFormat::Yaml => write!(out, "{}", serde_yaml::to_string(&plan)?)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::fixture;
    use tempfile::TempDir;

    #[test]
    fn test_plan_json_output() {
        let temp_dir = TempDir::new().unwrap();
        let inputs = fixture(temp_dir.path());
        let mut out = Vec::new();

        execute(&inputs, OutputFormat::Json, &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let ids: Vec<&str> = value["1"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["task_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(value["1"][1]["priority"], 1);
    }

    #[test]
    fn test_plan_with_conditions_and_yaml_output() {
        let temp_dir = TempDir::new().unwrap();
        let mut inputs = fixture(temp_dir.path());
        inputs.conditions = Some(temp_dir.path().join("conditions.yaml"));
        let mut out = Vec::new();

        execute(&inputs, OutputFormat::Yaml, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("task_id: B"));
        assert!(!text.contains("task_id: C"));
    }

    #[test]
    fn test_unknown_release() {
        let temp_dir = TempDir::new().unwrap();
        let mut inputs = fixture(temp_dir.path());
        inputs.release = "10.0".to_string();

        let err = execute(&inputs, OutputFormat::Json, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("10.0"));
    }
}
