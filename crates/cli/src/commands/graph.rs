use super::PlanInputs;
use anyhow::Result;
use rollout_task::PlanRequest;
use std::io::Write;

pub fn execute(inputs: &PlanInputs, out: &mut dyn Write) -> Result<()> {
    let loaded = inputs.load()?;

    let mut request = PlanRequest::new().with_end_tasks(inputs.end.iter().cloned());
    if let Some(conditions) = &loaded.conditions {
        request = request.with_conditions(conditions, &loaded.cluster);
    }
    let graph = loaded
        .planner
        .validated_graph(&loaded.catalog, &loaded.nodes, &request)?;

    writeln!(out, "# tasks ({})", graph.graph().len())?;
    for id in graph.order() {
        if let Some(task) = graph.graph().get(id) {
            writeln!(out, "{id} [{}]", task.task_type)?;
        }
    }
    writeln!(out, "# edges ({})", graph.graph().edge_count())?;
    for (before, after) in graph.graph().edges() {
        writeln!(out, "{before} -> {after}")?;
    }
    Ok(())
}
