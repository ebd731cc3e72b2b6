//! Hand-off of finished plans to the transport that delivers them

use parking_lot::Mutex;
use rollout_core::{DeploymentPlan, Result, SerializedTask};
use tracing::info;

/// Sink for one node's ordered task list
pub trait Dispatcher {
    fn dispatch(&self, node_uid: &str, tasks: &[SerializedTask]) -> Result<()>;
}

/// Sends a computed plan node by node, in node input order
pub trait DispatchPlan {
    /// Returns the number of tasks handed to the dispatcher
    fn dispatch(&self, dispatcher: &dyn Dispatcher) -> Result<usize>;
}

impl DispatchPlan for DeploymentPlan {
    fn dispatch(&self, dispatcher: &dyn Dispatcher) -> Result<usize> {
        let mut sent = 0;
        for (node_uid, tasks) in self.iter() {
            if tasks.is_empty() {
                continue;
            }
            dispatcher.dispatch(node_uid, tasks)?;
            sent += tasks.len();
        }
        info!(nodes = self.node_count(), tasks = sent, "plan dispatched");
        Ok(sent)
    }
}

/// Keeps every dispatched batch in memory
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    batches: Mutex<Vec<(String, Vec<SerializedTask>)>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<(String, Vec<SerializedTask>)> {
        self.batches.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.lock().is_empty()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, node_uid: &str, tasks: &[SerializedTask]) -> Result<()> {
        self.batches
            .lock()
            .push((node_uid.to_string(), tasks.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_core::{Error, ShellParameters, TaskCommand};

    fn row(node: &str, id: &str, priority: u32) -> SerializedTask {
        SerializedTask {
            node_uid: node.to_string(),
            task_id: id.into(),
            priority,
            command: TaskCommand::Shell(ShellParameters {
                cmd: format!("echo {id}"),
                timeout: 180,
                cwd: "/".to_string(),
            }),
        }
    }

    #[test]
    fn test_dispatch_in_node_order_skipping_empty_nodes() {
        let mut plan = DeploymentPlan::new();
        plan.insert("2", vec![row("2", "a", 0), row("2", "b", 1)]);
        plan.insert("1", Vec::new());
        plan.insert("3", vec![row("3", "a", 0)]);

        let dispatcher = RecordingDispatcher::new();
        let sent = plan.dispatch(&dispatcher).unwrap();

        assert_eq!(sent, 3);
        let nodes: Vec<String> = dispatcher.batches().into_iter().map(|(uid, _)| uid).collect();
        assert_eq!(nodes, vec!["2", "3"]);
    }

    struct FailingDispatcher;

    impl Dispatcher for FailingDispatcher {
        fn dispatch(&self, node_uid: &str, _tasks: &[SerializedTask]) -> Result<()> {
            Err(Error::configuration(format!("queue unavailable for node {node_uid}")))
        }
    }

    #[test]
    fn test_dispatch_error_propagates() {
        let mut plan = DeploymentPlan::new();
        plan.insert("1", vec![row("1", "a", 0)]);

        assert!(plan.dispatch(&FailingDispatcher).is_err());
    }
}
