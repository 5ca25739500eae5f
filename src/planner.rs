//! Dry-run planning output.
//!
//! Renders the task list a run *would* execute, without resolving
//! handlers or touching the network.

use crate::job::Task;

/// Produces one description line per task, preserving task order.
pub fn describe_tasks(tasks: &[Task]) -> Vec<String> {
    tasks.iter().map(describe_task).collect()
}

fn describe_task(task: &Task) -> String {
    let params = serde_json::Value::Object(task.job.parameters.clone());
    format!(
        "{} [{}] -> '{}' (params={})",
        task.job_id(),
        task.source(),
        task.keyword,
        params
    )
}
