//! Topic names for the two durable channels.
//!
//! Tasks are consumed through an MQTT v5 shared subscription so the
//! broker hands each task to exactly one puller across all worker
//! processes. Results go to a plain topic owned by the coordinator.

/// Task channel topic.
pub const TASKS: &str = "linecut/tasks";

/// Result channel topic.
pub const RESULTS: &str = "linecut/results";

/// Shared-subscription group for worker task pullers.
pub const WORKER_GROUP: &str = "linecut-workers";

/// Subscription filter workers use to pull tasks.
pub fn shared_task_filter() -> String {
    format!("$share/{WORKER_GROUP}/{TASKS}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_task_filter() {
        assert_eq!(shared_task_filter(), "$share/linecut-workers/linecut/tasks");
    }
}
