//! Task and result message types.

use serde::{Deserialize, Serialize};

/// Wire form of one chunk plus its processing parameters.
///
/// Published once per chunk by the coordinator; identity is `id`.
/// The broker may redeliver a task after a consumer failure, so task
/// processing must be side-effect-free besides publishing one result.
///
/// # Examples
/// ```
/// use linecut::protocol::TaskMessage;
///
/// let task = TaskMessage {
///     id: "chunk-0".to_string(),
///     chunk: "a,b,c\n".to_string(),
///     delimiter: ",".to_string(),
///     fields: vec![1, 3],
///     suppress: false,
/// };
/// let json = serde_json::to_string(&task).unwrap();
/// assert!(json.contains("\"chunk\""));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskMessage {
    /// Ordinal chunk identifier (`chunk-<n>`), unique within a run
    pub id: String,
    /// Raw chunk content, newline-terminated lines
    pub chunk: String,
    /// Field delimiter for this run
    pub delimiter: String,
    /// 1-based field selectors, ascending and deduplicated
    pub fields: Vec<i32>,
    /// Suppress lines that contain no delimiter
    pub suppress: bool,
}

/// A worker's output (or error) for a specific task.
///
/// Correlated to its task purely by `task_id`; the coordinator makes
/// no assumption about delivery order. `error` is set only when the
/// worker could not process the task at all - per-line failures are
/// skipped inside the worker and never surface here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultMessage {
    pub task_id: String,
    /// Newline-joined output, trailing newline iff non-empty
    pub output: String,
    pub worker_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultMessage {
    /// A result counts toward quorum only when it carries no error.
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_message_wire_field_names() {
        let task = TaskMessage {
            id: "chunk-0".to_string(),
            chunk: "a,b\n".to_string(),
            delimiter: ",".to_string(),
            fields: vec![1],
            suppress: true,
        };

        let value: serde_json::Value = serde_json::to_value(&task).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["id", "chunk", "delimiter", "fields", "suppress"] {
            assert!(obj.contains_key(key), "missing wire field {key}");
        }
    }

    #[test]
    fn test_result_message_omits_absent_error() {
        let result = ResultMessage {
            task_id: "chunk-3".to_string(),
            output: "a\n".to_string(),
            worker_id: "worker-1".to_string(),
            error: None,
        };

        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("error"));
        assert!(result.is_clean());
    }

    #[test]
    fn test_result_message_roundtrip_with_error() {
        let result = ResultMessage {
            task_id: "chunk-1".to_string(),
            output: String::new(),
            worker_id: "worker-2".to_string(),
            error: Some("delimiter is empty".to_string()),
        };

        let json = serde_json::to_string(&result).unwrap();
        let decoded: ResultMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, result);
        assert!(!decoded.is_clean());
    }
}
