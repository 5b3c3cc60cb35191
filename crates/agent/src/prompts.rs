//! Prompt templates for the orchestration loop.

use crate::decoder::{FINAL_ANSWER, SelectionMarker};

/// Appended as a user message at the start of every round.
pub const STEP_INSTRUCTION: &str =
    "Identify the next step to take. Focus on the current single step and do not overthink.";

/// Role prompt of the top-level orchestrator.
pub const ORCHESTRATOR_ROLE: &str = "You have to utilize your available workers to solve the task. \
Please give instructions based on your expertise to complete the task. \
An instruction is typically a sub-task or question.";

/// Role prompt of a worker when its config does not supply one.
pub const WORKER_ROLE: &str = "You are a specialist worker. Solve the task you are given \
using your available tools, and report only the verified result.";

pub fn default_role(marker: SelectionMarker) -> &'static str {
    match marker {
        SelectionMarker::Worker => ORCHESTRATOR_ROLE,
        SelectionMarker::Tool => WORKER_ROLE,
    }
}

/// The system prompt: role, task, capability hints and the marker protocol.
pub fn system_prompt(role: &str, task: &str, hints: &str, marker: SelectionMarker) -> String {
    let label = marker.label();
    let selection = marker.marker();
    let hints = if hints.trim().is_empty() {
        "(none available)\n".to_string()
    } else {
        hints.to_string()
    };

    format!(
        "{role}\n\
Here is the overall task: {task}. Never forget the task!\n\
You can use the following {label}s:\n\
{hints}\
At each step, if you identify a {label} that is required to complete the task, you must name it in the format of:\n\
{open}NAME exactly as it appears in the list{close}\n\
You do not need to call a {label} every time. Before you call one, think carefully about whether it is necessary.\n\
When you believe you have completed the overall task, you MUST output the final answer in the following format:\n\
{final_open}[brief one-line summary of what the task result is]{final_close}\n\
Before this line, double check that your result answers the task. \
If the task is not yet completed, do NOT output the final answer; keep working until it is complete.",
        open = selection.open,
        close = selection.close,
        final_open = FINAL_ANSWER.open,
        final_close = FINAL_ANSWER.close,
    )
}

/// The user message carrying the task.
pub fn task_message(task: &str) -> String {
    format!("Task: {task}")
}

/// The one-off instruction of an elicitation call.
pub fn elicitation_instruction(tool_name: &str) -> String {
    format!("Identify the parameters for the tool {tool_name} to perform the current step")
}

/// How a successful call is recorded in history.
pub fn tool_result(tool_name: &str, parameters: &serde_json::Value, result: &str) -> String {
    format!(
        "I have successfully called the tool {tool_name} with the parameters of {parameters} and get the following result: {result}"
    )
}

/// How a recoverable failure is recorded in history.
pub fn error_notice(error: &dyn std::fmt::Display) -> String {
    format!("[error] {error}. Choose another step or use a name from the available list.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_prompt_teaches_the_markers() {
        let prompt = system_prompt(ORCHESTRATOR_ROLE, "add 2 and 3", "- calc: Arithmetic\n", SelectionMarker::Worker);
        assert!(prompt.starts_with(ORCHESTRATOR_ROLE));
        assert!(prompt.contains("add 2 and 3"));
        assert!(prompt.contains("- calc: Arithmetic"));
        assert!(prompt.contains("<WORKER>NAME"));
        assert!(prompt.contains("<FINAL_ANSWER>"));
        assert!(!prompt.contains("<TOOL>"));
    }

    #[test]
    fn worker_prompt_uses_tool_marker() {
        let prompt = system_prompt(WORKER_ROLE, "t", "", SelectionMarker::Tool);
        assert!(prompt.contains("<TOOL>NAME"));
        assert!(prompt.contains("(none available)"));
    }

    #[test]
    fn tool_result_format() {
        let text = tool_result("add", &json!({"a": 2, "b": 3}), "5");
        assert_eq!(
            text,
            r#"I have successfully called the tool add with the parameters of {"a":2,"b":3} and get the following result: 5"#
        );
    }
}
