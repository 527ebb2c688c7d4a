//! Prompts that seed the agent conversation.

/// Where the task's instruction document lives inside the sandbox.
pub const DEFAULT_INSTRUCTION_PATH: &str = "/task/instruction.md";

/// Printed when the turn budget runs out before the model stops calling tools.
pub const BUDGET_EXHAUSTED_MESSAGE: &str = "Agent reached maximum number of turns.";

/// System prompt naming the instruction document.
pub fn build_system_prompt(instruction_path: &str) -> String {
    format!(
        "You are a skilled software engineer. You have access to tools for running \
         bash commands and editing files. Read {} to understand the task, then \
         complete it. Work step by step. When you are done, call no more tools.",
        instruction_path
    )
}

/// Opening user message.
pub fn build_user_prompt(instruction_path: &str) -> String {
    format!("Read {} and complete the task.", instruction_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_name_instruction_path() {
        let system = build_system_prompt(DEFAULT_INSTRUCTION_PATH);
        assert!(system.contains("Read /task/instruction.md to understand the task"));
        assert!(system.ends_with("When you are done, call no more tools."));
        assert_eq!(
            build_user_prompt(DEFAULT_INSTRUCTION_PATH),
            "Read /task/instruction.md and complete the task."
        );
    }
}
