use std::process::Output;

#[cfg(test)]
use mockall::automock;

/// Abstraction over external program execution (the espflash CLI).
/// This allows mocking OS-level commands in tests.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Execute an external command with the given arguments and wait for it.
    fn execute(&self, program: &str, args: Vec<String>) -> Result<Output, String>;
}

/// Real implementation that delegates to std::process::Command
#[derive(Default)]
pub struct RealCommandExecutor;

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, program: &str, args: Vec<String>) -> Result<Output, String> {
        log::debug!("Running {} {}", program, args.join(" "));
        std::process::Command::new(program)
            .args(&args)
            .output()
            .map_err(|e| format!("Failed to execute {}: {}", program, e))
    }
}
