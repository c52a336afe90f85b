//! Running a single work item

use std::process::Stdio;

use async_trait::async_trait;
use hy_core::transport::ssh::shell_quote;
use hy_protocol::WorkItem;
use tokio::process::Command;

/// Output reported for an item that passed
pub const SUCCESS_OUTPUT: &str = ".";

/// Runs one work item and describes the outcome.
///
/// Returns [`SUCCESS_OUTPUT`] or an empty string when the item passed,
/// and failure detail otherwise. Failures to run the item at all are
/// reported as output too; a runner never errors.
#[async_trait]
pub trait WorkRunner: Send + Sync {
    /// Run `item` to completion
    async fn run(&self, item: &WorkItem) -> String;
}

/// Runs a shell command template against each item
#[derive(Debug, Clone)]
pub struct CommandRunner {
    template: String,
}

impl CommandRunner {
    /// Create a runner for `template`. `{file}` or `{}` is replaced with
    /// the quoted item; without a placeholder the item is appended.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Build the shell command line for `item`
    pub fn command_line(&self, item: &WorkItem) -> String {
        let quoted = shell_quote(item.as_str());
        if self.template.contains("{file}") {
            self.template.replace("{file}", &quoted)
        } else if self.template.contains("{}") {
            self.template.replace("{}", &quoted)
        } else {
            format!("{} {}", self.template, quoted)
        }
    }
}

#[async_trait]
impl WorkRunner for CommandRunner {
    async fn run(&self, item: &WorkItem) -> String {
        let command_line = self.command_line(item);
        tracing::debug!("Running {}", command_line);

        let output = Command::new("sh")
            .arg("-c")
            .arg(&command_line)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => return format!("Failed to run `{}`: {}", command_line, e),
        };

        if output.status.success() {
            return SUCCESS_OUTPUT.to_string();
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if text.trim().is_empty() {
            format!("{} failed: `{}` exited with {}", item, command_line, output.status)
        } else {
            text
        }
    }
}
