//! Step status reported back to the CI host
//!
//! Renderers never exit the process themselves. They record failures here
//! and the binary turns the final state into an exit code. When workflow
//! commands are enabled every message is also printed in the host's
//! `::error::` annotation syntax so it shows up on the run page.

use tracing::{error, info};

/// Failure state and annotations collected during one step invocation
#[derive(Debug, Default)]
pub struct StepStatus {
    failure: Option<String>,
    errors: Vec<String>,
    workflow_commands: bool,
}

impl StepStatus {
    /// Status that prints workflow commands to stdout
    pub fn github() -> Self {
        Self {
            workflow_commands: true,
            ..Self::default()
        }
    }

    /// Status that only records, used for offline rendering and tests
    pub fn recording() -> Self {
        Self::default()
    }

    /// Mark the step as failed. The first message wins as the step's result.
    pub fn set_failed(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        if self.workflow_commands {
            println!("::error::{}", escape_data(&message));
        }
        if self.failure.is_none() {
            self.failure = Some(message);
        }
    }

    /// Emit an error annotation without failing the step
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        if self.workflow_commands {
            println!("::error::{}", escape_data(&message));
        }
        self.errors.push(message);
    }

    pub fn start_group(&self, title: &str) {
        if self.workflow_commands {
            println!("::group::{}", escape_data(title));
        } else {
            info!("{}", title);
        }
    }

    pub fn end_group(&self) {
        if self.workflow_commands {
            println!("::endgroup::");
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

/// Escape a message for the workflow command protocol
fn escape_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
