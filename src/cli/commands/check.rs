//! Check command implementation.
//!
//! The `reprun check` command validates a pipeline and prints the order its
//! stages would run in, without launching anything.

use crate::cli::args::CheckArgs;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};

/// The check command implementation.
pub struct CheckCommand {
    args: CheckArgs,
}

impl CheckCommand {
    /// Create a new check command.
    pub fn new(args: CheckArgs) -> Self {
        Self { args }
    }
}

impl Command for CheckCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let pipeline = Pipeline::load(&self.args.pipeline)?;

        ui.show_header(&format!("Pipeline {}", pipeline.name()));
        ui.message("Execution order:");
        for (index, stage) in pipeline.ordered_stages().enumerate() {
            let deps = if stage.depends_on.is_empty() {
                String::new()
            } else {
                format!(" (after {})", stage.depends_on.join(", "))
            };
            ui.message(&format!("  {}. {}{}", index + 1, stage.name, deps));
        }

        let groups = pipeline.graph().parallel_groups()?;
        if groups.iter().any(|g| g.len() > 1) {
            ui.message("Parallel groups:");
            for (index, group) in groups.iter().enumerate() {
                ui.message(&format!("  {}: {}", index + 1, group.join(", ")));
            }
        }

        if !pipeline.requires().is_empty() {
            ui.message(&format!("Requires: {}", pipeline.requires().join(", ")));
        }

        let label = if pipeline.len() == 1 { "stage" } else { "stages" };
        ui.success(&format!("Pipeline is valid ({} {})", pipeline.len(), label));
        Ok(CommandResult::success())
    }
}
