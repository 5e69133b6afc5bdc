//! `deploycheck list` command handler

use std::io::Write;

use serde::Serialize;

use deploycheck_core::types::ScenarioKind;

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `list` command.
pub fn execute(writer: &OutputWriter) -> Result<(), CliError> {
    writer.render(&ScenarioList::all())
}

/// Available scenarios, in default execution order.
#[derive(Serialize)]
pub struct ScenarioList {
    pub scenarios: Vec<ScenarioEntry>,
}

#[derive(Serialize)]
pub struct ScenarioEntry {
    pub name: &'static str,
    pub description: &'static str,
}

impl ScenarioList {
    fn all() -> Self {
        Self {
            scenarios: ScenarioKind::ALL
                .iter()
                .map(|kind| ScenarioEntry {
                    name: kind.as_str(),
                    description: kind.description(),
                })
                .collect(),
        }
    }
}

impl Render for ScenarioList {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{}", "Scenarios:".bold())?;
        for entry in &self.scenarios {
            writeln!(w, "  {:<18} {}", entry.name, entry.description)?;
        }
        Ok(())
    }
}
