//! `deploycheck config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use deploycheck_core::config::DeploycheckConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: [&str; 6] = ["general", "cluster", "chart", "wait", "load", "scaling"];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Loads and validates the configuration file, reporting any errors.
///
/// # Errors
///
/// Returns `CliError::Config` if the file is missing, unparsable or invalid.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match DeploycheckConfig::load(config_path).await {
        Ok(_) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: false,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

/// Shows the effective configuration (file + env overrides + defaults),
/// optionally a single section.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = DeploycheckConfig::load(config_path).await?;
    let (config_toml, config) = render_section(&config, section.as_deref())?;

    let report = ConfigReport {
        source: config_path.display().to_string(),
        section,
        config,
        config_toml,
    };
    writer.render(&report)?;
    Ok(())
}

/// Renders the whole configuration or one section as TOML text and as a
/// JSON value.
fn render_section(
    config: &DeploycheckConfig,
    section: Option<&str>,
) -> Result<(String, serde_json::Value), CliError> {
    match section {
        None => render(config),
        Some("general") => render(&config.general),
        Some("cluster") => render(&config.cluster),
        Some("chart") => render(&config.chart),
        Some("wait") => render(&config.wait),
        Some("load") => render(&config.load),
        Some("scaling") => render(&config.scaling),
        Some(other) => Err(CliError::Command(format!(
            "unknown section: {other} (expected: {})",
            SECTIONS.join(", ")
        ))),
    }
}

fn render<T: Serialize>(value: &T) -> Result<(String, serde_json::Value), CliError> {
    let failed = |e: &dyn std::fmt::Display| {
        CliError::Command(format!("failed to serialize configuration: {e}"))
    };
    let text = toml::to_string_pretty(value).map_err(|e| failed(&e))?;
    let json = serde_json::to_value(value).map_err(|e| failed(&e))?;
    Ok((text, json))
}

/// Configuration display report.
///
/// `config_toml` is only used for text rendering; JSON output carries
/// `config` instead.
#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub config: serde_json::Value,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(section) = &self.section {
            let label = format!("[{section}]");
            writeln!(w, "Configuration {} (source: {})", label.bold(), self.source)?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }
        writeln!(w)?;
        write!(w, "{}", self.config_toml)
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Empty when valid
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}
