//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use deploycheck_core::types::ScenarioKind;

/// deploycheck -- verifies that a Helm chart installs, heals, serves and
/// scales on a live cluster.
///
/// Use `deploycheck <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "deploycheck", version, about, long_about = None)]
pub struct Cli {
    /// Path to the deploycheck.toml configuration file.
    #[arg(short, long, default_value = "deploycheck.toml", global = true)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run verification scenarios against the cluster.
    Run(RunArgs),

    /// List available scenarios.
    List,

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- run ----

/// Run verification scenarios. Without arguments every scenario runs.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Scenarios to run (install-upgrade, failure-recovery, load, scaling).
    #[arg(value_name = "SCENARIO")]
    pub scenarios: Vec<ScenarioKind>,

    /// Keep running the remaining scenarios after a failure.
    #[arg(long)]
    pub keep_going: bool,

    /// Chart directory (overrides chart.chart_path).
    #[arg(long)]
    pub chart: Option<PathBuf>,

    /// Values file (overrides chart.values_file).
    #[arg(long)]
    pub values: Option<PathBuf>,

    /// kubeconfig context (overrides cluster.kube_context).
    #[arg(long)]
    pub kube_context: Option<String>,

    /// Release name prefix (overrides chart.release_prefix).
    #[arg(long)]
    pub release_prefix: Option<String>,

    /// Namespace prefix (overrides chart.namespace_prefix).
    #[arg(long)]
    pub namespace_prefix: Option<String>,

    /// Use `<prefix>-<scenario>` names without a random suffix.
    #[arg(long)]
    pub fixed_names: bool,

    /// Deadline in seconds for each wait (overrides wait.timeout_secs).
    #[arg(long, value_name = "SECS")]
    pub wait_timeout: Option<u64>,

    /// Number of load requests (overrides load.requests).
    #[arg(long)]
    pub requests: Option<u32>,
}

// ---- config ----

/// Manage deploycheck configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, cluster, chart, wait, load, scaling).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_run_defaults() {
        let cli = Cli::try_parse_from(["deploycheck", "run"]).expect("should parse 'run'");
        assert_eq!(cli.config, PathBuf::from("deploycheck.toml"));
        assert_eq!(cli.output, OutputFormat::Text);
        match cli.command {
            Commands::Run(run_args) => {
                assert!(run_args.scenarios.is_empty(), "no scenarios means all");
                assert!(!run_args.keep_going);
                assert!(!run_args.fixed_names);
                assert!(run_args.chart.is_none());
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_selected_scenarios() {
        let cli = Cli::try_parse_from(["deploycheck", "run", "load", "scaling"])
            .expect("should parse scenario names");
        match cli.command {
            Commands::Run(run_args) => {
                assert_eq!(
                    run_args.scenarios,
                    vec![ScenarioKind::Load, ScenarioKind::Scaling]
                );
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_unknown_scenario_fails() {
        let result = Cli::try_parse_from(["deploycheck", "run", "chaos-monkey"]);
        assert!(result.is_err(), "unknown scenario should be rejected");
    }

    #[test]
    fn test_cli_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "deploycheck",
            "run",
            "--keep-going",
            "--chart",
            "deploy/helm/chart",
            "--values",
            "tests/serve/pipeline-values.yaml",
            "--kube-context",
            "kind-ci",
            "--release-prefix",
            "ci-release",
            "--namespace-prefix",
            "ci-ns",
            "--fixed-names",
            "--wait-timeout",
            "300",
            "--requests",
            "10",
        ])
        .expect("should parse overrides");
        match cli.command {
            Commands::Run(run_args) => {
                assert!(run_args.keep_going);
                assert_eq!(run_args.chart, Some(PathBuf::from("deploy/helm/chart")));
                assert_eq!(
                    run_args.values,
                    Some(PathBuf::from("tests/serve/pipeline-values.yaml"))
                );
                assert_eq!(run_args.kube_context.as_deref(), Some("kind-ci"));
                assert_eq!(run_args.release_prefix.as_deref(), Some("ci-release"));
                assert_eq!(run_args.namespace_prefix.as_deref(), Some("ci-ns"));
                assert!(run_args.fixed_names);
                assert_eq!(run_args.wait_timeout, Some(300));
                assert_eq!(run_args.requests, Some(10));
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_list() {
        let cli = Cli::try_parse_from(["deploycheck", "list"]).expect("should parse 'list'");
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_cli_parse_config_validate() {
        let cli = Cli::try_parse_from(["deploycheck", "config", "validate"])
            .expect("should parse 'config validate'");
        match cli.command {
            Commands::Config(config_args) => {
                assert!(matches!(config_args.action, ConfigAction::Validate));
            }
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from(["deploycheck", "config", "show", "--section", "wait"])
            .expect("should parse 'config show --section'");
        match cli.command {
            Commands::Config(config_args) => match config_args.action {
                ConfigAction::Show { section } => {
                    assert_eq!(section.as_deref(), Some("wait"));
                }
                _ => panic!("expected Show action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "deploycheck",
            "list",
            "--output",
            "json",
            "--log-level",
            "debug",
            "--config",
            "/etc/deploycheck.toml",
        ])
        .expect("global flags should be accepted after the subcommand");
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, PathBuf::from("/etc/deploycheck.toml"));
    }

    #[test]
    fn test_cli_parse_invalid_output_format() {
        let result = Cli::try_parse_from(["deploycheck", "list", "--output", "yaml"]);
        assert!(result.is_err(), "yaml is not a supported output format");
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["deploycheck"]).is_err());
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
