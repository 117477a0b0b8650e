//! Command line of the suite binary (`tests/e2e.rs`).

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::{HarnessConfig, DEFAULT_CONFIG_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DriverKind {
    /// Headless Chrome against a running app
    Chromium,
    /// In-process model of the Todo app
    Simulated,
}

#[derive(Parser, Debug)]
#[command(name = "todo-e2e")]
#[command(about = "Behaviour-driven E2E tests for the Todo app")]
pub struct SuiteArgs {
    /// Path to the harness config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Directory to discover feature files under
    #[arg(short, long)]
    pub features: Option<PathBuf>,

    /// Run only scenarios carrying this tag (repeatable)
    #[arg(short, long)]
    pub tag: Vec<String>,

    /// Run only the scenario with this name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Browser driver
    #[arg(long, value_enum, env = "TODO_E2E_DRIVER", default_value = "simulated")]
    pub driver: DriverKind,

    /// Root URL of the app under test
    #[arg(long, env = "TODO_E2E_BASE_URL")]
    pub base_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Extra attempts for a failing scenario
    #[arg(long)]
    pub retries: Option<u32>,

    /// Output directory for the report
    #[arg(short, long)]
    pub reports: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Test-name filters and flags `cargo test` forwards to every test
    /// binary; ignored here.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    pub libtest: Vec<String>,
}

impl SuiteArgs {
    /// Apply command-line overrides on top of the loaded config.
    pub fn apply_overrides(&self, config: &mut HarnessConfig) {
        if let Some(root) = &self.features {
            config.features_root = root.clone();
        }
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if let Some(reports) = &self.reports {
            config.screenshots_folder = reports.join("screenshots");
            config.reports_folder = reports.clone();
        }
    }
}
