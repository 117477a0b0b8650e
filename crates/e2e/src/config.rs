//! Harness configuration
//!
//! Loaded from `e2e.toml`; every field has a default so a missing file or a
//! partial one both work.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{E2eError, E2eResult};
use crate::locator::LocatorMap;
use crate::wait::WaitConfig;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "e2e.toml";

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root URL of the app under test
    pub base_url: String,

    /// Text the opened page must show before a scenario goes on
    pub landmark_text: String,

    /// Directory feature discovery starts from
    pub features_root: PathBuf,

    /// Globs selecting feature files, relative to `features_root`
    pub spec_pattern: Vec<String>,

    /// Globs excluded from discovery
    pub exclude_spec_pattern: Vec<String>,

    /// Where failure screenshots go
    pub screenshots_folder: PathBuf,

    /// Where the JSON report goes
    pub reports_folder: PathBuf,

    /// Capture a screenshot when a step fails
    pub screenshot_on_failure: bool,

    /// Upper bound for element lookups and reads
    pub default_command_timeout_ms: u64,

    /// Delay between DOM polls
    pub poll_interval_ms: u64,

    /// Upper bound for a page load
    pub page_load_timeout_ms: u64,

    /// Whole-suite deadline; remaining scenarios are aborted when it passes
    pub suite_timeout_secs: Option<u64>,

    /// Extra attempts for a failing scenario
    pub retries: u32,

    /// Dashboard project identifier, echoed into the report
    pub project_id: Option<String>,

    pub browser: BrowserSettings,

    pub reporter: ReporterOptions,

    /// Selector overrides keyed by element name
    pub locators: BTreeMap<String, String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            landmark_text: "Environment Todo".to_string(),
            features_root: PathBuf::from("."),
            spec_pattern: vec!["**/features/*.{feature,features}".to_string()],
            exclude_spec_pattern: vec!["**/pages/*".to_string()],
            screenshots_folder: PathBuf::from("reports/screenshots"),
            reports_folder: PathBuf::from("reports"),
            screenshot_on_failure: true,
            default_command_timeout_ms: 4000,
            poll_interval_ms: 50,
            page_load_timeout_ms: 60_000,
            suite_timeout_secs: None,
            retries: 0,
            project_id: None,
            browser: BrowserSettings::default(),
            reporter: ReporterOptions::default(),
            locators: BTreeMap::new(),
        }
    }
}

/// Browser launch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Extra command-line switches
    pub args: Vec<String>,
    /// Chrome binary; auto-detected when unset
    pub chrome_path: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 720,
            args: Vec::new(),
            chrome_path: None,
        }
    }
}

/// How screenshots end up in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenshotEmbedding {
    /// Reference the file on disk
    Path,
    /// Inline as a base64 data URI
    Inline,
}

/// Report output options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterOptions {
    /// Include the pass/fail totals block
    pub charts: bool,
    pub report_page_title: String,
    /// Inline failure screenshots into their step; otherwise link the file
    pub embedded_screenshots: bool,
    /// Inline other binary attachments. Screenshots follow
    /// `embedded_screenshots` alone.
    pub inline_assets: bool,
    /// Keep every attempt of a retried scenario, not just the last
    pub save_all_attempts: bool,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            charts: true,
            report_page_title: "Todo E2E Report".to_string(),
            embedded_screenshots: true,
            inline_assets: true,
            save_all_attempts: false,
        }
    }
}

impl ReporterOptions {
    pub fn screenshot_embedding(&self) -> ScreenshotEmbedding {
        if self.embedded_screenshots {
            ScreenshotEmbedding::Inline
        } else {
            ScreenshotEmbedding::Path
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when it is absent.
    pub fn load(path: &Path) -> E2eResult<Self> {
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| E2eError::Config(format!("cannot serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(E2eError::Config("base_url must not be empty".into()));
        }
        if !self.base_url.starts_with("http://")
            && !self.base_url.starts_with("https://")
            && !self.base_url.starts_with("file://")
        {
            return Err(E2eError::Config(format!(
                "base_url '{}' must be an http(s) or file URL",
                self.base_url
            )));
        }
        if self.spec_pattern.is_empty() {
            return Err(E2eError::Config("spec_pattern must name at least one glob".into()));
        }
        if self.default_command_timeout_ms == 0 {
            return Err(E2eError::Config("default_command_timeout_ms must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(E2eError::Config("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig::new(
            Duration::from_millis(self.default_command_timeout_ms),
            Duration::from_millis(self.poll_interval_ms),
        )
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn suite_timeout(&self) -> Option<Duration> {
        self.suite_timeout_secs.map(Duration::from_secs)
    }

    /// Todo page locators with this config's overrides applied.
    pub fn locator_map(&self) -> E2eResult<LocatorMap> {
        LocatorMap::todo_page().with_overrides(&self.locators)
    }
}
