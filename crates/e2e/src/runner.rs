//! Scenario runner: validates features against a step registry, then runs
//! every selected scenario in its own browser session.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::HarnessConfig;
use crate::driver::{BrowserDriver, SessionFactory};
use crate::error::{E2eError, E2eResult};
use crate::feature::{Feature, Scenario, Step};
use crate::report::ReportSink;
use crate::steps::{StepArgs, StepKind, StepRegistry};

/// Builds the per-scenario world around a fresh session.
pub trait WorldFactory<W>: Send + Sync {
    fn create(&self, driver: Arc<dyn BrowserDriver>) -> E2eResult<W>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
    /// Not run because an earlier step failed or the suite was aborted
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    /// Cut short or never started because the suite was cancelled
    Aborted,
}

/// Why a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// `Then` comparison did not hold
    Assertion,
    /// `Given` found the app in the wrong state
    Precondition,
    /// Lookup, timeout or driver failure
    Infrastructure,
}

impl FailureKind {
    fn of(error: &E2eError) -> Self {
        match error {
            E2eError::AssertionFailed { .. } => FailureKind::Assertion,
            E2eError::Precondition(_) => FailureKind::Precondition,
            _ => FailureKind::Infrastructure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenshotRecord {
    pub path: PathBuf,
    pub mime: String,
    /// Filled in by reports that inline assets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_uri: Option<String>,
}

/// Result of one step line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub keyword: String,
    pub kind: StepKind,
    pub text: String,
    pub line: usize,
    pub args: StepArgs,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotRecord>,
}

impl StepResult {
    fn new(step: &Step, status: StepStatus) -> Self {
        Self {
            keyword: step.keyword.clone(),
            kind: step.kind,
            text: step.text.clone(),
            line: step.line,
            args: StepArgs::default(),
            status,
            duration_ms: 0,
            failure: None,
            error: None,
            expected: None,
            actual: None,
            screenshot: None,
        }
    }

    fn fail(&mut self, error: &E2eError) {
        self.status = StepStatus::Failed;
        self.failure = Some(FailureKind::of(error));
        self.error = Some(error.to_string());
        if let E2eError::AssertionFailed {
            expected, actual, ..
        } = error
        {
            self.expected = Some(expected.clone());
            self.actual = Some(actual.clone());
        }
    }
}

/// One run of a scenario
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptResult {
    pub attempt: u32,
    pub status: ScenarioStatus,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of running a single scenario, retries included
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    pub feature: String,
    pub file: PathBuf,
    pub name: String,
    pub tags: Vec<String>,
    pub status: ScenarioStatus,
    pub duration_ms: u64,
    pub attempts: Vec<AttemptResult>,
}

impl ScenarioResult {
    pub fn success(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }

    /// The attempt that decided the outcome.
    pub fn final_attempt(&self) -> Option<&AttemptResult> {
        self.attempts.last()
    }

    /// Error of the deciding attempt, if it failed.
    pub fn error(&self) -> Option<&str> {
        self.final_attempt().and_then(|a| a.error.as_deref())
    }

    /// Screenshots from every attempt.
    pub fn screenshots(&self) -> impl Iterator<Item = &ScreenshotRecord> {
        self.attempts
            .iter()
            .flat_map(|a| a.steps.iter())
            .filter_map(|s| s.screenshot.as_ref())
    }
}

/// Result of running all scenarios
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub aborted: usize,
    /// Filtered out by tag or name
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.aborted == 0
    }
}

/// Which scenarios to run.
#[derive(Debug, Clone, Default)]
pub struct ScenarioFilter {
    /// Run scenarios carrying any of these tags (`@` optional)
    pub tags: Vec<String>,
    /// Run only the scenario with this exact name
    pub name: Option<String>,
}

impl ScenarioFilter {
    pub fn matches(&self, scenario: &Scenario) -> bool {
        let tag_ok = self.tags.is_empty()
            || self.tags.iter().any(|wanted| {
                let wanted = wanted.trim_start_matches('@');
                scenario.tags.iter().any(|t| t == wanted)
            });
        let name_ok = self.name.as_deref().map_or(true, |n| n == scenario.name);
        tag_ok && name_ok
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub screenshots_folder: PathBuf,
    pub screenshot_on_failure: bool,
    /// Extra attempts for a failing scenario
    pub retries: u32,
    pub suite_timeout: Option<Duration>,
    /// Upper bound for capturing a failure screenshot
    pub screenshot_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            screenshots_folder: PathBuf::from("reports/screenshots"),
            screenshot_on_failure: true,
            retries: 0,
            suite_timeout: None,
            screenshot_timeout: Duration::from_secs(4),
        }
    }
}

impl RunnerConfig {
    pub fn from_harness(config: &HarnessConfig) -> Self {
        Self {
            screenshots_folder: config.screenshots_folder.clone(),
            screenshot_on_failure: config.screenshot_on_failure,
            retries: config.retries,
            suite_timeout: config.suite_timeout(),
            screenshot_timeout: config.wait_config().timeout,
        }
    }
}

/// Main E2E test runner
pub struct TestRunner<W> {
    registry: StepRegistry<W>,
    sessions: Arc<dyn SessionFactory>,
    worlds: Arc<dyn WorldFactory<W>>,
    config: RunnerConfig,
    cancel: CancellationToken,
}

impl<W: Send> TestRunner<W> {
    pub fn new(
        registry: StepRegistry<W>,
        sessions: Arc<dyn SessionFactory>,
        worlds: Arc<dyn WorldFactory<W>>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            registry,
            sessions,
            worlds,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &StepRegistry<W> {
        &self.registry
    }

    /// Token that aborts the suite when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Check every step line resolves to exactly one definition.
    pub fn validate(&self, features: &[Feature]) -> E2eResult<()> {
        for feature in features {
            self.registry.validate(feature.step_texts()).map_err(|e| {
                error!("{}: {}", feature.path.display(), e);
                e
            })?;
        }
        Ok(())
    }

    /// Validate, then run every scenario the filter selects.
    ///
    /// Load-time problems come back as `Err` before any scenario starts.
    /// Scenario failures are recorded in the result, not returned.
    pub async fn run_features(
        &self,
        features: &[Feature],
        filter: &ScenarioFilter,
        sink: &mut dyn ReportSink,
    ) -> E2eResult<TestSuiteResult> {
        self.validate(features)?;

        let selected: Vec<(&Feature, &Scenario)> = features
            .iter()
            .flat_map(|f| f.scenarios.iter().map(move |s| (f, s)))
            .filter(|(_, s)| filter.matches(s))
            .collect();
        let total: usize = features.iter().map(|f| f.scenarios.len()).sum();
        let skipped = total - selected.len();

        let start = Instant::now();
        let run_token = self.cancel.child_token();
        let timer = self.config.suite_timeout.map(|limit| {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!("Suite timeout of {:?} reached, aborting", limit);
                token.cancel();
            })
        });

        info!("Running {} scenario(s)...", selected.len());

        let mut results = Vec::with_capacity(selected.len());
        let (mut passed, mut failed, mut aborted) = (0, 0, 0);

        for (feature, scenario) in selected {
            let result = self.run_scenario(feature, scenario, &run_token).await;
            match result.status {
                ScenarioStatus::Passed => {
                    passed += 1;
                    info!("✓ {} ({} ms)", result.name, result.duration_ms);
                }
                ScenarioStatus::Failed => {
                    failed += 1;
                    error!("✗ {} - {}", result.name, result.error().unwrap_or("unknown error"));
                }
                ScenarioStatus::Aborted => {
                    aborted += 1;
                    warn!("⊘ {} - aborted", result.name);
                }
            }
            sink.record_scenario(&result)?;
            results.push(result);
        }

        if let Some(timer) = timer {
            timer.abort();
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Test Results: {} passed, {} failed, {} aborted, {} skipped ({} ms)",
            passed, failed, aborted, skipped, duration_ms
        );

        let suite = TestSuiteResult {
            total,
            passed,
            failed,
            aborted,
            skipped,
            duration_ms,
            results,
        };
        sink.finish(&suite)?;
        Ok(suite)
    }

    /// Run one scenario, retrying the whole scenario on failure.
    pub async fn run_scenario(
        &self,
        feature: &Feature,
        scenario: &Scenario,
        cancel: &CancellationToken,
    ) -> ScenarioResult {
        let start = Instant::now();
        let mut attempts = Vec::new();

        for attempt in 1..=self.config.retries + 1 {
            let result = if cancel.is_cancelled() {
                Self::aborted_attempt(feature, scenario, attempt, "suite cancelled before start")
            } else {
                self.run_attempt(feature, scenario, attempt, cancel).await
            };
            let status = result.status;
            attempts.push(result);

            if status != ScenarioStatus::Failed {
                break;
            }
            if attempt <= self.config.retries {
                warn!(
                    "Retrying '{}' (attempt {} of {})",
                    scenario.name,
                    attempt + 1,
                    self.config.retries + 1
                );
            }
        }

        let status = attempts
            .last()
            .map(|a| a.status)
            .unwrap_or(ScenarioStatus::Aborted);

        ScenarioResult {
            feature: feature.name.clone(),
            file: feature.path.clone(),
            name: scenario.name.clone(),
            tags: scenario.tags.clone(),
            status,
            duration_ms: start.elapsed().as_millis() as u64,
            attempts,
        }
    }

    fn aborted_attempt(
        feature: &Feature,
        scenario: &Scenario,
        attempt: u32,
        reason: &str,
    ) -> AttemptResult {
        AttemptResult {
            attempt,
            status: ScenarioStatus::Aborted,
            duration_ms: 0,
            steps: feature
                .steps_of(scenario)
                .map(|s| StepResult::new(s, StepStatus::Skipped))
                .collect(),
            error: Some(E2eError::Aborted(reason.to_string()).to_string()),
        }
    }

    async fn run_attempt(
        &self,
        feature: &Feature,
        scenario: &Scenario,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> AttemptResult {
        let start = Instant::now();
        debug!("Running scenario '{}' (attempt {})", scenario.name, attempt);

        let driver = match self.sessions.open_session().await {
            Ok(driver) => driver,
            Err(e) => {
                error!("Could not open a browser session: {}", e);
                return AttemptResult {
                    status: ScenarioStatus::Failed,
                    error: Some(e.to_string()),
                    ..Self::aborted_attempt(feature, scenario, attempt, "no session")
                };
            }
        };

        let mut steps: Vec<StepResult> = feature
            .steps_of(scenario)
            .map(|s| StepResult::new(s, StepStatus::Skipped))
            .collect();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(E2eError::Aborted("suite cancelled".into())),
            outcome = self.execute_steps(feature, scenario, attempt, driver.clone(), &mut steps) => Ok(outcome),
        };

        if let Err(e) = driver.close().await {
            warn!("Failed to close session: {}", e);
        }

        let (status, error) = match outcome {
            Ok(None) => (ScenarioStatus::Passed, None),
            Ok(Some(e)) => (ScenarioStatus::Failed, Some(e.to_string())),
            Err(e) => (ScenarioStatus::Aborted, Some(e.to_string())),
        };

        AttemptResult {
            attempt,
            status,
            duration_ms: start.elapsed().as_millis() as u64,
            steps,
            error,
        }
    }

    /// Run steps in order until one fails; returns that step's error.
    async fn execute_steps(
        &self,
        feature: &Feature,
        scenario: &Scenario,
        attempt: u32,
        driver: Arc<dyn BrowserDriver>,
        results: &mut [StepResult],
    ) -> Option<E2eError> {
        let mut world = match self.worlds.create(driver.clone()) {
            Ok(world) => world,
            Err(e) => return Some(e),
        };

        for (index, (step, result)) in feature.steps_of(scenario).zip(results.iter_mut()).enumerate() {
            let started = Instant::now();
            debug!("{} {}", step.keyword, step.text);

            let outcome = match self.registry.find(&step.text) {
                Ok(matched) => {
                    result.args = matched.args.clone();
                    matched.invoke(&mut world).await
                }
                Err(e) => Err(e),
            };
            result.duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(()) => result.status = StepStatus::Passed,
                Err(e) => {
                    debug!("step failed at {}:{}: {}", feature.path.display(), step.line, e);
                    result.fail(&e);
                    if self.config.screenshot_on_failure {
                        result.screenshot = self
                            .capture_screenshot(&driver, feature, scenario, attempt, index)
                            .await;
                    }
                    return Some(e);
                }
            }
        }
        None
    }

    async fn capture_screenshot(
        &self,
        driver: &Arc<dyn BrowserDriver>,
        feature: &Feature,
        scenario: &Scenario,
        attempt: u32,
        step_index: usize,
    ) -> Option<ScreenshotRecord> {
        let shot = match tokio::time::timeout(self.config.screenshot_timeout, driver.screenshot()).await {
            Ok(Ok(shot)) => shot,
            Ok(Err(e)) => {
                warn!("Screenshot failed: {}", e);
                return None;
            }
            Err(_) => {
                warn!("Screenshot timed out");
                return None;
            }
        };

        let file_name = format!(
            "{}--{}--attempt{}-step{}.{}",
            slug(&feature.name),
            slug(&scenario.name),
            attempt,
            step_index + 1,
            shot.extension()
        );
        let path = self.config.screenshots_folder.join(file_name);
        match write_file(&path, &shot.bytes) {
            Ok(()) => {
                debug!("Screenshot written to {}", path.display());
                Some(ScreenshotRecord {
                    path,
                    mime: shot.mime.to_string(),
                    data_uri: None,
                })
            }
            Err(e) => {
                warn!("Could not write screenshot {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> E2eResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// File-name-safe form of a feature or scenario name.
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
