//! Report sinks. The runner streams each finished scenario into a
//! [`ReportSink`], then hands it the suite summary.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{ReporterOptions, ScreenshotEmbedding};
use crate::error::E2eResult;
use crate::runner::{ScenarioResult, ScreenshotRecord, TestSuiteResult};

pub trait ReportSink: Send {
    /// Called once per scenario, in run order.
    fn record_scenario(&mut self, result: &ScenarioResult) -> E2eResult<()>;

    /// Called once after the last scenario.
    fn finish(&mut self, suite: &TestSuiteResult) -> E2eResult<()>;
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryReport {
    pub scenarios: Vec<ScenarioResult>,
    pub summary: Option<TestSuiteResult>,
}

impl ReportSink for MemoryReport {
    fn record_scenario(&mut self, result: &ScenarioResult) -> E2eResult<()> {
        self.scenarios.push(result.clone());
        Ok(())
    }

    fn finish(&mut self, suite: &TestSuiteResult) -> E2eResult<()> {
        self.summary = Some(suite.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
struct Chart {
    total: usize,
    passed: usize,
    failed: usize,
    aborted: usize,
    skipped: usize,
    pass_percent: f64,
}

impl Chart {
    fn of(suite: &TestSuiteResult) -> Self {
        let run = suite.passed + suite.failed + suite.aborted;
        let pass_percent = if run == 0 {
            0.0
        } else {
            (suite.passed as f64 / run as f64 * 1000.0).round() / 10.0
        };
        Self {
            total: suite.total,
            passed: suite.passed,
            failed: suite.failed,
            aborted: suite.aborted,
            skipped: suite.skipped,
            pass_percent,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportDocument<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<&'a str>,
    generated_at: DateTime<Utc>,
    success: bool,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    chart: Option<Chart>,
    scenarios: &'a [ScenarioResult],
}

/// Writes `index.json` into the reports folder.
pub struct JsonReport {
    dir: PathBuf,
    options: ReporterOptions,
    project_id: Option<String>,
    scenarios: Vec<ScenarioResult>,
}

impl JsonReport {
    pub const FILE_NAME: &'static str = "index.json";

    pub fn new(dir: impl Into<PathBuf>, options: ReporterOptions) -> Self {
        Self {
            dir: dir.into(),
            options,
            project_id: None,
            scenarios: Vec::new(),
        }
    }

    pub fn with_project_id(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(Self::FILE_NAME)
    }

    fn prepare(&self, result: &ScenarioResult) -> ScenarioResult {
        let mut result = result.clone();
        if !self.options.save_all_attempts {
            let last = result.attempts.pop();
            result.attempts = last.into_iter().collect();
        }

        let embedding = self.options.screenshot_embedding();
        for step in result.attempts.iter_mut().flat_map(|a| a.steps.iter_mut()) {
            step.screenshot = step.screenshot.take().map(|shot| match embedding {
                ScreenshotEmbedding::Path => self.relative(shot),
                ScreenshotEmbedding::Inline => inline(shot),
            });
        }
        result
    }

    /// Paths relative to the report, when the screenshot lives under it.
    fn relative(&self, mut shot: ScreenshotRecord) -> ScreenshotRecord {
        if let Ok(rel) = shot.path.strip_prefix(&self.dir) {
            shot.path = rel.to_path_buf();
        }
        shot
    }
}

fn inline(mut shot: ScreenshotRecord) -> ScreenshotRecord {
    match std::fs::read(&shot.path) {
        Ok(bytes) => {
            shot.data_uri = Some(format!("data:{};base64,{}", shot.mime, STANDARD.encode(bytes)));
        }
        Err(e) => warn!("Could not inline {}: {}", shot.path.display(), e),
    }
    shot
}

impl ReportSink for JsonReport {
    fn record_scenario(&mut self, result: &ScenarioResult) -> E2eResult<()> {
        let prepared = self.prepare(result);
        self.scenarios.push(prepared);
        Ok(())
    }

    fn finish(&mut self, suite: &TestSuiteResult) -> E2eResult<()> {
        let document = ReportDocument {
            title: &self.options.report_page_title,
            project_id: self.project_id.as_deref(),
            generated_at: Utc::now(),
            success: suite.success(),
            duration_ms: suite.duration_ms,
            chart: self.options.charts.then(|| Chart::of(suite)),
            scenarios: &self.scenarios,
        };

        std::fs::create_dir_all(&self.dir)?;
        let path = self.path();
        write_json(&path, &document)?;
        info!("Results written to: {}", path.display());
        Ok(())
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> E2eResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{AttemptResult, ScenarioStatus, StepResult, StepStatus};
    use crate::steps::{StepArgs, StepKind};
    use serde_json::Value;

    fn step(screenshot: Option<ScreenshotRecord>) -> StepResult {
        StepResult {
            keyword: "Then".into(),
            kind: StepKind::Then,
            text: "Verify last todo to match \"Buy milk\"".into(),
            line: 4,
            args: StepArgs::default(),
            status: StepStatus::Failed,
            duration_ms: 3,
            failure: None,
            error: Some("boom".into()),
            expected: Some("Buy milk".into()),
            actual: Some("Buy bread".into()),
            screenshot,
        }
    }

    fn scenario(shot: Option<ScreenshotRecord>) -> ScenarioResult {
        let attempt = |n: u32| AttemptResult {
            attempt: n,
            status: ScenarioStatus::Failed,
            duration_ms: 5,
            steps: vec![step(shot.clone())],
            error: Some("boom".into()),
        };
        ScenarioResult {
            feature: "Todo".into(),
            file: PathBuf::from("todo.feature"),
            name: "Add".into(),
            tags: vec![],
            status: ScenarioStatus::Failed,
            duration_ms: 10,
            attempts: vec![attempt(1), attempt(2)],
        }
    }

    fn suite(results: Vec<ScenarioResult>) -> TestSuiteResult {
        TestSuiteResult {
            total: 2,
            passed: 1,
            failed: 1,
            aborted: 0,
            skipped: 0,
            duration_ms: 20,
            results,
        }
    }

    fn write_report(dir: &Path, options: ReporterOptions, shot: Option<ScreenshotRecord>) -> Value {
        let mut report = JsonReport::new(dir, options).with_project_id(Some("todo".into()));
        let result = scenario(shot);
        report.record_scenario(&result).unwrap();
        report.finish(&suite(vec![result])).unwrap();
        let raw = std::fs::read_to_string(report.path()).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    fn screenshot_in(dir: &Path) -> ScreenshotRecord {
        let path = dir.join("screenshots/add.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"page").unwrap();
        ScreenshotRecord {
            path,
            mime: "text/plain".into(),
            data_uri: None,
        }
    }

    #[test]
    fn test_final_attempt_only_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write_report(dir.path(), ReporterOptions::default(), None);

        assert_eq!(doc["title"], "Todo E2E Report");
        assert_eq!(doc["project_id"], "todo");
        assert_eq!(doc["success"], false);
        assert_eq!(doc["chart"]["pass_percent"], 50.0);
        let attempts = doc["scenarios"][0]["attempts"].as_array().unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0]["attempt"], 2);
        assert_eq!(attempts[0]["steps"][0]["expected"], "Buy milk");
    }

    #[test]
    fn test_all_attempts_without_chart() {
        let dir = tempfile::tempdir().unwrap();
        let options = ReporterOptions {
            save_all_attempts: true,
            charts: false,
            ..ReporterOptions::default()
        };
        let doc = write_report(dir.path(), options, None);
        assert_eq!(doc["scenarios"][0]["attempts"].as_array().unwrap().len(), 2);
        assert!(doc.get("chart").is_none());
    }

    #[test]
    fn test_screenshot_inline() {
        let dir = tempfile::tempdir().unwrap();
        let shot = screenshot_in(dir.path());
        let doc = write_report(dir.path(), ReporterOptions::default(), Some(shot));
        let embedded = &doc["scenarios"][0]["attempts"][0]["steps"][0]["screenshot"];
        assert_eq!(embedded["data_uri"], "data:text/plain;base64,cGFnZQ==");
    }

    #[test]
    fn test_screenshot_inline_without_inline_assets() {
        let dir = tempfile::tempdir().unwrap();
        let shot = screenshot_in(dir.path());
        let options = ReporterOptions {
            embedded_screenshots: true,
            inline_assets: false,
            ..ReporterOptions::default()
        };
        let doc = write_report(dir.path(), options, Some(shot));
        let embedded = &doc["scenarios"][0]["attempts"][0]["steps"][0]["screenshot"];
        assert_eq!(embedded["data_uri"], "data:text/plain;base64,cGFnZQ==");
    }

    #[test]
    fn test_screenshot_path_is_relative_when_not_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let shot = screenshot_in(dir.path());
        let options = ReporterOptions {
            embedded_screenshots: false,
            ..ReporterOptions::default()
        };
        let doc = write_report(dir.path(), options, Some(shot));
        let linked = &doc["scenarios"][0]["attempts"][0]["steps"][0]["screenshot"];
        assert_eq!(linked["path"], "screenshots/add.txt");
        assert!(linked.get("data_uri").is_none());
    }

    #[test]
    fn test_memory_report_collects() {
        let mut report = MemoryReport::default();
        let result = scenario(None);
        report.record_scenario(&result).unwrap();
        report.finish(&suite(vec![result.clone()])).unwrap();
        assert_eq!(report.scenarios, vec![result]);
        assert_eq!(report.summary.unwrap().failed, 1);
    }
}
