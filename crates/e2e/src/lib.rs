//! Todo E2E Test Framework
//!
//! Behaviour-driven browser tests for the Environment Todo web app:
//! - Discovers Gherkin feature files by glob
//! - Resolves every step line against an explicit step registry up front
//! - Drives a browser through page objects addressed by semantic names
//! - Runs each scenario in its own session and writes a JSON report
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner<W>                                              │
//! │    ├── validate(features)        -> load-time errors        │
//! │    ├── run_features(features)    -> TestSuiteResult         │
//! │    │     └── per scenario: SessionFactory::open_session()   │
//! │    │           └── WorldFactory::create(session) -> W       │
//! │    └── ReportSink::record_scenario / finish                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  StepRegistry<W>                                            │
//! │    └── "I add a todo with text {string}" -> handler(W, args)│
//! ├─────────────────────────────────────────────────────────────┤
//! │  TodoPage -> PageObject -> LocatorMap + poll_until          │
//! │                 └── BrowserDriver (chromium | simulated)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod feature;
pub mod locator;
pub mod page;
pub mod report;
pub mod runner;
pub mod steps;
pub mod todo_steps;
pub mod wait;

pub use config::HarnessConfig;
pub use error::{E2eError, E2eResult};
pub use feature::{load_features, Feature, Scenario};
pub use page::{PageObject, TodoPage};
pub use report::{JsonReport, MemoryReport, ReportSink};
pub use runner::{RunnerConfig, ScenarioFilter, TestRunner, TestSuiteResult};
pub use steps::{StepArgs, StepKind, StepRegistry};
pub use todo_steps::{todo_steps, TodoWorld, TodoWorldFactory};
