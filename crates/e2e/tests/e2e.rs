//! E2E test harness entry point
//!
//! This file is the test binary that runs the Gherkin feature files.
//! Run with: cargo test --package todo-e2e --test e2e -- --driver chromium
//!
//! Filters and flags `cargo test` passes along (`--nocapture`, a test name)
//! are accepted and ignored.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use todo_e2e::cli::{DriverKind, SuiteArgs};
use todo_e2e::driver::chromium::ChromiumSessionFactory;
use todo_e2e::driver::simulated::{SimulatedOptions, SimulatedSessionFactory};
use todo_e2e::driver::SessionFactory;
use todo_e2e::{
    load_features, todo_steps, E2eResult, HarnessConfig, JsonReport, RunnerConfig,
    ScenarioFilter, TestRunner, TodoWorldFactory,
};

fn main() {
    let args = SuiteArgs::parse();

    let level = if args.debug { "debug" } else { "info" };
    let filter = if args.debug {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    if args.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: SuiteArgs) -> E2eResult<bool> {
    let mut config = HarnessConfig::load(&args.config)?;
    args.apply_overrides(&mut config);
    config.validate()?;

    let registry = todo_steps()?;
    let worlds = Arc::new(TodoWorldFactory::from_config(&config)?);
    let features = load_features(
        &config.features_root,
        &config.spec_pattern,
        &config.exclude_spec_pattern,
    )?;

    let sessions: Arc<dyn SessionFactory> = match args.driver {
        DriverKind::Chromium => Arc::new(ChromiumSessionFactory::launch(&config.browser).await?),
        DriverKind::Simulated => Arc::new(SimulatedSessionFactory::new(
            config.locator_map()?,
            SimulatedOptions {
                landmark: config.landmark_text.clone(),
                ..SimulatedOptions::default()
            },
        )),
    };
    info!("Using {:?} driver against {}", args.driver, config.base_url);

    let runner = TestRunner::new(
        registry,
        sessions.clone(),
        worlds,
        RunnerConfig::from_harness(&config),
    );

    let cancel = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let filter = ScenarioFilter {
        tags: args.tag.clone(),
        name: args.name.clone(),
    };
    let mut report = JsonReport::new(&config.reports_folder, config.reporter.clone())
        .with_project_id(config.project_id.clone());

    let outcome = runner.run_features(&features, &filter, &mut report).await;
    sessions.shutdown().await?;
    let results = outcome?;

    Ok(results.success())
}
