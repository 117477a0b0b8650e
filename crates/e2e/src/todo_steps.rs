//! Step definitions for the Environment Todo app.
//!
//! `Given` steps set the stage and fail with a precondition error when the
//! app is not in the expected state. `When` steps only act. `Then` steps
//! compare and report expected against actual.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::driver::BrowserDriver;
use crate::error::{E2eError, E2eResult};
use crate::locator::LocatorMap;
use crate::page::{PageObject, TodoPage};
use crate::runner::WorldFactory;
use crate::steps::{StepArgs, StepRegistry};
use crate::wait::WaitConfig;

/// Per-scenario state: the page under test and what it must show on load.
pub struct TodoWorld {
    pub page: TodoPage,
    pub landmark: String,
}

/// Builds a [`TodoWorld`] around each new session.
#[derive(Debug, Clone)]
pub struct TodoWorldFactory {
    locators: Arc<LocatorMap>,
    wait: WaitConfig,
    page_load_timeout: Duration,
    base_url: String,
    landmark: String,
}

impl TodoWorldFactory {
    pub fn new(locators: LocatorMap, wait: WaitConfig, base_url: impl Into<String>) -> Self {
        Self {
            locators: Arc::new(locators),
            wait,
            page_load_timeout: crate::page::DEFAULT_PAGE_LOAD_TIMEOUT,
            base_url: base_url.into(),
            landmark: "Environment Todo".to_string(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> E2eResult<Self> {
        let locators = config.locator_map()?;
        locators.require(TodoPage::REQUIRED_ELEMENTS)?;
        Ok(Self::new(locators, config.wait_config(), config.base_url.clone())
            .with_landmark(config.landmark_text.clone())
            .with_page_load_timeout(config.page_load_timeout()))
    }

    pub fn with_landmark(mut self, landmark: impl Into<String>) -> Self {
        self.landmark = landmark.into();
        self
    }

    pub fn with_page_load_timeout(mut self, limit: Duration) -> Self {
        self.page_load_timeout = limit;
        self
    }
}

impl WorldFactory<TodoWorld> for TodoWorldFactory {
    fn create(&self, driver: Arc<dyn BrowserDriver>) -> E2eResult<TodoWorld> {
        let page = PageObject::new(driver, self.locators.clone(), self.wait)
            .with_page_load_timeout(self.page_load_timeout);
        Ok(TodoWorld {
            page: TodoPage::new(page, self.base_url.clone())?,
            landmark: self.landmark.clone(),
        })
    }
}

/// Registry with every Todo step.
pub fn todo_steps() -> E2eResult<StepRegistry<TodoWorld>> {
    let mut steps = StepRegistry::new();
    steps.given("I open the Todo page app", open_app)?;
    steps.when("I add a todo with text {string}", add_todo)?;
    steps.when("I check the todo checkbox with index {int}", check_todo)?;
    steps.then("Verify last todo to match {string}", verify_last_todo)?;
    steps.then("Verify remaining text to match {string}", verify_remaining_text)?;
    steps.then("Verify checkbox with index {} to be checked", verify_checkbox_checked)?;
    steps.then("there is no last todo", verify_no_last_todo)?;
    Ok(steps)
}

fn open_app(world: &mut TodoWorld, _args: StepArgs) -> BoxFuture<'_, E2eResult<()>> {
    Box::pin(async move {
        world.page.open().await?;
        if !world.page.shows_text(&world.landmark).await? {
            return Err(E2eError::Precondition(format!(
                "page does not show '{}'",
                world.landmark
            )));
        }
        Ok(())
    })
}

fn add_todo(world: &mut TodoWorld, args: StepArgs) -> BoxFuture<'_, E2eResult<()>> {
    Box::pin(async move {
        let text = args.string(0)?;
        world.page.type_in_new_todo_field(text).await?;
        world.page.click_add_button().await
    })
}

fn check_todo(world: &mut TodoWorld, args: StepArgs) -> BoxFuture<'_, E2eResult<()>> {
    Box::pin(async move {
        let index = args.index(0)?;
        world.page.click_on_checkbox(index).await
    })
}

fn verify_last_todo(world: &mut TodoWorld, args: StepArgs) -> BoxFuture<'_, E2eResult<()>> {
    Box::pin(async move {
        let expected = args.string(0)?;
        let actual = world.page.get_last_todo_text().await?;
        debug!("last todo: {:?}", actual);
        if !actual.contains(expected) {
            return Err(E2eError::assertion(
                "last todo does not contain the expected text",
                expected,
                actual,
            ));
        }
        Ok(())
    })
}

fn verify_remaining_text(world: &mut TodoWorld, args: StepArgs) -> BoxFuture<'_, E2eResult<()>> {
    Box::pin(async move {
        let expected = args.string(0)?;
        let actual = world.page.get_remaining_text().await?;
        if !actual.contains(expected) {
            return Err(E2eError::assertion(
                "remaining text does not contain the expected text",
                expected,
                actual,
            ));
        }
        Ok(())
    })
}

fn verify_checkbox_checked(world: &mut TodoWorld, args: StepArgs) -> BoxFuture<'_, E2eResult<()>> {
    Box::pin(async move {
        let index = args.index(0)?;
        if !world.page.is_checkbox_checked(index).await? {
            return Err(E2eError::assertion(
                format!("checkbox {} is not checked", index),
                "checked",
                "unchecked",
            ));
        }
        Ok(())
    })
}

fn verify_no_last_todo(world: &mut TodoWorld, _args: StepArgs) -> BoxFuture<'_, E2eResult<()>> {
    Box::pin(async move {
        match world.page.get_last_todo_text().await {
            Err(E2eError::EmptyCollection(_)) => Ok(()),
            Ok(text) => Err(E2eError::assertion("expected an empty todo list", "<none>", text)),
            Err(e) => Err(e),
        }
    })
}
