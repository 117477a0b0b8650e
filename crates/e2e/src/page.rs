//! Page objects: DOM interactions addressed by semantic element name.
//!
//! [`PageObject`] is the generic layer. Every operation resolves the name
//! through the [`LocatorMap`] first, so an unregistered name fails with
//! `UnknownElement` before the browser is touched, then polls the live DOM
//! through [`poll_until`] until the element (or the Nth member of a
//! collection) shows up or the operation timeout passes.
//!
//! Page objects only act and read. They never decide whether a value is
//! right; that belongs to `Then` steps.
//!
//! [`TodoPage`] layers the Todo app's vocabulary on top.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use crate::driver::{BrowserDriver, ElementHandle, Screenshot};
use crate::error::{E2eError, E2eResult};
use crate::locator::{todo, LocatorMap};
use crate::wait::{poll_until, Check, WaitConfig};

/// Default upper bound for a page load.
pub const DEFAULT_PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Generic page object over one browser session.
#[derive(Clone)]
pub struct PageObject {
    driver: Arc<dyn BrowserDriver>,
    locators: Arc<LocatorMap>,
    wait: WaitConfig,
    page_load_timeout: Duration,
}

impl PageObject {
    pub fn new(driver: Arc<dyn BrowserDriver>, locators: Arc<LocatorMap>, wait: WaitConfig) -> Self {
        Self {
            driver,
            locators,
            wait,
            page_load_timeout: DEFAULT_PAGE_LOAD_TIMEOUT,
        }
    }

    pub fn with_page_load_timeout(mut self, limit: Duration) -> Self {
        self.page_load_timeout = limit;
        self
    }

    pub fn locators(&self) -> &LocatorMap {
        &self.locators
    }

    pub fn wait_config(&self) -> WaitConfig {
        self.wait
    }

    /// Load `url`, bounded by the page load timeout.
    pub async fn navigate(&self, url: &str) -> E2eResult<()> {
        debug!("navigate {}", url);
        timeout(self.page_load_timeout, self.driver.navigate(url))
            .await
            .map_err(|_| E2eError::Timeout {
                operation: format!("page load of {}", url),
                timeout: self.page_load_timeout,
            })?
    }

    /// Type `text` into the named input, replacing its value.
    pub async fn enter_text(&self, field: &str, text: &str) -> E2eResult<()> {
        let element = self.locate_interactable(field).await?;
        debug!("type {:?} into {}", text, field);
        self.bounded(format!("typing into {}", field), self.driver.type_text(element, text))
            .await
    }

    /// Click the named control.
    pub async fn click_control(&self, control: &str) -> E2eResult<()> {
        let element = self.locate_interactable(control).await?;
        debug!("click {}", control);
        self.bounded(format!("clicking {}", control), self.driver.click(element))
            .await
    }

    /// Rendered text of the named element.
    pub async fn read_text(&self, name: &str) -> E2eResult<String> {
        let element = self.locate(name).await?;
        self.bounded(format!("reading {}", name), self.driver.read_text(element))
            .await
    }

    /// Rendered text of the `index`-th (0-based) member of a collection.
    pub async fn read_text_at_index(&self, collection: &str, index: usize) -> E2eResult<String> {
        let element = self.locate_nth(collection, index).await?;
        self.bounded(
            format!("reading {}[{}]", collection, index),
            self.driver.read_text(element),
        )
        .await
    }

    /// Make sure the `index`-th checkbox of a collection is checked.
    ///
    /// Already-checked boxes are left alone.
    pub async fn check_box_at_index(&self, collection: &str, index: usize) -> E2eResult<()> {
        let element = self.locate_nth(collection, index).await?;
        let label = format!("{}[{}]", collection, index);
        if self
            .bounded(format!("reading state of {}", label), self.driver.is_checked(element))
            .await?
        {
            debug!("{} already checked", label);
            return Ok(());
        }
        self.ensure_interactable(collection, element).await?;
        debug!("check {}", label);
        self.bounded(format!("checking {}", label), self.driver.click(element))
            .await
    }

    /// Checked state of the `index`-th checkbox of a collection.
    pub async fn is_checked_at_index(&self, collection: &str, index: usize) -> E2eResult<bool> {
        let element = self.locate_nth(collection, index).await?;
        self.bounded(
            format!("reading state of {}[{}]", collection, index),
            self.driver.is_checked(element),
        )
        .await
    }

    /// Rendered text of the last member of a collection.
    pub async fn read_last_item_text(&self, collection: &str) -> E2eResult<String> {
        let selector = self.locators.selector(collection)?.to_string();
        let driver = self.driver.clone();
        let found = poll_until(self.wait, &format!("last of {}", collection), || {
            let driver = driver.clone();
            let selector = selector.clone();
            async move {
                let elements = driver.find_elements(&selector).await?;
                Ok(match elements.last() {
                    Some(last) => Check::Ready(*last),
                    None => Check::Pending(()),
                })
            }
        })
        .await?;

        match found {
            Check::Ready(element) => {
                self.bounded(format!("reading last {}", collection), self.driver.read_text(element))
                    .await
            }
            Check::Pending(()) => Err(E2eError::EmptyCollection(collection.to_string())),
        }
    }

    /// Wait for the named element's text to contain `needle`.
    ///
    /// Returns `false` once the operation timeout passes; a missing element
    /// counts as not containing it.
    pub async fn contains_text(&self, name: &str, needle: &str) -> E2eResult<bool> {
        let selector = self.locators.selector(name)?.to_string();
        let driver = self.driver.clone();
        let found = poll_until(self.wait, &format!("{} to contain {:?}", name, needle), || {
            let driver = driver.clone();
            let selector = selector.clone();
            async move {
                let Some(element) = driver.find_element(&selector).await? else {
                    return Ok(Check::Pending(()));
                };
                let text = driver.read_text(element).await?;
                Ok(if text.contains(needle) {
                    Check::Ready(())
                } else {
                    Check::Pending(())
                })
            }
        })
        .await?;
        Ok(matches!(found, Check::Ready(())))
    }

    pub async fn screenshot(&self) -> E2eResult<Screenshot> {
        self.bounded("screenshot".to_string(), self.driver.screenshot())
            .await
    }

    async fn bounded<T>(
        &self,
        operation: String,
        call: impl std::future::Future<Output = E2eResult<T>>,
    ) -> E2eResult<T> {
        timeout(self.wait.timeout, call)
            .await
            .map_err(|_| E2eError::Timeout {
                operation,
                timeout: self.wait.timeout,
            })?
    }

    async fn locate(&self, name: &str) -> E2eResult<ElementHandle> {
        let selector = self.locators.selector(name)?.to_string();
        let driver = self.driver.clone();
        let found = poll_until(self.wait, &format!("element {}", name), || {
            let driver = driver.clone();
            let selector = selector.clone();
            async move {
                Ok(match driver.find_element(&selector).await? {
                    Some(element) => Check::Ready(element),
                    None => Check::Pending(()),
                })
            }
        })
        .await?;

        match found {
            Check::Ready(element) => Ok(element),
            Check::Pending(()) => Err(E2eError::ElementNotFound {
                name: name.to_string(),
                selector,
                waited: self.wait.timeout,
            }),
        }
    }

    async fn locate_nth(&self, collection: &str, index: usize) -> E2eResult<ElementHandle> {
        let selector = self.locators.selector(collection)?.to_string();
        let driver = self.driver.clone();
        let found = poll_until(self.wait, &format!("{}[{}]", collection, index), || {
            let driver = driver.clone();
            let selector = selector.clone();
            async move {
                let elements = driver.find_elements(&selector).await?;
                Ok(match elements.get(index) {
                    Some(element) => Check::Ready(*element),
                    None => Check::Pending(elements.len()),
                })
            }
        })
        .await?;

        match found {
            Check::Ready(element) => Ok(element),
            Check::Pending(len) => Err(E2eError::IndexOutOfRange {
                name: collection.to_string(),
                index,
                len,
            }),
        }
    }

    async fn locate_interactable(&self, name: &str) -> E2eResult<ElementHandle> {
        let element = self.locate(name).await?;
        self.ensure_interactable(name, element).await?;
        Ok(element)
    }

    async fn ensure_interactable(&self, name: &str, element: ElementHandle) -> E2eResult<()> {
        let driver = self.driver.clone();
        let ready = poll_until(self.wait, &format!("{} to be interactable", name), || {
            let driver = driver.clone();
            async move {
                Ok(if driver.is_interactable(element).await? {
                    Check::Ready(())
                } else {
                    Check::Pending(())
                })
            }
        })
        .await?;

        match ready {
            Check::Ready(()) => Ok(()),
            Check::Pending(()) => Err(E2eError::ElementNotInteractable {
                name: name.to_string(),
                selector: self.locators.selector(name)?.to_string(),
            }),
        }
    }
}

/// The Environment Todo page.
#[derive(Clone)]
pub struct TodoPage {
    page: PageObject,
    base_url: String,
}

impl TodoPage {
    /// Names this page needs from its locator map.
    pub const REQUIRED_ELEMENTS: &'static [&'static str] = &[
        todo::PAGE_BODY,
        todo::NEW_TODO_FIELD,
        todo::ADD_BUTTON,
        todo::REMAINING_TEXT,
        todo::CHECKBOX,
        todo::CHECKBOX_TEXT,
    ];

    pub fn new(page: PageObject, base_url: impl Into<String>) -> E2eResult<Self> {
        page.locators().require(Self::REQUIRED_ELEMENTS)?;
        Ok(Self {
            page,
            base_url: base_url.into(),
        })
    }

    pub fn page(&self) -> &PageObject {
        &self.page
    }

    /// Navigate to the app root.
    pub async fn open(&self) -> E2eResult<()> {
        let url = format!("{}/", self.base_url.trim_end_matches('/'));
        self.page.navigate(&url).await
    }

    /// Whether `text` shows up anywhere on the page within the timeout.
    pub async fn shows_text(&self, text: &str) -> E2eResult<bool> {
        self.page.contains_text(todo::PAGE_BODY, text).await
    }

    pub async fn type_in_new_todo_field(&self, value: &str) -> E2eResult<()> {
        self.page.enter_text(todo::NEW_TODO_FIELD, value).await
    }

    pub async fn click_add_button(&self) -> E2eResult<()> {
        self.page.click_control(todo::ADD_BUTTON).await
    }

    pub async fn get_remaining_text(&self) -> E2eResult<String> {
        self.page.read_text(todo::REMAINING_TEXT).await
    }

    pub async fn click_on_checkbox(&self, index: usize) -> E2eResult<()> {
        self.page.check_box_at_index(todo::CHECKBOX, index).await
    }

    pub async fn get_checkbox_text(&self, index: usize) -> E2eResult<String> {
        self.page.read_text_at_index(todo::CHECKBOX_TEXT, index).await
    }

    pub async fn is_checkbox_checked(&self, index: usize) -> E2eResult<bool> {
        self.page.is_checked_at_index(todo::CHECKBOX, index).await
    }

    pub async fn get_last_todo_text(&self) -> E2eResult<String> {
        self.page.read_last_item_text(todo::CHECKBOX_TEXT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::simulated::{SimulatedOptions, SimulatedTodoApp};

    fn fast() -> WaitConfig {
        WaitConfig::new(Duration::from_millis(60), Duration::from_millis(5))
    }

    async fn open_app(options: SimulatedOptions) -> (Arc<SimulatedTodoApp>, TodoPage) {
        let locators = Arc::new(LocatorMap::todo_page());
        let app = Arc::new(SimulatedTodoApp::new(&locators, options));
        let page = PageObject::new(app.clone(), locators, fast());
        let todo_page = TodoPage::new(page, "http://localhost:3000").unwrap();
        todo_page.open().await.unwrap();
        (app, todo_page)
    }

    async fn add(page: &TodoPage, text: &str) {
        page.type_in_new_todo_field(text).await.unwrap();
        page.click_add_button().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_uses_app_root() {
        let (app, page) = open_app(SimulatedOptions::default()).await;
        assert_eq!(app.current_url(), "http://localhost:3000/");
        assert!(page.shows_text("Environment Todo").await.unwrap());
        assert!(!page.shows_text("Production Todo").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_name_fails_before_driver_is_used() {
        let locators = Arc::new(LocatorMap::todo_page());
        let app = Arc::new(SimulatedTodoApp::new(&locators, SimulatedOptions::default()));
        app.close().await.unwrap();
        // Any driver call would now fail with a Driver error
        let page = PageObject::new(app, locators, fast());
        assert!(matches!(
            page.read_text("footer").await,
            Err(E2eError::UnknownElement(_))
        ));
        assert!(matches!(
            page.click_control("delete_button").await,
            Err(E2eError::UnknownElement(_))
        ));
    }

    #[tokio::test]
    async fn test_add_and_read_back() {
        let (_app, page) = open_app(SimulatedOptions::default()).await;
        add(&page, "Buy milk").await;
        add(&page, "Walk dog").await;

        assert_eq!(page.get_checkbox_text(0).await.unwrap(), "Buy milk");
        assert_eq!(page.get_last_todo_text().await.unwrap(), "Walk dog");
        assert_eq!(page.get_remaining_text().await.unwrap(), "2 of 2 remaining");
    }

    #[tokio::test]
    async fn test_last_item_matches_highest_index() {
        let (_app, page) = open_app(SimulatedOptions {
            initial_todos: vec!["one".into(), "two".into(), "three".into()],
            ..SimulatedOptions::default()
        })
        .await;
        let last = page.get_last_todo_text().await.unwrap();
        assert_eq!(last, page.get_checkbox_text(2).await.unwrap());
    }

    #[tokio::test]
    async fn test_check_is_idempotent() {
        let (_app, page) = open_app(SimulatedOptions {
            initial_todos: vec!["one".into()],
            ..SimulatedOptions::default()
        })
        .await;
        page.click_on_checkbox(0).await.unwrap();
        assert!(page.is_checkbox_checked(0).await.unwrap());
        page.click_on_checkbox(0).await.unwrap();
        assert!(page.is_checkbox_checked(0).await.unwrap());
        assert_eq!(page.get_remaining_text().await.unwrap(), "0 of 1 remaining");
    }

    #[tokio::test]
    async fn test_index_out_of_range() {
        let (_app, page) = open_app(SimulatedOptions {
            initial_todos: vec!["one".into()],
            ..SimulatedOptions::default()
        })
        .await;
        assert!(matches!(
            page.click_on_checkbox(3).await,
            Err(E2eError::IndexOutOfRange { index: 3, len: 1, .. })
        ));
        assert!(matches!(
            page.get_checkbox_text(1).await,
            Err(E2eError::IndexOutOfRange { index: 1, len: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let (_app, page) = open_app(SimulatedOptions::default()).await;
        assert!(matches!(
            page.get_last_todo_text().await,
            Err(E2eError::EmptyCollection(name)) if name == todo::CHECKBOX_TEXT
        ));
    }

    #[tokio::test]
    async fn test_disabled_control_is_not_interactable() {
        let (_app, page) = open_app(SimulatedOptions {
            add_button_disabled: true,
            ..SimulatedOptions::default()
        })
        .await;
        page.type_in_new_todo_field("x").await.unwrap();
        assert!(matches!(
            page.click_add_button().await,
            Err(E2eError::ElementNotInteractable { .. })
        ));
    }

    #[tokio::test]
    async fn test_late_render_is_waited_for() {
        let (_app, page) = open_app(SimulatedOptions {
            render_delay_queries: 3,
            ..SimulatedOptions::default()
        })
        .await;
        assert_eq!(page.get_remaining_text().await.unwrap(), "0 of 0 remaining");
    }

    #[tokio::test]
    async fn test_missing_element_before_navigation() {
        let locators = Arc::new(LocatorMap::todo_page());
        let app = Arc::new(SimulatedTodoApp::new(&locators, SimulatedOptions::default()));
        let page = PageObject::new(app, locators, fast());
        assert!(matches!(
            page.read_text(todo::REMAINING_TEXT).await,
            Err(E2eError::ElementNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_hanging_driver_times_out() {
        let (_app, page) = open_app(SimulatedOptions {
            query_latency: Some(Duration::from_secs(30)),
            ..SimulatedOptions::default()
        })
        .await;
        assert!(matches!(
            page.get_remaining_text().await,
            Err(E2eError::Timeout { .. })
        ));
    }

    #[test]
    fn test_missing_required_locator_is_rejected() {
        let locators = Arc::new(LocatorMap::from_entries([(todo::PAGE_BODY, "body")]).unwrap());
        let app = Arc::new(SimulatedTodoApp::new(&locators, SimulatedOptions::default()));
        let page = PageObject::new(app, locators, WaitConfig::default());
        assert!(matches!(
            TodoPage::new(page, "http://localhost:3000"),
            Err(E2eError::UnknownElement(_))
        ));
    }
}
