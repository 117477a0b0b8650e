//! Headless Chrome driver built on chromiumoxide

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{BrowserDriver, ElementHandle, Screenshot, SessionFactory};
use crate::config::BrowserSettings;
use crate::error::{E2eError, E2eResult};

const CLEAR_VALUE_JS: &str = "function() { \
    this.value = ''; \
    this.dispatchEvent(new Event('input', { bubbles: true })); \
}";

const IS_CHECKED_JS: &str = "function() { return !!this.checked; }";

const IS_INTERACTABLE_JS: &str = "function() { \
    const style = window.getComputedStyle(this); \
    const rect = this.getBoundingClientRect(); \
    return !this.disabled \
        && style.visibility !== 'hidden' \
        && style.display !== 'none' \
        && rect.width > 0 && rect.height > 0; \
}";

fn driver_err(context: &str, e: impl std::fmt::Display) -> E2eError {
    E2eError::Driver(format!("{}: {}", context, e))
}

/// Elements from the latest query, addressed by handle.
///
/// Each query replaces the previous entries so a polling loop holds at most
/// one result set.
#[derive(Debug)]
struct ElementTable<T> {
    elements: HashMap<u64, T>,
    next_id: u64,
}

impl<T> Default for ElementTable<T> {
    fn default() -> Self {
        Self {
            elements: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<T> ElementTable<T> {
    fn replace(&mut self, found: Vec<T>) -> Vec<ElementHandle> {
        self.elements.clear();
        found
            .into_iter()
            .map(|element| {
                let id = self.next_id;
                self.next_id += 1;
                self.elements.insert(id, element);
                ElementHandle(id)
            })
            .collect()
    }

    fn get(&self, handle: ElementHandle) -> E2eResult<&T> {
        self.elements
            .get(&handle.0)
            .ok_or_else(|| E2eError::Driver(format!("stale element handle {}", handle.0)))
    }

    fn clear(&mut self) {
        self.elements.clear();
    }

    fn len(&self) -> usize {
        self.elements.len()
    }
}

/// Query result, with CDP failures kept apart from "nothing matched".
fn query_result<T>(selector: &str, result: Result<Vec<T>, impl std::fmt::Display>) -> E2eResult<Vec<T>> {
    result.map_err(|e| driver_err(&format!("querying '{}' failed", selector), e))
}

/// Owns the Chrome process and its throwaway profile; hands out one tab per
/// scenario.
pub struct ChromiumSessionFactory {
    browser: Mutex<Option<Browser>>,
    handler: JoinHandle<()>,
    // Removed on drop, after the browser is closed
    _profile: TempDir,
}

impl ChromiumSessionFactory {
    /// Launch Chrome with the given settings.
    pub async fn launch(settings: &BrowserSettings) -> E2eResult<Self> {
        debug!("Launching browser with settings: {:?}", settings);

        let profile = tempfile::Builder::new().prefix("todo-e2e-").tempdir()?;
        let config = Self::browser_config(settings, profile.path())?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| driver_err("failed to launch Chrome", e))?;

        // chromiumoxide only makes progress while its handler stream is polled
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser handler error: {}", e);
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            handler,
            _profile: profile,
        })
    }

    fn browser_config(settings: &BrowserSettings, profile: &Path) -> E2eResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(settings.window_width, settings.window_height)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage");

        if !settings.headless {
            builder = builder.with_head();
        }

        builder = builder.user_data_dir(profile);

        for arg in &settings.args {
            builder = builder.arg(arg.clone());
        }

        if let Some(path) = &settings.chrome_path {
            builder = builder.chrome_executable(path.clone());
        }

        builder
            .build()
            .map_err(|e| E2eError::Config(format!("invalid browser configuration: {}", e)))
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn open_session(&self) -> E2eResult<Arc<dyn BrowserDriver>> {
        let guard = self.browser.lock().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| E2eError::Driver("browser already closed".into()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| driver_err("failed to open tab", e))?;

        Ok(Arc::new(ChromiumSession::new(page)))
    }

    async fn shutdown(&self) -> E2eResult<()> {
        if let Some(mut browser) = self.browser.lock().await.take() {
            debug!("Closing browser");
            browser
                .close()
                .await
                .map_err(|e| driver_err("failed to close browser", e))?;
        }
        self.handler.abort();
        Ok(())
    }
}

/// One Chrome tab.
pub struct ChromiumSession {
    page: Page,
    elements: Mutex<ElementTable<Element>>,
}

impl ChromiumSession {
    fn new(page: Page) -> Self {
        Self {
            page,
            elements: Mutex::new(ElementTable::default()),
        }
    }

    async fn call_fn(&self, handle: ElementHandle, function: &str) -> E2eResult<Option<Value>> {
        let elements = self.elements.lock().await;
        let returns = elements
            .get(handle)?
            .call_js_fn(function, false)
            .await
            .map_err(|e| driver_err("script failed", e))?;
        Ok(returns.result.value)
    }
}

#[async_trait]
impl BrowserDriver for ChromiumSession {
    async fn navigate(&self, url: &str) -> E2eResult<()> {
        debug!("navigate {}", url);
        self.elements.lock().await.clear();
        self.page
            .goto(url)
            .await
            .map_err(|e| driver_err(&format!("navigation to '{}' failed", url), e))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| driver_err(&format!("navigation to '{}' failed", url), e))?;
        Ok(())
    }

    async fn find_element(&self, selector: &str) -> E2eResult<Option<ElementHandle>> {
        Ok(self.find_elements(selector).await?.into_iter().next())
    }

    async fn find_elements(&self, selector: &str) -> E2eResult<Vec<ElementHandle>> {
        let found = query_result(selector, self.page.find_elements(selector).await)?;
        let mut elements = self.elements.lock().await;
        let handles = elements.replace(found);
        debug!("query '{}' matched {} element(s)", selector, elements.len());
        Ok(handles)
    }

    async fn click(&self, handle: ElementHandle) -> E2eResult<()> {
        let elements = self.elements.lock().await;
        elements
            .get(handle)?
            .click()
            .await
            .map_err(|e| driver_err("click failed", e))?;
        Ok(())
    }

    async fn type_text(&self, handle: ElementHandle, text: &str) -> E2eResult<()> {
        self.call_fn(handle, CLEAR_VALUE_JS).await?;
        let elements = self.elements.lock().await;
        let element = elements.get(handle)?;
        element.focus().await.map_err(|e| driver_err("focus failed", e))?;
        element
            .type_str(text)
            .await
            .map_err(|e| driver_err("typing failed", e))?;
        Ok(())
    }

    async fn read_text(&self, handle: ElementHandle) -> E2eResult<String> {
        let elements = self.elements.lock().await;
        let text = elements
            .get(handle)?
            .inner_text()
            .await
            .map_err(|e| driver_err("reading text failed", e))?;
        Ok(text.unwrap_or_default())
    }

    async fn is_checked(&self, handle: ElementHandle) -> E2eResult<bool> {
        let value = self.call_fn(handle, IS_CHECKED_JS).await?;
        Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn is_interactable(&self, handle: ElementHandle) -> E2eResult<bool> {
        let value = self.call_fn(handle, IS_INTERACTABLE_JS).await?;
        Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn screenshot(&self) -> E2eResult<Screenshot> {
        let bytes = self
            .page
            .screenshot(ScreenshotParams::default())
            .await
            .map_err(|e| driver_err("screenshot failed", e))?;
        Ok(Screenshot::png(bytes))
    }

    async fn close(&self) -> E2eResult<()> {
        self.elements.lock().await.clear();
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| driver_err("failed to close tab", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chrome to be installed
    async fn test_launch_and_open_session() {
        let factory = ChromiumSessionFactory::launch(&BrowserSettings::default())
            .await
            .expect("failed to launch browser");
        let session = factory.open_session().await.expect("failed to open tab");
        session.navigate("about:blank").await.expect("navigate");
        let body = session.find_element("body").await.expect("query");
        assert!(body.is_some());
        session.close().await.expect("close tab");
        factory.shutdown().await.expect("shutdown");
    }

    #[test]
    fn test_browser_config_with_explicit_executable() {
        // Skips executable auto-detection
        let settings = BrowserSettings {
            chrome_path: Some("/usr/bin/true".into()),
            ..BrowserSettings::default()
        };
        let profile = tempfile::tempdir().unwrap();
        let config = ChromiumSessionFactory::browser_config(&settings, profile.path());
        assert!(config.is_ok());
    }

    #[test]
    fn test_profile_dir_removed_on_drop() {
        let profile = tempfile::Builder::new().prefix("todo-e2e-").tempdir().unwrap();
        let path = profile.path().to_path_buf();
        let settings = BrowserSettings {
            chrome_path: Some("/usr/bin/true".into()),
            ..BrowserSettings::default()
        };
        ChromiumSessionFactory::browser_config(&settings, &path).unwrap();
        assert!(path.exists());
        drop(profile);
        assert!(!path.exists());
    }

    #[test]
    fn test_query_error_is_not_an_empty_match() {
        let failed: Result<Vec<u32>, String> = Err("No node with given id found".into());
        let err = query_result(".todo-list li", failed).unwrap_err();
        assert!(matches!(err, E2eError::Driver(ref msg) if msg.contains(".todo-list li")));

        let none: Result<Vec<u32>, String> = Ok(vec![]);
        assert!(query_result(".todo-list li", none).unwrap().is_empty());
    }

    #[test]
    fn test_element_table_keeps_only_latest_query() {
        let mut table = ElementTable::default();
        let mut first = Vec::new();
        for _ in 0..100 {
            first = table.replace(vec!["li#a", "li#b"]);
        }
        assert_eq!(table.len(), 2);
        assert_eq!(*table.get(first[1]).unwrap(), "li#b");

        let second = table.replace(vec!["button"]);
        assert_eq!(table.len(), 1);
        assert!(matches!(table.get(first[0]), Err(E2eError::Driver(_))));
        assert_eq!(*table.get(second[0]).unwrap(), "button");
        assert_ne!(first[0], second[0]);

        table.clear();
        assert_eq!(table.len(), 0);
    }
}
