//! Browser driver capability set.
//!
//! The harness never speaks CDP or WebDriver itself. Everything it needs from
//! a browser goes through [`BrowserDriver`], and every scenario gets its own
//! session from a [`SessionFactory`].
//!
//! # Implementations
//!
//! - [`chromium::ChromiumSessionFactory`] - headless Chrome via chromiumoxide,
//!   one tab per scenario
//! - [`simulated::SimulatedSessionFactory`] - in-process model of the Todo
//!   app, used by the test suite and `--driver simulated`

pub mod chromium;
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::E2eResult;

/// Opaque reference to an element inside one session.
///
/// Handles are only meaningful to the session that issued them and are
/// invalidated by navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub u64);

/// Captured page image (or, for non-graphical drivers, a textual snapshot).
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl Screenshot {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime: "image/png",
        }
    }

    /// File extension matching the mime type.
    pub fn extension(&self) -> &'static str {
        match self.mime {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            _ => "txt",
        }
    }
}

/// One live browser session (a tab) owned by the running scenario.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Load `url` and wait for the navigation to settle.
    async fn navigate(&self, url: &str) -> E2eResult<()>;

    /// First element matching `selector`, if any.
    ///
    /// Handles from earlier queries may be invalidated by a new one.
    async fn find_element(&self, selector: &str) -> E2eResult<Option<ElementHandle>>;

    /// All elements matching `selector`, in document order.
    async fn find_elements(&self, selector: &str) -> E2eResult<Vec<ElementHandle>>;

    async fn click(&self, element: ElementHandle) -> E2eResult<()>;

    /// Focus the element and replace its current value with `text`.
    async fn type_text(&self, element: ElementHandle, text: &str) -> E2eResult<()>;

    /// Rendered text content.
    async fn read_text(&self, element: ElementHandle) -> E2eResult<String>;

    async fn is_checked(&self, element: ElementHandle) -> E2eResult<bool>;

    /// Visible and enabled.
    async fn is_interactable(&self, element: ElementHandle) -> E2eResult<bool>;

    async fn screenshot(&self) -> E2eResult<Screenshot>;

    /// Release the session. Further calls are undefined.
    async fn close(&self) -> E2eResult<()>;
}

/// Creates isolated sessions, one per scenario attempt.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open_session(&self) -> E2eResult<Arc<dyn BrowserDriver>>;

    /// Tear down shared resources (e.g. the browser process).
    async fn shutdown(&self) -> E2eResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screenshot_extension() {
        assert_eq!(Screenshot::png(vec![1, 2]).extension(), "png");
        let text = Screenshot {
            bytes: b"dom".to_vec(),
            mime: "text/plain",
        };
        assert_eq!(text.extension(), "txt");
    }
}
