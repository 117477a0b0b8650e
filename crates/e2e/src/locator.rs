//! Semantic element names and the selectors they resolve to

use std::collections::BTreeMap;

use crate::error::{E2eError, E2eResult};

/// Element names used by the Todo page.
pub mod todo {
    pub const PAGE_BODY: &str = "page_body";
    pub const NEW_TODO_FIELD: &str = "new_todo_field";
    pub const ADD_BUTTON: &str = "add_button";
    pub const REMAINING_TEXT: &str = "remaining_text";
    pub const CHECKBOX: &str = "checkbox";
    pub const CHECKBOX_TEXT: &str = "checkbox_text";

    /// Default selectors for the Environment Todo markup.
    pub const DEFAULTS: &[(&str, &str)] = &[
        (PAGE_BODY, "body"),
        (NEW_TODO_FIELD, "input.new-todo"),
        (ADD_BUTTON, "button.add-todo"),
        (REMAINING_TEXT, ".remaining"),
        (CHECKBOX, ".todo-list li input[type=\"checkbox\"]"),
        (CHECKBOX_TEXT, ".todo-list li .todo-text"),
    ];
}

/// Read-only table from semantic element name to selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorMap {
    entries: BTreeMap<String, String>,
}

impl LocatorMap {
    /// Build a map, rejecting duplicate names and empty selectors.
    pub fn from_entries<I, N, S>(entries: I) -> E2eResult<Self>
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (name, selector) in entries {
            let name = name.into();
            let selector = selector.into();
            if selector.trim().is_empty() {
                return Err(E2eError::Config(format!("locator '{}' has an empty selector", name)));
            }
            if map.insert(name.clone(), selector).is_some() {
                return Err(E2eError::Config(format!("duplicate locator name '{}'", name)));
            }
        }
        Ok(Self { entries: map })
    }

    /// The Todo page table with its default selectors.
    pub fn todo_page() -> Self {
        Self {
            entries: todo::DEFAULTS
                .iter()
                .map(|(name, selector)| (name.to_string(), selector.to_string()))
                .collect(),
        }
    }

    /// Replace selectors of already-registered names.
    ///
    /// Overrides can only retarget existing names; introducing a new name is
    /// an `UnknownElement` error so typos in config surface at load time.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> E2eResult<Self> {
        for (name, selector) in overrides {
            if selector.trim().is_empty() {
                return Err(E2eError::Config(format!("locator '{}' has an empty selector", name)));
            }
            match self.entries.get_mut(name) {
                Some(slot) => *slot = selector.clone(),
                None => return Err(E2eError::UnknownElement(name.clone())),
            }
        }
        Ok(self)
    }

    /// Resolve a semantic name to its selector.
    pub fn selector(&self, name: &str) -> E2eResult<&str> {
        self.entries
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| E2eError::UnknownElement(name.to_string()))
    }

    /// Fail unless every name in `names` is registered.
    pub fn require(&self, names: &[&str]) -> E2eResult<()> {
        for name in names {
            self.selector(name)?;
        }
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
