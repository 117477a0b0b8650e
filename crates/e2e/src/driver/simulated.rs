//! In-process model of the Environment Todo page.
//!
//! Answers the same selectors as the real markup (taken from the locator map
//! it is built with), so page objects and step definitions can be exercised
//! without a browser. Knobs on [`SimulatedOptions`] reproduce the awkward
//! cases: a page that never shows its landmark, controls that render late or
//! stay disabled, and queries that hang.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{BrowserDriver, ElementHandle, Screenshot, SessionFactory};
use crate::error::{E2eError, E2eResult};
use crate::locator::{todo, LocatorMap};

/// Behaviour of a simulated page.
#[derive(Debug, Clone)]
pub struct SimulatedOptions {
    /// Heading rendered on load.
    pub landmark: String,
    /// Todos present right after navigation.
    pub initial_todos: Vec<String>,
    /// Number of queries that return nothing after each navigation.
    pub render_delay_queries: usize,
    /// Render the add button disabled.
    pub add_button_disabled: bool,
    /// Make every query sleep this long.
    pub query_latency: Option<Duration>,
}

impl Default for SimulatedOptions {
    fn default() -> Self {
        Self {
            landmark: "Environment Todo".to_string(),
            initial_todos: Vec::new(),
            render_delay_queries: 0,
            add_button_disabled: false,
            query_latency: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Body,
    NewTodoField,
    AddButton,
    RemainingText,
    Checkbox(usize),
    CheckboxText(usize),
}

#[derive(Debug, Clone)]
struct TodoItem {
    text: String,
    done: bool,
}

#[derive(Debug, Default)]
struct PageState {
    loaded: bool,
    url: String,
    field: String,
    todos: Vec<TodoItem>,
    pending_renders: usize,
    handles: HashMap<u64, Node>,
    next_handle: u64,
    closed: bool,
}

/// A single simulated tab.
pub struct SimulatedTodoApp {
    options: SimulatedOptions,
    selectors: HashMap<String, &'static str>,
    state: Mutex<PageState>,
}

impl SimulatedTodoApp {
    pub fn new(locators: &LocatorMap, options: SimulatedOptions) -> Self {
        let selectors = todo::DEFAULTS
            .iter()
            .filter_map(|(name, _)| {
                locators
                    .selector(name)
                    .ok()
                    .map(|selector| (selector.to_string(), *name))
            })
            .collect();

        Self {
            options,
            selectors,
            state: Mutex::new(PageState::default()),
        }
    }

    /// Texts of all todos, in display order.
    pub fn todo_texts(&self) -> Vec<String> {
        self.state.lock().todos.iter().map(|t| t.text.clone()).collect()
    }

    /// URL of the last navigation.
    pub fn current_url(&self) -> String {
        self.state.lock().url.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn remaining_text(todos: &[TodoItem]) -> String {
        let open = todos.iter().filter(|t| !t.done).count();
        format!("{} of {} remaining", open, todos.len())
    }

    async fn latency(&self) {
        if let Some(delay) = self.options.query_latency {
            tokio::time::sleep(delay).await;
        }
    }

    /// Resolve `selector` into the nodes currently rendered for it.
    fn query(&self, selector: &str) -> E2eResult<Vec<ElementHandle>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(E2eError::Driver("session closed".into()));
        }
        if !state.loaded {
            return Ok(Vec::new());
        }
        if state.pending_renders > 0 {
            state.pending_renders -= 1;
            return Ok(Vec::new());
        }

        let nodes: Vec<Node> = match self.selectors.get(selector).copied() {
            Some(todo::PAGE_BODY) => vec![Node::Body],
            Some(todo::NEW_TODO_FIELD) => vec![Node::NewTodoField],
            Some(todo::ADD_BUTTON) => vec![Node::AddButton],
            Some(todo::REMAINING_TEXT) => vec![Node::RemainingText],
            Some(todo::CHECKBOX) => (0..state.todos.len()).map(Node::Checkbox).collect(),
            Some(todo::CHECKBOX_TEXT) => (0..state.todos.len()).map(Node::CheckboxText).collect(),
            _ => Vec::new(),
        };

        Ok(nodes
            .into_iter()
            .map(|node| {
                state.next_handle += 1;
                let id = state.next_handle;
                state.handles.insert(id, node);
                ElementHandle(id)
            })
            .collect())
    }

    fn node(state: &PageState, handle: ElementHandle) -> E2eResult<Node> {
        if state.closed {
            return Err(E2eError::Driver("session closed".into()));
        }
        state
            .handles
            .get(&handle.0)
            .copied()
            .ok_or_else(|| E2eError::Driver(format!("stale element handle {}", handle.0)))
    }

    fn render(&self, state: &PageState) -> String {
        let mut out = format!("<h1>{}</h1>\n", self.options.landmark);
        out.push_str(&format!("[{}] [Add]\n", state.field));
        for item in &state.todos {
            out.push_str(&format!("[{}] {}\n", if item.done { "x" } else { " " }, item.text));
        }
        out.push_str(&Self::remaining_text(&state.todos));
        out
    }
}

#[async_trait]
impl BrowserDriver for SimulatedTodoApp {
    async fn navigate(&self, url: &str) -> E2eResult<()> {
        debug!("simulated navigate {}", url);
        let mut state = self.state.lock();
        if state.closed {
            return Err(E2eError::Driver("session closed".into()));
        }
        state.loaded = true;
        state.url = url.to_string();
        state.field.clear();
        state.todos = self
            .options
            .initial_todos
            .iter()
            .map(|text| TodoItem {
                text: text.clone(),
                done: false,
            })
            .collect();
        state.pending_renders = self.options.render_delay_queries;
        state.handles.clear();
        Ok(())
    }

    async fn find_element(&self, selector: &str) -> E2eResult<Option<ElementHandle>> {
        self.latency().await;
        Ok(self.query(selector)?.into_iter().next())
    }

    async fn find_elements(&self, selector: &str) -> E2eResult<Vec<ElementHandle>> {
        self.latency().await;
        self.query(selector)
    }

    async fn click(&self, handle: ElementHandle) -> E2eResult<()> {
        let mut state = self.state.lock();
        match Self::node(&state, handle)? {
            Node::AddButton => {
                let text = std::mem::take(&mut state.field);
                if !text.trim().is_empty() {
                    state.todos.push(TodoItem { text, done: false });
                }
            }
            Node::Checkbox(i) => {
                let item = state
                    .todos
                    .get_mut(i)
                    .ok_or_else(|| E2eError::Driver(format!("detached checkbox {}", i)))?;
                item.done = !item.done;
            }
            _ => {}
        }
        Ok(())
    }

    async fn type_text(&self, handle: ElementHandle, text: &str) -> E2eResult<()> {
        let mut state = self.state.lock();
        match Self::node(&state, handle)? {
            Node::NewTodoField => {
                state.field = text.to_string();
                Ok(())
            }
            other => Err(E2eError::Driver(format!("cannot type into {:?}", other))),
        }
    }

    async fn read_text(&self, handle: ElementHandle) -> E2eResult<String> {
        let state = self.state.lock();
        let text = match Self::node(&state, handle)? {
            Node::Body => self.render(&state),
            Node::NewTodoField | Node::Checkbox(_) => String::new(),
            Node::AddButton => "Add".to_string(),
            Node::RemainingText => Self::remaining_text(&state.todos),
            Node::CheckboxText(i) => state
                .todos
                .get(i)
                .map(|t| t.text.clone())
                .ok_or_else(|| E2eError::Driver(format!("detached todo {}", i)))?,
        };
        Ok(text)
    }

    async fn is_checked(&self, handle: ElementHandle) -> E2eResult<bool> {
        let state = self.state.lock();
        match Self::node(&state, handle)? {
            Node::Checkbox(i) => Ok(state.todos.get(i).map(|t| t.done).unwrap_or(false)),
            _ => Ok(false),
        }
    }

    async fn is_interactable(&self, handle: ElementHandle) -> E2eResult<bool> {
        let state = self.state.lock();
        match Self::node(&state, handle)? {
            Node::AddButton => Ok(!self.options.add_button_disabled),
            _ => Ok(true),
        }
    }

    async fn screenshot(&self) -> E2eResult<Screenshot> {
        let state = self.state.lock();
        Ok(Screenshot {
            bytes: self.render(&state).into_bytes(),
            mime: "text/plain",
        })
    }

    async fn close(&self) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.closed = true;
        state.handles.clear();
        Ok(())
    }
}

/// Opens a fresh [`SimulatedTodoApp`] per session.
pub struct SimulatedSessionFactory {
    locators: LocatorMap,
    options: SimulatedOptions,
    opened: AtomicUsize,
    sessions: Mutex<Vec<Arc<SimulatedTodoApp>>>,
}

impl SimulatedSessionFactory {
    pub fn new(locators: LocatorMap, options: SimulatedOptions) -> Self {
        Self {
            locators,
            options,
            opened: AtomicUsize::new(0),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Every session handed out so far, oldest first.
    pub fn sessions(&self) -> Vec<Arc<SimulatedTodoApp>> {
        self.sessions.lock().clone()
    }
}

#[async_trait]
impl SessionFactory for SimulatedSessionFactory {
    async fn open_session(&self) -> E2eResult<Arc<dyn BrowserDriver>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let app = Arc::new(SimulatedTodoApp::new(&self.locators, self.options.clone()));
        self.sessions.lock().push(app.clone());
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(options: SimulatedOptions) -> SimulatedTodoApp {
        SimulatedTodoApp::new(&LocatorMap::todo_page(), options)
    }

    fn sel(name: &str) -> String {
        LocatorMap::todo_page().selector(name).unwrap().to_string()
    }

    #[tokio::test]
    async fn test_nothing_rendered_before_navigation() {
        let app = app(SimulatedOptions::default());
        assert!(app.find_element(&sel(todo::PAGE_BODY)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_todo_flow() {
        let app = app(SimulatedOptions::default());
        app.navigate("http://localhost:3000/").await.unwrap();

        let field = app.find_element(&sel(todo::NEW_TODO_FIELD)).await.unwrap().unwrap();
        app.type_text(field, "Buy milk").await.unwrap();
        let add = app.find_element(&sel(todo::ADD_BUTTON)).await.unwrap().unwrap();
        app.click(add).await.unwrap();

        assert_eq!(app.todo_texts(), vec!["Buy milk".to_string()]);
        let remaining = app.find_element(&sel(todo::REMAINING_TEXT)).await.unwrap().unwrap();
        assert_eq!(app.read_text(remaining).await.unwrap(), "1 of 1 remaining");
    }

    #[tokio::test]
    async fn test_checkbox_toggles() {
        let app = app(SimulatedOptions {
            initial_todos: vec!["a".into(), "b".into()],
            ..SimulatedOptions::default()
        });
        app.navigate("/").await.unwrap();

        let boxes = app.find_elements(&sel(todo::CHECKBOX)).await.unwrap();
        assert_eq!(boxes.len(), 2);
        app.click(boxes[1]).await.unwrap();
        assert!(app.is_checked(boxes[1]).await.unwrap());
        assert!(!app.is_checked(boxes[0]).await.unwrap());
    }

    #[tokio::test]
    async fn test_render_delay_hides_first_queries() {
        let app = app(SimulatedOptions {
            render_delay_queries: 2,
            ..SimulatedOptions::default()
        });
        app.navigate("/").await.unwrap();
        let body = sel(todo::PAGE_BODY);
        assert!(app.find_element(&body).await.unwrap().is_none());
        assert!(app.find_element(&body).await.unwrap().is_none());
        assert!(app.find_element(&body).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_closed_session_rejects_calls() {
        let app = app(SimulatedOptions::default());
        app.close().await.unwrap();
        assert!(app.is_closed());
        assert!(matches!(app.navigate("/").await, Err(E2eError::Driver(_))));
    }

    #[tokio::test]
    async fn test_factory_sessions_are_independent() {
        let factory = SimulatedSessionFactory::new(LocatorMap::todo_page(), SimulatedOptions::default());
        let first = factory.open_session().await.unwrap();
        let second = factory.open_session().await.unwrap();
        first.navigate("/").await.unwrap();
        let field = first.find_element(&sel(todo::NEW_TODO_FIELD)).await.unwrap().unwrap();
        first.type_text(field, "only here").await.unwrap();
        let add = first.find_element(&sel(todo::ADD_BUTTON)).await.unwrap().unwrap();
        first.click(add).await.unwrap();

        second.navigate("/").await.unwrap();
        let items = second.find_elements(&sel(todo::CHECKBOX_TEXT)).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(factory.sessions_opened(), 2);
        assert_eq!(factory.sessions()[0].todo_texts(), vec!["only here".to_string()]);
    }
}
