//! Insertion-ordered tool catalogue (spec.md §4.2).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{Error, ErrorCode, Result};
use crate::tools::{cursor, is_valid_tool_name, Tool, ToolDef};

/// Default/maximum page size for `tools/list` (spec.md §4.2).
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Callback invoked whenever the catalogue changes, so the broker can
/// fan out `notifications/tools/listChanged` (spec.md §4.2, §9).
pub type ChangeListener = Box<dyn Fn() + Send + Sync>;

struct Inner {
    tools: RwLock<IndexMap<String, Arc<Tool>>>,
    epoch: AtomicU64,
    listeners: RwLock<Vec<ChangeListener>>,
    cursor_secret: String,
}

#[derive(Clone)]
pub struct ToolRegistry {
    inner: Arc<Inner>,
}

pub struct ListPage {
    pub tools: Vec<ToolDef>,
    pub next_cursor: Option<String>,
}

impl ToolRegistry {
    pub fn new(cursor_secret: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tools: RwLock::new(IndexMap::new()),
                epoch: AtomicU64::new(0),
                listeners: RwLock::new(Vec::new()),
                cursor_secret: cursor_secret.into(),
            }),
        }
    }

    /// Subscribe to catalogue changes. Returns an unsubscribe handle
    /// (spec.md §9 "event listeners / change subscriptions").
    pub fn on_tools_changed<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut listeners = self.inner.listeners.write();
        listeners.push(Box::new(listener));
        let index = listeners.len() - 1;
        Unsubscribe {
            inner: self.inner.clone(),
            index,
        }
    }

    fn bump_epoch_and_notify(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        // Mutation happens under the write lock above; the notification
        // fires after it is released (spec.md §5: "Mutations also publish
        // an event, outside the lock").
        for listener in self.inner.listeners.read().iter() {
            listener();
        }
    }

    pub fn register(&self, tool: Tool) -> Result<()> {
        if !is_valid_tool_name(&tool.name) {
            return Err(Error::protocol(
                ErrorCode::INVALID_PARAMS,
                format!("invalid tool name: {}", tool.name),
            ));
        }
        {
            let mut tools = self.inner.tools.write();
            if tools.contains_key(&tool.name) {
                return Err(Error::protocol(
                    ErrorCode::INVALID_PARAMS,
                    format!("tool already registered: {}", tool.name),
                ));
            }
            tools.insert(tool.name.clone(), Arc::new(tool));
        }
        self.bump_epoch_and_notify();
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.inner.tools.write().shift_remove(name).is_some();
        if removed {
            self.bump_epoch_and_notify();
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<Tool>> {
        self.inner.tools.read().get(name).cloned()
    }

    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// List tools starting at `cursor` (or the beginning if absent,
    /// malformed, or stale), returning up to `page_size` tools.
    pub fn list(&self, cursor: Option<&str>, page_size: Option<usize>) -> ListPage {
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        let epoch = self.epoch();
        let start = cursor
            .and_then(|c| tools_cursor::decode(&self.inner.cursor_secret, c, epoch))
            .unwrap_or(0);

        let tools = self.inner.tools.read();
        let total = tools.len();
        let end = (start + page_size).min(total);
        let page: Vec<ToolDef> = tools
            .values()
            .skip(start)
            .take(page_size)
            .map(|t| ToolDef::from(t.as_ref()))
            .collect();

        let next_cursor = if end < total {
            Some(tools_cursor::encode(&self.inner.cursor_secret, end, epoch))
        } else {
            None
        };

        ListPage {
            tools: page,
            next_cursor,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Re-export under a distinct path so `list`'s body reads unambiguously
// (the module is also named `cursor`).
mod tools_cursor {
    pub use crate::tools::cursor::{decode, encode};
}

/// Unsubscribe handle returned by [`ToolRegistry::on_tools_changed`].
///
/// Dropping it without calling `unsubscribe` leaves the listener
/// registered — callers that want to stop listening must call it
/// explicitly, matching the teacher's explicit-handle subscription style.
pub struct Unsubscribe {
    inner: Arc<Inner>,
    index: usize,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        let mut listeners = self.inner.listeners.write();
        if self.index < listeners.len() {
            // Replace with a no-op rather than shifting indices of other
            // live `Unsubscribe` handles.
            listeners[self.index] = Box::new(|| {});
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolContent, ToolResult};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn dummy_tool(name: &str) -> Tool {
        Tool {
            name: name.to_string(),
            title: None,
            description: "a test tool".to_string(),
            input_schema: json!({"type": "object"}),
            annotations: None,
            timeout: std::time::Duration::from_secs(30),
            handler: Arc::new(|_args| async { Ok(ToolResult::ok(vec![ToolContent::text("ok")])) }),
        }
    }

    #[test]
    fn register_then_list_preserves_insertion_order() {
        let registry = ToolRegistry::new("secret");
        registry.register(dummy_tool("b_tool")).unwrap();
        registry.register(dummy_tool("a_tool")).unwrap();
        let page = registry.list(None, None);
        let names: Vec<_> = page.tools.iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["b_tool", "a_tool"]);
    }

    #[test]
    fn invalid_name_is_rejected() {
        let registry = ToolRegistry::new("secret");
        let err = registry.register(dummy_tool("BadName")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::INVALID_PARAMS);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let registry = ToolRegistry::new("secret");
        registry.register(dummy_tool("dup")).unwrap();
        assert!(registry.register(dummy_tool("dup")).is_err());
    }

    #[test]
    fn pagination_respects_page_size_and_cursor() {
        let registry = ToolRegistry::new("secret");
        for i in 0..5 {
            registry.register(dummy_tool(&format!("tool_{i}"))).unwrap();
        }
        let page1 = registry.list(None, Some(2));
        assert_eq!(page1.tools.len(), 2);
        assert!(page1.next_cursor.is_some());

        let page2 = registry.list(page1.next_cursor.as_deref(), Some(2));
        assert_eq!(page2.tools.len(), 2);
        assert!(page2.next_cursor.is_some());

        let page3 = registry.list(page2.next_cursor.as_deref(), Some(2));
        assert_eq!(page3.tools.len(), 1);
        assert!(page3.next_cursor.is_none());
    }

    #[test]
    fn tampered_cursor_restarts_from_beginning() {
        let registry = ToolRegistry::new("secret");
        for i in 0..3 {
            registry.register(dummy_tool(&format!("tool_{i}"))).unwrap();
        }
        let page = registry.list(Some("garbage"), Some(1));
        assert_eq!(page.tools[0].name, "tool_0");
    }

    #[test]
    fn mutation_fires_change_listener() {
        let registry = ToolRegistry::new("secret");
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        registry.on_tools_changed(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        registry.register(dummy_tool("t")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        registry.unregister("t");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unregister_returns_whether_removed() {
        let registry = ToolRegistry::new("secret");
        registry.register(dummy_tool("t")).unwrap();
        assert!(registry.unregister("t"));
        assert!(!registry.unregister("t"));
    }
}
