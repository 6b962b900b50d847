use std::cell::RefCell;
use std::rc::Rc;

use scene::Breadcrumb;
use serde::{Deserialize, Serialize};

/// The part of the session mirrored into the page URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub year: i32,
    #[serde(default)]
    pub breadcrumb: Breadcrumb,
    /// Level-1 region highlighted in the region list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
}

impl SessionSnapshot {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            breadcrumb: Breadcrumb::new(),
            selection: None,
        }
    }
}

/// Collaborator that owns URL serialization.
///
/// Read once at bootstrap, written after every session mutation.
pub trait UrlStateSync {
    fn read(&self) -> Option<SessionSnapshot>;
    fn write(&mut self, snapshot: &SessionSnapshot);
}

/// For hosts without a URL.
#[derive(Debug, Default)]
pub struct NoUrlState;

impl UrlStateSync for NoUrlState {
    fn read(&self) -> Option<SessionSnapshot> {
        None
    }

    fn write(&mut self, _snapshot: &SessionSnapshot) {}
}

#[derive(Debug, Default)]
struct MemoryInner {
    current: Option<SessionSnapshot>,
    writes: usize,
}

/// In-memory URL state. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryUrlState {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryUrlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial(snapshot: SessionSnapshot) -> Self {
        let state = Self::default();
        state.inner.borrow_mut().current = Some(snapshot);
        state
    }

    pub fn current(&self) -> Option<SessionSnapshot> {
        self.inner.borrow().current.clone()
    }

    pub fn writes(&self) -> usize {
        self.inner.borrow().writes
    }
}

impl UrlStateSync for MemoryUrlState {
    fn read(&self) -> Option<SessionSnapshot> {
        self.current()
    }

    fn write(&mut self, snapshot: &SessionSnapshot) {
        let mut inner = self.inner.borrow_mut();
        inner.current = Some(snapshot.clone());
        inner.writes += 1;
    }
}
