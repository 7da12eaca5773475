//! Chained variable scopes.

use crate::value::{Map, Value};

/// Variable environment for one render.
///
/// A scope is a chain of frames. Lookups walk from the innermost frame
/// outward; assignments always land in the innermost frame, so a child
/// created for a loop body or `where_exp` never mutates its parent.
#[derive(Debug, Default)]
pub struct Scope {
    frames: Vec<Map>,
}

impl Scope {
    /// Scope with a single root frame.
    #[must_use]
    pub fn new(vars: Map) -> Self {
        Self { frames: vec![vars] }
    }

    /// Look a variable up, innermost frame first.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Bind a variable in the innermost frame.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        if self.frames.is_empty() {
            self.frames.push(Map::new());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), value);
        }
    }

    /// Run `f` inside a child frame seeded with `vars`.
    pub fn with_child<T>(&mut self, vars: Map, f: impl FnOnce(&mut Self) -> T) -> T {
        self.frames.push(vars);
        let result = f(self);
        self.frames.pop();
        result
    }

    pub(crate) fn push(&mut self, vars: Map) {
        self.frames.push(vars);
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    /// Number of frames in the chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
