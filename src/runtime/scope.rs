//! Variable scopes
//!
//! Lookups walk from the innermost scope outwards. Assignments always land
//! in the innermost scope, so a binding made inside a guarded region or a
//! loop body disappears when that scope is popped.

use std::collections::HashMap;

use super::Value;

#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    scopes: Vec<HashMap<String, Value>>,
}

impl ScopeStack {
    /// Stack with `root` as its outermost scope
    pub fn new(root: HashMap<String, Value>) -> Self {
        Self { scopes: vec![root] }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn truncate(&mut self, depth: usize) {
        self.scopes.truncate(depth.max(1));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }
}
