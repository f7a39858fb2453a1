use rustc_hash::{FxBuildHasher, FxHashMap};

use super::error::EvalError;
use crate::ast::Ident;

/// Lexically scoped integer variables.
///
/// The outermost scope holds the globals declared outside the procedure and is
/// never popped.
#[derive(Debug, Clone)]
pub struct Env {
    scopes: Vec<FxHashMap<Ident, i64>>,
}

impl Default for Env {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

impl Env {
    pub fn new(globals: impl IntoIterator<Item = (Ident, i64)>) -> Self {
        let mut global = FxHashMap::with_capacity_and_hasher(16, FxBuildHasher);
        global.extend(globals);
        Self {
            scopes: vec![global],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declares `name` in the innermost scope, shadowing outer declarations.
    pub fn define(&mut self, name: Ident, value: i64) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, value);
        }
    }

    /// Updates the innermost visible declaration of `name`.
    pub fn assign(&mut self, name: &str, value: i64) -> Result<(), EvalError> {
        match self
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
        {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(EvalError::Undefined(name.into())),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<i64> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }
}
