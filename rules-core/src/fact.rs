//! The fact store: a dotted-path-addressable value tree with scoped lazy
//! loaders.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use rules_value::Value;

use crate::error::RuleError;

/// A single-shot loader thunk. Registered against a dotted-path prefix; it
/// is invoked at most once per `Fact` instance and must itself be
/// `Send + Sync` so facts can be shared across a `rayon` partition.
pub type Loader = Arc<dyn Fn() -> Result<Value, RuleError> + Send + Sync>;

/// A mapping value paired with scoped lazy loaders. Loaders populate a
/// missing subtree on first read; `Clone` deep-copies the value tree and
/// keeps the same loader closures, but the "already loaded" bookkeeping is
/// reset on the clone.
pub struct Fact {
    data: Value,
    loaders: HashMap<String, Loader>,
    loaded: HashSet<String>,
}

impl Clone for Fact {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            loaders: self.loaders.clone(),
            // Loaders are re-usable, but a fresh clone starts with no
            // bookkeeping of what has fired.
            loaded: HashSet::new(),
        }
    }
}

impl Fact {
    pub fn new(root: Option<Value>) -> Self {
        Self {
            data: root.unwrap_or_else(Value::map),
            loaders: HashMap::new(),
            loaded: HashSet::new(),
        }
    }

    /// Install a loader for `path`, replacing any prior loader at that path.
    pub fn set_loader(&mut self, path: impl Into<String>, loader: Loader) {
        self.loaders.insert(path.into(), loader);
    }

    pub fn root(&self) -> &Value {
        &self.data
    }

    /// Resolve a dotted path against the fact, firing loaders as needed.
    /// Returns `Ok(None)` for "not found" (never an error); loader failures
    /// propagate as `RuleError::LoaderFailure`.
    pub fn get_path(&mut self, path: &str) -> Result<Option<Value>, RuleError> {
        let parts: Vec<&str> = path.split('.').collect();
        let mut current = &self.data;

        // Walk the existing tree first; only drop into the mutable loader
        // path when a segment is actually missing.
        for (i, part) in parts.iter().enumerate() {
            let Value::Map(map) = current else {
                return Ok(None);
            };
            if let Some(val) = map.get(*part) {
                current = val;
                continue;
            }
            let prefix = parts[..=i].join(".");
            return self.load_and_continue(&prefix, &parts, i);
        }
        Ok(Some(current.clone()))
    }

    fn load_and_continue(
        &mut self,
        prefix: &str,
        parts: &[&str],
        missing_at: usize,
    ) -> Result<Option<Value>, RuleError> {
        let Some(loader) = self.loaders.get(prefix).cloned() else {
            return Ok(None);
        };
        if !self.loaded.contains(prefix) {
            let value = loader().map_err(|e| RuleError::LoaderFailure {
                path: prefix.to_string(),
                message: e.to_string(),
            })?;
            if let Some(parent) = parent_map_mut(&mut self.data, &parts[..missing_at]) {
                parent.insert(parts[missing_at].to_string(), value);
            }
            self.loaded.insert(prefix.to_string());
        }

        // Re-resolve from the (now populated, or still missing) tree.
        let mut current = &self.data;
        for part in &parts[..=missing_at] {
            let Value::Map(map) = current else {
                return Ok(None);
            };
            let Some(val) = map.get(*part) else {
                return Ok(None);
            };
            current = val;
        }
        if missing_at + 1 == parts.len() {
            return Ok(Some(current.clone()));
        }
        // More path remains below the just-loaded segment; keep walking.
        let mut value = current.clone();
        for part in &parts[missing_at + 1..] {
            match value {
                Value::Map(map) => match map.get(*part) {
                    Some(v) => value = v.clone(),
                    None => return Ok(None),
                },
                _ => return Ok(None),
            }
        }
        Ok(Some(value))
    }
}

fn parent_map_mut<'a>(root: &'a mut Value, prefix_parts: &[&str]) -> Option<&'a mut BTreeMap<String, Value>> {
    let mut current = root;
    for part in prefix_parts {
        current = match current {
            Value::Map(map) => map.get_mut(*part)?,
            _ => return None,
        };
    }
    match current {
        Value::Map(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn map_value(pairs: Vec<(&str, Value)>) -> Value {
        let mut m = BTreeMap::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v);
        }
        Value::Map(m)
    }

    #[test]
    fn get_path_reads_nested_fields() {
        let user = map_value(vec![("city", Value::String("北京".into()))]);
        let root = map_value(vec![("user", user)]);
        let mut fact = Fact::new(Some(root));
        assert_eq!(
            fact.get_path("user.city").unwrap(),
            Some(Value::String("北京".into()))
        );
    }

    #[test]
    fn get_path_returns_none_for_unknown_path() {
        let mut fact = Fact::new(None);
        assert_eq!(fact.get_path("user.city").unwrap(), None);
    }

    #[test]
    fn get_path_returns_none_when_traversal_hits_non_map() {
        let root = map_value(vec![("user", Value::Int(1))]);
        let mut fact = Fact::new(Some(root));
        assert_eq!(fact.get_path("user.city").unwrap(), None);
    }

    #[test]
    fn loader_fires_exactly_once_and_populates_parent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let mut fact = Fact::new(None);
        fact.set_loader(
            "user",
            Arc::new(move || {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(map_value(vec![("city", Value::String("上海".into()))]))
            }),
        );

        assert_eq!(
            fact.get_path("user.city").unwrap(),
            Some(Value::String("上海".into()))
        );
        assert_eq!(
            fact.get_path("user.city").unwrap(),
            Some(Value::String("上海".into()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn loader_registered_for_deeper_prefix_does_not_chain() {
        // Loader at "a.b" only; reading "a.b.c" should not cause a loader
        // registered only at "a" to fire, and vice versa.
        let mut fact = Fact::new(None);
        fact.set_loader(
            "a.b",
            Arc::new(|| Ok(map_value(vec![("c", Value::Int(42))]))),
        );
        assert_eq!(fact.get_path("a.b.c").unwrap(), Some(Value::Int(42)));
        // No loader registered at "a" itself.
        assert_eq!(fact.get_path("a.other").unwrap(), None);
    }

    #[test]
    fn loader_error_propagates() {
        let mut fact = Fact::new(None);
        fact.set_loader(
            "user",
            Arc::new(|| Err(RuleError::LoaderFailure {
                path: "user".into(),
                message: "boom".into(),
            })),
        );
        assert!(fact.get_path("user.city").is_err());
    }

    #[test]
    fn clone_deep_copies_data_and_resets_loaded_bookkeeping() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let mut fact = Fact::new(None);
        fact.set_loader(
            "user",
            Arc::new(move || {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(map_value(vec![("city", Value::String("北京".into()))]))
            }),
        );
        fact.get_path("user.city").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let mut cloned = fact.clone();
        // Cloned fact still has the data already loaded into its tree...
        assert_eq!(
            cloned.get_path("user.city").unwrap(),
            Some(Value::String("北京".into()))
        );
        // ...so the loader should not need to fire again even though the
        // "loaded" set was reset, because the value is already present.
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Mutating behavior is independent: the original fact is unaffected
        // by anything done to the clone.
        let original_value = fact.get_path("user.city").unwrap();
        assert_eq!(original_value, Some(Value::String("北京".into())));
    }
}
