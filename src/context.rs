use std::sync::Arc;

use serde_json::Value;

use crate::record::{Fields, IntoFields};

/// Key/value pairs merged into every record emitted through a logger.
///
/// A binder never changes after it is built. `bind` and `unbind` return a
/// copy, so children never observe their siblings' or parent's bindings
/// and the map can be shared across threads without locking.
#[derive(Debug, Clone, Default)]
pub struct BoundContext {
    map: Arc<Fields>,
}

impl BoundContext {
    pub fn new(fields: impl IntoFields) -> Self {
        BoundContext {
            map: Arc::new(fields.into_fields()),
        }
    }

    /// Parent's mapping plus `fields`; `fields` wins on collision.
    pub fn bind(&self, fields: impl IntoFields) -> Self {
        let extra = fields.into_fields();
        if extra.is_empty() {
            return self.clone();
        }
        let mut map = Fields::clone(&self.map);
        map.extend(extra);
        BoundContext { map: Arc::new(map) }
    }

    /// Parent's mapping without `keys`. Unknown keys are ignored.
    pub fn unbind<I, K>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut map = Fields::clone(&self.map);
        for key in keys {
            map.remove(key.as_ref());
        }
        BoundContext { map: Arc::new(map) }
    }

    pub fn as_mapping(&self) -> &Fields {
        &self.map
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Bound context overlaid with call-site fields; call-site wins.
    pub(crate) fn resolve(&self, call_fields: Fields) -> Fields {
        if self.map.is_empty() {
            return call_fields;
        }
        let mut merged = Fields::clone(&self.map);
        merged.extend(call_fields);
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_overrides_without_touching_parent() {
        let root = BoundContext::default();
        let a1 = root.bind([("a", 1)]);
        let a2 = a1.bind([("a", 2)]);

        assert!(root.get("a").is_none());
        assert_eq!(a1.get("a"), Some(&Value::from(1)));
        assert_eq!(a2.get("a"), Some(&Value::from(2)));
    }

    #[test]
    fn siblings_are_independent() {
        let parent = BoundContext::new([("service", "auth")]);
        let left = parent.bind([("side", "left")]);
        let right = parent.bind([("side", "right")]);

        assert_eq!(left.get("side"), Some(&Value::from("left")));
        assert_eq!(right.get("side"), Some(&Value::from("right")));
        assert!(parent.get("side").is_none());
    }

    #[test]
    fn unbind_drops_keys_and_ignores_missing_ones() {
        let ctx = BoundContext::new([("initial_key", "v"), ("user_id", "123")]);
        let trimmed = ctx.unbind(["initial_key", "non_existent_key"]);

        assert!(trimmed.get("initial_key").is_none());
        assert_eq!(trimmed.get("user_id"), Some(&Value::from("123")));
        assert!(ctx.get("initial_key").is_some());
    }

    #[test]
    fn call_fields_win_over_bound_context() {
        let ctx = BoundContext::new([("user", "abc-123"), ("session", "s1")]);
        let merged = ctx.resolve(crate::fields! { "user" => "test" });

        assert_eq!(merged["user"], Value::from("test"));
        assert_eq!(merged["session"], Value::from("s1"));
    }
}
