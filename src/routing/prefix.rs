//! Path prefix scoping for nested route declarations.
//!
//! The root prefix is represented as absent, never as `"/"`. Entering a scope
//! appends a segment to the current prefix and hands back the previous value,
//! which the caller restores on the way out.

/// The App's current route prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixScope {
    current: Option<String>,
}

impl PrefixScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Replace the prefix outright.
    pub fn set(&mut self, prefix: &str) {
        self.current = normalize(prefix.to_string());
    }

    /// Compose `segment` onto the current prefix, returning the previous value.
    pub fn enter(&mut self, segment: &str) -> Option<String> {
        let composed = match (&self.current, segment) {
            (current, "" | "/") => current.clone(),
            (Some(current), segment) => normalize(format!("{current}{segment}")),
            (None, segment) => normalize(segment.to_string()),
        };
        std::mem::replace(&mut self.current, composed)
    }

    /// Put back a value returned by [`enter`](Self::enter).
    pub fn restore(&mut self, previous: Option<String>) {
        self.current = previous;
    }

    /// Apply the current prefix to a route spec.
    ///
    /// A bare `/` under a prefix means the prefix itself.
    pub fn apply(&self, spec: &str) -> String {
        match (&self.current, spec) {
            (None, spec) => spec.to_string(),
            (Some(prefix), "/") => prefix.clone(),
            (Some(prefix), spec) => format!("{prefix}{spec}"),
        }
    }
}

fn normalize(prefix: String) -> Option<String> {
    match prefix.as_str() {
        "" | "/" => None,
        _ => Some(prefix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_composition_and_restore() {
        let mut scope = PrefixScope::new();
        let outer = scope.enter("/api");
        let inner = scope.enter("/v1");
        assert_eq!(scope.current(), Some("/api/v1"));
        assert_eq!(scope.apply("/users"), "/api/v1/users");
        assert_eq!(scope.apply("/"), "/api/v1");

        scope.restore(inner);
        assert_eq!(scope.current(), Some("/api"));
        scope.restore(outer);
        assert_eq!(scope.current(), None);
        assert_eq!(scope.apply("/users"), "/users");
    }

    #[test]
    fn test_root_is_absent() {
        let mut scope = PrefixScope::new();
        scope.set("/");
        assert_eq!(scope.current(), None);

        scope.set("/admin");
        let saved = scope.enter("/");
        assert_eq!(scope.current(), Some("/admin"));
        scope.restore(saved);
        assert_eq!(scope.current(), Some("/admin"));
    }
}
