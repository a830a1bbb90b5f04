use regex::Regex;
use serde::Deserialize;
use tracing::warn;

const DEFAULT_PRIMITIVE_PREFIX: &str = "use";

/// Plugin options, read from the JSON object the host passes to the plugin.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Object the memoization primitives are read from (`React.useMemo`).
    /// `None` or an empty string emits bare calls (`useMemo(...)`).
    pub namespace: Option<String>,
    pub callback_primitive: String,
    pub value_primitive: String,
    /// Callee names matching this pattern are already stateful primitives
    /// and are never wrapped again.
    pub primitive_pattern: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: Some("React".to_string()),
            callback_primitive: "useCallback".to_string(),
            value_primitive: "useMemo".to_string(),
            primitive_pattern: format!("^{DEFAULT_PRIMITIVE_PREFIX}"),
        }
    }
}

impl Config {
    /// Parse the raw plugin config. Bad JSON is not fatal: defaults are used.
    pub fn from_json(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(raw).unwrap_or_else(|err| {
            warn!(%err, "invalid react-persist plugin config, using defaults");
            Self::default()
        })
    }

    pub(crate) fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    pub(crate) fn primitive_matcher(&self) -> PrimitiveMatcher {
        match Regex::new(&self.primitive_pattern) {
            Ok(re) => PrimitiveMatcher::Pattern(re),
            Err(err) => {
                warn!(
                    pattern = %self.primitive_pattern,
                    %err,
                    "invalid primitivePattern, falling back to prefix match"
                );
                PrimitiveMatcher::Prefix(DEFAULT_PRIMITIVE_PREFIX.to_string())
            }
        }
    }
}

/// Recognizes callee names that belong to the framework's stateful primitives.
#[derive(Debug, Clone)]
pub enum PrimitiveMatcher {
    Pattern(Regex),
    Prefix(String),
}

impl PrimitiveMatcher {
    pub fn is_match(&self, name: &str) -> bool {
        match self {
            PrimitiveMatcher::Pattern(re) => re.is_match(name),
            PrimitiveMatcher::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }
}

impl Default for PrimitiveMatcher {
    fn default() -> Self {
        Config::default().primitive_matcher()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = Config::from_json(r#"{ "valuePrimitive": "useStableValue" }"#);
        assert_eq!(config.namespace(), Some("React"));
        assert_eq!(config.callback_primitive, "useCallback");
        assert_eq!(config.value_primitive, "useStableValue");
    }

    #[test]
    fn null_namespace_emits_bare_calls() {
        let config = Config::from_json(r#"{ "namespace": null }"#);
        assert_eq!(config.namespace(), None);

        let config = Config::from_json(r#"{ "namespace": "" }"#);
        assert_eq!(config.namespace(), None);
    }

    #[test]
    fn malformed_json_uses_defaults() {
        let config = Config::from_json("{ namespace: ");
        assert_eq!(config.namespace(), Some("React"));
        assert_eq!(config.primitive_pattern, "^use");
    }

    #[test]
    fn default_matcher_is_case_sensitive_prefix() {
        let matcher = Config::default().primitive_matcher();
        assert!(matcher.is_match("useCallback"));
        assert!(matcher.is_match("useCustomThing"));
        assert!(!matcher.is_match("UseCallback"));
        assert!(!matcher.is_match("reuse"));
    }

    #[test]
    fn invalid_pattern_falls_back_to_prefix() {
        let config = Config {
            primitive_pattern: "(".to_string(),
            ..Config::default()
        };
        let matcher = config.primitive_matcher();
        assert!(matches!(matcher, PrimitiveMatcher::Prefix(_)));
        assert!(matcher.is_match("useMemo"));
        assert!(!matcher.is_match("memo"));
    }
}
