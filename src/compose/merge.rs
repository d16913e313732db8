//! Deep merge of compose specifications
//!
//! Both sides are lowered to YAML value trees (absent fields dropped),
//! combined node by node under a [`MergeStrategy`], and validated back into
//! the typed model. The default strategy merges mappings key by key and lets
//! the partial side win everywhere else, so sequences such as `ports` are
//! replaced wholesale rather than concatenated.

use super::config::ComposeSpecification;
use super::parser::ComposeParser;
use crate::error::Result;
use serde_yaml::Value;

/// How a node present on both sides is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep the base value
    PreferBase,
    /// Take the partial value, whatever its type
    PreferPartial,
    /// Merge mappings key by key; non-mappings fall back to the partial value
    DeepMerge,
    /// Append partial sequence items after the base ones; non-sequences fall
    /// back to the partial value
    Concatenate,
}

/// Conflict resolution policy consulted for every node present on both sides
pub trait MergeStrategy {
    /// Decide how to combine `base` and `partial` found at `path`
    ///
    /// `path` holds the mapping keys leading to the node, e.g.
    /// `["services", "web", "ports"]`; it is empty for the document root.
    fn disposition(&self, path: &[String], base: &Value, partial: &Value) -> Disposition;
}

/// Deep-merge mappings, overwrite everything else with the partial value
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStrategy;

impl MergeStrategy for DefaultStrategy {
    fn disposition(&self, _path: &[String], base: &Value, partial: &Value) -> Disposition {
        if base.is_mapping() && partial.is_mapping() {
            Disposition::DeepMerge
        } else {
            Disposition::PreferPartial
        }
    }
}

/// [`DefaultStrategy`] with per-field overrides
///
/// Fields are addressed by dotted paths where `*` matches any single key:
///
/// ```
/// use testcompose::compose::merge::{Disposition, FieldStrategy};
///
/// let strategy = FieldStrategy::new()
///     .with("services.*.image", Disposition::PreferBase)
///     .with("services.*.ports", Disposition::Concatenate);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FieldStrategy {
    overrides: Vec<(Vec<String>, Disposition)>,
}

impl FieldStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve nodes matching `path` with `disposition`; later rules win
    pub fn with(mut self, path: &str, disposition: Disposition) -> Self {
        let pattern = path
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self.overrides.push((pattern, disposition));
        self
    }

    fn matches(pattern: &[String], path: &[String]) -> bool {
        pattern.len() == path.len()
            && pattern
                .iter()
                .zip(path)
                .all(|(expected, actual)| expected == "*" || expected == actual)
    }
}

impl MergeStrategy for FieldStrategy {
    fn disposition(&self, path: &[String], base: &Value, partial: &Value) -> Disposition {
        self.overrides
            .iter()
            .rev()
            .find(|(pattern, _)| Self::matches(pattern, path))
            .map(|(_, disposition)| *disposition)
            .unwrap_or_else(|| DefaultStrategy.disposition(path, base, partial))
    }
}

/// Merge `partial` over `base`, producing a new specification
pub fn merge(
    base: &ComposeSpecification,
    partial: &ComposeSpecification,
    strategy: &dyn MergeStrategy,
) -> Result<ComposeSpecification> {
    let mut merged = ComposeParser::to_value(base)?;
    let overlay = ComposeParser::to_value(partial)?;
    merge_values(&mut merged, overlay, strategy);
    ComposeParser::from_value(merged)
}

/// Merge two YAML value trees in place
pub fn merge_values(base: &mut Value, partial: Value, strategy: &dyn MergeStrategy) {
    let mut path = Vec::new();
    merge_node(base, partial, &mut path, strategy);
}

fn merge_node(
    base: &mut Value,
    partial: Value,
    path: &mut Vec<String>,
    strategy: &dyn MergeStrategy,
) {
    match strategy.disposition(path, base, &partial) {
        Disposition::PreferBase => {}
        Disposition::PreferPartial => *base = partial,
        Disposition::DeepMerge => match (base, partial) {
            (Value::Mapping(existing), Value::Mapping(overlay)) => {
                for (key, value) in overlay {
                    match existing.get_mut(&key) {
                        Some(slot) => {
                            path.push(key_segment(&key));
                            merge_node(slot, value, path, strategy);
                            path.pop();
                        }
                        None => {
                            existing.insert(key, value);
                        }
                    }
                }
            }
            (base, partial) => *base = partial,
        },
        Disposition::Concatenate => match (base, partial) {
            (Value::Sequence(existing), Value::Sequence(overlay)) => existing.extend(overlay),
            (base, partial) => *base = partial,
        },
    }
}

fn key_segment(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::config::{Network, PortConfig, PortMapping, Service};

    fn web(image: &str, ports: Option<Vec<PortMapping>>) -> ComposeSpecification {
        let mut service = Service::from_image(image);
        service.ports = ports;
        ComposeSpecification::with_service("web", service)
    }

    #[test]
    fn test_scalar_is_right_biased() {
        let merged = merge(&web("base", None), &web("new", None), &DefaultStrategy).unwrap();
        assert_eq!(merged.service("web").unwrap().image.as_deref(), Some("new"));
    }

    #[test]
    fn test_sequences_are_replaced() {
        let base = web("app", Some(vec![1.into(), 2.into()]));
        let partial = web("app", Some(vec![3.into()]));
        let merged = merge(&base, &partial, &DefaultStrategy).unwrap();
        assert_eq!(
            merged.service("web").unwrap().ports,
            Some(vec![PortMapping::Number(3)])
        );
    }

    #[test]
    fn test_unspecified_fields_survive() {
        let base = web("base", Some(vec![2020.into()]));
        let partial = web("new", None);
        let merged = merge(&base, &partial, &DefaultStrategy).unwrap();
        assert_eq!(merged, web("new", Some(vec![2020.into()])));
    }

    #[test]
    fn test_keys_are_merged_per_side() {
        let mut base = web("app", None);
        base.networks = Some([("front".to_string(), Some(Network::with_driver("bridge")))].into());
        let mut partial = ComposeSpecification::with_service("db", Service::from_image("postgres"));
        partial.networks = Some([("back".to_string(), None)].into());

        let merged = merge(&base, &partial, &DefaultStrategy).unwrap();
        assert_eq!(merged.service_names(), vec!["db", "web"]);
        let networks = merged.networks.unwrap();
        assert_eq!(networks.len(), 2);
        assert_eq!(networks["front"], Some(Network::with_driver("bridge")));
        assert_eq!(networks["back"], None);
    }

    #[test]
    fn test_type_mismatch_takes_partial() {
        let base = web("app", Some(vec!["8080:80".into()]));
        let long = PortMapping::Long(PortConfig {
            target: 80,
            protocol: Some("tcp".to_string()),
            ..Default::default()
        });
        let partial = web("app", Some(vec![long.clone()]));
        let merged = merge(&base, &partial, &DefaultStrategy).unwrap();
        assert_eq!(merged.service("web").unwrap().ports, Some(vec![long]));
    }

    #[test]
    fn test_merge_with_empty_partial_is_identity() {
        let base = web("app", Some(vec![80.into()]));
        let merged = merge(&base, &ComposeSpecification::default(), &DefaultStrategy).unwrap();
        assert_eq!(merged, base);
    }

    #[test]
    fn test_field_strategy_prefers_base() {
        let strategy = FieldStrategy::new().with("services.*.image", Disposition::PreferBase);
        let base = web("pinned", None);
        let partial = web("new", Some(vec![80.into()]));
        let merged = merge(&base, &partial, &strategy).unwrap();
        assert_eq!(merged, web("pinned", Some(vec![80.into()])));
    }

    #[test]
    fn test_field_strategy_concatenates() {
        let strategy = FieldStrategy::new().with("services.web.ports", Disposition::Concatenate);
        let base = web("app", Some(vec![1.into(), 2.into()]));
        let partial = web("app", Some(vec![2.into(), 3.into()]));
        let merged = merge(&base, &partial, &strategy).unwrap();
        assert_eq!(
            merged.service("web").unwrap().ports,
            Some(vec![1.into(), 2.into(), 2.into(), 3.into()])
        );
    }

    #[test]
    fn test_field_strategy_prefer_partial_replaces_mapping() {
        let strategy = FieldStrategy::new().with("services.web", Disposition::PreferPartial);
        let base = web("app", Some(vec![80.into()]));
        let partial = web("other", None);
        let merged = merge(&base, &partial, &strategy).unwrap();
        assert_eq!(merged, web("other", None));
    }

    #[test]
    fn test_later_rules_win() {
        let strategy = FieldStrategy::new()
            .with("services.*.image", Disposition::PreferBase)
            .with("services.web.image", Disposition::PreferPartial);
        let merged = merge(&web("base", None), &web("new", None), &strategy).unwrap();
        assert_eq!(merged.service("web").unwrap().image.as_deref(), Some("new"));
    }
}
