//! TreeBuilder - nested JSON to state-tree flattening
//!
//! ## Responsibilities
//!
//! - Normalize shape-driven API records into a tagged value tree
//! - Flatten records into dot-path nodes, containers before children,
//!   depth-first
//! - Mark writable paths via an injected pattern list, never hard-coded
//!
//! Arrays are collapsed to a single comma-joined string scalar before
//! emission, never split into one update per element.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::collections::HashSet;

use crate::value_store::{ObjectMeta, StateValue};

/// Tagged value tree produced by the normalization pass
#[derive(Debug, Clone, PartialEq)]
pub enum TreeValue {
    Scalar(StateValue),
    Container(Vec<(String, TreeValue)>),
}

/// Normalize a raw JSON value into the tagged tree
///
/// Arrays become one joined string ("1,2,3"); array elements that are
/// themselves composite are rendered as compact JSON. Object key order
/// follows serde_json's map ordering, which keeps emission
/// deterministic across polls.
pub fn normalize(value: &Value) -> TreeValue {
    match value {
        Value::Null => TreeValue::Scalar(StateValue::Null),
        Value::Bool(b) => TreeValue::Scalar(StateValue::Bool(*b)),
        Value::Number(n) => TreeValue::Scalar(number_to_scalar(n)),
        Value::String(s) => TreeValue::Scalar(StateValue::Str(s.clone())),
        Value::Array(items) => {
            let joined = items
                .iter()
                .map(render_array_element)
                .collect::<Vec<_>>()
                .join(",");
            TreeValue::Scalar(StateValue::Str(joined))
        }
        Value::Object(map) => TreeValue::Container(
            map.iter()
                .map(|(key, child)| (key.clone(), normalize(child)))
                .collect(),
        ),
    }
}

fn number_to_scalar(n: &serde_json::Number) -> StateValue {
    if let Some(i) = n.as_i64() {
        StateValue::Int(i)
    } else {
        StateValue::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn render_array_element(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Injected writability predicate
///
/// Patterns are matched as substrings of the full state path, mirroring
/// the source adapter's settable-key list.
#[derive(Debug, Clone)]
pub struct WritablePaths {
    patterns: Vec<String>,
}

impl WritablePaths {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| path.contains(p.as_str()))
    }
}

impl Default for WritablePaths {
    fn default() -> Self {
        Self::new(
            [
                "name",
                "ledSettings.isEnabled",
                "osdSettings.isNameEnabled",
                "osdSettings.isDebugEnabled",
                "osdSettings.isLogoEnabled",
                "osdSettings.isDateEnabled",
                "recordingSettings.mode",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        )
    }
}

/// One node of a flattened record, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    /// Grouping container, emitted before its children
    Channel { path: String, name: String },
    /// Primitive leaf
    State {
        path: String,
        meta: ObjectMeta,
        value: StateValue,
    },
}

/// Flattens API records into ordered tree nodes
pub struct TreeBuilder {
    writable: WritablePaths,
}

impl TreeBuilder {
    pub fn new(writable: WritablePaths) -> Self {
        Self { writable }
    }

    /// Flatten one record under `prefix`, emitting the record's own
    /// channel first
    ///
    /// `filter` restricts which relative leaf paths (beneath `prefix`)
    /// are exposed; an empty or absent filter exposes everything.
    /// Channels are always emitted so the namespace stays navigable.
    pub fn record_nodes(
        &self,
        prefix: &str,
        display_name: &str,
        record: &Map<String, Value>,
        filter: Option<&HashSet<String>>,
    ) -> Vec<TreeNode> {
        let mut nodes = vec![TreeNode::Channel {
            path: prefix.to_string(),
            name: display_name.to_string(),
        }];

        for (key, value) in record {
            let path = format!("{}.{}", prefix, key);
            self.emit(&path, key, key, &normalize(value), filter, &mut nodes);
        }

        nodes
    }

    fn emit(
        &self,
        path: &str,
        rel_path: &str,
        desc: &str,
        value: &TreeValue,
        filter: Option<&HashSet<String>>,
        out: &mut Vec<TreeNode>,
    ) {
        match value {
            TreeValue::Container(children) => {
                out.push(TreeNode::Channel {
                    path: path.to_string(),
                    name: desc.to_string(),
                });
                for (key, child) in children {
                    let child_path = format!("{}.{}", path, key);
                    let child_rel = format!("{}.{}", rel_path, key);
                    self.emit(&child_path, &child_rel, key, child, filter, out);
                }
            }
            TreeValue::Scalar(scalar) => {
                if let Some(selected) = filter {
                    if !selected.is_empty() && !selected.contains(rel_path) {
                        return;
                    }
                }
                out.push(TreeNode::State {
                    path: path.to_string(),
                    meta: self.state_meta(path, desc),
                    value: scalar.clone(),
                });
            }
        }
    }

    fn state_meta(&self, path: &str, desc: &str) -> ObjectMeta {
        // Recording mode is an enumerated setting in the NVR API
        let allowed = if path.contains("recordingSettings.mode") {
            Some(BTreeMap::from(
                ["always", "never", "motion"].map(|m| (m.to_string(), m.to_string())),
            ))
        } else {
            None
        };

        ObjectMeta {
            name: desc.to_string(),
            write: self.writable.matches(path),
            allowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> TreeBuilder {
        TreeBuilder::new(WritablePaths::default())
    }

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn arrays_collapse_to_one_joined_scalar() {
        let nodes = builder().record_nodes(
            "motions.c1.m1",
            "m1",
            &record(json!({"id": "m1", "score": [1, 2, 3]})),
            None,
        );

        let score: Vec<_> = nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::State { path, .. } if path.ends_with(".score")))
            .collect();
        assert_eq!(score.len(), 1);
        match score[0] {
            TreeNode::State { value, .. } => {
                assert_eq!(*value, StateValue::Str("1,2,3".to_string()))
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn containers_are_emitted_before_their_children() {
        let nodes = builder().record_nodes(
            "cameras.c1",
            "Front",
            &record(json!({"ledSettings": {"isEnabled": true}})),
            None,
        );

        let paths: Vec<&str> = nodes
            .iter()
            .map(|n| match n {
                TreeNode::Channel { path, .. } | TreeNode::State { path, .. } => path.as_str(),
            })
            .collect();
        assert_eq!(
            paths,
            vec![
                "cameras.c1",
                "cameras.c1.ledSettings",
                "cameras.c1.ledSettings.isEnabled"
            ]
        );
    }

    #[test]
    fn writable_patterns_mark_leaves() {
        let nodes = builder().record_nodes(
            "cameras.c1",
            "Front",
            &record(json!({"name": "Front", "type": "UVC G3"})),
            None,
        );

        for node in nodes {
            if let TreeNode::State { path, meta, .. } = node {
                if path.ends_with(".name") {
                    assert!(meta.write);
                } else {
                    assert!(!meta.write);
                }
            }
        }
    }

    #[test]
    fn recording_mode_carries_allowed_values() {
        let nodes = builder().record_nodes(
            "cameras.c1",
            "Front",
            &record(json!({"recordingSettings": {"mode": "motion"}})),
            None,
        );

        let mode = nodes
            .iter()
            .find_map(|n| match n {
                TreeNode::State { path, meta, .. } if path.ends_with(".mode") => Some(meta),
                _ => None,
            })
            .unwrap();
        assert!(mode.write);
        let allowed = mode.allowed.as_ref().unwrap();
        assert_eq!(allowed.len(), 3);
        assert!(allowed.contains_key("motion"));
    }

    #[test]
    fn filter_restricts_exposed_leaves_but_keeps_channels() {
        let filter: HashSet<String> =
            ["name".to_string(), "ledSettings.isEnabled".to_string()].into();
        let nodes = builder().record_nodes(
            "cameras.c1",
            "Front",
            &record(json!({
                "name": "Front",
                "type": "UVC G3",
                "ledSettings": {"isEnabled": true, "blinkRate": 0}
            })),
            Some(&filter),
        );

        let states: Vec<&str> = nodes
            .iter()
            .filter_map(|n| match n {
                TreeNode::State { path, .. } => Some(path.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec!["cameras.c1.ledSettings.isEnabled", "cameras.c1.name"]);
    }

    #[test]
    fn null_leaves_survive_normalization() {
        let normalized = normalize(&json!({"lastMotion": null}));
        match normalized {
            TreeValue::Container(children) => {
                assert_eq!(children[0].1, TreeValue::Scalar(StateValue::Null));
            }
            _ => unreachable!(),
        }
    }
}
