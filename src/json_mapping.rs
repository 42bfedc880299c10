//! Declarative, reversible rewrites of JSON configuration blobs.
//!
//! A [`FieldMapping`] is a list of rules. Applying it [`Direction::Forward`]
//! migrates a document; applying it [`Direction::Reverse`] walks the same rules
//! backwards, so both directions always agree on the key lists.
//!
//! Paths are `/`-separated keys into nested objects, e.g. `resourceConfig/memory`.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// How a moved value changes shape on its way forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Same,
    /// A scalar becomes a one element list; reversing keeps the first element.
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    Move {
        from: String,
        to: String,
        shape: Shape,
        /// Written when the source is missing, in either direction.
        default: Option<Value>,
    },
    /// Set on the way forward, removed on the way back.
    Constant { at: String, value: Value },
}

impl FieldRule {
    pub fn moved(from: &str, to: &str) -> Self {
        FieldRule::Move {
            from: from.to_string(),
            to: to.to_string(),
            shape: Shape::Same,
            default: None,
        }
    }

    pub fn constant(at: &str, value: impl Into<Value>) -> Self {
        FieldRule::Constant {
            at: at.to_string(),
            value: value.into(),
        }
    }

    pub fn with_default(self, value: impl Into<Value>) -> Self {
        match self {
            FieldRule::Move { from, to, shape, .. } => FieldRule::Move {
                from,
                to,
                shape,
                default: Some(value.into()),
            },
            other => other,
        }
    }

    pub fn as_list(self) -> Self {
        match self {
            FieldRule::Move {
                from, to, default, ..
            } => FieldRule::Move {
                from,
                to,
                shape: Shape::List,
                default,
            },
            other => other,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum MappingError {
    #[error("document is not a JSON object")]
    NotAnObject,
    #[error("path {0} crosses a non-object value")]
    BlockedPath(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    rules: Vec<FieldRule>,
}

impl FieldMapping {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    /// Rewrites `doc` in place.
    ///
    /// # Returns
    /// * `Result<bool, MappingError>` - Whether the document changed.
    pub fn apply(&self, doc: &mut Value, direction: Direction) -> Result<bool, MappingError> {
        let root = doc.as_object_mut().ok_or(MappingError::NotAnObject)?;
        let before = root.clone();
        match direction {
            Direction::Forward => {
                for rule in &self.rules {
                    forward(root, rule)?;
                }
            }
            Direction::Reverse => {
                for rule in self.rules.iter().rev() {
                    reverse(root, rule)?;
                }
            }
        }
        Ok(*root != before)
    }

}

/// A rewrite of one JSON document that runs in both directions.
pub trait JsonRewrite {
    /// Rewrites `doc` in place and reports whether it changed.
    fn rewrite(&self, doc: &mut Value, direction: Direction) -> anyhow::Result<bool>;

    /// Parses, rewrites and serializes a JSON string.
    ///
    /// # Returns
    /// * `Result<Option<String>>` - The new text, or `None` when nothing changed.
    fn rewrite_str(&self, text: &str, direction: Direction) -> anyhow::Result<Option<String>> {
        let mut doc: Value = serde_json::from_str(text)?;
        if self.rewrite(&mut doc, direction)? {
            Ok(Some(serde_json::to_string(&doc)?))
        } else {
            Ok(None)
        }
    }
}

impl JsonRewrite for FieldMapping {
    fn rewrite(&self, doc: &mut Value, direction: Direction) -> anyhow::Result<bool> {
        Ok(self.apply(doc, direction)?)
    }
}

fn forward(root: &mut Map<String, Value>, rule: &FieldRule) -> Result<(), MappingError> {
    match rule {
        FieldRule::Move {
            from,
            to,
            shape,
            default,
        } => match take(root, from) {
            Some(v) => {
                let v = match (shape, v) {
                    (Shape::List, Value::Array(items)) => Value::Array(items),
                    (Shape::List, scalar) => Value::Array(vec![scalar]),
                    (Shape::Same, v) => v,
                };
                put(root, to, v)
            }
            // a present target means the document was already migrated
            None if get(root, to).is_some() => Ok(()),
            None => match default {
                Some(d) => put(root, to, d.clone()),
                None => Ok(()),
            },
        },
        FieldRule::Constant { at, value } => put(root, at, value.clone()),
    }
}

fn reverse(root: &mut Map<String, Value>, rule: &FieldRule) -> Result<(), MappingError> {
    match rule {
        FieldRule::Move {
            from,
            to,
            shape,
            default,
        } => {
            let taken = take(root, to);
            prune(root, to);
            let restored = match (shape, taken) {
                (Shape::List, Some(Value::Array(items))) => items.into_iter().next(),
                (_, v) => v,
            };
            match restored {
                Some(v) => put(root, from, v),
                None if get(root, from).is_some() => Ok(()),
                None => match default {
                    Some(d) => put(root, from, d.clone()),
                    None => Ok(()),
                },
            }
        }
        FieldRule::Constant { at, .. } => {
            take(root, at);
            prune(root, at);
            Ok(())
        }
    }
}

fn split(path: &str) -> (Vec<&str>, &str) {
    let mut parts: Vec<&str> = path.split('/').collect();
    let last = parts.pop().unwrap_or(path);
    (parts, last)
}

fn get<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let (parents, last) = split(path);
    let mut cur = root;
    for p in parents {
        cur = cur.get(p)?.as_object()?;
    }
    cur.get(last)
}

fn take(root: &mut Map<String, Value>, path: &str) -> Option<Value> {
    let (parents, last) = split(path);
    let mut cur = root;
    for p in parents {
        cur = cur.get_mut(p)?.as_object_mut()?;
    }
    cur.remove(last)
}

fn put(root: &mut Map<String, Value>, path: &str, value: Value) -> Result<(), MappingError> {
    let (parents, last) = split(path);
    let mut cur = root;
    for p in parents {
        let entry = cur
            .entry(p.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        cur = entry
            .as_object_mut()
            .ok_or_else(|| MappingError::BlockedPath(path.to_string()))?;
    }
    cur.insert(last.to_string(), value);
    Ok(())
}

/// Removes objects along `path` that were left empty, deepest first.
fn prune(root: &mut Map<String, Value>, path: &str) {
    let (parents, _) = split(path);
    for depth in (1..=parents.len()).rev() {
        let prefix = parents[..depth].join("/");
        if matches!(get(root, &prefix), Some(Value::Object(m)) if m.is_empty()) {
            take(root, &prefix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn jupyter_resources() -> FieldMapping {
        FieldMapping::new(vec![
            FieldRule::constant("resourceConfig/type", "dockerResourcesConfiguration"),
            FieldRule::moved("memory", "resourceConfig/memory").with_default(1024),
            FieldRule::moved("cores", "resourceConfig/cores").with_default(1),
            FieldRule::moved("gpus", "resourceConfig/gpus").with_default(0),
        ])
    }

    #[test]
    fn test_nested_move_with_defaults() {
        let mapping = jupyter_resources();
        let mut doc = json!({"imagePath": "img:1", "memory": 2048});

        assert!(mapping.apply(&mut doc, Direction::Forward).unwrap());
        assert_eq!(
            doc,
            json!({
                "imagePath": "img:1",
                "resourceConfig": {
                    "type": "dockerResourcesConfiguration",
                    "memory": 2048,
                    "cores": 1,
                    "gpus": 0
                }
            })
        );

        // running again must not clobber migrated values with defaults
        assert!(!mapping.apply(&mut doc, Direction::Forward).unwrap());

        assert!(mapping.apply(&mut doc, Direction::Reverse).unwrap());
        assert_eq!(
            doc,
            json!({"imagePath": "img:1", "memory": 2048, "cores": 1, "gpus": 0})
        );
    }

    #[test]
    fn test_reverse_applies_defaults_when_missing() {
        let mapping = jupyter_resources();
        let mut doc = json!({"imagePath": "img:1"});
        mapping.apply(&mut doc, Direction::Reverse).unwrap();
        assert_eq!(
            doc,
            json!({"imagePath": "img:1", "memory": 1024, "cores": 1, "gpus": 0})
        );
    }

    #[test]
    fn test_list_shape() {
        let mapping = FieldMapping::new(vec![
            FieldRule::moved("args", "defaultArgs"),
            FieldRule::moved("command", "command").as_list(),
        ]);
        let mut doc = json!({"args": "-v", "command": "python run.py"});

        mapping.apply(&mut doc, Direction::Forward).unwrap();
        assert_eq!(doc, json!({"defaultArgs": "-v", "command": ["python run.py"]}));
        assert!(!mapping.apply(&mut doc, Direction::Forward).unwrap());

        mapping.apply(&mut doc, Direction::Reverse).unwrap();
        assert_eq!(doc, json!({"args": "-v", "command": "python run.py"}));
    }

    #[test]
    fn test_constant_overwrites_and_reverts() {
        let mapping = FieldMapping::new(vec![FieldRule::constant("NUM_GPUS", "0")]);
        let mut doc = json!({"type": "sparkJobConfiguration", "NUM_GPUS": "2"});
        mapping.apply(&mut doc, Direction::Forward).unwrap();
        assert_eq!(doc["NUM_GPUS"], json!("0"));
        mapping.apply(&mut doc, Direction::Reverse).unwrap();
        assert_eq!(doc, json!({"type": "sparkJobConfiguration"}));
    }

    #[test]
    fn test_errors() {
        let mapping = jupyter_resources();
        let mut not_object = json!([1, 2]);
        assert_eq!(
            mapping.apply(&mut not_object, Direction::Forward),
            Err(MappingError::NotAnObject)
        );
        let mut blocked = json!({"resourceConfig": 5});
        assert_eq!(
            mapping.apply(&mut blocked, Direction::Forward),
            Err(MappingError::BlockedPath("resourceConfig/type".to_string()))
        );
    }

    #[test]
    fn test_rewrite_str_reports_unchanged() {
        let mapping = FieldMapping::new(vec![FieldRule::moved("args", "defaultArgs")]);
        assert_eq!(mapping.rewrite_str("{}", Direction::Forward).unwrap(), None);
        assert_eq!(
            mapping
                .rewrite_str(r#"{"args":"x"}"#, Direction::Forward)
                .unwrap(),
            Some(r#"{"defaultArgs":"x"}"#.to_string())
        );
    }
}
