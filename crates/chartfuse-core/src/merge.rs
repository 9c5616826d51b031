//! Deep merge of structured values
//!
//! Rules:
//! - Mappings: recursive merge, keys unique to either side are kept
//! - Sequences: overlay replaces base (never appended or interleaved)
//! - Scalars and mismatched shapes: overlay replaces base
//! - An empty mapping overlay leaves the base untouched
//!
//! Merging never fails on shape mismatch. The only failure is an operand
//! that cannot be represented as a [`StructuredValue`] in the first place,
//! which is caught when raw documents are converted (see [`merge_yaml`]).

use thiserror::Error;

use crate::value::{Mapping, StructuredValue};

/// A value could not be represented in the structured model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot merge value at `{path}`: {reason}")]
pub struct MergeError {
    /// Location of the offending node (`$` is the document root)
    pub path: String,
    pub reason: String,
}

impl MergeError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Deep merge `overlay` on top of `base`, returning a new value
///
/// Neither operand is modified.
pub fn merge(base: &StructuredValue, overlay: &StructuredValue) -> StructuredValue {
    match (base, overlay) {
        (_, StructuredValue::Mapping(overlay_map)) if overlay_map.is_empty() => base.clone(),
        (StructuredValue::Mapping(base_map), StructuredValue::Mapping(overlay_map)) => {
            let mut merged = Mapping::with_capacity(base_map.len() + overlay_map.len());
            for (key, base_value) in base_map {
                let value = match overlay_map.get(key) {
                    Some(overlay_value) => merge(base_value, overlay_value),
                    None => base_value.clone(),
                };
                merged.insert(key.clone(), value);
            }
            for (key, overlay_value) in overlay_map {
                if !base_map.contains_key(key) {
                    merged.insert(key.clone(), overlay_value.clone());
                }
            }
            StructuredValue::Mapping(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

/// Fold values left to right, later values winning
pub fn merge_all<'a, I>(values: I) -> StructuredValue
where
    I: IntoIterator<Item = &'a StructuredValue>,
{
    values
        .into_iter()
        .fold(StructuredValue::empty_mapping(), |acc, next| merge(&acc, next))
}

/// Merge two raw YAML values
///
/// Both operands are converted first; a non-representable operand fails with
/// the path of the offending node.
pub fn merge_yaml(
    base: &serde_yaml::Value,
    overlay: &serde_yaml::Value,
) -> Result<StructuredValue, MergeError> {
    let base = StructuredValue::try_from(base.clone())?;
    let overlay = StructuredValue::try_from(overlay.clone())?;
    Ok(merge(&base, &overlay))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> StructuredValue {
        StructuredValue::from_yaml(s).unwrap()
    }

    fn samples() -> Vec<StructuredValue> {
        vec![
            StructuredValue::empty_mapping(),
            StructuredValue::null(),
            StructuredValue::int(7),
            StructuredValue::string("x"),
            yaml("[1, 2, 3]"),
            yaml("a: 1\nb:\n  c: [x, y]\n  d: {e: true}\n"),
            yaml("- {name: a}\n- {name: b}\n"),
        ]
    }

    #[test]
    fn test_deep_merge() {
        let base = yaml(
            r#"
image:
  repository: nginx
  tag: "1.0"
replicas: 1
"#,
        );
        let overlay = yaml(
            r#"
image:
  tag: "2.0"
  pullPolicy: Always
replicas: 3
"#,
        );

        let merged = merge(&base, &overlay);

        assert_eq!(merged.get("image.repository").unwrap().as_str(), Some("nginx"));
        assert_eq!(merged.get("image.tag").unwrap().as_str(), Some("2.0"));
        assert_eq!(merged.get("image.pullPolicy").unwrap().as_str(), Some("Always"));
        assert_eq!(merged.get("replicas").unwrap().as_i64(), Some(3));
    }

    #[test]
    fn test_merge_does_not_touch_operands() {
        let base = yaml("a: {b: 1}");
        let overlay = yaml("a: {c: 2}");
        let before = (base.clone(), overlay.clone());

        let _ = merge(&base, &overlay);

        assert_eq!((base, overlay), before);
    }

    #[test]
    fn test_sequence_replacement() {
        let merged = merge(&yaml(r#"{"list": [1, 2]}"#), &yaml(r#"{"list": [3]}"#));
        assert_eq!(merged, yaml(r#"{"list": [3]}"#));
    }

    #[test]
    fn test_scalar_override() {
        let merged = merge(&yaml(r#"{"a": 1}"#), &yaml(r#"{"a": "x"}"#));
        assert_eq!(merged, yaml(r#"{"a": "x"}"#));
    }

    #[test]
    fn test_shape_mismatch_overlay_wins() {
        let merged = merge(&yaml("a: {b: 1}"), &yaml("a: [1]"));
        assert_eq!(merged, yaml("a: [1]"));

        let merged = merge(&yaml("a: [1]"), &yaml("a: {b: 1}"));
        assert_eq!(merged, yaml("a: {b: 1}"));
    }

    #[test]
    fn test_null_overlay_replaces() {
        let merged = merge(&yaml("a: 1"), &yaml("a: null"));
        assert!(merged.get("a").unwrap().is_null());
    }

    #[test]
    fn test_key_order_base_first_then_overlay() {
        let merged = merge(&yaml("b: 1\na: 1"), &yaml("c: 2\na: 2"));
        let keys: Vec<&String> = merged.as_mapping().unwrap().keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_identity() {
        let empty = StructuredValue::empty_mapping();
        for x in samples() {
            assert_eq!(merge(&x, &empty), x, "merge(x, {{}}) for {:?}", x);
            assert_eq!(merge(&empty, &x), x, "merge({{}}, x) for {:?}", x);
        }
    }

    #[test]
    fn test_idempotence() {
        for x in samples() {
            assert_eq!(merge(&x, &x), x, "merge(x, x) for {:?}", x);
        }
    }

    #[test]
    fn test_later_keys_win_regardless_of_history() {
        let a = yaml("replicas: 1\nimage: {tag: a, repo: r}\nports: [80]\n");
        let b = yaml("replicas: {min: 1}\nimage: {tag: b}\nextra: true\n");
        let c = yaml("replicas: 5\nimage: {tag: c}\nports: [443]\n");

        let result = merge(&merge(&a, &b), &c);

        assert_eq!(result.get("replicas").unwrap().as_i64(), Some(5));
        assert_eq!(result.get("ports").unwrap(), &yaml("[443]"));
        assert_eq!(result.get("image.tag").unwrap().as_str(), Some("c"));
        assert_eq!(result.get("image.repo").unwrap().as_str(), Some("r"));
        assert_eq!(result.get("extra").unwrap(), &StructuredValue::bool(true));
    }

    #[test]
    fn test_deterministic() {
        let a = yaml("x: {y: [1, 2], z: q}\nw: 1\n");
        let b = yaml("x: {y: [3]}\nv: 2\n");
        assert_eq!(merge(&a, &b), merge(&a, &b));
    }

    #[test]
    fn test_merge_all_in_order() {
        let layers = [yaml("replicas: 1"), yaml("replicas: 2"), yaml("replicas: 3")];
        assert_eq!(merge_all(&layers).get("replicas").unwrap().as_i64(), Some(3));
        assert_eq!(merge_all(std::iter::empty()), StructuredValue::empty_mapping());
    }

    #[test]
    fn test_merge_yaml_rejects_tagged_operand() {
        let base: serde_yaml::Value = serde_yaml::from_str("a: 1").unwrap();
        let overlay: serde_yaml::Value = serde_yaml::from_str("a: !ref other").unwrap();

        let err = merge_yaml(&base, &overlay).unwrap_err();
        assert_eq!(err.path, "$.a");
    }

    #[test]
    fn test_merge_yaml_type_mismatch_is_not_an_error() {
        let base: serde_yaml::Value = serde_yaml::from_str("a: [1, 2]").unwrap();
        let overlay: serde_yaml::Value = serde_yaml::from_str("a: {b: 1}").unwrap();

        let merged = merge_yaml(&base, &overlay).unwrap();
        assert_eq!(merged.get("a.b").unwrap().as_i64(), Some(1));
    }
}
