//! Canonical JSON encoding for content addressing.
//!
//! Two values that are structurally equal must always serialize to the same
//! bytes, regardless of map insertion order or of which serde_json map
//! backend is compiled in. The encoder therefore walks the value itself:
//! object keys are emitted in lexicographic (codepoint) order, arrays keep
//! their element order, and scalars are delegated to serde_json (compact
//! separators, smallest integer form, shortest round-trip floats).

use serde_json::Value;

use crate::object_id::ObjectId;
use crate::Result;

/// Encode `value` as canonical JSON bytes.
pub fn to_canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_value(&mut out, value)?;
    Ok(out)
}

/// Content address of the canonical encoding of `value`.
pub fn hash_value(value: &Value) -> Result<ObjectId> {
    Ok(ObjectId::for_bytes(&to_canonical_bytes(value)?))
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_value(out, &map[key.as_str()])?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_recursively() {
        let v = json!({"b": {"z": 1, "a": 2}, "a": [3, {"y": 0, "x": 1}]});
        let bytes = to_canonical_bytes(&v).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":[3,{"x":1,"y":0}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn equal_values_hash_equal() {
        let a = json!({"memory": {"step": 1, "cost": 0.05}, "world_state": {}});
        let b = json!({"world_state": {}, "memory": {"cost": 0.05, "step": 1}});
        assert_eq!(hash_value(&a).unwrap(), hash_value(&b).unwrap());
    }

    #[test]
    fn different_values_hash_differently() {
        let a = json!({"memory": {"step": 0}});
        let b = json!({"memory": {"step": 1}});
        assert_ne!(hash_value(&a).unwrap(), hash_value(&b).unwrap());
    }

    #[test]
    fn scalars_are_compact() {
        assert_eq!(to_canonical_bytes(&json!(null)).unwrap(), b"null");
        assert_eq!(to_canonical_bytes(&json!(true)).unwrap(), b"true");
        assert_eq!(to_canonical_bytes(&json!(42)).unwrap(), b"42");
        assert_eq!(to_canonical_bytes(&json!("hi")).unwrap(), b"\"hi\"");
    }

    #[test]
    fn array_order_is_preserved() {
        let v = json!([3, 1, 2]);
        assert_eq!(to_canonical_bytes(&v).unwrap(), b"[3,1,2]");
    }
}
