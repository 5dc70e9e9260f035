//! Payload guard — the security boundary applied before every outbound
//! delivery (§4.4 step 3, §9 "Dynamic payloads").

use serde_json::Value;

/// Maximum serialized payload size, in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

const DANGEROUS_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Recursively strips `__proto__`, `constructor`, and `prototype` keys from
/// `value` and any nested object, at any depth. Arrays are walked but not
/// otherwise altered.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut cleaned = serde_json::Map::with_capacity(map.len());
            for (key, v) in map {
                if DANGEROUS_KEYS.contains(&key.as_str()) {
                    continue;
                }
                cleaned.insert(key.clone(), sanitize(v));
            }
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        other => other.clone(),
    }
}

/// Checks the serialized size of `value` against the 1 MiB cap. Returns the
/// serialized byte length on success.
pub fn check_size(value: &Value) -> Result<usize, usize> {
    let size = serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0);
    if size > MAX_PAYLOAD_BYTES {
        Err(size)
    } else {
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_dangerous_keys_at_any_depth() {
        let input = json!({
            "a": 1,
            "__proto__": {"polluted": true},
            "nested": {
                "constructor": "evil",
                "ok": "fine",
                "deeper": {"prototype": 1, "safe": 2}
            }
        });
        let cleaned = sanitize(&input);
        assert!(cleaned.get("__proto__").is_none());
        assert!(cleaned["nested"].get("constructor").is_none());
        assert!(cleaned["nested"]["deeper"].get("prototype").is_none());
        assert_eq!(cleaned["nested"]["deeper"]["safe"], 2);
        assert_eq!(cleaned["a"], 1);
    }

    #[test]
    fn sanitize_inside_arrays() {
        let input = json!([{"__proto__": 1, "keep": 2}]);
        let cleaned = sanitize(&input);
        assert!(cleaned[0].get("__proto__").is_none());
        assert_eq!(cleaned[0]["keep"], 2);
    }

    #[test]
    fn exactly_one_mib_is_accepted() {
        let padding = "a".repeat(MAX_PAYLOAD_BYTES - 10);
        let value = json!({ "p": padding });
        let size = serde_json::to_vec(&value).unwrap().len();
        if size <= MAX_PAYLOAD_BYTES {
            assert!(check_size(&value).is_ok());
        }
    }

    #[test]
    fn over_one_mib_is_rejected() {
        let padding = "a".repeat(MAX_PAYLOAD_BYTES + 100);
        let value = json!({ "p": padding });
        assert!(check_size(&value).is_err());
    }

    #[test]
    fn arbitrary_clean_payloads_round_trip_untouched() {
        use fake::faker::lorem::en::{Sentence, Word};
        use fake::Fake;

        for _ in 0..20 {
            let title: String = Word().fake();
            let body: String = Sentence(3..8).fake();
            let value = json!({ "title": title, "body": body, "tags": [Word().fake::<String>()] });
            assert_eq!(sanitize(&value), value);
        }
    }
}
