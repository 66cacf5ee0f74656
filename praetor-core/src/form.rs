//! URL-encoded form and query-string parsing into the parameter bag.
//!
//! Keys follow the bracket convention used by HTML forms: `tags[]=a&tags[]=b`
//! builds a list, `user[name]=x` builds a nested map, and the two compose
//! (`rows[0][id]=1`). A repeated plain key keeps the last value.

use crate::logging::warn;
use serde_json::{Map, Value};

/// Parameter bag: ordered key to JSON value map
pub type Parameters = Map<String, Value>;

/// Parse a query string (without the leading `?`)
pub fn parse_query(query: &str) -> Parameters {
    parse_form(query.as_bytes())
}

/// Parse an `application/x-www-form-urlencoded` body
pub fn parse_form(body: &[u8]) -> Parameters {
    let pairs: Vec<(String, String)> = match serde_urlencoded::from_bytes(body) {
        Ok(pairs) => pairs,
        Err(e) => {
            warn!(error = %e, "Discarding undecodable form data");
            return Parameters::new();
        }
    };

    let mut params = Parameters::new();
    for (key, value) in pairs {
        insert_bracketed(&mut params, &key, Value::String(value));
    }
    params
}

/// Insert `value` under a possibly bracketed `key`
pub fn insert_bracketed(params: &mut Parameters, key: &str, value: Value) {
    let (base, path) = split_key(key);
    if base.is_empty() {
        return;
    }

    if path.is_empty() {
        params.insert(base.to_string(), value);
        return;
    }

    let slot = params.entry(base.to_string()).or_insert(Value::Null);
    insert_path(slot, &path, value);
}

/// `a[b][]` -> ("a", ["b", ""]). Malformed brackets make the whole key literal.
fn split_key(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };

    let base = &key[..open];
    let mut path = Vec::new();
    let mut rest = &key[open..];

    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return (key, Vec::new());
        };
        path.push(&stripped[..close]);
        rest = &stripped[close + 1..];
    }

    if !rest.is_empty() {
        return (key, Vec::new());
    }

    (base, path)
}

fn insert_path(slot: &mut Value, path: &[&str], value: Value) {
    let Some((segment, rest)) = path.split_first() else {
        *slot = value;
        return;
    };

    if segment.is_empty() {
        if let Value::Object(map) = slot {
            let next = map.len().to_string();
            let child = map.entry(next).or_insert(Value::Null);
            insert_path(child, rest, value);
            return;
        }
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            items.push(Value::Null);
            if let Some(child) = items.last_mut() {
                insert_path(child, rest, value);
            }
        }
        return;
    }

    // Named segment: lists are promoted to maps keyed by their indices.
    let map = match slot {
        Value::Object(map) => map,
        other => {
            let promoted = match other.take() {
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v))
                    .collect(),
                _ => Map::new(),
            };
            *other = Value::Object(promoted);
            match other {
                Value::Object(map) => map,
                _ => return,
            }
        }
    };

    let child = map.entry(segment.to_string()).or_insert(Value::Null);
    insert_path(child, rest, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_form_plain() {
        let params = parse_form(b"name=John+Doe&email=john%40example.com&age=30");

        assert_eq!(params["name"], "John Doe");
        assert_eq!(params["email"], "john@example.com");
        assert_eq!(params["age"], "30");
    }

    #[test]
    fn test_parse_query_keeps_order_and_last_duplicate() {
        let params = parse_query("b=1&a=2&b=3");
        let keys: Vec<_> = params.keys().cloned().collect();

        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(params["b"], "3");
    }

    #[test]
    fn test_bracketed_lists_and_maps() {
        let params = parse_query("tags[]=rust&tags[]=web&user[name]=ana&user[roles][]=admin");

        assert_eq!(params["tags"], json!(["rust", "web"]));
        assert_eq!(params["user"], json!({"name": "ana", "roles": ["admin"]}));
    }

    #[test]
    fn test_indexed_rows() {
        let params = parse_query("rows[0][id]=1&rows[1][id]=2");
        assert_eq!(params["rows"], json!({"0": {"id": "1"}, "1": {"id": "2"}}));
    }

    #[test]
    fn test_malformed_brackets_are_literal() {
        let params = parse_query("a[b=1&c]d[=2");
        assert_eq!(params["a[b"], "1");
        assert_eq!(params["c]d["], "2");
    }

    #[test]
    fn test_empty_keys_skipped() {
        let params = parse_query("=orphan&[x]=y&ok=1");
        assert_eq!(params.len(), 1);
        assert_eq!(params["ok"], "1");
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_query("").is_empty());
    }
}
