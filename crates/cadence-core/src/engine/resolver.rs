//! Variable resolution for step input mappings and prompt templates.
//!
//! Mapping expressions are either JSON literals (passed through untouched)
//! or `${path.to.value}` strings resolved against the layered context: the
//! accumulated execution context first, then the simulation seed data with
//! the same full path.

use regex::Regex;
use serde_json::Value;

/// Resolve one mapping expression.
///
/// - Non-string expressions pass through unchanged.
/// - Strings not wholly wrapped in `${…}` are literals.
/// - Otherwise the inner path is walked through `context`; if any segment is
///   missing the walk restarts from `fallback` using the same original path.
///   `None` when both miss.
///
/// Pure function of its three inputs; no caching, no side effects.
pub fn resolve(expr: &Value, context: &Value, fallback: &Value) -> Option<Value> {
    let Some(s) = expr.as_str() else {
        return Some(expr.clone());
    };

    let wrapped = Regex::new(r"^\$\{([^}]+)\}$").unwrap();
    let Some(caps) = wrapped.captures(s) else {
        return Some(Value::String(s.to_string()));
    };

    let path = normalize_path(&caps[1]);
    resolve_path(context, &path).or_else(|| resolve_path(fallback, &path))
}

/// Normalize bracket indices: `a[0].b` → `a.0.b`.
pub fn normalize_path(path: &str) -> String {
    let brackets = Regex::new(r"\[(\d+)\]").unwrap();
    brackets.replace_all(path, ".$1").to_string()
}

/// Walk a dotted path through a JSON value. Numeric segments index arrays.
pub fn resolve_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current.clone())
}

/// Interpolate every `${path}` token in a template, leaving tokens neither
/// layer can resolve literally in place so template bugs stay visible.
pub fn interpolate(template: &str, context: &Value, fallback: &Value) -> String {
    let token = Regex::new(r"\$\{([^}]+)\}").unwrap();
    token
        .replace_all(template, |caps: &regex::Captures| {
            let path = normalize_path(&caps[1]);
            match resolve_path(context, &path).or_else(|| resolve_path(fallback, &path)) {
                Some(Value::String(s)) => s,
                Some(value) => value.to_string(),
                None => format!("${{{}}}", &caps[1]),
            }
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_string_passthrough() {
        let ctx = json!({});
        assert_eq!(
            resolve(&json!(42), &ctx, &ctx),
            Some(json!(42))
        );
        assert_eq!(
            resolve(&json!({"nested": true}), &ctx, &ctx),
            Some(json!({"nested": true}))
        );
    }

    #[test]
    fn test_plain_string_is_literal() {
        let ctx = json!({"a": 1});
        assert_eq!(
            resolve(&json!("hello"), &ctx, &ctx),
            Some(json!("hello"))
        );
        // Partially-wrapped strings are literals too
        assert_eq!(
            resolve(&json!("prefix ${a}"), &ctx, &ctx),
            Some(json!("prefix ${a}"))
        );
        assert_eq!(
            resolve(&json!("${a} and ${b}"), &ctx, &ctx),
            Some(json!("${a} and ${b}"))
        );
    }

    #[test]
    fn test_context_path_walk() {
        let ctx = json!({"outputs": {"lead": {"email": "ada@acme.io"}}});
        assert_eq!(
            resolve(&json!("${outputs.lead.email}"), &ctx, &json!({})),
            Some(json!("ada@acme.io"))
        );
    }

    #[test]
    fn test_array_index_normalization() {
        let ctx = json!({"contacts": [{"name": "Ada"}, {"name": "Grace"}]});
        assert_eq!(
            resolve(&json!("${contacts[1].name}"), &ctx, &json!({})),
            Some(json!("Grace"))
        );
        assert_eq!(normalize_path("a[0].b[12].c"), "a.0.b.12.c");
    }

    #[test]
    fn test_fallback_uses_full_path_not_continuation() {
        // Context has `lead` but not `lead.score`; fallback must be walked
        // from the root with the same path, not from where context failed.
        let ctx = json!({"lead": {"email": "x@y.z"}});
        let fallback = json!({"lead": {"score": 87}});
        assert_eq!(
            resolve(&json!("${lead.score}"), &ctx, &fallback),
            Some(json!(87))
        );

        // Equivalent to resolving directly against the fallback
        assert_eq!(
            resolve(&json!("${lead.score}"), &ctx, &fallback),
            resolve(&json!("${lead.score}"), &fallback, &json!({}))
        );
    }

    #[test]
    fn test_missing_in_both_layers() {
        let ctx = json!({"a": 1});
        assert_eq!(resolve(&json!("${b.c}"), &ctx, &json!({"b": {}})), None);
    }

    #[test]
    fn test_interpolate_leaves_unresolved_tokens() {
        let ctx = json!({"outputs": {"lead": {"email": "ada@acme.io", "score": 87}}});
        let rendered = interpolate(
            "Approve email to ${outputs.lead.email} (score ${outputs.lead.score}, owner ${outputs.owner.name})?",
            &ctx,
            &json!({}),
        );
        assert_eq!(
            rendered,
            "Approve email to ada@acme.io (score 87, owner ${outputs.owner.name})?"
        );
    }
}
