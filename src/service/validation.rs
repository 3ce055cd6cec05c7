//! Per-field validation from catalog rules.

use crate::config::FieldSpec;
use serde_json::Value;

/// Messages for every rule `v` breaks; empty when valid. Null passes (required-ness
/// is checked by the loader).
pub fn validate_field(field: &FieldSpec, v: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    if v.is_null() {
        return errors;
    }
    let rule = &field.validation;
    if let Some(format) = &rule.format {
        if let Some(msg) = validate_format(v, format) {
            errors.push(msg);
        }
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                errors.push(format!("must be at most {} characters", max));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                errors.push(format!("must be at least {} characters", min));
            }
        }
        if let Some(re) = &field.pattern {
            if !re.is_match(s) {
                errors.push("does not match required pattern".to_string());
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            errors.push(format!(
                "must be one of: {:?}",
                allowed.iter().take(5).collect::<Vec<_>>()
            ));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                errors.push(format!("must be at least {}", min));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                errors.push(format!("must be at most {}", max));
            }
        }
    }
    errors
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(v: &Value, format: &str) -> Option<String> {
    let s = v.as_str()?;
    match format.to_lowercase().as_str() {
        "email" => {
            let valid = match s.split_once('@') {
                Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
                None => false,
            };
            (!valid).then(|| "must be a valid email".to_string())
        }
        "uuid" => uuid::Uuid::parse_str(s)
            .is_err()
            .then(|| "must be a valid UUID".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin_catalog;
    use serde_json::json;

    #[test]
    fn email_and_length_rules() {
        let catalog = builtin_catalog().unwrap();
        let user = catalog.get("user").unwrap();
        let email = user.field("email").unwrap();
        assert!(validate_field(email, &json!("a@b.org")).is_empty());
        assert_eq!(validate_field(email, &json!("nobody")), vec!["must be a valid email"]);

        let password = user.field("password").unwrap();
        assert_eq!(validate_field(password, &json!("123")), vec!["must be at least 6 characters"]);
    }

    #[test]
    fn pattern_is_checked_and_null_passes() {
        let catalog = builtin_catalog().unwrap();
        let username = catalog.get("user").unwrap().field("username").unwrap();
        assert_eq!(validate_field(username, &json!("has space")), vec!["does not match required pattern"]);
        assert!(validate_field(username, &Value::Null).is_empty());
    }
}
