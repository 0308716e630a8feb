//! Filter argument evaluation.
//!
//! Filter arguments narrow `list`/`find`/`findall` results. Properties
//! declared server-side-filterable by a resource class are attached to
//! the list URI as query parameters; the remainder are evaluated here,
//! with these match semantics:
//!
//! - string property, string match value: the match value is a regular
//!   expression that must match the entire property value
//! - boolean property: equality; string match values `"true"`/`"false"`
//!   (case-insensitive) are converted
//! - numeric property: equality; string match values are converted
//!   lexically
//! - a list of match values matches if any element matches
//! - a resource without a mentioned property does not match (no error)
//!
//! A match value that cannot be converted to the property's type raises
//! [`Error::FilterConversion`].

use serde_json::Value;

use zhmc_core::{Error, PropertyMap, Result};

/// Whether `props` satisfies every filter argument.
pub(crate) fn matches_filters(props: &PropertyMap, filters: &PropertyMap) -> Result<bool> {
    for (property, match_value) in filters {
        match props.get(property) {
            None => return Ok(false),
            Some(actual) => {
                if !matches_value(property, match_value, actual)? {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

fn matches_value(property: &str, match_value: &Value, actual: &Value) -> Result<bool> {
    if let Value::Array(alternatives) = match_value {
        for alternative in alternatives {
            if matches_value(property, alternative, actual)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    match actual {
        Value::String(actual_str) => match match_value {
            Value::String(pattern) => regex_full_match(property, pattern, actual_str),
            other => Ok(actual_str == &scalar_text(other)),
        },
        Value::Bool(actual_bool) => {
            let wanted = match match_value {
                Value::Bool(b) => *b,
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(conversion_error(property, match_value, "boolean"));
                    }
                },
                _ => return Err(conversion_error(property, match_value, "boolean")),
            };
            Ok(wanted == *actual_bool)
        }
        Value::Number(actual_number) => {
            let wanted = match match_value {
                Value::Number(n) => n.clone(),
                Value::String(s) => parse_number(s)
                    .ok_or_else(|| conversion_error(property, match_value, "number"))?,
                _ => return Err(conversion_error(property, match_value, "number")),
            };
            Ok(numbers_equal(&wanted, actual_number))
        }
        other => Ok(match_value == other),
    }
}

fn regex_full_match(property: &str, pattern: &str, value: &str) -> Result<bool> {
    let anchored = format!("^(?:{pattern})$");
    let regex = regex::Regex::new(&anchored).map_err(|_| Error::FilterConversion {
        property: property.to_string(),
        value: Value::String(pattern.to_string()),
        target: "regular expression",
    })?;
    Ok(regex.is_match(value))
}

fn parse_number(s: &str) -> Option<serde_json::Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(serde_json::Number::from(i));
    }
    s.parse::<f64>().ok().and_then(serde_json::Number::from_f64)
}

fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn conversion_error(property: &str, value: &Value, target: &'static str) -> Error {
    Error::FilterConversion {
        property: property.to_string(),
        value: value.clone(),
        target,
    }
}

/// Textual form of a scalar match value, without JSON quoting.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Split filter arguments into the server-filterable pairs (in query
/// parameter form, one pair per list element) and the client-side rest.
pub(crate) fn split_filters(
    filters: &PropertyMap,
    server_props: &[&str],
) -> (Vec<(String, String)>, PropertyMap) {
    let mut server = Vec::new();
    let mut client = PropertyMap::new();
    for (property, value) in filters {
        if server_props.contains(&property.as_str()) {
            match value {
                Value::Array(alternatives) => {
                    for alternative in alternatives {
                        server.push((property.clone(), scalar_text(alternative)));
                    }
                }
                other => server.push((property.clone(), scalar_text(other))),
            }
        } else {
            client.insert(property.clone(), value.clone());
        }
    }
    (server, client)
}

/// Render filter arguments for error messages.
pub(crate) fn render_filters(filters: &PropertyMap) -> String {
    serde_json::to_string(filters).unwrap_or_else(|_| "<filters>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> PropertyMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn string_match_is_a_regex_over_the_whole_value() {
        let p = props(json!({"name": "PART1"}));
        assert!(matches_filters(&p, &props(json!({"name": "PART1"}))).unwrap());
        assert!(matches_filters(&p, &props(json!({"name": "PART.*"}))).unwrap());
        // Not a substring match.
        assert!(!matches_filters(&p, &props(json!({"name": "PART"}))).unwrap());
        assert!(!matches_filters(&p, &props(json!({"name": "ART1"}))).unwrap());
    }

    #[test]
    fn match_list_means_any() {
        let p = props(json!({"state": "stand-by"}));
        let f = props(json!({"state": ["stand-by", "reserved"]}));
        assert!(matches_filters(&p, &f).unwrap());
        let f = props(json!({"state": ["active", "reserved"]}));
        assert!(!matches_filters(&p, &f).unwrap());
    }

    #[test]
    fn absent_property_does_not_match() {
        let p = props(json!({"name": "A"}));
        assert!(!matches_filters(&p, &props(json!({"status": "active"}))).unwrap());
    }

    #[test]
    fn boolean_accepts_case_insensitive_strings() {
        let p = props(json!({"dpm-enabled": true}));
        assert!(matches_filters(&p, &props(json!({"dpm-enabled": true}))).unwrap());
        assert!(matches_filters(&p, &props(json!({"dpm-enabled": "TRUE"}))).unwrap());
        assert!(!matches_filters(&p, &props(json!({"dpm-enabled": "false"}))).unwrap());
        let err = matches_filters(&p, &props(json!({"dpm-enabled": "yes"}))).unwrap_err();
        assert!(matches!(err, Error::FilterConversion { target: "boolean", .. }));
    }

    #[test]
    fn numbers_accept_lexical_strings() {
        let p = props(json!({"ifl-count": 4}));
        assert!(matches_filters(&p, &props(json!({"ifl-count": 4}))).unwrap());
        assert!(matches_filters(&p, &props(json!({"ifl-count": "4"}))).unwrap());
        assert!(!matches_filters(&p, &props(json!({"ifl-count": "5"}))).unwrap());
        let err = matches_filters(&p, &props(json!({"ifl-count": "four"}))).unwrap_err();
        assert!(matches!(err, Error::FilterConversion { target: "number", .. }));
    }

    #[test]
    fn invalid_regex_is_a_conversion_error() {
        let p = props(json!({"name": "A"}));
        let err = matches_filters(&p, &props(json!({"name": "("}))).unwrap_err();
        assert!(matches!(
            err,
            Error::FilterConversion {
                target: "regular expression",
                ..
            }
        ));
    }

    #[test]
    fn split_separates_server_and_client_properties() {
        let filters = props(json!({
            "name": "P.*",
            "status": ["active", "degraded"],
            "description": "x",
        }));
        let (server, client) = split_filters(&filters, &["name", "status"]);
        assert_eq!(
            server,
            vec![
                ("name".to_string(), "P.*".to_string()),
                ("status".to_string(), "active".to_string()),
                ("status".to_string(), "degraded".to_string()),
            ]
        );
        assert_eq!(client.len(), 1);
        assert!(client.contains_key("description"));
    }
}
