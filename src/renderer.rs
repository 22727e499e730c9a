use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::DeliveryError;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("valid placeholder pattern"));

/// Distinct variable names referenced by a template, in order of appearance.
pub fn extract_variables(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for capture in PLACEHOLDER.captures_iter(template) {
        let name = &capture[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    names
}

/// Substitutes every `{{name}}` token with the variable's textual form.
///
/// Either all referenced names resolve or rendering fails; the output never
/// contains an unresolved token.
pub fn render(
    template: &str,
    variables: &HashMap<String, serde_json::Value>,
) -> Result<String, DeliveryError> {
    let mut missing: Vec<String> = Vec::new();

    for name in extract_variables(template) {
        match variables.get(&name) {
            None => missing.push(name),
            Some(value) => {
                if !value.is_string() && !value.is_number() && !value.is_boolean() && !value.is_null()
                {
                    return Err(DeliveryError::UnsupportedVariable(name));
                }
            }
        }
    }

    if !missing.is_empty() {
        return Err(DeliveryError::MissingVariables(missing));
    }

    let rendered = PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
        // Validated above, so every referenced name is present and scalar.
        match &variables[&caps[1]] {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            _ => String::new(),
        }
    });

    Ok(rendered.into_owned())
}
