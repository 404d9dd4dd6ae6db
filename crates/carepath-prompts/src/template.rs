use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::error::{PromptError, Result};

fn placeholder_pattern() -> Regex {
    Regex::new(r"\{\{(\w+)\}\}").expect("static placeholder regex")
}

/// A named template with `{{placeholder}}` tokens, validated once at load
/// time so a typo in a template file fails startup, not a live request.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    raw: String,
    placeholders: HashSet<String>,
}

impl Template {
    pub fn parse(name: impl Into<String>, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let placeholders = placeholder_pattern()
            .captures_iter(&raw)
            .map(|c| c[1].to_string())
            .collect();
        Self {
            name: name.into(),
            raw,
            placeholders,
        }
    }

    pub fn placeholders(&self) -> &HashSet<String> {
        &self.placeholders
    }

    /// Substitute every placeholder with its value from `values`.
    ///
    /// Rejects both directions: a `values` key the template never
    /// referenced, and a template placeholder with no supplied value.
    pub fn render(&self, values: &HashMap<String, String>) -> Result<String> {
        for key in values.keys() {
            if !self.placeholders.contains(key) {
                return Err(PromptError::UnknownPlaceholder {
                    template: self.name.clone(),
                    placeholder: key.clone(),
                });
            }
        }

        let mut out = self.raw.clone();
        for placeholder in &self.placeholders {
            let value = values.get(placeholder).ok_or_else(|| PromptError::MissingValue {
                template: self.name.clone(),
                placeholder: placeholder.clone(),
            })?;
            out = out.replace(&format!("{{{{{placeholder}}}}}"), value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_placeholders() {
        let template = Template::parse("greeting", "Hello {{name}}, intent is {{intent}}.");
        let mut values = HashMap::new();
        values.insert("name".to_string(), "Alice".to_string());
        values.insert("intent".to_string(), "booking".to_string());
        assert_eq!(template.render(&values).unwrap(), "Hello Alice, intent is booking.");
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let template = Template::parse("greeting", "Hello {{name}}.");
        let mut values = HashMap::new();
        values.insert("extra".to_string(), "x".to_string());
        assert!(matches!(template.render(&values), Err(PromptError::UnknownPlaceholder { .. })));
    }

    #[test]
    fn rejects_missing_value() {
        let template = Template::parse("greeting", "Hello {{name}}.");
        assert!(matches!(
            template.render(&HashMap::new()),
            Err(PromptError::MissingValue { .. })
        ));
    }
}
