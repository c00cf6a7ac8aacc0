use std::collections::BTreeMap;

use schema::Theme;
use serde::{Deserialize, Serialize};

use crate::error::Error;

const DEFAULT_COLORS: [(&str, &str); 5] = [
    ("primary", "#0f62fe"),
    ("secondary", "#393939"),
    ("background", "#ffffff"),
    ("text", "#161616"),
    ("accent", "#f1c21b"),
];

/// Colours in effect for a page. Applying a theme returns a new context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThemeContext {
    pub name: String,
    pub colors: BTreeMap<String, String>,
}

/// CSS custom properties for the root element, in name order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StyleSheet {
    pub variables: Vec<(String, String)>,
}

impl StyleSheet {
    pub fn to_css(&self) -> String {
        let mut css = String::from(":root {\n");
        for (name, value) in &self.variables {
            css.push_str(&format!("  {name}: {value};\n"));
        }
        css.push_str("}\n");
        css
    }
}

impl Default for ThemeContext {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            colors: DEFAULT_COLORS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl ThemeContext {
    /// Overlays `theme` colours on this context. Colours the theme does not set are kept.
    pub fn apply(&self, theme: &Theme) -> Result<ThemeContext, Error> {
        validate_theme(theme)?;
        let mut colors = self.colors.clone();
        for (name, value) in &theme.colors {
            colors.insert(name.clone(), value.trim().to_string());
        }
        Ok(ThemeContext {
            name: theme.name.clone(),
            colors,
        })
    }

    pub fn style_sheet(&self) -> StyleSheet {
        StyleSheet {
            variables: self
                .colors
                .iter()
                .map(|(name, value)| (format!("--color-{name}"), value.clone()))
                .collect(),
        }
    }
}

/// Colour names must be CSS identifiers and values must not break out of a declaration.
pub fn validate_theme(theme: &Theme) -> Result<(), Error> {
    if theme.name.trim().is_empty() {
        return Err(Error::InvalidTheme("Theme name is empty".into()));
    }
    for (name, value) in &theme.colors {
        let valid_name = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid_name {
            return Err(Error::InvalidTheme(format!(
                "Theme {} has invalid colour name '{name}'",
                theme.id
            )));
        }
        if value.trim().is_empty() || value.contains([';', '{', '}', '<', '>']) {
            return Err(Error::InvalidTheme(format!(
                "Theme {} has invalid value for colour '{name}'",
                theme.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use bson::oid::ObjectId;

    use super::*;

    fn theme(colors: &[(&str, &str)]) -> Theme {
        Theme {
            id: ObjectId::new(),
            name: "Dark".into(),
            colors: colors
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            is_active: true,
        }
    }

    #[test]
    fn apply_returns_new_context() {
        let base = ThemeContext::default();
        let dark = base
            .apply(&theme(&[("background", "#000000"), ("text", " #eeeeee ")]))
            .unwrap();

        assert_eq!(base.colors["background"], "#ffffff");
        assert_eq!(dark.name, "Dark");
        assert_eq!(dark.colors["background"], "#000000");
        assert_eq!(dark.colors["text"], "#eeeeee");
        assert_eq!(dark.colors["primary"], base.colors["primary"]);
    }

    #[test]
    fn style_sheet_lists_css_variables() {
        let context = ThemeContext::default()
            .apply(&theme(&[("primary", "red")]))
            .unwrap();
        let css = context.style_sheet().to_css();
        assert!(css.starts_with(":root {\n"));
        assert!(css.contains("  --color-primary: red;\n"));
        assert!(css.contains("  --color-accent: #f1c21b;\n"));
    }

    #[test]
    fn rejects_injection() {
        let base = ThemeContext::default();
        assert!(base.apply(&theme(&[("primary", "red; } body {")])).is_err());
        assert!(base.apply(&theme(&[("pri mary", "red")])).is_err());
    }
}
