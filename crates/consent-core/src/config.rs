//! Widget configuration
//!
//! Mirrors the options object an embedding page passes at init. Every field
//! has a default, so `{}` is a complete configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use consent_enforcement::{DomainMatrix, GateSettings, DEFAULT_SWEEP_INTERVAL};
use consent_patterns::CategoryId;
use consent_storage::{CategoryDefinition, StoreSettings};

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BannerPosition {
    #[default]
    BottomRight,
    BottomLeft,
    BottomCenter,
    TopRight,
    TopLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// How the presentation layer should draw the banner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Appearance {
    pub position: BannerPosition,
    pub theme: Theme,
}

/// Per-category options as written in the config map
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CategoryOptions {
    pub enabled: bool,
    pub read_only: bool,
    #[serde(alias = "name")]
    pub display_name: String,
    pub description: String,
}

impl CategoryOptions {
    fn new(display_name: &str, description: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }

    fn read_only(mut self) -> Self {
        self.read_only = true;
        self.enabled = true;
        self
    }

    fn into_definition(self, id: CategoryId) -> CategoryDefinition {
        CategoryDefinition {
            id,
            enabled: self.enabled || self.read_only,
            read_only: self.read_only,
            display_name: self.display_name,
            description: self.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsentConfig {
    /// Name of the cookie holding the consent record
    pub cookie_name: String,
    #[serde(alias = "cookieExpiry")]
    pub cookie_expiry_days: u32,
    #[serde(alias = "autoShow")]
    pub auto_show_banner: bool,
    /// Reload the page after every consent change so blocked dynamic
    /// scripts get a clean second chance
    pub reload_after_change: bool,
    pub categories: BTreeMap<CategoryId, CategoryOptions>,
    pub position: BannerPosition,
    pub theme: Theme,
    pub sweep_interval_ms: u64,
    pub domain_matrix: DomainMatrix,
    pub self_script_path: String,
    pub allow_attribute: String,
    pub category_attribute: String,
    pub inert_script_type: String,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        let gate = GateSettings::default();

        let categories = BTreeMap::from([
            (
                CategoryId::necessary(),
                CategoryOptions::new(
                    "Necessary",
                    "Essential cookies required for the website to function properly.",
                )
                .read_only(),
            ),
            (
                CategoryId::analytics(),
                CategoryOptions::new(
                    "Analytics",
                    "Help us understand how visitors interact with our website.",
                ),
            ),
            (
                CategoryId::marketing(),
                CategoryOptions::new("Marketing", "Used to deliver personalized content and ads."),
            ),
        ]);

        Self {
            cookie_name: "cc_cookie".to_string(),
            cookie_expiry_days: 365,
            auto_show_banner: true,
            reload_after_change: true,
            categories,
            position: BannerPosition::default(),
            theme: Theme::default(),
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
            domain_matrix: DomainMatrix::default(),
            self_script_path: gate.self_script_path,
            allow_attribute: gate.allow_attribute,
            category_attribute: gate.category_attribute,
            inert_script_type: gate.inert_type,
        }
    }
}

impl ConsentConfig {
    /// Parse and validate a JSON options object
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let name = self.cookie_name.as_str();
        if name.is_empty()
            || name
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | '=' | ','))
        {
            return Err(CoreError::Config(format!(
                "invalid cookie name {:?}",
                self.cookie_name
            )));
        }

        if self.cookie_expiry_days == 0 {
            return Err(CoreError::Config(
                "cookie expiry must be at least one day".to_string(),
            ));
        }

        if self.categories.is_empty() {
            return Err(CoreError::Config(
                "at least one category is required".to_string(),
            ));
        }

        if !self.categories.values().any(|options| options.read_only) {
            return Err(CoreError::Config(
                "at least one read-only category is required".to_string(),
            ));
        }

        if self.sweep_interval_ms == 0 {
            return Err(CoreError::Config(
                "sweep interval must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            cookie_name: self.cookie_name.clone(),
            cookie_expiry_days: self.cookie_expiry_days,
            categories: self
                .categories
                .iter()
                .map(|(id, options)| (id.clone(), options.clone().into_definition(id.clone())))
                .collect(),
        }
    }

    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            category_attribute: self.category_attribute.clone(),
            inert_type: self.inert_script_type.clone(),
            allow_attribute: self.allow_attribute.clone(),
            self_script_path: self.self_script_path.clone(),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn appearance(&self) -> Appearance {
        Appearance {
            position: self.position,
            theme: self.theme,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = ConsentConfig::from_json("{}").unwrap();
        assert_eq!(config, ConsentConfig::default());
        assert_eq!(config.sweep_interval(), Duration::from_millis(500));
        assert!(config.categories[&CategoryId::necessary()].read_only);
    }

    #[test]
    fn test_widget_style_options() {
        let config = ConsentConfig::from_json(
            r#"{
                "cookieName": "site_consent",
                "cookieExpiry": 30,
                "autoShow": false,
                "position": "top-left",
                "theme": "dark",
                "domainMatrix": "host_only",
                "categories": {
                    "necessary": { "enabled": true, "readOnly": true, "name": "Required" },
                    "statistics": { "name": "Statistics", "description": "Usage numbers" }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.cookie_name, "site_consent");
        assert_eq!(config.cookie_expiry_days, 30);
        assert!(!config.auto_show_banner);
        assert!(config.reload_after_change);
        assert_eq!(config.position, BannerPosition::TopLeft);
        assert_eq!(config.theme, Theme::Dark);
        assert_eq!(config.domain_matrix, DomainMatrix::HostOnly);

        let settings = config.store_settings();
        assert_eq!(settings.categories.len(), 2);
        assert_eq!(settings.categories[&CategoryId::necessary()].display_name, "Required");
        assert!(!settings.categories[&CategoryId::new("statistics")].read_only);
    }

    #[test]
    fn test_long_form_keys() {
        let config =
            ConsentConfig::from_json(r#"{"cookieExpiryDays": 7, "autoShowBanner": false}"#)
                .unwrap();
        assert_eq!(config.cookie_expiry_days, 7);
        assert!(!config.auto_show_banner);
    }

    #[test]
    fn test_validation() {
        for json in [
            r#"{"categories": {}}"#,
            r#"{"cookieExpiry": 0}"#,
            r#"{"sweepIntervalMs": 0}"#,
            r#"{"cookieName": "bad name"}"#,
            r#"{"cookieName": ""}"#,
            r#"{"categories": {"analytics": {"name": "Analytics"}}}"#,
        ] {
            assert!(
                matches!(ConsentConfig::from_json(json), Err(CoreError::Config(_))),
                "{json} should be rejected"
            );
        }

        assert!(matches!(
            ConsentConfig::from_json("not json"),
            Err(CoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_gate_settings_follow_config() {
        let config = ConsentConfig::from_json(
            r#"{"allowAttribute": "data-always", "inertScriptType": "text/x-gated"}"#,
        )
        .unwrap();
        let gate = config.gate_settings();
        assert_eq!(gate.allow_attribute, "data-always");
        assert_eq!(gate.inert_type, "text/x-gated");
        assert_eq!(gate.category_attribute, "data-category");
    }
}
