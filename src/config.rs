use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MARKER_ATTRIBUTE: &str = "data-draggable";
pub const DEFAULT_RESIZE_THROTTLE_MS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DragConfig {
    /// Attribute that opts an element into drag behavior. Stripped on registration.
    pub marker_attribute: String,
    /// Minimum spacing between two handled viewport resizes.
    pub resize_throttle_ms: u64,
    pub proxy_cursor: String,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            marker_attribute: DEFAULT_MARKER_ATTRIBUTE.to_string(),
            resize_throttle_ms: DEFAULT_RESIZE_THROTTLE_MS,
            proxy_cursor: "pointer".to_string(),
        }
    }
}

impl DragConfig {
    pub fn resize_interval(&self) -> Duration {
        Duration::from_millis(self.resize_throttle_ms)
    }

    /// `svg[attr], svg [attr]`, the selector a browser host observes.
    pub fn selector(&self) -> String {
        format!(
            "svg[{attr}], svg [{attr}]",
            attr = self.marker_attribute
        )
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<DragConfig> {
    let Some(path) = path else {
        return Ok(DragConfig::default());
    };

    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parses a JSON config, filling omitted keys with defaults.
pub fn parse_config(json: &str) -> anyhow::Result<DragConfig> {
    let config: DragConfig = serde_json::from_str(json)?;
    if config.marker_attribute.trim().is_empty() {
        return Err(anyhow::anyhow!("markerAttribute must not be empty"));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_page_markup() {
        let config = DragConfig::default();
        assert_eq!(config.marker_attribute, "data-draggable");
        assert_eq!(config.resize_interval(), Duration::from_millis(30));
        assert_eq!(config.selector(), "svg[data-draggable], svg [data-draggable]");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: DragConfig = serde_json::from_str(r#"{"resizeThrottleMs": 100}"#).unwrap();
        assert_eq!(config.resize_throttle_ms, 100);
        assert_eq!(config.marker_attribute, DEFAULT_MARKER_ATTRIBUTE);
        assert_eq!(config.proxy_cursor, "pointer");
    }

    #[test]
    fn empty_marker_is_rejected() {
        let err = parse_config(r#"{"markerAttribute": " "}"#).unwrap_err();
        assert!(err.to_string().contains("markerAttribute"));
    }

    #[test]
    fn missing_path_yields_defaults() {
        assert_eq!(load_config(None).unwrap(), DragConfig::default());
    }
}
