use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub page_size: usize,
    pub initial_hover: Option<usize>,
    /// Matched case-insensitively against the patient table header.
    pub uid_column: String,
    pub risk_column: String,
    /// Grouping column used when statistics are derived from the raw dataset.
    pub group_column: String,
    pub group_labels: Vec<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            initial_hover: Some(0),
            uid_column: "UID".to_string(),
            risk_column: "risk".to_string(),
            group_column: "male".to_string(),
            group_labels: vec!["Female".to_string(), "Male".to_string()],
        }
    }
}

impl DashboardConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: DashboardConfig = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        anyhow::ensure!(config.page_size > 0, "page_size must be greater than zero");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: DashboardConfig =
            serde_json::from_str(r#"{"page_size": 25, "initial_hover": null}"#).expect("parse");
        assert_eq!(config.page_size, 25);
        assert_eq!(config.initial_hover, None);
        assert_eq!(config.uid_column, "UID");
        assert_eq!(config.group_labels, vec!["Female", "Male"]);
    }
}
