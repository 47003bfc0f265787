use crate::types::IconDescriptor;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub views: ViewsConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub data_csv: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ViewsConfig {
    /// Preselected chains when the request names none.
    pub default_chains: Vec<String>,
    pub default_state: String,
    pub top_states: usize,
    /// Proportion (0-1) a chain needs to keep its own pie slice.
    pub distribution_threshold: f64,
    pub top_cities: usize,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        ViewsConfig {
            default_chains: vec!["Taco Bell".to_string()],
            default_state: "CA".to_string(),
            top_states: 10,
            distribution_threshold: 0.03,
            top_cities: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    /// Tile URL template handed to the map renderer.
    pub style: String,
    pub zoom: u8,
    pub pitch: u8,
    pub icon: IconDescriptor,
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            style: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            zoom: 6,
            pitch: 0,
            icon: IconDescriptor {
                url: "https://cdn-icons-png.flaticon.com/512/684/684908.png".to_string(),
                width: 242,
                height: 242,
                anchor_y: 242,
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { port: 3000 }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.views.distribution_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            bail!("views.distribution_threshold must be between 0 and 1, got {}", threshold);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = AppConfig::from_toml("[input]\ndata_csv = \"data/fast_food.csv\"\n").unwrap();

        assert_eq!(config.input.data_csv, PathBuf::from("data/fast_food.csv"));
        assert_eq!(config.views.default_chains, vec!["Taco Bell".to_string()]);
        assert_eq!(config.views.default_state, "CA");
        assert_eq!(config.views.top_states, 10);
        assert_eq!(config.views.top_cities, 5);
        assert_eq!(config.map.icon.width, 242);
        assert_eq!(config.map.icon.anchor_y, 242);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [input]
            data_csv = "x.csv"

            [views]
            default_state = "NY"

            [server]
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(config.views.default_state, "NY");
        assert_eq!(config.views.distribution_threshold, 0.03);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = AppConfig::from_toml(
            "[input]\ndata_csv = \"x.csv\"\n[views]\ndistribution_threshold = 3.0\n",
        )
        .unwrap_err();

        assert!(err.to_string().contains("distribution_threshold"));
    }

    #[test]
    fn bundled_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.toml");
        let config = AppConfig::load_from_file(&path).unwrap();

        assert_eq!(config.input.data_csv, PathBuf::from("data/sample_fast_food_usa.csv"));
        assert_eq!(config.map.zoom, 6);
    }

    #[test]
    fn missing_input_section_fails() {
        assert!(AppConfig::from_toml("[server]\nport = 1\n").is_err());
    }
}
