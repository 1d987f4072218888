use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::gateway::{LayerScope, NewGameRequest, SessionContext};
use crate::grid::{GridMapper, Viewport};
use crate::layer::Layer;
use crate::palette::PaletteName;
use crate::turn::ControllerSettings;

fn default_api_base() -> String {
    "http://localhost:8000".to_string()
}

fn default_region() -> String {
    "california".to_string()
}

fn default_grid_size() -> u32 {
    10
}

fn default_viewport() -> Viewport {
    Viewport {
        width: 500,
        height: 548,
        header_offset: 48,
    }
}

fn default_random_selection_count() -> usize {
    50
}

fn default_seed() -> u64 {
    7
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_frames_dir() -> PathBuf {
    PathBuf::from("frames")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub scope: LayerScope,
    /// Overrides the years reported by the backend.
    #[serde(default)]
    pub years: Option<Vec<i32>>,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default = "default_viewport")]
    pub viewport: Viewport,
    #[serde(default)]
    pub palette: PaletteName,
    #[serde(default)]
    pub initial_layer: Layer,
    #[serde(default = "default_random_selection_count")]
    pub random_selection_count: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub frames: FramesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_grid_size")]
    pub width: u32,
    #[serde(default = "default_grid_size")]
    pub height: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_grid_size(),
            height: default_grid_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramesConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_frames_dir")]
    pub output_dir: PathBuf,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: default_frames_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            region: default_region(),
            scenario: None,
            scope: LayerScope::default(),
            years: None,
            grid: GridConfig::default(),
            viewport: default_viewport(),
            palette: PaletteName::default(),
            initial_layer: Layer::default(),
            random_selection_count: default_random_selection_count(),
            seed: default_seed(),
            request_timeout_secs: default_request_timeout_secs(),
            frames: FramesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Rejects grid and viewport combinations that cannot be drawn.
    pub fn validate(&self) -> Result<GridMapper, ConfigurationError> {
        if matches!(&self.years, Some(years) if years.is_empty()) {
            return Err(ConfigurationError::NoYears);
        }
        GridMapper::new(self.viewport, self.grid.width, self.grid.height)
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            viewport: self.viewport,
            grid_width: self.grid.width,
            grid_height: self.grid.height,
            palette: self.palette,
            initial_layer: self.initial_layer,
            random_selection_count: self.random_selection_count,
            seed: self.seed,
        }
    }

    pub fn session_context(&self) -> SessionContext {
        SessionContext::new(self.api_base.clone(), self.scope, self.region.clone())
    }

    pub fn new_game_request(&self) -> NewGameRequest {
        NewGameRequest {
            scenario: self.scenario.clone(),
            region: Some(self.region.clone()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<ClientConfig> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: ClientConfig = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ClientConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.api_base, "http://localhost:8000");
        assert_eq!(config.grid.width, 10);
        assert_eq!(config.viewport.header_offset, 48);
        assert_eq!(config.palette, PaletteName::Viridis);
        assert_eq!(config.random_selection_count, 50);
        let grid = config.validate().unwrap();
        assert_eq!(grid.cell_size(), 50);
    }

    #[test]
    fn loader_reads_yaml_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("farm.yaml"),
            "region: iowa\nscope: farm\npalette: magma\ninitial_layer: soil\ngrid:\n  width: 20\n  height: 5\nyears: [2019, 2020]\n",
        )
        .unwrap();
        let config = ConfigLoader::new(dir.path()).load("farm.yaml").unwrap();
        assert_eq!(config.scope, LayerScope::Farm);
        assert_eq!(config.palette, PaletteName::Magma);
        assert_eq!(config.initial_layer, Layer::SoilMoisture);
        assert_eq!(config.years, Some(vec![2019, 2020]));
        assert_eq!(config.session_context().region_id, "iowa");

        std::fs::write(dir.path().join("bad.yaml"), "grid:\n  width: 1000\n").unwrap();
        assert!(ConfigLoader::new(dir.path()).load("bad.yaml").is_err());
    }
}
