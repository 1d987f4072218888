use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    #[default]
    Ndvi,
    #[serde(alias = "soil")]
    SoilMoisture,
    Precip,
    Temp,
    Wind,
    Rain,
    Dry,
    Landuse,
}

impl Layer {
    pub const ALL: [Layer; 8] = [
        Layer::Ndvi,
        Layer::SoilMoisture,
        Layer::Precip,
        Layer::Temp,
        Layer::Wind,
        Layer::Rain,
        Layer::Dry,
        Layer::Landuse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Layer::Ndvi => "ndvi",
            Layer::SoilMoisture => "soil_moisture",
            Layer::Precip => "precip",
            Layer::Temp => "temp",
            Layer::Wind => "wind",
            Layer::Rain => "rain",
            Layer::Dry => "dry",
            Layer::Landuse => "landuse",
        }
    }

    /// Physical range an 8-bit sample of this layer spans.
    pub fn scale(self) -> ValueScale {
        match self {
            Layer::Rain | Layer::Precip => ValueScale::new(0.0, 400.0),
            Layer::Temp => ValueScale::new(-3.0, 3.0),
            Layer::Ndvi | Layer::SoilMoisture | Layer::Wind | Layer::Dry | Layer::Landuse => {
                ValueScale::new(0.0, 1.0)
            }
        }
    }

    /// Maps the channel prefix of a delta key (`ndviΔ`, `soilΔ`, ...) to a layer.
    /// Channels without a displayable layer, such as `water`, map to `None`.
    pub fn from_delta_channel(channel: &str) -> Option<Layer> {
        channel.parse().ok()
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown layer '{0}'")]
pub struct UnknownLayer(pub String);

impl FromStr for Layer {
    type Err = UnknownLayer;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if name == "soil" {
            return Ok(Layer::SoilMoisture);
        }
        Layer::ALL
            .into_iter()
            .find(|layer| layer.as_str() == name)
            .ok_or_else(|| UnknownLayer(s.to_string()))
    }
}

/// Linear mapping between 8-bit samples and the layer's physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueScale {
    pub vmin: f32,
    pub vmax: f32,
}

impl ValueScale {
    pub const fn new(vmin: f32, vmax: f32) -> Self {
        Self { vmin, vmax }
    }

    pub fn decode(&self, sample: u8) -> f32 {
        self.vmin + (sample as f32 / 255.0) * (self.vmax - self.vmin)
    }

    pub fn encode(&self, value: f32) -> u8 {
        let span = self.vmax - self.vmin;
        if span <= 0.0 || !value.is_finite() {
            return 0;
        }
        let normalized = (self.clamp(value) - self.vmin) / span;
        (normalized * 255.0).round().clamp(0.0, 255.0) as u8
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.vmin, self.vmax)
    }
}

/// Cache key for one fetched layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerKey {
    pub layer: Layer,
    pub year: i32,
    pub season: u32,
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.layer, self.year, self.season)
    }
}
