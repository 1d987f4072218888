//! Intensity-to-colour lookup tables.
//!
//! Each palette is a closed-form approximation of a reference colour ramp,
//! evaluated once into a 256-entry table and shared for the lifetime of the
//! process.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaletteName {
    #[default]
    Viridis,
    Magma,
}

impl PaletteName {
    pub const ALL: [PaletteName; 2] = [PaletteName::Viridis, PaletteName::Magma];

    /// Resolves a palette by name; unknown names fall back to viridis.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "magma" => PaletteName::Magma,
            _ => PaletteName::Viridis,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaletteName::Viridis => "viridis",
            PaletteName::Magma => "magma",
        }
    }
}

impl From<String> for PaletteName {
    fn from(value: String) -> Self {
        PaletteName::from_name(&value)
    }
}

impl From<PaletteName> for String {
    fn from(value: PaletteName) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PaletteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, u8::MAX]
    }
}

pub struct Palette {
    name: PaletteName,
    lookup: [Rgb; 256],
}

impl Palette {
    /// Returns the shared table for `name`, building it on first use.
    pub fn get(name: PaletteName) -> &'static Palette {
        static VIRIDIS: OnceLock<Palette> = OnceLock::new();
        static MAGMA: OnceLock<Palette> = OnceLock::new();
        match name {
            PaletteName::Viridis => VIRIDIS.get_or_init(|| Palette::build(name)),
            PaletteName::Magma => MAGMA.get_or_init(|| Palette::build(name)),
        }
    }

    fn build(name: PaletteName) -> Self {
        let mut lookup = [Rgb::default(); 256];
        for (intensity, slot) in lookup.iter_mut().enumerate() {
            let t = intensity as f64 / 255.0;
            *slot = match name {
                PaletteName::Viridis => Rgb::new(
                    channel(68.0 + 190.0 * t - 180.0 * t * t),
                    channel(1.0 + 180.0 * t),
                    channel(84.0 + 120.0 * (1.0 - t)),
                ),
                PaletteName::Magma => Rgb::new(
                    channel(30.0 + 225.0 * t.powf(0.9)),
                    channel(5.0 + 60.0 * t.powf(1.2)),
                    channel(35.0 + 30.0 * (1.0 - t).powf(2.0)),
                ),
            };
        }
        Self { name, lookup }
    }

    pub fn name(&self) -> PaletteName {
        self.name
    }

    #[inline]
    pub fn color(&self, intensity: u8) -> Rgb {
        self.lookup[intensity as usize]
    }

    pub fn lookup(&self) -> &[Rgb; 256] {
        &self.lookup
    }
}

/// Colour for a single sample.
#[inline]
pub fn color_for(palette: PaletteName, intensity: u8) -> Rgb {
    Palette::get(palette).color(intensity)
}

// Round first, clamp second.
fn channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_fall_back_to_viridis() {
        assert_eq!(PaletteName::from_name("magma"), PaletteName::Magma);
        assert_eq!(PaletteName::from_name(" MAGMA "), PaletteName::Magma);
        assert_eq!(PaletteName::from_name("inferno"), PaletteName::Viridis);
        assert_eq!(PaletteName::from_name(""), PaletteName::Viridis);
    }

    #[test]
    fn viridis_endpoints_match_formula() {
        assert_eq!(color_for(PaletteName::Viridis, 0), Rgb::new(68, 1, 204));
        assert_eq!(color_for(PaletteName::Viridis, 255), Rgb::new(78, 181, 84));
        assert_eq!(color_for(PaletteName::Viridis, 128), Rgb::new(118, 91, 144));
    }

    #[test]
    fn magma_endpoints_match_formula() {
        assert_eq!(color_for(PaletteName::Magma, 0), Rgb::new(30, 5, 65));
        assert_eq!(color_for(PaletteName::Magma, 255), Rgb::new(255, 65, 35));
    }

    #[test]
    fn tables_are_shared_and_stable() {
        let first = Palette::get(PaletteName::Magma) as *const Palette;
        let second = Palette::get(PaletteName::Magma) as *const Palette;
        assert_eq!(first, second);
        assert_eq!(Palette::get(PaletteName::Magma).name(), PaletteName::Magma);
    }

    #[test]
    fn every_intensity_yields_a_colour_for_every_palette() {
        for palette in PaletteName::ALL {
            let table = Palette::get(palette);
            for intensity in 0..=u8::MAX {
                assert_eq!(color_for(palette, intensity), table.lookup()[intensity as usize]);
            }
        }
    }

    #[test]
    fn serde_accepts_unknown_names() {
        let parsed: PaletteName = serde_json::from_str("\"cividis\"").unwrap();
        assert_eq!(parsed, PaletteName::Viridis);
        assert_eq!(serde_json::to_string(&PaletteName::Magma).unwrap(), "\"magma\"");
    }
}
