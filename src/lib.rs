pub mod colorize;
pub mod config;
pub mod error;
pub mod frames;
pub mod gateway;
pub mod grid;
pub mod layer;
pub mod palette;
pub mod plan;
pub mod raster;
pub mod rng;
pub mod script;
pub mod session;
pub mod turn;
pub mod web;

pub use colorize::{colorize, ColorImage};
pub use config::{ClientConfig, ConfigLoader};
pub use error::{ConfigurationError, DecodeError, GatewayError, StateError, TurnError};
pub use gateway::{HttpGateway, SessionContext, SimulationGateway};
pub use grid::{CellCoordinate, GridMapper, Viewport};
pub use layer::Layer;
pub use palette::PaletteName;
pub use plan::PlanStore;
pub use raster::{decode_raster, RasterImage};
pub use session::{Session, SessionReport};
pub use turn::{Input, Phase, TurnController};
