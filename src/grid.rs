//! Screen-space geometry for the cell grid.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Linear cell index, `row * grid_width + col`.
pub type CellIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoordinate {
    pub col: u32,
    pub row: u32,
}

impl CellCoordinate {
    pub const fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }
}

/// Viewport in pixels; `header_offset` rows at the top are reserved for UI chrome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub header_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelPoint {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridMapper {
    viewport: Viewport,
    grid_width: u32,
    grid_height: u32,
    cell_size: u32,
}

impl GridMapper {
    /// Fits square cells of the larger grid dimension into the smaller viewport
    /// dimension. Fails when that would leave cells less than one pixel wide.
    pub fn new(
        viewport: Viewport,
        grid_width: u32,
        grid_height: u32,
    ) -> Result<Self, ConfigurationError> {
        if grid_width == 0 || grid_height == 0 {
            return Err(ConfigurationError::EmptyGrid {
                width: grid_width,
                height: grid_height,
            });
        }
        let cell_size = viewport.width.min(viewport.height) / grid_width.max(grid_height);
        if cell_size == 0 {
            return Err(ConfigurationError::DegenerateGrid {
                grid_width,
                grid_height,
                viewport_width: viewport.width,
                viewport_height: viewport.height,
            });
        }
        Ok(Self {
            viewport,
            grid_width,
            grid_height,
            cell_size,
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn grid_width(&self) -> u32 {
        self.grid_width
    }

    pub fn grid_height(&self) -> u32 {
        self.grid_height
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    pub fn header_offset(&self) -> u32 {
        self.viewport.header_offset
    }

    pub fn cell_count(&self) -> usize {
        self.grid_width as usize * self.grid_height as usize
    }

    /// Pixel extent covered by the grid, header band included.
    pub fn extent(&self) -> (u32, u32) {
        (
            self.grid_width * self.cell_size,
            self.grid_height * self.cell_size + self.viewport.header_offset,
        )
    }

    pub fn contains(&self, cell: CellCoordinate) -> bool {
        cell.col < self.grid_width && cell.row < self.grid_height
    }

    pub fn index_of(&self, cell: CellCoordinate) -> Option<CellIndex> {
        if self.contains(cell) {
            Some(cell.row as usize * self.grid_width as usize + cell.col as usize)
        } else {
            None
        }
    }

    pub fn cell_from_index(&self, idx: CellIndex) -> Option<CellCoordinate> {
        if idx < self.cell_count() {
            let width = self.grid_width as usize;
            Some(CellCoordinate::new((idx % width) as u32, (idx / width) as u32))
        } else {
            None
        }
    }

    /// Top-left pixel of a cell.
    pub fn cell_origin(&self, cell: CellCoordinate) -> PixelPoint {
        PixelPoint {
            x: cell.col * self.cell_size,
            y: cell.row * self.cell_size + self.viewport.header_offset,
        }
    }

    /// Cell under a pointer position, or `None` for the header band, negative
    /// coordinates and anything past the grid's edge.
    pub fn cell_at(&self, x: f32, y: f32) -> Option<CellCoordinate> {
        if !x.is_finite() || !y.is_finite() || x < 0.0 {
            return None;
        }
        let header = self.viewport.header_offset as f64;
        let (x, y) = (x as f64, y as f64);
        if y < header {
            return None;
        }
        let size = self.cell_size as f64;
        let col = (x / size).floor();
        let row = ((y - header) / size).floor();
        if col >= self.grid_width as f64 || row >= self.grid_height as f64 {
            return None;
        }
        Some(CellCoordinate::new(col as u32, row as u32))
    }

    pub fn index_at(&self, x: f32, y: f32) -> Option<CellIndex> {
        self.cell_at(x, y).and_then(|cell| self.index_of(cell))
    }

    pub fn cells(&self) -> impl Iterator<Item = CellCoordinate> + '_ {
        (0..self.grid_height)
            .flat_map(move |row| (0..self.grid_width).map(move |col| CellCoordinate::new(col, row)))
    }
}
