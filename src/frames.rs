//! Rendered frames of the play screen, written to disk with a manifest.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::colorize::ColorImage;
use crate::grid::GridMapper;
use crate::layer::LayerKey;
use crate::palette::PaletteName;
use crate::plan::PlanStore;
use crate::turn::{LayerStatus, LayerView};

const BACKGROUND: [u8; 4] = [0x0b, 0x0d, 0x0f, 0xff];
const SELECTION: [u8; 4] = [0x66, 0xcc, 0xff, 0xff];

/// Lays the view out on the viewport: one square per cell with a one pixel
/// gutter, selected cells outlined. A view that is not cell-sized (the
/// placeholder) is drawn as-is below the header.
pub fn compose_frame(view: &LayerView, grid: &GridMapper, plan: &PlanStore) -> ColorImage {
    let viewport = grid.viewport();
    let mut frame = ColorImage::filled(viewport.width, viewport.height, BACKGROUND);
    let size = grid.cell_size();
    let per_cell = view.image.width() == grid.grid_width() && view.image.height() == grid.grid_height();
    if !per_cell {
        frame.blit(&view.image, 0, grid.header_offset());
    }
    for (idx, cell) in grid.cells().enumerate() {
        let origin = grid.cell_origin(cell);
        if per_cell {
            if let Some(color) = view.image.pixel(cell.col, cell.row) {
                frame.fill_rect(origin.x, origin.y, size - 1, size - 1, color);
            }
        }
        if plan.is_selected(idx) {
            frame.stroke_rect(origin.x, origin.y, size - 1, size - 1, SELECTION);
        }
    }
    frame
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub file: String,
    pub key: LayerKey,
    pub palette: PaletteName,
    pub degraded: bool,
    pub selected_cells: usize,
    pub written_at: DateTime<Utc>,
}

/// Writes numbered PNG frames and keeps `frames.json` in step with them.
pub struct FrameWriter {
    output_dir: PathBuf,
    records: Vec<FrameRecord>,
}

impl FrameWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create frame directory {}", output_dir.display()))?;
        Ok(Self {
            output_dir,
            records: Vec::new(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    pub fn write(&mut self, view: &LayerView, grid: &GridMapper, plan: &PlanStore) -> Result<PathBuf> {
        let key = view.key;
        let file = format!(
            "{:04}_y{}_s{}_{}.png",
            self.records.len(),
            key.year,
            key.season,
            key.layer
        );
        let path = self.output_dir.join(&file);
        let png = compose_frame(view, grid, plan).to_png()?;
        fs::write(&path, png).with_context(|| format!("Failed to write frame {}", path.display()))?;

        self.records.push(FrameRecord {
            file,
            key,
            palette: view.palette,
            degraded: matches!(view.status, LayerStatus::Degraded(_)),
            selected_cells: plan.selected().len(),
            written_at: Utc::now(),
        });
        let manifest = self.output_dir.join("frames.json");
        let json = serde_json::to_string_pretty(&self.records)?;
        fs::write(&manifest, json)
            .with_context(|| format!("Failed to write manifest {}", manifest.display()))?;
        Ok(path)
    }

    pub fn load_manifest(dir: impl AsRef<Path>) -> Result<Vec<FrameRecord>> {
        let path = dir.as_ref().join("frames.json");
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let records = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(records)
    }
}
