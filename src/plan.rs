//! Per-cell decisions staged for the current turn.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::grid::CellIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAttribute {
    Irrigate,
    /// Irrigation intensity in `0..=1`.
    Irrigation,
    Crop,
    Drainage,
    CoverCrop,
    Mulch,
}

impl PlanAttribute {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanAttribute::Irrigate => "irrigate",
            PlanAttribute::Irrigation => "irrigation",
            PlanAttribute::Crop => "crop",
            PlanAttribute::Drainage => "drainage",
            PlanAttribute::CoverCrop => "cover_crop",
            PlanAttribute::Mulch => "mulch",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "irrigate" => Some(PlanAttribute::Irrigate),
            "irrigation" => Some(PlanAttribute::Irrigation),
            "crop" => Some(PlanAttribute::Crop),
            "drainage" => Some(PlanAttribute::Drainage),
            "cover_crop" | "cover" => Some(PlanAttribute::CoverCrop),
            "mulch" => Some(PlanAttribute::Mulch),
            _ => None,
        }
    }
}

impl fmt::Display for PlanAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Flag(bool),
    Level(f64),
    Choice(String),
}

impl AttributeValue {
    /// Reads a value the way a user would type it: `true`/`false`/`yes`/`no`,
    /// a number, or anything else as a choice.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => return AttributeValue::Flag(true),
            "false" | "no" | "off" => return AttributeValue::Flag(false),
            _ => {}
        }
        match raw.parse::<f64>() {
            Ok(level) if level.is_finite() => AttributeValue::Level(level),
            _ => AttributeValue::Choice(raw.to_string()),
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            AttributeValue::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_level(&self) -> Option<f64> {
        match self {
            AttributeValue::Level(level) => Some(*level),
            _ => None,
        }
    }

    pub fn as_choice(&self) -> Option<&str> {
        match self {
            AttributeValue::Choice(choice) => Some(choice),
            _ => None,
        }
    }
}

/// Attributes of one cell. Each attribute holds a single value, so setting
/// `crop` replaces the previous crop while leaving other attributes alone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanEntry {
    attributes: BTreeMap<PlanAttribute, AttributeValue>,
}

impl PlanEntry {
    pub fn with(mut self, attribute: PlanAttribute, value: AttributeValue) -> Self {
        self.attributes.insert(attribute, value);
        self
    }

    pub fn get(&self, attribute: PlanAttribute) -> Option<&AttributeValue> {
        self.attributes.get(&attribute)
    }

    pub fn flag(&self, attribute: PlanAttribute) -> bool {
        self.get(attribute)
            .and_then(AttributeValue::as_flag)
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlanAttribute, &AttributeValue)> {
        self.attributes.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Snapshot of the staged decisions, keyed by linear cell index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    entries: HashMap<CellIndex, PlanEntry>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, cell: CellIndex) -> Option<&PlanEntry> {
        self.entries.get(&cell)
    }

    pub fn contains(&self, cell: CellIndex) -> bool {
        self.entries.contains_key(&cell)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellIndex, &PlanEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Entries ordered by cell index, for stable payloads.
    pub fn sorted(&self) -> BTreeMap<CellIndex, &PlanEntry> {
        self.entries.iter().map(|(k, v)| (*k, v)).collect()
    }

    /// Cells whose `attribute` flag is set, ascending.
    pub fn cells_flagged(&self, attribute: PlanAttribute) -> Vec<CellIndex> {
        let mut cells: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.flag(attribute))
            .map(|(cell, _)| *cell)
            .collect();
        cells.sort_unstable();
        cells
    }

    /// Cells carrying any value for `attribute`, ascending.
    pub fn cells_with(&self, attribute: PlanAttribute) -> BTreeMap<CellIndex, &AttributeValue> {
        self.entries
            .iter()
            .filter_map(|(cell, entry)| entry.get(attribute).map(|value| (*cell, value)))
            .collect()
    }
}

pub struct PlanStore {
    entries: HashMap<CellIndex, PlanEntry>,
    default_entry: PlanEntry,
}

impl PlanStore {
    /// A store whose toggled cells are marked for irrigation.
    pub fn new() -> Self {
        Self::with_default_entry(
            PlanEntry::default().with(PlanAttribute::Irrigate, AttributeValue::Flag(true)),
        )
    }

    pub fn with_default_entry(default_entry: PlanEntry) -> Self {
        Self {
            entries: HashMap::new(),
            default_entry,
        }
    }

    pub fn default_entry(&self) -> &PlanEntry {
        &self.default_entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, cell: CellIndex) -> bool {
        self.entries.contains_key(&cell)
    }

    pub fn entry(&self, cell: CellIndex) -> Option<&PlanEntry> {
        self.entries.get(&cell)
    }

    /// Whether the cell carries every default attribute, which is what the
    /// pointer toggles.
    pub fn is_selected(&self, cell: CellIndex) -> bool {
        self.entries
            .get(&cell)
            .is_some_and(|entry| self.holds_default(entry))
    }

    /// Cells currently selected, ascending.
    pub fn selected(&self) -> Vec<CellIndex> {
        let mut cells: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| self.holds_default(entry))
            .map(|(cell, _)| *cell)
            .collect();
        cells.sort_unstable();
        cells
    }

    /// Removes the default attributes if the cell is selected, otherwise
    /// merges them into its entry. Other attributes are kept; a cell left
    /// with none drops out of the plan. Returns whether the cell is selected
    /// afterwards.
    pub fn toggle(&mut self, cell: CellIndex) -> bool {
        if self.is_selected(cell) {
            self.deselect(cell);
            false
        } else {
            self.select(cell);
            true
        }
    }

    /// Flips one boolean attribute without touching the others. A cleared flag
    /// is removed rather than stored as `false`; a cell left with no
    /// attributes drops out of the plan.
    pub fn toggle_flag(&mut self, cell: CellIndex, attribute: PlanAttribute) -> bool {
        let entry = self.entries.entry(cell).or_default();
        let enabled = !entry.flag(attribute);
        if enabled {
            entry.attributes.insert(attribute, AttributeValue::Flag(true));
        } else {
            entry.attributes.remove(&attribute);
        }
        if entry.is_empty() {
            self.entries.remove(&cell);
        }
        enabled
    }

    /// Upserts one attribute. Returns `false` when the value was already set.
    pub fn set_attribute(
        &mut self,
        cell: CellIndex,
        attribute: PlanAttribute,
        value: AttributeValue,
    ) -> bool {
        let entry = self.entries.entry(cell).or_default();
        if entry.get(attribute) == Some(&value) {
            return false;
        }
        entry.attributes.insert(attribute, value);
        true
    }

    pub fn remove_attribute(&mut self, cell: CellIndex, attribute: PlanAttribute) -> bool {
        let Some(entry) = self.entries.get_mut(&cell) else {
            return false;
        };
        let removed = entry.attributes.remove(&attribute).is_some();
        if entry.is_empty() {
            self.entries.remove(&cell);
        }
        removed
    }

    /// Replaces the selection with `count` distinct cells drawn uniformly from
    /// the grid. Requests larger than the grid are capped at the cell count.
    /// Attributes outside the default entry survive on every cell.
    pub fn bulk_random_select(
        &mut self,
        count: usize,
        grid_width: u32,
        grid_height: u32,
        rng: &mut impl Rng,
    ) -> usize {
        for cell in self.selected() {
            self.deselect(cell);
        }
        let cells = grid_width as usize * grid_height as usize;
        let amount = count.min(cells);
        for cell in rand::seq::index::sample(rng, cells, amount) {
            self.select(cell);
        }
        amount
    }

    /// The current plan. Does not clear the store.
    pub fn diff(&self) -> Plan {
        Plan {
            entries: self.entries.clone(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn holds_default(&self, entry: &PlanEntry) -> bool {
        self.default_entry
            .iter()
            .all(|(attribute, value)| entry.get(attribute) == Some(value))
    }

    fn select(&mut self, cell: CellIndex) {
        let entry = self.entries.entry(cell).or_default();
        for (attribute, value) in self.default_entry.iter() {
            entry.attributes.insert(attribute, value.clone());
        }
    }

    fn deselect(&mut self, cell: CellIndex) {
        let Some(entry) = self.entries.get_mut(&cell) else {
            return;
        };
        for (attribute, _) in self.default_entry.iter() {
            entry.attributes.remove(&attribute);
        }
        if entry.is_empty() {
            self.entries.remove(&cell);
        }
    }
}

impl Default for PlanStore {
    fn default() -> Self {
        Self::new()
    }
}
