//! Line-oriented input scripts for headless play.
//!
//! ```text
//! # comments and blank lines are skipped
//! pointer 125 148
//! layer soil_moisture
//! palette magma
//! season +1
//! random
//! toggle 3 4
//! flag 3 4 cover_crop
//! set 3 4 irrigation 0.5
//! apply
//! advance
//! ```

use thiserror::Error;

use crate::grid::CellCoordinate;
use crate::layer::Layer;
use crate::palette::PaletteName;
use crate::plan::{AttributeValue, PlanAttribute};
use crate::turn::Input;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ScriptError {
    pub line: usize,
    pub message: String,
}

pub fn parse_script(text: &str) -> Result<Vec<Input>, ScriptError> {
    let mut inputs = Vec::new();
    for (number, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let input = parse_line(line).map_err(|message| ScriptError {
            line: number + 1,
            message,
        })?;
        inputs.push(input);
    }
    Ok(inputs)
}

fn parse_line(line: &str) -> Result<Input, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let args = &words[1..];
    let input = match (words[0], args) {
        ("pointer", [x, y]) => Input::Pointer {
            x: number(x)?,
            y: number(y)?,
        },
        ("layer", [name]) => Input::SwitchLayer(name.parse::<Layer>().map_err(|err| err.to_string())?),
        ("palette", [name]) => Input::ChangePalette(PaletteName::from_name(name)),
        ("season", [step]) => Input::StepSeason(
            step.trim_start_matches('+')
                .parse()
                .map_err(|_| format!("season step '{step}' is not an integer"))?,
        ),
        ("random", []) => Input::RandomSelection,
        ("toggle", [col, row]) => Input::ToggleCell(cell(col, row)?),
        ("flag", [col, row, attribute]) => Input::ToggleFlag {
            cell: cell(col, row)?,
            attribute: plan_attribute(attribute)?,
        },
        ("set", [col, row, attribute, value]) => Input::SetAttribute {
            cell: cell(col, row)?,
            attribute: plan_attribute(attribute)?,
            value: AttributeValue::parse(value),
        },
        ("apply", []) => Input::ApplyPlan,
        ("advance", []) => Input::AdvanceTurn,
        (command, _) => return Err(format!("cannot read '{command}' with {} argument(s)", args.len())),
    };
    Ok(input)
}

fn number(raw: &str) -> Result<f32, String> {
    raw.parse().map_err(|_| format!("'{raw}' is not a number"))
}

fn cell(col: &str, row: &str) -> Result<CellCoordinate, String> {
    let parse = |raw: &str| raw.parse::<u32>().map_err(|_| format!("'{raw}' is not a cell index"));
    Ok(CellCoordinate::new(parse(col)?, parse(row)?))
}

fn plan_attribute(raw: &str) -> Result<PlanAttribute, String> {
    PlanAttribute::parse(raw).ok_or_else(|| format!("unknown plan attribute '{raw}'"))
}
