//! Gerber/Excellon → G-code conversion core for hobby-class PCB milling.
//!
//! The pipeline parses a board's fabrication artifacts (top copper,
//! silkscreen, outline, drill files), composes and normalizes the geometry,
//! and runs the selected machining operations in a fixed order, appending
//! GRBL-flavored G-code to one combined program or one file per operation.

pub mod bits;
pub mod config;
pub mod error;
pub mod gcode;
pub mod geometry;
pub mod layers;
pub mod ops;
pub mod parsers;
pub mod planner;

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

pub use bits::{Bit, BitKind};
pub use config::{DrillMode, JobConfig};
pub use error::MillError;
pub use layers::{build_board, read_sources, Board, LayerSources};
pub use ops::Operation;

/// Bits resolved for each operation of a job.
#[derive(Debug, Default, Clone)]
pub struct JobBits {
    pub copper: Option<Bit>,
    pub mask: Option<Bit>,
    pub outline: Option<Bit>,
    pub silk: Option<Bit>,
    /// Candidate drills for the planner. In the single drill modes only the
    /// drill closest to `single_drill_diam` is used.
    pub drills: Vec<Bit>,
}

fn output_path(cfg: &JobConfig, out_dir: &Path, op: Operation, combined: bool) -> PathBuf {
    let base = if combined {
        "all.nc".to_string()
    } else {
        op.output_base().to_string()
    };
    out_dir.join(cfg.output_name(&base))
}

fn require_bit<'a>(slot: &'a Option<Bit>, op: Operation) -> Result<&'a Bit, MillError> {
    slot.as_ref()
        .ok_or_else(|| MillError::Config(format!("no bit configured for {}", op.label())))
}

/// Run the selected operations over a parsed board.
///
/// Operations always execute in [`Operation::ORDER`] regardless of the
/// order given. Existing output files are removed first, so a rerun never
/// appends to stale (possibly partial) programs. In combined mode only the
/// final operation terminates the program with `M2`; in split mode every
/// file does.
pub fn run_job(
    board: &Board,
    cfg: &JobConfig,
    bits: &JobBits,
    ops: &[Operation],
    out_dir: &Path,
    combined: bool,
) -> Result<(), MillError> {
    let selected: Vec<Operation> = Operation::ORDER
        .iter()
        .copied()
        .filter(|op| ops.contains(op))
        .collect();
    if selected.is_empty() {
        return Err(MillError::Config("no operations selected".into()));
    }

    for &op in &selected {
        let path = output_path(cfg, out_dir, op, combined);
        if path.exists() {
            fs::remove_file(&path)?;
        }
    }

    for (idx, &op) in selected.iter().enumerate() {
        let path = output_path(cfg, out_dir, op, combined);
        let mut file = gcode::ensure_header(&path, cfg, "")?;
        let end_program = !combined || idx == selected.len() - 1;

        match op {
            Operation::CopperIsolation => {
                let bit = require_bit(&bits.copper, op)?;
                ops::copper::run(&mut file, cfg, bit, &board.copper)?;
            }
            Operation::SoldermaskClear => {
                let bit = require_bit(&bits.mask, op)?;
                ops::mask::run(&mut file, cfg, bit, &board.pads)?;
            }
            Operation::Drilling => {
                let candidates = drill_candidates(cfg, bits)?;
                let holes = drillable_holes(cfg, board);
                ops::drill::run(&mut file, cfg, &candidates[0], &holes, &candidates)?;
            }
            Operation::BoardOutline => {
                let bit = require_bit(&bits.outline, op)?;
                ops::outline::run(&mut file, cfg, bit, &board.outline, &board.holes, &board.slots)?;
            }
            Operation::Silkscreen => {
                let bit = require_bit(&bits.silk, op)?;
                ops::silk::run(&mut file, cfg, bit, &board.silk)?;
            }
        }

        gcode::end_sequence(&mut file, cfg, end_program)?;
        info!("{}: written to {}", op.label(), path.display());
    }

    Ok(())
}

/// Small holes that belong to the drill phase. Holes at or above
/// `mill_holes_over` are milled in the outline phase instead, and in
/// single-plus-mill mode so are small holes the single drill can't cover.
fn drillable_holes(cfg: &JobConfig, board: &Board) -> Vec<parsers::excellon::Hole> {
    board
        .holes
        .iter()
        .filter(|h| h.diameter < cfg.mill_holes_over)
        .filter(|h| {
            cfg.drill_mode != DrillMode::SinglePlusMill
                || (h.diameter - cfg.single_drill_diam).abs() <= cfg.hole_match_tol
        })
        .copied()
        .collect()
}

fn drill_candidates(cfg: &JobConfig, bits: &JobBits) -> Result<Vec<Bit>, MillError> {
    if bits.drills.is_empty() {
        return Err(MillError::Config(
            "drilling selected but no drill bits are available".into(),
        ));
    }
    Ok(match cfg.drill_mode {
        DrillMode::Multi => bits.drills.clone(),
        DrillMode::Single | DrillMode::SinglePlusMill => {
            let closest = bits
                .drills
                .iter()
                .min_by(|a, b| {
                    (a.diameter - cfg.single_drill_diam)
                        .abs()
                        .partial_cmp(&(b.diameter - cfg.single_drill_diam).abs())
                        .unwrap()
                })
                .cloned()
                .expect("non-empty drills");
            vec![closest]
        }
    })
}
