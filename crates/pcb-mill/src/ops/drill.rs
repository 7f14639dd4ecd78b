//! Peck drilling of small holes.
//!
//! With a candidate drill set, holes are assigned by the planner and each
//! selected drill runs in descending diameter order, pecking its holes in
//! nearest-neighbor order starting from the previous tool's last position.
//! Without candidates (legacy mode), holes are grouped by their own
//! diameter and pecked with the operation's single bit.

use std::collections::BTreeMap;
use std::io::Write;

use geo::{coord, Coord};
use log::info;

use crate::bits::Bit;
use crate::config::JobConfig;
use crate::error::MillError;
use crate::gcode;
use crate::geometry::order;
use crate::parsers::excellon::Hole;
use crate::planner;

fn peck<W: Write>(
    w: &mut W,
    cfg: &JobConfig,
    feed_z: f64,
    depth: f64,
    x: f64,
    y: f64,
) -> std::io::Result<()> {
    writeln!(w, "G0 Z{:.3}", cfg.safe_z)?;
    writeln!(w, "G0 X{x:.4} Y{y:.4}")?;
    writeln!(w, "G1 Z{:.4} F{feed_z:.0}", -depth)?;
    writeln!(w, "G0 Z{:.3}", cfg.safe_z)?;
    Ok(())
}

/// Write the drilling phase for (normalized, small) holes.
pub fn run<W: Write>(
    w: &mut W,
    cfg: &JobConfig,
    bit: &Bit,
    holes: &[Hole],
    candidates: &[Bit],
) -> Result<usize, MillError> {
    if holes.is_empty() {
        info!("drill: no round drill hits found, skipping");
        return Ok(0);
    }

    let depth = cfg.pcb_thickness;

    if !candidates.is_empty() {
        let plan = planner::plan_drills(holes, candidates, cfg.hole_match_tol, cfg.max_drills)?;

        let mut total = 0;
        let mut cursor = coord! { x: 0.0, y: 0.0 };
        for assignment in &plan {
            let mut pts: Vec<Coord<f64>> = assignment
                .holes
                .iter()
                .map(|&(x, y)| coord! { x: x, y: y })
                .collect();
            if cfg.path_ordering {
                pts = order::order_points(pts, cursor);
            }
            if let Some(&last) = pts.last() {
                cursor = last;
            }

            gcode::toolchange_sequence(
                w,
                cfg,
                &assignment.bit,
                &format!(
                    "Drill: {} ({:.3}mm) | {} holes",
                    assignment.bit.name,
                    assignment.bit.diameter,
                    pts.len()
                ),
            )?;
            for p in &pts {
                peck(w, cfg, assignment.bit.feed_z, depth, p.x, p.y)?;
            }
            total += pts.len();
        }

        info!("drill: {} hole(s) drilled, depth {:.2} mm", total, depth);
        return Ok(total);
    }

    // Legacy mode: one physical bit, grouped by the holes' own diameters
    // so the operator can chuck the matching drill at each pause.
    let mut by_diameter: BTreeMap<i64, Vec<(f64, f64)>> = BTreeMap::new();
    for h in holes {
        let key = (h.diameter * 1000.0).round() as i64;
        by_diameter.entry(key).or_default().push((h.x, h.y));
    }

    let mut total = 0;
    let mut cursor = coord! { x: 0.0, y: 0.0 };
    for (&key, group) in by_diameter.iter().rev() {
        let diameter = key as f64 / 1000.0;
        let mut pts: Vec<Coord<f64>> =
            group.iter().map(|&(x, y)| coord! { x: x, y: y }).collect();
        if cfg.path_ordering {
            pts = order::order_points(pts, cursor);
        }
        if let Some(&last) = pts.last() {
            cursor = last;
        }

        gcode::toolchange_sequence(w, cfg, bit, &format!("Change drill to {diameter:.3}mm"))?;
        for p in &pts {
            peck(w, cfg, bit.feed_z, depth, p.x, p.y)?;
        }
        total += pts.len();
    }

    info!("drill: {} hole(s) drilled, depth {:.2} mm", total, depth);
    Ok(total)
}
