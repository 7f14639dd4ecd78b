//! Through cuts: routed slots, milled large holes, and the board outline
//! with optional holding tabs. One tool change opens the phase; slots run
//! first, then holes, then the outline.

use std::io::Write;

use geo::{coord, Coord, EuclideanLength, LineString, MultiPolygon};
use log::{info, warn};

use crate::bits::Bit;
use crate::config::{DrillMode, JobConfig};
use crate::error::MillError;
use crate::gcode;
use crate::geometry;
use crate::parsers::excellon::{Hole, Slot};

/// Fraction of the outline perimeter between holding tabs.
const TAB_SPACING_RATIO: f64 = 0.20;
/// Tab width along the outline, mm.
const TAB_WIDTH: f64 = 1.0;
/// Arc-length step for the outline walk, mm.
const OUTLINE_STEP: f64 = 0.5;
/// Sideways stepover between slot passes, as a fraction of tool diameter.
const SLOT_STEPOVER_RATIO: f64 = 0.60;

/// Side offsets for clearing a slot wider than the tool: the centerline,
/// then symmetric pairs stepping outward to the slot walls.
fn slot_offsets(slot_w: f64, tool_d: f64) -> Vec<f64> {
    if tool_d >= slot_w * 0.999 {
        return vec![0.0];
    }
    let limit = (slot_w - tool_d) / 2.0;
    let step = tool_d * SLOT_STEPOVER_RATIO;
    if step <= 0.0 {
        return vec![0.0];
    }

    let mut out = vec![0.0];
    let mut r = 0.0;
    while r < limit - 1e-9 {
        r = (r + step).min(limit);
        out.push(r);
        out.push(-r);
    }
    out
}

fn mill_slot<W: Write>(
    w: &mut W,
    cfg: &JobConfig,
    bit: &Bit,
    slot: &Slot,
    ramp: f64,
) -> Result<(), MillError> {
    let dx = slot.x2 - slot.x1;
    let dy = slot.y2 - slot.y1;
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-9 {
        return Ok(());
    }
    let (nx, ny) = (-dy / len, dx / len);

    let offsets = slot_offsets(slot.width, bit.diameter);
    for depth in gcode::stepdown_depths(cfg.pcb_thickness, bit.stepdown) {
        for &o in &offsets {
            let pts = [
                coord! { x: slot.x1 + nx * o, y: slot.y1 + ny * o },
                coord! { x: slot.x2 + nx * o, y: slot.y2 + ny * o },
            ];
            gcode::write_polyline(w, cfg, bit, &pts, depth, ramp)?;
        }
    }
    Ok(())
}

fn mill_hole<W: Write>(
    w: &mut W,
    cfg: &JobConfig,
    bit: &Bit,
    hole: &Hole,
    ramp: f64,
) -> Result<bool, MillError> {
    let tool_d = bit.diameter;
    // Drill-sized holes are not pocketed here.
    if hole.diameter <= tool_d * 1.02 {
        return Ok(false);
    }

    let outer = (hole.diameter - tool_d) / 2.0;
    if outer <= 0.0 {
        return Ok(false);
    }

    // Concentric rings from the wall inward while they stay meaningful.
    let mut rings = Vec::new();
    let mut r = outer;
    while r > tool_d * 0.25 {
        rings.push(r);
        r -= tool_d * SLOT_STEPOVER_RATIO;
    }

    for depth in gcode::stepdown_depths(cfg.pcb_thickness, bit.stepdown) {
        for &r in &rings {
            let pts = geometry::circle_points(hole.x, hole.y, r);
            gcode::write_polyline(w, cfg, bit, &pts, depth, ramp)?;
        }
    }
    Ok(true)
}

/// Nearest-neighbor slot ordering with endpoint swap.
fn order_slots(slots: &[Slot], start: Coord<f64>) -> Vec<Slot> {
    let mut remaining: Vec<Slot> = slots.to_vec();
    let mut ordered = Vec::with_capacity(remaining.len());
    let mut cursor = start;

    let d2 = |x: f64, y: f64, c: Coord<f64>| (x - c.x).powi(2) + (y - c.y).powi(2);

    while !remaining.is_empty() {
        let mut best_i = 0;
        let mut best_flip = false;
        let mut best_d = f64::INFINITY;
        for (i, s) in remaining.iter().enumerate() {
            let ds = d2(s.x1, s.y1, cursor);
            if ds < best_d {
                best_d = ds;
                best_i = i;
                best_flip = false;
            }
            let de = d2(s.x2, s.y2, cursor);
            if de < best_d {
                best_d = de;
                best_i = i;
                best_flip = true;
            }
        }
        let mut s = remaining.remove(best_i);
        if best_flip {
            std::mem::swap(&mut s.x1, &mut s.x2);
            std::mem::swap(&mut s.y1, &mut s.y2);
        }
        cursor = coord! { x: s.x2, y: s.y2 };
        ordered.push(s);
    }
    ordered
}

/// Nearest-neighbor hole ordering.
fn order_holes(holes: &[Hole], start: Coord<f64>) -> Vec<Hole> {
    let mut remaining: Vec<Hole> = holes.to_vec();
    let mut ordered = Vec::with_capacity(remaining.len());
    let mut cursor = start;

    while !remaining.is_empty() {
        let mut best_i = 0;
        let mut best_d = f64::INFINITY;
        for (i, h) in remaining.iter().enumerate() {
            let d = (h.x - cursor.x).powi(2) + (h.y - cursor.y).powi(2);
            if d < best_d {
                best_d = d;
                best_i = i;
            }
        }
        let h = remaining.remove(best_i);
        cursor = coord! { x: h.x, y: h.y };
        ordered.push(h);
    }
    ordered
}

/// Tab positions along the perimeter: `spacing, 2*spacing, ...` up to and
/// including the seam. The first tab is deliberately not at arc length 0.
fn tab_positions(length: f64) -> Vec<f64> {
    let spacing = length * TAB_SPACING_RATIO;
    let mut out = Vec::new();
    let mut d = spacing;
    while d <= length + 1e-9 {
        out.push(d);
        d += spacing;
    }
    out
}

/// Whether `dist` falls inside a tab window, treating the perimeter as a
/// closed loop (a tab at the seam covers both ends).
fn in_tab(dist: f64, tabs: &[f64], length: f64) -> bool {
    let half = TAB_WIDTH / 2.0;
    tabs.iter().any(|&t| {
        let diff = (dist - t).abs();
        diff.min(length - diff) <= half
    })
}

/// Write the through-cut phase for the (normalized) board.
///
/// `outline` is the track image of the outline layer; `holes` carries every
/// deduped hole (this phase mills those at or above `mill_holes_over`, plus
/// non-matching small holes in single-plus-mill mode); `slots` come from
/// the drill files.
pub fn run<W: Write>(
    w: &mut W,
    cfg: &JobConfig,
    bit: &Bit,
    outline: &MultiPolygon<f64>,
    holes: &[Hole],
    slots: &[Slot],
) -> Result<(), MillError> {
    let ring = geometry::inflate(outline, bit.diameter / 2.0);
    let ring = geometry::largest_polygon(&ring).map(|p| p.exterior().clone());
    if ring.is_none() {
        warn!("outline: no outline geometry; cutting slots/holes only");
    }

    let mut mill_targets: Vec<Hole> = holes
        .iter()
        .filter(|h| h.diameter >= cfg.mill_holes_over)
        .copied()
        .collect();
    let big_count = mill_targets.len();

    // In single-plus-mill mode, small holes the single drill can't cover
    // are milled here instead.
    let mut extra_count = 0;
    if cfg.drill_mode == DrillMode::SinglePlusMill {
        for h in holes {
            if h.diameter < cfg.mill_holes_over
                && (h.diameter - cfg.single_drill_diam).abs() > cfg.hole_match_tol
            {
                mill_targets.push(*h);
                extra_count += 1;
            }
        }
    }

    if ring.is_none() && slots.is_empty() && mill_targets.is_empty() {
        info!("outline: nothing to cut");
        return Ok(());
    }

    let start = coord! { x: 0.0, y: 0.0 };
    let slots_ordered = if cfg.path_ordering {
        order_slots(slots, start)
    } else {
        slots.to_vec()
    };
    let holes_ordered = if cfg.path_ordering {
        order_holes(&mill_targets, start)
    } else {
        mill_targets.clone()
    };

    let ramp = bit.ramp_len_or(cfg);
    gcode::toolchange_sequence(w, cfg, bit, "Through cuts: slots/holes/outline")?;

    for slot in &slots_ordered {
        mill_slot(w, cfg, bit, slot, ramp)?;
    }

    let mut milled = 0;
    for hole in &holes_ordered {
        if mill_hole(w, cfg, bit, hole, ramp)? {
            milled += 1;
        }
    }

    if let Some(ring) = ring {
        cut_outline(w, cfg, bit, &ring, ramp)?;
        if cfg.outline_tabs_enabled {
            info!("outline: board outline with tabs generated");
        } else {
            info!("outline: board outline generated (no tabs)");
        }
    }

    if !slots_ordered.is_empty() {
        info!("outline: routed {} slot(s)", slots_ordered.len());
    }
    if big_count > 0 {
        info!("outline: milled {milled} large hole(s)");
    }
    if extra_count > 0 {
        info!("outline: milled {extra_count} non-matching small hole(s) (single+mill)");
    }
    Ok(())
}

/// Walk the outline ring by arc length, dropping to tab depth inside tab
/// windows and full depth elsewhere.
fn cut_outline<W: Write>(
    w: &mut W,
    cfg: &JobConfig,
    bit: &Bit,
    ring: &LineString<f64>,
    ramp: f64,
) -> Result<(), MillError> {
    let coords = &ring.0;
    if coords.len() < 2 {
        return Ok(());
    }

    let length = ring.euclidean_length();
    let full_depth = cfg.pcb_thickness;
    let tab_depth = full_depth * 0.75;
    let tabs = if cfg.outline_tabs_enabled {
        tab_positions(length)
    } else {
        Vec::new()
    };

    writeln!(w, "G0 Z{:.3}", cfg.safe_z)?;
    writeln!(w, "G0 X{:.4} Y{:.4}", coords[0].x, coords[0].y)?;

    let mut dist = 0.0;
    if ramp > 0.0 {
        let first_depth = if in_tab(0.0, &tabs, length) {
            tab_depth
        } else {
            full_depth
        };
        let (ramp_pt, seg_end) = gcode::ramp_entry_point(coords, ramp);
        writeln!(
            w,
            "G1 X{:.4} Y{:.4} Z{:.4} F{:.0}",
            ramp_pt.x, ramp_pt.y, -first_depth, bit.feed_xy
        )?;
        let end = coords[seg_end];
        if (end.x - ramp_pt.x).abs() > 1e-9 || (end.y - ramp_pt.y).abs() > 1e-9 {
            writeln!(w, "G1 X{:.4} Y{:.4} F{:.0}", end.x, end.y, bit.feed_xy)?;
        }
        // The cutter now sits at the vertex closing the ramp's segment.
        dist = coords[..=seg_end]
            .windows(2)
            .map(|s| ((s[1].x - s[0].x).powi(2) + (s[1].y - s[0].y).powi(2)).sqrt())
            .sum();
    }

    while dist < length - 1e-9 {
        let depth = if in_tab(dist, &tabs, length) {
            tab_depth
        } else {
            full_depth
        };
        writeln!(w, "G1 Z{:.4} F{:.0}", -depth, bit.feed_z)?;

        let next = (dist + OUTLINE_STEP).min(length);
        let seg = geometry::substring(ring, dist, next);
        for c in &seg.0[1..] {
            writeln!(w, "G1 X{:.4} Y{:.4} F{:.0}", c.x, c.y, bit.feed_xy)?;
        }
        dist = next;
    }

    writeln!(w, "G0 Z{:.3}", cfg.safe_z)?;
    Ok(())
}
