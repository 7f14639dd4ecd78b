//! Soldermask clearing: scrub the mask off every pad with a shallow
//! serpentine raster, falling back to a cross pattern on pads too small
//! to raster.

use std::io::Write;

use geo::{coord, Centroid, LineString, MultiPolygon, Polygon};
use log::info;

use crate::bits::Bit;
use crate::config::JobConfig;
use crate::error::MillError;
use crate::gcode;
use crate::geometry::{self, order};

/// Allowed overshoot past the pad edge when the tool won't fit inside.
const MAX_OUTSIDE: f64 = 0.10;
/// Raster stepover as a fraction of tool diameter.
const STEPOVER_RATIO: f64 = 0.45;

/// Clearing paths for one pad.
fn clear_pad(pad: &Polygon<f64>, tool_d: f64) -> Vec<LineString<f64>> {
    let pad_mp = MultiPolygon::new(vec![pad.clone()]);

    // Keep the tool inside the pad, less a small allowed overshoot. Pads
    // narrower than the tool get a small outward region so they are still
    // scrubbed.
    let mut safe = geometry::inflate(&pad_mp, -(tool_d / 2.0 - MAX_OUTSIDE));
    if safe.0.is_empty() {
        safe = geometry::inflate(&pad_mp, tool_d / 2.0);
    }
    let Some(rect) = geometry::bounds(&safe) else {
        return Vec::new();
    };

    let (w, h) = (rect.width(), rect.height());
    let centroid = pad.centroid().map(|p| (p.x(), p.y())).unwrap_or((
        (rect.min().x + rect.max().x) / 2.0,
        (rect.min().y + rect.max().y) / 2.0,
    ));

    // Very small pads: a cross through the centroid instead of a raster.
    if w < tool_d * 1.1 || h < tool_d * 1.1 {
        let (cx, cy) = centroid;
        return vec![
            LineString::from(vec![(cx - tool_d, cy), (cx + tool_d, cy)]),
            LineString::from(vec![(cx, cy - tool_d), (cx, cy + tool_d)]),
        ];
    }

    // Boustrophedon raster over the safe region's bounds.
    let step = tool_d * STEPOVER_RATIO;
    let mut out = Vec::new();
    let mut y = rect.min().y;
    let mut flip = false;
    while y <= rect.max().y {
        let (x0, x1) = if flip {
            (rect.max().x, rect.min().x)
        } else {
            (rect.min().x, rect.max().x)
        };
        out.push(LineString::from(vec![(x0, y), (x1, y)]));
        y += step;
        flip = !flip;
    }
    out
}

/// Write mask clearing for the (normalized) pad image.
pub fn run<W: Write>(
    w: &mut W,
    cfg: &JobConfig,
    bit: &Bit,
    pads: &MultiPolygon<f64>,
) -> Result<usize, MillError> {
    if pads.0.is_empty() {
        info!("mask: no pads found");
        return Ok(0);
    }

    let depth = cfg.soldermask_depth;
    let mut lines: Vec<LineString<f64>> = Vec::new();
    for pad in &pads.0 {
        lines.extend(clear_pad(pad, bit.diameter));
    }
    if lines.is_empty() {
        info!("mask: no clearing paths generated");
        return Ok(0);
    }

    if cfg.path_ordering {
        lines = order::order_lines(lines, coord! { x: 0.0, y: 0.0 }, true);
    }

    gcode::toolchange_sequence(w, cfg, bit, "Soldermask clearing")?;
    for line in &lines {
        gcode::write_polyline(w, cfg, bit, &line.0, depth, 0.0)?;
    }

    info!(
        "mask: cleared {} pad(s), {} path(s), depth {:.3} mm",
        pads.0.len(),
        lines.len(),
        depth
    );
    Ok(lines.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rect_centered;

    fn mill(d: f64) -> Bit {
        Bit {
            name: "m".into(),
            type_name: "endmill".into(),
            diameter: d,
            ..Bit::default()
        }
    }

    #[test]
    fn test_large_pad_serpentine() {
        // 4x3 pad, 0.8 tool: safe region shrinks by 0.3 each side -> 3.4x2.4,
        // stepover 0.36 -> ~7 raster rows.
        let pad = rect_centered(0.0, 0.0, 4.0, 3.0);
        let lines = clear_pad(&pad, 0.8);
        assert!(lines.len() >= 6 && lines.len() <= 8, "{} lines", lines.len());
        // Alternate rows run in opposite directions.
        assert!(lines[0].0[0].x < lines[0].0[1].x);
        assert!(lines[1].0[0].x > lines[1].0[1].x);
    }

    #[test]
    fn test_small_pad_cross() {
        // Pad smaller than the tool: cross pattern through the centroid.
        let pad = rect_centered(5.0, 5.0, 0.5, 0.5);
        let lines = clear_pad(&pad, 0.8);
        assert_eq!(lines.len(), 2);
        // One horizontal, one vertical, both centered on (5,5).
        assert!((lines[0].0[0].y - 5.0).abs() < 1e-9);
        assert!((lines[1].0[0].x - 5.0).abs() < 1e-9);
        assert!((lines[0].0[1].x - lines[0].0[0].x - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_run_counts_and_depth() {
        let pads = MultiPolygon::new(vec![
            rect_centered(0.0, 0.0, 3.0, 3.0),
            rect_centered(10.0, 0.0, 0.5, 0.5),
        ]);
        let cfg = JobConfig::default();
        let mut out = Vec::new();
        let count = run(&mut out, &cfg, &mill(0.8), &pads).unwrap();
        assert!(count > 2);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("; Soldermask clearing"));
        // Default mask depth 0.01.
        assert!(text.contains("G1 Z-0.0100"));
    }

    #[test]
    fn test_empty_pads() {
        let cfg = JobConfig::default();
        let mut out = Vec::new();
        let count = run(&mut out, &cfg, &mill(0.8), &MultiPolygon::new(vec![])).unwrap();
        assert_eq!(count, 0);
        assert!(out.is_empty());
    }
}
