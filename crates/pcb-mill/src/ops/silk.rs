//! Silkscreen engraving.
//!
//! Uses the raw draw centerlines from the parser rather than buffered track
//! polygons: dense text on a silkscreen layer explodes into enormous
//! geometry when buffered and unioned, while the centerlines engrave the
//! same artwork at a fraction of the path count.

use std::io::Write;

use geo::{coord, LineString};
use log::info;

use crate::bits::Bit;
use crate::config::JobConfig;
use crate::error::MillError;
use crate::gcode;
use crate::geometry::{self, order};

/// Segments shorter than this are parser noise, not artwork.
const MIN_SEGMENT: f64 = 0.001;

/// Write silkscreen engraving for the (normalized) draw centerlines.
pub fn run<W: Write>(
    w: &mut W,
    cfg: &JobConfig,
    bit: &Bit,
    segments: &[LineString<f64>],
) -> Result<usize, MillError> {
    if segments.is_empty() {
        info!("silk: no silkscreen draw segments found");
        return Ok(0);
    }

    let mut lines = geometry::cleanup_lines(
        segments.to_vec(),
        cfg.geom_simplify_tol,
        MIN_SEGMENT.max(cfg.geom_min_length),
    );
    if lines.is_empty() {
        info!("silk: no silkscreen paths after cleanup");
        return Ok(0);
    }

    if cfg.path_ordering {
        lines = order::order_lines(lines, coord! { x: 0.0, y: 0.0 }, true);
    }

    let depth = if cfg.silk_depth > 0.0 { cfg.silk_depth } else { 0.05 };

    gcode::toolchange_sequence(w, cfg, bit, "Silkscreen engraving")?;
    for line in &lines {
        gcode::write_polyline(w, cfg, bit, &line.0, depth, 0.0)?;
    }

    info!("silk: engraved {} path(s), depth {:.3} mm", lines.len(), depth);
    Ok(lines.len())
}
