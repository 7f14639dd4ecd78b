//! Copper isolation routing: engrave around the copper image so traces are
//! electrically separated from the surrounding plane.

use std::io::Write;

use geo::{coord, MultiPolygon};
use log::info;

use crate::bits::Bit;
use crate::config::JobConfig;
use crate::error::MillError;
use crate::gcode;
use crate::geometry::{self, order};

/// Extra depth past the copper layer so the cut reliably breaks through.
const EXTRA_CLEARANCE: f64 = 0.01;

/// Cut depth for an isolation pass.
///
/// A v-bit's cut width depends on depth: reaching the target width
/// (`bit.diameter`) takes `(w/2) / tan(angle/2)`, capped so the tip never
/// goes deeper than the copper needs. Flat bits just clear the copper.
pub fn isolation_depth(bit: &Bit, copper_thickness: f64) -> f64 {
    let floor = copper_thickness + EXTRA_CLEARANCE;
    if bit.angle > 0.0 {
        let half = (bit.angle / 2.0).to_radians();
        let depth = (bit.diameter / 2.0) / half.tan();
        depth.min(floor)
    } else {
        floor
    }
}

/// Write the isolation passes for the (normalized) copper image.
pub fn run<W: Write>(
    w: &mut W,
    cfg: &JobConfig,
    bit: &Bit,
    copper: &MultiPolygon<f64>,
) -> Result<usize, MillError> {
    let tool_r = bit.diameter / 2.0;
    let depth = isolation_depth(bit, cfg.copper_thickness);
    let passes = cfg.isolation_passes.max(1);

    let mut paths = Vec::new();
    for i in 1..=passes {
        let offset = geometry::inflate(copper, tool_r * i as f64);
        paths.extend(geometry::boundary_lines(&offset));
    }

    let mut paths = geometry::cleanup_lines(paths, cfg.geom_simplify_tol, cfg.geom_min_length);
    if paths.is_empty() {
        info!("copper: no isolation geometry generated");
        return Ok(0);
    }

    if cfg.path_ordering {
        paths = order::order_lines(paths, coord! { x: cfg.park_x, y: cfg.park_y }, true);
    }

    gcode::toolchange_sequence(
        w,
        cfg,
        bit,
        &format!(
            "Copper isolation ({passes} pass{})",
            if passes == 1 { "" } else { "es" }
        ),
    )?;

    let ramp = bit.ramp_len_or(cfg);
    for path in &paths {
        gcode::write_polyline(w, cfg, bit, &path.0, depth, ramp)?;
    }

    info!(
        "copper: {} isolation path(s), {} pass(es), depth {:.3} mm",
        paths.len(),
        passes,
        depth
    );
    Ok(paths.len())
}
