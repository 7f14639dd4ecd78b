//! G-code emission: GRBL-flavored job policy (header / tool change / end
//! sequence) and the ramp-aware polyline writer shared by all operations.
//!
//! Output is plain text, millimeters, absolute coordinates. X/Y are written
//! to 4 decimals, cut Z to 4, retract Z to 3, feeds as integers.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use geo::Coord;

use crate::bits::Bit;
use crate::config::JobConfig;

/// Per-pass depth used when a bit doesn't declare its own stepdown.
pub const DEFAULT_STEPDOWN: f64 = 0.5;

/// Program preamble: modal setup, travel retract, optional probe block.
pub fn write_header<W: Write>(w: &mut W, cfg: &JobConfig, job_name: &str) -> io::Result<()> {
    writeln!(w, "; ----------------------------")?;
    writeln!(w, "; pcb-mill job")?;
    if !job_name.is_empty() {
        writeln!(w, "; Job: {job_name}")?;
    }
    writeln!(w, "; Units: mm")?;
    writeln!(w, "; ----------------------------")?;

    writeln!(w, "G21")?;
    writeln!(w, "G90")?;
    writeln!(w, "G17")?;
    writeln!(w, "G94")?;
    writeln!(w, "G54")?;
    writeln!(w, "G92.1")?;
    writeln!(w, "G0 Z{:.3}", cfg.travel_z)?;

    if cfg.probe_on_start {
        let probe = cfg.probe_gcode.trim();
        if probe.is_empty() {
            writeln!(w, "; Probe on start requested, but probe_gcode is empty.")?;
            writeln!(w, "M0 ; Run your probe routine now, then resume")?;
        } else {
            writeln!(w, "; Probe on start (user-provided)")?;
            for line in probe.lines().map(str::trim).filter(|l| !l.is_empty()) {
                writeln!(w, "{line}")?;
            }
            writeln!(w, "G0 Z{:.3}", cfg.travel_z)?;
        }
    }
    Ok(())
}

/// Open `path` for appending, writing the header first when the file is
/// missing or empty. A partial file from a failed run starts over.
pub fn ensure_header(path: &Path, cfg: &JobConfig, job_name: &str) -> io::Result<File> {
    let needs_header = match path.metadata() {
        Ok(meta) => meta.len() == 0,
        Err(_) => true,
    };
    if needs_header {
        let mut f = File::create(path)?;
        write_header(&mut f, cfg, job_name)?;
        return Ok(f);
    }
    OpenOptions::new().append(true).open(path)
}

/// Manual tool change: retract, stop the spindle, park, pause for the swap,
/// then spin up (with an optional warmup dwell) and return to travel height.
pub fn toolchange_sequence<W: Write>(
    w: &mut W,
    cfg: &JobConfig,
    bit: &Bit,
    message: &str,
) -> io::Result<()> {
    writeln!(w)?;
    writeln!(w, "G0 Z{:.3}", cfg.toolchange_z)?;
    writeln!(w, "M5")?;
    writeln!(w, "G0 X{:.3} Y{:.3}", cfg.park_x, cfg.park_y)?;
    writeln!(w, "; {message}")?;
    writeln!(w, "M0")?;

    if bit.rpm > 0 {
        writeln!(w, "S{} M3", bit.rpm)?;
    } else {
        writeln!(w, "M3")?;
    }
    if cfg.spindle_warmup_s > 0.0 {
        writeln!(w, "G4 P{:.3}", cfg.spindle_warmup_s)?;
    }
    writeln!(w, "G0 Z{:.3}", cfg.travel_z)?;
    Ok(())
}

/// Close an operation: retract, spindle off, park. `end_program` appends
/// `M2` and must be set only by a single-op file or a combined file's
/// final operation.
pub fn end_sequence<W: Write>(w: &mut W, cfg: &JobConfig, end_program: bool) -> io::Result<()> {
    writeln!(w)?;
    writeln!(w, "G0 Z{:.3}", cfg.travel_z)?;
    writeln!(w, "M5")?;
    writeln!(w, "G0 X{:.3} Y{:.3}", cfg.park_x, cfg.park_y)?;
    if end_program {
        writeln!(w, "M2")?;
    }
    Ok(())
}

/// Cut one polyline at `depth` (positive, below the surface).
///
/// With `ramp_len > 0` the entry is a single feed move whose XY advances
/// `ramp_len` along the path while Z descends, the segment containing the
/// ramp endpoint is finished, and the rest follows. Otherwise the tool
/// plunges straight down at the first point. Always retracts to safe Z.
pub fn write_polyline<W: Write>(
    w: &mut W,
    cfg: &JobConfig,
    bit: &Bit,
    pts: &[Coord<f64>],
    depth: f64,
    ramp_len: f64,
) -> io::Result<()> {
    if pts.len() < 2 {
        return Ok(());
    }

    writeln!(w, "G0 Z{:.3}", cfg.safe_z)?;
    writeln!(w, "G0 X{:.4} Y{:.4}", pts[0].x, pts[0].y)?;

    if ramp_len > 0.0 {
        let (ramp_pt, seg_end) = ramp_entry_point(pts, ramp_len);
        writeln!(
            w,
            "G1 X{:.4} Y{:.4} Z{:.4} F{:.0}",
            ramp_pt.x, ramp_pt.y, -depth, bit.feed_xy
        )?;

        // Finish the segment holding the ramp endpoint, then the rest.
        let end = pts[seg_end];
        if (end.x - ramp_pt.x).abs() > 1e-9 || (end.y - ramp_pt.y).abs() > 1e-9 {
            writeln!(w, "G1 X{:.4} Y{:.4} F{:.0}", end.x, end.y, bit.feed_xy)?;
        }
        for p in &pts[seg_end + 1..] {
            writeln!(w, "G1 X{:.4} Y{:.4} F{:.0}", p.x, p.y, bit.feed_xy)?;
        }
    } else {
        writeln!(w, "G1 Z{:.4} F{:.0}", -depth, bit.feed_z)?;
        for p in &pts[1..] {
            writeln!(w, "G1 X{:.4} Y{:.4} F{:.0}", p.x, p.y, bit.feed_xy)?;
        }
    }

    writeln!(w, "G0 Z{:.3}", cfg.safe_z)?;
    Ok(())
}

/// Locate the point `ramp_len` along the polyline and the index of the
/// vertex ending the segment that holds it. Paths shorter than the ramp
/// use their second vertex.
pub(crate) fn ramp_entry_point(pts: &[Coord<f64>], ramp_len: f64) -> (Coord<f64>, usize) {
    let mut remaining = ramp_len;
    let mut p0 = pts[0];
    for (i, &p1) in pts.iter().enumerate().skip(1) {
        let seg = ((p1.x - p0.x).powi(2) + (p1.y - p0.y).powi(2)).sqrt();
        if seg <= 1e-12 {
            p0 = p1;
            continue;
        }
        if seg >= remaining {
            let t = remaining / seg;
            return (
                Coord {
                    x: p0.x + (p1.x - p0.x) * t,
                    y: p0.y + (p1.y - p0.y) * t,
                },
                i,
            );
        }
        remaining -= seg;
        p0 = p1;
    }
    (pts[1], 1)
}

/// Depths for a through cut: `step, 2*step, ...` with the last clamped to
/// `full_depth`. A non-positive step uses [`DEFAULT_STEPDOWN`].
pub fn stepdown_depths(full_depth: f64, step: f64) -> Vec<f64> {
    let step = if step > 0.0 { step } else { DEFAULT_STEPDOWN };
    let mut out = Vec::new();
    let mut d = 0.0;
    while d < full_depth - 1e-9 {
        d = (d + step).min(full_depth);
        out.push(d);
    }
    out
}
