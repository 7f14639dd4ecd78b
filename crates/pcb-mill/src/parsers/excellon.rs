//! Excellon (DRL) drill file parser.
//!
//! Line-oriented state machine producing per-tool round-hole hits and a flat
//! slot list. Slots come from two sources: explicit `G85` primitives and
//! route-mode chains (`M15` plunge .. `M16` retract), where consecutive XY
//! positions under the current tool become segments of width = tool diameter.

use std::collections::{BTreeMap, HashMap};

use log::warn;

use crate::error::MillError;
use crate::parsers::coord::{decode, FixedFormat, ZeroSuppression};

const MAX_REASONABLE_MM: f64 = 2000.0;
const MIN_REASONABLE_MM: f64 = 0.01;

/// Units declared in the drill file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrillUnits {
    Millimeters,
    Inches,
}

impl DrillUnits {
    fn scale(self) -> f64 {
        match self {
            DrillUnits::Millimeters => 1.0,
            DrillUnits::Inches => 25.4,
        }
    }
}

/// A round hole hit, in mm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hole {
    pub x: f64,
    pub y: f64,
    pub diameter: f64,
}

/// A routed or G85 slot: a segment swept by a round tool, in mm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub width: f64,
}

/// A tool definition with the hits recorded under it.
#[derive(Debug, Clone)]
pub struct DrillTool {
    pub diameter: f64,
    pub hits: Vec<(f64, f64)>,
}

/// Parsed contents of one Excellon file. Immutable once returned.
#[derive(Debug, Default)]
pub struct ExcellonFile {
    /// Tools keyed by number; BTreeMap so per-tool iteration is deterministic.
    pub tools: BTreeMap<u32, DrillTool>,
    pub slots: Vec<Slot>,
    pub units: Option<DrillUnits>,
}

impl ExcellonFile {
    /// Flatten all hits into `(x, y, diameter)` hole records.
    pub fn all_holes(&self) -> Vec<Hole> {
        let mut out = Vec::new();
        for tool in self.tools.values() {
            for &(x, y) in &tool.hits {
                out.push(Hole {
                    x,
                    y,
                    diameter: tool.diameter,
                });
            }
        }
        out
    }
}

struct Parser<'a> {
    file: &'a str,
    strict: bool,
    units: DrillUnits,
    saw_units: bool,
    fmt: FixedFormat,
    out: ExcellonFile,
    current_tool: Option<u32>,
    route_mode: bool,
    last_route_xy: Option<(f64, f64)>,
    bounds_pts: Vec<(f64, f64)>,
}

impl<'a> Parser<'a> {
    fn new(file: &'a str, strict: bool) -> Self {
        Self {
            file,
            strict,
            units: DrillUnits::Millimeters,
            saw_units: false,
            // Default 3:3 with leading-zero suppression, overridable by the
            // header or a ;FILE_FORMAT comment.
            fmt: FixedFormat::new(3, 3, ZeroSuppression::Leading),
            out: ExcellonFile::default(),
            current_tool: None,
            route_mode: false,
            last_route_xy: None,
            bounds_pts: Vec::new(),
        }
    }

    fn warn(&self, line_no: usize, msg: &str) -> Result<(), MillError> {
        warn!("{}:{}: {}", self.file, line_no, msg);
        if self.strict {
            return Err(MillError::parse(self.file, line_no, msg));
        }
        Ok(())
    }

    fn warn_file(&self, msg: &str) {
        warn!("{}: {}", self.file, msg);
    }

    fn line(&mut self, line_no: usize, raw: &str) -> Result<(), MillError> {
        let line = raw.trim();
        if line.is_empty() {
            return Ok(());
        }

        // Comment lines may still carry a FILE_FORMAT hint.
        if let Some(comment) = line.strip_prefix(';') {
            self.file_format_hint(line_no, comment)?;
            return Ok(());
        }

        let upper = line.to_uppercase();

        // Units + zero suppression header: METRIC / INCH / METRIC,LZ / INCH,TZ ...
        if upper.starts_with("METRIC") || upper == "M71" {
            self.units = DrillUnits::Millimeters;
            self.saw_units = true;
            self.zero_suppression_options(&upper);
            return Ok(());
        }
        if upper.starts_with("INCH") || upper == "M72" {
            self.units = DrillUnits::Inches;
            self.saw_units = true;
            self.zero_suppression_options(&upper);
            return Ok(());
        }

        // Route mode markers.
        if upper.starts_with("M15") {
            self.route_mode = true;
            return Ok(());
        }
        if upper.starts_with("M16") {
            self.route_mode = false;
            self.last_route_xy = None;
            return Ok(());
        }

        // Tool definition: T01C0.800 or T01D0.031 (some exporters).
        if let Some(rest) = upper.strip_prefix('T') {
            if let Some(sep) = rest.find(['C', 'D']) {
                let (num_str, diam_str) = (&rest[..sep], &rest[sep + 1..]);
                match (num_str.parse::<u32>(), diam_str.parse::<f64>()) {
                    (Ok(num), Ok(diam)) => {
                        self.out.tools.insert(
                            num,
                            DrillTool {
                                diameter: diam * self.units.scale(),
                                hits: Vec::new(),
                            },
                        );
                    }
                    _ => self.warn(line_no, &format!("invalid tool definition: {line}"))?,
                }
                return Ok(());
            }

            // Tool selection: T01 with no diameter parameter.
            let num_str: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !num_str.is_empty() && num_str.len() == rest.len() {
                let num: u32 = num_str.parse().unwrap_or(0);
                if !self.out.tools.contains_key(&num) {
                    self.warn(
                        line_no,
                        &format!("tool T{num} selected before/without definition"),
                    )?;
                }
                self.current_tool = Some(num);
                self.last_route_xy = None;
                return Ok(());
            }
        }

        // Coordinate lines, including route moves with G-code prefixes
        // (KiCad writes G00X..Y.. / G01X..Y.. inside M15/M16 blocks).
        let mut body = upper.as_str();
        while let Some(rest) = body.strip_prefix('G') {
            let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
            if digits == 0 {
                break;
            }
            body = &rest[digits..];
        }
        if body.starts_with('X') || body.starts_with('Y') {
            return self.coordinate_line(line_no, body);
        }

        // Remaining directives (M48, %, G90, FMAT, M30, ...) carry no geometry.
        Ok(())
    }

    /// `;FILE_FORMAT=i:d` comment (seen in LibrePCB / JLC exports).
    fn file_format_hint(&mut self, line_no: usize, comment: &str) -> Result<(), MillError> {
        let upper = comment.to_uppercase();
        let Some(pos) = upper.find("FILE_FORMAT") else {
            return Ok(());
        };
        let Some(eq) = upper[pos..].find('=') else {
            return Ok(());
        };
        let spec = upper[pos + eq + 1..].trim();
        let mut parts = spec.splitn(2, ':');
        let ints = parts.next().map(str::trim).unwrap_or("");
        let decs = parts.next().map(str::trim).unwrap_or("");
        match (ints.parse::<u8>(), decs.parse::<u8>()) {
            (Ok(i), Ok(d)) => {
                self.fmt.integer = i;
                self.fmt.decimal = d;
                Ok(())
            }
            _ => self.warn(line_no, &format!("bad FILE_FORMAT comment: {comment}")),
        }
    }

    /// Pick LZ/TZ out of a comma-separated units header.
    fn zero_suppression_options(&mut self, upper: &str) {
        for part in upper.split(',').map(str::trim) {
            match part {
                "LZ" => self.fmt.zero = ZeroSuppression::Leading,
                "TZ" => self.fmt.zero = ZeroSuppression::Trailing,
                _ => {
                    // A digit template like 000.000 also fixes the format.
                    if part.contains('.') && part.chars().all(|c| c == '0' || c == '.') {
                        if let Some(dot) = part.find('.') {
                            let ints = dot as u8;
                            let decs = (part.len() - dot - 1) as u8;
                            if ints > 0 && decs > 0 {
                                self.fmt.integer = ints;
                                self.fmt.decimal = decs;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Hole hit, slot endpoint, or G85 slot primitive.
    fn coordinate_line(&mut self, line_no: usize, upper: &str) -> Result<(), MillError> {
        let Some(tool_num) = self.current_tool else {
            self.warn(line_no, "coordinate before any tool selection; dropped")?;
            return Ok(());
        };
        if !self.out.tools.contains_key(&tool_num) {
            self.warn(
                line_no,
                &format!("coordinate uses undefined tool T{tool_num}; dropping hit"),
            )?;
            return Ok(());
        }

        // G85 slot: X..Y..G85X..Y..
        if let Some(g85) = upper.find("G85") {
            let (head, tail) = (&upper[..g85], &upper[g85 + 3..]);
            match (self.parse_xy(head), self.parse_xy(tail)) {
                (Some((x1, y1)), Some((x2, y2))) => {
                    let width = self.out.tools[&tool_num].diameter;
                    self.out.slots.push(Slot {
                        x1,
                        y1,
                        x2,
                        y2,
                        width,
                    });
                    self.bounds_pts.push((x1, y1));
                    self.bounds_pts.push((x2, y2));
                }
                _ => self.warn(line_no, &format!("bad G85 slot: {upper}"))?,
            }
            return Ok(());
        }

        let Some((x, y)) = self.parse_xy(upper) else {
            self.warn(line_no, &format!("bad coordinate line: {upper}"))?;
            return Ok(());
        };

        if self.route_mode {
            // Between M15 and M16 consecutive positions chain into slots.
            if let Some((px, py)) = self.last_route_xy {
                let width = self.out.tools[&tool_num].diameter;
                self.out.slots.push(Slot {
                    x1: px,
                    y1: py,
                    x2: x,
                    y2: y,
                    width,
                });
            }
            self.last_route_xy = Some((x, y));
        } else if let Some(tool) = self.out.tools.get_mut(&tool_num) {
            tool.hits.push((x, y));
        }

        self.bounds_pts.push((x, y));
        Ok(())
    }

    /// Extract X and Y fields from a coordinate line and decode to mm.
    fn parse_xy(&self, s: &str) -> Option<(f64, f64)> {
        let mut x_tok: Option<&str> = None;
        let mut y_tok: Option<&str> = None;

        let bytes = s.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'X' | b'Y' => {
                    let start = i + 1;
                    let mut end = start;
                    while end < bytes.len() && !bytes[end].is_ascii_uppercase() {
                        end += 1;
                    }
                    if bytes[i] == b'X' {
                        x_tok = Some(&s[start..end]);
                    } else {
                        y_tok = Some(&s[start..end]);
                    }
                    i = end;
                }
                _ => i += 1,
            }
        }

        let scale = self.units.scale();
        let x = decode(x_tok?, &self.fmt)? * scale;
        let y = decode(y_tok?, &self.fmt)? * scale;
        Some((x, y))
    }

    fn finish(mut self) -> Result<ExcellonFile, MillError> {
        if !self.saw_units {
            self.warn_file("no explicit units; defaulted to mm");
        }
        if self.out.tools.is_empty() {
            self.warn_file("no tool definitions found (TxxC...)");
        }

        // Extents sanity: a grossly large or tiny board usually means the
        // units or zero-suppression guess was wrong.
        if !self.bounds_pts.is_empty() {
            let (mut minx, mut miny) = (f64::INFINITY, f64::INFINITY);
            let (mut maxx, mut maxy) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
            for &(x, y) in &self.bounds_pts {
                minx = minx.min(x);
                miny = miny.min(y);
                maxx = maxx.max(x);
                maxy = maxy.max(y);
            }
            let (w, h) = (maxx - minx, maxy - miny);
            if w > MAX_REASONABLE_MM || h > MAX_REASONABLE_MM {
                self.warn_file(&format!(
                    "very large extents ({w:.1} x {h:.1} mm); check units/format/zero suppression"
                ));
            }
            if w < MIN_REASONABLE_MM || h < MIN_REASONABLE_MM {
                self.warn_file(&format!(
                    "very small extents ({w:.6} x {h:.6} mm); check units/format/zero suppression"
                ));
            }
        }

        self.out.units = Some(self.units).filter(|_| self.saw_units);
        Ok(self.out)
    }
}

/// Parse an Excellon drill file from its text content.
///
/// `file` names the source for diagnostics. With `strict`, warnings become
/// [`MillError::Parse`] errors; otherwise the parser warns and continues.
pub fn parse_excellon(source: &str, file: &str, strict: bool) -> Result<ExcellonFile, MillError> {
    let mut parser = Parser::new(file, strict);
    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();
        if trimmed == "M30" || trimmed == "M00" {
            break;
        }
        parser.line(line_no, raw)?;
    }
    parser.finish()
}

/// Merge holes closer than `tol` (euclidean), keeping one hole per location
/// with the largest diameter. When a larger hit displaces a smaller one, the
/// kept record takes the larger hole's center as well as its diameter.
pub fn dedupe_holes(holes: &[Hole], tol: f64) -> Vec<Hole> {
    if holes.is_empty() {
        return Vec::new();
    }

    if tol <= 0.0 {
        // Exact-location dedupe on a rounded key.
        let mut best: HashMap<(i64, i64), Hole> = HashMap::new();
        let mut order: Vec<(i64, i64)> = Vec::new();
        for &h in holes {
            let key = ((h.x * 1e6).round() as i64, (h.y * 1e6).round() as i64);
            match best.get_mut(&key) {
                Some(existing) => {
                    if h.diameter > existing.diameter {
                        *existing = h;
                    }
                }
                None => {
                    best.insert(key, h);
                    order.push(key);
                }
            }
        }
        return order.into_iter().map(|k| best[&k]).collect();
    }

    // Spatial hash with cell size = tol; candidates can only live in the
    // 3x3 neighborhood of a hit's cell.
    let inv = 1.0 / tol;
    let r2 = tol * tol;
    let cell = |x: f64, y: f64| ((x * inv).round() as i64, (y * inv).round() as i64);

    let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    let mut out: Vec<Hole> = Vec::new();

    for &h in holes {
        let (ix, iy) = cell(h.x, h.y);

        let mut found = None;
        'search: for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(bucket) = grid.get(&(ix + dx, iy + dy)) else {
                    continue;
                };
                for &idx in bucket {
                    let existing = out[idx];
                    let ddx = h.x - existing.x;
                    let ddy = h.y - existing.y;
                    if ddx * ddx + ddy * ddy <= r2 {
                        found = Some(idx);
                        break 'search;
                    }
                }
            }
        }

        match found {
            Some(idx) => {
                if h.diameter > out[idx].diameter {
                    out[idx] = h;
                }
            }
            None => {
                out.push(h);
                grid.entry((ix, iy)).or_default().push(out.len() - 1);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_metric() {
        let content = "\
M48
METRIC,TZ,000.000
T01C0.300
T02C0.800
%
T01
X14.478Y10.541
X14.478Y12.191
T02
X15.000Y10.000
M30
";
        let ex = parse_excellon(content, "test.drl", false).unwrap();
        let holes = ex.all_holes();
        assert_eq!(holes.len(), 3);
        assert!((holes[0].x - 14.478).abs() < 1e-6);
        assert!((holes[0].diameter - 0.3).abs() < 1e-6);
        assert!((holes[2].diameter - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_inch_units_scaled() {
        let content = "\
M48
INCH,LZ
T01C0.010
%
T01
X1.000Y1.000
M30
";
        let ex = parse_excellon(content, "test.drl", false).unwrap();
        let holes = ex.all_holes();
        assert_eq!(holes.len(), 1);
        assert!((holes[0].x - 25.4).abs() < 1e-3);
        assert!((holes[0].diameter - 0.254).abs() < 1e-3);
    }

    #[test]
    fn test_fixed_point_leading_suppression() {
        let content = "\
M48
METRIC,LZ,000.000
T01C0.500
%
T01
X14478Y10541
M30
";
        let ex = parse_excellon(content, "test.drl", false).unwrap();
        let holes = ex.all_holes();
        assert!((holes[0].x - 14.478).abs() < 1e-3);
        assert!((holes[0].y - 10.541).abs() < 1e-3);
    }

    #[test]
    fn test_fixed_point_trailing_suppression() {
        let content = "\
M48
METRIC,TZ
T01C0.500
%
T01
X14478Y10541
M30
";
        // TZ: pad right. "14478" -> "144780" -> 144.780
        let ex = parse_excellon(content, "test.drl", false).unwrap();
        let holes = ex.all_holes();
        assert!((holes[0].x - 144.78).abs() < 1e-3);
    }

    #[test]
    fn test_file_format_comment_overrides() {
        let content = "\
M48
;FILE_FORMAT=2:4
METRIC,LZ
T01C0.500
%
T01
X123456Y123456
M30
";
        // 2:4 -> 12.3456
        let ex = parse_excellon(content, "test.drl", false).unwrap();
        let holes = ex.all_holes();
        assert!((holes[0].x - 12.3456).abs() < 1e-6);
    }

    #[test]
    fn test_g85_slot() {
        let content = "\
M48
METRIC,LZ
T01C1.000
%
T01
X10.0Y10.0G85X20.0Y10.0
M30
";
        let ex = parse_excellon(content, "test.drl", false).unwrap();
        assert!(ex.all_holes().is_empty());
        assert_eq!(ex.slots.len(), 1);
        let s = ex.slots[0];
        assert!((s.x1 - 10.0).abs() < 1e-9 && (s.x2 - 20.0).abs() < 1e-9);
        assert!((s.width - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_route_mode_chain() {
        let content = "\
M48
METRIC,LZ
T01C2.000
%
T01
M15
X0.0Y0.0
X5.0Y0.0
X5.0Y5.0
M16
X9.0Y9.0
M30
";
        let ex = parse_excellon(content, "test.drl", false).unwrap();
        // Three route points -> two slot segments; the hit after M16 is a hole.
        assert_eq!(ex.slots.len(), 2);
        assert!((ex.slots[0].x2 - 5.0).abs() < 1e-9);
        assert!((ex.slots[1].y2 - 5.0).abs() < 1e-9);
        assert!((ex.slots[0].width - 2.0).abs() < 1e-9);
        assert_eq!(ex.all_holes().len(), 1);
    }

    #[test]
    fn test_route_mode_with_g_prefixes() {
        let content = "\
M48
METRIC,LZ
T01C1.500
%
T01
X10.0Y10.0
M15
G01X20.0Y10.0
M16
M30
";
        // KiCad-style slot: the pre-plunge position is a hole hit, the G01
        // move inside M15/M16 is the only chained point, so no segment yet.
        let ex = parse_excellon(content, "test.drl", false).unwrap();
        assert_eq!(ex.all_holes().len(), 1);
        assert!(ex.slots.is_empty());

        let content2 = "\
M48
METRIC,LZ
T01C1.500
%
T01
M15
G00X10.0Y10.0
G01X20.0Y10.0
M16
M30
";
        let ex2 = parse_excellon(content2, "test.drl", false).unwrap();
        assert_eq!(ex2.slots.len(), 1);
        assert!((ex2.slots[0].x1 - 10.0).abs() < 1e-9);
        assert!((ex2.slots[0].x2 - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_undefined_tool_drops_hit() {
        let content = "\
M48
METRIC,LZ
T01C0.500
%
T09
X1.0Y1.0
M30
";
        let ex = parse_excellon(content, "test.drl", false).unwrap();
        assert!(ex.all_holes().is_empty());
    }

    #[test]
    fn test_strict_mode_fails_fast() {
        let content = "\
M48
METRIC,LZ
T01C0.500
%
T09
X1.0Y1.0
M30
";
        let err = parse_excellon(content, "test.drl", true).unwrap_err();
        assert!(matches!(err, MillError::Parse { .. }));
    }

    #[test]
    fn test_m71_sets_metric() {
        let content = "\
M48
M71
T01C0.500
%
T01
X10.000Y20.000
M30
";
        let ex = parse_excellon(content, "test.drl", false).unwrap();
        let holes = ex.all_holes();
        assert!((holes[0].x - 10.0).abs() < 1e-6);
        assert!((holes[0].y - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_dedupe_keeps_largest_and_its_center() {
        let holes = [
            Hole {
                x: 0.0,
                y: 0.0,
                diameter: 0.6,
            },
            Hole {
                x: 0.02,
                y: 0.0,
                diameter: 1.0,
            },
            Hole {
                x: 0.04,
                y: 0.0,
                diameter: 0.8,
            },
        ];
        let out = dedupe_holes(&holes, 0.05);
        assert_eq!(out.len(), 1);
        assert!((out[0].x - 0.02).abs() < 1e-9);
        assert!((out[0].diameter - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_dedupe_properties() {
        let holes = [
            Hole {
                x: 0.0,
                y: 0.0,
                diameter: 0.5,
            },
            Hole {
                x: 5.0,
                y: 5.0,
                diameter: 0.5,
            },
            Hole {
                x: 5.03,
                y: 5.0,
                diameter: 0.7,
            },
            Hole {
                x: 10.0,
                y: 0.0,
                diameter: 1.1,
            },
        ];
        let out = dedupe_holes(&holes, 0.1);
        assert_eq!(out.len(), 3);
        // Survivors are pairwise farther apart than tol.
        for i in 0..out.len() {
            for j in i + 1..out.len() {
                let dx = out[i].x - out[j].x;
                let dy = out[i].y - out[j].y;
                assert!((dx * dx + dy * dy).sqrt() > 0.1);
            }
        }
        // Every survivor matches an input hole exactly.
        for h in &out {
            assert!(holes.iter().any(|i| (i.x - h.x).abs() < 1e-12
                && (i.y - h.y).abs() < 1e-12
                && (i.diameter - h.diameter).abs() < 1e-12));
        }
    }

    #[test]
    fn test_dedupe_zero_tolerance() {
        let holes = [
            Hole {
                x: 1.0,
                y: 1.0,
                diameter: 0.5,
            },
            Hole {
                x: 1.0,
                y: 1.0,
                diameter: 0.9,
            },
            Hole {
                x: 1.0001,
                y: 1.0,
                diameter: 0.3,
            },
        ];
        let out = dedupe_holes(&holes, 0.0);
        assert_eq!(out.len(), 2);
        assert!((out[0].diameter - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_tool_definition_with_d_separator() {
        let content = "\
M48
INCH
T01D0.031
%
T01
X1.0Y1.0
M30
";
        let ex = parse_excellon(content, "test.drl", false).unwrap();
        let holes = ex.all_holes();
        assert!((holes[0].diameter - 0.7874).abs() < 1e-3);
    }
}
