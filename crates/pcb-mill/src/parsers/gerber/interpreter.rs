//! Gerber command execution.
//!
//! Walks the command stream with the usual modal state (format, units,
//! selected aperture, current point, polarity, region mode) and renders
//! flashes, draws and G36/G37 regions into dark/clear polygon buckets.
//! Raw flash and draw records are kept alongside the rendered geometry so
//! pad and track images can be composed later without re-interpreting.

use geo::{coord, Coord, MultiPolygon, Polygon};
use log::warn;

use crate::error::MillError;
use crate::geometry;
use crate::parsers::coord::{decode, CoordMode};

use super::apertures::ApertureTable;
use super::commands::{ApertureTemplate, FormatSpec, GerberCommand, Polarity, Units};
use super::macros::{parse_macro_body, MacroTable};

/// An aperture stamped at a point (D03).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flash {
    pub aperture: u32,
    pub x: f64,
    pub y: f64,
}

/// An aperture swept along a segment (D01).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Draw {
    pub aperture: u32,
    pub from: (f64, f64),
    pub to: (f64, f64),
}

/// Everything extracted from one Gerber file, in mm. Immutable after parse.
#[derive(Debug, Default)]
pub struct ParsedGerber {
    pub apertures: ApertureTable,
    pub macros: MacroTable,
    pub flashes: Vec<Flash>,
    pub draws: Vec<Draw>,
    /// Rendered shapes of all flashes, regardless of polarity.
    pub flash_shapes: Vec<Polygon<f64>>,
    /// Rendered swept shapes of all draws, regardless of polarity.
    pub draw_shapes: Vec<Polygon<f64>>,
    /// Additive image contributions.
    pub dark: Vec<Polygon<f64>>,
    /// Subtractive image contributions.
    pub clear: Vec<Polygon<f64>>,
    pub units: Units,
    pub format: FormatSpec,
    pub saw_units: bool,
    pub saw_format: bool,
}

impl ParsedGerber {
    /// The composed image: `union(dark) - union(clear)`.
    pub fn image(&self) -> MultiPolygon<f64> {
        geometry::compose(&self.dark, &self.clear)
    }

    /// The image restricted to flashed pads.
    pub fn pads(&self) -> MultiPolygon<f64> {
        use geo::BooleanOps;
        let flashes = geometry::union_all(&self.flash_shapes);
        self.image().intersection(&flashes)
    }

    /// The image restricted to swept draws (tracks).
    pub fn tracks(&self) -> MultiPolygon<f64> {
        use geo::BooleanOps;
        let draws = geometry::union_all(&self.draw_shapes);
        self.image().intersection(&draws)
    }
}

#[derive(Default)]
struct RegionState {
    contours: Vec<Vec<Coord<f64>>>,
    current: Vec<Coord<f64>>,
}

struct Interpreter<'a> {
    file: &'a str,
    strict: bool,
    out: ParsedGerber,
    current_aperture: Option<u32>,
    prev: Option<(f64, f64)>,
    polarity: Polarity,
    region: Option<RegionState>,
    warned_arcs: bool,
}

impl<'a> Interpreter<'a> {
    fn new(file: &'a str, strict: bool) -> Self {
        Self {
            file,
            strict,
            out: ParsedGerber::default(),
            current_aperture: None,
            prev: None,
            polarity: Polarity::Dark,
            region: None,
            warned_arcs: false,
        }
    }

    fn warn(&self, line: usize, msg: &str) -> Result<(), MillError> {
        warn!("{}:{}: {}", self.file, line, msg);
        if self.strict {
            return Err(MillError::parse(self.file, line, msg));
        }
        Ok(())
    }

    /// Decode an operation's coordinates. Missing fields are modal
    /// (absolute mode) or zero deltas (incremental mode).
    fn target(
        &self,
        x: &Option<String>,
        y: &Option<String>,
        line: usize,
    ) -> Result<(f64, f64), MillError> {
        let scale = self.out.units.scale();
        let fmt = &self.out.format;
        let (px, py) = self.prev.unwrap_or((0.0, 0.0));

        let field = |token: &Option<String>,
                         layout: &crate::parsers::coord::FixedFormat,
                         axis: char|
         -> Result<Option<f64>, MillError> {
            match token.as_deref() {
                None => Ok(None),
                Some(t) => match decode(t, layout) {
                    Some(v) => Ok(Some(v)),
                    None => {
                        self.warn(line, &format!("invalid {axis} coordinate '{t}'"))?;
                        Ok(None)
                    }
                },
            }
        };

        let dx = field(x, &fmt.x, 'X')?;
        let dy = field(y, &fmt.y, 'Y')?;

        Ok(match fmt.mode {
            CoordMode::Absolute => (
                dx.map(|v| v * scale).unwrap_or(px),
                dy.map(|v| v * scale).unwrap_or(py),
            ),
            CoordMode::Incremental => (
                px + dx.unwrap_or(0.0) * scale,
                py + dy.unwrap_or(0.0) * scale,
            ),
        })
    }

    fn bucket_mut(&mut self) -> &mut Vec<Polygon<f64>> {
        match self.polarity {
            Polarity::Dark => &mut self.out.dark,
            Polarity::Clear => &mut self.out.clear,
        }
    }

    fn process(&mut self, cmd: &GerberCommand, line: usize) -> Result<(), MillError> {
        match cmd {
            GerberCommand::FormatSpec(fs) => {
                self.out.format = *fs;
                self.out.saw_format = true;
            }
            GerberCommand::Units(units) => {
                self.out.units = *units;
                self.out.saw_units = true;
            }
            GerberCommand::ApertureDefine { code, template } => {
                self.define_aperture(*code, template, line)?;
            }
            GerberCommand::MacroDefine { name, body } => {
                self.out.macros.define(parse_macro_body(name, body));
            }
            GerberCommand::SelectAperture(code) => {
                self.current_aperture = Some(*code);
            }
            GerberCommand::Polarity(p) => {
                self.polarity = *p;
            }
            GerberCommand::RegionBegin => {
                self.region = Some(RegionState::default());
                self.prev = None;
            }
            GerberCommand::RegionEnd => {
                self.close_region();
            }
            GerberCommand::ArcMode => {
                if !self.warned_arcs {
                    self.warned_arcs = true;
                    self.warn(
                        line,
                        "circular interpolation (G02/G03) is not supported; segments treated as linear",
                    )?;
                }
            }
            GerberCommand::Move { x, y } => {
                let p = self.target(x, y, line)?;
                if let Some(region) = self.region.as_mut() {
                    // D02 closes the open contour and starts a new one here.
                    let pts = std::mem::take(&mut region.current);
                    if pts.len() >= 3 {
                        region.contours.push(pts);
                    }
                    region.current.push(coord! { x: p.0, y: p.1 });
                }
                self.prev = Some(p);
            }
            GerberCommand::Draw { x, y } => {
                let p = self.target(x, y, line)?;
                self.draw_to(p, line)?;
                self.prev = Some(p);
            }
            GerberCommand::Flash { x, y } => {
                let p = self.target(x, y, line)?;
                if self.region.is_none() {
                    self.flash_at(p, line)?;
                }
                self.prev = Some(p);
            }
            GerberCommand::EndOfFile => {}
        }
        Ok(())
    }

    /// Record an aperture definition, scaling length parameters to mm.
    fn define_aperture(
        &mut self,
        code: u32,
        template: &ApertureTemplate,
        line: usize,
    ) -> Result<(), MillError> {
        let scale = self.out.units.scale();
        let scaled = match template {
            ApertureTemplate::Circle { diameter } => ApertureTemplate::Circle {
                diameter: diameter * scale,
            },
            ApertureTemplate::Rect { w, h } => ApertureTemplate::Rect {
                w: w * scale,
                h: h * scale,
            },
            ApertureTemplate::Oblong { w, h } => ApertureTemplate::Oblong {
                w: w * scale,
                h: h * scale,
            },
            ApertureTemplate::Macro { name, params } => {
                // Macro parameters are scaled when the macro is evaluated,
                // because only the macro body knows which are lengths.
                if self.out.macros.get(name).is_none() {
                    self.warn(
                        line,
                        &format!("aperture D{code} references undefined macro '{name}'"),
                    )?;
                }
                ApertureTemplate::Macro {
                    name: name.clone(),
                    params: params.clone(),
                }
            }
        };
        self.out.apertures.define(code, scaled);
        Ok(())
    }

    fn draw_to(&mut self, p: (f64, f64), line: usize) -> Result<(), MillError> {
        if let Some(region) = self.region.as_mut() {
            region.current.push(coord! { x: p.0, y: p.1 });
            return Ok(());
        }

        let Some(prev) = self.prev else {
            // A draw with no current point has nothing to sweep.
            return Ok(());
        };
        let Some(code) = self.current_aperture else {
            self.warn(line, "draw (D01) with no aperture selected; skipped")?;
            return Ok(());
        };

        self.out.draws.push(Draw {
            aperture: code,
            from: prev,
            to: p,
        });

        if self.out.apertures.get(code).is_none() {
            self.warn(line, &format!("draw uses undefined aperture D{code}"))?;
            return Ok(());
        }

        // Macro apertures don't sweep; stroke_width is zero for them.
        let width = self.out.apertures.stroke_width(code);
        if width > 0.0 {
            let shape = geometry::stadium(
                coord! { x: prev.0, y: prev.1 },
                coord! { x: p.0, y: p.1 },
                width,
            );
            self.out.draw_shapes.push(shape.clone());
            self.bucket_mut().push(shape);
        }
        Ok(())
    }

    fn flash_at(&mut self, p: (f64, f64), line: usize) -> Result<(), MillError> {
        let Some(code) = self.current_aperture else {
            self.warn(line, "flash (D03) with no aperture selected; skipped")?;
            return Ok(());
        };

        self.out.flashes.push(Flash {
            aperture: code,
            x: p.0,
            y: p.1,
        });

        let Some(template) = self.out.apertures.get(code).cloned() else {
            self.warn(line, &format!("flash uses undefined aperture D{code}"))?;
            return Ok(());
        };

        let shape = match &template {
            ApertureTemplate::Circle { diameter } => Some(geometry::disk(p.0, p.1, *diameter)),
            ApertureTemplate::Rect { w, h } => Some(geometry::rect_centered(p.0, p.1, *w, *h)),
            ApertureTemplate::Oblong { w, h } => Some(geometry::oblong(p.0, p.1, *w, *h)),
            ApertureTemplate::Macro { name, params } => match self.out.macros.get(name) {
                Some(def) => def.flash_shape(p.0, p.1, params, self.out.units.scale()),
                None => {
                    self.warn(line, &format!("flash with unknown macro '{name}'"))?;
                    None
                }
            },
        };

        if let Some(shape) = shape {
            self.out.flash_shapes.push(shape.clone());
            self.bucket_mut().push(shape);
        }
        Ok(())
    }

    /// G37: close the open contour and union the region's contours into
    /// polygons under the current polarity.
    fn close_region(&mut self) {
        let Some(mut region) = self.region.take() else {
            return;
        };
        if region.current.len() >= 3 {
            region.contours.push(std::mem::take(&mut region.current));
        }

        let polys: Vec<Polygon<f64>> = region
            .contours
            .into_iter()
            .filter(|pts| pts.len() >= 3)
            .map(|pts| Polygon::new(geo::LineString::new(pts), Vec::new()))
            .collect();

        if !polys.is_empty() {
            let unioned = geometry::union_all(&polys);
            self.bucket_mut().extend(unioned.0);
        }
        self.prev = None;
    }
}

/// Execute a parsed command stream.
pub fn interpret(
    commands: &[(GerberCommand, usize)],
    file: &str,
    strict: bool,
) -> Result<ParsedGerber, MillError> {
    let mut interp = Interpreter::new(file, strict);
    for (cmd, line) in commands {
        interp.process(cmd, *line)?;
    }
    // An unterminated region still contributes what it accumulated.
    interp.close_region();
    Ok(interp.out)
}
