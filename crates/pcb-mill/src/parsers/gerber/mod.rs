//! Gerber RS-274X parsing: lexer → commands → interpreter.

pub mod apertures;
pub mod commands;
pub mod interpreter;
pub mod lexer;
pub mod macros;

use log::warn;

use crate::error::MillError;
use crate::geometry;

pub use commands::Units;
pub use interpreter::{Draw, Flash, ParsedGerber};

const MAX_REASONABLE_MM: f64 = 2000.0;
const MIN_REASONABLE_MM: f64 = 0.01;

/// Parse a Gerber file from its text content.
///
/// `file` names the source for diagnostics. With `strict`, parser warnings
/// become [`MillError::Parse`] errors; format-default and extents warnings
/// stay warnings either way, since they describe recoverable guesses.
pub fn parse_gerber(source: &str, file: &str, strict: bool) -> Result<ParsedGerber, MillError> {
    let tokens = lexer::tokenize(source);
    let cmds = commands::parse_commands(&tokens, file)?;
    let parsed = interpreter::interpret(&cmds, file, strict)?;

    if !parsed.saw_units {
        warn!("{file}: no explicit units (MOMM/MOIN); defaulted to mm");
    }
    if !parsed.saw_format {
        warn!("{file}: no FS format found; defaulted to L,A, X3.6 / Y3.6");
    }
    if parsed.apertures.is_empty() {
        warn!("{file}: no aperture definitions found");
    }

    // Extents sanity: implausible sizes almost always mean the format or
    // units guess was wrong, not that someone made a 3-meter PCB.
    let mut all: Vec<geo::Polygon<f64>> = parsed.dark.clone();
    all.extend(parsed.clear.iter().cloned());
    if let Some(rect) = geometry::bounds(&geo::MultiPolygon::new(all)) {
        let (w, h) = (rect.width(), rect.height());
        if w > MAX_REASONABLE_MM || h > MAX_REASONABLE_MM {
            warn!(
                "{file}: very large extents ({w:.1} x {h:.1} mm); check units/FS/zero suppression"
            );
        }
        if w < MIN_REASONABLE_MM || h < MIN_REASONABLE_MM {
            warn!(
                "{file}: very small extents ({w:.6} x {h:.6} mm); check units/FS/zero suppression"
            );
        }
    }

    Ok(parsed)
}
