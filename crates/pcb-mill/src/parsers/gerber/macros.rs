//! Aperture macro (`%AM`) definitions.
//!
//! The CAD exports this pipeline sees use macros almost exclusively for
//! rotated rectangular pads, so the evaluator covers the center-rectangle
//! primitive (code 21) with `$n` parameter substitution. Other primitives
//! are parsed and warned about; they contribute no geometry.

use std::collections::HashMap;

use geo::{Polygon, Rotate};
use log::warn;

use crate::geometry;

/// A term in a macro primitive: a literal value or a `$n` parameter slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MacroTerm {
    Literal(f64),
    Param(u32),
}

impl MacroTerm {
    fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(idx) = s.strip_prefix('$') {
            return idx.parse::<u32>().ok().map(MacroTerm::Param);
        }
        s.parse::<f64>().ok().map(MacroTerm::Literal)
    }

    /// Resolve against the parameter list from the `%AD` reference.
    /// `$1` is `params[0]`; out-of-range slots resolve to zero.
    pub fn eval(&self, params: &[f64]) -> f64 {
        match *self {
            MacroTerm::Literal(v) => v,
            MacroTerm::Param(0) => 0.0,
            MacroTerm::Param(n) => params.get(n as usize - 1).copied().unwrap_or(0.0),
        }
    }
}

/// A macro body primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroPrimitive {
    /// Code 21: rectangle centered on the flash point.
    /// Fields: width, height, rotation in degrees.
    CenterRect {
        width: MacroTerm,
        height: MacroTerm,
        rotation: MacroTerm,
    },
    /// Any other primitive code; kept so the warning can name it.
    Unsupported { code: u32 },
}

/// A parsed `%AM` definition.
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub primitives: Vec<MacroPrimitive>,
}

impl MacroDef {
    /// Evaluate the macro at a flash point with the `%AD` parameters.
    ///
    /// `scale` converts the file's length units to mm; the rotation
    /// parameter is angular and is not scaled.
    pub fn flash_shape(&self, x: f64, y: f64, params: &[f64], scale: f64) -> Option<Polygon<f64>> {
        for prim in &self.primitives {
            match prim {
                MacroPrimitive::CenterRect {
                    width,
                    height,
                    rotation,
                } => {
                    let w = width.eval(params) * scale;
                    let h = height.eval(params) * scale;
                    if w <= 0.0 || h <= 0.0 {
                        return None;
                    }
                    let rot = rotation.eval(params);
                    let rect = geometry::rect_centered(x, y, w, h);
                    if rot.abs() > 1e-9 {
                        return Some(rect.rotate_around_point(rot, geo::Point::new(x, y)));
                    }
                    return Some(rect);
                }
                MacroPrimitive::Unsupported { code } => {
                    warn!(
                        "macro '{}': primitive {code} is not supported; no geometry emitted",
                        self.name
                    );
                }
            }
        }
        None
    }
}

/// Parse the statements of a `%AM` body into primitives.
pub fn parse_macro_body(name: &str, body: &[String]) -> MacroDef {
    let mut primitives = Vec::new();

    for stmt in body {
        let fields: Vec<&str> = stmt.split(',').map(str::trim).collect();
        let Some(code) = fields.first().and_then(|f| f.parse::<u32>().ok()) else {
            // `$x=...` variable assignments and malformed statements.
            warn!("macro '{name}': skipping statement '{stmt}'");
            continue;
        };

        match code {
            21 => {
                // 21,exposure,width,height,centerx,centery,rotation
                let term = |idx: usize| fields.get(idx).copied().and_then(MacroTerm::parse);
                match (term(2), term(3)) {
                    (Some(width), Some(height)) => {
                        primitives.push(MacroPrimitive::CenterRect {
                            width,
                            height,
                            rotation: term(6).unwrap_or(MacroTerm::Literal(0.0)),
                        });
                    }
                    _ => warn!("macro '{name}': malformed center-rectangle: '{stmt}'"),
                }
            }
            0 => {} // comment primitive
            other => primitives.push(MacroPrimitive::Unsupported { code: other }),
        }
    }

    MacroDef {
        name: name.to_string(),
        primitives,
    }
}

/// Table of macro definitions keyed by name.
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: HashMap<String, MacroDef>,
}

impl MacroTable {
    pub fn define(&mut self, def: MacroDef) {
        self.macros.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, BoundingRect};

    fn center_rect_macro() -> MacroDef {
        parse_macro_body("RECT21", &["21,1,$1,$2,0,0,$3".to_string()])
    }

    #[test]
    fn test_parse_center_rect() {
        let def = center_rect_macro();
        assert_eq!(def.primitives.len(), 1);
        assert_eq!(
            def.primitives[0],
            MacroPrimitive::CenterRect {
                width: MacroTerm::Param(1),
                height: MacroTerm::Param(2),
                rotation: MacroTerm::Param(3),
            }
        );
    }

    #[test]
    fn test_flash_shape_unrotated() {
        let def = center_rect_macro();
        let poly = def.flash_shape(10.0, 5.0, &[2.0, 1.0, 0.0], 1.0).unwrap();
        let rect = poly.bounding_rect().unwrap();
        assert!((rect.min().x - 9.0).abs() < 1e-9);
        assert!((rect.max().x - 11.0).abs() < 1e-9);
        assert!((rect.min().y - 4.5).abs() < 1e-9);
        assert!((poly.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_flash_shape_rotated_preserves_area() {
        let def = center_rect_macro();
        let poly = def.flash_shape(0.0, 0.0, &[2.0, 1.0, 45.0], 1.0).unwrap();
        assert!((poly.unsigned_area() - 2.0).abs() < 1e-6);
        // A 45 degree rotation widens the bounding box beyond the rectangle.
        let rect = poly.bounding_rect().unwrap();
        assert!(rect.max().x - rect.min().x > 2.0);
    }

    #[test]
    fn test_inch_scale_applies_to_lengths_not_rotation() {
        let def = center_rect_macro();
        let poly = def
            .flash_shape(0.0, 0.0, &[0.1, 0.05, 90.0], 25.4)
            .unwrap();
        // 0.1in x 0.05in -> 2.54mm x 1.27mm, rotated 90 degrees.
        let rect = poly.bounding_rect().unwrap();
        assert!((rect.max().y - rect.min().y - 2.54).abs() < 1e-6);
        assert!((rect.max().x - rect.min().x - 1.27).abs() < 1e-6);
    }

    #[test]
    fn test_unsupported_primitive_yields_no_shape() {
        let def = parse_macro_body("THERM", &["7,0,0,1.0,0.8,0.2,45".to_string()]);
        assert_eq!(def.primitives, vec![MacroPrimitive::Unsupported { code: 7 }]);
        assert!(def.flash_shape(0.0, 0.0, &[], 1.0).is_none());
    }

    #[test]
    fn test_literal_dimensions() {
        let def = parse_macro_body("FIXED", &["21,1,1.5,0.5,0,0,0".to_string()]);
        let poly = def.flash_shape(0.0, 0.0, &[], 1.0).unwrap();
        assert!((poly.unsigned_area() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_table() {
        let mut table = MacroTable::default();
        table.define(center_rect_macro());
        assert!(table.get("RECT21").is_some());
        assert!(table.get("NOPE").is_none());
    }
}
