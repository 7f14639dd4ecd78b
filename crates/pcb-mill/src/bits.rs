//! Tool (bit) records and the bit library.
//!
//! Bits are described by free-form type strings in the library file
//! ("30deg V engraver", "0.8mm drill", "1mm flat endmill"); the string is
//! classified into a kind tag once at the parser boundary and only the tag
//! is consulted afterwards.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::config::JobConfig;
use crate::error::MillError;
use crate::ops::Operation;

/// Classified tool kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitKind {
    Drill,
    VBit,
    Mill,
    Unknown,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Bit {
    pub name: String,
    /// Free-form type string from the library ("drill", "v 30", "endmill").
    #[serde(rename = "type")]
    pub type_name: String,
    /// Cutting diameter in mm. For v-bits this is the target cut width.
    pub diameter: f64,
    /// Included tip angle in degrees; v-bits only, zero otherwise.
    pub angle: f64,
    pub flute_length: f64,
    /// XY feed, mm/min.
    pub feed_xy: f64,
    /// Plunge feed, mm/min.
    pub feed_z: f64,
    pub rpm: u32,
    /// Per-pass depth for through cuts; zero means use the default.
    pub stepdown: f64,
    /// Ramp entry length; zero falls back to the job setting.
    pub ramp_len: f64,
}

impl Default for Bit {
    fn default() -> Self {
        Self {
            name: String::new(),
            type_name: "unknown".into(),
            diameter: 0.0,
            angle: 0.0,
            flute_length: 0.0,
            feed_xy: 200.0,
            feed_z: 80.0,
            rpm: 12000,
            stepdown: 0.0,
            ramp_len: 0.0,
        }
    }
}

impl Bit {
    /// Classify the free-form type string.
    pub fn kind(&self) -> BitKind {
        let t = self.type_name.trim().to_lowercase();
        if t.contains("drill") {
            return BitKind::Drill;
        }
        if t.contains('v') || t.contains("engrave") || t.contains("conic") {
            return BitKind::VBit;
        }
        if t.contains("flat") || t.contains("end") || t.contains("mill") || t.contains("router") {
            return BitKind::Mill;
        }
        BitKind::Unknown
    }

    /// Whether this bit makes sense for an operation.
    pub fn suits(&self, op: Operation) -> bool {
        let kind = self.kind();
        match op {
            Operation::Drilling => kind == BitKind::Drill,
            Operation::BoardOutline | Operation::SoldermaskClear => kind == BitKind::Mill,
            Operation::CopperIsolation | Operation::Silkscreen => {
                kind == BitKind::VBit || kind == BitKind::Mill
            }
        }
    }

    /// Effective ramp length: the bit's own value, else the job setting.
    pub fn ramp_len_or(&self, cfg: &JobConfig) -> f64 {
        if self.ramp_len > 0.0 {
            self.ramp_len
        } else {
            cfg.ramp_len
        }
    }
}

/// Load a bit library: a JSON array of bit records.
pub fn load_bits(path: &Path) -> Result<Vec<Bit>, MillError> {
    let text = fs::read_to_string(path)
        .map_err(|_| MillError::Config(format!("cannot read bit library: {}", path.display())))?;
    let bits: Vec<Bit> = serde_json::from_str(&text)
        .map_err(|e| MillError::Config(format!("bad bit library: {e}")))?;
    Ok(bits)
}

/// Find a bit by name, or the first one suitable for `op`.
pub fn pick_bit<'a>(bits: &'a [Bit], name: Option<&str>, op: Operation) -> Option<&'a Bit> {
    match name {
        Some(name) => bits.iter().find(|b| b.name == name),
        None => bits.iter().find(|b| b.suits(op)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bit(name: &str, type_name: &str, diameter: f64) -> Bit {
        Bit {
            name: name.into(),
            type_name: type_name.into(),
            diameter,
            ..Bit::default()
        }
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(bit("d", "0.8mm drill", 0.8).kind(), BitKind::Drill);
        assert_eq!(bit("v", "V 30deg", 0.1).kind(), BitKind::VBit);
        assert_eq!(bit("e", "engraver", 0.1).kind(), BitKind::VBit);
        assert_eq!(bit("c", "conic", 0.1).kind(), BitKind::VBit);
        assert_eq!(bit("f", "flat", 1.0).kind(), BitKind::Mill);
        assert_eq!(bit("m", "endmill", 1.0).kind(), BitKind::Mill);
        assert_eq!(bit("r", "router", 2.0).kind(), BitKind::Mill);
        assert_eq!(bit("x", "???", 1.0).kind(), BitKind::Unknown);
    }

    #[test]
    fn test_drill_wins_over_v_substring() {
        // "drill" contains no 'v', but "v-drill" should classify as drill
        // because the drill check runs first.
        assert_eq!(bit("vd", "v-drill", 0.8).kind(), BitKind::Drill);
    }

    #[test]
    fn test_suitability() {
        let drill = bit("d", "drill", 0.8);
        let vbit = bit("v", "v 30", 0.1);
        let mill = bit("m", "endmill", 1.0);

        assert!(drill.suits(Operation::Drilling));
        assert!(!vbit.suits(Operation::Drilling));

        assert!(mill.suits(Operation::BoardOutline));
        assert!(!drill.suits(Operation::BoardOutline));

        assert!(vbit.suits(Operation::CopperIsolation));
        assert!(mill.suits(Operation::CopperIsolation));
        assert!(!drill.suits(Operation::Silkscreen));
    }

    #[test]
    fn test_ramp_len_fallback() {
        let mut cfg = JobConfig::default();
        cfg.ramp_len = 2.0;
        let mut b = bit("m", "endmill", 1.0);
        assert!((b.ramp_len_or(&cfg) - 2.0).abs() < 1e-12);
        b.ramp_len = 0.5;
        assert!((b.ramp_len_or(&cfg) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_pick_bit() {
        let bits = vec![
            bit("vee", "v 30", 0.1),
            bit("drill8", "drill", 0.8),
            bit("mill1", "endmill", 1.0),
        ];
        assert_eq!(
            pick_bit(&bits, Some("drill8"), Operation::Drilling).unwrap().name,
            "drill8"
        );
        assert_eq!(
            pick_bit(&bits, None, Operation::BoardOutline).unwrap().name,
            "mill1"
        );
        assert!(pick_bit(&bits, Some("nope"), Operation::Drilling).is_none());
    }

    #[test]
    fn test_library_json() {
        let bits: Vec<Bit> = serde_json::from_str(
            r#"[
                { "name": "v30", "type": "v-bit", "diameter": 0.1, "angle": 30.0 },
                { "name": "d08", "type": "drill", "diameter": 0.8, "feed_z": 60.0 }
            ]"#,
        )
        .unwrap();
        assert_eq!(bits.len(), 2);
        assert_eq!(bits[0].kind(), BitKind::VBit);
        assert!((bits[0].angle - 30.0).abs() < 1e-12);
        // Defaults fill unlisted fields.
        assert!((bits[1].feed_xy - 200.0).abs() < 1e-12);
        assert!((bits[1].feed_z - 60.0).abs() < 1e-12);
    }
}
