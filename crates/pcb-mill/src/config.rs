//! Job configuration: typed access to every tunable, with the documented
//! defaults. Settings load from a JSON file with a `job` section, so tests
//! and the front end can also build a [`JobConfig`] directly.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::MillError;

/// How small holes are covered by drills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrillMode {
    /// Plan a minimal drill set over all small holes.
    #[default]
    Multi,
    /// One drill for everything.
    Single,
    /// One drill for matching holes; mill the rest.
    #[serde(alias = "single+mill", alias = "single_mill")]
    SinglePlusMill,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Full through-cut depth in mm.
    pub pcb_thickness: f64,
    /// Copper layer thickness, the isolation depth basis.
    pub copper_thickness: f64,
    /// Holes at or above this diameter are milled instead of drilled.
    pub mill_holes_over: f64,
    /// Slack when matching a drill to a hole.
    pub hole_match_tol: f64,
    /// Radius within which duplicate hole records merge.
    pub hole_dedupe_tol: f64,
    pub drill_mode: DrillMode,
    /// Drill diameter used by the single-plus-mill mode.
    pub single_drill_diam: f64,
    /// Cap on distinct drill sizes in a plan.
    pub max_drills: usize,
    /// Leave partial-depth holding tabs on the outline cut.
    pub outline_tabs_enabled: bool,
    /// Number of isolation offset passes around copper.
    pub isolation_passes: u32,
    /// Engraving depth for soldermask clearing.
    pub soldermask_depth: f64,
    /// Engraving depth for silkscreen.
    pub silk_depth: f64,
    /// Retract height between cuts within an operation.
    pub safe_z: f64,
    /// Retract height between operations.
    pub travel_z: f64,
    /// Retract height for manual tool changes.
    pub toolchange_z: f64,
    pub park_x: f64,
    pub park_y: f64,
    /// Dwell after spindle start, seconds.
    pub spindle_warmup_s: f64,
    pub probe_on_start: bool,
    /// Raw G-code lines injected into the header probe block.
    pub probe_gcode: String,
    /// Ramp entry length in mm; zero plunges straight down.
    pub ramp_len: f64,
    pub geom_simplify_tol: f64,
    pub geom_min_area: f64,
    pub geom_min_length: f64,
    /// Apply nearest-neighbor path ordering.
    pub path_ordering: bool,
    /// Prefix prepended to output file names.
    pub file_prefix: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            pcb_thickness: 1.6,
            copper_thickness: 0.035,
            mill_holes_over: 1.2,
            hole_match_tol: 0.05,
            hole_dedupe_tol: 0.10,
            drill_mode: DrillMode::Multi,
            single_drill_diam: 0.8,
            max_drills: 3,
            outline_tabs_enabled: false,
            isolation_passes: 1,
            soldermask_depth: 0.01,
            silk_depth: 0.05,
            safe_z: 5.0,
            travel_z: 10.0,
            toolchange_z: 30.0,
            park_x: 0.0,
            park_y: 0.0,
            spindle_warmup_s: 0.0,
            probe_on_start: false,
            probe_gcode: String::new(),
            ramp_len: 0.0,
            geom_simplify_tol: 0.0005,
            geom_min_area: 1e-8,
            geom_min_length: 1e-5,
            path_ordering: true,
            file_prefix: String::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Settings {
    #[serde(default)]
    job: JobConfig,
}

impl JobConfig {
    /// Load from a JSON settings file: `{ "job": { ... } }`.
    /// Unknown keys are ignored; missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, MillError> {
        let text = fs::read_to_string(path)
            .map_err(|_| MillError::Config(format!("cannot read settings: {}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, MillError> {
        let settings: Settings = serde_json::from_str(text)
            .map_err(|e| MillError::Config(format!("bad settings file: {e}")))?;
        Ok(settings.job)
    }

    /// The sanitized output prefix: non `[A-Za-z0-9_-]` characters dropped,
    /// with a separator appended when the prefix doesn't end in one.
    pub fn output_prefix(&self) -> String {
        let mut p: String = self
            .file_prefix
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if p.is_empty() {
            return p;
        }
        if !p.ends_with('_') && !p.ends_with('-') {
            p.push('_');
        }
        p
    }

    /// Output file name for one `.nc` artifact.
    pub fn output_name(&self, base: &str) -> String {
        format!("{}{}", self.output_prefix(), base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documentation() {
        let cfg = JobConfig::default();
        assert!((cfg.pcb_thickness - 1.6).abs() < 1e-12);
        assert!((cfg.copper_thickness - 0.035).abs() < 1e-12);
        assert!((cfg.mill_holes_over - 1.2).abs() < 1e-12);
        assert!((cfg.hole_match_tol - 0.05).abs() < 1e-12);
        assert!((cfg.hole_dedupe_tol - 0.10).abs() < 1e-12);
        assert_eq!(cfg.drill_mode, DrillMode::Multi);
        assert!((cfg.safe_z - 5.0).abs() < 1e-12);
        assert!((cfg.travel_z - 10.0).abs() < 1e-12);
        assert!((cfg.toolchange_z - 30.0).abs() < 1e-12);
        assert!(!cfg.outline_tabs_enabled);
        assert!(cfg.path_ordering);
        assert!(cfg.file_prefix.is_empty());
    }

    #[test]
    fn test_partial_settings_overlay_defaults() {
        let cfg = JobConfig::from_json(
            r#"{ "job": { "pcb_thickness": 1.0, "drill_mode": "single_plus_mill" } }"#,
        )
        .unwrap();
        assert!((cfg.pcb_thickness - 1.0).abs() < 1e-12);
        assert_eq!(cfg.drill_mode, DrillMode::SinglePlusMill);
        // Untouched keys keep their defaults.
        assert!((cfg.safe_z - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_settings() {
        let cfg = JobConfig::from_json("{}").unwrap();
        assert!((cfg.travel_z - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_drill_mode_aliases() {
        let cfg =
            JobConfig::from_json(r#"{ "job": { "drill_mode": "single+mill" } }"#).unwrap();
        assert_eq!(cfg.drill_mode, DrillMode::SinglePlusMill);
    }

    #[test]
    fn test_output_prefix_normalization() {
        let mut cfg = JobConfig::default();
        assert_eq!(cfg.output_prefix(), "");

        cfg.file_prefix = "my board!".into();
        assert_eq!(cfg.output_prefix(), "myboard_");
        assert_eq!(cfg.output_name("all.nc"), "myboard_all.nc");

        cfg.file_prefix = "rev-a-".into();
        assert_eq!(cfg.output_prefix(), "rev-a-");
    }

    #[test]
    fn test_bad_json_is_config_error() {
        assert!(matches!(
            JobConfig::from_json("not json"),
            Err(MillError::Config(_))
        ));
    }
}
