//! Layer file resolution and board assembly.
//!
//! The thin adapter between the filesystem and the core: it resolves the
//! canonical `<prefix><suffix>` layer files into text buffers, and turns
//! those buffers into an immutable [`Board`] of normalized geometry. Tests
//! construct [`LayerSources`] directly from string literals.

use std::fs;
use std::path::Path;

use geo::{coord, LineString, MultiPolygon, Translate};
use log::warn;

use crate::config::JobConfig;
use crate::error::MillError;
use crate::geometry;
use crate::parsers::excellon::{self, dedupe_holes, Hole, Slot};
use crate::parsers::gerber;

pub const TOP_COPPER_SUFFIX: &str = "-TopLayer.gbr";
pub const TOP_SILK_SUFFIX: &str = "-TopSilkLayer.gbr";
pub const OUTLINE_SUFFIX: &str = "-BoardOutLine.gbr";
pub const PTH_SUFFIX: &str = "-PTH.drl";
pub const NPTH_SUFFIX: &str = "-NPTH.drl";

/// Raw layer file contents, keyed by display name for diagnostics.
#[derive(Debug, Default)]
pub struct LayerSources {
    pub copper: (String, String),
    pub silk: Option<(String, String)>,
    pub outline: Option<(String, String)>,
    pub drills: Vec<(String, String)>,
}

/// Resolve and read the canonical layer files for `prefix` under `dir`.
///
/// Missing copper is fatal (nothing can be normalized without it); other
/// missing layers warn and are skipped. When neither drill file exists, any
/// `.drl`/`.txt` files in the directory are tried instead.
pub fn read_sources(dir: &Path, prefix: &str) -> Result<LayerSources, MillError> {
    let named = |suffix: &str| {
        let name = format!("{prefix}{suffix}");
        let path = dir.join(&name);
        (name, path)
    };

    let (copper_name, copper_path) = named(TOP_COPPER_SUFFIX);
    let copper = fs::read_to_string(&copper_path)
        .map_err(|_| MillError::MissingFile(copper_path.clone()))?;

    let read_optional = |suffix: &str| {
        let (name, path) = named(suffix);
        match fs::read_to_string(&path) {
            Ok(text) => Some((name, text)),
            Err(_) => {
                warn!("layer file not found: {}", path.display());
                None
            }
        }
    };

    let silk = read_optional(TOP_SILK_SUFFIX);
    let outline = read_optional(OUTLINE_SUFFIX);

    let mut drills = Vec::new();
    for suffix in [PTH_SUFFIX, NPTH_SUFFIX] {
        let (name, path) = named(suffix);
        if let Ok(text) = fs::read_to_string(&path) {
            drills.push((name, text));
        }
    }

    if drills.is_empty() {
        warn!("no drill files found for prefix '{prefix}' (-PTH.drl / -NPTH.drl); scanning directory");
        let mut candidates: Vec<_> = fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| {
                        matches!(
                            p.extension().and_then(|e| e.to_str()).map(str::to_lowercase),
                            Some(ext) if ext == "drl" || ext == "txt"
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        candidates.sort();
        for path in candidates {
            if let Ok(text) = fs::read_to_string(&path) {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                drills.push((name, text));
            }
        }
    }

    Ok(LayerSources {
        copper: (copper_name, copper),
        silk,
        outline,
        drills,
    })
}

/// Parsed, composed, normalized board geometry. All coordinates are mm
/// relative to the board origin (the minimum corner of the top copper
/// bounding box), so every layer registers. Immutable once built.
#[derive(Debug)]
pub struct Board {
    pub copper: MultiPolygon<f64>,
    pub pads: MultiPolygon<f64>,
    /// Track image of the outline layer (empty when the layer is missing).
    pub outline: MultiPolygon<f64>,
    /// Raw silkscreen draw centerlines.
    pub silk: Vec<LineString<f64>>,
    /// All deduplicated holes, small and large.
    pub holes: Vec<Hole>,
    pub slots: Vec<Slot>,
    /// The translation that was applied: the copper image's original
    /// minimum corner.
    pub origin: (f64, f64),
}

/// Parse all layer sources and assemble the normalized board.
pub fn build_board(
    sources: &LayerSources,
    cfg: &JobConfig,
    strict: bool,
) -> Result<Board, MillError> {
    let (copper_name, copper_text) = &sources.copper;
    let copper_parsed = gerber::parse_gerber(copper_text, copper_name, strict)?;
    let copper_image = copper_parsed.image();

    let Some(rect) = geometry::bounds(&copper_image) else {
        return Err(MillError::Geometry(format!(
            "{copper_name}: copper image is empty; cannot establish the board origin"
        )));
    };
    let origin = (rect.min().x, rect.min().y);
    let (dx, dy) = (-origin.0, -origin.1);

    let copper = copper_image.translate(dx, dy);
    let pads = copper_parsed.pads().translate(dx, dy);

    let outline = match &sources.outline {
        Some((name, text)) => gerber::parse_gerber(text, name, strict)?
            .tracks()
            .translate(dx, dy),
        None => MultiPolygon::new(Vec::new()),
    };

    let silk = match &sources.silk {
        Some((name, text)) => {
            let parsed = gerber::parse_gerber(text, name, strict)?;
            parsed
                .draws
                .iter()
                .map(|d| {
                    LineString::new(vec![
                        coord! { x: d.from.0 + dx, y: d.from.1 + dy },
                        coord! { x: d.to.0 + dx, y: d.to.1 + dy },
                    ])
                })
                .collect()
        }
        None => Vec::new(),
    };

    let mut holes = Vec::new();
    let mut slots = Vec::new();
    for (name, text) in &sources.drills {
        let parsed = excellon::parse_excellon(text, name, strict)?;
        holes.extend(parsed.all_holes());
        slots.extend(parsed.slots.iter().copied());
    }

    let holes = dedupe_holes(&holes, cfg.hole_dedupe_tol)
        .into_iter()
        .map(|h| Hole {
            x: h.x + dx,
            y: h.y + dy,
            diameter: h.diameter,
        })
        .collect();
    let slots = slots
        .into_iter()
        .map(|s| Slot {
            x1: s.x1 + dx,
            y1: s.y1 + dy,
            x2: s.x2 + dx,
            y2: s.y2 + dy,
            width: s.width,
        })
        .collect();

    Ok(Board {
        copper,
        pads,
        outline,
        silk,
        holes,
        slots,
        origin,
    })
}
