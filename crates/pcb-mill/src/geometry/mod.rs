//! Planar geometry kernel.
//!
//! Thin layer over `geo` (boolean ops, simplification, bounds) and `geo-buf`
//! (polygon inflate/deflate) plus the shape constructors the Gerber model
//! needs: disks, stadiums (obrounds), centered rectangles, and arc-length
//! path slicing. Everything is f64 millimeters.

pub mod order;

use geo::{
    coord, BooleanOps, BoundingRect, Coord, EuclideanLength, LineString, MultiPolygon, Polygon,
    Rect, Simplify,
};
use geo_buf::buffer_multi_polygon_rounded;
use log::warn;

use geo::Area;

/// Segment count for a discretized full circle.
pub const ARC_SEGMENTS: usize = 72;

/// Union a list of polygons into one (possibly multi-part) region.
pub fn union_all(polys: &[Polygon<f64>]) -> MultiPolygon<f64> {
    polys.iter().fold(MultiPolygon::new(Vec::new()), |acc, p| {
        acc.union(&MultiPolygon::new(vec![p.clone()]))
    })
}

/// Compose an image from polarity buckets: `union(dark) - union(clear)`.
pub fn compose(dark: &[Polygon<f64>], clear: &[Polygon<f64>]) -> MultiPolygon<f64> {
    let dark_u = union_all(dark);
    if clear.is_empty() {
        return dark_u;
    }
    dark_u.difference(&union_all(clear))
}

/// Offset a region by `distance` with rounded joins: positive grows,
/// negative shrinks. Empty in, empty out.
pub fn inflate(region: &MultiPolygon<f64>, distance: f64) -> MultiPolygon<f64> {
    if region.0.is_empty() {
        return MultiPolygon::new(Vec::new());
    }
    if distance.abs() < 1e-12 {
        return region.clone();
    }
    buffer_multi_polygon_rounded(region, distance)
}

/// Repair and reduce a polygonal region: topology-fixing union, vertex
/// simplification, and an area floor that drops slivers.
pub fn cleanup_polygons(
    region: &MultiPolygon<f64>,
    simplify_tol: f64,
    min_area: f64,
) -> MultiPolygon<f64> {
    let unioned = union_all(&region.0);
    let simplified = if simplify_tol > 0.0 {
        unioned.simplify(&simplify_tol)
    } else {
        unioned
    };
    MultiPolygon::new(
        simplified
            .0
            .into_iter()
            .filter(|p| p.unsigned_area() >= min_area)
            .collect(),
    )
}

/// Simplify open paths and drop the ones shorter than `min_length`.
pub fn cleanup_lines(
    lines: Vec<LineString<f64>>,
    simplify_tol: f64,
    min_length: f64,
) -> Vec<LineString<f64>> {
    lines
        .into_iter()
        .map(|ls| {
            if simplify_tol > 0.0 {
                ls.simplify(&simplify_tol)
            } else {
                ls
            }
        })
        .filter(|ls| ls.0.len() >= 2 && ls.euclidean_length() >= min_length)
        .collect()
}

/// All boundary rings of a region as closed line strings
/// (exteriors first, then interiors, in polygon order).
pub fn boundary_lines(region: &MultiPolygon<f64>) -> Vec<LineString<f64>> {
    let mut out = Vec::new();
    for poly in &region.0 {
        out.push(poly.exterior().clone());
        out.extend(poly.interiors().iter().cloned());
    }
    out
}

/// Bounding rectangle of a region, if non-empty.
pub fn bounds(region: &MultiPolygon<f64>) -> Option<Rect<f64>> {
    region.bounding_rect()
}

/// The largest polygon of a region by area. Board outlines should union
/// into a single part; when they don't, the dominant part wins and the
/// fragments are reported.
pub fn largest_polygon(region: &MultiPolygon<f64>) -> Option<Polygon<f64>> {
    if region.0.len() > 1 {
        warn!(
            "region has {} disjoint parts; keeping the largest",
            region.0.len()
        );
    }
    region
        .0
        .iter()
        .max_by(|a, b| {
            a.unsigned_area()
                .partial_cmp(&b.unsigned_area())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned()
}

/// Slice a line string between arc-length positions `d0..d1`.
/// Positions clamp to `[0, length]`; a degenerate window yields a
/// two-point zero-length string at the clamp position.
pub fn substring(ls: &LineString<f64>, d0: f64, d1: f64) -> LineString<f64> {
    let total = ls.euclidean_length();
    let d0 = d0.clamp(0.0, total);
    let d1 = d1.clamp(0.0, total);
    if d1 <= d0 {
        let p = point_at(ls, d0);
        return LineString::new(vec![p, p]);
    }

    let mut out: Vec<Coord<f64>> = vec![point_at(ls, d0)];
    let mut walked = 0.0;
    for seg in ls.0.windows(2) {
        let len = dist(seg[0], seg[1]);
        let seg_end = walked + len;
        if seg_end > d0 && seg_end < d1 && len > 1e-12 {
            out.push(seg[1]);
        }
        walked = seg_end;
        if walked >= d1 {
            break;
        }
    }
    out.push(point_at(ls, d1));
    LineString::new(out)
}

/// Point at arc-length `d` along a line string (clamped to the ends).
pub fn point_at(ls: &LineString<f64>, d: f64) -> Coord<f64> {
    let pts = &ls.0;
    if pts.is_empty() {
        return coord! { x: 0.0, y: 0.0 };
    }
    if d <= 0.0 {
        return pts[0];
    }
    let mut remaining = d;
    for seg in pts.windows(2) {
        let len = dist(seg[0], seg[1]);
        if len < 1e-12 {
            continue;
        }
        if remaining <= len {
            let t = remaining / len;
            return coord! {
                x: seg[0].x + (seg[1].x - seg[0].x) * t,
                y: seg[0].y + (seg[1].y - seg[0].y) * t,
            };
        }
        remaining -= len;
    }
    *pts.last().unwrap()
}

fn dist(a: Coord<f64>, b: Coord<f64>) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// A filled circle of the given diameter, discretized.
pub fn disk(cx: f64, cy: f64, diameter: f64) -> Polygon<f64> {
    let r = diameter / 2.0;
    let pts: Vec<Coord<f64>> = (0..ARC_SEGMENTS)
        .map(|i| {
            let a = std::f64::consts::TAU * i as f64 / ARC_SEGMENTS as f64;
            coord! { x: cx + r * a.cos(), y: cy + r * a.sin() }
        })
        .collect();
    Polygon::new(LineString::new(pts), Vec::new())
}

/// An axis-aligned rectangle centered at (cx, cy).
pub fn rect_centered(cx: f64, cy: f64, w: f64, h: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::new(vec![
            coord! { x: cx - w / 2.0, y: cy - h / 2.0 },
            coord! { x: cx + w / 2.0, y: cy - h / 2.0 },
            coord! { x: cx + w / 2.0, y: cy + h / 2.0 },
            coord! { x: cx - w / 2.0, y: cy + h / 2.0 },
        ]),
        Vec::new(),
    )
}

/// A stadium: the area swept by a circle of `width` diameter moving from
/// `a` to `b`. Degenerate segments collapse to a disk.
pub fn stadium(a: Coord<f64>, b: Coord<f64>, width: f64) -> Polygon<f64> {
    let r = width / 2.0;
    let len = dist(a, b);
    if len < 1e-12 {
        return disk(a.x, a.y, width);
    }

    let theta = (b.y - a.y).atan2(b.x - a.x);
    let half = std::f64::consts::PI;
    let steps = ARC_SEGMENTS / 2;

    let mut pts: Vec<Coord<f64>> = Vec::with_capacity(ARC_SEGMENTS + 2);
    // Cap around b, sweeping from -90 to +90 degrees relative to travel.
    for i in 0..=steps {
        let ang = theta - half / 2.0 + half * i as f64 / steps as f64;
        pts.push(coord! { x: b.x + r * ang.cos(), y: b.y + r * ang.sin() });
    }
    // Cap around a, continuing the sweep back.
    for i in 0..=steps {
        let ang = theta + half / 2.0 + half * i as f64 / steps as f64;
        pts.push(coord! { x: a.x + r * ang.cos(), y: a.y + r * ang.sin() });
    }
    Polygon::new(LineString::new(pts), Vec::new())
}

/// An oblong (stadium) pad centered at (cx, cy): a rectangle with
/// semicircular caps on the short sides.
pub fn oblong(cx: f64, cy: f64, w: f64, h: f64) -> Polygon<f64> {
    let r = w.min(h) / 2.0;
    let (a, b) = if w > h {
        (
            coord! { x: cx - (w / 2.0 - r), y: cy },
            coord! { x: cx + (w / 2.0 - r), y: cy },
        )
    } else {
        (
            coord! { x: cx, y: cy - (h / 2.0 - r) },
            coord! { x: cx, y: cy + (h / 2.0 - r) },
        )
    };
    stadium(a, b, 2.0 * r)
}

/// Closed ring of points on a circle, for milling passes.
pub fn circle_points(cx: f64, cy: f64, r: f64) -> Vec<Coord<f64>> {
    (0..=ARC_SEGMENTS)
        .map(|i| {
            let a = std::f64::consts::TAU * i as f64 / ARC_SEGMENTS as f64;
            coord! { x: cx + r * a.cos(), y: cy + r * a.sin() }
        })
        .collect()
}
