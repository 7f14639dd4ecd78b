//! Travel-reducing path ordering.
//!
//! Greedy nearest-neighbor: at every step take the unplaced path whose start
//! or end lies closest to the cursor, reversing the path when its end is the
//! closer endpoint. First-seen wins on ties, so output order is deterministic.
//! O(n^2) in path count, which is fine at board scale; this is deliberately
//! not a TSP solver.

use geo::{Coord, LineString};

fn d2(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Order open polylines from `start`, reversing where that shortens travel.
pub fn order_lines(
    lines: Vec<LineString<f64>>,
    start: Coord<f64>,
    allow_reverse: bool,
) -> Vec<LineString<f64>> {
    let mut remaining: Vec<LineString<f64>> =
        lines.into_iter().filter(|ls| ls.0.len() >= 2).collect();
    let mut ordered = Vec::with_capacity(remaining.len());
    let mut cursor = start;

    while !remaining.is_empty() {
        let mut best_i = 0;
        let mut best_flip = false;
        let mut best_d = f64::INFINITY;

        for (i, ls) in remaining.iter().enumerate() {
            let s = ls.0[0];
            let e = *ls.0.last().unwrap();

            let ds = d2(cursor, s);
            if ds < best_d {
                best_d = ds;
                best_i = i;
                best_flip = false;
            }
            if allow_reverse {
                let de = d2(cursor, e);
                if de < best_d {
                    best_d = de;
                    best_i = i;
                    best_flip = true;
                }
            }
        }

        let mut pick = remaining.remove(best_i);
        if best_flip {
            pick.0.reverse();
        }
        cursor = *pick.0.last().unwrap();
        ordered.push(pick);
    }

    ordered
}

/// Order bare points (drill hits) from `start` by nearest neighbor.
pub fn order_points(points: Vec<Coord<f64>>, start: Coord<f64>) -> Vec<Coord<f64>> {
    let mut remaining = points;
    let mut ordered = Vec::with_capacity(remaining.len());
    let mut cursor = start;

    while !remaining.is_empty() {
        let mut best_i = 0;
        let mut best_d = f64::INFINITY;
        for (i, &p) in remaining.iter().enumerate() {
            let d = d2(cursor, p);
            if d < best_d {
                best_d = d;
                best_i = i;
            }
        }
        let p = remaining.remove(best_i);
        ordered.push(p);
        cursor = p;
    }

    ordered
}
