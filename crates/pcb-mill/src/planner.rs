//! Drill planning: cover every small hole with a minimal set of drills.
//!
//! Assignment rule: a hole takes the largest drill whose diameter is at most
//! `hole + tol`. When that uses more distinct drills than allowed, drills
//! whose holes can all be re-covered elsewhere are dropped one at a time,
//! fewest-holes first. Unlike the parsers this module fails fast: an
//! uncoverable hole or an unsatisfiable cap aborts the job before any
//! G-code is written.

use std::collections::BTreeSet;

use crate::bits::Bit;
use crate::error::MillError;
use crate::parsers::excellon::Hole;

/// One drill of the plan with the hole centers it serves.
#[derive(Debug, Clone)]
pub struct DrillAssignment {
    pub bit: Bit,
    pub holes: Vec<(f64, f64)>,
}

/// Plan drills for `holes` out of `candidates`.
///
/// Returns assignments sorted by drill diameter descending (largest drill
/// runs first). Candidates with duplicate diameters collapse to the first.
pub fn plan_drills(
    holes: &[Hole],
    candidates: &[Bit],
    tol: f64,
    max_bits: usize,
) -> Result<Vec<DrillAssignment>, MillError> {
    if holes.is_empty() {
        return Ok(Vec::new());
    }

    let mut drills: Vec<Bit> = candidates
        .iter()
        .filter(|b| b.diameter > 0.0)
        .cloned()
        .collect();
    if drills.is_empty() {
        return Err(MillError::ImpossibleDrillPlan(
            "no drill bits available".into(),
        ));
    }
    drills.sort_by(|a, b| a.diameter.partial_cmp(&b.diameter).unwrap());
    drills.dedup_by(|a, b| (a.diameter - b.diameter).abs() < 1e-9);

    let diameters: Vec<f64> = drills.iter().map(|b| b.diameter).collect();

    // Largest drill with diameter <= hole + tol, restricted to `allowed`
    // when a reduction pass has already dropped some drills.
    let best_for = |hole_d: f64, allowed: Option<&BTreeSet<usize>>| -> Option<usize> {
        let limit = hole_d + tol + 1e-9;
        let mut best = None;
        for (i, &d) in diameters.iter().enumerate() {
            if let Some(allowed) = allowed {
                if !allowed.contains(&i) {
                    continue;
                }
            }
            if d <= limit {
                best = Some(i);
            } else {
                break;
            }
        }
        best
    };

    let mut assignment: Vec<usize> = Vec::with_capacity(holes.len());
    for hole in holes {
        match best_for(hole.diameter, None) {
            Some(idx) => assignment.push(idx),
            None => {
                let min_unmet = holes
                    .iter()
                    .map(|h| h.diameter)
                    .filter(|&d| best_for(d, None).is_none())
                    .fold(f64::INFINITY, f64::min);
                return Err(MillError::ImpossibleDrillPlan(format!(
                    "smallest drill is larger than some holes (+{tol:.2} mm tolerance); \
                     minimum {min_unmet:.2} mm"
                )));
            }
        }
    }

    let mut used: BTreeSet<usize> = assignment.iter().copied().collect();

    while used.len() > max_bits {
        // A drill is droppable when every one of its holes fits another
        // drill still in use.
        let mut droppable: Vec<usize> = Vec::new();
        for &di in &used {
            let mut others = used.clone();
            others.remove(&di);
            let ok = holes
                .iter()
                .zip(&assignment)
                .filter(|(_, &a)| a == di)
                .all(|(h, _)| best_for(h.diameter, Some(&others)).is_some());
            if ok {
                droppable.push(di);
            }
        }

        if droppable.is_empty() {
            return Err(MillError::ImpossibleDrillPlan(format!(
                "cannot cover all holes with at most {max_bits} drill sizes"
            )));
        }

        let mut counts = vec![0usize; diameters.len()];
        for &a in &assignment {
            counts[a] += 1;
        }
        droppable.sort_by(|&a, &b| {
            counts[a]
                .cmp(&counts[b])
                .then(diameters[a].partial_cmp(&diameters[b]).unwrap())
        });
        let drop = droppable[0];
        used.remove(&drop);

        for (hole, slot) in holes.iter().zip(assignment.iter_mut()) {
            if *slot == drop {
                // Reassignment is guaranteed by the droppable check.
                *slot = best_for(hole.diameter, Some(&used)).unwrap();
            }
        }
    }

    // Largest drill first, holes in input order.
    let mut order: Vec<usize> = used.into_iter().collect();
    order.sort_by(|&a, &b| diameters[b].partial_cmp(&diameters[a]).unwrap());

    Ok(order
        .into_iter()
        .map(|idx| DrillAssignment {
            bit: drills[idx].clone(),
            holes: holes
                .iter()
                .zip(&assignment)
                .filter(|(_, &a)| a == idx)
                .map(|(h, _)| (h.x, h.y))
                .collect(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drill(d: f64) -> Bit {
        Bit {
            name: format!("drill {d:.2}"),
            type_name: "drill".into(),
            diameter: d,
            ..Bit::default()
        }
    }

    fn hole(d: f64) -> Hole {
        Hole {
            x: d,
            y: 0.0,
            diameter: d,
        }
    }

    #[test]
    fn test_largest_fitting_drill_wins() {
        let plan = plan_drills(
            &[hole(1.0)],
            &[drill(0.5), drill(0.8), drill(1.0), drill(1.2)],
            0.05,
            4,
        )
        .unwrap();
        assert_eq!(plan.len(), 1);
        assert!((plan[0].bit.diameter - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tolerance_allows_oversize() {
        // A 1.0 drill covers a 0.96 hole under tol 0.05.
        let plan = plan_drills(&[hole(0.96)], &[drill(1.0)], 0.05, 1).unwrap();
        assert!((plan[0].bit.diameter - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reduction_to_cap() {
        // Holes [0.6,0.6,0.8,0.9,1.0] with drills {0.5,0.6,0.8,0.9,1.0},
        // tol 0.05, cap 2: valid plans are {0.6,0.9} or {0.6,1.0}.
        let holes = [hole(0.6), hole(0.6), hole(0.8), hole(0.9), hole(1.0)];
        let drills = [drill(0.5), drill(0.6), drill(0.8), drill(0.9), drill(1.0)];
        let plan = plan_drills(&holes, &drills, 0.05, 2).unwrap();

        assert_eq!(plan.len(), 2);
        let mut sizes: Vec<f64> = plan.iter().map(|a| a.bit.diameter).collect();
        sizes.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((sizes[0] - 0.6).abs() < 1e-9);
        assert!((sizes[1] - 0.9).abs() < 1e-9 || (sizes[1] - 1.0).abs() < 1e-9);

        // Every hole sits under its drill within tolerance, and all holes
        // are accounted for.
        let total: usize = plan.iter().map(|a| a.holes.len()).sum();
        assert_eq!(total, holes.len());
        for a in &plan {
            for &(x, _) in &a.holes {
                // Hole diameter was stored in x by the helper.
                assert!(a.bit.diameter <= x + 0.05 + 1e-9);
            }
        }
    }

    #[test]
    fn test_impossible_small_hole() {
        let err = plan_drills(&[hole(0.3)], &[drill(0.5), drill(0.6)], 0.05, 2).unwrap_err();
        match err {
            MillError::ImpossibleDrillPlan(msg) => {
                assert!(msg.contains("minimum 0.30 mm"), "message: {msg}");
            }
            other => panic!("expected ImpossibleDrillPlan, got {other:?}"),
        }
    }

    #[test]
    fn test_impossible_cap() {
        // Two hole sizes that no single drill can cover.
        let holes = [hole(0.5), hole(2.0)];
        let drills = [drill(0.5), drill(2.0)];
        let err = plan_drills(&holes, &drills, 0.05, 1).unwrap_err();
        assert!(matches!(err, MillError::ImpossibleDrillPlan(_)));
    }

    #[test]
    fn test_plan_sorted_descending() {
        let holes = [hole(0.5), hole(1.0), hole(2.0)];
        let drills = [drill(0.5), drill(1.0), drill(2.0)];
        let plan = plan_drills(&holes, &drills, 0.05, 3).unwrap();
        let sizes: Vec<f64> = plan.iter().map(|a| a.bit.diameter).collect();
        assert_eq!(sizes, vec![2.0, 1.0, 0.5]);
    }

    #[test]
    fn test_duplicate_diameters_collapse() {
        let holes = [hole(0.8)];
        let drills = [drill(0.8), drill(0.8)];
        let plan = plan_drills(&holes, &drills, 0.05, 2).unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_no_candidates() {
        assert!(matches!(
            plan_drills(&[hole(0.8)], &[], 0.05, 2),
            Err(MillError::ImpossibleDrillPlan(_))
        ));
    }

    #[test]
    fn test_empty_holes_empty_plan() {
        let plan = plan_drills(&[], &[drill(0.8)], 0.05, 1).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_exact_boundary_matches() {
        // hole + tol exactly equals the drill diameter.
        let plan = plan_drills(&[hole(0.75)], &[drill(0.8)], 0.05, 1).unwrap();
        assert_eq!(plan.len(), 1);
    }
}
