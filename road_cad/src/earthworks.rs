//! Cut and fill quantities between an existing surface and a design.
//!
//! Section areas are measured on vertical planes perpendicular to the
//! alignment and integrated along stations with the average end area
//! method. Offset spans where either elevation source is undefined are
//! excluded from the areas and reported as coverage gaps.

use rayon::prelude::*;

use crate::alignment::{HorizontalAlignment, VerticalAlignment};
use crate::cancel::{CancelToken, Cancelled};
use crate::corridor::{OffsetRange, StationRange};
use crate::dtm::Tin;
use crate::geometry::Point;

/// Design elevation source compared against the existing ground.
#[derive(Debug, Clone, Copy)]
pub enum DesignInput<'a> {
    /// Finished design surface, sampled like the ground.
    Surface(&'a Tin),
    /// Profile grade elevation applied uniformly across the offset
    /// span at each station.
    Profile(&'a VerticalAlignment),
}

/// Section areas at a single station. Offsets in `gaps` are signed,
/// ascending spans where the comparison was undefined.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StationEarthworks {
    pub station: f64,
    pub cut_area: f64,
    pub fill_area: f64,
    pub gaps: Vec<(f64, f64)>,
}

/// Volumes integrated over a station range.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EarthworksResult {
    pub stations: Vec<StationEarthworks>,
    pub cut_volume: f64,
    pub fill_volume: f64,
}

impl EarthworksResult {
    /// Net volume, fill positive.
    pub fn net_volume(&self) -> f64 {
        self.fill_volume - self.cut_volume
    }

    /// Mass haul ordinates as `(station, cumulative net volume)` pairs
    /// starting at zero. Positive values represent accumulated fill,
    /// negative values accumulated cut.
    pub fn mass_haul(&self) -> Vec<(f64, f64)> {
        let mut haul = Vec::new();
        let Some(first) = self.stations.first() else {
            return haul;
        };
        haul.push((first.station, 0.0));
        let mut cumulative = 0.0;
        for pair in self.stations.windows(2) {
            let span = pair[1].station - pair[0].station;
            let net0 = pair[0].fill_area - pair[0].cut_area;
            let net1 = pair[1].fill_area - pair[1].cut_area;
            cumulative += (net0 + net1) * 0.5 * span;
            haul.push((pair[1].station, cumulative));
        }
        haul
    }
}

fn lerp(a: Point, b: Point, t: f64) -> Point {
    Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
}

/// Measures cut and fill areas on the section plane at `station`.
///
/// The section line is cut at every triangle edge crossing of both
/// elevation sources, so the elevation difference is linear inside
/// each piece and the trapezoid rule is exact. Pieces where the
/// difference changes sign are split at the zero crossing.
fn station_areas(
    alignment: &HorizontalAlignment,
    existing: &Tin,
    design: DesignInput<'_>,
    station: f64,
    offsets: &OffsetRange,
) -> StationEarthworks {
    let (lo, hi) = offsets.span();
    let width = hi - lo;
    let mut result = StationEarthworks {
        station,
        cut_area: 0.0,
        fill_area: 0.0,
        gaps: Vec::new(),
    };
    if width <= 1e-12 {
        return result;
    }

    let line = alignment
        .offset_point(station, lo)
        .zip(alignment.offset_point(station, hi));
    let Some((a, b)) = line else {
        result.gaps.push((lo, hi));
        return result;
    };

    let grade = match design {
        DesignInput::Surface(_) => None,
        DesignInput::Profile(profile) => match profile.elevation_at(station) {
            Some(z) => Some(z),
            None => {
                result.gaps.push((lo, hi));
                return result;
            }
        },
    };
    let design_at = |p: Point| match design {
        DesignInput::Surface(tin) => tin.elevation_at(p.x, p.y),
        DesignInput::Profile(_) => grade,
    };

    let mut params = existing.section_params(a, b);
    if let DesignInput::Surface(tin) = design {
        params.extend(tin.section_params(a, b));
    }
    params.sort_by(f64::total_cmp);
    params.dedup_by(|x, y| (*x - *y).abs() < 1e-9);

    let sample = |t: f64| -> Option<(f64, f64)> {
        let p = lerp(a, b, t);
        let e = existing.elevation_at(p.x, p.y)?;
        let d = design_at(p)?;
        Some((e, d))
    };

    let mut gaps: Vec<(f64, f64)> = Vec::new();
    for pair in params.windows(2) {
        let (t0, t1) = (pair[0], pair[1]);
        let w = (t1 - t0) * width;
        if w <= 1e-12 {
            continue;
        }
        // A defined midpoint means the whole piece lies inside one
        // triangle of each source, so the endpoints are usable.
        let piece = sample((t0 + t1) * 0.5).and(sample(t0).zip(sample(t1)));
        let Some(((e0, d0), (e1, d1))) = piece else {
            let span = (lo + t0 * width, lo + t1 * width);
            match gaps.last_mut() {
                Some(last) if span.0 - last.1 <= 1e-9 => last.1 = span.1,
                _ => gaps.push(span),
            }
            continue;
        };
        let diff0 = d0 - e0;
        let diff1 = d1 - e1;
        if diff0 * diff1 < 0.0 {
            let frac = diff0 / (diff0 - diff1);
            let area0 = diff0.abs() * w * frac * 0.5;
            let area1 = diff1.abs() * w * (1.0 - frac) * 0.5;
            if diff0 > 0.0 {
                result.fill_area += area0;
                result.cut_area += area1;
            } else {
                result.cut_area += area0;
                result.fill_area += area1;
            }
        } else {
            let avg = (diff0 + diff1) * 0.5;
            if avg > 0.0 {
                result.fill_area += avg * w;
            } else {
                result.cut_area += -avg * w;
            }
        }
    }
    result.gaps = gaps;
    result
}

/// Computes cut and fill volumes between `existing` and `design` over
/// `range`, integrating station areas with the average end area
/// method. Stations are processed in parallel.
pub fn compute_volumes(
    alignment: &HorizontalAlignment,
    existing: &Tin,
    design: DesignInput<'_>,
    range: &StationRange,
    offsets: &OffsetRange,
    cancel: &CancelToken,
) -> Result<EarthworksResult, Cancelled> {
    let stations: Vec<StationEarthworks> = range
        .stations()
        .into_par_iter()
        .map(|station| {
            cancel.check()?;
            Ok(station_areas(alignment, existing, design, station, offsets))
        })
        .collect::<Result<_, Cancelled>>()?;

    let mut cut_volume = 0.0;
    let mut fill_volume = 0.0;
    for pair in stations.windows(2) {
        let span = pair[1].station - pair[0].station;
        cut_volume += (pair[0].cut_area + pair[1].cut_area) * 0.5 * span;
        fill_volume += (pair[0].fill_area + pair[1].fill_area) * 0.5 * span;
    }
    Ok(EarthworksResult {
        stations,
        cut_volume,
        fill_volume,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{ContinuityTolerance, VerticalElement};
    use crate::dtm::Tin;
    use crate::geometry::Point3;
    use crate::pointset::DuplicatePolicy;

    fn tangent(from: Point, to: Point) -> HorizontalAlignment {
        HorizontalAlignment::from_tangents(0.0, vec![from, to], ContinuityTolerance::default())
            .unwrap()
    }

    fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64, z: impl Fn(f64, f64) -> f64) -> Tin {
        Tin::from_points(
            vec![
                Point3::new(x0, y0, z(x0, y0)),
                Point3::new(x1, y0, z(x1, y0)),
                Point3::new(x1, y1, z(x1, y1)),
                Point3::new(x0, y1, z(x0, y1)),
            ],
            DuplicatePolicy::Reject,
        )
        .unwrap()
    }

    #[test]
    fn constant_fill_against_profile_grade() {
        let existing = rectangle(0.0, -10.0, 100.0, 10.0, |_, _| 0.0);
        let profile = VerticalAlignment::from_elements(vec![VerticalElement::Grade {
            start_station: 0.0,
            end_station: 100.0,
            start_elev: 2.0,
            end_elev: 2.0,
        }])
        .unwrap();
        let alignment = tangent(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        let result = compute_volumes(
            &alignment,
            &existing,
            DesignInput::Profile(&profile),
            &StationRange::new(0.0, 100.0, 10.0),
            &OffsetRange::symmetric(10.0),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(result.stations.len(), 11);
        for st in &result.stations {
            assert!((st.fill_area - 40.0).abs() < 1e-6);
            assert!(st.cut_area.abs() < 1e-9);
            assert!(st.gaps.is_empty());
        }
        assert!((result.fill_volume - 4000.0).abs() < 1e-6);
        assert!(result.cut_volume.abs() < 1e-9);
        assert!((result.net_volume() - 4000.0).abs() < 1e-6);

        let haul = result.mass_haul();
        assert_eq!(haul.len(), 11);
        assert_eq!(haul[0], (0.0, 0.0));
        assert!((haul.last().unwrap().1 - 4000.0).abs() < 1e-6);
        for pair in haul.windows(2) {
            assert!(pair[1].1 > pair[0].1);
        }
    }

    #[test]
    fn sign_change_splits_balance_cut_and_fill() {
        let existing = rectangle(0.0, 0.0, 10.0, 10.0, |_, _| 0.0);
        let design = rectangle(0.0, 0.0, 10.0, 10.0, |_, y| y - 5.0);
        let alignment = tangent(Point::new(0.0, 5.0), Point::new(10.0, 5.0));
        let result = compute_volumes(
            &alignment,
            &existing,
            DesignInput::Surface(&design),
            &StationRange::new(0.0, 10.0, 5.0),
            &OffsetRange::symmetric(5.0),
            &CancelToken::new(),
        )
        .unwrap();
        for st in &result.stations {
            assert!((st.cut_area - 12.5).abs() < 1e-6);
            assert!((st.fill_area - 12.5).abs() < 1e-6);
            assert!(st.gaps.is_empty());
        }
        assert!((result.cut_volume - 125.0).abs() < 1e-6);
        assert!((result.fill_volume - 125.0).abs() < 1e-6);
        assert!(result.net_volume().abs() < 1e-6);
        assert!(result.mass_haul().last().unwrap().1.abs() < 1e-6);
    }

    #[test]
    fn missing_design_coverage_becomes_a_gap() {
        let existing = rectangle(0.0, 0.0, 10.0, 10.0, |_, _| 0.0);
        let design = rectangle(0.0, 5.0, 10.0, 10.0, |_, _| 1.0);
        let alignment = tangent(Point::new(0.0, 5.0), Point::new(10.0, 5.0));
        let result = compute_volumes(
            &alignment,
            &existing,
            DesignInput::Surface(&design),
            &StationRange::new(2.0, 8.0, 3.0),
            &OffsetRange::symmetric(5.0),
            &CancelToken::new(),
        )
        .unwrap();
        for st in &result.stations {
            assert!((st.fill_area - 5.0).abs() < 1e-6);
            assert!(st.cut_area.abs() < 1e-9);
            assert_eq!(st.gaps.len(), 1);
            let (g0, g1) = st.gaps[0];
            assert!((g0 + 5.0).abs() < 1e-6);
            assert!(g1.abs() < 1e-6);
        }
    }

    #[test]
    fn stations_outside_the_profile_are_gaps() {
        let existing = rectangle(0.0, -10.0, 100.0, 10.0, |_, _| 0.0);
        let profile = VerticalAlignment::from_elements(vec![VerticalElement::Grade {
            start_station: 0.0,
            end_station: 50.0,
            start_elev: 1.0,
            end_elev: 1.0,
        }])
        .unwrap();
        let alignment = tangent(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        let result = compute_volumes(
            &alignment,
            &existing,
            DesignInput::Profile(&profile),
            &StationRange::new(0.0, 100.0, 25.0),
            &OffsetRange::symmetric(5.0),
            &CancelToken::new(),
        )
        .unwrap();
        assert!((result.stations[0].fill_area - 10.0).abs() < 1e-6);
        assert!((result.stations[2].fill_area - 10.0).abs() < 1e-6);
        assert!(result.stations[3].fill_area.abs() < 1e-9);
        assert_eq!(result.stations[3].gaps, vec![(-5.0, 5.0)]);
        assert_eq!(result.stations[4].gaps, vec![(-5.0, 5.0)]);
        assert!((result.fill_volume - 625.0).abs() < 1e-6);
    }

    #[test]
    fn volume_computation_observes_cancellation() {
        let existing = rectangle(0.0, -5.0, 10.0, 5.0, |_, _| 0.0);
        let profile = VerticalAlignment::from_elements(vec![VerticalElement::Grade {
            start_station: 0.0,
            end_station: 10.0,
            start_elev: 1.0,
            end_elev: 1.0,
        }])
        .unwrap();
        let alignment = tangent(Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        let token = CancelToken::new();
        token.cancel();
        let err = compute_volumes(
            &alignment,
            &existing,
            DesignInput::Profile(&profile),
            &StationRange::new(0.0, 10.0, 1.0),
            &OffsetRange::symmetric(2.0),
            &token,
        )
        .unwrap_err();
        assert_eq!(err, Cancelled);
    }
}
