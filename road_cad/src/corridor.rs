//! Cross-section sampling along alignments.

use rayon::prelude::*;

use crate::alignment::{Alignment, HorizontalAlignment};
use crate::cancel::{CancelToken, Cancelled};
use crate::dtm::{SurfaceError, Tin};
use crate::geometry::Point3;
use crate::pointset::DuplicatePolicy;

/// Station range sampled at a fixed interval. The station list is
/// derived multiplicatively from the interval so it is identical on
/// every call, and the end station is always included even when the
/// last spacing comes out irregular.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StationRange {
    pub from: f64,
    pub to: f64,
    pub interval: f64,
}

impl StationRange {
    pub fn new(from: f64, to: f64, interval: f64) -> Self {
        Self { from, to, interval }
    }

    /// Range covering the whole alignment.
    pub fn full(alignment: &HorizontalAlignment, interval: f64) -> Self {
        Self {
            from: alignment.start_station(),
            to: alignment.end_station(),
            interval,
        }
    }

    /// Ascending station list. A non-positive interval yields the two
    /// ends only.
    pub fn stations(&self) -> Vec<f64> {
        let mut out = Vec::new();
        if self.to < self.from {
            return out;
        }
        if self.interval <= 0.0 {
            out.push(self.from);
            if self.to - self.from > 1e-9 {
                out.push(self.to);
            }
            return out;
        }
        let mut k = 0u64;
        loop {
            let s = self.from + k as f64 * self.interval;
            if s >= self.to - 1e-9 {
                break;
            }
            out.push(s);
            k += 1;
        }
        out.push(self.to);
        out
    }
}

/// Perpendicular extent sampled at each station, measured from the
/// centerline. Both widths are magnitudes; `left` lies on the positive
/// offset side.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OffsetRange {
    pub left: f64,
    pub right: f64,
}

impl OffsetRange {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn symmetric(half_width: f64) -> Self {
        Self {
            left: half_width,
            right: half_width,
        }
    }

    /// Signed offset span, ascending from the right edge to the left.
    pub fn span(&self) -> (f64, f64) {
        (-self.right.abs(), self.left.abs())
    }
}

/// Surface traces cut perpendicular to the alignment at one station.
/// `traces` holds one (signed offset, elevation) polyline per sampled
/// surface, ascending in offset; a trace is empty where the station or
/// the whole offset line misses the surface.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrossSection {
    pub station: f64,
    pub traces: Vec<Vec<(f64, f64)>>,
}

/// Samples cross-sections through `surfaces` at every station of
/// `range`. Stations are processed in parallel; the output is ordered
/// by station regardless. Stations outside the alignment produce empty
/// traces rather than failing the batch.
pub fn sample_cross_sections(
    alignment: &HorizontalAlignment,
    surfaces: &[&Tin],
    range: &StationRange,
    offsets: &OffsetRange,
    cancel: &CancelToken,
) -> Result<Vec<CrossSection>, Cancelled> {
    let (lo, hi) = offsets.span();
    range
        .stations()
        .into_par_iter()
        .map(|station| {
            cancel.check()?;
            let line = alignment
                .offset_point(station, lo)
                .zip(alignment.offset_point(station, hi));
            let traces = match line {
                Some((a, b)) => surfaces
                    .iter()
                    .map(|surface| {
                        surface
                            .section_along_line(a, b)
                            .into_iter()
                            .map(|(d, z)| (lo + d, z))
                            .collect()
                    })
                    .collect(),
                None => surfaces.iter().map(|_| Vec::new()).collect(),
            };
            Ok(CrossSection { station, traces })
        })
        .collect()
}

/// Samples the surface elevation under the alignment centerline at
/// every station of `range`. Stations off the alignment or off the
/// surface carry `None`.
pub fn sample_ground_profile(
    alignment: &HorizontalAlignment,
    surface: &Tin,
    range: &StationRange,
    cancel: &CancelToken,
) -> Result<Vec<(f64, Option<f64>)>, Cancelled> {
    let mut out = Vec::new();
    for station in range.stations() {
        cancel.check()?;
        let z = alignment
            .evaluate(station)
            .and_then(|(p, _)| surface.elevation_at(p.x, p.y));
        out.push((station, z));
    }
    Ok(out)
}

/// Cross-section shape swept along an alignment. `points` are (signed
/// offset, elevation relative to the profile grade) pairs in ascending
/// offset order.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TemplateSection {
    pub points: Vec<(f64, f64)>,
}

impl TemplateSection {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }
}

/// Builds a design surface by sweeping `template` along the alignment
/// at every station of `range` and triangulating the swept points.
/// Stations not covered by both the horizontal and vertical alignment
/// are skipped.
pub fn sweep_template(
    alignment: &Alignment,
    template: &TemplateSection,
    range: &StationRange,
    cancel: &CancelToken,
) -> Result<Tin, SurfaceError> {
    let mut pts = Vec::new();
    for station in range.stations() {
        cancel.check()?;
        let (center, heading) = match alignment.horizontal.evaluate(station) {
            Some(v) => v,
            None => continue,
        };
        let grade = match alignment.vertical.elevation_at(station) {
            Some(z) => z,
            None => continue,
        };
        let normal = (-heading.sin(), heading.cos());
        for &(offset, elev) in &template.points {
            pts.push(Point3::new(
                center.x + offset * normal.0,
                center.y + offset * normal.1,
                grade + elev,
            ));
        }
    }
    Tin::from_points(pts, DuplicatePolicy::KeepFirst)
}
