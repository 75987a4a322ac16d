//! Horizontal and vertical road alignments.
//!
//! A [`HorizontalAlignment`] is an ordered chain of tangents, circular
//! curves and transition spirals. Arc length along the chain, offset by
//! a declared start station, forms the station axis every other query
//! in the crate is parametrized by. A [`VerticalAlignment`] maps
//! stations to elevations through grade segments and parabolic curves.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::geometry::{distance, Arc, Point, Point3};

/// Iteration cap for the spiral inverse projection.
const MAX_PROJECTION_ITERATIONS: usize = 20;

/// Samples of the coarse scan seeding the spiral projection.
const COARSE_SAMPLES: usize = 32;

/// Euler spiral segment described analytically. Curvature varies
/// linearly from `1 / start_radius` to `1 / end_radius` over `length`;
/// an infinite radius stands for a straight (zero curvature) end.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Spiral {
    pub start: Point,
    pub orientation: f64,
    pub length: f64,
    pub start_radius: f64,
    pub end_radius: f64,
}

impl Spiral {
    fn curvatures(&self) -> (f64, f64, f64) {
        let k0 = if self.start_radius.is_infinite() {
            0.0
        } else {
            1.0 / self.start_radius
        };
        let k1 = if self.end_radius.is_infinite() {
            0.0
        } else {
            1.0 / self.end_radius
        };
        (k0, k1, (k1 - k0) / self.length)
    }

    pub fn start_point(&self) -> Point {
        self.start
    }

    pub fn end_point(&self) -> Point {
        self.point_at(self.length)
    }

    /// Position after arc length `s`, evaluated through Fresnel
    /// integrals. Degenerate curvature rates fall back to the exact
    /// line or circle.
    pub fn point_at(&self, s: f64) -> Point {
        let (k0, _, kp) = self.curvatures();

        if kp.abs() < f64::EPSILON {
            if k0.abs() < f64::EPSILON {
                return Point::new(
                    self.start.x + s * self.orientation.cos(),
                    self.start.y + s * self.orientation.sin(),
                );
            }
            let r = 1.0 / k0;
            let cx = self.start.x - r * self.orientation.sin();
            let cy = self.start.y + r * self.orientation.cos();
            let ang = self.orientation + k0 * s;
            return Point::new(cx + r * ang.sin(), cy - r * ang.cos());
        }

        let alpha = kp / 2.0;
        let beta = k0;
        let delta = self.orientation - beta * beta / (4.0 * alpha);
        let sign = alpha.signum();
        let z = |x: f64| -> f64 {
            sign * (2.0 * alpha.abs() / PI).sqrt() * (x + beta / (2.0 * alpha))
        };
        let (s0, c0) = fresnel::fresnl(z(0.0));
        let (s1, c1) = fresnel::fresnl(z(s));
        let fac = (PI / (2.0 * alpha.abs())).sqrt();
        let dx = fac * (sign * (c1 - c0) * delta.cos() - (s1 - s0) * delta.sin());
        let dy = fac * ((s1 - s0) * delta.cos() + sign * (c1 - c0) * delta.sin());
        Point::new(self.start.x + dx, self.start.y + dy)
    }

    /// Unit tangent after arc length `s`.
    pub fn direction_at(&self, s: f64) -> (f64, f64) {
        let (k0, _, kp) = self.curvatures();
        let theta = self.orientation + k0 * s + 0.5 * kp * s * s;
        (theta.cos(), theta.sin())
    }

    /// Curvature after arc length `s`, linear by construction.
    pub fn curvature_at(&self, s: f64) -> f64 {
        let (k0, _, kp) = self.curvatures();
        k0 + kp * s
    }
}

/// Individual elements of a horizontal alignment.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum HorizontalElement {
    /// Straight tangent between two points.
    Tangent { start: Point, end: Point },
    /// Circular curve described by an [`Arc`].
    Curve { arc: Arc },
    /// Transition spiral described analytically.
    Spiral { spiral: Spiral },
}

impl HorizontalElement {
    pub fn length(&self) -> f64 {
        match self {
            HorizontalElement::Tangent { start, end } => distance(*start, *end),
            HorizontalElement::Curve { arc } => arc.length(),
            HorizontalElement::Spiral { spiral } => spiral.length,
        }
    }

    pub fn start_point(&self) -> Point {
        match self {
            HorizontalElement::Tangent { start, .. } => *start,
            HorizontalElement::Curve { arc } => Point::new(
                arc.center.x + arc.radius * arc.start_angle.cos(),
                arc.center.y + arc.radius * arc.start_angle.sin(),
            ),
            HorizontalElement::Spiral { spiral } => spiral.start_point(),
        }
    }

    pub fn end_point(&self) -> Point {
        match self {
            HorizontalElement::Tangent { end, .. } => *end,
            HorizontalElement::Curve { arc } => Point::new(
                arc.center.x + arc.radius * arc.end_angle.cos(),
                arc.center.y + arc.radius * arc.end_angle.sin(),
            ),
            HorizontalElement::Spiral { spiral } => spiral.end_point(),
        }
    }

    fn point_at(&self, s: f64) -> Point {
        match self {
            HorizontalElement::Tangent { start, end } => {
                let len = distance(*start, *end);
                let t = if len.abs() < f64::EPSILON { 0.0 } else { s / len };
                Point::new(
                    start.x + t * (end.x - start.x),
                    start.y + t * (end.y - start.y),
                )
            }
            HorizontalElement::Curve { arc } => {
                let dir = if arc.end_angle >= arc.start_angle { 1.0 } else { -1.0 };
                let ang = arc.start_angle + s / arc.radius * dir;
                Point::new(
                    arc.center.x + arc.radius * ang.cos(),
                    arc.center.y + arc.radius * ang.sin(),
                )
            }
            HorizontalElement::Spiral { spiral } => spiral.point_at(s),
        }
    }

    fn direction_at(&self, s: f64) -> (f64, f64) {
        match self {
            HorizontalElement::Tangent { start, end } => {
                let dx = end.x - start.x;
                let dy = end.y - start.y;
                let len = (dx * dx + dy * dy).sqrt();
                if len.abs() < f64::EPSILON {
                    (0.0, 0.0)
                } else {
                    (dx / len, dy / len)
                }
            }
            HorizontalElement::Curve { arc } => {
                let dir = if arc.end_angle >= arc.start_angle { 1.0 } else { -1.0 };
                let ang = arc.start_angle + s / arc.radius * dir;
                let tangent = ang + dir * FRAC_PI_2;
                (tangent.cos(), tangent.sin())
            }
            HorizontalElement::Spiral { spiral } => spiral.direction_at(s),
        }
    }

    fn heading_at(&self, s: f64) -> f64 {
        let (dx, dy) = self.direction_at(s);
        dy.atan2(dx)
    }

    /// Local arc length of the perpendicular foot of `q`, clamped to
    /// the element, and whether the search converged.
    fn project(&self, q: Point) -> (f64, bool) {
        match self {
            HorizontalElement::Tangent { start, end } => {
                let dx = end.x - start.x;
                let dy = end.y - start.y;
                let len2 = dx * dx + dy * dy;
                let t = ((q.x - start.x) * dx + (q.y - start.y) * dy) / len2;
                (t.clamp(0.0, 1.0) * len2.sqrt(), true)
            }
            HorizontalElement::Curve { arc } => {
                let dir = if arc.end_angle >= arc.start_angle { 1.0 } else { -1.0 };
                let sweep = (arc.end_angle - arc.start_angle).abs();
                let ang = (q.y - arc.center.y).atan2(q.x - arc.center.x);
                let raw = ((ang - arc.start_angle) * dir).rem_euclid(TAU);
                let s = if raw <= sweep {
                    raw * arc.radius
                } else if raw - sweep <= TAU - raw {
                    sweep * arc.radius
                } else {
                    0.0
                };
                (s.min(self.length()), true)
            }
            HorizontalElement::Spiral { spiral } => {
                let len = spiral.length;
                let mut s = 0.0;
                let mut best = f64::INFINITY;
                for i in 0..=COARSE_SAMPLES {
                    let cand = len * i as f64 / COARSE_SAMPLES as f64;
                    let p = spiral.point_at(cand);
                    let d2 = (q.x - p.x).powi(2) + (q.y - p.y).powi(2);
                    if d2 < best {
                        best = d2;
                        s = cand;
                    }
                }
                for _ in 0..MAX_PROJECTION_ITERATIONS {
                    let p = spiral.point_at(s);
                    let (tx, ty) = spiral.direction_at(s);
                    let vx = q.x - p.x;
                    let vy = q.y - p.y;
                    let g = vx * tx + vy * ty;
                    if g.abs() < 1e-9 {
                        return (s, true);
                    }
                    let dg = -1.0 + spiral.curvature_at(s) * (tx * vy - ty * vx);
                    if dg.abs() < 1e-12 {
                        break;
                    }
                    let next = (s - g / dg).clamp(0.0, len);
                    if (next - s).abs() < 1e-12 {
                        // pinned against an element end, nothing left to move
                        return (next, true);
                    }
                    s = next;
                }
                (s, false)
            }
        }
    }
}

/// Positional and angular slack accepted between consecutive elements.
/// Defaults absorb coordinate rounding from interchange files while
/// still catching modelling mistakes.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ContinuityTolerance {
    pub position: f64,
    pub heading: f64,
}

impl Default for ContinuityTolerance {
    fn default() -> Self {
        Self {
            position: 0.01,
            heading: 1e-3,
        }
    }
}

#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("alignment has no elements")]
    Empty,
    #[error("element {index} has zero length")]
    ZeroLengthElement { index: usize },
    #[error(
        "discontinuity ahead of element {index}: position gap {position_gap}, heading gap {heading_gap} rad"
    )]
    Discontinuous {
        index: usize,
        position_gap: f64,
        heading_gap: f64,
    },
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("projection of ({x}, {y}) did not converge within {iterations} iterations")]
    NoConvergence { x: f64, y: f64, iterations: usize },
    #[error("point ({x}, {y}) lies beyond the ends of the alignment")]
    NotOnAlignment { x: f64, y: f64 },
}

fn wrap_angle(a: f64) -> f64 {
    let mut a = a % TAU;
    if a > PI {
        a -= TAU;
    }
    if a <= -PI {
        a += TAU;
    }
    a
}

/// Horizontal alignment with a validated station axis.
///
/// Construction rejects chains whose elements do not meet end-to-start
/// within the continuity tolerance, so every accepted alignment is C1
/// and stations map one-to-one onto points.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HorizontalAlignment {
    start_station: f64,
    elements: Vec<HorizontalElement>,
    #[serde(skip)]
    cumulative: OnceCell<Vec<f64>>,
}

impl HorizontalAlignment {
    pub fn new(
        start_station: f64,
        elements: Vec<HorizontalElement>,
        tol: ContinuityTolerance,
    ) -> Result<Self, AlignmentError> {
        if elements.is_empty() {
            return Err(AlignmentError::Empty);
        }
        for (index, e) in elements.iter().enumerate() {
            if e.length() <= 1e-9 {
                return Err(AlignmentError::ZeroLengthElement { index });
            }
        }
        for index in 1..elements.len() {
            let prev = &elements[index - 1];
            let next = &elements[index];
            let position_gap = distance(prev.end_point(), next.start_point());
            let heading_gap =
                wrap_angle(next.heading_at(0.0) - prev.heading_at(prev.length())).abs();
            if position_gap > tol.position || heading_gap > tol.heading {
                return Err(AlignmentError::Discontinuous {
                    index,
                    position_gap,
                    heading_gap,
                });
            }
        }
        log::debug!(
            "alignment of {} elements starting at station {start_station}",
            elements.len()
        );
        Ok(Self {
            start_station,
            elements,
            cumulative: OnceCell::new(),
        })
    }

    /// Builds an all-tangent alignment through the given vertices.
    pub fn from_tangents(
        start_station: f64,
        vertices: Vec<Point>,
        tol: ContinuityTolerance,
    ) -> Result<Self, AlignmentError> {
        let elements = vertices
            .windows(2)
            .map(|pair| HorizontalElement::Tangent {
                start: pair[0],
                end: pair[1],
            })
            .collect();
        Self::new(start_station, elements, tol)
    }

    pub fn elements(&self) -> &[HorizontalElement] {
        &self.elements
    }

    pub fn start_station(&self) -> f64 {
        self.start_station
    }

    pub fn end_station(&self) -> f64 {
        self.start_station + self.length()
    }

    pub fn length(&self) -> f64 {
        *self.cumulative().last().unwrap()
    }

    fn cumulative(&self) -> &Vec<f64> {
        self.cumulative.get_or_init(|| {
            let mut acc = Vec::with_capacity(self.elements.len() + 1);
            acc.push(0.0);
            let mut total = 0.0;
            for e in &self.elements {
                total += e.length();
                acc.push(total);
            }
            acc
        })
    }

    /// Element index and local arc length covering `station`, `None`
    /// outside the station range (with a small slack at both ends).
    fn locate(&self, station: f64) -> Option<(usize, f64)> {
        if self.elements.is_empty() {
            return None;
        }
        let cum = self.cumulative();
        let total = *cum.last().unwrap();
        let s = station - self.start_station;
        if s < -1e-9 || s > total + 1e-9 {
            return None;
        }
        let s = s.clamp(0.0, total);
        let idx = cum
            .partition_point(|&c| c <= s)
            .saturating_sub(1)
            .min(self.elements.len() - 1);
        Some((idx, s - cum[idx]))
    }

    /// Position and heading (radians, east = 0, counter-clockwise
    /// positive) at `station`.
    pub fn evaluate(&self, station: f64) -> Option<(Point, f64)> {
        let (idx, s) = self.locate(station)?;
        let e = &self.elements[idx];
        let p = e.point_at(s);
        Some((p, e.heading_at(s)))
    }

    /// Point at the signed perpendicular `offset` from `station`,
    /// positive to the left of the direction of travel.
    pub fn offset_point(&self, station: f64, offset: f64) -> Option<Point> {
        let (idx, s) = self.locate(station)?;
        let e = &self.elements[idx];
        let p = e.point_at(s);
        let (dx, dy) = e.direction_at(s);
        Some(Point::new(p.x - dy * offset, p.y + dx * offset))
    }

    /// Inverse of [`offset_point`](Self::offset_point): station and
    /// signed offset of the closest point on the alignment. Fails with
    /// `NotOnAlignment` when the closest approach clamps to an
    /// alignment end and the query lies beyond it.
    pub fn station_offset_of(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        if self.elements.is_empty() {
            return Err(ProjectionError::NotOnAlignment { x, y });
        }
        let q = Point::new(x, y);
        let cum = self.cumulative();
        let last = self.elements.len() - 1;
        // (dist, station, offset, at_start, at_end, converged)
        let mut best: Option<(f64, f64, f64, bool, bool, bool)> = None;
        for (idx, e) in self.elements.iter().enumerate() {
            let len = e.length();
            let (s, converged) = e.project(q);
            let p = e.point_at(s);
            let (tx, ty) = e.direction_at(s);
            let offset = tx * (q.y - p.y) - ty * (q.x - p.x);
            let dist = distance(p, q);
            let cand = (
                dist,
                self.start_station + cum[idx] + s,
                offset,
                idx == 0 && s <= 1e-9,
                idx == last && s >= len - 1e-9,
                converged,
            );
            if best.as_ref().map_or(true, |b| cand.0 < b.0) {
                best = Some(cand);
            }
        }
        let (_, station, offset, at_start, at_end, converged) =
            best.expect("validated alignments have elements");
        if !converged {
            return Err(ProjectionError::NoConvergence {
                x,
                y,
                iterations: MAX_PROJECTION_ITERATIONS,
            });
        }
        if at_start {
            let e = &self.elements[0];
            let p = e.point_at(0.0);
            let (tx, ty) = e.direction_at(0.0);
            if (q.x - p.x) * tx + (q.y - p.y) * ty < -1e-9 {
                return Err(ProjectionError::NotOnAlignment { x, y });
            }
        }
        if at_end {
            let e = &self.elements[last];
            let s = e.length();
            let p = e.point_at(s);
            let (tx, ty) = e.direction_at(s);
            if (q.x - p.x) * tx + (q.y - p.y) * ty > 1e-9 {
                return Err(ProjectionError::NotOnAlignment { x, y });
            }
        }
        Ok((station, offset))
    }
}

/// Types of vertical alignment elements.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum VerticalElement {
    /// Straight grade between two stations.
    Grade {
        start_station: f64,
        end_station: f64,
        start_elev: f64,
        end_elev: f64,
    },
    /// Parabolic vertical curve blending `start_grade` into `end_grade`.
    Parabola {
        start_station: f64,
        end_station: f64,
        start_elev: f64,
        start_grade: f64,
        end_grade: f64,
    },
}

impl VerticalElement {
    pub fn start_station(&self) -> f64 {
        match self {
            VerticalElement::Grade { start_station, .. }
            | VerticalElement::Parabola { start_station, .. } => *start_station,
        }
    }

    pub fn end_station(&self) -> f64 {
        match self {
            VerticalElement::Grade { end_station, .. }
            | VerticalElement::Parabola { end_station, .. } => *end_station,
        }
    }

    pub fn start_elev(&self) -> f64 {
        match self {
            VerticalElement::Grade { start_elev, .. }
            | VerticalElement::Parabola { start_elev, .. } => *start_elev,
        }
    }

    pub fn end_elev(&self) -> f64 {
        match self {
            VerticalElement::Grade { end_elev, .. } => *end_elev,
            VerticalElement::Parabola {
                start_station,
                end_station,
                start_elev,
                start_grade,
                end_grade,
            } => {
                let l = end_station - start_station;
                start_elev + start_grade * l + 0.5 * (end_grade - start_grade) * l
            }
        }
    }

    pub fn start_grade(&self) -> f64 {
        match self {
            VerticalElement::Grade {
                start_station,
                end_station,
                start_elev,
                end_elev,
            } => (end_elev - start_elev) / (end_station - start_station),
            VerticalElement::Parabola { start_grade, .. } => *start_grade,
        }
    }

    pub fn end_grade(&self) -> f64 {
        match self {
            VerticalElement::Grade { .. } => self.start_grade(),
            VerticalElement::Parabola { end_grade, .. } => *end_grade,
        }
    }

    /// Elevation at local station offset `x` from the element start.
    fn elevation(&self, x: f64) -> f64 {
        match self {
            VerticalElement::Grade { start_elev, .. } => start_elev + self.start_grade() * x,
            VerticalElement::Parabola {
                start_station,
                end_station,
                start_elev,
                start_grade,
                end_grade,
            } => {
                let l = end_station - start_station;
                start_elev + start_grade * x + 0.5 * (end_grade - start_grade) / l * x * x
            }
        }
    }

    fn grade(&self, x: f64) -> f64 {
        match self {
            VerticalElement::Grade { .. } => self.start_grade(),
            VerticalElement::Parabola {
                start_station,
                end_station,
                start_grade,
                end_grade,
                ..
            } => {
                let l = end_station - start_station;
                start_grade + (end_grade - start_grade) * x / l
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile has no elements")]
    Empty,
    #[error("element {index} covers no station range")]
    EmptySegment { index: usize },
    #[error("coverage gap between stations {end} and {start}")]
    CoverageGap { end: f64, start: f64 },
    #[error("segments overlap at station {station}")]
    Overlap { station: f64 },
    #[error("elevation jumps by {delta} at station {station}")]
    ElevationJump { station: f64, delta: f64 },
    #[error("grade jumps by {delta} at vertical curve boundary, station {station}")]
    GradeJump { station: f64, delta: f64 },
    #[error("vertical curve of length {length} does not fit at PVI station {station}")]
    InvalidCurveLength { station: f64, length: f64 },
    #[error("expected {expected} curve lengths for the interior PVIs, got {got}")]
    CurveCountMismatch { expected: usize, got: usize },
    #[error("PVI stations must be strictly increasing at station {station}")]
    NonIncreasing { station: f64 },
}

/// Vertical alignment covering a contiguous station range.
///
/// Queries are strict: stations outside the covered range return
/// `None` rather than extrapolating the end grades.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VerticalAlignment {
    elements: Vec<VerticalElement>,
}

impl VerticalAlignment {
    /// Validates and adopts an element sequence. Elements must cover a
    /// contiguous, strictly forward station range with matching
    /// elevations at every junction; grade must also match wherever a
    /// parabola meets its neighbour. Angle points between two plain
    /// grades are allowed.
    pub fn from_elements(elements: Vec<VerticalElement>) -> Result<Self, ProfileError> {
        if elements.is_empty() {
            return Err(ProfileError::Empty);
        }
        for (index, e) in elements.iter().enumerate() {
            if e.end_station() - e.start_station() <= 1e-9 {
                return Err(ProfileError::EmptySegment { index });
            }
        }
        for pair in elements.windows(2) {
            let end = pair[0].end_station();
            let start = pair[1].start_station();
            if start - end > 1e-6 {
                return Err(ProfileError::CoverageGap { end, start });
            }
            if end - start > 1e-6 {
                return Err(ProfileError::Overlap { station: start });
            }
            let delta = (pair[1].start_elev() - pair[0].end_elev()).abs();
            if delta > 1e-6 {
                return Err(ProfileError::ElevationJump {
                    station: start,
                    delta,
                });
            }
            let curved = matches!(pair[0], VerticalElement::Parabola { .. })
                || matches!(pair[1], VerticalElement::Parabola { .. });
            if curved {
                let delta = (pair[1].start_grade() - pair[0].end_grade()).abs();
                if delta > 1e-6 {
                    return Err(ProfileError::GradeJump {
                        station: start,
                        delta,
                    });
                }
            }
        }
        Ok(Self { elements })
    }

    /// Builds a profile from PVI (point of vertical intersection)
    /// vertices and one curve length per interior PVI. A zero curve
    /// length leaves an angle point between the adjoining grades.
    pub fn from_pvis(pvis: &[(f64, f64)], curve_lengths: &[f64]) -> Result<Self, ProfileError> {
        if pvis.len() < 2 {
            return Err(ProfileError::Empty);
        }
        let expected = pvis.len() - 2;
        if curve_lengths.len() != expected {
            return Err(ProfileError::CurveCountMismatch {
                expected,
                got: curve_lengths.len(),
            });
        }
        for pair in pvis.windows(2) {
            if pair[1].0 - pair[0].0 <= 1e-9 {
                return Err(ProfileError::NonIncreasing { station: pair[1].0 });
            }
        }

        let mut elements = Vec::new();
        let mut cursor = pvis[0];
        for i in 1..pvis.len() - 1 {
            let (s_prev, e_prev) = pvis[i - 1];
            let (s_i, e_i) = pvis[i];
            let (s_next, e_next) = pvis[i + 1];
            let g_in = (e_i - e_prev) / (s_i - s_prev);
            let g_out = (e_next - e_i) / (s_next - s_i);
            let length = curve_lengths[i - 1];
            if length < 0.0 {
                return Err(ProfileError::InvalidCurveLength {
                    station: s_i,
                    length,
                });
            }
            if length <= 1e-9 {
                if s_i - cursor.0 > 1e-9 {
                    elements.push(VerticalElement::Grade {
                        start_station: cursor.0,
                        end_station: s_i,
                        start_elev: cursor.1,
                        end_elev: e_i,
                    });
                }
                cursor = (s_i, e_i);
                continue;
            }
            let bvc_s = s_i - length / 2.0;
            let evc_s = s_i + length / 2.0;
            if bvc_s < cursor.0 - 1e-9 || evc_s > s_next + 1e-9 {
                return Err(ProfileError::InvalidCurveLength {
                    station: s_i,
                    length,
                });
            }
            let bvc_e = e_i - g_in * length / 2.0;
            if bvc_s - cursor.0 > 1e-9 {
                elements.push(VerticalElement::Grade {
                    start_station: cursor.0,
                    end_station: bvc_s,
                    start_elev: cursor.1,
                    end_elev: bvc_e,
                });
            }
            elements.push(VerticalElement::Parabola {
                start_station: bvc_s,
                end_station: evc_s,
                start_elev: bvc_e,
                start_grade: g_in,
                end_grade: g_out,
            });
            cursor = (evc_s, e_i + g_out * length / 2.0);
        }
        let end = pvis[pvis.len() - 1];
        if end.0 - cursor.0 > 1e-9 {
            elements.push(VerticalElement::Grade {
                start_station: cursor.0,
                end_station: end.0,
                start_elev: cursor.1,
                end_elev: end.1,
            });
        }
        Self::from_elements(elements)
    }

    pub fn elements(&self) -> &[VerticalElement] {
        &self.elements
    }

    /// Covered station range.
    pub fn station_range(&self) -> Option<(f64, f64)> {
        match (self.elements.first(), self.elements.last()) {
            (Some(first), Some(last)) => Some((first.start_station(), last.end_station())),
            _ => None,
        }
    }

    fn locate(&self, station: f64) -> Option<(&VerticalElement, f64)> {
        let (from, to) = self.station_range()?;
        if station < from - 1e-9 || station > to + 1e-9 {
            return None;
        }
        let s = station.clamp(from, to);
        self.elements
            .iter()
            .find(|e| s >= e.start_station() - 1e-9 && s <= e.end_station() + 1e-9)
            .map(|e| (e, s - e.start_station()))
    }

    /// Elevation at `station`, `None` outside the covered range.
    pub fn elevation_at(&self, station: f64) -> Option<f64> {
        let (e, x) = self.locate(station)?;
        Some(e.elevation(x))
    }

    /// Grade (elevation change per station unit) at `station`.
    pub fn grade_at(&self, station: f64) -> Option<f64> {
        let (e, x) = self.locate(station)?;
        Some(e.grade(x))
    }
}

/// Combined horizontal and vertical alignment.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Alignment {
    pub horizontal: HorizontalAlignment,
    pub vertical: VerticalAlignment,
}

impl Alignment {
    pub fn new(horizontal: HorizontalAlignment, vertical: VerticalAlignment) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    /// 3D point on the alignment at `station`, defined only where both
    /// the horizontal and the vertical alignment cover the station.
    pub fn point3_at(&self, station: f64) -> Option<Point3> {
        let (p, _) = self.horizontal.evaluate(station)?;
        let z = self.vertical.elevation_at(station)?;
        Some(Point3::new(p.x, p.y, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tol() -> ContinuityTolerance {
        ContinuityTolerance::default()
    }

    fn single_tangent() -> HorizontalAlignment {
        HorizontalAlignment::from_tangents(
            0.0,
            vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)],
            tol(),
        )
        .unwrap()
    }

    /// Tangent east, 90 degree left curve, tangent north.
    fn curved_alignment() -> HorizontalAlignment {
        let elements = vec![
            HorizontalElement::Tangent {
                start: Point::new(0.0, 0.0),
                end: Point::new(50.0, 0.0),
            },
            HorizontalElement::Curve {
                arc: Arc::new(Point::new(50.0, 100.0), 100.0, -FRAC_PI_2, 0.0),
            },
            HorizontalElement::Tangent {
                start: Point::new(150.0, 100.0),
                end: Point::new(150.0, 200.0),
            },
        ];
        HorizontalAlignment::new(0.0, elements, tol()).unwrap()
    }

    #[test]
    fn tangent_evaluate_and_offset() {
        let align = single_tangent();
        let (p, heading) = align.evaluate(50.0).unwrap();
        assert!((p.x - 50.0).abs() < 1e-9);
        assert!(p.y.abs() < 1e-9);
        assert!(heading.abs() < 1e-9);
        let o = align.offset_point(50.0, 10.0).unwrap();
        assert!((o.x - 50.0).abs() < 1e-9);
        assert!((o.y - 10.0).abs() < 1e-9);
        assert!(align.evaluate(100.5).is_none());
        assert!(align.evaluate(-0.5).is_none());
    }

    #[test]
    fn start_station_shifts_the_axis() {
        let align = HorizontalAlignment::from_tangents(
            1000.0,
            vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)],
            tol(),
        )
        .unwrap();
        assert!((align.end_station() - 1100.0).abs() < 1e-9);
        assert!(align.evaluate(50.0).is_none());
        let (p, _) = align.evaluate(1050.0).unwrap();
        assert!((p.x - 50.0).abs() < 1e-9);
    }

    #[test]
    fn spiral_geometry() {
        let spiral = Spiral {
            start: Point::new(0.0, 0.0),
            orientation: 0.0,
            length: 50.0,
            start_radius: f64::INFINITY,
            end_radius: 100.0,
        };
        let end = spiral.end_point();
        assert!((end.x - 49.6884029).abs() < 1e-6);
        assert!((end.y - 4.1481024).abs() < 1e-6);
        let dir = spiral.direction_at(50.0);
        assert!((dir.0 - 0.9689124).abs() < 1e-6);
        assert!((dir.1 - 0.2474039).abs() < 1e-6);
        assert!((spiral.curvature_at(0.0)).abs() < 1e-12);
        assert!((spiral.curvature_at(50.0) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn right_hand_spiral_mirrors_left() {
        // negative radius marks a clockwise transition
        let right = Spiral {
            start: Point::new(0.0, 0.0),
            orientation: 0.0,
            length: 50.0,
            start_radius: f64::INFINITY,
            end_radius: -100.0,
        };
        let end = right.end_point();
        assert!((end.x - 49.6884029).abs() < 1e-6);
        assert!((end.y + 4.1481024).abs() < 1e-6);
        let mid = right.point_at(25.0);
        assert!(mid.y < 0.0);
        let dir = right.direction_at(50.0);
        assert!((dir.0 - 0.9689124).abs() < 1e-6);
        assert!((dir.1 + 0.2474039).abs() < 1e-6);
        assert!((right.curvature_at(50.0) + 0.01).abs() < 1e-12);
    }

    #[test]
    fn discontinuous_chains_rejected() {
        let gap = HorizontalAlignment::new(
            0.0,
            vec![
                HorizontalElement::Tangent {
                    start: Point::new(0.0, 0.0),
                    end: Point::new(100.0, 0.0),
                },
                HorizontalElement::Tangent {
                    start: Point::new(100.0, 10.0),
                    end: Point::new(200.0, 10.0),
                },
            ],
            tol(),
        );
        assert!(matches!(
            gap.unwrap_err(),
            AlignmentError::Discontinuous { index: 1, .. }
        ));

        let kink = HorizontalAlignment::new(
            0.0,
            vec![
                HorizontalElement::Tangent {
                    start: Point::new(0.0, 0.0),
                    end: Point::new(100.0, 0.0),
                },
                HorizontalElement::Tangent {
                    start: Point::new(100.0, 0.0),
                    end: Point::new(200.0, 50.0),
                },
            ],
            tol(),
        );
        assert!(matches!(
            kink.unwrap_err(),
            AlignmentError::Discontinuous { index: 1, .. }
        ));
    }

    #[test]
    fn zero_length_element_rejected() {
        let err = HorizontalAlignment::new(
            0.0,
            vec![HorizontalElement::Tangent {
                start: Point::new(1.0, 1.0),
                end: Point::new(1.0, 1.0),
            }],
            tol(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AlignmentError::ZeroLengthElement { index: 0 }
        ));
    }

    #[test]
    fn curved_alignment_is_continuous() {
        let align = curved_alignment();
        let (p, heading) = align.evaluate(50.0).unwrap();
        assert!((p.x - 50.0).abs() < 1e-9);
        assert!(p.y.abs() < 1e-9);
        assert!(heading.abs() < 1e-9);
        let arc_len = 100.0 * FRAC_PI_2;
        let (p, heading) = align.evaluate(50.0 + arc_len).unwrap();
        assert!((p.x - 150.0).abs() < 1e-6);
        assert!((p.y - 100.0).abs() < 1e-6);
        assert!((heading - FRAC_PI_2).abs() < 1e-9);
        assert!((align.length() - (150.0 + arc_len)).abs() < 1e-9);
    }

    #[test]
    fn projection_round_trip() {
        let align = curved_alignment();
        for &station in &[10.0, 120.0, 230.0] {
            for &offset in &[-5.0, 0.0, 7.0] {
                let p = align.offset_point(station, offset).unwrap();
                let (s, o) = align.station_offset_of(p.x, p.y).unwrap();
                assert!((s - station).abs() < 1e-6, "station {station} offset {offset}");
                assert!((o - offset).abs() < 1e-6, "station {station} offset {offset}");
            }
        }
    }

    #[test]
    fn projection_round_trip_on_spiral() {
        let spiral = Spiral {
            start: Point::new(0.0, 0.0),
            orientation: 0.0,
            length: 50.0,
            start_radius: f64::INFINITY,
            end_radius: 100.0,
        };
        let align =
            HorizontalAlignment::new(0.0, vec![HorizontalElement::Spiral { spiral }], tol())
                .unwrap();
        for &station in &[5.0, 25.0, 45.0] {
            for &offset in &[-3.0, 0.0, 3.0] {
                let p = align.offset_point(station, offset).unwrap();
                let (s, o) = align.station_offset_of(p.x, p.y).unwrap();
                assert!((s - station).abs() < 1e-6);
                assert!((o - offset).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn projection_beyond_ends() {
        let align = single_tangent();
        assert!(matches!(
            align.station_offset_of(-10.0, 5.0),
            Err(ProjectionError::NotOnAlignment { .. })
        ));
        assert!(matches!(
            align.station_offset_of(110.0, 0.0),
            Err(ProjectionError::NotOnAlignment { .. })
        ));
        let (s, o) = align.station_offset_of(50.0, 30.0).unwrap();
        assert!((s - 50.0).abs() < 1e-9);
        assert!((o - 30.0).abs() < 1e-9);
        // perpendicular at the very start still projects
        let (s, o) = align.station_offset_of(0.0, 4.0).unwrap();
        assert!(s.abs() < 1e-9);
        assert!((o - 4.0).abs() < 1e-9);
    }

    #[test]
    fn grade_profile_is_strict() {
        let profile = VerticalAlignment::from_elements(vec![VerticalElement::Grade {
            start_station: 0.0,
            end_station: 100.0,
            start_elev: 10.0,
            end_elev: 12.0,
        }])
        .unwrap();
        assert!((profile.elevation_at(0.0).unwrap() - 10.0).abs() < 1e-9);
        assert!((profile.elevation_at(50.0).unwrap() - 11.0).abs() < 1e-9);
        assert!((profile.elevation_at(100.0).unwrap() - 12.0).abs() < 1e-9);
        assert!((profile.grade_at(50.0).unwrap() - 0.02).abs() < 1e-12);
        assert!(profile.elevation_at(-1.0).is_none());
        assert!(profile.elevation_at(101.0).is_none());
    }

    #[test]
    fn crest_curve_from_pvis() {
        let profile =
            VerticalAlignment::from_pvis(&[(0.0, 100.0), (100.0, 102.0), (200.0, 100.0)], &[40.0])
                .unwrap();
        assert_eq!(profile.elements().len(), 3);
        assert!((profile.elevation_at(80.0).unwrap() - 101.6).abs() < 1e-9);
        assert!((profile.elevation_at(100.0).unwrap() - 101.8).abs() < 1e-9);
        assert!((profile.elevation_at(120.0).unwrap() - 101.6).abs() < 1e-9);
        assert!((profile.grade_at(80.0).unwrap() - 0.02).abs() < 1e-9);
        assert!(profile.grade_at(100.0).unwrap().abs() < 1e-9);
        assert!((profile.grade_at(120.0).unwrap() + 0.02).abs() < 1e-9);
        // grade is continuous where the parabola meets the tangents
        let before = profile.grade_at(79.999).unwrap();
        let after = profile.grade_at(80.001).unwrap();
        assert!((before - after).abs() < 1e-3);
    }

    #[test]
    fn zero_curve_length_leaves_angle_point() {
        let profile =
            VerticalAlignment::from_pvis(&[(0.0, 0.0), (50.0, 5.0), (100.0, 0.0)], &[0.0])
                .unwrap();
        assert_eq!(profile.elements().len(), 2);
        assert!((profile.grade_at(25.0).unwrap() - 0.1).abs() < 1e-12);
        assert!((profile.grade_at(75.0).unwrap() + 0.1).abs() < 1e-12);
        assert!((profile.elevation_at(50.0).unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn profile_coverage_validation() {
        let gap = VerticalAlignment::from_elements(vec![
            VerticalElement::Grade {
                start_station: 0.0,
                end_station: 50.0,
                start_elev: 0.0,
                end_elev: 1.0,
            },
            VerticalElement::Grade {
                start_station: 60.0,
                end_station: 100.0,
                start_elev: 1.0,
                end_elev: 2.0,
            },
        ]);
        assert!(matches!(gap.unwrap_err(), ProfileError::CoverageGap { .. }));

        let overlap = VerticalAlignment::from_elements(vec![
            VerticalElement::Grade {
                start_station: 0.0,
                end_station: 50.0,
                start_elev: 0.0,
                end_elev: 1.0,
            },
            VerticalElement::Grade {
                start_station: 40.0,
                end_station: 100.0,
                start_elev: 1.0,
                end_elev: 2.0,
            },
        ]);
        assert!(matches!(overlap.unwrap_err(), ProfileError::Overlap { .. }));

        let jump = VerticalAlignment::from_elements(vec![
            VerticalElement::Grade {
                start_station: 0.0,
                end_station: 50.0,
                start_elev: 0.0,
                end_elev: 1.0,
            },
            VerticalElement::Grade {
                start_station: 50.0,
                end_station: 100.0,
                start_elev: 3.0,
                end_elev: 4.0,
            },
        ]);
        assert!(matches!(
            jump.unwrap_err(),
            ProfileError::ElevationJump { .. }
        ));
    }

    #[test]
    fn oversized_curve_rejected() {
        let err =
            VerticalAlignment::from_pvis(&[(0.0, 0.0), (50.0, 5.0), (100.0, 0.0)], &[200.0])
                .unwrap_err();
        assert!(matches!(err, ProfileError::InvalidCurveLength { .. }));
        let err = VerticalAlignment::from_pvis(&[(0.0, 0.0), (100.0, 1.0)], &[10.0]).unwrap_err();
        assert!(matches!(
            err,
            ProfileError::CurveCountMismatch {
                expected: 0,
                got: 1
            }
        ));
    }

    #[test]
    fn combined_alignment_point3() {
        let horizontal = single_tangent();
        let vertical = VerticalAlignment::from_elements(vec![VerticalElement::Grade {
            start_station: 0.0,
            end_station: 100.0,
            start_elev: 0.0,
            end_elev: 5.0,
        }])
        .unwrap();
        let align = Alignment::new(horizontal, vertical);
        let p = align.point3_at(50.0).unwrap();
        assert!((p.x - 50.0).abs() < 1e-9);
        assert!(p.y.abs() < 1e-9);
        assert!((p.z - 2.5).abs() < 1e-9);
        assert!(align.point3_at(200.0).is_none());
    }
}
