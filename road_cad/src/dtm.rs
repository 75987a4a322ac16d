//! Triangulated terrain surfaces built from survey points.
//!
//! A [`Tin`] is an immutable snapshot: once built it only answers
//! queries. Rebuilding with different points or constraints means a
//! fresh construction call.

use std::collections::HashMap;

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::cancel::{CancelToken, Cancelled};
use crate::geometry::{
    distance, orientation, polygon_area, polygon_area3, segments_intersect, Point, Point3,
    Polyline,
};
use crate::pointset::{DuplicatePolicy, PointSet};

/// Slack applied to barycentric coordinates so queries on triangle
/// edges and vertices resolve to the adjacent triangle instead of
/// falling through as a miss.
const BARY_EPS: f64 = 1e-9;

/// Slack applied when mapping query coordinates onto locator grid
/// cells.
const GRID_EPS: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("triangulation needs at least 3 unique points, got {0}")]
    InsufficientPoints(usize),
    #[error("points are collinear or coincident, no triangulation exists")]
    DegenerateGeometry,
    #[error("boundary or hole polygon is not a simple closed ring")]
    InvalidBoundary,
    #[error("constraint references point index {0} which is out of range")]
    InvalidConstraint(usize),
    #[error("face references vertex index {0} which is out of range")]
    InvalidFace(usize),
    #[error("duplicate point at index {index}: ({x}, {y})")]
    DuplicatePoint { index: usize, x: f64, y: f64 },
    #[error("constrained triangulation failed: {0}")]
    Triangulation(String),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Drops points sharing an exact plan position according to `policy` and
/// returns the kept points plus a map from original index to kept index.
fn dedup_points(
    points: Vec<Point3>,
    policy: DuplicatePolicy,
) -> Result<(Vec<Point3>, Vec<usize>), SurfaceError> {
    let mut kept: Vec<Point3> = Vec::with_capacity(points.len());
    let mut remap: Vec<usize> = Vec::with_capacity(points.len());
    let mut seen: HashMap<(u64, u64), usize> = HashMap::new();
    for (i, p) in points.into_iter().enumerate() {
        let key = (p.x.to_bits(), p.y.to_bits());
        match seen.get(&key) {
            Some(&id) => match policy {
                DuplicatePolicy::Reject => {
                    return Err(SurfaceError::DuplicatePoint {
                        index: i,
                        x: p.x,
                        y: p.y,
                    })
                }
                DuplicatePolicy::KeepFirst => remap.push(id),
                DuplicatePolicy::KeepLast => {
                    kept[id] = p;
                    remap.push(id);
                }
            },
            None => {
                let id = kept.len();
                seen.insert(key, id);
                kept.push(p);
                remap.push(id);
            }
        }
    }
    Ok((kept, remap))
}

fn barycentric(p: Point, a: Point3, b: Point3, c: Point3) -> Option<(f64, f64, f64)> {
    let det = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
    if det.abs() < f64::EPSILON {
        return None;
    }
    let u = ((b.y - c.y) * (p.x - c.x) + (c.x - b.x) * (p.y - c.y)) / det;
    let v = ((c.y - a.y) * (p.x - c.x) + (a.x - c.x) * (p.y - c.y)) / det;
    let w = 1.0 - u - v;
    Some((u, v, w))
}

/// Returns `true` if `p` lies strictly between `a` and `b` in plan view,
/// within `tol` of the segment.
fn point_on_segment_2d(a: Point3, b: Point3, p: Point3, tol: f64) -> bool {
    let abx = b.x - a.x;
    let aby = b.y - a.y;
    let apx = p.x - a.x;
    let apy = p.y - a.y;
    let len2 = abx * abx + aby * aby;
    if len2 <= f64::EPSILON {
        return false;
    }
    let cross = abx * apy - aby * apx;
    if cross.abs() > tol * len2.sqrt() {
        return false;
    }
    let t = (apx * abx + apy * aby) / len2;
    t > tol && t < 1.0 - tol
}

/// Splits constrained edges at every input point lying on them. The
/// triangulator rejects fixed edges passing through a vertex, so such
/// edges are replaced by their collinear sub-segments.
fn split_edges_at_points(points: &[Point3], edges: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut refined = Vec::new();
    for &(a, b) in edges {
        let pa = points[a];
        let pb = points[b];
        let mut on_edge: Vec<(usize, f64)> = Vec::new();
        for (i, p) in points.iter().enumerate() {
            if i == a || i == b {
                continue;
            }
            if point_on_segment_2d(pa, pb, *p, 1e-9) {
                on_edge.push((i, (p.x - pa.x).hypot(p.y - pa.y)));
            }
        }
        on_edge.sort_by(|x, y| x.1.total_cmp(&y.1));
        let mut last = a;
        for (idx, _) in on_edge {
            refined.push((last, idx));
            last = idx;
        }
        refined.push((last, b));
    }
    for e in &mut refined {
        if e.0 > e.1 {
            *e = (e.1, e.0);
        }
    }
    refined.sort_unstable();
    refined.dedup();
    refined
}

fn intersect_edge(a: Point3, b: Point3, level: f64) -> Option<Point3> {
    let da = a.z - level;
    let db = b.z - level;
    if da * db > 0.0 || (da - db).abs() < f64::EPSILON {
        None
    } else {
        let t = da / (da - db);
        Some(Point3::new(
            a.x + t * (b.x - a.x),
            a.y + t * (b.y - a.y),
            level,
        ))
    }
}

fn points_close(a: Point3, b: Point3, tol: f64) -> bool {
    (a.x - b.x).abs() <= tol && (a.y - b.y).abs() <= tol && (a.z - b.z).abs() <= tol
}

fn segments_to_polylines(segs: &[(Point3, Point3)], tol: f64) -> Vec<Vec<Point3>> {
    let mut remaining: Vec<(Point3, Point3)> = segs.to_vec();
    let mut out = Vec::new();
    while let Some((a, b)) = remaining.pop() {
        let mut line = vec![a, b];
        let mut extended = true;
        while extended {
            extended = false;
            let last = *line.last().unwrap();
            for i in 0..remaining.len() {
                let seg = remaining[i];
                if points_close(seg.0, last, tol) {
                    line.push(seg.1);
                    remaining.swap_remove(i);
                    extended = true;
                    break;
                } else if points_close(seg.1, last, tol) {
                    line.push(seg.0);
                    remaining.swap_remove(i);
                    extended = true;
                    break;
                }
            }
        }
        out.push(line);
    }
    out
}

/// Uniform grid over triangle bounding boxes for point location.
/// Cells list triangle indices in ascending order so the first hit is
/// the lowest-index triangle, keeping edge queries deterministic.
#[derive(Debug, Clone)]
struct TriangleLocator {
    min_x: f64,
    min_y: f64,
    cell_w: f64,
    cell_h: f64,
    n: usize,
    cells: Vec<Vec<u32>>,
}

impl TriangleLocator {
    fn build(vertices: &[Point3], triangles: &[[usize; 3]]) -> Self {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for v in vertices {
            min_x = min_x.min(v.x);
            min_y = min_y.min(v.y);
            max_x = max_x.max(v.x);
            max_y = max_y.max(v.y);
        }
        let n = ((triangles.len() as f64).sqrt().ceil() as usize).clamp(1, 256);
        let cell_w = ((max_x - min_x) / n as f64).max(GRID_EPS);
        let cell_h = ((max_y - min_y) / n as f64).max(GRID_EPS);
        let mut cells = vec![Vec::new(); n * n];
        for (ti, tri) in triangles.iter().enumerate() {
            let a = vertices[tri[0]];
            let b = vertices[tri[1]];
            let c = vertices[tri[2]];
            let c0 = (((a.x.min(b.x).min(c.x) - min_x) / cell_w) as usize).min(n - 1);
            let c1 = (((a.x.max(b.x).max(c.x) - min_x) / cell_w) as usize).min(n - 1);
            let r0 = (((a.y.min(b.y).min(c.y) - min_y) / cell_h) as usize).min(n - 1);
            let r1 = (((a.y.max(b.y).max(c.y) - min_y) / cell_h) as usize).min(n - 1);
            for r in r0..=r1 {
                for col in c0..=c1 {
                    cells[r * n + col].push(ti as u32);
                }
            }
        }
        Self {
            min_x,
            min_y,
            cell_w,
            cell_h,
            n,
            cells,
        }
    }

    fn candidates(&self, x: f64, y: f64) -> Option<&[u32]> {
        let dx = x - self.min_x;
        let dy = y - self.min_y;
        if dx < -GRID_EPS || dy < -GRID_EPS {
            return None;
        }
        if dx > self.cell_w * self.n as f64 + GRID_EPS || dy > self.cell_h * self.n as f64 + GRID_EPS
        {
            return None;
        }
        let col = ((dx / self.cell_w) as usize).min(self.n - 1);
        let row = ((dy / self.cell_h) as usize).min(self.n - 1);
        Some(&self.cells[row * self.n + col])
    }
}

/// Triangulated Irregular Network over the plan projection of 3D points.
///
/// Triangles are stored counter-clockwise in plan view. The point
/// locator is built lazily on first query and is not serialized.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Tin {
    vertices: Vec<Point3>,
    triangles: Vec<[usize; 3]>,
    #[serde(skip)]
    locator: OnceCell<TriangleLocator>,
}

impl Tin {
    /// Builds an unconstrained Delaunay TIN. Duplicate plan positions
    /// are resolved by `policy` before triangulation.
    pub fn from_points(points: Vec<Point3>, policy: DuplicatePolicy) -> Result<Self, SurfaceError> {
        let (points, _) = dedup_points(points, policy)?;
        if points.len() < 3 {
            return Err(SurfaceError::InsufficientPoints(points.len()));
        }
        let triangles = delaunay_triangles(&points)?;
        Ok(Self::assemble(points, triangles))
    }

    /// Builds a TIN from a point set, inheriting its duplicate policy.
    pub fn from_point_set(set: &PointSet) -> Result<Self, SurfaceError> {
        Self::from_points(set.positions(), set.policy())
    }

    /// Rebuilds a surface from explicit vertices and triangle indices,
    /// as carried by interchange files. Triangle winding is normalized;
    /// faces referencing missing vertices are rejected.
    pub fn from_parts(
        vertices: Vec<Point3>,
        triangles: Vec<[usize; 3]>,
    ) -> Result<Self, SurfaceError> {
        if vertices.len() < 3 {
            return Err(SurfaceError::InsufficientPoints(vertices.len()));
        }
        if triangles.is_empty() {
            return Err(SurfaceError::DegenerateGeometry);
        }
        for tri in &triangles {
            for &i in tri {
                if i >= vertices.len() {
                    return Err(SurfaceError::InvalidFace(i));
                }
            }
        }
        Ok(Self::assemble(vertices, triangles))
    }

    /// Builds a constrained TIN. `breaklines` are index pairs into
    /// `points` enforced as triangle edges. `outer_boundary` is a closed
    /// ring limiting the surface extent; when omitted but other
    /// constraints are present, the convex hull is used so the
    /// constrained triangulation always has a closed outer loop. `holes`
    /// are closed rings whose interiors are excluded. Ring indices may
    /// repeat the first entry at the end.
    pub fn from_points_constrained(
        points: Vec<Point3>,
        breaklines: Option<&[(usize, usize)]>,
        outer_boundary: Option<&[usize]>,
        holes: &[Vec<usize>],
        policy: DuplicatePolicy,
        cancel: &CancelToken,
    ) -> Result<Self, SurfaceError> {
        cancel.check()?;
        let (points, remap) = dedup_points(points, policy)?;
        if points.len() < 3 {
            return Err(SurfaceError::InsufficientPoints(points.len()));
        }

        let mut breakline_edges: Vec<(usize, usize)> = Vec::new();
        if let Some(bl) = breaklines {
            for &(a, b) in bl {
                let a = *remap.get(a).ok_or(SurfaceError::InvalidConstraint(a))?;
                let b = *remap.get(b).ok_or(SurfaceError::InvalidConstraint(b))?;
                if a == b {
                    log::warn!("breakline collapsed to a single point, dropped");
                    continue;
                }
                breakline_edges.push((a, b));
            }
        }

        let mut rings: Vec<Vec<usize>> = Vec::new();
        if let Some(bound) = outer_boundary {
            rings.push(closed_ring(bound, &remap, &points)?);
        }
        for hole in holes {
            rings.push(closed_ring(hole, &remap, &points)?);
        }

        if breakline_edges.is_empty() && rings.is_empty() {
            let triangles = delaunay_triangles(&points)?;
            return Ok(Self::assemble(points, triangles));
        }

        if outer_boundary.is_none() {
            let hull = convex_hull_ring(&points)?;
            rings.insert(0, hull);
        }

        let mut edges = breakline_edges;
        for ring in &rings {
            for w in ring.windows(2) {
                edges.push((w[0], w[1]));
            }
            edges.push((*ring.last().unwrap(), ring[0]));
        }
        let edges = split_edges_at_points(&points, &edges);

        cancel.check()?;
        let coords: Vec<(f64, f64)> = points.iter().map(|p| (p.x, p.y)).collect();
        let tris = cdt::triangulate_with_edges(&coords, &edges)
            .map_err(|e| SurfaceError::Triangulation(format!("{e:?}")))?;
        let triangles: Vec<[usize; 3]> = tris.into_iter().map(|t| [t.0, t.1, t.2]).collect();
        if triangles.is_empty() {
            return Err(SurfaceError::DegenerateGeometry);
        }
        cancel.check()?;
        Ok(Self::assemble(points, triangles))
    }

    fn assemble(vertices: Vec<Point3>, mut triangles: Vec<[usize; 3]>) -> Self {
        for tri in &mut triangles {
            let a = vertices[tri[0]];
            let b = vertices[tri[1]];
            let c = vertices[tri[2]];
            if orientation(
                Point::new(a.x, a.y),
                Point::new(b.x, b.y),
                Point::new(c.x, c.y),
            ) < 0.0
            {
                tri.swap(1, 2);
            }
        }
        log::debug!(
            "assembled tin with {} vertices and {} triangles",
            vertices.len(),
            triangles.len()
        );
        Self {
            vertices,
            triangles,
            locator: OnceCell::new(),
        }
    }

    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    fn locator(&self) -> &TriangleLocator {
        self.locator
            .get_or_init(|| TriangleLocator::build(&self.vertices, &self.triangles))
    }

    /// Returns the interpolated elevation at (x, y), or `None` outside
    /// the surface. Queries on a shared edge resolve to the lowest-index
    /// adjacent triangle; both planes agree there, so the result is the
    /// same either way.
    pub fn elevation_at(&self, x: f64, y: f64) -> Option<f64> {
        let candidates = self.locator().candidates(x, y)?;
        let p = Point::new(x, y);
        for &ti in candidates {
            let tri = self.triangles[ti as usize];
            let a = self.vertices[tri[0]];
            let b = self.vertices[tri[1]];
            let c = self.vertices[tri[2]];
            if let Some((u, v, w)) = barycentric(p, a, b, c) {
                if u >= -BARY_EPS && v >= -BARY_EPS && w >= -BARY_EPS {
                    return Some(u * a.z + v * b.z + w * c.z);
                }
            }
        }
        None
    }

    /// Parameters in [0, 1] along the segment `a..b` where the surface
    /// must be sampled: both endpoints plus every triangle edge
    /// crossing, ascending and deduplicated.
    pub(crate) fn section_params(&self, a: Point, b: Point) -> Vec<f64> {
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let mut params = vec![0.0, 1.0];
        for tri in &self.triangles {
            for k in 0..3 {
                let p = self.vertices[tri[k]];
                let q = self.vertices[tri[(k + 1) % 3]];
                let ex = q.x - p.x;
                let ey = q.y - p.y;
                let denom = dx * ey - dy * ex;
                if denom.abs() < 1e-12 {
                    continue;
                }
                let t = ((p.x - a.x) * ey - (p.y - a.y) * ex) / denom;
                let u = ((p.x - a.x) * dy - (p.y - a.y) * dx) / denom;
                if t > 0.0 && t < 1.0 && (-1e-12..=1.0 + 1e-12).contains(&u) {
                    params.push(t);
                }
            }
        }
        params.sort_by(|x, y| x.total_cmp(y));
        params.dedup_by(|x, y| (*x - *y).abs() < 1e-9);
        params
    }

    /// Vertical section through the surface along the segment `p0..p1`.
    /// Returns (distance from `p0`, elevation) pairs sorted by distance,
    /// with a sample at each endpoint and each triangle edge crossing.
    /// Samples outside the surface are omitted.
    pub fn section_along_line(&self, p0: Point, p1: Point) -> Vec<(f64, f64)> {
        let len = distance(p0, p1);
        let mut out = Vec::new();
        for t in self.section_params(p0, p1) {
            let x = p0.x + (p1.x - p0.x) * t;
            let y = p0.y + (p1.y - p0.y) * t;
            if let Some(z) = self.elevation_at(x, y) {
                out.push((t * len, z));
            }
        }
        out
    }

    /// Merges this TIN with `other`. Vertices of `other` within
    /// `tolerance` of an existing vertex are discarded, then the surface
    /// is rebuilt unconstrained over the union.
    pub fn merge_with(&self, other: &Tin, tolerance: f64) -> Result<Tin, SurfaceError> {
        let mut points = self.vertices.clone();
        for v in &other.vertices {
            if !points.iter().any(|p| {
                (p.x - v.x).hypot(p.y - v.y) <= tolerance && (p.z - v.z).abs() <= tolerance
            }) {
                points.push(*v);
            }
        }
        Tin::from_points(points, DuplicatePolicy::KeepFirst)
    }

    /// Contour line segments at every multiple of `interval` within the
    /// elevation range. Levels are derived from the multiple index so
    /// repeated accumulation cannot drift.
    pub fn contour_segments(&self, interval: f64) -> Vec<(Point3, Point3)> {
        if interval <= 0.0 || self.vertices.is_empty() {
            return Vec::new();
        }
        let (min_z, max_z) = match self.elevation_range() {
            Some(r) => r,
            None => return Vec::new(),
        };
        let k0 = (min_z / interval).ceil() as i64;
        let k1 = (max_z / interval).floor() as i64;
        let mut segments = Vec::new();
        for k in k0..=k1 {
            let level = k as f64 * interval;
            for tri in &self.triangles {
                let a = self.vertices[tri[0]];
                let b = self.vertices[tri[1]];
                let c = self.vertices[tri[2]];
                let tmin = a.z.min(b.z).min(c.z);
                let tmax = a.z.max(b.z).max(c.z);
                if level < tmin || level > tmax {
                    continue;
                }
                let mut pts = Vec::new();
                if let Some(p) = intersect_edge(a, b, level) {
                    pts.push(p);
                }
                if let Some(p) = intersect_edge(b, c, level) {
                    pts.push(p);
                }
                if let Some(p) = intersect_edge(c, a, level) {
                    pts.push(p);
                }
                if pts.len() == 2 {
                    segments.push((pts[0], pts[1]));
                }
            }
        }
        segments
    }

    /// Contour polylines at the given interval. `smooth` is the number
    /// of corner-cutting iterations applied in plan; elevations are
    /// constant per contour and preserved.
    pub fn contour_polylines(&self, interval: f64, smooth: usize) -> Vec<Vec<Point3>> {
        let segs = self.contour_segments(interval);
        let mut out = Vec::new();
        for pts in segments_to_polylines(&segs, 1e-8) {
            if smooth == 0 {
                out.push(pts);
                continue;
            }
            let level = pts[0].z;
            let plan: Vec<Point> = pts.iter().map(|p| Point::new(p.x, p.y)).collect();
            let smoothed = Polyline::new(plan).smooth(smooth);
            out.push(
                smoothed
                    .vertices
                    .into_iter()
                    .map(|p| Point3::new(p.x, p.y, level))
                    .collect(),
            );
        }
        out
    }

    /// Lowest and highest vertex elevation, `None` for an empty surface.
    pub fn elevation_range(&self) -> Option<(f64, f64)> {
        if self.vertices.is_empty() {
            return None;
        }
        let min = self.vertices.iter().map(|p| p.z).fold(f64::INFINITY, f64::min);
        let max = self
            .vertices
            .iter()
            .map(|p| p.z)
            .fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }

    /// Horizontal (plan projection) area covered by the triangulation.
    pub fn plan_area(&self) -> f64 {
        self.triangles
            .iter()
            .map(|t| {
                let a = self.vertices[t[0]];
                let b = self.vertices[t[1]];
                let c = self.vertices[t[2]];
                polygon_area(&[
                    Point::new(a.x, a.y),
                    Point::new(b.x, b.y),
                    Point::new(c.x, c.y),
                ])
            })
            .sum()
    }

    /// True 3D surface area of the triangulation.
    pub fn surface_area(&self) -> f64 {
        self.triangles
            .iter()
            .map(|t| polygon_area3(&[self.vertices[t[0]], self.vertices[t[1]], self.vertices[t[2]]]))
            .sum()
    }
}

fn delaunay_triangles(points: &[Point3]) -> Result<Vec<[usize; 3]>, SurfaceError> {
    let coords: Vec<delaunator::Point> = points
        .iter()
        .map(|p| delaunator::Point { x: p.x, y: p.y })
        .collect();
    let triangulation = delaunator::triangulate(&coords);
    let triangles: Vec<[usize; 3]> = triangulation
        .triangles
        .chunks(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect();
    if triangles.is_empty() {
        return Err(SurfaceError::DegenerateGeometry);
    }
    Ok(triangles)
}

fn convex_hull_ring(points: &[Point3]) -> Result<Vec<usize>, SurfaceError> {
    let coords: Vec<delaunator::Point> = points
        .iter()
        .map(|p| delaunator::Point { x: p.x, y: p.y })
        .collect();
    let triangulation = delaunator::triangulate(&coords);
    if triangulation.hull.len() < 3 {
        return Err(SurfaceError::DegenerateGeometry);
    }
    Ok(triangulation.hull)
}

/// Remaps a ring through the dedup map, strips the closing repeat and
/// collapsed neighbours, and validates it as a simple polygon.
fn closed_ring(
    ring: &[usize],
    remap: &[usize],
    points: &[Point3],
) -> Result<Vec<usize>, SurfaceError> {
    let mut out: Vec<usize> = Vec::with_capacity(ring.len());
    for &i in ring {
        let v = *remap.get(i).ok_or(SurfaceError::InvalidConstraint(i))?;
        if out.last() != Some(&v) {
            out.push(v);
        }
    }
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    if out.len() < 3 {
        return Err(SurfaceError::InvalidBoundary);
    }
    let n = out.len();
    for i in 0..n {
        let a1 = points[out[i]];
        let a2 = points[out[(i + 1) % n]];
        for j in (i + 1)..n {
            if (i + 1) % n == j || (j + 1) % n == i {
                continue;
            }
            let b1 = points[out[j]];
            let b2 = points[out[(j + 1) % n]];
            if segments_intersect(
                Point::new(a1.x, a1.y),
                Point::new(a2.x, a2.y),
                Point::new(b1.x, b1.y),
                Point::new(b2.x, b2.y),
            ) {
                return Err(SurfaceError::InvalidBoundary);
            }
        }
    }
    Ok(out)
}
