//! Basic geometry primitives shared by the surface and alignment modules.

/// Representation of a 2D point.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Representation of a 3D point.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Calculates the Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
}

/// Calculates the Euclidean distance between two 3D points.
pub fn distance3(a: Point3, b: Point3) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2) + (b.z - a.z).powi(2)).sqrt()
}

/// Twice the signed area of the triangle (a, b, c); positive when the
/// triple winds counter-clockwise.
pub fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Calculates the area of a simple polygon using the shoelace formula.
pub fn polygon_area(vertices: &[Point]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..vertices.len() {
        let j = (i + 1) % vertices.len();
        sum += vertices[i].x * vertices[j].y - vertices[j].x * vertices[i].y;
    }
    sum.abs() * 0.5
}

fn cross(a: Point3, b: Point3) -> Point3 {
    Point3 {
        x: a.y * b.z - a.z * b.y,
        y: a.z * b.x - a.x * b.z,
        z: a.x * b.y - a.y * b.x,
    }
}

fn subtract(a: Point3, b: Point3) -> Point3 {
    Point3::new(a.x - b.x, a.y - b.y, a.z - b.z)
}

/// Calculates the area of a planar polygon in 3D space.
pub fn polygon_area3(vertices: &[Point3]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut sum = Point3::new(0.0, 0.0, 0.0);
    for i in 1..(vertices.len() - 1) {
        let v0 = subtract(vertices[i], vertices[0]);
        let v1 = subtract(vertices[i + 1], vertices[0]);
        let c = cross(v0, v1);
        sum.x += c.x;
        sum.y += c.y;
        sum.z += c.z;
    }
    0.5 * (sum.x.powi(2) + sum.y.powi(2) + sum.z.powi(2)).sqrt()
}

fn within_bounds(a: Point, b: Point, p: Point) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Returns `true` if segments a1-a2 and b1-b2 intersect. Touching
/// endpoints and collinear overlap both count as intersections.
pub fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);
    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    (d1 == 0.0 && within_bounds(b1, b2, a1))
        || (d2 == 0.0 && within_bounds(b1, b2, a2))
        || (d3 == 0.0 && within_bounds(a1, a2, b1))
        || (d4 == 0.0 && within_bounds(a1, a2, b2))
}

/// Representation of a circular arc defined by its center, radius and start/end
/// angles (in radians). The sweep direction follows the sign of
/// `end_angle - start_angle`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Arc {
    pub center: Point,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

impl Arc {
    /// Creates a new `Arc`.
    pub fn new(center: Point, radius: f64, start_angle: f64, end_angle: f64) -> Self {
        Self {
            center,
            radius,
            start_angle,
            end_angle,
        }
    }

    /// Returns the length of the arc.
    pub fn length(&self) -> f64 {
        let sweep = (self.end_angle - self.start_angle).abs();
        self.radius * sweep
    }
}

/// Representation of a series of connected line segments.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Polyline {
    pub vertices: Vec<Point>,
}

impl Polyline {
    /// Creates a new polyline from a list of vertices.
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    /// Returns the total length of all segments in the polyline.
    pub fn length(&self) -> f64 {
        self.vertices
            .windows(2)
            .map(|pair| distance(pair[0], pair[1]))
            .sum()
    }

    /// Returns a smoothed copy produced by Chaikin corner cutting. End
    /// vertices are preserved.
    pub fn smooth(&self, iterations: usize) -> Polyline {
        let mut pts = self.vertices.clone();
        for _ in 0..iterations {
            if pts.len() < 3 {
                break;
            }
            let first = pts[0];
            let last = pts[pts.len() - 1];
            let mut out = Vec::with_capacity(pts.len() * 2);
            out.push(first);
            for pair in pts.windows(2) {
                let a = pair[0];
                let b = pair[1];
                out.push(Point::new(0.75 * a.x + 0.25 * b.x, 0.75 * a.y + 0.25 * b.y));
                out.push(Point::new(0.25 * a.x + 0.75 * b.x, 0.25 * a.y + 0.75 * b.y));
            }
            out.push(last);
            pts = out;
        }
        Polyline::new(pts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_3_4_5() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(distance(a, b), 5.0);
    }

    #[test]
    fn polygon_area_square() {
        let square = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        assert!((polygon_area(&square) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn arc_length_quarter_circle() {
        let arc = Arc::new(Point::new(0.0, 0.0), 1.0, 0.0, std::f64::consts::FRAC_PI_2);
        assert!((arc.length() - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn polyline_length() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(3.0, 4.0),
            Point::new(6.0, 8.0),
        ];
        let pl = Polyline::new(pts);
        assert!((pl.length() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn polyline_smooth_preserves_ends() {
        let pl = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 0.0),
        ]);
        let smoothed = pl.smooth(2);
        assert!(smoothed.vertices.len() > pl.vertices.len());
        assert_eq!(smoothed.vertices[0], Point::new(0.0, 0.0));
        assert_eq!(*smoothed.vertices.last().unwrap(), Point::new(2.0, 0.0));
        let max_y = smoothed.vertices.iter().map(|p| p.y).fold(0.0, f64::max);
        assert!(max_y < 1.0);
    }

    #[test]
    fn orientation_signs() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(1.0, 0.0);
        assert!(orientation(a, b, Point::new(0.0, 1.0)) > 0.0);
        assert!(orientation(a, b, Point::new(0.0, -1.0)) < 0.0);
        assert_eq!(orientation(a, b, Point::new(2.0, 0.0)), 0.0);
    }

    #[test]
    fn segment_intersection_cases() {
        let a1 = Point::new(0.0, 0.0);
        let a2 = Point::new(2.0, 2.0);
        assert!(segments_intersect(
            a1,
            a2,
            Point::new(0.0, 2.0),
            Point::new(2.0, 0.0)
        ));
        assert!(!segments_intersect(
            a1,
            a2,
            Point::new(3.0, 0.0),
            Point::new(4.0, 1.0)
        ));
        // touching at an endpoint counts
        assert!(segments_intersect(
            a1,
            a2,
            Point::new(2.0, 2.0),
            Point::new(3.0, 0.0)
        ));
    }

    #[test]
    fn polygon_area3_triangle() {
        let tri = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        assert!((polygon_area3(&tri) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn line3_distance() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 2.0, 2.0);
        assert!((distance3(a, b) - 3.0).abs() < 1e-6);
    }
}
