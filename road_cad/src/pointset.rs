//! Validated survey point collections.

use std::collections::HashMap;

use thiserror::Error;

use crate::geometry::Point3;

/// Representation of a survey point with optional point number and description.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyPoint {
    pub position: Point3,
    pub code: Option<u32>,
    pub description: Option<String>,
}

impl SurveyPoint {
    /// Creates a bare survey point without code or description.
    pub fn new(position: Point3) -> Self {
        Self {
            position,
            code: None,
            description: None,
        }
    }

    pub fn with_attributes(position: Point3, code: Option<u32>, description: Option<String>) -> Self {
        Self {
            position,
            code,
            description,
        }
    }
}

/// Policy applied when two points share the exact same plan position.
/// Identity is the bit pattern of `(x, y)`, so values that differ below
/// f64 precision are distinct points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DuplicatePolicy {
    /// Construction fails on the first duplicate.
    #[default]
    Reject,
    /// The earlier point wins and later ones are dropped.
    KeepFirst,
    /// The later point replaces the earlier one in place; ids are stable.
    KeepLast,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PointSetError {
    #[error("duplicate point at index {index}: ({x}, {y})")]
    DuplicatePoint { index: usize, x: f64, y: f64 },
}

/// Ordered collection of survey points. Ids are insertion indices and
/// stay valid for the lifetime of the set, so exports preserve the
/// original ordering.
#[derive(Debug, Clone, Default)]
pub struct PointSet {
    points: Vec<SurveyPoint>,
    policy: DuplicatePolicy,
    index: HashMap<(u64, u64), usize>,
}

fn plan_key(p: Point3) -> (u64, u64) {
    (p.x.to_bits(), p.y.to_bits())
}

impl PointSet {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            points: Vec::new(),
            policy,
            index: HashMap::new(),
        }
    }

    /// Builds a set from a point list, applying the duplicate policy in
    /// input order.
    pub fn from_points(
        points: Vec<SurveyPoint>,
        policy: DuplicatePolicy,
    ) -> Result<Self, PointSetError> {
        let mut set = Self::new(policy);
        for p in points {
            set.push(p)?;
        }
        Ok(set)
    }

    /// Inserts a point, returning the id it ended up at. Under
    /// `KeepFirst` a duplicate returns the id of the retained original;
    /// under `KeepLast` the duplicate replaces the original in place.
    pub fn push(&mut self, point: SurveyPoint) -> Result<usize, PointSetError> {
        let key = plan_key(point.position);
        if let Some(&existing) = self.index.get(&key) {
            return match self.policy {
                DuplicatePolicy::Reject => Err(PointSetError::DuplicatePoint {
                    index: self.points.len(),
                    x: point.position.x,
                    y: point.position.y,
                }),
                DuplicatePolicy::KeepFirst => Ok(existing),
                DuplicatePolicy::KeepLast => {
                    self.points[existing] = point;
                    Ok(existing)
                }
            };
        }
        let id = self.points.len();
        self.points.push(point);
        self.index.insert(key, id);
        Ok(id)
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&SurveyPoint> {
        self.points.get(id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SurveyPoint> {
        self.points.iter()
    }

    pub fn points(&self) -> &[SurveyPoint] {
        &self.points
    }

    /// Positions of all points in insertion order.
    pub fn positions(&self) -> Vec<Point3> {
        self.points.iter().map(|p| p.position).collect()
    }
}

impl<'a> IntoIterator for &'a PointSet {
    type Item = &'a SurveyPoint;
    type IntoIter = std::slice::Iter<'a, SurveyPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(x: f64, y: f64, z: f64) -> SurveyPoint {
        SurveyPoint::new(Point3::new(x, y, z))
    }

    #[test]
    fn insertion_order_preserved() {
        let set = PointSet::from_points(
            vec![pt(0.0, 0.0, 1.0), pt(1.0, 0.0, 2.0), pt(0.0, 1.0, 3.0)],
            DuplicatePolicy::Reject,
        )
        .unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(1).unwrap().position.z, 2.0);
        let zs: Vec<f64> = set.iter().map(|p| p.position.z).collect();
        assert_eq!(zs, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn reject_duplicate() {
        let err = PointSet::from_points(
            vec![pt(5.0, 5.0, 0.0), pt(5.0, 5.0, 9.0)],
            DuplicatePolicy::Reject,
        )
        .unwrap_err();
        assert_eq!(
            err,
            PointSetError::DuplicatePoint {
                index: 1,
                x: 5.0,
                y: 5.0
            }
        );
    }

    #[test]
    fn keep_first_drops_later() {
        let mut set = PointSet::new(DuplicatePolicy::KeepFirst);
        assert_eq!(set.push(pt(1.0, 1.0, 10.0)).unwrap(), 0);
        assert_eq!(set.push(pt(1.0, 1.0, 20.0)).unwrap(), 0);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(0).unwrap().position.z, 10.0);
    }

    #[test]
    fn keep_last_replaces_in_place() {
        let mut set = PointSet::new(DuplicatePolicy::KeepLast);
        set.push(pt(1.0, 1.0, 10.0)).unwrap();
        set.push(pt(2.0, 2.0, 0.0)).unwrap();
        let id = set.push(pt(1.0, 1.0, 20.0)).unwrap();
        assert_eq!(id, 0);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0).unwrap().position.z, 20.0);
    }

    #[test]
    fn differing_z_same_plan_position_is_duplicate() {
        let err = PointSet::from_points(
            vec![pt(3.0, 4.0, 1.0), pt(3.0, 4.0, 2.0)],
            DuplicatePolicy::Reject,
        );
        assert!(err.is_err());
    }
}
