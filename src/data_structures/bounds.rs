//! Bounding volumes for built scene fragments.

use cgmath::{InnerSpace, Matrix4, MetricSpace, Point3, Transform, Vector3};

/// A sphere with a negative radius is invalid (nothing has been added yet).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Point3<f64>,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: Point3<f64>, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn invalid() -> Self {
        Self {
            center: Point3::new(0.0, 0.0, 0.0),
            radius: -1.0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.radius >= 0.0
    }

    /// The sphere in the parent's frame. The radius grows with the largest axis scale.
    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Self {
        if !self.is_valid() {
            return *self;
        }
        let scale = [matrix.x.truncate(), matrix.y.truncate(), matrix.z.truncate()]
            .iter()
            .map(|axis| axis.magnitude())
            .fold(0.0, f64::max);
        Self {
            center: matrix.transform_point(self.center),
            radius: self.radius * scale,
        }
    }

    /// Smallest sphere around `spheres`, centered on the box of their centers.
    pub fn enclosing<'a>(spheres: impl IntoIterator<Item = &'a BoundingSphere> + Clone) -> Self {
        let mut centers = BoundingBox::new();
        for sphere in spheres.clone().into_iter().filter(|s| s.is_valid()) {
            centers.expand_by_point(sphere.center);
        }
        if !centers.is_valid() {
            return Self::invalid();
        }
        let center = centers.center();
        let radius = spheres
            .into_iter()
            .filter(|s| s.is_valid())
            .map(|s| center.distance(s.center) + s.radius)
            .fold(0.0, f64::max);
        Self { center, radius }
    }
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self::invalid()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl BoundingBox {
    pub fn new() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    pub fn expand_by_point(&mut self, p: Point3<f64>) {
        self.min = Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    /// Grows the box over the axis-aligned cube around `sphere`. Spheres
    /// without a positive radius are ignored.
    pub fn expand_by_sphere(&mut self, sphere: &BoundingSphere) {
        if sphere.radius <= 0.0 {
            return;
        }
        let r = Vector3::new(sphere.radius, sphere.radius, sphere.radius);
        self.expand_by_point(sphere.center - r);
        self.expand_by_point(sphere.center + r);
    }

    pub fn center(&self) -> Point3<f64> {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// Half the diagonal.
    pub fn radius(&self) -> f64 {
        self.min.distance(self.max) * 0.5
    }

    pub fn to_sphere(&self) -> BoundingSphere {
        if self.is_valid() {
            BoundingSphere::new(self.center(), self.radius())
        } else {
            BoundingSphere::invalid()
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_sphere_uses_half_diagonal() {
        let mut bb = BoundingBox::new();
        assert!(!bb.is_valid());
        bb.expand_by_point(Point3::new(-1.0, -1.0, -1.0));
        bb.expand_by_point(Point3::new(1.0, 1.0, 1.0));
        let sphere = bb.to_sphere();
        assert_eq!(sphere.center, Point3::new(0.0, 0.0, 0.0));
        assert!((sphere.radius - 3f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn enclosing_ignores_invalid_spheres() {
        let spheres = [
            BoundingSphere::new(Point3::new(-2.0, 0.0, 0.0), 1.0),
            BoundingSphere::invalid(),
            BoundingSphere::new(Point3::new(2.0, 0.0, 0.0), 1.0),
        ];
        let s = BoundingSphere::enclosing(&spheres);
        assert_eq!(s.center, Point3::new(0.0, 0.0, 0.0));
        assert!((s.radius - 3.0).abs() < 1e-12);
    }

    #[test]
    fn transform_scales_radius_by_largest_axis() {
        let s = BoundingSphere::new(Point3::new(1.0, 0.0, 0.0), 1.0);
        let m = Matrix4::from_translation(Vector3::new(0.0, 5.0, 0.0)) * Matrix4::from_nonuniform_scale(2.0, 3.0, 1.0);
        let t = s.transformed(&m);
        assert_eq!(t.center, Point3::new(2.0, 5.0, 0.0));
        assert!((t.radius - 3.0).abs() < 1e-12);
    }
}
