//! Axis-aligned bounding boxes in model length units.
//!
//! The kernel reports boxes as six doubles `(xmin, ymin, zmin, xmax, ymax,
//! zmax)`; [`BoundingBox::from_kernel`] and [`BoundingBox::to_kernel`] convert
//! to and from that layout. Boxes over an entity set are accumulated with
//! [`BoundingBox::fold`] by component-wise min/max.

use serde::{Deserialize, Serialize};

/// Axis-aligned box `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    pub const fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        BoundingBox { min, max }
    }

    /// The identity for [`BoundingBox::include`]: contains nothing.
    pub const fn empty() -> Self {
        BoundingBox {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    pub fn from_kernel(raw: [f64; 6]) -> Self {
        BoundingBox {
            min: [raw[0], raw[1], raw[2]],
            max: [raw[3], raw[4], raw[5]],
        }
    }

    pub fn to_kernel(&self) -> [f64; 6] {
        [
            self.min[0], self.min[1], self.min[2], self.max[0], self.max[1], self.max[2],
        ]
    }

    /// Box centered on `center` with full side lengths `extents`.
    pub fn centered(center: [f64; 3], extents: [f64; 3]) -> Self {
        let mut b = BoundingBox::empty();
        for i in 0..3 {
            b.min[i] = center[i] - extents[i] / 2.0;
            b.max[i] = center[i] + extents[i] / 2.0;
        }
        b
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| !(self.min[i] <= self.max[i]))
    }

    /// Grows `self` to cover `other`.
    pub fn include(&mut self, other: &BoundingBox) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(other.min[i]);
            self.max[i] = self.max[i].max(other.max[i]);
        }
    }

    pub fn fold<'a, I>(boxes: I) -> BoundingBox
    where
        I: IntoIterator<Item = &'a BoundingBox>,
    {
        boxes.into_iter().fold(BoundingBox::empty(), |mut acc, b| {
            acc.include(b);
            acc
        })
    }

    /// Side lengths per axis. Zero for an empty box.
    pub fn extents(&self) -> [f64; 3] {
        if self.is_empty() {
            return [0.0; 3];
        }
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    pub fn max_extent(&self) -> f64 {
        let e = self.extents();
        e[0].max(e[1]).max(e[2])
    }

    pub fn centroid(&self) -> [f64; 3] {
        [
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        ]
    }

    pub fn volume(&self) -> f64 {
        let e = self.extents();
        e[0] * e[1] * e[2]
    }

    /// `true` when `other` lies strictly inside `self` on every axis.
    pub fn strictly_contains(&self, other: &BoundingBox) -> bool {
        (0..3).all(|i| self.min[i] < other.min[i] && other.max[i] < self.max[i])
    }

    /// `true` when `other` lies inside `self` (boundaries may touch) within `tol`.
    pub fn contains(&self, other: &BoundingBox, tol: f64) -> bool {
        (0..3).all(|i| self.min[i] - tol <= other.min[i] && other.max[i] <= self.max[i] + tol)
    }

    pub fn contains_point(&self, p: [f64; 3]) -> bool {
        (0..3).all(|i| self.min[i] <= p[i] && p[i] <= self.max[i])
    }

    /// Copy grown by `fraction` of each side length on both ends. Flat axes
    /// are grown by `fraction` of the largest side instead.
    pub fn enlarged(&self, fraction: f64) -> BoundingBox {
        let e = self.extents();
        let largest = self.max_extent();
        let mut b = *self;
        for i in 0..3 {
            let side = if e[i] > 0.0 { e[i] } else { largest };
            b.min[i] -= fraction * side;
            b.max[i] += fraction * side;
        }
        b
    }

    /// `true` when `self` is flat (within `tol`) on one of the six bounding
    /// planes of `outer` and inside it.
    pub fn lies_on_boundary_of(&self, outer: &BoundingBox, tol: f64) -> bool {
        if !outer.contains(self, tol) {
            return false;
        }
        (0..3).any(|i| {
            let flat = (self.max[i] - self.min[i]).abs() <= tol;
            flat && ((self.min[i] - outer.min[i]).abs() <= tol
                || (self.max[i] - outer.max[i]).abs() <= tol)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_is_componentwise_min_max() {
        let a = BoundingBox::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = BoundingBox::new([-1.0, 0.5, 0.2], [0.5, 3.0, 0.8]);
        let f = BoundingBox::fold([&a, &b]);
        assert_eq!(f.min, [-1.0, 0.0, 0.0]);
        assert_eq!(f.max, [1.0, 3.0, 1.0]);
    }

    #[test]
    fn empty_fold_stays_empty() {
        let f = BoundingBox::fold(std::iter::empty::<&BoundingBox>());
        assert!(f.is_empty());
        assert_eq!(f.extents(), [0.0; 3]);
    }

    #[test]
    fn kernel_layout_round_trips() {
        let raw = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(BoundingBox::from_kernel(raw).to_kernel(), raw);
    }

    #[test]
    fn enlarged_covers_flat_axis() {
        let sheet = BoundingBox::new([0.0, 0.0, 0.0], [2.0, 1.0, 0.0]);
        let grown = sheet.enlarged(0.01);
        assert!(grown.strictly_contains(&sheet));
        assert!(grown.volume() > 0.0);
    }

    #[test]
    fn face_on_outer_plane_is_detected() {
        let outer = BoundingBox::new([-2.0, -2.0, -2.0], [2.0, 2.0, 2.0]);
        let face = BoundingBox::new([-2.0, -1.0, 0.0], [-2.0, 1.0, 2.0]);
        let inner = BoundingBox::new([-0.5, -0.5, 0.0], [0.5, 0.5, 0.0]);
        assert!(face.lies_on_boundary_of(&outer, 1e-9));
        assert!(!inner.lies_on_boundary_of(&outer, 1e-9));
    }
}
