use glam::DVec2;
use serde::{Deserialize, Serialize};

/// 二维点，内部以 `glam::DVec2` 表示，坐标保持图纸原始单位或已换算的米。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2(pub DVec2);

impl Point2 {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self(DVec2::new(x, y))
    }

    #[inline]
    pub fn x(self) -> f64 {
        self.0.x
    }

    #[inline]
    pub fn y(self) -> f64 {
        self.0.y
    }

    #[inline]
    pub fn distance(self, other: Point2) -> f64 {
        self.0.distance(other.0)
    }

    /// 以原点为基准缩放坐标，用于单位换算。
    #[inline]
    pub fn scale(self, factor: f64) -> Self {
        Self(self.0 * factor)
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    #[inline]
    pub fn as_vec2(self) -> DVec2 {
        self.0
    }
}

impl From<DVec2> for Point2 {
    fn from(value: DVec2) -> Self {
        Self(value)
    }
}

/// 轴对齐边界框，用于宽度估算和匹配半径。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds2D {
    min: Point2,
    max: Point2,
}

impl Bounds2D {
    #[inline]
    pub fn new(min: Point2, max: Point2) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn empty() -> Self {
        Self {
            min: Point2::new(f64::INFINITY, f64::INFINITY),
            max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// 由点集构造包围盒；点集为空时返回 `None`。
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point2>) -> Option<Self> {
        let mut bounds = Self::empty();
        for point in points {
            bounds.include_point(*point);
        }
        if bounds.is_empty() { None } else { Some(bounds) }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x() > self.max.x() || self.min.y() > self.max.y()
    }

    #[inline]
    pub fn min(&self) -> Point2 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> Point2 {
        self.max
    }

    pub fn include_point(&mut self, point: Point2) {
        self.min = Point2(self.min.0.min(point.0));
        self.max = Point2(self.max.0.max(point.0));
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x() - self.min.x()
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y() - self.min.y()
    }

    /// 较短边长，即房间“宽度”的近似。
    #[inline]
    pub fn short_side(&self) -> f64 {
        self.width().min(self.height())
    }

    #[inline]
    pub fn long_side(&self) -> f64 {
        self.width().max(self.height())
    }

    #[inline]
    pub fn diagonal(&self) -> f64 {
        self.min.distance(self.max)
    }

    #[inline]
    pub fn center(&self) -> Point2 {
        Point2((self.min.0 + self.max.0) * 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_track_extent_and_short_side() {
        let points = [
            Point2::new(0.0, 0.0),
            Point2::new(6.0, 1.0),
            Point2::new(2.0, 4.0),
        ];
        let bounds = Bounds2D::from_points(&points).expect("bounds");
        assert!((bounds.width() - 6.0).abs() < 1e-9);
        assert!((bounds.height() - 4.0).abs() < 1e-9);
        assert!((bounds.short_side() - 4.0).abs() < 1e-9);
        assert!((bounds.long_side() - 6.0).abs() < 1e-9);
        let center = bounds.center();
        assert!((center.x() - 3.0).abs() < 1e-9);
        assert!((center.y() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn empty_point_set_has_no_bounds() {
        let points: [Point2; 0] = [];
        assert!(Bounds2D::from_points(&points).is_none());
        assert!(Bounds2D::empty().is_empty());
    }

    #[test]
    fn scale_converts_units() {
        let p = Point2::new(1500.0, -250.0).scale(0.001);
        assert!((p.x() - 1.5).abs() < 1e-12);
        assert!((p.y() + 0.25).abs() < 1e-12);
    }
}
