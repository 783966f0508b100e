//! 多边形几何计算：面积、宽度、质心、距离、包含与外凸量。
//!
//! 所有函数都是纯函数，输入可以是畸形多边形；遇到退化输入时返回尽力而为的数值，
//! 并通过 [`PolygonAnalysis::issue`] 标记可信度，不会 panic。

use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds2D, Point2};

/// 面积与包围盒长边平方之比低于该值时视为近零面积。
const NEAR_ZERO_AREA_RATIO: f64 = 1e-6;
/// 判定首尾重复顶点时的绝对容差。
const DUPLICATE_VERTEX_EPSILON: f64 = 1e-9;
/// 点在边界上的相对容差（乘以包围盒对角线）。
const BOUNDARY_RELATIVE_EPSILON: f64 = 1e-9;

/// 多边形的可信度问题。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonIssue {
    TooFewVertices,
    NearZeroArea,
    SelfIntersecting,
}

/// 一次性计算得到的多边形度量。数值均为原始单位。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonAnalysis {
    pub signed_area: f64,
    pub area: f64,
    pub width: f64,
    pub centroid: Option<Point2>,
    pub bounds: Option<Bounds2D>,
    pub issue: Option<PolygonIssue>,
}

impl PolygonAnalysis {
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.issue.is_none()
    }
}

/// 计算面积、宽度、质心并检查退化情况。
pub fn analyze(vertices: &[Point2]) -> PolygonAnalysis {
    let ring = open_ring(vertices);
    let signed = signed_area(ring);
    let area = signed.abs();
    let bounds = Bounds2D::from_points(ring);
    let width = bounds.map(|b| b.short_side()).unwrap_or(0.0);

    let issue = if ring.len() < 3 {
        Some(PolygonIssue::TooFewVertices)
    } else if is_near_zero_area(area, bounds) {
        Some(PolygonIssue::NearZeroArea)
    } else if is_self_intersecting(ring) {
        Some(PolygonIssue::SelfIntersecting)
    } else {
        None
    };

    PolygonAnalysis {
        signed_area: signed,
        area,
        width,
        centroid: centroid(ring),
        bounds,
        issue,
    }
}

fn is_near_zero_area(area: f64, bounds: Option<Bounds2D>) -> bool {
    if !area.is_finite() || area <= f64::EPSILON {
        return true;
    }
    match bounds {
        Some(b) => {
            let long = b.long_side();
            area <= NEAR_ZERO_AREA_RATIO * long * long
        }
        None => true,
    }
}

/// 去掉与首点重合的尾点，返回开放顶点环。
pub fn open_ring(vertices: &[Point2]) -> &[Point2] {
    match (vertices.first(), vertices.last()) {
        (Some(first), Some(last))
            if vertices.len() > 1 && first.distance(*last) <= DUPLICATE_VERTEX_EPSILON =>
        {
            &vertices[..vertices.len() - 1]
        }
        _ => vertices,
    }
}

/// 鞋带公式求有向面积，逆时针为正。
pub fn signed_area(vertices: &[Point2]) -> f64 {
    let ring = open_ring(vertices);
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (a, b) in segments(ring) {
        sum += a.x() * b.y() - b.x() * a.y();
    }
    0.5 * sum
}

/// 多边形面积（原始单位平方），忽略顶点绕向。
#[inline]
pub fn area(vertices: &[Point2]) -> f64 {
    signed_area(vertices).abs()
}

/// 包围盒较短边；无顶点时为 `None`。
pub fn width(vertices: &[Point2]) -> Option<f64> {
    Bounds2D::from_points(open_ring(vertices)).map(|b| b.short_side())
}

/// 顶点算术平均，仅用于标注匹配的距离估算。
pub fn centroid(vertices: &[Point2]) -> Option<Point2> {
    let ring = open_ring(vertices);
    if ring.is_empty() {
        return None;
    }
    let sum = ring.iter().fold(glam::DVec2::ZERO, |acc, p| acc + p.0);
    Some(Point2(sum / ring.len() as f64))
}

/// 按闭合环遍历边。少于两个顶点时没有边。
pub fn segments(vertices: &[Point2]) -> impl Iterator<Item = (Point2, Point2)> + '_ {
    let ring = open_ring(vertices);
    let len = ring.len();
    let count = match len {
        0 | 1 => 0,
        2 => 1,
        n => n,
    };
    (0..count).map(move |i| (ring[i], ring[(i + 1) % len]))
}

/// 返回最长边的端点。
pub fn longest_edge(vertices: &[Point2]) -> Option<(Point2, Point2)> {
    segments(vertices).fold(None, |best, (a, b)| match best {
        Some((ba, bb)) if Point2::distance(ba, bb) >= a.distance(b) => Some((ba, bb)),
        _ => Some((a, b)),
    })
}

pub fn point_segment_distance(p: Point2, a: Point2, b: Point2) -> f64 {
    let ab = b.0 - a.0;
    let len_sq = ab.length_squared();
    if len_sq <= f64::EPSILON {
        return p.distance(a);
    }
    let t = ((p.0 - a.0).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.0.distance(a.0 + ab * t)
}

/// 点到多边形边界的最短距离；没有边时为正无穷。
pub fn point_boundary_distance(p: Point2, polygon: &[Point2]) -> f64 {
    segments(polygon)
        .map(|(a, b)| point_segment_distance(p, a, b))
        .fold(f64::INFINITY, f64::min)
}

fn orientation(a: Point2, b: Point2, c: Point2) -> f64 {
    (b.0 - a.0).perp_dot(c.0 - a.0)
}

/// 两条线段是否严格相交（交点不在任一端点上）。
pub fn segments_cross(a1: Point2, a2: Point2, b1: Point2, b2: Point2) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

/// 检查不相邻边之间是否存在严格相交。
pub fn is_self_intersecting(vertices: &[Point2]) -> bool {
    let ring = open_ring(vertices);
    let n = ring.len();
    if n < 4 {
        return false;
    }
    for i in 0..n {
        let (a1, a2) = (ring[i], ring[(i + 1) % n]);
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let (b1, b2) = (ring[j], ring[(j + 1) % n]);
            if segments_cross(a1, a2, b1, b2) {
                return true;
            }
        }
    }
    false
}

fn boundary_epsilon(polygon: &[Point2]) -> f64 {
    Bounds2D::from_points(polygon)
        .map(|b| b.diagonal().max(1.0) * BOUNDARY_RELATIVE_EPSILON)
        .unwrap_or(BOUNDARY_RELATIVE_EPSILON)
}

/// 射线法判断点是否在多边形内，边界上的点视为在内。
pub fn contains_point(polygon: &[Point2], p: Point2) -> bool {
    let ring = open_ring(polygon);
    if ring.len() < 3 {
        return false;
    }
    if point_boundary_distance(p, ring) <= boundary_epsilon(ring) {
        return true;
    }
    let mut inside = false;
    for (a, b) in segments(ring) {
        if (a.y() > p.y()) != (b.y() > p.y()) {
            let x_cross = a.x() + (p.y() - a.y()) * (b.x() - a.x()) / (b.y() - a.y());
            if p.x() < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

/// `outer` 是否完全包含 `inner`。
pub fn contains_polygon(outer: &[Point2], inner: &[Point2]) -> bool {
    let inner_ring = open_ring(inner);
    if inner_ring.is_empty() {
        return false;
    }
    if !inner_ring.iter().all(|p| contains_point(outer, *p)) {
        return false;
    }
    !segments(inner_ring)
        .any(|(a1, a2)| segments(outer).any(|(b1, b2)| segments_cross(a1, a2, b1, b2)))
}

/// 线段到多边形边界的最短距离。
pub fn segment_polygon_distance(a: Point2, b: Point2, polygon: &[Point2]) -> f64 {
    let mut best = f64::INFINITY;
    for (c, d) in segments(polygon) {
        if segments_cross(a, b, c, d) {
            return 0.0;
        }
        best = best
            .min(point_segment_distance(c, a, b))
            .min(point_segment_distance(a, c, d))
            .min(point_segment_distance(b, c, d));
    }
    if best.is_infinite() {
        for p in open_ring(polygon) {
            best = best.min(point_segment_distance(*p, a, b));
        }
    }
    best
}

/// 两个多边形边界之间的最短距离；相交或包含时为 0。
pub fn polygon_distance(a: &[Point2], b: &[Point2]) -> f64 {
    let ring_a = open_ring(a);
    let ring_b = open_ring(b);
    if ring_a.is_empty() || ring_b.is_empty() {
        return f64::INFINITY;
    }
    if ring_a.iter().any(|p| contains_point(ring_b, *p))
        || ring_b.iter().any(|p| contains_point(ring_a, *p))
    {
        return 0.0;
    }
    let mut best = f64::INFINITY;
    for (c, d) in segments(ring_b) {
        best = best.min(segment_polygon_distance(c, d, ring_a));
        if best == 0.0 {
            break;
        }
    }
    if best.is_infinite() {
        best = ring_a
            .iter()
            .flat_map(|p| ring_b.iter().map(move |q| p.distance(*q)))
            .fold(f64::INFINITY, f64::min);
    }
    best
}

/// `inner` 落在 `outer` 之外的最大外凸距离（外部顶点到边界的最大距离）。
pub fn max_projection(outer: &[Point2], inner: &[Point2]) -> f64 {
    open_ring(inner)
        .iter()
        .filter(|p| !contains_point(outer, **p))
        .map(|p| point_boundary_distance(*p, outer))
        .filter(|d| d.is_finite())
        .fold(0.0, f64::max)
}
