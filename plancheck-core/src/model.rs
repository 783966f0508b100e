//! 流水线各阶段之间传递的数据模型。每个阶段完整产出后按值或只读引用交给下一阶段。

use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds2D, Point2};
use crate::polygon::{self, PolygonIssue};
use crate::units::UnitContext;

/// 无标注几何使用的统一名称。
pub const UNLABELED: &str = "unlabeled";

/// 几何指纹的量化步长（原始单位）。
const KEY_QUANTUM: f64 = 1e-6;

/// 提取阶段产出的原始实体，读取完成后不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEntity {
    Polyline {
        layer: String,
        vertices: Vec<Point2>,
        closed: bool,
    },
    Line {
        layer: String,
        start: Point2,
        end: Point2,
    },
    Hatch {
        layer: String,
        vertices: Vec<Point2>,
    },
    Text {
        layer: String,
        content: String,
        position: Point2,
    },
}

impl RawEntity {
    pub fn layer(&self) -> &str {
        match self {
            Self::Polyline { layer, .. }
            | Self::Line { layer, .. }
            | Self::Hatch { layer, .. }
            | Self::Text { layer, .. } => layer,
        }
    }

    /// 区域实体的顶点及闭合标记；线段和文字返回 `None`。
    pub fn region(&self) -> Option<(&[Point2], bool)> {
        match self {
            Self::Polyline {
                vertices, closed, ..
            } => Some((vertices, *closed)),
            Self::Hatch { vertices, .. } => Some((vertices, true)),
            Self::Line { .. } | Self::Text { .. } => None,
        }
    }
}

/// 诊断来源阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Units,
    Match,
    Classify,
    Rules,
}

/// 非致命问题的记录，按产生顺序进入报告。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Diagnostic {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(stage: Stage, line: usize, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            line: Some(line),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeometryId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LabelId(pub usize);

/// 与起点、绕向无关的几何指纹，用于去重。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeometryKey(Vec<(i64, i64)>);

impl GeometryKey {
    pub fn from_vertices(vertices: &[Point2]) -> Self {
        let mut ring: Vec<(i64, i64)> = polygon::open_ring(vertices)
            .iter()
            .map(|p| quantize(*p))
            .collect();
        ring.dedup();
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.is_empty() {
            return Self(ring);
        }

        let start = ring
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| **v)
            .map(|(i, _)| i)
            .unwrap_or(0);
        ring.rotate_left(start);
        let len = ring.len();
        if len > 2 && ring[len - 1] < ring[1] {
            ring[1..].reverse();
        }
        Self(ring)
    }
}

fn quantize(p: Point2) -> (i64, i64) {
    (
        (p.x() / KEY_QUANTUM).round() as i64,
        (p.y() / KEY_QUANTUM).round() as i64,
    )
}

/// 区域几何及其度量。`area_m2 = area_raw * area_factor`。
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    pub id: GeometryId,
    pub layer: String,
    pub vertices: Vec<Point2>,
    pub closed: bool,
    pub area_raw: f64,
    pub area_m2: f64,
    pub width_m: f64,
    pub centroid: Point2,
    pub bounds: Bounds2D,
    pub issue: Option<PolygonIssue>,
    pub key: GeometryKey,
}

impl GeometryRecord {
    /// 由区域顶点构造记录；顶点为空时返回 `None`。
    pub fn new(
        id: GeometryId,
        layer: impl Into<String>,
        vertices: Vec<Point2>,
        closed: bool,
        units: &UnitContext,
    ) -> Option<Self> {
        let analysis = polygon::analyze(&vertices);
        let centroid = analysis.centroid?;
        let bounds = analysis.bounds?;
        let key = GeometryKey::from_vertices(&vertices);
        Some(Self {
            id,
            layer: layer.into(),
            closed,
            area_raw: analysis.area,
            area_m2: units.to_square_meters(analysis.area),
            width_m: units.to_meters(analysis.width),
            centroid,
            bounds,
            issue: analysis.issue,
            key,
            vertices,
        })
    }

    /// 参与分类的前提：闭合且至少三个顶点。
    #[inline]
    pub fn is_region(&self) -> bool {
        self.closed && polygon::open_ring(&self.vertices).len() >= 3
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.issue.is_none()
    }

    /// 换算为米的顶点。
    pub fn vertices_m(&self, units: &UnitContext) -> Vec<Point2> {
        self.vertices
            .iter()
            .map(|p| p.scale(units.length_factor))
            .collect()
    }
}

/// 清理过格式控制码的文字标注。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLabel {
    pub id: LabelId,
    pub content: String,
    pub position: Point2,
    pub layer: String,
}

impl TextLabel {
    #[inline]
    pub fn x(&self) -> f64 {
        self.position.x()
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.position.y()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ventilation {
    Natural,
    Mechanical,
    NaturalOrMechanical,
    NoneRequired,
}

impl Ventilation {
    /// 以 `self` 为要求，判断元素声明的通风方式是否满足。
    pub fn is_satisfied_by(self, declared: Option<Ventilation>) -> bool {
        match self {
            Self::NoneRequired => true,
            Self::Natural => matches!(declared, Some(Self::Natural)),
            Self::Mechanical => {
                matches!(declared, Some(Self::Mechanical | Self::NaturalOrMechanical))
            }
            Self::NaturalOrMechanical => matches!(
                declared,
                Some(Self::Natural | Self::Mechanical | Self::NaturalOrMechanical)
            ),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Natural => "natural",
            Self::Mechanical => "mechanical",
            Self::NaturalOrMechanical => "natural_or_mechanical",
            Self::NoneRequired => "none_required",
        }
    }
}

/// 数值来源。变体按可信度从高到低排列。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Measured,
    Annotated,
    Estimated,
}

impl Provenance {
    /// 取两者中较弱的来源。
    #[inline]
    pub fn weakest(self, other: Provenance) -> Provenance {
        self.max(other)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Measured => "measured",
            Self::Annotated => "annotated",
            Self::Estimated => "estimated",
        }
    }
}

/// 元素的来源：一个几何或（无匹配几何时）一个标注。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementSource {
    Geometry { id: GeometryId, key: GeometryKey },
    Label { id: LabelId },
}

/// 归一化后的建筑元素，由分类器创建后不再修改。顶点已换算为米。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    pub original_label: Option<String>,
    pub area_m2: Option<f64>,
    pub width_m: Option<f64>,
    pub ventilation: Option<Ventilation>,
    pub layer: String,
    pub is_unlabeled: bool,
    pub vertices: Vec<Point2>,
    pub provenance: Provenance,
    pub source: ElementSource,
}

impl Element {
    /// 去重使用的身份：几何指纹或标注编号，与名称无关。
    pub fn identity(&self) -> ElementIdentity<'_> {
        match &self.source {
            ElementSource::Geometry { key, .. } => ElementIdentity::Geometry(key),
            ElementSource::Label { id } => ElementIdentity::Label(*id),
        }
    }

    #[inline]
    pub fn has_geometry(&self) -> bool {
        self.vertices.len() >= 3
    }

    pub fn geometry_id(&self) -> Option<GeometryId> {
        match &self.source {
            ElementSource::Geometry { id, .. } => Some(*id),
            ElementSource::Label { .. } => None,
        }
    }

    /// 名称或原始标注（小写）中是否包含任一关键字。
    pub fn mentions_any(&self, keywords: &[&str]) -> bool {
        let name = self.name.to_lowercase();
        let label = self
            .original_label
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default();
        keywords
            .iter()
            .any(|kw| name.contains(kw) || label.contains(kw))
    }

    /// 只看原始标注。归一化名称可能带有无关的词，例如 `service_space_under_4sqm`。
    pub fn label_mentions_any<S: AsRef<str>>(&self, keywords: &[S]) -> bool {
        let Some(label) = self.original_label.as_deref() else {
            return false;
        };
        let label = label.to_lowercase();
        keywords.iter().any(|kw| label.contains(kw.as_ref()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementIdentity<'a> {
    Geometry(&'a GeometryKey),
    Label(LabelId),
}
