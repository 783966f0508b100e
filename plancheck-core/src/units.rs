//! 图纸单位解析：`$INSUNITS` 声明优先，缺失时按坐标量级推断。

use serde::{Deserialize, Serialize};

/// 长度量级超过该值（原始单位）时推断为毫米。
const MILLIMETER_EXTENT: f64 = 50.0;
/// 长度量级超过该值时推断为厘米。
const CENTIMETER_EXTENT: f64 = 5.0;
/// 面积量级超过该值时推断为平方毫米。
const MILLIMETER_AREA: f64 = 1_000_000.0;
/// 面积量级超过该值时推断为平方厘米。
const CENTIMETER_AREA: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawingUnit {
    Inches,
    Feet,
    Centimeters,
    Millimeters,
    Meters,
}

impl DrawingUnit {
    /// 解析 `$INSUNITS` 代码：1=英寸，2=英尺，3=厘米，4=毫米，5/6=米。
    pub fn from_insunits(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Inches),
            2 => Some(Self::Feet),
            3 => Some(Self::Centimeters),
            4 => Some(Self::Millimeters),
            5 | 6 => Some(Self::Meters),
            _ => None,
        }
    }

    /// 原始长度乘以该系数得到米。
    pub fn length_factor(self) -> f64 {
        match self {
            Self::Inches => 1.0 / 39.3701,
            Self::Feet => 1.0 / 3.28084,
            Self::Centimeters => 1.0 / 100.0,
            Self::Millimeters => 1.0 / 1000.0,
            Self::Meters => 1.0,
        }
    }

    /// 原始面积乘以该系数得到平方米。
    pub fn area_factor(self) -> f64 {
        match self {
            Self::Inches => 1.0 / 1550.0031,
            Self::Feet => 1.0 / 10.7639,
            Self::Centimeters => 1.0 / 10_000.0,
            Self::Millimeters => 1.0 / 1_000_000.0,
            Self::Meters => 1.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Inches => "inches",
            Self::Feet => "feet",
            Self::Centimeters => "centimeters",
            Self::Millimeters => "millimeters",
            Self::Meters => "meters",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSource {
    Declared,
    Inferred,
}

/// 每份图纸计算一次的单位上下文，后续阶段只读共享。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitContext {
    pub unit: DrawingUnit,
    pub length_factor: f64,
    pub area_factor: f64,
    pub source: UnitSource,
}

impl UnitContext {
    pub fn declared(unit: DrawingUnit) -> Self {
        Self::with_source(unit, UnitSource::Declared)
    }

    pub fn inferred(unit: DrawingUnit) -> Self {
        Self::with_source(unit, UnitSource::Inferred)
    }

    fn with_source(unit: DrawingUnit, source: UnitSource) -> Self {
        Self {
            unit,
            length_factor: unit.length_factor(),
            area_factor: unit.area_factor(),
            source,
        }
    }

    /// 根据头部声明或量级样本得到单位上下文。
    ///
    /// `extents` 为各闭合几何的包围盒长边，`areas` 为原始面积；
    /// 声明缺失或无法识别时取两者中位数推断，样本为空时退回毫米。
    pub fn resolve(insunits: Option<i32>, extents: &[f64], areas: &[f64]) -> Self {
        if let Some(unit) = insunits.and_then(DrawingUnit::from_insunits) {
            return Self::declared(unit);
        }
        Self::inferred(infer_unit(median(extents), median(areas)))
    }

    #[inline]
    pub fn to_meters(&self, raw: f64) -> f64 {
        raw * self.length_factor
    }

    #[inline]
    pub fn to_square_meters(&self, raw: f64) -> f64 {
        raw * self.area_factor
    }
}

fn infer_unit(extent: Option<f64>, area: Option<f64>) -> DrawingUnit {
    let (extent, area) = match (extent, area) {
        (None, None) => return DrawingUnit::Millimeters,
        (e, a) => (e.unwrap_or(0.0), a.unwrap_or(0.0)),
    };
    if extent > MILLIMETER_EXTENT || area > MILLIMETER_AREA {
        DrawingUnit::Millimeters
    } else if extent > CENTIMETER_EXTENT || area > CENTIMETER_AREA {
        DrawingUnit::Centimeters
    } else {
        DrawingUnit::Meters
    }
}

fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(f64::total_cmp);
    let mid = finite.len() / 2;
    if finite.len() % 2 == 0 {
        Some((finite[mid - 1] + finite[mid]) * 0.5)
    } else {
        Some(finite[mid])
    }
}
