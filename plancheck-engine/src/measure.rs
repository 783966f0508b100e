//! 单位解析与几何度量：把提取结果中的区域实体转换为带面积、宽度和质心的记录。

use plancheck_core::{
    geometry::Bounds2D,
    model::{Diagnostic, GeometryId, GeometryRecord, RawEntity, Stage},
    polygon,
    units::{UnitContext, UnitSource},
};
use plancheck_io::Extraction;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Measurement {
    pub units: UnitContext,
    pub records: Vec<GeometryRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// 头部声明优先；否则取闭合区域包围盒长边与原始面积的中位数推断。
pub fn resolve_units(extraction: &Extraction) -> UnitContext {
    let (extents, areas): (Vec<f64>, Vec<f64>) = extraction
        .geometries
        .iter()
        .filter_map(RawEntity::region)
        .filter(|(vertices, closed)| *closed && vertices.len() >= 3)
        .filter_map(|(vertices, _)| {
            Bounds2D::from_points(vertices)
                .map(|bounds| (bounds.long_side(), polygon::area(vertices)))
        })
        .unzip();
    UnitContext::resolve(extraction.insunits, &extents, &areas)
}

pub fn measure(extraction: &Extraction) -> Measurement {
    let units = resolve_units(extraction);
    let mut diagnostics = Vec::new();
    if units.source == UnitSource::Inferred {
        let message = match extraction.insunits {
            Some(code) => format!(
                "$INSUNITS = {code} 无法识别，按坐标量级推断为 {}",
                units.unit.name()
            ),
            None => format!("缺少 $INSUNITS，按坐标量级推断为 {}", units.unit.name()),
        };
        diagnostics.push(Diagnostic::new(Stage::Units, message));
    }

    let mut records = Vec::new();
    for entity in &extraction.geometries {
        let Some((vertices, closed)) = entity.region() else {
            continue;
        };
        let id = GeometryId(records.len());
        if let Some(record) =
            GeometryRecord::new(id, entity.layer(), vertices.to_vec(), closed, &units)
        {
            records.push(record);
        }
    }
    debug!(
        unit = units.unit.name(),
        records = records.len(),
        "几何度量完成"
    );

    Measurement {
        units,
        records,
        diagnostics,
    }
}
