//! 元素分类：几何 + 匹配标注 + 归一化名称合成为 `Element`。

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use plancheck_config::{Catalogue, Dimensions, PipelineConfig};
use plancheck_core::{
    model::{
        Diagnostic, Element, ElementSource, GeometryRecord, LabelId, Provenance, Stage,
        TextLabel, UNLABELED, Ventilation,
    },
    units::UnitContext,
};
use regex::Regex;
use tracing::debug;

use crate::{matcher::LabelMatches, normalizer::NameNormalizer};

static ANNOTATED_SIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*[xX×*]\s*(\d+(?:\.\d+)?)").expect("尺寸正则应当有效")
});

#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub elements: Vec<Element>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Classifier<'a> {
    catalogue: &'a Catalogue,
    normalizer: &'a NameNormalizer,
    config: &'a PipelineConfig,
}

impl<'a> Classifier<'a> {
    pub fn new(
        catalogue: &'a Catalogue,
        normalizer: &'a NameNormalizer,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            catalogue,
            normalizer,
            config,
        }
    }

    pub fn classify(
        &self,
        records: &[GeometryRecord],
        labels: &[TextLabel],
        matches: &LabelMatches,
        units: &UnitContext,
    ) -> Classification {
        let mut out = Classification::default();
        let mut rejected = 0usize;

        for record in records.iter().filter(|record| record.is_region()) {
            let label = matches
                .label_for(record.id)
                .and_then(|id| label_by_id(labels, id));
            let element = match label {
                Some(label) => self.labeled_element(record, label, units),
                None => {
                    if !self.plausible_unlabeled(record) {
                        rejected += 1;
                        continue;
                    }
                    unlabeled_element(record, units)
                }
            };
            if let Some(issue) = record.issue {
                out.diagnostics.push(Diagnostic::new(
                    Stage::Classify,
                    format!(
                        "几何 #{}（{}）存在 {:?}，度量结果置信度低",
                        record.id.0, element.name, issue
                    ),
                ));
            }
            out.elements.push(element);
        }

        let measured_kinds: BTreeSet<String> = out
            .elements
            .iter()
            .filter(|element| !element.is_unlabeled)
            .map(|element| element.name.clone())
            .collect();
        for id in &matches.unmatched {
            let Some(label) = label_by_id(labels, *id) else {
                continue;
            };
            let normalized = self.normalizer.normalize(&label.content);
            let spec = self.catalogue.element(&normalized.name);
            match spec {
                Some(spec) if !measured_kinds.contains(&spec.kind) => {
                    let (dimensions, provenance) = match annotated_dimensions(&label.content) {
                        Some(dimensions) => (dimensions, Provenance::Annotated),
                        None => (spec.estimate, Provenance::Estimated),
                    };
                    out.diagnostics.push(Diagnostic::new(
                        Stage::Classify,
                        format!(
                            "标注 \"{}\" 未匹配到几何，按 {} 尺寸建立 {} 元素",
                            label.content,
                            provenance.name(),
                            spec.kind
                        ),
                    ));
                    out.elements.push(Element {
                        name: spec.kind.clone(),
                        original_label: Some(label.content.clone()),
                        area_m2: Some(dimensions.area_m2),
                        width_m: Some(dimensions.width_m),
                        ventilation: Some(self.ventilation_from_label(&label.content)),
                        layer: label.layer.clone(),
                        is_unlabeled: false,
                        vertices: Vec::new(),
                        provenance,
                        source: ElementSource::Label { id: label.id },
                    });
                }
                _ => out.diagnostics.push(Diagnostic::new(
                    Stage::Classify,
                    format!("标注 \"{}\" 未匹配到任何几何，仅作记录", label.content),
                )),
            }
        }

        out.elements = deduplicate(out.elements);
        debug!(
            elements = out.elements.len(),
            rejected_unlabeled = rejected,
            "元素分类完成"
        );
        out
    }

    fn labeled_element(
        &self,
        record: &GeometryRecord,
        label: &TextLabel,
        units: &UnitContext,
    ) -> Element {
        let normalized = self.normalizer.normalize(&label.content);
        Element {
            name: normalized.name,
            original_label: Some(label.content.clone()),
            area_m2: Some(record.area_m2),
            width_m: Some(record.width_m),
            ventilation: Some(self.ventilation_from_label(&label.content)),
            layer: record.layer.clone(),
            is_unlabeled: false,
            vertices: record.vertices_m(units),
            provenance: Provenance::Measured,
            source: ElementSource::Geometry {
                id: record.id,
                key: record.key.clone(),
            },
        }
    }

    /// 无标注几何的合理性过滤：排除地块量级的大轮廓和退化噪声。
    fn plausible_unlabeled(&self, record: &GeometryRecord) -> bool {
        record.is_region()
            && record.area_m2 >= self.config.unlabeled_min_area_m2
            && record.area_m2 <= self.config.unlabeled_max_area_m2
    }

    fn ventilation_from_label(&self, content: &str) -> Ventilation {
        let lower = content.to_lowercase();
        let mechanical = self
            .catalogue
            .keywords
            .mechanical_ventilation
            .iter()
            .any(|keyword| lower.contains(keyword.as_str()));
        if mechanical {
            Ventilation::Mechanical
        } else {
            Ventilation::Natural
        }
    }
}

fn unlabeled_element(record: &GeometryRecord, units: &UnitContext) -> Element {
    Element {
        name: UNLABELED.to_string(),
        original_label: None,
        area_m2: Some(record.area_m2),
        width_m: None,
        ventilation: None,
        layer: record.layer.clone(),
        is_unlabeled: true,
        vertices: record.vertices_m(units),
        provenance: Provenance::Measured,
        source: ElementSource::Geometry {
            id: record.id,
            key: record.key.clone(),
        },
    }
}

fn label_by_id(labels: &[TextLabel], id: LabelId) -> Option<&TextLabel> {
    match labels.get(id.0) {
        Some(label) if label.id == id => Some(label),
        _ => labels.iter().find(|label| label.id == id),
    }
}

/// 按几何身份去重（与名称无关）。同一身份出现多次时保留首个位置，
/// 若首个是无标注而后来者有标注，则以后来者替换。幂等。
pub fn deduplicate(elements: Vec<Element>) -> Vec<Element> {
    let mut kept: Vec<Element> = Vec::with_capacity(elements.len());
    for element in elements {
        match kept
            .iter()
            .position(|existing| existing.identity() == element.identity())
        {
            Some(index) => {
                if kept[index].is_unlabeled && !element.is_unlabeled {
                    kept[index] = element;
                }
            }
            None => kept.push(element),
        }
    }
    kept
}

/// 从 `A x B` 形式的标注读取尺寸。数值小于 30 视为米，小于 1000 视为厘米，否则为毫米。
pub fn annotated_dimensions(content: &str) -> Option<Dimensions> {
    let captures = ANNOTATED_SIZE.captures(content)?;
    let a: f64 = captures.get(1)?.as_str().parse().ok()?;
    let b: f64 = captures.get(2)?.as_str().parse().ok()?;
    if a <= 0.0 || b <= 0.0 {
        return None;
    }
    let largest = a.max(b);
    let scale = if largest < 30.0 {
        1.0
    } else if largest < 1000.0 {
        0.01
    } else {
        0.001
    };
    let (a, b) = (a * scale, b * scale);
    Some(Dimensions {
        area_m2: a * b,
        width_m: a.min(b),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use plancheck_core::{
        geometry::Point2,
        model::GeometryId,
        units::DrawingUnit,
    };
    use pretty_assertions::assert_eq;

    use crate::matcher::match_labels;

    fn units() -> UnitContext {
        UnitContext::declared(DrawingUnit::Meters)
    }

    fn rect(id: usize, x0: f64, y0: f64, x1: f64, y1: f64) -> GeometryRecord {
        GeometryRecord::new(
            GeometryId(id),
            "ROOMS",
            vec![
                Point2::new(x0, y0),
                Point2::new(x1, y0),
                Point2::new(x1, y1),
                Point2::new(x0, y1),
            ],
            true,
            &units(),
        )
        .expect("rect record")
    }

    fn label(id: usize, content: &str, x: f64, y: f64) -> TextLabel {
        TextLabel {
            id: LabelId(id),
            content: content.to_string(),
            position: Point2::new(x, y),
            layer: "TEXT".to_string(),
        }
    }

    fn classify(records: &[GeometryRecord], labels: &[TextLabel]) -> Classification {
        let catalogue = Catalogue::builtin();
        let normalizer = NameNormalizer::new(&catalogue.vocabulary);
        let config = PipelineConfig::default();
        let matches = match_labels(records, labels, &config);
        Classifier::new(&catalogue, &normalizer, &config).classify(
            records,
            labels,
            &matches,
            &units(),
        )
    }

    #[test]
    fn unlabeled_polygon_keeps_area_but_no_width() {
        // 3.4 m × 2.5 m = 8.5 m²
        let records = vec![rect(0, 0.0, 0.0, 3.4, 2.5)];
        let result = classify(&records, &[]);
        assert_eq!(result.elements.len(), 1);
        let element = &result.elements[0];
        assert!(element.is_unlabeled);
        assert_eq!(element.name, UNLABELED);
        assert!((element.area_m2.unwrap_or_default() - 8.5).abs() < 1e-9);
        assert_eq!(element.width_m, None);
        assert_eq!(element.ventilation, None);
    }

    #[test]
    fn implausible_unlabeled_geometry_is_filtered() {
        let records = vec![rect(0, 0.0, 0.0, 0.2, 0.2), rect(1, 0.0, 0.0, 400.0, 400.0)];
        let result = classify(&records, &[]);
        assert!(result.elements.is_empty());
    }

    #[test]
    fn labeled_geometry_reads_ventilation_from_text() {
        let records = vec![rect(0, 0.0, 0.0, 2.0, 2.0), rect(1, 10.0, 0.0, 15.0, 5.0)];
        let labels = vec![label(0, "BATH (MECH. EXHAUST)", 1.0, 1.0), label(1, "HALL", 12.5, 2.5)];
        let result = classify(&records, &labels);
        assert_eq!(result.elements[0].name, "bathroom");
        assert_eq!(result.elements[0].ventilation, Some(Ventilation::Mechanical));
        assert_eq!(result.elements[1].name, "main_hall");
        assert_eq!(result.elements[1].ventilation, Some(Ventilation::Natural));
        assert_eq!(result.elements[1].provenance, Provenance::Measured);
    }

    #[test]
    fn unmatched_catalogue_label_becomes_estimated_element() {
        let labels = vec![label(0, "KITCHEN", 0.0, 0.0), label(1, "GYM", 5.0, 5.0)];
        let result = classify(&[], &labels);
        assert_eq!(result.elements.len(), 1);
        let kitchen = &result.elements[0];
        assert_eq!(kitchen.name, "kitchen");
        assert_eq!(kitchen.provenance, Provenance::Estimated);
        assert_eq!(kitchen.area_m2, Some(12.0));
        assert_eq!(kitchen.width_m, Some(3.0));
        assert!(!kitchen.has_geometry());
        assert_eq!(result.diagnostics.len(), 2);
    }

    #[test]
    fn annotated_label_dimensions_take_precedence() {
        let labels = vec![label(0, "MASTER BEDROOM 450x400", 0.0, 0.0)];
        let result = classify(&[], &labels);
        let bedroom = &result.elements[0];
        assert_eq!(bedroom.provenance, Provenance::Annotated);
        assert!((bedroom.area_m2.unwrap_or_default() - 18.0).abs() < 1e-9);
        assert!((bedroom.width_m.unwrap_or_default() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn label_only_element_is_skipped_when_kind_is_measured() {
        let records = vec![rect(0, 0.0, 0.0, 4.0, 4.0)];
        let labels = vec![label(0, "KITCHEN", 2.0, 2.0), label(1, "KITCHEN", 90.0, 90.0)];
        let result = classify(&records, &labels);
        let kitchens = result
            .elements
            .iter()
            .filter(|element| element.name == "kitchen")
            .count();
        assert_eq!(kitchens, 1);
    }

    #[test]
    fn deduplication_prefers_labeled_and_is_idempotent() {
        // 多段线与填充边界重合：同一身份
        let records = vec![rect(0, 0.0, 0.0, 5.0, 5.0), rect(1, 0.0, 0.0, 5.0, 5.0), rect(2, 6.0, 0.0, 11.0, 5.0)];
        let labels = vec![label(0, "MAIN HALL", 2.5, 2.5), label(1, "MAIN HALL", 8.5, 2.5)];
        let result = classify(&records, &labels);
        assert_eq!(result.elements.len(), 2);
        assert!(result.elements.iter().all(|element| element.name == "main_hall"));

        let again = deduplicate(result.elements.clone());
        assert_eq!(again, result.elements);
    }

    #[test]
    fn annotated_dimension_units() {
        let meters = annotated_dimensions("4.5 x 4").expect("meters");
        assert!((meters.area_m2 - 18.0).abs() < 1e-9);
        let millimeters = annotated_dimensions("4500*4000").expect("millimeters");
        assert!((millimeters.width_m - 4.0).abs() < 1e-9);
        assert!(annotated_dimensions("KITCHEN").is_none());
    }
}
