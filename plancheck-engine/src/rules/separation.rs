//! 第 7 条：附属建筑与主体的间距、走廊净宽。

use plancheck_config::ConfigError;
use plancheck_core::polygon;

use super::{
    ArticleValidator, EPSILON, InstanceDetail, Params, RuleContext, RuleResult, display_name,
    weakest_provenance,
};

pub struct AnnexSeparation;

impl ArticleValidator for AnnexSeparation {
    fn rule_id(&self) -> &'static str {
        "7.1"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["min_separation_m"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let Some(footprint) = &context.aggregates.footprint else {
            return Ok(vec![result.not_applicable("Building footprint not found")]);
        };
        let annexes: Vec<_> = context
            .aggregates
            .groups
            .annexes
            .iter()
            .map(|&index| &context.elements[index])
            .filter(|element| element.has_geometry())
            .collect();
        if annexes.is_empty() {
            return Ok(vec![result.not_applicable("No annex with geometry in drawing")]);
        }

        let min = params.get("min_separation_m")?;
        let mut closest = f64::INFINITY;
        let details: Vec<InstanceDetail> = annexes
            .iter()
            .map(|annex| {
                let distance = polygon::polygon_distance(&footprint.vertices, &annex.vertices);
                closest = closest.min(distance);
                let pass = distance + EPSILON >= min;
                let reason = if pass {
                    format!("{} is {distance:.2} m from the building", display_name(annex))
                } else {
                    format!(
                        "{} is {distance:.2} m from the building < {min} m",
                        display_name(annex)
                    )
                };
                InstanceDetail::for_element(annex, Some(distance), pass, reason)
            })
            .collect();
        let provenance = weakest_provenance(annexes.iter().copied());
        Ok(vec![result.instances(details, Some(closest), Some(min), provenance)])
    }
}

pub struct CorridorWidth;

impl ArticleValidator for CorridorWidth {
    fn rule_id(&self) -> &'static str {
        "7.2"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["min_width_m"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let min = params.get("min_width_m")?;
        let corridors: Vec<_> = context
            .aggregates
            .groups
            .corridors
            .iter()
            .map(|&index| &context.elements[index])
            .filter(|element| element.width_m.is_some())
            .collect();
        if corridors.is_empty() {
            return Ok(vec![result.not_applicable("No corridor in drawing")]);
        }

        let details: Vec<InstanceDetail> = corridors
            .iter()
            .filter_map(|corridor| {
                let width = corridor.width_m?;
                let pass = width + EPSILON >= min;
                let reason = if pass {
                    format!("{} width {width:.2} m ≥ {min} m", display_name(corridor))
                } else {
                    format!("{} width {width:.2} m < {min} m", display_name(corridor))
                };
                Some(InstanceDetail::for_element(corridor, Some(width), pass, reason))
            })
            .collect();
        let narrowest = corridors
            .iter()
            .filter_map(|corridor| corridor.width_m)
            .fold(f64::INFINITY, f64::min);
        let provenance = weakest_provenance(corridors.iter().copied());
        Ok(vec![result.instances(details, Some(narrowest), Some(min), provenance)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::{Aggregates, ElementGroups, Region};
    use crate::rules::RuleStatus;
    use plancheck_config::Catalogue;
    use plancheck_core::{
        geometry::Point2,
        model::{Element, ElementSource, GeometryId, GeometryKey, Provenance},
    };

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point2> {
        vec![
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        ]
    }

    fn element(name: &str, id: usize, vertices: Vec<Point2>, width: f64) -> Element {
        Element {
            name: name.to_string(),
            original_label: Some(name.to_uppercase()),
            area_m2: Some(polygon::area(&vertices)),
            width_m: Some(width),
            ventilation: None,
            layer: "ROOMS".to_string(),
            is_unlabeled: false,
            source: ElementSource::Geometry {
                id: GeometryId(id),
                key: GeometryKey::from_vertices(&vertices),
            },
            vertices,
            provenance: Provenance::Measured,
        }
    }

    fn run(
        validator: &dyn ArticleValidator,
        elements: &[Element],
        aggregates: &Aggregates,
    ) -> RuleResult {
        let catalogue = Catalogue::builtin();
        let spec = catalogue.rule(validator.rule_id()).expect("规则存在");
        let context = RuleContext {
            elements,
            aggregates,
            catalogue: &catalogue,
            element_results: &[],
        };
        let params = Params {
            article_id: "7",
            spec,
        };
        validator
            .evaluate(&context, &params)
            .expect("参数齐全")
            .remove(0)
    }

    fn footprint() -> Region {
        Region {
            geometry: GeometryId(0),
            layer: "GF".to_string(),
            area_m2: 100.0,
            vertices: rect(0.0, 0.0, 10.0, 10.0),
        }
    }

    #[test]
    fn annex_too_close_fails() {
        let elements = vec![
            element("annex", 1, rect(11.0, 0.0, 14.0, 3.0), 3.0),
            element("annex", 2, rect(0.0, 12.0, 3.0, 15.0), 3.0),
        ];
        let aggregates = Aggregates {
            footprint: Some(footprint()),
            groups: ElementGroups {
                annexes: vec![0, 1],
                ..ElementGroups::default()
            },
            ..Aggregates::default()
        };
        let result = run(&AnnexSeparation, &elements, &aggregates);
        assert!(!result.pass);
        assert_eq!(result.counts.failed_instances, 1);
        assert_eq!(result.counts.passed_instances, 1);
        let closest = result.observed_value.expect("observed");
        assert!((closest - 1.0).abs() < 1e-9);
    }

    #[test]
    fn annex_without_footprint_is_not_applicable() {
        let elements = vec![element("annex", 1, rect(11.0, 0.0, 14.0, 3.0), 3.0)];
        let aggregates = Aggregates {
            groups: ElementGroups {
                annexes: vec![0],
                ..ElementGroups::default()
            },
            ..Aggregates::default()
        };
        let result = run(&AnnexSeparation, &elements, &aggregates);
        assert_eq!(result.status, RuleStatus::NotApplicable);
    }

    #[test]
    fn corridor_widths_are_checked_individually() {
        let elements = vec![
            element("corridor", 1, rect(0.0, 0.0, 1.2, 8.0), 1.2),
            element("corridor", 2, rect(2.0, 0.0, 3.0, 8.0), 1.0),
        ];
        let aggregates = Aggregates {
            groups: ElementGroups {
                corridors: vec![0, 1],
                ..ElementGroups::default()
            },
            ..Aggregates::default()
        };
        let result = run(&CorridorWidth, &elements, &aggregates);
        assert!(!result.pass);
        assert_eq!(result.observed_value, Some(1.0));
        assert!(result.reason.contains("CORRIDOR width 1.00 m < 1.1 m"));
    }
}
