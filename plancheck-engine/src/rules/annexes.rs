//! 第 20 条：附属建筑面积占别墅首层面积的比例。

use plancheck_config::ConfigError;
use plancheck_core::model::Element;

use super::{
    ArticleValidator, EPSILON, InstanceDetail, Params, RuleContext, RuleResult, display_name,
    weakest_provenance,
};
use crate::aggregates::{ElementGroups, Region};

const SHARE_PARAM: &str = "max_percent_of_villa_ground_floor";
const NO_FOOTPRINT: &str = "Villa ground floor footprint not found";

fn share_of(area: f64, footprint: &Region) -> f64 {
    if footprint.area_m2 <= EPSILON {
        return 0.0;
    }
    area / footprint.area_m2 * 100.0
}

fn measured<'a>(context: &RuleContext<'a>, indices: &[usize]) -> Vec<&'a Element> {
    indices
        .iter()
        .map(|&index| &context.elements[index])
        .filter(|element| element.area_m2.is_some())
        .collect()
}

/// 所有附属建筑面积之和不超过首层面积的上限比例。
pub struct ConnectedAnnexArea;

impl ArticleValidator for ConnectedAnnexArea {
    fn rule_id(&self) -> &'static str {
        "20.2"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[SHARE_PARAM]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let annexes = measured(context, &context.aggregates.groups.annexes);
        if annexes.is_empty() {
            return Ok(vec![result.not_applicable("No annex with area in drawing")]);
        }
        let Some(footprint) = &context.aggregates.footprint else {
            return Ok(vec![result.not_applicable(NO_FOOTPRINT)]);
        };
        let max = params.get(SHARE_PARAM)?;
        let total: f64 = annexes.iter().filter_map(|annex| annex.area_m2).sum();
        let percent = share_of(total, footprint);
        let pass = percent <= max + EPSILON;
        let reason = format!(
            "{} annex(es) total {total:.2} m² = {percent:.2}% of {:.2} m² ground floor {} {max}%",
            annexes.len(),
            footprint.area_m2,
            if pass { "≤" } else { ">" }
        );
        Ok(vec![result.single(
            pass,
            Some(percent),
            Some(max),
            reason,
            weakest_provenance(annexes.iter().copied()),
        )])
    }
}

/// 单栋附属建筑的面积上限。同一个校验器按用途分组注册三次，每次对应一条规则。
#[derive(Clone, Copy)]
pub struct AnnexShare {
    rule_id: &'static str,
    kind: &'static str,
    members: fn(&ElementGroups) -> &[usize],
}

fn hospitality(groups: &ElementGroups) -> &[usize] {
    &groups.hospitality_annexes
}

fn service(groups: &ElementGroups) -> &[usize] {
    &groups.service_annexes
}

fn sports(groups: &ElementGroups) -> &[usize] {
    &groups.sports_annexes
}

pub const HOSPITALITY: AnnexShare = AnnexShare {
    rule_id: "20.14",
    kind: "hospitality",
    members: hospitality,
};

pub const SERVICE: AnnexShare = AnnexShare {
    rule_id: "20.15",
    kind: "service",
    members: service,
};

pub const SPORTS: AnnexShare = AnnexShare {
    rule_id: "20.16",
    kind: "sports",
    members: sports,
};

impl ArticleValidator for AnnexShare {
    fn rule_id(&self) -> &'static str {
        self.rule_id
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[SHARE_PARAM]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let annexes = measured(context, (self.members)(&context.aggregates.groups));
        if annexes.is_empty() {
            return Ok(vec![
                result.not_applicable(format!("No {} annex with area in drawing", self.kind)),
            ]);
        }
        let Some(footprint) = &context.aggregates.footprint else {
            return Ok(vec![result.not_applicable(NO_FOOTPRINT)]);
        };
        let max = params.get(SHARE_PARAM)?;
        let mut largest: f64 = 0.0;
        let details: Vec<InstanceDetail> = annexes
            .iter()
            .map(|annex| {
                let area = annex.area_m2.unwrap_or_default();
                let percent = share_of(area, footprint);
                largest = largest.max(percent);
                let pass = percent <= max + EPSILON;
                let reason = format!(
                    "{} {area:.2} m² = {percent:.2}% of ground floor {} {max}%",
                    display_name(annex),
                    if pass { "≤" } else { ">" }
                );
                InstanceDetail::for_element(annex, Some(percent), pass, reason)
            })
            .collect();
        Ok(vec![result.instances(
            details,
            Some(largest),
            Some(max),
            weakest_provenance(annexes.iter().copied()),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::Aggregates;
    use crate::rules::RuleStatus;
    use plancheck_config::Catalogue;
    use plancheck_core::{
        geometry::Point2,
        model::{ElementSource, GeometryId, GeometryKey, Provenance},
        polygon,
    };

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point2> {
        vec![
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        ]
    }

    fn annex(label: &str, id: usize, vertices: Vec<Point2>) -> Element {
        Element {
            name: "annex".to_string(),
            original_label: Some(label.to_string()),
            area_m2: Some(polygon::area(&vertices)),
            width_m: polygon::width(&vertices),
            ventilation: None,
            layer: "ANNEX".to_string(),
            is_unlabeled: false,
            source: ElementSource::Geometry {
                id: GeometryId(id),
                key: GeometryKey::from_vertices(&vertices),
            },
            vertices,
            provenance: Provenance::Measured,
        }
    }

    fn footprint() -> Option<Region> {
        Some(Region {
            geometry: GeometryId(0),
            layer: "GROUND_FLOOR_OUTLINE".to_string(),
            area_m2: 200.0,
            vertices: rect(0.0, 0.0, 20.0, 10.0),
        })
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
        validator
            .evaluate(&context, &Params { article_id: "20", spec })
            .expect("参数齐全")
            .remove(0)
    }

    #[test]
    fn annex_total_against_ground_floor() {
        let elements = vec![
            annex("ANNEX", 1, rect(25.0, 0.0, 35.0, 8.0)),
            annex("MAJLIS HOSPITALITY", 2, rect(25.0, 10.0, 35.0, 16.0)),
        ];
        let aggregates = Aggregates {
            footprint: footprint(),
            groups: ElementGroups {
                annexes: vec![0, 1],
                ..ElementGroups::default()
            },
            ..Aggregates::default()
        };
        let result = run(&ConnectedAnnexArea, &elements, &aggregates);
        assert!(result.pass);
        assert!((result.observed_value.unwrap_or_default() - 70.0).abs() < 1e-9);
        assert_eq!(
            result.reason,
            "2 annex(es) total 140.00 m² = 70.00% of 200.00 m² ground floor ≤ 70%"
        );
    }

    #[test]
    fn oversized_sports_annex_fails_its_own_share() {
        let elements = vec![
            annex("SPORTS HALL", 1, rect(25.0, 0.0, 35.0, 5.0)),
            annex("MAJLIS HOSPITALITY", 2, rect(25.0, 10.0, 35.0, 16.0)),
        ];
        let aggregates = Aggregates {
            footprint: footprint(),
            groups: ElementGroups {
                annexes: vec![0, 1],
                sports_annexes: vec![0],
                hospitality_annexes: vec![1],
                ..ElementGroups::default()
            },
            ..Aggregates::default()
        };
        let sports = run(&SPORTS, &elements, &aggregates);
        assert_eq!(sports.status, RuleStatus::Failed);
        assert!(sports.reason.contains("SPORTS HALL 50.00 m² = 25.00% of ground floor > 20%"));
        assert!(run(&HOSPITALITY, &elements, &aggregates).pass);
        assert_eq!(
            run(&SERVICE, &elements, &aggregates).reason,
            "No service annex with area in drawing"
        );
    }

    #[test]
    fn annex_without_footprint_is_not_applicable() {
        let elements = vec![annex("ANNEX", 1, rect(25.0, 0.0, 35.0, 8.0))];
        let aggregates = Aggregates {
            groups: ElementGroups {
                annexes: vec![0],
                ..ElementGroups::default()
            },
            ..Aggregates::default()
        };
        let result = run(&ConnectedAnnexArea, &elements, &aggregates);
        assert_eq!(result.status, RuleStatus::NotApplicable);
        assert_eq!(result.reason, NO_FOOTPRINT);
    }
}
