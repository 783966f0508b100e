//! 第 11、12 条：元素尺寸与通风、必需元素齐全、居室自然通风。

use plancheck_config::{Catalogue, ConfigError, ElementSpec};
use plancheck_core::model::{Element, Provenance, Ventilation};
use serde::Serialize;

use super::{
    ArticleValidator, EPSILON, InstanceDetail, Params, RuleContext, RuleResult, with_provenance,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementDetails {
    pub area_m2: Option<f64>,
    pub width_m: Option<f64>,
    pub min_area_m2: Option<f64>,
    pub min_width_m: Option<f64>,
    pub ventilation: Option<Ventilation>,
    pub required_ventilation: Ventilation,
    pub issues: Vec<String>,
    pub reason: String,
}

/// 目录中种类的单个元素的尺寸与通风判定。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementResult {
    pub element: String,
    pub original_label: Option<String>,
    pub rule_id: String,
    pub provenance: Provenance,
    pub pass: bool,
    pub details: ElementDetails,
}

/// 为每个属于目录种类的元素生成判定，顺序与元素一致。无标注元素和未识别名称不参与。
///
/// 除最大的厨房外，面积不超过 18.3 专用厨房上限的厨房只检查通风，不套用 11.6 的面积与宽度下限。
pub fn evaluate_elements(elements: &[Element], catalogue: &Catalogue) -> Vec<ElementResult> {
    let specialised = specialised_kitchens(elements, catalogue);
    elements
        .iter()
        .enumerate()
        .filter(|(_, element)| !element.is_unlabeled)
        .filter_map(|(index, element)| {
            let spec = catalogue.element(&element.name)?;
            let exemption = specialised
                .as_ref()
                .filter(|(_, indices)| indices.contains(&index))
                .map(|(max, _)| *max);
            Some(evaluate_element(element, spec, exemption))
        })
        .collect()
}

/// 专用厨房上限与属于专用厨房的元素下标。面积未知的厨房按主厨房计。
fn specialised_kitchens(elements: &[Element], catalogue: &Catalogue) -> Option<(f64, Vec<usize>)> {
    let max = *catalogue
        .rule("18.3")?
        .params
        .get("specialized_kitchen_max_area_m2")?;
    let kitchens: Vec<(usize, f64)> = elements
        .iter()
        .enumerate()
        .filter(|(_, element)| !element.is_unlabeled && element.name == "kitchen")
        .map(|(index, element)| (index, element.area_m2.unwrap_or(f64::INFINITY)))
        .collect();
    let main = kitchens
        .iter()
        .copied()
        .fold(None, |best: Option<(usize, f64)>, (index, area)| match best {
            Some((_, largest)) if largest >= area => best,
            _ => Some((index, area)),
        })
        .map(|(index, _)| index);
    let indices = kitchens
        .into_iter()
        .filter(|&(index, area)| Some(index) != main && area <= max + EPSILON)
        .map(|(index, _)| index)
        .collect();
    Some((max, indices))
}

fn evaluate_element(
    element: &Element,
    spec: &ElementSpec,
    specialised_max: Option<f64>,
) -> ElementResult {
    let (min_area, min_width) = match specialised_max {
        Some(_) => (None, None),
        None => (spec.min_area_m2, spec.min_width_m),
    };
    let mut issues = Vec::new();
    if let Some(min) = min_area {
        match element.area_m2 {
            Some(area) if area + EPSILON < min => {
                issues.push(format!("Area {area:.2} m² < {min} m²"));
            }
            Some(_) => {}
            None => issues.push("Area not available".to_string()),
        }
    }
    if let Some(min) = min_width {
        match element.width_m {
            Some(width) if width + EPSILON < min => {
                issues.push(format!("Width {width:.2} m < {min} m"));
            }
            Some(_) => {}
            None => issues.push("Width not available".to_string()),
        }
    }
    if !spec.ventilation.is_satisfied_by(element.ventilation) {
        issues.push(format!(
            "Ventilation {} does not meet required {}",
            element.ventilation.map_or("none", Ventilation::name),
            spec.ventilation.name()
        ));
    }

    let pass = issues.is_empty();
    let reason = match (pass, specialised_max) {
        (true, Some(max)) => format!(
            "Specialised kitchen of {:.2} m² ≤ {max} m², exempt from main kitchen minimums",
            element.area_m2.unwrap_or_default()
        ),
        (true, None) => "Meets area, width and ventilation requirements".to_string(),
        (false, _) => issues.join("; "),
    };
    ElementResult {
        element: element.name.clone(),
        original_label: element.original_label.clone(),
        rule_id: spec.rule_id.clone(),
        provenance: element.provenance,
        pass,
        details: ElementDetails {
            area_m2: element.area_m2,
            width_m: element.width_m,
            min_area_m2: min_area,
            min_width_m: min_width,
            ventilation: element.ventilation,
            required_ventilation: spec.ventilation,
            issues,
            reason: with_provenance(reason, element.provenance),
        },
    }
}

/// 11.0 以及每个目录种类（11.x）各一条结果。
pub struct RequiredElements;

impl ArticleValidator for RequiredElements {
    fn rule_id(&self) -> &'static str {
        "11.0"
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let catalogue = context.catalogue;
        let missing: Vec<&str> = catalogue
            .required_kinds()
            .filter(|kind| !context.element_results.iter().any(|r| r.element == *kind))
            .collect();
        let required = catalogue.required_kinds().count();

        let summary = params.result();
        let pass = missing.is_empty();
        let reason = if pass {
            format!("All {required} required elements present")
        } else {
            format!("Missing required elements: {}", missing.join(", "))
        };
        let present = (required - missing.len()) as f64;
        let mut results = vec![summary.single(
            pass,
            Some(present),
            Some(required as f64),
            reason,
            Provenance::Measured,
        )];

        for spec in &catalogue.elements {
            results.push(kind_result(spec, params.article_id, context.element_results));
        }
        Ok(results)
    }
}

fn kind_result(spec: &ElementSpec, article_id: &str, element_results: &[ElementResult]) -> RuleResult {
    let result = RuleResult::for_rule(spec.rule_id.as_str(), article_id, spec.description.as_str());
    let instances: Vec<&ElementResult> = element_results
        .iter()
        .filter(|r| r.element == spec.kind)
        .collect();
    if instances.is_empty() {
        return if spec.required {
            result.single(
                false,
                Some(0.0),
                spec.min_area_m2,
                format!("Required element {} is missing", spec.kind),
                Provenance::Measured,
            )
        } else {
            result.not_applicable(format!("Optional element {} not present", spec.kind))
        };
    }

    let provenance = instances
        .iter()
        .fold(Provenance::Measured, |acc, r| acc.weakest(r.provenance));
    let smallest = instances
        .iter()
        .filter_map(|r| r.details.area_m2)
        .fold(None, |acc: Option<f64>, area| Some(acc.map_or(area, |a| a.min(area))));
    let details: Vec<InstanceDetail> = instances
        .iter()
        .map(|r| InstanceDetail {
            element: r.element.clone(),
            label: r.original_label.clone(),
            observed_value: r.details.area_m2,
            pass: r.pass,
            reason: r.details.reason.clone(),
        })
        .collect();
    result.instances(details, smallest, spec.min_area_m2, provenance)
}

/// 要求自然通风的居室必须声明自然通风。
pub struct NaturalVentilation;

impl ArticleValidator for NaturalVentilation {
    fn rule_id(&self) -> &'static str {
        "12.1"
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let spaces: Vec<&ElementResult> = context
            .element_results
            .iter()
            .filter(|r| r.details.required_ventilation == Ventilation::Natural)
            .collect();
        if spaces.is_empty() {
            return Ok(vec![result.not_applicable("No living space requiring natural ventilation")]);
        }

        let details: Vec<InstanceDetail> = spaces
            .iter()
            .map(|r| {
                let pass = Ventilation::Natural.is_satisfied_by(r.details.ventilation);
                let name = r.original_label.as_deref().unwrap_or(&r.element);
                let declared = r.details.ventilation.map_or("none", Ventilation::name);
                let reason = if pass {
                    format!("{name} is naturally ventilated")
                } else {
                    format!("{name} declares {declared} ventilation, natural required")
                };
                InstanceDetail {
                    element: r.element.clone(),
                    label: r.original_label.clone(),
                    observed_value: None,
                    pass,
                    reason,
                }
            })
            .collect();
        let provenance = spaces
            .iter()
            .fold(Provenance::Measured, |acc, r| acc.weakest(r.provenance));
        Ok(vec![result.instances(details, None, None, provenance)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::Aggregates;
    use crate::rules::RuleStatus;
    use plancheck_core::model::{ElementSource, LabelId};

    fn room(name: &str, area: f64, width: f64, ventilation: Ventilation) -> Element {
        Element {
            name: name.to_string(),
            original_label: Some(name.to_uppercase()),
            area_m2: Some(area),
            width_m: Some(width),
            ventilation: Some(ventilation),
            layer: "ROOMS".to_string(),
            is_unlabeled: false,
            vertices: Vec::new(),
            provenance: Provenance::Measured,
            source: ElementSource::Label { id: LabelId(0) },
        }
    }

    fn run(
        validator: &dyn ArticleValidator,
        elements: &[Element],
        catalogue: &Catalogue,
    ) -> Vec<RuleResult> {
        let element_results = evaluate_elements(elements, catalogue);
        let aggregates = Aggregates::default();
        let context = RuleContext {
            elements,
            aggregates: &aggregates,
            catalogue,
            element_results: &element_results,
        };
        let spec = catalogue.rule(validator.rule_id()).expect("规则存在");
        let article_id = if validator.rule_id() == "11.0" { "11" } else { "12" };
        validator
            .evaluate(&context, &Params { article_id, spec })
            .expect("参数齐全")
    }

    #[test]
    fn main_hall_meeting_minimums_passes() {
        let catalogue = Catalogue::builtin();
        let results =
            evaluate_elements(&[room("main_hall", 25.0, 4.2, Ventilation::Natural)], &catalogue);
        assert_eq!(results.len(), 1);
        assert!(results[0].pass);
        assert_eq!(results[0].rule_id, "11.1");
        assert!(results[0].details.issues.is_empty());
    }

    #[test]
    fn undersized_main_hall_cites_measured_and_required_area() {
        let catalogue = Catalogue::builtin();
        let results =
            evaluate_elements(&[room("main_hall", 15.0, 4.2, Ventilation::Natural)], &catalogue);
        assert!(!results[0].pass);
        assert_eq!(results[0].details.reason, "Area 15.00 m² < 20 m²");
    }

    #[test]
    fn estimated_element_reason_mentions_provenance() {
        let catalogue = Catalogue::builtin();
        let mut kitchen = room("kitchen", 12.0, 3.0, Ventilation::Natural);
        kitchen.provenance = Provenance::Estimated;
        let results = evaluate_elements(&[kitchen], &catalogue);
        assert!(results[0].pass);
        assert!(results[0].details.reason.contains("estimated"));
    }

    #[test]
    fn second_small_kitchen_is_exempt_from_main_kitchen_minimums() {
        let catalogue = Catalogue::builtin();
        let results = evaluate_elements(
            &[
                room("kitchen", 16.0, 4.0, Ventilation::Natural),
                room("kitchen", 6.0, 2.0, Ventilation::Mechanical),
            ],
            &catalogue,
        );
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.pass));
        let pantry = &results[1];
        assert_eq!(pantry.details.min_area_m2, None);
        assert!(pantry.details.reason.starts_with("Specialised kitchen of 6.00 m²"));
    }

    #[test]
    fn only_kitchen_keeps_minimums_even_when_small() {
        let catalogue = Catalogue::builtin();
        let results =
            evaluate_elements(&[room("kitchen", 6.0, 2.0, Ventilation::Natural)], &catalogue);
        assert!(!results[0].pass);
        assert_eq!(results[0].details.reason, "Area 6.00 m² < 12 m²; Width 2.00 m < 3 m");
    }

    #[test]
    fn specialised_kitchen_still_needs_ventilation() {
        let catalogue = Catalogue::builtin();
        let mut pantry = room("kitchen", 5.0, 2.0, Ventilation::Natural);
        pantry.ventilation = None;
        let results = evaluate_elements(
            &[room("kitchen", 14.0, 3.5, Ventilation::Natural), pantry],
            &catalogue,
        );
        assert!(results[0].pass);
        assert!(!results[1].pass);
        assert!(results[1].details.issues[0].starts_with("Ventilation none"));
    }

    #[test]
    fn mechanical_main_hall_fails_ventilation() {
        let catalogue = Catalogue::builtin();
        let results = evaluate_elements(
            &[room("main_hall", 25.0, 4.2, Ventilation::Mechanical)],
            &catalogue,
        );
        assert!(!results[0].pass);
        assert!(results[0].details.issues[0].contains("required natural"));
    }

    #[test]
    fn unlabeled_and_unknown_elements_are_skipped() {
        let catalogue = Catalogue::builtin();
        let mut unlabeled = room("unlabeled", 8.5, 2.0, Ventilation::Natural);
        unlabeled.is_unlabeled = true;
        let results =
            evaluate_elements(&[unlabeled, room("Gym", 30.0, 5.0, Ventilation::Natural)], &catalogue);
        assert!(results.is_empty());
    }

    #[test]
    fn missing_kitchen_fails_required_elements() {
        let catalogue = Catalogue::builtin();
        let elements = vec![
            room("main_hall", 25.0, 4.2, Ventilation::Natural),
            room("master_bedroom", 18.0, 4.0, Ventilation::Natural),
            room("bathroom", 4.0, 2.0, Ventilation::Mechanical),
        ];
        let results = run(&RequiredElements, &elements, &catalogue);
        assert_eq!(results.len(), 1 + catalogue.elements.len());
        let summary = &results[0];
        assert_eq!(summary.rule_id, "11.0");
        assert!(!summary.pass);
        assert_eq!(summary.reason, "Missing required elements: kitchen");

        let kitchen = results.iter().find(|r| r.rule_id == "11.6").expect("11.6");
        assert_eq!(kitchen.status, RuleStatus::Failed);
        assert_eq!(kitchen.reason, "Required element kitchen is missing");

        let garage = results.iter().find(|r| r.rule_id == "11.11").expect("11.11");
        assert_eq!(garage.status, RuleStatus::NotApplicable);

        let hall = results.iter().find(|r| r.rule_id == "11.1").expect("11.1");
        assert!(hall.pass);
        assert_eq!(hall.counts.total_instances, 1);
    }

    #[test]
    fn ventilation_rule_covers_natural_spaces_only() {
        let catalogue = Catalogue::builtin();
        let elements = vec![
            room("main_hall", 25.0, 4.2, Ventilation::Natural),
            room("master_bedroom", 18.0, 4.0, Ventilation::Mechanical),
            room("bathroom", 4.0, 2.0, Ventilation::Mechanical),
        ];
        let results = run(&NaturalVentilation, &elements, &catalogue);
        let result = &results[0];
        assert_eq!(result.counts.total_instances, 2);
        assert_eq!(result.counts.failed_instances, 1);
        assert!(result.reason.contains("MASTER_BEDROOM declares mechanical ventilation"));
    }
}
