//! 第 18 条：厨房数量与备餐厨房。面积超过专用厨房上限（或面积未知）的厨房按主厨房计。

use indexmap::IndexMap;
use plancheck_config::ConfigError;
use plancheck_core::model::Element;

use crate::aggregates::level_of_layer;

use super::{
    ArticleValidator, EPSILON, InstanceDetail, Params, RuleContext, RuleResult, display_name,
    weakest_provenance,
};

pub struct KitchenCount;

impl ArticleValidator for KitchenCount {
    fn rule_id(&self) -> &'static str {
        "18.3"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["main_kitchen_max", "specialized_kitchen_max_area_m2"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let kitchens: Vec<_> = context
            .aggregates
            .groups
            .kitchens
            .iter()
            .map(|&index| &context.elements[index])
            .collect();
        if kitchens.is_empty() {
            return Ok(vec![result.not_applicable("No kitchen in drawing")]);
        }

        let main_max = params.get("main_kitchen_max")?;
        let specialised_max = params.get("specialized_kitchen_max_area_m2")?;
        let mut main_count = 0usize;
        let details: Vec<InstanceDetail> = kitchens
            .iter()
            .map(|kitchen| {
                let name = display_name(kitchen);
                let is_main = kitchen.area_m2.is_none_or(|area| area > specialised_max);
                if !is_main {
                    let area = kitchen.area_m2.unwrap_or_default();
                    return InstanceDetail::for_element(
                        kitchen,
                        kitchen.area_m2,
                        true,
                        format!("{name} is a specialised kitchen ({area:.2} m² ≤ {specialised_max} m²)"),
                    );
                }
                main_count += 1;
                let pass = main_count as f64 <= main_max;
                let reason = if pass {
                    format!("{name} is main kitchen {main_count} of at most {main_max}")
                } else {
                    format!(
                        "{name} exceeds {main_max} main kitchen(s); additional kitchens must be ≤ {specialised_max} m²"
                    )
                };
                InstanceDetail::for_element(kitchen, kitchen.area_m2, pass, reason)
            })
            .collect();
        Ok(vec![result.instances(
            details,
            Some(main_count as f64),
            Some(main_max),
            weakest_provenance(kitchens.iter().copied()),
        )])
    }
}

const UNASSIGNED_FLOOR: &str = "unassigned";

/// 备餐厨房按图层所属楼层分组；图层不带楼层信息的归入同一组。
pub struct PantryKitchens;

impl ArticleValidator for PantryKitchens {
    fn rule_id(&self) -> &'static str {
        "18.5"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["max_per_floor", "max_area_m2"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let pantries: Vec<&Element> = context
            .aggregates
            .groups
            .pantries
            .iter()
            .map(|&index| &context.elements[index])
            .collect();
        if pantries.is_empty() {
            return Ok(vec![result.not_applicable("No pantry kitchen in drawing")]);
        }

        let max_per_floor = params.get("max_per_floor")?;
        let max_area = params.get("max_area_m2")?;
        let mut floors: IndexMap<&str, usize> = IndexMap::new();
        let mut details = Vec::new();
        for pantry in &pantries {
            let floor = level_of_layer(&pantry.layer, &context.catalogue.keywords)
                .unwrap_or(UNASSIGNED_FLOOR);
            *floors.entry(floor).or_default() += 1;
            let name = display_name(pantry);
            let detail = match pantry.area_m2 {
                Some(area) if area <= max_area + EPSILON => InstanceDetail::for_element(
                    pantry,
                    Some(area),
                    true,
                    format!("{name} {area:.2} m² ≤ {max_area} m²"),
                ),
                Some(area) => InstanceDetail::for_element(
                    pantry,
                    Some(area),
                    false,
                    format!("{name} {area:.2} m² > {max_area} m²"),
                ),
                None => InstanceDetail::for_element(
                    pantry,
                    None,
                    false,
                    format!("{name} area not available"),
                ),
            };
            details.push(detail);
        }
        for (floor, count) in &floors {
            let pass = *count as f64 <= max_per_floor;
            let reason = if pass {
                format!("{count} pantry kitchen(s) on {floor} floor ≤ {max_per_floor}")
            } else {
                format!("{count} pantry kitchen(s) on {floor} floor > {max_per_floor}")
            };
            details.push(InstanceDetail::measure(
                &format!("pantry_kitchens_{floor}"),
                *count as f64,
                pass,
                reason,
            ));
        }
        let busiest = floors.values().copied().max().unwrap_or_default();
        Ok(vec![result.instances(
            details,
            Some(busiest as f64),
            Some(max_per_floor),
            weakest_provenance(pantries.iter().copied()),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::{Aggregates, ElementGroups};
    use crate::rules::RuleStatus;
    use plancheck_config::Catalogue;
    use plancheck_core::model::{Element, ElementSource, LabelId, Provenance};

    fn kitchen(label: &str, area: f64) -> Element {
        Element {
            name: "kitchen".to_string(),
            original_label: Some(label.to_string()),
            area_m2: Some(area),
            width_m: Some(3.0),
            ventilation: None,
            layer: "ROOMS".to_string(),
            is_unlabeled: false,
            vertices: Vec::new(),
            provenance: Provenance::Measured,
            source: ElementSource::Label { id: LabelId(0) },
        }
    }

    fn run(elements: &[Element]) -> RuleResult {
        let catalogue = Catalogue::builtin();
        let aggregates = Aggregates {
            groups: ElementGroups {
                kitchens: (0..elements.len()).collect(),
                ..ElementGroups::default()
            },
            ..Aggregates::default()
        };
        let context = RuleContext {
            elements,
            aggregates: &aggregates,
            catalogue: &catalogue,
            element_results: &[],
        };
        let spec = catalogue.rule("18.3").expect("规则存在");
        KitchenCount
            .evaluate(&context, &Params { article_id: "18", spec })
            .expect("参数齐全")
            .remove(0)
    }

    #[test]
    fn one_main_and_one_pantry_pass() {
        let result = run(&[kitchen("KITCHEN", 14.0), kitchen("PANTRY KITCHEN", 6.0)]);
        assert!(result.pass);
        assert_eq!(result.observed_value, Some(1.0));
        assert_eq!(result.counts.total_instances, 2);
    }

    #[test]
    fn two_main_kitchens_fail() {
        let result = run(&[kitchen("KITCHEN", 14.0), kitchen("OUTDOOR KITCHEN", 12.0)]);
        assert!(!result.pass);
        assert_eq!(result.counts.failed_instances, 1);
        assert!(result.reason.contains("OUTDOOR KITCHEN exceeds 1 main kitchen(s)"));
    }

    #[test]
    fn no_kitchen_is_not_applicable() {
        assert_eq!(run(&[]).status, RuleStatus::NotApplicable);
    }

    fn run_pantries(elements: &[Element]) -> RuleResult {
        let catalogue = Catalogue::builtin();
        let aggregates = Aggregates {
            groups: ElementGroups {
                kitchens: (0..elements.len()).collect(),
                pantries: (0..elements.len()).collect(),
                ..ElementGroups::default()
            },
            ..Aggregates::default()
        };
        let context = RuleContext {
            elements,
            aggregates: &aggregates,
            catalogue: &catalogue,
            element_results: &[],
        };
        let spec = catalogue.rule("18.5").expect("规则存在");
        PantryKitchens
            .evaluate(&context, &Params { article_id: "18", spec })
            .expect("参数齐全")
            .remove(0)
    }

    fn on_layer(mut element: Element, layer: &str) -> Element {
        element.layer = layer.to_string();
        element
    }

    #[test]
    fn one_pantry_per_floor_passes() {
        let result = run_pantries(&[
            on_layer(kitchen("PANTRY", 5.0), "GF-ROOMS"),
            on_layer(kitchen("PANTRY", 6.0), "FF-ROOMS"),
        ]);
        assert!(result.pass, "{}", result.reason);
        assert_eq!(result.counts.total_instances, 4);
        assert_eq!(result.observed_value, Some(1.0));
    }

    #[test]
    fn two_pantries_on_one_floor_fail() {
        let result = run_pantries(&[
            on_layer(kitchen("PANTRY", 5.0), "GF-ROOMS"),
            on_layer(kitchen("PANTRY 2", 4.0), "GF-ROOMS"),
        ]);
        assert!(!result.pass);
        assert!(result.reason.contains("2 pantry kitchen(s) on ground floor > 1"));
    }

    #[test]
    fn oversized_pantry_fails() {
        let result = run_pantries(&[kitchen("PANTRY KITCHEN", 7.5)]);
        assert!(!result.pass);
        assert!(result.reason.contains("PANTRY KITCHEN 7.50 m² > 6 m²"));
        assert!(result.reason.contains("1/2 instances fail"));
    }
}
