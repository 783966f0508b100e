//! 第 15 条：车行与人行入口。
//!
//! 车库类元素在分组阶段就已从车行入口中移出，这里只在原因里列出豁免的车库。

use plancheck_config::ConfigError;
use plancheck_core::{model::Element, polygon};

use super::{
    ArticleValidator, EPSILON, InstanceDetail, Params, RuleContext, RuleResult, display_name,
    weakest_provenance,
};

fn members<'a>(context: &RuleContext<'a>, indices: &[usize]) -> Vec<&'a Element> {
    indices.iter().map(|&index| &context.elements[index]).collect()
}

/// 原因后缀，例如 ` (1 garage exempt: GARAGE)`。
fn exemption_note(context: &RuleContext<'_>) -> String {
    let garages = members(context, &context.aggregates.groups.exempt_garages);
    if garages.is_empty() {
        return String::new();
    }
    let names: Vec<&str> = garages.iter().map(|garage| display_name(garage)).collect();
    format!(" ({} garage exempt: {})", garages.len(), names.join(", "))
}

fn width_detail(element: &Element, min: f64, max: f64) -> Option<InstanceDetail> {
    let width = element.width_m?;
    let pass = width + EPSILON >= min && width <= max + EPSILON;
    let name = display_name(element);
    let reason = if pass {
        format!("{name} width {width:.2} m within {min}–{max} m")
    } else {
        format!("{name} width {width:.2} m outside {min}–{max} m")
    };
    Some(InstanceDetail::for_element(element, Some(width), pass, reason))
}

pub struct VehicleEntranceCount;

impl ArticleValidator for VehicleEntranceCount {
    fn rule_id(&self) -> &'static str {
        "15.1"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["max_count"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let entrances = members(context, &context.aggregates.groups.vehicle_entrances);
        let note = exemption_note(context);
        if entrances.is_empty() {
            return Ok(vec![result.not_applicable(format!("No vehicle entrance in drawing{note}"))]);
        }
        let max = params.get("max_count")?;
        let count = entrances.len();
        let pass = count as f64 <= max;
        let reason = if pass {
            format!("{count} vehicle entrances ≤ {max}{note}")
        } else {
            format!("{count} vehicle entrances > {max}{note}")
        };
        Ok(vec![result.single(
            pass,
            Some(count as f64),
            Some(max),
            reason,
            weakest_provenance(entrances.iter().copied()),
        )])
    }
}

/// 非车库车行入口两两之间的间距。
pub struct VehicleEntranceSeparation;

impl ArticleValidator for VehicleEntranceSeparation {
    fn rule_id(&self) -> &'static str {
        "15.2"
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
        let entrances: Vec<&Element> = members(context, &context.aggregates.groups.vehicle_entrances)
            .into_iter()
            .filter(|element| element.has_geometry())
            .collect();
        let note = exemption_note(context);
        if entrances.len() < 2 {
            return Ok(vec![result.not_applicable(format!(
                "Fewer than two non-garage vehicle entrances with geometry{note}"
            ))]);
        }

        let min = params.get("min_separation_m")?;
        let mut details = Vec::new();
        let mut closest = f64::INFINITY;
        for (i, first) in entrances.iter().enumerate() {
            for second in &entrances[i + 1..] {
                let distance = polygon::polygon_distance(&first.vertices, &second.vertices);
                closest = closest.min(distance);
                let pass = distance + EPSILON >= min;
                let pair = format!("{} / {}", display_name(first), display_name(second));
                let reason = if pass {
                    format!("{pair} {distance:.2} m apart ≥ {min} m")
                } else {
                    format!("{pair} {distance:.2} m apart < {min} m")
                };
                details.push(InstanceDetail {
                    element: "vehicle_entrance_pair".to_string(),
                    label: Some(pair),
                    observed_value: Some(distance),
                    pass,
                    reason,
                });
            }
        }
        let mut result = result.instances(
            details,
            Some(closest),
            Some(min),
            weakest_provenance(entrances.iter().copied()),
        );
        result.reason.push_str(&note);
        Ok(vec![result])
    }
}

pub struct VehicleEntranceWidth;

impl ArticleValidator for VehicleEntranceWidth {
    fn rule_id(&self) -> &'static str {
        "15.3"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["min_width_m", "max_width_m"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let entrances = members(context, &context.aggregates.groups.vehicle_entrances);
        let (min, max) = (params.get("min_width_m")?, params.get("max_width_m")?);
        let details: Vec<InstanceDetail> = entrances
            .iter()
            .filter_map(|entrance| width_detail(entrance, min, max))
            .collect();
        if details.is_empty() {
            return Ok(vec![result.not_applicable(format!(
                "No vehicle entrance with a known width{}",
                exemption_note(context)
            ))]);
        }
        let narrowest = entrances
            .iter()
            .filter_map(|entrance| entrance.width_m)
            .fold(f64::INFINITY, f64::min);
        Ok(vec![result.instances(
            details,
            Some(narrowest),
            Some(min),
            weakest_provenance(entrances.iter().copied()),
        )])
    }
}

/// 人行入口的数量与宽度。
pub struct PedestrianEntrances;

impl ArticleValidator for PedestrianEntrances {
    fn rule_id(&self) -> &'static str {
        "15.4"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["max_count", "min_width_m", "max_width_m"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let entrances = members(context, &context.aggregates.groups.pedestrian_entrances);
        if entrances.is_empty() {
            return Ok(vec![result.not_applicable("No pedestrian entrance in drawing")]);
        }

        let max_count = params.get("max_count")?;
        let count = entrances.len();
        let count_ok = count as f64 <= max_count;
        let mut details = vec![InstanceDetail::measure(
            "pedestrian_entrance_count",
            count as f64,
            count_ok,
            if count_ok {
                format!("{count} pedestrian entrances ≤ {max_count}")
            } else {
                format!("{count} pedestrian entrances > {max_count}")
            },
        )];
        let (min, max) = (params.get("min_width_m")?, params.get("max_width_m")?);
        details.extend(
            entrances
                .iter()
                .filter_map(|entrance| width_detail(entrance, min, max)),
        );
        Ok(vec![result.instances(
            details,
            Some(count as f64),
            Some(max_count),
            weakest_provenance(entrances.iter().copied()),
        )])
    }
}
