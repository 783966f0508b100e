//! 第 14、16 条：围墙与停车位。

use plancheck_config::ConfigError;
use plancheck_core::{model::Element, polygon};

use super::{
    ArticleValidator, EPSILON, InstanceDetail, Params, RuleContext, RuleResult, display_name,
    weakest_provenance,
};

/// 围墙可以压在地块边界上，但不能越过边界超过容差。
pub struct FenceWithinPlot;

impl ArticleValidator for FenceWithinPlot {
    fn rule_id(&self) -> &'static str {
        "14.1"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["tolerance_m"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let fences: Vec<&Element> = context
            .aggregates
            .groups
            .fences
            .iter()
            .map(|&index| &context.elements[index])
            .filter(|element| element.has_geometry())
            .collect();
        if fences.is_empty() {
            return Ok(vec![result.not_applicable("No fence with geometry in drawing")]);
        }
        let Some(plot) = &context.aggregates.plot else {
            return Ok(vec![result.not_applicable("Plot boundary not found")]);
        };

        let tolerance = params.get("tolerance_m")?;
        let mut furthest: f64 = 0.0;
        let details: Vec<InstanceDetail> = fences
            .iter()
            .map(|fence| {
                let beyond = polygon::max_projection(&plot.vertices, &fence.vertices);
                furthest = furthest.max(beyond);
                let pass = beyond <= tolerance + EPSILON;
                let reason = if pass {
                    format!("{} stays within the plot", display_name(fence))
                } else {
                    format!("{} extends {beyond:.2} m beyond the plot", display_name(fence))
                };
                InstanceDetail::for_element(fence, Some(beyond), pass, reason)
            })
            .collect();
        Ok(vec![result.instances(
            details,
            Some(furthest),
            Some(tolerance),
            weakest_provenance(fences.iter().copied()),
        )])
    }
}

/// 车库与标注为停车位的元素合计不少于下限。
pub struct ParkingSpaces;

impl ArticleValidator for ParkingSpaces {
    fn rule_id(&self) -> &'static str {
        "16.1"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["min_spaces"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let groups = &context.aggregates.groups;
        let spaces: Vec<&Element> = groups
            .parking
            .iter()
            .chain(&groups.exempt_garages)
            .map(|&index| &context.elements[index])
            .collect();
        if spaces.is_empty() {
            return Ok(vec![result.not_applicable("No parking space or garage in drawing")]);
        }
        let min = params.get("min_spaces")?;
        let count = spaces.len();
        let pass = count as f64 + EPSILON >= min;
        let names: Vec<&str> = spaces.iter().map(|space| display_name(space)).collect();
        let reason = format!(
            "{count} parking space(s) {} {min}: {}",
            if pass { "≥" } else { "<" },
            names.join(", ")
        );
        Ok(vec![result.single(
            pass,
            Some(count as f64),
            Some(min),
            reason,
            weakest_provenance(spaces.iter().copied()),
        )])
    }
}
