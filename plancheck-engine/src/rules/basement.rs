//! 第 9 条：地下室层数与地下室轮廓。没有识别到地下室时两条规则都不适用。

use plancheck_config::ConfigError;
use plancheck_core::{model::Provenance, polygon};

use super::{ArticleValidator, EPSILON, Params, RuleContext, RuleResult};

pub struct BasementCount;

impl ArticleValidator for BasementCount {
    fn rule_id(&self) -> &'static str {
        "9.1"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["max_basements"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let basements = context
            .aggregates
            .floors
            .as_ref()
            .map_or(0, |floors| floors.basement);
        if basements == 0 {
            return Ok(vec![result.not_applicable("No basement level identified")]);
        }
        let max = params.get("max_basements")?;
        let pass = basements as f64 <= max;
        let reason = if pass {
            format!("{basements} basement level(s) ≤ {max}")
        } else {
            format!("{basements} basement level(s) > {max}")
        };
        Ok(vec![result.single(
            pass,
            Some(basements as f64),
            Some(max),
            reason,
            Provenance::Measured,
        )])
    }
}

/// 地下室可以越出地上建筑，但不能越出地块。
pub struct BasementWithinPlot;

impl ArticleValidator for BasementWithinPlot {
    fn rule_id(&self) -> &'static str {
        "9.2"
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
        let Some(basement) = &context.aggregates.basement else {
            return Ok(vec![result.not_applicable("No basement outline in drawing")]);
        };
        let Some(plot) = &context.aggregates.plot else {
            return Ok(vec![result.not_applicable("Plot boundary not found")]);
        };
        let tolerance = params.get("tolerance_m")?;
        let beyond = polygon::max_projection(&plot.vertices, &basement.vertices);
        let pass = beyond <= tolerance + EPSILON;
        let reason = if pass {
            format!("Basement outline on layer {} lies within the plot", basement.layer)
        } else {
            format!("Basement outline extends {beyond:.2} m beyond the plot")
        };
        Ok(vec![result.single(
            pass,
            Some(beyond),
            Some(tolerance),
            reason,
            Provenance::Measured,
        )])
    }
}
