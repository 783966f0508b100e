//! 第 8 条：层数。楼层由图层名和图名标注识别，屋面层不计。

use plancheck_config::ConfigError;
use plancheck_core::model::Provenance;

use super::{ArticleValidator, InstanceDetail, Params, RuleContext, RuleResult};

pub struct FloorCount;

impl ArticleValidator for FloorCount {
    fn rule_id(&self) -> &'static str {
        "8.1"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["max_above_ground_floors", "max_basement_floors"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let Some(floors) = &context.aggregates.floors else {
            return Ok(vec![result.not_applicable("No floor level identified in layers or titles")]);
        };

        let max_above = params.get("max_above_ground_floors")?;
        let max_basement = params.get("max_basement_floors")?;
        let check = |name: &str, count: usize, max: f64| {
            let observed = count as f64;
            let pass = observed <= max;
            let reason = if pass {
                format!("{count} {name} ≤ {max}")
            } else {
                format!("{count} {name} > {max}")
            };
            InstanceDetail::measure(name, observed, pass, reason)
        };
        let details = vec![
            check("above-ground floors", floors.above_ground, max_above),
            check("basement floors", floors.basement, max_basement),
        ];
        let mut result = result.instances(
            details,
            Some(floors.above_ground as f64),
            Some(max_above),
            Provenance::Measured,
        );
        result.reason = format!("{} [levels: {}]", result.reason, floors.levels.join(", "));
        Ok(vec![result])
    }
}
