//! 第 5 条：建筑覆盖率与开放面积。

use plancheck_config::ConfigError;
use plancheck_core::model::Provenance;

use super::{ArticleValidator, EPSILON, Params, RuleContext, RuleResult};

const MISSING_AGGREGATE: &str = "Plot boundary or building footprint not found";

pub struct MaxCoverage;

impl ArticleValidator for MaxCoverage {
    fn rule_id(&self) -> &'static str {
        "5.1"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["max_coverage_percent"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let Some(coverage) = context.aggregates.coverage_percent else {
            return Ok(vec![result.not_applicable(MISSING_AGGREGATE)]);
        };
        let max = params.get("max_coverage_percent")?;
        let pass = coverage <= max + EPSILON;
        let reason = if pass {
            format!("Coverage {coverage:.2}% ≤ {max}%")
        } else {
            format!("Coverage {coverage:.2}% > {max}%")
        };
        Ok(vec![result.single(pass, Some(coverage), Some(max), reason, Provenance::Measured)])
    }
}

pub struct MinOpenArea;

impl ArticleValidator for MinOpenArea {
    fn rule_id(&self) -> &'static str {
        "5.2"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["min_open_area_percent"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let Some(open) = context.aggregates.open_area_percent else {
            return Ok(vec![result.not_applicable(MISSING_AGGREGATE)]);
        };
        let min = params.get("min_open_area_percent")?;
        let pass = open + EPSILON >= min;
        let reason = if pass {
            format!("Open area {open:.2}% ≥ {min}%")
        } else {
            format!("Open area {open:.2}% < {min}%")
        };
        Ok(vec![result.single(pass, Some(open), Some(min), reason, Provenance::Measured)])
    }
}
