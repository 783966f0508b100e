//! 第 10 条：屋面层。屋面轮廓取屋面图层上最大的闭合区域，屋面建筑是该图层上带几何的已标注元素。

use plancheck_config::ConfigError;
use plancheck_core::model::Provenance;

use super::{ArticleValidator, EPSILON, Params, RuleContext, RuleResult, weakest_provenance};
use crate::aggregates::RoofArea;

const NO_ROOF: &str = "No roof outline in drawing";

fn building_provenance(context: &RuleContext<'_>, roof: &RoofArea) -> Provenance {
    weakest_provenance(roof.buildings.iter().map(|&index| &context.elements[index]))
}

pub struct RoofBuildingCoverage;

impl ArticleValidator for RoofBuildingCoverage {
    fn rule_id(&self) -> &'static str {
        "10.1"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["max_roof_building_percent"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let Some(roof) = &context.aggregates.roof else {
            return Ok(vec![result.not_applicable(NO_ROOF)]);
        };
        let max = params.get("max_roof_building_percent")?;
        let coverage = roof.coverage_percent;
        let pass = coverage <= max + EPSILON;
        let reason = format!(
            "Roof buildings {:.2} m² of {:.2} m² roof ({coverage:.2}%) {} {max}%",
            roof.occupied_m2,
            roof.outline.area_m2,
            if pass { "≤" } else { ">" }
        );
        Ok(vec![result.single(
            pass,
            Some(coverage),
            Some(max),
            reason,
            building_provenance(context, roof),
        )])
    }
}

pub struct RoofOpenArea;

impl ArticleValidator for RoofOpenArea {
    fn rule_id(&self) -> &'static str {
        "10.3"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["min_roof_open_percent"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let Some(roof) = &context.aggregates.roof else {
            return Ok(vec![result.not_applicable(NO_ROOF)]);
        };
        let min = params.get("min_roof_open_percent")?;
        let open = roof.open_percent;
        let pass = open + EPSILON >= min;
        let reason = format!(
            "Open roof {:.2} m² ({open:.2}%) {} {min}%",
            roof.open_m2,
            if pass { "≥" } else { "<" }
        );
        Ok(vec![result.single(
            pass,
            Some(open),
            Some(min),
            reason,
            building_provenance(context, roof),
        )])
    }
}

/// 有开敞屋面时必须画出女儿墙。高度需要标高数据，这里只检查是否存在。
pub struct RoofParapet;

impl ArticleValidator for RoofParapet {
    fn rule_id(&self) -> &'static str {
        "10.4"
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let Some(roof) = &context.aggregates.roof else {
            return Ok(vec![result.not_applicable(NO_ROOF)]);
        };
        if roof.open_m2 <= EPSILON {
            return Ok(vec![result.not_applicable("Roof has no open area")]);
        }
        let parapets = context.aggregates.groups.parapets.len();
        let pass = parapets > 0;
        let reason = if pass {
            format!("{parapets} parapet(s) drawn around {:.2} m² of open roof", roof.open_m2)
        } else {
            format!("No parapet drawn around {:.2} m² of open roof", roof.open_m2)
        };
        Ok(vec![result.single(
            pass,
            Some(parapets as f64),
            Some(1.0),
            reason,
            Provenance::Measured,
        )])
    }
}
