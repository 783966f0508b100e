//! 第 19 条：套房组成。套房轮廓内按质心归属的元素计入该套房。

use plancheck_config::ConfigError;
use plancheck_core::model::Element;

use super::{
    ArticleValidator, EPSILON, InstanceDetail, Params, RuleContext, RuleResult, display_name,
    weakest_provenance,
};

fn is_room(element: &Element) -> bool {
    element.name.ends_with("bedroom")
}

fn is_living_space(element: &Element) -> bool {
    element.name == "main_hall" || element.name.contains("living")
}

pub struct SuiteComposition;

impl ArticleValidator for SuiteComposition {
    fn rule_id(&self) -> &'static str {
        "19.2"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["max_rooms", "max_living_spaces", "max_pantry_kitchens"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let suites = &context.aggregates.suites;
        if suites.is_empty() {
            return Ok(vec![result.not_applicable("No suite outline in drawing")]);
        }
        let max_rooms = params.get("max_rooms")?;
        let max_living = params.get("max_living_spaces")?;
        let max_kitchens = params.get("max_pantry_kitchens")?;
        let kitchens = &context.aggregates.groups.kitchens;

        let mut details = Vec::with_capacity(suites.len() * 3);
        let mut members_seen: Vec<&Element> = Vec::new();
        let mut most_rooms = 0usize;
        for suite in suites {
            let name = display_name(&context.elements[suite.outline]);
            let members: Vec<&Element> = suite
                .members
                .iter()
                .map(|&index| &context.elements[index])
                .collect();
            let rooms = members.iter().filter(|member| is_room(member)).count();
            let living = members.iter().filter(|member| is_living_space(member)).count();
            let pantry = suite
                .members
                .iter()
                .filter(|&index| kitchens.contains(index))
                .count();
            most_rooms = most_rooms.max(rooms);

            for (what, count, max) in [
                ("room(s)", rooms, max_rooms),
                ("living space(s)", living, max_living),
                ("pantry kitchen(s)", pantry, max_kitchens),
            ] {
                let pass = count as f64 <= max + EPSILON;
                let reason = format!(
                    "{name} has {count} {what} {} {max}",
                    if pass { "≤" } else { ">" }
                );
                details.push(InstanceDetail::measure(name, count as f64, pass, reason));
            }
            members_seen.extend(members);
        }

        Ok(vec![result.instances(
            details,
            Some(most_rooms as f64),
            Some(max_rooms),
            weakest_provenance(members_seen.into_iter()),
        )])
    }
}
