//! 第 6 条：退线、地块内的无标注几何、外凸。

use plancheck_config::ConfigError;
use plancheck_core::{model::Provenance, polygon};

use super::{ArticleValidator, EPSILON, InstanceDetail, Params, RuleContext, RuleResult};

pub struct Setbacks;

impl ArticleValidator for Setbacks {
    fn rule_id(&self) -> &'static str {
        "6.1"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["street_setback_m", "side_setback_m", "tolerance_m"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let Some(setbacks) = context.aggregates.setbacks else {
            return Ok(vec![result.not_applicable("Plot boundary or building footprint not found")]);
        };
        let tolerance = params.get("tolerance_m")?;

        let mut details = Vec::new();
        let mut check = |name: &str, observed: f64, min: f64| {
            let pass = observed + tolerance + EPSILON >= min;
            let reason = if pass {
                format!("{name} {observed:.2} m ≥ {min} m")
            } else {
                format!("{name} {observed:.2} m < {min} m")
            };
            details.push(InstanceDetail::measure(name, observed, pass, reason));
        };
        check(
            "Street setback",
            setbacks.street_m,
            params.get("street_setback_m")?,
        );
        if let Some(side) = setbacks.side_m {
            check("Side setback", side, params.get("side_setback_m")?);
        }

        let minimum = setbacks
            .side_m
            .map_or(setbacks.street_m, |side| side.min(setbacks.street_m));
        Ok(vec![result.instances(details, Some(minimum), None, Provenance::Measured)])
    }
}

/// 除地块外的无标注几何必须完全落在地块内。
pub struct UnlabeledWithinPlot;

impl ArticleValidator for UnlabeledWithinPlot {
    fn rule_id(&self) -> &'static str {
        "6.2"
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let Some(plot) = &context.aggregates.plot else {
            return Ok(vec![result.not_applicable("Plot boundary not found")]);
        };

        let details: Vec<InstanceDetail> = context
            .elements
            .iter()
            .filter(|element| element.is_unlabeled && element.has_geometry())
            .filter(|element| element.geometry_id() != Some(plot.geometry))
            .map(|element| {
                let inside = polygon::contains_polygon(&plot.vertices, &element.vertices);
                let area = element.area_m2.unwrap_or_default();
                let reason = if inside {
                    format!("Unlabeled geometry of {area:.2} m² lies within the plot")
                } else {
                    format!("Unlabeled geometry of {area:.2} m² extends beyond the plot")
                };
                InstanceDetail::for_element(element, element.area_m2, inside, reason)
            })
            .collect();

        if details.is_empty() {
            return Ok(vec![result.not_applicable("No unlabeled geometry besides the plot")]);
        }
        Ok(vec![result.instances(details, None, None, Provenance::Measured)])
    }
}

pub struct Projection;

impl ArticleValidator for Projection {
    fn rule_id(&self) -> &'static str {
        "6.3"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["max_projection_m"]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError> {
        let result = params.result();
        let Some(projection) = context.aggregates.projection_m else {
            return Ok(vec![result.not_applicable("Plot boundary or building footprint not found")]);
        };
        let max = params.get("max_projection_m")?;
        let pass = projection <= max + EPSILON;
        let reason = if pass {
            format!("Projection {projection:.2} m ≤ {max} m")
        } else {
            format!("Projection {projection:.2} m > {max} m")
        };
        Ok(vec![result.single(pass, Some(projection), Some(max), reason, Provenance::Measured)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::{Aggregates, Region, Setbacks as Measured};
    use crate::rules::RuleStatus;
    use plancheck_config::Catalogue;
    use plancheck_core::{
        geometry::Point2,
        model::{Element, ElementSource, GeometryId, GeometryKey, UNLABELED},
    };

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point2> {
        vec![
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        ]
    }

    fn unlabeled(id: usize, vertices: Vec<Point2>) -> Element {
        Element {
            name: UNLABELED.to_string(),
            original_label: None,
            area_m2: Some(polygon::area(&vertices)),
            width_m: None,
            ventilation: None,
            layer: "0".to_string(),
            is_unlabeled: true,
            source: ElementSource::Geometry {
                id: GeometryId(id),
                key: GeometryKey::from_vertices(&vertices),
            },
            vertices,
            provenance: Provenance::Measured,
        }
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
        let params = Params {
            article_id: "6",
            spec,
        };
        validator
            .evaluate(&context, &params)
            .expect("参数齐全")
            .remove(0)
    }

    #[test]
    fn setbacks_respect_tolerance() {
        let aggregates = Aggregates {
            setbacks: Some(Measured {
                street_m: 1.99,
                side_m: Some(3.0),
            }),
            ..Aggregates::default()
        };
        let result = run(&Setbacks, &[], &aggregates);
        assert!(result.pass);
        assert_eq!(result.counts.total_instances, 2);
        assert_eq!(result.observed_value, Some(1.99));
    }

    #[test]
    fn narrow_side_setback_fails() {
        let aggregates = Aggregates {
            setbacks: Some(Measured {
                street_m: 2.5,
                side_m: Some(1.0),
            }),
            ..Aggregates::default()
        };
        let result = run(&Setbacks, &[], &aggregates);
        assert!(!result.pass);
        assert_eq!(result.counts.failed_instances, 1);
        assert!(result.reason.contains("Side setback 1.00 m < 1.5 m"));
    }

    #[test]
    fn unlabeled_geometry_outside_plot_fails() {
        let plot = Region {
            geometry: GeometryId(0),
            layer: "PLOT".to_string(),
            area_m2: 300.0,
            vertices: rect(0.0, 0.0, 20.0, 15.0),
        };
        let aggregates = Aggregates {
            plot: Some(plot),
            ..Aggregates::default()
        };
        let elements = vec![
            unlabeled(0, rect(0.0, 0.0, 20.0, 15.0)),
            unlabeled(1, rect(2.0, 2.0, 4.0, 4.0)),
            unlabeled(2, rect(18.0, 2.0, 22.0, 4.0)),
        ];
        let result = run(&UnlabeledWithinPlot, &elements, &aggregates);
        assert_eq!(result.counts.total_instances, 2);
        assert_eq!(result.counts.failed_instances, 1);
        assert!(!result.pass);
    }

    #[test]
    fn projection_without_plot_is_not_applicable() {
        let result = run(&Projection, &[], &Aggregates::default());
        assert_eq!(result.status, RuleStatus::NotApplicable);
    }

    #[test]
    fn projection_over_limit_fails() {
        let aggregates = Aggregates {
            projection_m: Some(2.5),
            ..Aggregates::default()
        };
        let result = run(&Projection, &[], &aggregates);
        assert!(!result.pass);
        assert_eq!(result.reason, "Projection 2.50 m > 2 m");
    }
}
