//! 条文校验器注册表。
//!
//! 每条规则由一个实现 [`ArticleValidator`] 的校验器负责，启动时按目录中的条文顺序
//! 组装成 [`RuleRegistry`]。目录引用了没有校验器的规则编号，或缺少校验器声明的参数，
//! 都在处理任何图纸之前报告为配置错误。校验器之间互不依赖，只读取共享的
//! [`RuleContext`]。

use std::collections::BTreeMap;

use plancheck_config::{Catalogue, ConfigError, RuleSpec};
use plancheck_core::model::{Element, Provenance};
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregates::Aggregates;

pub mod annexes;
pub mod basement;
pub mod coverage;
pub mod elements;
pub mod entrances;
pub mod floors;
pub mod kitchens;
pub mod roof;
pub mod separation;
pub mod setback;
pub mod site;
pub mod suites;

pub use elements::{ElementDetails, ElementResult, evaluate_elements};

/// 阈值比较的容差。
pub(crate) const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Passed,
    Failed,
    NotApplicable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstanceCounts {
    pub total_instances: usize,
    pub passed_instances: usize,
    pub failed_instances: usize,
}

/// 规则下单个实例（元素、元素对或单项度量）的判定。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceDetail {
    pub element: String,
    pub label: Option<String>,
    pub observed_value: Option<f64>,
    pub pass: bool,
    pub reason: String,
}

impl InstanceDetail {
    pub fn for_element(element: &Element, observed_value: Option<f64>, pass: bool, reason: String) -> Self {
        Self {
            element: element.name.clone(),
            label: element.original_label.clone(),
            observed_value,
            pass,
            reason,
        }
    }

    pub fn measure(name: &str, observed_value: f64, pass: bool, reason: String) -> Self {
        Self {
            element: name.to_string(),
            label: None,
            observed_value: Some(observed_value),
            pass,
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub article_id: String,
    pub description: String,
    pub status: RuleStatus,
    pub pass: bool,
    pub observed_value: Option<f64>,
    pub limit: Option<f64>,
    pub reason: String,
    pub provenance: Provenance,
    #[serde(flatten)]
    pub counts: InstanceCounts,
    pub details: Vec<InstanceDetail>,
}

impl RuleResult {
    /// 尚未判定的结果骨架，状态为不适用。
    pub fn for_rule(
        rule_id: impl Into<String>,
        article_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            article_id: article_id.into(),
            description: description.into(),
            status: RuleStatus::NotApplicable,
            pass: true,
            observed_value: None,
            limit: None,
            reason: String::new(),
            provenance: Provenance::Measured,
            counts: InstanceCounts::default(),
            details: Vec::new(),
        }
    }

    /// 不适用：`pass` 为真且不计入通过/失败数。
    pub fn not_applicable(mut self, reason: impl Into<String>) -> Self {
        self.status = RuleStatus::NotApplicable;
        self.pass = true;
        self.reason = reason.into();
        self.counts = InstanceCounts::default();
        self
    }

    /// 校验器自身无法完成判定，按失败计一个实例。
    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.counts = InstanceCounts {
            total_instances: 1,
            passed_instances: 0,
            failed_instances: 1,
        };
        self.settle(false, reason.into())
    }

    /// 只有一个判定实例的规则。
    pub fn single(
        mut self,
        pass: bool,
        observed_value: Option<f64>,
        limit: Option<f64>,
        reason: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        self.observed_value = observed_value;
        self.limit = limit;
        self.provenance = provenance;
        self.counts = InstanceCounts {
            total_instances: 1,
            passed_instances: usize::from(pass),
            failed_instances: usize::from(!pass),
        };
        self.settle(pass, reason.into())
    }

    /// 多实例规则：全部实例通过才算通过。没有实例时为不适用。
    pub fn instances(
        mut self,
        details: Vec<InstanceDetail>,
        observed_value: Option<f64>,
        limit: Option<f64>,
        provenance: Provenance,
    ) -> Self {
        if details.is_empty() {
            return self.not_applicable("No instances to evaluate");
        }
        let passed = details.iter().filter(|detail| detail.pass).count();
        let failed = details.len() - passed;
        let reason = if failed == 0 {
            format!("{passed}/{} instances pass", details.len())
        } else {
            let failures: Vec<&str> = details
                .iter()
                .filter(|detail| !detail.pass)
                .map(|detail| detail.reason.as_str())
                .collect();
            format!("{failed}/{} instances fail: {}", details.len(), failures.join("; "))
        };
        self.observed_value = observed_value;
        self.limit = limit;
        self.provenance = provenance;
        self.counts = InstanceCounts {
            total_instances: details.len(),
            passed_instances: passed,
            failed_instances: failed,
        };
        self.details = details;
        self.settle(failed == 0, reason)
    }

    fn settle(mut self, pass: bool, reason: String) -> Self {
        self.pass = pass;
        self.status = if pass {
            RuleStatus::Passed
        } else {
            RuleStatus::Failed
        };
        self.reason = with_provenance(reason, self.provenance);
        self
    }
}

/// 非实测数值在原因里注明来源。
pub(crate) fn with_provenance(reason: String, provenance: Provenance) -> String {
    match provenance {
        Provenance::Measured => reason,
        other => format!("{reason} (based on {} values)", other.name()),
    }
}

/// 参与判定的元素中最弱的数值来源。
pub(crate) fn weakest_provenance<'a>(elements: impl IntoIterator<Item = &'a Element>) -> Provenance {
    elements
        .into_iter()
        .fold(Provenance::Measured, |acc, element| acc.weakest(element.provenance))
}

/// 元素在报告中的显示名：优先原始标注。
pub(crate) fn display_name(element: &Element) -> &str {
    element.original_label.as_deref().unwrap_or(&element.name)
}

/// 校验器可以读取的共享输入，整个评估期间只读。
pub struct RuleContext<'a> {
    pub elements: &'a [Element],
    pub aggregates: &'a Aggregates,
    pub catalogue: &'a Catalogue,
    pub element_results: &'a [ElementResult],
}

/// 一条规则的配置参数。声明过的参数在注册时已检查；读取未声明且缺失的参数返回错误。
pub struct Params<'a> {
    pub article_id: &'a str,
    pub spec: &'a RuleSpec,
}

impl Params<'_> {
    pub fn get(&self, name: &str) -> Result<f64, ConfigError> {
        self.spec
            .params
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::MissingParameter {
                rule_id: self.spec.rule_id.clone(),
                name: name.to_string(),
            })
    }

    pub fn result(&self) -> RuleResult {
        RuleResult::for_rule(
            self.spec.rule_id.as_str(),
            self.article_id,
            self.spec.description.as_str(),
        )
    }
}

pub trait ArticleValidator: Send + Sync {
    fn rule_id(&self) -> &'static str;

    fn required_params(&self) -> &'static [&'static str] {
        &[]
    }

    fn evaluate(
        &self,
        context: &RuleContext<'_>,
        params: &Params<'_>,
    ) -> Result<Vec<RuleResult>, ConfigError>;
}

struct RegisteredRule {
    article_id: String,
    spec: RuleSpec,
    validator: Box<dyn ArticleValidator>,
}

pub struct RuleRegistry {
    rules: Vec<RegisteredRule>,
}

impl RuleRegistry {
    /// 按目录中的条文顺序注册校验器。
    pub fn from_catalogue(catalogue: &Catalogue) -> Result<Self, ConfigError> {
        let mut available: BTreeMap<&'static str, Box<dyn ArticleValidator>> = builtin_validators()
            .into_iter()
            .map(|validator| (validator.rule_id(), validator))
            .collect();

        let mut registry = Self { rules: Vec::new() };
        for (article, spec) in catalogue.rules() {
            let validator = available.remove(spec.rule_id.as_str()).ok_or_else(|| {
                ConfigError::UnknownRule {
                    rule_id: spec.rule_id.clone(),
                }
            })?;
            registry.register(&article.article_id, spec, validator)?;
        }
        debug!(rules = registry.len(), "规则注册完成");
        Ok(registry)
    }

    pub fn register(
        &mut self,
        article_id: &str,
        spec: &RuleSpec,
        validator: Box<dyn ArticleValidator>,
    ) -> Result<(), ConfigError> {
        if let Some(name) = validator
            .required_params()
            .iter()
            .find(|name| !spec.params.contains_key(**name))
        {
            return Err(ConfigError::MissingParameter {
                rule_id: spec.rule_id.clone(),
                name: name.to_string(),
            });
        }
        self.rules.push(RegisteredRule {
            article_id: article_id.to_string(),
            spec: spec.clone(),
            validator,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.spec.rule_id.as_str())
    }

    /// 依注册顺序运行全部校验器。校验器返回的配置错误记为该规则失败，不中断其余规则。
    pub fn evaluate(&self, context: &RuleContext<'_>) -> Vec<RuleResult> {
        self.rules
            .iter()
            .flat_map(|rule| {
                let params = Params {
                    article_id: &rule.article_id,
                    spec: &rule.spec,
                };
                rule.validator
                    .evaluate(context, &params)
                    .unwrap_or_else(|error| {
                        warn!(rule = %rule.spec.rule_id, %error, "规则参数错误");
                        vec![params.result().failed(format!("Configuration error: {error}"))]
                    })
            })
            .collect()
    }
}

fn builtin_validators() -> Vec<Box<dyn ArticleValidator>> {
    vec![
        Box::new(coverage::MaxCoverage),
        Box::new(coverage::MinOpenArea),
        Box::new(setback::Setbacks),
        Box::new(setback::UnlabeledWithinPlot),
        Box::new(setback::Projection),
        Box::new(separation::AnnexSeparation),
        Box::new(separation::CorridorWidth),
        Box::new(floors::FloorCount),
        Box::new(basement::BasementCount),
        Box::new(basement::BasementWithinPlot),
        Box::new(roof::RoofBuildingCoverage),
        Box::new(roof::RoofOpenArea),
        Box::new(roof::RoofParapet),
        Box::new(elements::RequiredElements),
        Box::new(elements::NaturalVentilation),
        Box::new(site::FenceWithinPlot),
        Box::new(entrances::VehicleEntranceCount),
        Box::new(entrances::VehicleEntranceSeparation),
        Box::new(entrances::VehicleEntranceWidth),
        Box::new(entrances::PedestrianEntrances),
        Box::new(site::ParkingSpaces),
        Box::new(kitchens::KitchenCount),
        Box::new(kitchens::PantryKitchens),
        Box::new(suites::SuiteComposition),
        Box::new(annexes::ConnectedAnnexArea),
        Box::new(annexes::HOSPITALITY),
        Box::new(annexes::SERVICE),
        Box::new(annexes::SPORTS),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use plancheck_config::{ArticleSpec, RuleKind};

    fn spec(rule_id: &str, params: &[(&str, f64)]) -> RuleSpec {
        RuleSpec {
            rule_id: rule_id.to_string(),
            description: "test".to_string(),
            kind: RuleKind::Threshold,
            params: params.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn builtin_catalogue_registers_every_rule_in_order() {
        let catalogue = Catalogue::builtin();
        let registry = RuleRegistry::from_catalogue(&catalogue).expect("注册应当成功");
        let ids: Vec<&str> = registry.rule_ids().collect();
        let expected: Vec<&str> = catalogue.rules().map(|(_, r)| r.rule_id.as_str()).collect();
        assert_eq!(ids, expected);
        assert_eq!(registry.len(), 28);
    }

    #[test]
    fn unknown_rule_id_is_a_config_error() {
        let mut catalogue = Catalogue::builtin();
        catalogue.articles.push(ArticleSpec {
            article_id: "99".to_string(),
            title: "Unknown".to_string(),
            rules: vec![spec("99.1", &[])],
        });
        let error = RuleRegistry::from_catalogue(&catalogue).err().expect("应当失败");
        assert!(matches!(error, ConfigError::UnknownRule { rule_id } if rule_id == "99.1"));
    }

    #[test]
    fn missing_parameter_is_a_config_error() {
        let mut catalogue = Catalogue::builtin();
        catalogue.articles[0].rules[0].params.clear();
        let error = RuleRegistry::from_catalogue(&catalogue).err().expect("应当失败");
        assert!(matches!(
            error,
            ConfigError::MissingParameter { rule_id, name }
                if rule_id == "5.1" && name == "max_coverage_percent"
        ));
    }

    struct ReadsUndeclared;

    impl ArticleValidator for ReadsUndeclared {
        fn rule_id(&self) -> &'static str {
            "5.1"
        }

        fn evaluate(
            &self,
            _context: &RuleContext<'_>,
            params: &Params<'_>,
        ) -> Result<Vec<RuleResult>, ConfigError> {
            let limit = params.get("max_plot_ratio")?;
            Ok(vec![params.result().single(
                true,
                None,
                Some(limit),
                "unreachable",
                Provenance::Measured,
            )])
        }
    }

    #[test]
    fn reading_an_undeclared_parameter_fails_the_rule() {
        let catalogue = Catalogue::builtin();
        let mut registry = RuleRegistry { rules: Vec::new() };
        let declared = spec("5.1", &[("max_coverage_percent", 70.0)]);
        registry
            .register("5", &declared, Box::new(ReadsUndeclared))
            .expect("未声明的参数不在注册时检查");
        let aggregates = Aggregates::default();
        let context = RuleContext {
            elements: &[],
            aggregates: &aggregates,
            catalogue: &catalogue,
            element_results: &[],
        };

        let results = registry.evaluate(&context);
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.status, RuleStatus::Failed);
        assert!(!result.pass);
        assert_eq!(result.limit, None);
        assert_eq!(result.counts.failed_instances, 1);
        assert!(result.reason.starts_with("Configuration error"));
        assert!(result.reason.contains("max_plot_ratio"));
    }

    #[test]
    fn missing_parameter_lookup_names_rule_and_parameter() {
        let spec = spec("7.2", &[]);
        let params = Params { article_id: "7", spec: &spec };
        let error = params.get("min_width_m").err().expect("应当失败");
        assert!(matches!(
            error,
            ConfigError::MissingParameter { rule_id, name }
                if rule_id == "7.2" && name == "min_width_m"
        ));
    }

    #[test]
    fn instance_results_count_passes_and_failures() {
        let details = vec![
            InstanceDetail::measure("a", 1.0, true, "ok".to_string()),
            InstanceDetail::measure("b", 0.5, false, "b too small".to_string()),
        ];
        let result = RuleResult::for_rule("1.1", "1", "t").instances(
            details,
            None,
            None,
            Provenance::Estimated,
        );
        assert!(!result.pass);
        assert_eq!(result.status, RuleStatus::Failed);
        assert_eq!(result.counts.passed_instances, 1);
        assert_eq!(result.counts.failed_instances, 1);
        assert!(result.reason.contains("b too small"));
        assert!(result.reason.ends_with("(based on estimated values)"));
    }

    #[test]
    fn not_applicable_passes_without_counts() {
        let result = RuleResult::for_rule("1.1", "1", "t")
            .instances(Vec::new(), None, None, Provenance::Measured);
        assert!(result.pass);
        assert_eq!(result.status, RuleStatus::NotApplicable);
        assert_eq!(result.counts, InstanceCounts::default());
    }

    #[test]
    fn counts_flatten_into_the_result_json() {
        let result = RuleResult::for_rule("5.1", "5", "t").single(
            true,
            Some(46.67),
            Some(70.0),
            "ok",
            Provenance::Measured,
        );
        let json = serde_json::to_value(&result).expect("序列化应当成功");
        assert_eq!(json["total_instances"], 1);
        assert_eq!(json["passed_instances"], 1);
        assert_eq!(json["status"], "passed");
    }
}
