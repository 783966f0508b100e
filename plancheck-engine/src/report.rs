//! 合规报告。字段名与嵌套结构是对外契约，序列化后供调用方直接消费。

use std::collections::BTreeMap;

use indexmap::IndexMap;
use plancheck_config::Catalogue;
use plancheck_core::{
    model::{Diagnostic, Element},
    units::UnitContext,
};
use serde::Serialize;

use crate::metadata::ProjectInfo;
use crate::rules::{ElementResult, RuleResult, RuleStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArticleSummary {
    pub title: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub not_applicable: usize,
    pub pass: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_rules: usize,
    pub passed_rules: usize,
    pub failed_rules: usize,
    pub not_applicable_rules: usize,
    pub total_elements: usize,
    pub passed_elements: usize,
    pub failed_elements: usize,
    pub required_kinds: Vec<String>,
    pub present_kinds: Vec<String>,
    pub missing_kinds: Vec<String>,
    pub articles: IndexMap<String, ArticleSummary>,
    /// 按名称统计的元素数量，包括无标注元素。
    pub element_counts: BTreeMap<String, usize>,
    pub articles_pass: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceReport {
    pub schema_pass: bool,
    pub units: UnitContext,
    pub project: ProjectInfo,
    pub element_results: Vec<ElementResult>,
    /// 规则编号到结果，保持注册顺序。
    pub article_results: IndexMap<String, RuleResult>,
    pub summary: Summary,
    pub diagnostics: Vec<Diagnostic>,
}

impl ComplianceReport {
    pub fn build(
        catalogue: &Catalogue,
        units: UnitContext,
        project: ProjectInfo,
        elements: &[Element],
        element_results: Vec<ElementResult>,
        rule_results: Vec<RuleResult>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let schema_pass = schema_pass(catalogue, &element_results);
        let article_results: IndexMap<String, RuleResult> = rule_results
            .into_iter()
            .map(|result| (result.rule_id.clone(), result))
            .collect();
        let summary = summarize(catalogue, elements, &element_results, &article_results);
        Self {
            schema_pass,
            units,
            project,
            element_results,
            article_results,
            summary,
            diagnostics,
        }
    }

    pub fn rule(&self, rule_id: &str) -> Option<&RuleResult> {
        self.article_results.get(rule_id)
    }

    /// 所有规则都通过（不适用视为通过）且必需元素齐全合格。
    pub fn is_compliant(&self) -> bool {
        self.schema_pass && self.summary.articles_pass
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

/// 每个必需种类都至少出现一次（实测或估算均可），且这些元素自身的尺寸与通风判定全部通过。
pub fn schema_pass(catalogue: &Catalogue, element_results: &[ElementResult]) -> bool {
    catalogue.required_kinds().all(|kind| {
        let mut instances = element_results.iter().filter(|r| r.element == kind).peekable();
        instances.peek().is_some() && instances.all(|r| r.pass)
    })
}

fn summarize(
    catalogue: &Catalogue,
    elements: &[Element],
    element_results: &[ElementResult],
    article_results: &IndexMap<String, RuleResult>,
) -> Summary {
    let mut articles: IndexMap<String, ArticleSummary> = IndexMap::new();
    for result in article_results.values() {
        let entry = articles
            .entry(result.article_id.clone())
            .or_insert_with(|| ArticleSummary {
                title: catalogue
                    .articles
                    .iter()
                    .find(|article| article.article_id == result.article_id)
                    .map(|article| article.title.clone())
                    .unwrap_or_default(),
                pass: true,
                ..ArticleSummary::default()
            });
        entry.total += 1;
        match result.status {
            RuleStatus::Passed => entry.passed += 1,
            RuleStatus::Failed => {
                entry.failed += 1;
                entry.pass = false;
            }
            RuleStatus::NotApplicable => entry.not_applicable += 1,
        }
    }

    let count = |status: RuleStatus| {
        article_results
            .values()
            .filter(|result| result.status == status)
            .count()
    };

    let required_kinds: Vec<String> = catalogue.required_kinds().map(str::to_string).collect();
    let present_kinds: Vec<String> = catalogue
        .elements
        .iter()
        .filter(|spec| element_results.iter().any(|r| r.element == spec.kind))
        .map(|spec| spec.kind.clone())
        .collect();
    let missing_kinds: Vec<String> = required_kinds
        .iter()
        .filter(|kind| !present_kinds.contains(kind))
        .cloned()
        .collect();

    let mut element_counts = BTreeMap::new();
    for element in elements {
        *element_counts.entry(element.name.clone()).or_insert(0) += 1;
    }

    let passed_elements = element_results.iter().filter(|r| r.pass).count();
    Summary {
        total_rules: article_results.len(),
        passed_rules: count(RuleStatus::Passed),
        failed_rules: count(RuleStatus::Failed),
        not_applicable_rules: count(RuleStatus::NotApplicable),
        total_elements: element_results.len(),
        passed_elements,
        failed_elements: element_results.len() - passed_elements,
        required_kinds,
        present_kinds,
        missing_kinds,
        articles_pass: articles.values().all(|article| article.pass),
        articles,
        element_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::evaluate_elements;
    use plancheck_core::{
        model::{ElementSource, LabelId, Provenance, Ventilation},
        units::DrawingUnit,
    };

    fn room(name: &str, area: f64, width: f64) -> Element {
        Element {
            name: name.to_string(),
            original_label: Some(name.to_uppercase()),
            area_m2: Some(area),
            width_m: Some(width),
            ventilation: Some(Ventilation::Natural),
            layer: "ROOMS".to_string(),
            is_unlabeled: false,
            vertices: Vec::new(),
            provenance: Provenance::Measured,
            source: ElementSource::Label { id: LabelId(0) },
        }
    }

    fn complete() -> Vec<Element> {
        vec![
            room("main_hall", 25.0, 5.0),
            room("master_bedroom", 18.0, 4.0),
            room("bathroom", 4.0, 2.0),
            room("kitchen", 14.0, 3.5),
        ]
    }

    fn report(elements: &[Element], rule_results: Vec<RuleResult>) -> ComplianceReport {
        let catalogue = Catalogue::builtin();
        let element_results = evaluate_elements(elements, &catalogue);
        ComplianceReport::build(
            &catalogue,
            UnitContext::declared(DrawingUnit::Meters),
            ProjectInfo::default(),
            elements,
            element_results,
            rule_results,
            Vec::new(),
        )
    }

    #[test]
    fn complete_required_set_passes_schema() {
        let report = report(&complete(), Vec::new());
        assert!(report.schema_pass);
        assert!(report.summary.missing_kinds.is_empty());
        assert_eq!(report.summary.total_elements, 4);
        assert_eq!(report.summary.element_counts.get("kitchen"), Some(&1));
    }

    #[test]
    fn failing_required_element_fails_schema() {
        let mut elements = complete();
        elements[0].area_m2 = Some(15.0);
        let report = report(&elements, Vec::new());
        assert!(!report.schema_pass);
        assert_eq!(report.summary.failed_elements, 1);
    }

    #[test]
    fn article_summary_groups_by_article_in_order() {
        let results = vec![
            RuleResult::for_rule("5.1", "5", "a").single(true, None, None, "ok", Provenance::Measured),
            RuleResult::for_rule("5.2", "5", "b").single(false, None, None, "no", Provenance::Measured),
            RuleResult::for_rule("6.3", "6", "c").not_applicable("missing"),
        ];
        let report = report(&complete(), results);
        let keys: Vec<&str> = report.summary.articles.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["5", "6"]);
        let coverage = &report.summary.articles["5"];
        assert_eq!(coverage.title, "Building coverage");
        assert_eq!((coverage.passed, coverage.failed), (1, 1));
        assert!(!coverage.pass);
        assert!(report.summary.articles["6"].pass);
        assert_eq!(report.summary.not_applicable_rules, 1);
        assert!(!report.summary.articles_pass);
        assert!(!report.is_compliant());
    }

    #[test]
    fn json_uses_stable_field_names() {
        let report = report(&complete(), Vec::new());
        let json: serde_json::Value =
            serde_json::from_str(&report.to_json(false).expect("序列化")).expect("解析");
        for field in [
            "schema_pass",
            "units",
            "project",
            "element_results",
            "article_results",
            "summary",
            "diagnostics",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["units"]["unit"], "meters");
    }
}
