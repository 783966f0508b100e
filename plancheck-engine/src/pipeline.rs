//! 单次校验的编排：提取 → 度量 → 匹配 → 分类 → 派生量 → 条文评估 → 报告。
//! 各阶段严格顺序执行，每个阶段完整产出后以只读方式交给下一阶段。

use std::path::Path;

use plancheck_config::AppConfig;
use plancheck_core::model::{Diagnostic, Stage};
use plancheck_io::{DrawingLoader, DxfExtractor, ExtractOptions, Extraction};
use tracing::{debug, info};

use crate::aggregates::Aggregates;
use crate::classifier::Classifier;
use crate::errors::EngineError;
use crate::matcher::match_labels;
use crate::measure::measure;
use crate::metadata::ProjectInfo;
use crate::normalizer::NameNormalizer;
use crate::report::ComplianceReport;
use crate::rules::{RuleContext, RuleRegistry, evaluate_elements};

pub struct Pipeline {
    config: AppConfig,
    registry: RuleRegistry,
    normalizer: NameNormalizer,
    extractor: DxfExtractor,
}

impl Pipeline {
    /// 校验目录并组装注册表；配置错误在处理任何图纸前返回。
    pub fn new(config: AppConfig) -> Result<Self, EngineError> {
        config.catalogue.validate()?;
        let registry = RuleRegistry::from_catalogue(&config.catalogue)?;
        let normalizer = NameNormalizer::new(&config.catalogue.vocabulary);
        let extractor = DxfExtractor::new(ExtractOptions {
            closure_tolerance: config.pipeline.closure_tolerance,
        });
        info!(
            rules = registry.len(),
            elements = config.catalogue.elements.len(),
            "校验流水线已就绪"
        );
        Ok(Self {
            config,
            registry,
            normalizer,
            extractor,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn run_path(&self, path: &Path) -> Result<ComplianceReport, EngineError> {
        info!(path = %path.display(), "开始校验图纸");
        let extraction = self.extractor.load(path)?;
        Ok(self.run_extraction(extraction))
    }

    pub fn run_str(&self, source: &str) -> Result<ComplianceReport, EngineError> {
        let extraction = self.extractor.extract_str(source)?;
        Ok(self.run_extraction(extraction))
    }

    pub fn run_extraction(&self, extraction: Extraction) -> ComplianceReport {
        let catalogue = &self.config.catalogue;
        let Extraction {
            labels,
            diagnostics: extract_diagnostics,
            ..
        } = &extraction;
        debug!(
            geometries = extraction.geometries.len(),
            labels = labels.len(),
            skipped = extraction.skipped.values().sum::<usize>(),
            dropped = extraction.dropped_degenerate,
            "提取完成"
        );
        let mut diagnostics: Vec<Diagnostic> = extract_diagnostics.clone();

        let measurement = measure(&extraction);
        diagnostics.extend(measurement.diagnostics.iter().cloned());

        let matches = match_labels(&measurement.records, labels, &self.config.pipeline);
        diagnostics.extend(matches.diagnostics.iter().cloned());

        let classification = Classifier::new(catalogue, &self.normalizer, &self.config.pipeline)
            .classify(&measurement.records, labels, &matches, &measurement.units);
        diagnostics.extend(classification.diagnostics.iter().cloned());
        let elements = classification.elements;

        let aggregates = Aggregates::compute(
            &measurement.records,
            labels,
            &elements,
            catalogue,
            &measurement.units,
        );
        if aggregates.plot.is_none() {
            diagnostics.push(Diagnostic::new(
                Stage::Rules,
                "未识别出地块边界，依赖地块的条文按不适用处理",
            ));
        } else if aggregates.footprint.is_none() {
            diagnostics.push(Diagnostic::new(
                Stage::Rules,
                "未识别出建筑轮廓，依赖轮廓的条文按不适用处理",
            ));
        }

        let element_results = evaluate_elements(&elements, catalogue);
        let context = RuleContext {
            elements: &elements,
            aggregates: &aggregates,
            catalogue,
            element_results: &element_results,
        };
        let rule_results = self.registry.evaluate(&context);

        let report = ComplianceReport::build(
            catalogue,
            measurement.units,
            ProjectInfo::from_labels(labels),
            &elements,
            element_results,
            rule_results,
            diagnostics,
        );
        info!(
            schema_pass = report.schema_pass,
            elements = elements.len(),
            failed_rules = report.summary.failed_rules,
            diagnostics = report.diagnostics.len(),
            "校验完成"
        );
        report
    }
}
