use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod catalogue;

pub use catalogue::{
    ArticleSpec, Catalogue, Dimensions, ElementSpec, FloorLevel, FloorPosition, KeywordConfig,
    NameVocabulary, PartialRule, RuleKind, RuleSpec,
};

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "PLANCHECK_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub catalogue: Catalogue,
    /// 按规则编号覆盖参数，例如 `[rules."5.1"] max_coverage_percent = 60`。
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<String, BTreeMap<String, f64>>,
}

impl AppConfig {
    /// 从显式路径加载配置，并应用规则覆盖后校验。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.finalize()
    }

    /// 自动发现配置文件：优先读取环境变量 `PLANCHECK_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回内置默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Self::default().finalize()
        }
    }

    /// 显式路径优先，否则走自动发现。
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => Self::discover(),
        }
    }

    /// 把 `[rules]` 覆盖合并进目录并整体校验。覆盖合并后清空，
    /// 因此 `dump_json` 输出的就是内部实际使用的目录。
    pub fn finalize(mut self) -> Result<Self, ConfigError> {
        let overrides = std::mem::take(&mut self.rules);
        self.catalogue.apply_overrides(&overrides)?;
        self.pipeline.validate()?;
        self.catalogue.validate()?;
        Ok(self)
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 提取与匹配阶段的可调参数。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 首尾顶点距离不超过该值（原始单位）时视为闭合。
    #[serde(default = "PipelineConfig::default_closure_tolerance")]
    pub closure_tolerance: f64,
    /// 标注匹配半径 = 该倍数 × 几何包围盒半对角线。
    #[serde(default = "PipelineConfig::default_match_scale")]
    pub match_scale: f64,
    /// 判定距离相等的相对容差。
    #[serde(default = "PipelineConfig::default_tie_tolerance")]
    pub tie_tolerance: f64,
    #[serde(default = "PipelineConfig::default_unlabeled_min_area")]
    pub unlabeled_min_area_m2: f64,
    #[serde(default = "PipelineConfig::default_unlabeled_max_area")]
    pub unlabeled_max_area_m2: f64,
}

impl PipelineConfig {
    fn default_closure_tolerance() -> f64 {
        0.1
    }

    fn default_match_scale() -> f64 {
        1.5
    }

    fn default_tie_tolerance() -> f64 {
        1e-6
    }

    fn default_unlabeled_min_area() -> f64 {
        0.1
    }

    fn default_unlabeled_max_area() -> f64 {
        100_000.0
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("closure_tolerance", self.closure_tolerance, self.closure_tolerance >= 0.0),
            ("match_scale", self.match_scale, self.match_scale > 0.0),
            ("tie_tolerance", self.tie_tolerance, self.tie_tolerance >= 0.0),
            (
                "unlabeled_min_area_m2",
                self.unlabeled_min_area_m2,
                self.unlabeled_min_area_m2 >= 0.0,
            ),
            (
                "unlabeled_max_area_m2",
                self.unlabeled_max_area_m2,
                self.unlabeled_max_area_m2 > self.unlabeled_min_area_m2,
            ),
        ];
        for (name, value, ok) in checks {
            if !value.is_finite() || !ok {
                return Err(ConfigError::InvalidParameter {
                    rule_id: "pipeline".to_string(),
                    name: name.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            closure_tolerance: Self::default_closure_tolerance(),
            match_scale: Self::default_match_scale(),
            tie_tolerance: Self::default_tie_tolerance(),
            unlabeled_min_area_m2: Self::default_unlabeled_min_area(),
            unlabeled_max_area_m2: Self::default_unlabeled_max_area(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "ReportConfig::default_pretty")]
    pub pretty: bool,
}

impl ReportConfig {
    fn default_pretty() -> bool {
        true
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            pretty: Self::default_pretty(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
    #[error("未知的规则编号 {rule_id}")]
    UnknownRule { rule_id: String },
    #[error("规则 {rule_id} 缺少参数 {name}")]
    MissingParameter { rule_id: String, name: String },
    #[error("规则 {rule_id} 的参数 {name} 取值无效: {value}")]
    InvalidParameter {
        rule_id: String,
        name: String,
        value: f64,
    },
    #[error("{what} 重复: {id}")]
    Duplicate { what: &'static str, id: String },
    #[error("目录条目无效: {message}")]
    InvalidEntry { message: String },
    #[error("序列化目录失败: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
}
