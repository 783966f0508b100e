pub mod aggregates;
pub mod classifier;
pub mod matcher;
pub mod measure;
pub mod metadata;
pub mod normalizer;
pub mod pipeline;
pub mod report;
pub mod rules;

pub mod errors {
    use plancheck_config::ConfigError;
    use plancheck_io::IoError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error(transparent)]
        Config(#[from] ConfigError),
        #[error(transparent)]
        Io(#[from] IoError),
        #[error("序列化报告失败: {0}")]
        Serialize(#[from] serde_json::Error),
    }
}

pub use errors::EngineError;
pub use pipeline::Pipeline;
pub use report::ComplianceReport;
