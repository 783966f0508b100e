use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use plancheck_config::AppConfig;
use plancheck_engine::{Pipeline, rules::RuleRegistry};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// 违规时配合 `--fail-on-noncompliance` 使用的退出码。
const NONCOMPLIANT_EXIT: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "plancheck",
    version,
    about = "Check DXF floor plans against building-code articles and print a JSON compliance report."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate one drawing and print the compliance report.
    Check(CheckArgs),
    /// Print the element and article catalogue in use.
    DumpConfig(ConfigArgs),
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Drawing in the DXF text exchange format.
    drawing: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the report to this file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Single-line JSON.
    #[arg(long)]
    compact: bool,
    /// Exit with status 2 when the drawing is not compliant.
    #[arg(long)]
    fail_on_noncompliance: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Check(args) => check(args),
        Command::DumpConfig(args) => dump_config(args),
    };
    match outcome {
        Ok(code) => code,
        Err(err) => {
            error!(error = %format!("{err:#}"), "执行失败");
            eprintln!("错误: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn check(args: CheckArgs) -> Result<ExitCode> {
    let config = load_configuration(args.config.as_deref())?;
    init_logging(&config);
    let pretty = config.report.pretty && !args.compact;

    let pipeline = Pipeline::new(config).context("初始化校验流水线失败")?;
    let report = pipeline
        .run_path(&args.drawing)
        .with_context(|| format!("无法校验图纸 {}", args.drawing.display()))?;
    let json = report.to_json(pretty).context("序列化报告失败")?;

    match &args.output {
        Some(path) => {
            fs::write(path, format!("{json}\n"))
                .with_context(|| format!("写入报告 {} 失败", path.display()))?;
            info!(path = %path.display(), "报告已写入");
        }
        None => println!("{json}"),
    }

    if args.fail_on_noncompliance && !report.is_compliant() {
        warn!(
            schema_pass = report.schema_pass,
            failed_rules = report.summary.failed_rules,
            "图纸不合规"
        );
        return Ok(ExitCode::from(NONCOMPLIANT_EXIT));
    }
    Ok(ExitCode::SUCCESS)
}

fn dump_config(args: ConfigArgs) -> Result<ExitCode> {
    let config = load_configuration(args.config.as_deref())?;
    init_logging(&config);
    // 输出前确认每条规则都有校验器
    RuleRegistry::from_catalogue(&config.catalogue).context("目录中的规则无法注册")?;
    println!("{}", config.catalogue.dump_json()?);
    Ok(ExitCode::SUCCESS)
}

/// 配置错误是部署问题，直接失败，不回退到默认值。
fn load_configuration(explicit: Option<&Path>) -> Result<AppConfig> {
    AppConfig::load(explicit).with_context(|| match explicit {
        Some(path) => format!("加载配置 {} 失败", path.display()),
        None => "加载配置失败".to_string(),
    })
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
