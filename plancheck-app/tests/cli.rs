use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn villa() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("plancheck-engine")
        .join("tests")
        .join("data")
        .join("villa_mm.dxf")
}

fn plancheck(workdir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("plancheck").expect("二进制应当存在");
    cmd.current_dir(workdir).env_remove("PLANCHECK_CONFIG");
    cmd
}

/// 只有主厅的米制图纸，缺少其余必需元素。
const HALL_ONLY: &str = "0\nSECTION\n2\nHEADER\n9\n$INSUNITS\n70\n6\n0\nENDSEC\n\
0\nSECTION\n2\nENTITIES\n\
0\nLWPOLYLINE\n8\nROOMS\n90\n4\n70\n1\n10\n0\n20\n0\n10\n5\n20\n0\n10\n5\n20\n5\n10\n0\n20\n5\n\
0\nTEXT\n8\nA-TEXT\n10\n2.5\n20\n2.5\n1\nMAIN HALL\n\
0\nENDSEC\n0\nEOF\n";

#[test]
fn check_prints_report_json() {
    let dir = tempdir().expect("临时目录");
    let output = plancheck(dir.path())
        .arg("check")
        .arg(villa())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&output).expect("stdout 应为 JSON");
    assert_eq!(report["schema_pass"], true);
    assert_eq!(report["project"]["plot_number"], "1234");
    assert_eq!(report["article_results"]["5.1"]["status"], "passed");
}

#[test]
fn compact_report_is_written_to_file() {
    let dir = tempdir().expect("临时目录");
    let target = dir.path().join("report.json");
    plancheck(dir.path())
        .arg("check")
        .arg(villa())
        .arg("--compact")
        .arg("--output")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let written = fs::read_to_string(&target).expect("报告文件");
    assert_eq!(written.trim_end().lines().count(), 1);
    let report: serde_json::Value = serde_json::from_str(&written).expect("JSON");
    assert!(report["summary"]["articles_pass"].as_bool().expect("布尔值"));
}

#[test]
fn noncompliance_exit_code_is_opt_in() {
    let dir = tempdir().expect("临时目录");
    let drawing = dir.path().join("hall.dxf");
    fs::write(&drawing, HALL_ONLY).expect("写入图纸");

    plancheck(dir.path())
        .arg("check")
        .arg(&drawing)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"schema_pass\": false"));

    plancheck(dir.path())
        .arg("check")
        .arg(&drawing)
        .arg("--fail-on-noncompliance")
        .assert()
        .code(2);
}

#[test]
fn dump_config_prints_catalogue() {
    let dir = tempdir().expect("临时目录");
    let output = plancheck(dir.path())
        .arg("dump-config")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let catalogue: serde_json::Value = serde_json::from_slice(&output).expect("JSON");
    assert_eq!(catalogue["elements"][0]["kind"], "main_hall");
    assert_eq!(catalogue["articles"][0]["rules"][0]["rule_id"], "5.1");
}

#[test]
fn config_overrides_reach_the_dump() {
    let dir = tempdir().expect("临时目录");
    let config = dir.path().join("plancheck.toml");
    fs::write(&config, "[rules.\"5.1\"]\nmax_coverage_percent = 60.0\n").expect("写入配置");
    plancheck(dir.path())
        .arg("dump-config")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"max_coverage_percent\": 60.0"));
}

#[test]
fn unknown_rule_in_config_is_fatal() {
    let dir = tempdir().expect("临时目录");
    let config = dir.path().join("plancheck.toml");
    fs::write(&config, "[rules.\"99.9\"]\nlimit = 1.0\n").expect("写入配置");
    plancheck(dir.path())
        .arg("check")
        .arg(villa())
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("99.9"));
}

#[test]
fn missing_drawing_fails() {
    let dir = tempdir().expect("临时目录");
    plancheck(dir.path())
        .arg("check")
        .arg(dir.path().join("absent.dxf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.dxf"));
}
