//! End-to-end tests for the `modreg` binary.
//!
//! Each test drives the real binary against a registry database in a
//! temporary directory, pinning the clock with `--at`.

use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const OWNER: &str = "0x1111111111111111111111111111111111111111";
const UPGRADER: &str = "0x2222222222222222222222222222222222222222";
const EMERGENCY: &str = "0x3333333333333333333333333333333333333333";
const ORACLE_V1: &str = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1";
const ORACLE_V2: &str = "0xa2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2";
const T0: u64 = 1_700_000_000;
const DELAY: u64 = 3_600;

struct Output {
    code: i32,
    json: Value,
}

fn modreg(db: &Path, caller: Option<&str>, at: u64, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_modreg"));
    cmd.env_remove("MODREG_CALLER")
        .env_remove("RUST_LOG")
        .arg("--db")
        .arg(db)
        .arg("--at")
        .arg(at.to_string());
    if let Some(caller) = caller {
        cmd.arg("--caller").arg(caller);
    }
    let output = cmd.args(args).output().expect("failed to run modreg");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {stdout}"));
    Output {
        code: output.status.code().unwrap_or(-1),
        json,
    }
}

fn init(dir: &TempDir) -> std::path::PathBuf {
    let db = dir.path().join("registry.db");
    let out = modreg(
        &db,
        None,
        T0,
        &["init", "--owner", OWNER, "--min-delay", &DELAY.to_string()],
    );
    assert_eq!(out.code, 0, "{}", out.json);
    assert_eq!(out.json["governance"]["owner"], OWNER);

    for (cmd, who) in [("set-upgrade-admin", UPGRADER), ("set-emergency-admin", EMERGENCY)] {
        let out = modreg(&db, Some(OWNER), T0, &[cmd, who]);
        assert_eq!(out.code, 0, "{}", out.json);
    }
    db
}

fn error_kind(out: &Output) -> &str {
    out.json["error"]["kind"].as_str().unwrap_or_default()
}

#[test]
fn test_init_and_status() {
    let dir = TempDir::new().unwrap();
    let db = init(&dir);

    let out = modreg(&db, None, T0, &["status"]);
    assert_eq!(out.code, 0);
    assert_eq!(out.json["governance"]["upgrade_admin"], UPGRADER);
    assert_eq!(out.json["governance"]["min_delay"], DELAY);
    assert_eq!(out.json["registered"], 0);
    assert_eq!(out.json["now"], T0);
}

#[test]
fn test_commands_require_initialized_registry() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("nested").join("missing.db");

    for args in [
        &["status"][..],
        &["resolve", "PriceOracle"][..],
        &["history", "count", "PriceOracle"][..],
    ] {
        let out = modreg(&db, None, T0, args);
        assert_eq!(out.code, 6, "{args:?}");
        assert_eq!(error_kind(&out), "internal");
    }
    assert!(!db.exists());
    assert!(!dir.path().join("nested").exists());
}

#[test]
fn test_set_and_resolve() {
    let dir = TempDir::new().unwrap();
    let db = init(&dir);

    let out = modreg(&db, None, T0, &["resolve", "PriceOracle", "--strict"]);
    assert_eq!(out.code, 3);
    assert_eq!(error_kind(&out), "state");

    let out = modreg(&db, Some(OWNER), T0, &["set", "PriceOracle", ORACLE_V1]);
    assert_eq!(out.code, 0, "{}", out.json);
    assert_eq!(out.json["outcome"], "updated");

    let out = modreg(&db, None, T0, &["resolve", "PriceOracle"]);
    assert_eq!(out.json["address"], ORACLE_V1);

    let out = modreg(&db, None, T0, &["history", "count", "PriceOracle"]);
    assert_eq!(out.json["count"], 1);
}

#[test]
fn test_timelocked_upgrade_through_cli() {
    let dir = TempDir::new().unwrap();
    let db = init(&dir);

    let out = modreg(&db, Some(UPGRADER), T0, &["schedule", "PriceOracle", ORACLE_V2]);
    assert_eq!(out.code, 0, "{}", out.json);
    assert_eq!(out.json["eligible_at"], T0 + DELAY);

    let out = modreg(&db, Some(UPGRADER), T0 + DELAY - 1, &["execute", "PriceOracle"]);
    assert_eq!(out.code, 4);
    assert_eq!(error_kind(&out), "timelock");

    let out = modreg(&db, Some(UPGRADER), T0 + DELAY, &["execute", "PriceOracle"]);
    assert_eq!(out.code, 0, "{}", out.json);

    let out = modreg(&db, None, T0 + DELAY, &["resolve", "PriceOracle"]);
    assert_eq!(out.json["address"], ORACLE_V2);
    let out = modreg(&db, None, T0 + DELAY, &["pending", "PriceOracle"]);
    assert_eq!(out.json["active"], false);
}

#[test]
fn test_exit_codes_by_error_kind() {
    let dir = TempDir::new().unwrap();
    let db = init(&dir);

    // Missing caller is a validation error.
    let out = modreg(&db, None, T0, &["pause"]);
    assert_eq!(out.code, 1);

    let out = modreg(&db, Some(UPGRADER), T0, &["set", "PriceOracle", ORACLE_V1]);
    assert_eq!(out.code, 2);
    assert_eq!(error_kind(&out), "authorization");

    let out = modreg(&db, Some(EMERGENCY), T0, &["pause"]);
    assert_eq!(out.code, 0);
    let out = modreg(&db, Some(OWNER), T0, &["set", "PriceOracle", ORACLE_V1]);
    assert_eq!(out.code, 5);
    assert_eq!(error_kind(&out), "availability");
}

#[test]
fn test_batch_set_is_all_or_nothing() {
    let dir = TempDir::new().unwrap();
    let db = init(&dir);
    let zero = "0x0000000000000000000000000000000000000000";

    let out = modreg(
        &db,
        Some(OWNER),
        T0,
        &[
            "batch-set",
            &format!("LendingEngine={ORACLE_V1}"),
            &format!("PriceOracle={zero}"),
        ],
    );
    assert_eq!(out.code, 1);

    let out = modreg(&db, None, T0, &["list-keys"]);
    assert_eq!(out.json["total_count"], 0);

    let out = modreg(&db, Some(OWNER), T0, &["batch-set", "LendingEngine=nothex"]);
    assert_eq!(out.code, 1);
}

#[test]
fn test_ownership_handover() {
    let dir = TempDir::new().unwrap();
    let db = init(&dir);
    let next = "0x7777777777777777777777777777777777777777";

    let out = modreg(&db, Some(OWNER), T0, &["set-admin", next]);
    assert_eq!(out.json["pending_admin"], next);

    let out = modreg(&db, Some(UPGRADER), T0, &["accept-admin"]);
    assert_eq!(out.code, 2);

    let out = modreg(&db, Some(next), T0, &["accept-admin"]);
    assert_eq!(out.code, 0, "{}", out.json);
    assert_eq!(out.json["owner"], next);
}
