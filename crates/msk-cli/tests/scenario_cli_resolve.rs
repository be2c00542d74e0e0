//! `msk resolve` on the reference calendar.
//!
//!   2024-03-08 Fri 18:00Z  after close; the weekend follows

use assert_cmd::Command;
use msk_calendar::{codec, CalendarId};
use msk_testkit::{calendar_dir, exchange_a};
use predicates::prelude::*;
use std::fs;

#[test]
fn forward_from_friday_evening() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("exchange.json");
    fs::write(&path, codec::encode(&exchange_a()))?;

    Command::cargo_bin("msk")?
        .arg("resolve")
        .arg(&path)
        .args(["--at", "2024-03-08T18:00:00Z", "--count", "2", "--target", "AAA"])
        .assert()
        .success()
        .stdout(predicate::eq(
            "{\"O\":\"AAA\",\"S\":1,\"T\":\"2024-03-11T09:00:00.000\"}\n\
             {\"O\":\"AAA\",\"S\":0,\"T\":\"2024-03-11T17:00:00.000\"}\n",
        ));
    Ok(())
}

#[test]
fn backward_walks_past_each_hit() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("exchange.json");
    fs::write(&path, codec::encode(&exchange_a()))?;

    Command::cargo_bin("msk")?
        .arg("resolve")
        .arg(&path)
        .args(["--at", "2024-03-11T09:00:00Z", "--count", "3", "--backward"])
        .assert()
        .success()
        .stdout(predicate::eq(
            "{\"S\":1,\"T\":\"2024-03-11T09:00:00.000\"}\n\
             {\"S\":0,\"T\":\"2024-03-08T17:00:00.000\"}\n\
             {\"S\":1,\"T\":\"2024-03-08T09:00:00.000\"}\n",
        ));
    Ok(())
}

#[test]
fn from_configured_store() -> anyhow::Result<()> {
    let cal = exchange_a();
    let store = calendar_dir(&[(CalendarId(4), &cal)])?;
    let cfg = store.path().join("msk.yaml");
    fs::write(&cfg, "calendars:\n  dir: \".\"\n")?;

    Command::cargo_bin("msk")?
        .arg("resolve")
        .arg("--config")
        .arg(&cfg)
        .args(["--id", "4", "--at", "2024-03-04T08:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::eq("{\"S\":1,\"T\":\"2024-03-04T09:00:00.000\"}\n"));
    Ok(())
}

#[test]
fn bad_instant_is_rejected() -> anyhow::Result<()> {
    Command::cargo_bin("msk")?
        .args(["resolve", "whatever.json", "--at", "yesterday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("RFC 3339"));
    Ok(())
}
