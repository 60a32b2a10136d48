// tests/cli.rs
//
// Runs the `sweetener` binary the way a user would.

use assert_cmd::Command;
use image::{ImageBuffer, Rgb, RgbImage};
use predicates::prelude::*;
use tempfile::TempDir;

fn sweetener() -> Command {
    Command::cargo_bin("sweetener").unwrap()
}

fn photo_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let img: RgbImage = ImageBuffer::from_fn(300, 200, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 40]));
    img.save_with_format(dir.path().join("shot.jpg"), image::ImageFormat::Jpeg).unwrap();
    dir
}

#[test]
fn test_platforms_lists_every_rule() {
    sweetener()
        .arg("platforms")
        .assert()
        .success()
        .stdout(predicate::str::contains("Facebook"))
        .stdout(predicate::str::contains("bluesky/"))
        .stdout(predicate::str::contains("max 1080x1920"));
}

#[test]
fn test_example_config_round_trips_through_validation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sweetener.toml");

    sweetener()
        .args(["example-config", "-o"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated example TOML"));

    sweetener()
        .arg("config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file is valid"))
        .stdout(predicate::str::contains("instagram"));
}

#[test]
fn test_example_config_yaml_extension() {
    let dir = TempDir::new().unwrap();

    sweetener()
        .args(["example-config", "--yaml", "-o"])
        .arg(dir.path().join("settings.toml"))
        .assert()
        .success();

    assert!(dir.path().join("settings.yaml").is_file());
}

#[test]
fn test_config_rejects_bad_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "instagram_aspect_ratio = \"tall\"\n").unwrap();

    sweetener()
        .arg("config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_run_writes_platform_outputs() {
    let dir = photo_dir();

    sweetener()
        .arg(dir.path())
        .args(["--platform", "facebook", "--platform", "tiktok", "-Q"])
        .assert()
        .success();

    assert!(dir.path().join("facebook/shot.jpg").is_file());
    assert!(dir.path().join("tiktok/shot.webp").is_file());
    assert!(!dir.path().join("bluesky").exists());
}

#[test]
fn test_json_report() {
    let dir = photo_dir();

    sweetener()
        .arg(dir.path())
        .args(["--platform", "threads", "--json", "-Q"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"platforms\""))
        .stdout(predicate::str::contains("\"action\": \"copied\""));
}

#[test]
fn test_bad_instagram_ratio_fails_before_writing() {
    let dir = photo_dir();

    sweetener()
        .arg(dir.path())
        .args(["--platform", "instagram", "--instagram-ratio", "wide"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Aspect ratio"));

    assert!(!dir.path().join("instagram").exists());
}

#[test]
fn test_dry_run_writes_nothing() {
    let dir = photo_dir();

    sweetener()
        .arg(dir.path())
        .args(["--all-platforms", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bluesky"))
        .stdout(predicate::str::contains("shot.webp"));

    assert!(!dir.path().join("facebook").exists());
}

#[test]
fn test_save_config_persists_overrides() {
    let dir = photo_dir();
    let config = dir.path().join("settings").with_extension("json");

    sweetener()
        .arg(dir.path())
        .args(["--platform", "twitter", "-Q", "--save-config", "--config"])
        .arg(&config)
        .assert()
        .success();

    let saved = image_sweetener::Config::from_file(&config).unwrap();
    assert!(saved.platforms.twitter);
    assert_eq!(saved.target_dir.as_deref(), Some(dir.path()));
}

#[test]
fn test_nothing_enabled_is_an_error() {
    let dir = photo_dir();

    sweetener()
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to do"));
}
