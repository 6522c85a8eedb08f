use predicates::str::contains;
use serde_json::{Value, json};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

const THUMB_DIR: &str = "images/paintings/thumbnails";

struct Site {
    tmp: TempDir,
}

impl Site {
    fn new(catalog: Value) -> Self {
        let tmp = tempdir().expect("tempdir");
        let site = tmp.path().join("site");
        fs::create_dir_all(site.join("data")).expect("mkdir data");
        fs::create_dir_all(site.join(THUMB_DIR)).expect("mkdir thumbnails");
        fs::create_dir_all(site.join("images/paintings/large")).expect("mkdir large");
        fs::write(
            site.join("data/artworks.json"),
            serde_json::to_vec_pretty(&catalog).expect("catalog json"),
        )
        .expect("write catalog");
        Self { tmp }
    }

    fn root(&self) -> PathBuf {
        self.tmp.path().join("site")
    }

    fn home(&self) -> PathBuf {
        self.tmp.path().join("folio-home")
    }

    fn put_png(&self, rel: &str, width: u32, height: u32) {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([140, 90, 60]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        fs::write(self.root().join(rel), bytes).expect("write png");
    }

    fn catalog(&self) -> Vec<Value> {
        let raw = fs::read(self.root().join("data/artworks.json")).expect("read catalog");
        serde_json::from_slice(&raw).expect("catalog array")
    }

    fn folio(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("folio");
        cmd.current_dir(self.tmp.path())
            .env_remove("FOLIO_CONFIG_PATH")
            .env_remove("FOLIO_GITHUB_TOKEN")
            .env_remove("FOLIO_STATE_DIR")
            .env_remove("FOLIO_LOGS_DIR")
            .env_remove("FOLIO_REPORTS_DIR")
            .env("FOLIO_HOME", self.home())
            .env("FOLIO_STORE_BACKEND", "local")
            .env("FOLIO_LOCAL_ROOT", self.root())
            .env("FOLIO_LOG", "warn");
        cmd
    }
}

fn exists(root: &Path, rel: &str) -> bool {
    root.join(rel).exists()
}

fn sample_site() -> Site {
    let site = Site::new(json!([
        {"id": "b", "title": "Blue Hour", "year": "2021", "medium": "oil"},
        {"id": "a", "title": "Amber", "year": 2020},
        {"id": "", "title": "Nameless"}
    ]));
    site.put_png("images/paintings/thumbnails/a_thumb.png", 300, 200);
    site
}

#[test]
fn reorganize_rekeys_catalog_and_moves_images() {
    let site = sample_site();
    let report_path = site.tmp.path().join("run-report.json");

    site.folio()
        .args(["reorganize", "--yes", "--report"])
        .arg(&report_path)
        .assert()
        .success()
        .stdout(contains("reorganize: ok"))
        .stdout(contains("Reorganization complete!"))
        .stdout(contains("processed=3"))
        .stdout(contains("deleted=1"))
        .stdout(contains("renamed a -> 2020_001"));

    let catalog = site.catalog();
    let ids: Vec<&str> = catalog.iter().filter_map(|a| a["id"].as_str()).collect();
    assert_eq!(ids, vec!["2020_001", "2021_001", "unknown_001"]);
    assert_eq!(catalog[0]["image"], "images/paintings/thumbnails/2020_001_thumb.png");
    assert_eq!(catalog[0]["imageHigh"], "");
    assert_eq!(catalog[1]["medium"], "oil");
    assert_eq!(catalog[1]["image"], "");

    let root = site.root();
    assert!(exists(&root, "images/paintings/thumbnails/2020_001_thumb.png"));
    assert!(!exists(&root, "images/paintings/thumbnails/a_thumb.png"));

    let report: Value =
        serde_json::from_str(&fs::read_to_string(&report_path).expect("report")).expect("json");
    assert_eq!(report["outcome"], "completed");
    assert_eq!(report["flags"].as_array().map(Vec::len), Some(3));
    assert!(report["catalog_backup"].is_string());
    assert!(!site.home().join("state/checkpoint.jsonl").exists());
}

#[test]
fn dry_run_leaves_the_site_untouched() {
    let site = sample_site();
    let before = fs::read(site.root().join("data/artworks.json")).expect("read");

    site.folio()
        .args(["reorganize", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("dry_run=true"));

    let after = fs::read(site.root().join("data/artworks.json")).expect("read");
    assert_eq!(before, after);
    let root = site.root();
    assert!(exists(&root, "images/paintings/thumbnails/a_thumb.png"));
    assert!(!exists(&root, "images/paintings/thumbnails/2020_001_thumb.png"));
}

#[test]
fn reorganize_without_terminal_needs_yes() {
    let site = sample_site();
    site.folio()
        .arg("reorganize")
        .assert()
        .failure()
        .stdout(contains("pass --yes"));
    assert!(exists(&site.root(), "images/paintings/thumbnails/a_thumb.png"));
}

#[test]
fn empty_catalog_fails_with_code() {
    let site = Site::new(json!([]));
    site.folio()
        .args(["reorganize", "--yes"])
        .assert()
        .failure()
        .stdout(contains("E003_EMPTY_CATALOG"));
}

#[test]
fn invalid_config_is_reported_with_code() {
    let site = sample_site();
    site.folio()
        .env_remove("FOLIO_LOCAL_ROOT")
        .args(["reorganize", "--yes"])
        .assert()
        .failure()
        .stdout(contains("E005_CONFIG_INVALID"));
}

#[test]
fn plan_reads_a_local_catalog_file() {
    let site = sample_site();
    site.folio()
        .args(["plan", "--catalog"])
        .arg(site.root().join("data/artworks.json"))
        .assert()
        .success()
        .stdout(contains("artworks=3"))
        .stdout(contains("a -> 2020_001 (Amber)"))
        .stdout(contains("(none) -> unknown_001 (Nameless)"));
}

#[test]
fn verify_fails_before_and_passes_after_reorganize() {
    let site = sample_site();
    site.folio()
        .arg("verify")
        .assert()
        .failure()
        .stdout(contains("is not a sequential id"));

    site.folio().args(["reorganize", "--yes"]).assert().success();

    site.folio()
        .args(["verify", "--strict"])
        .assert()
        .success()
        .stdout(contains("images_checked=1"));
}

#[test]
fn status_and_cancel_when_idle() {
    let site = sample_site();
    site.folio()
        .arg("status")
        .assert()
        .success()
        .stdout(contains("store_backend=local"))
        .stdout(contains("run=idle"))
        .stdout(contains("checkpoint=none"));

    site.folio()
        .arg("cancel")
        .assert()
        .success()
        .stdout(contains("no reorganization running"));
}

#[test]
fn json_flag_renders_the_command_report() {
    let site = sample_site();
    let output = site
        .folio()
        .args(["--json", "reorganize", "--yes"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&output).expect("json report");
    assert_eq!(report["command"], "reorganize");
    assert_eq!(report["ok"], true);
    assert!(report["issues"].as_array().is_some_and(Vec::is_empty));
}

#[test]
fn prune_lists_then_removes_orphaned_images() {
    let site = sample_site();
    site.folio().args(["reorganize", "--yes"]).assert().success();
    site.put_png("images/paintings/thumbnails/2019_007_thumb.png", 40, 30);
    site.put_png("images/paintings/large/2019_007_large.png", 40, 30);
    site.put_png("images/paintings/thumbnails/banner.png", 40, 30);
    let root = site.root();

    site.folio()
        .args(["verify", "--strict"])
        .assert()
        .success()
        .stdout(contains("orphans=2"))
        .stdout(contains("orphan images/paintings/thumbnails/2019_007_thumb.png"));

    site.folio()
        .arg("prune")
        .assert()
        .success()
        .stdout(contains("images_scanned=4"))
        .stdout(contains("skipped images/paintings/thumbnails/banner.png"))
        .stdout(contains("pass --execute"));
    assert!(exists(&root, "images/paintings/thumbnails/2019_007_thumb.png"));

    site.folio()
        .args(["prune", "--execute"])
        .assert()
        .failure()
        .stdout(contains("pass --yes"));
    assert!(exists(&root, "images/paintings/large/2019_007_large.png"));

    site.folio()
        .args(["prune", "--execute", "--yes"])
        .assert()
        .success()
        .stdout(contains("deleted=2"));
    assert!(!exists(&root, "images/paintings/thumbnails/2019_007_thumb.png"));
    assert!(!exists(&root, "images/paintings/large/2019_007_large.png"));
    assert!(exists(&root, "images/paintings/thumbnails/banner.png"));
    assert!(exists(&root, "images/paintings/thumbnails/2020_001_thumb.png"));
}
