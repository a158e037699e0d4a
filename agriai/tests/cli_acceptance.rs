use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
    work: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");
        let work = base.join("work");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");
        fs::create_dir_all(&work).expect("failed to create working directory");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
            work,
        }
    }

    /// Point the classifier at a closed local port so every scan falls back
    fn with_unreachable_classifier(self) -> Self {
        let config_dir = self.xdg_config.join("agriai");
        fs::create_dir_all(&config_dir).expect("failed to create config dir");
        fs::write(
            config_dir.join("config.toml"),
            r#"
[classifier]
endpoint = "http://127.0.0.1:9"
api_key = "test-key"
timeout_secs = 5
"#,
        )
        .expect("failed to write config");
        self
    }

    /// Unreachable classifier plus a store too small to hold any scan
    fn with_tiny_store(self) -> Self {
        let env = self.with_unreachable_classifier();
        let config = env.xdg_config.join("agriai/config.toml");
        let mut contents = fs::read_to_string(&config).expect("failed to read config");
        contents.push_str("\n[retention]\nstorage_quota_bytes = 64\n");
        fs::write(&config, contents).expect("failed to write config");
        env
    }

    fn store_path(&self) -> PathBuf {
        self.xdg_data.join("agriai/store.db")
    }

    fn write_image(&self, name: &str) -> PathBuf {
        let path = self.work.join(name);
        fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]).expect("failed to write image");
        path
    }
}

fn command(env: &CliTestEnv, args: &[&str]) -> Command {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("agriai"));
    let mut command = Command::new(bin_path);

    command
        .args(args)
        .current_dir(&env.work)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("GEMINI_API_KEY")
        .env_remove("API_KEY")
        .env_remove("RUST_LOG");
    command
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    command(env, args)
        .stdin(Stdio::null())
        .output()
        .unwrap_or_else(|e| panic!("failed to execute agriai: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "agriai {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn run_ok(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run_bin(env, args);
    assert_success(args, &output);
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn scan(env: &CliTestEnv, image: &Path) -> String {
    let image = image.to_string_lossy().into_owned();
    run_ok(env, &["scan", &image])
}

fn report_ids(env: &CliTestEnv) -> Vec<String> {
    let stdout = run_ok(env, &["reports", "--json"]);
    let reports: Vec<serde_json::Value> =
        serde_json::from_str(&stdout).expect("reports --json should print a JSON array");
    reports
        .iter()
        .map(|r| r["id"].as_str().expect("report id").to_string())
        .collect()
}

#[test]
fn empty_store_lists_nothing() {
    let env = CliTestEnv::new();

    let history = run_ok(&env, &["history"]);
    assert!(history.contains("No scans in history."));

    let reports = run_ok(&env, &["reports"]);
    assert!(reports.contains("No reports yet."));

    let sweep = run_ok(&env, &["sweep"]);
    assert!(sweep.contains("History: 0 removed, 0 remaining"));
    assert!(sweep.contains("Reports: 0 removed, 0 remaining"));

    assert!(env.store_path().exists());
}

#[test]
fn scan_with_unreachable_service_records_fallback() {
    let env = CliTestEnv::new().with_unreachable_classifier();
    let image = env.write_image("leaf.jpg");

    let stdout = scan(&env, &image);
    assert!(
        stdout.contains("Classification:  Unknown (0% confidence)"),
        "expected fallback verdict, got:\n{stdout}"
    );
    assert!(stdout.contains("Check internet connection"));

    let history = run_ok(&env, &["history"]);
    assert!(history.contains("Recent scans (1):"));
    assert!(history.contains("Unknown"));

    let reports = run_ok(&env, &["reports"]);
    assert!(reports.contains("Reports (1):"));
    assert!(reports.contains("Ready"));
}

#[test]
fn history_is_capped_and_reports_are_not() {
    let env = CliTestEnv::new().with_unreachable_classifier();
    let image = env.write_image("field.png");

    for _ in 0..3 {
        scan(&env, &image);
    }

    let history = run_ok(&env, &["history", "--json"]);
    let entries: Vec<serde_json::Value> = serde_json::from_str(&history).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0]["imageData"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    assert_eq!(report_ids(&env).len(), 3);
}

#[test]
fn show_and_export_report_by_short_id() {
    let env = CliTestEnv::new().with_unreachable_classifier();
    let image = env.write_image("plant.webp");
    scan(&env, &image);

    let id = report_ids(&env).remove(0);
    let short_id = &id[id.len() - 6..];

    let shown = run_ok(&env, &["show", short_id]);
    assert!(shown.contains(&format!("# AgriAI Analysis Report #{short_id}")));
    assert!(shown.contains("- **Classification:** Unknown"));

    let out_dir = env.work.join("exports");
    let out = out_dir.to_string_lossy().into_owned();
    let exported = run_ok(&env, &["export", short_id, "--out", &out]);
    assert!(exported.contains("Exported report"));

    let files: Vec<_> = fs::read_dir(&out_dir)
        .expect("export directory should exist")
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with(&format!("AgriAI_Report_{short_id}_")));
    assert!(files[0].ends_with(".md"));
}

#[test]
fn clear_history_requires_confirmation() {
    let env = CliTestEnv::new().with_unreachable_classifier();
    let image = env.write_image("leaf.jpeg");
    scan(&env, &image);

    // No answer on stdin keeps the history
    let declined = run_ok(&env, &["history", "--clear"]);
    assert!(declined.contains("Cancelled."));
    assert!(run_ok(&env, &["history"]).contains("Recent scans (1):"));

    let cleared = run_ok(&env, &["history", "--clear", "--yes"]);
    assert!(cleared.contains("Scan history cleared."));
    assert!(run_ok(&env, &["history"]).contains("No scans in history."));

    // Reports cannot be cleared by hand
    assert_eq!(report_ids(&env).len(), 1);
}

#[test]
fn scan_rejects_missing_and_unsupported_images() {
    let env = CliTestEnv::new().with_unreachable_classifier();

    let missing = env.work.join("missing.jpg");
    let missing = missing.to_string_lossy().into_owned();
    let output = run_bin(&env, &["scan", &missing]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read image"));

    let text = env.work.join("notes.txt");
    fs::write(&text, "not an image").unwrap();
    let text = text.to_string_lossy().into_owned();
    let output = run_bin(&env, &["scan", &text]);
    assert!(!output.status.success());

    assert!(run_ok(&env, &["history"]).contains("No scans in history."));
}

#[test]
fn unknown_report_id_fails() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["show", "123456"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("report not found"));
}

#[test]
fn scan_without_api_key_fails() {
    let env = CliTestEnv::new();
    let image = env.write_image("leaf.jpg");
    let image = image.to_string_lossy().into_owned();

    let output = run_bin(&env, &["scan", &image]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("classifier is not configured"));
}

#[test]
fn watch_stops_after_duration() {
    let env = CliTestEnv::new();

    let stdout = run_ok(&env, &["watch", "--duration", "1"]);
    assert!(stdout.contains("Watching 0 scan(s) and 0 report(s)"));
    assert!(stdout.contains("Stopped watching."));
}

#[test]
fn scan_warns_when_store_is_full() {
    let env = CliTestEnv::new().with_tiny_store();
    let image = env.write_image("leaf.jpg");
    let image = image.to_string_lossy().into_owned();

    let output = run_bin(&env, &["scan", &image]);
    assert_success(&["scan", &image], &output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stdout.contains("saved (expires in"), "stdout:\n{stdout}");
    assert!(stderr.contains("could not be saved"), "stderr:\n{stderr}");

    assert!(run_ok(&env, &["reports"]).contains("No reports yet."));
    assert!(run_ok(&env, &["sweep"]).contains("Store:   0 of 64 bytes used"));
}
