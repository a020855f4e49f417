#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::TempDir;

pub const SYSTEM_VERSION_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>BuildID</key>
	<string>C9A3B1E0-5F0B-11EE-8D3A-6C1A2B3C4D5E</string>
	<key>ProductBuildVersion</key>
	<string>21A329</string>
	<key>ProductCopyright</key>
	<string>1983-2023 Apple Inc.</string>
	<key>ProductName</key>
	<string>iPhone OS</string>
	<key>ProductVersion</key>
	<string>17.0</string>
</dict>
</plist>
"#;

pub const CRASH_IPS: &str = concat!(
    r#"{"app_name":"Maps","bug_type":"309","os_version":"iPhone OS 17.0 (21A329)","timestamp":"2023-10-01 12:00:00.00 +0000"}"#,
    "\n",
    r#"{"procName":"Maps","pid":412,"exception":{"type":"EXC_CRASH","signal":"SIGABRT"},"threads":[{"id":1},{"id":2}]}"#,
);

/// Files of a small sysdiagnose-like bundle, relative to the bundle root.
pub const BUNDLE_FILES: [&str; 7] = [
    "crashes/Maps-2023-10-01-120000.ips",
    "logs/Accessibility/TCC.db",
    "logs/broken/Broken.db",
    "logs/notes.txt",
    "logs/prefs/com.apple.springboard.plist",
    "logs/summary.json",
    "system/SystemVersion.plist",
];

pub fn write_file(root: &Path, relative: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture parent");
    }
    fs::write(&path, bytes).expect("write fixture file");
    path
}

/// TCC-style database with an `access` table and an empty `admin` table.
pub fn write_tcc_db(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture parent");
    }
    let conn = rusqlite::Connection::open(path).expect("create sqlite fixture");
    conn.execute_batch(
        "CREATE TABLE access (service TEXT, client TEXT, auth_value INTEGER, csreq BLOB);
         INSERT INTO access VALUES ('kTCCServiceCamera', 'com.apple.camera', 2, x'FADE');
         INSERT INTO access VALUES ('kTCCServiceMicrophone', 'com.example.app', 0, NULL);
         CREATE TABLE admin (key TEXT, value INTEGER);",
    )
    .expect("populate sqlite fixture");
}

pub fn write_binary_plist(path: &Path) {
    let mut dict = plist::Dictionary::new();
    dict.insert("SBHomeScreenIconRows".into(), plist::Value::Integer(6_i64.into()));
    dict.insert("SBShowBatteryPercentage".into(), plist::Value::Boolean(true));
    dict.insert(
        "SBRecentApps".into(),
        plist::Value::Array(vec!["com.apple.Maps".into(), "com.apple.camera".into()]),
    );
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture parent");
    }
    plist::Value::Dictionary(dict)
        .to_file_binary(path)
        .expect("write binary plist fixture");
}

/// Builds the [`BUNDLE_FILES`] tree under a fresh temp dir.
pub fn sysdiagnose_bundle() -> TempDir {
    let tmp = TempDir::new().expect("create bundle dir");
    let root = tmp.path();
    write_file(root, "system/SystemVersion.plist", SYSTEM_VERSION_XML.as_bytes());
    write_tcc_db(&root.join("logs/Accessibility/TCC.db"));
    write_file(
        root,
        "logs/broken/Broken.db",
        b"SQLite format 3\0this is not a database page at all",
    );
    write_binary_plist(&root.join("logs/prefs/com.apple.springboard.plist"));
    write_file(
        root,
        "logs/summary.json",
        br#"{"device": "iPhone15,2", "uptime": 86400, "tags": ["a", "b"]}"#,
    );
    write_file(root, "logs/notes.txt", b"captured after reboot\n");
    write_file(root, "crashes/Maps-2023-10-01-120000.ips", CRASH_IPS.as_bytes());
    tmp
}

#[cfg(feature = "archives")]
pub fn zip_tree(root: &Path, dest: &Path) {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let file = fs::File::create(dest).expect("create zip fixture");
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for relative in BUNDLE_FILES {
        writer
            .start_file(relative, options)
            .expect("start zip member");
        writer
            .write_all(&fs::read(root.join(relative)).expect("read bundle file"))
            .expect("write zip member");
    }
    writer.finish().expect("finish zip fixture");
}

#[cfg(feature = "archives")]
pub fn tar_gz_tree(root: &Path, dest: &Path) {
    let file = fs::File::create(dest).expect("create tar.gz fixture");
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for relative in BUNDLE_FILES {
        builder
            .append_path_with_name(root.join(relative), relative)
            .expect("append tar member");
    }
    builder
        .into_inner()
        .expect("finish tar stream")
        .finish()
        .expect("finish gzip stream");
}

#[cfg(feature = "archives")]
pub fn tar_xz_tree(root: &Path, dest: &Path) {
    let mut builder = tar::Builder::new(Vec::new());
    for relative in BUNDLE_FILES {
        builder
            .append_path_with_name(root.join(relative), relative)
            .expect("append tar member");
    }
    let tar = builder.into_inner().expect("finish tar stream");
    let mut xz = Vec::new();
    lzma_rs::xz_compress(&mut tar.as_slice(), &mut xz).expect("compress xz fixture");
    fs::write(dest, xz).expect("write tar.xz fixture");
}

/// Tar members given as `(path, bytes)`, in order.
#[cfg(feature = "archives")]
pub fn tar_bytes(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, bytes) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, name, *bytes)
            .expect("append tar member");
    }
    builder.into_inner().expect("finish tar stream")
}

#[cfg(feature = "archives")]
pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    use std::io::Write;

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes).expect("gzip fixture");
    encoder.finish().expect("finish gzip fixture")
}

/// Bytes that do not compress, so truncating the stream cuts into them.
pub fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x9E37_79B9;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state.to_le_bytes()[0]
        })
        .collect()
}

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_artiscan") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) {
        "artiscan.exe"
    } else {
        "artiscan"
    };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve artiscan binary path for integration test"),
    }
}

/// Runs the CLI with a config home that holds no config file, logging the
/// exchange to a temp file for post-mortem.
pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("artiscan-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");
    let home = TempDir::new().expect("create isolated HOME");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("HOME", home.path())
        .env("RUST_BACKTRACE", "1")
        .env_remove("RUST_LOG")
        .env_remove("ARTISCAN_OUTPUT_FORMAT")
        .env_remove("ARTISCAN_VERBOSE")
        .env_remove("ARTISCAN_CASE_SENSITIVE")
        .env_remove("ARTISCAN_SNIFF_WINDOW")
        .env_remove("ARTISCAN_MAX_ITEM_ERRORS")
        .env_remove("ARTISCAN_SQLITE_ROW_LIMIT")
        .output()
        .expect("execute artiscan command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Non-empty stdout lines parsed as JSON.
pub fn json_lines(stdout: &str) -> Vec<serde_json::Value> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line is JSON"))
        .collect()
}
