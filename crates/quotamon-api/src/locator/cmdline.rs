// ── Peer command-line grammar ──
//
// Binary naming per target, ownership disambiguation, and extraction of
// the CSRF token and advertised port from a language-server invocation.

use std::sync::LazyLock;

use regex::Regex;

/// `--csrf_token <hex/uuid>` or `--csrf_token=<hex/uuid>`.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"--csrf_token(?:=|\s+)([0-9A-Fa-f][0-9A-Fa-f-]{7,})").expect("valid token regex")
});

/// `--extension_server_port <n>` or `--extension_server_port=<n>`.
static PORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"--extension_server_port(?:=|\s+)(\d{1,5})\b")
        .expect("valid port regex")
});

/// `--app_data_dir antigravity`, either spelling, optionally quoted.
static APP_DATA_DIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)--app_data_dir(?:=|\s+)["']?antigravity\b"#)
        .expect("valid app_data_dir regex")
});

/// A path segment naming the product (`.../Antigravity.app/...`,
/// `...\antigravity\...`).
static PATH_SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[/\\]\.?antigravity(?:\.app)?[/\\]")
        .expect("valid path segment regex")
});

/// Language-server executable name for an OS/architecture pair, using the
/// values of `std::env::consts::{OS, ARCH}`.
pub fn binary_name(os: &str, arch: &str) -> Option<&'static str> {
    match (os, arch) {
        ("windows", "x86_64") => Some("language_server_windows_x64.exe"),
        ("windows", "aarch64") => Some("language_server_windows_arm64.exe"),
        ("macos", "aarch64") => Some("language_server_macos_arm"),
        ("macos", "x86_64") => Some("language_server_macos"),
        ("linux", "x86_64") => Some("language_server_linux_x64"),
        ("linux", "aarch64") => Some("language_server_linux_arm"),
        _ => None,
    }
}

/// Binary name for the running target.
pub fn current_binary_name() -> Option<&'static str> {
    binary_name(std::env::consts::OS, std::env::consts::ARCH)
}

/// Whether a process name matches the expected binary. Windows reports
/// names case-insensitively and sometimes without the extension.
pub fn matches_binary(process_name: &str, binary: &str) -> bool {
    if process_name.eq_ignore_ascii_case(binary) {
        return true;
    }
    binary
        .strip_suffix(".exe")
        .is_some_and(|stem| process_name.eq_ignore_ascii_case(stem))
}

/// Final path component of an executable path, either separator style.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// The same binary ships with other IDEs; only invocations carrying our
/// product marker are accepted.
pub fn is_owned_command_line(command_line: &str) -> bool {
    APP_DATA_DIR_RE.is_match(command_line) || PATH_SEGMENT_RE.is_match(command_line)
}

/// Extract the CSRF token.
pub fn extract_token(command_line: &str) -> Option<&str> {
    TOKEN_RE
        .captures(command_line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Extract the advertised extension-server port, if present and valid.
pub fn extract_advertised_port(command_line: &str) -> Option<u16> {
    PORT_RE
        .captures(command_line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .filter(|p| *p != 0)
}
