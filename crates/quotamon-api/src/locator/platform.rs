// Per-OS process and port discovery.
//
// One `ProcessPlatform` implementation per supported OS, picked once by
// `detect_platform()`. Process enumeration is shared (sysinfo); port
// enumeration runs a primary query and falls back to a legacy one when
// the primary errors or finds nothing.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, trace};

use super::cmdline::{binary_name, file_name_of, matches_binary};
use super::ports;
use super::{DiscoveryError, PeerProcess};

/// Upper bound for any external port-listing command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// OS capability used by the locator: find candidate peer processes and
/// list the TCP ports a process is listening on.
#[async_trait]
pub trait ProcessPlatform: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Every running process whose executable matches the peer binary
    /// name, sorted by pid. Ownership is not checked here.
    async fn find_peer_processes(&self) -> Result<Vec<PeerProcess>, DiscoveryError>;

    /// Listening TCP ports of `pid`, deduplicated and ascending. May be
    /// empty.
    async fn listening_ports(&self, pid: u32) -> Result<Vec<u16>, DiscoveryError>;
}

/// Select the implementation for the running target.
pub fn detect_platform() -> Result<Box<dyn ProcessPlatform>, DiscoveryError> {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    let unsupported = || DiscoveryError::UnsupportedPlatform {
        os: os.to_owned(),
        arch: arch.to_owned(),
    };
    let binary = binary_name(os, arch).ok_or_else(unsupported)?;

    let platform: Box<dyn ProcessPlatform> = match os {
        "linux" => Box::new(LinuxPlatform::new(binary)),
        "macos" => Box::new(MacPlatform::new(binary)),
        "windows" => Box::new(WindowsPlatform::new(binary)),
        _ => return Err(unsupported()),
    };
    debug!(platform = platform.name(), binary, "selected discovery platform");
    Ok(platform)
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Enumerate processes via sysinfo on a blocking thread.
async fn scan_processes(binary: &'static str) -> Result<Vec<PeerProcess>, DiscoveryError> {
    tokio::task::spawn_blocking(move || scan_processes_blocking(binary))
        .await
        .map_err(|e| DiscoveryError::Command {
            program: "process scan".into(),
            message: e.to_string(),
        })
}

fn scan_processes_blocking(binary: &str) -> Vec<PeerProcess> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );

    let mut found: Vec<PeerProcess> = system
        .processes()
        .values()
        .filter_map(|process| {
            let name = process.name().to_string_lossy().into_owned();
            let args: Vec<String> = process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect();

            // Linux truncates the reported name to 15 bytes; the first
            // argument still carries the full executable path.
            let arg0_matches = args
                .first()
                .is_some_and(|arg0| matches_binary(file_name_of(arg0), binary));
            if !matches_binary(&name, binary) && !arg0_matches {
                return None;
            }

            Some(PeerProcess {
                pid: process.pid().as_u32(),
                name,
                command_line: args.join(" "),
            })
        })
        .collect();

    found.sort_by_key(|p| p.pid);
    trace!(count = found.len(), binary, "process scan complete");
    found
}

/// Run an external command with a timeout and return its stdout.
async fn run_command(program: &str, args: &[&str]) -> Result<String, DiscoveryError> {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    trace!(program, ?args, "running port query");

    let output = tokio::time::timeout(COMMAND_TIMEOUT, cmd.output())
        .await
        .map_err(|_| DiscoveryError::Command {
            program: program.to_owned(),
            message: format!("timed out after {}s", COMMAND_TIMEOUT.as_secs()),
        })?
        .map_err(|e| DiscoveryError::Command {
            program: program.to_owned(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let preview: String = stderr.trim().chars().take(200).collect();
        return Err(DiscoveryError::Command {
            program: program.to_owned(),
            message: format!(
                "exit {}: {preview}",
                output.status.code().map_or_else(|| "signal".into(), |c| c.to_string())
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Await `primary`; if it errors or yields nothing, await `fallback`.
async fn primary_then_fallback<P, F>(
    pid: u32,
    primary: P,
    fallback: F,
) -> Result<Vec<u16>, DiscoveryError>
where
    P: Future<Output = Result<Vec<u16>, DiscoveryError>> + Send,
    F: Future<Output = Result<Vec<u16>, DiscoveryError>> + Send,
{
    match primary.await {
        Ok(found) if !found.is_empty() => return Ok(found),
        Ok(_) => debug!(pid, "primary port query found nothing, trying fallback"),
        Err(e) => debug!(pid, error = %e, "primary port query failed, trying fallback"),
    }
    fallback.await
}

// ── Linux ───────────────────────────────────────────────────────────

/// Linux: `/proc` socket inodes, falling back to `ss`.
#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    binary: &'static str,
    proc_root: PathBuf,
}

impl LinuxPlatform {
    pub fn new(binary: &'static str) -> Self {
        Self::with_proc_root(binary, "/proc")
    }

    /// Read process tables from an alternate root (tests use a tempdir).
    pub fn with_proc_root(binary: &'static str, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            binary,
            proc_root: proc_root.into(),
        }
    }

    async fn proc_ports(&self, pid: u32) -> Result<Vec<u16>, DiscoveryError> {
        let root = self.proc_root.clone();
        tokio::task::spawn_blocking(move || proc_listening_ports(&root, pid))
            .await
            .map_err(|e| DiscoveryError::Command {
                program: "procfs".into(),
                message: e.to_string(),
            })?
    }

    async fn ss_ports(pid: u32) -> Result<Vec<u16>, DiscoveryError> {
        let output = run_command("ss", &["-tlnp"]).await?;
        Ok(ports::parse_ss(&output, pid))
    }
}

/// Match the socket inodes held by `pid` against LISTEN rows of its
/// network namespace's TCP tables.
pub fn proc_listening_ports(proc_root: &Path, pid: u32) -> Result<Vec<u16>, DiscoveryError> {
    let pid_dir = proc_root.join(pid.to_string());

    let mut inodes = HashSet::new();
    for entry in std::fs::read_dir(pid_dir.join("fd"))? {
        let Ok(entry) = entry else { continue };
        // fds close while we iterate; unreadable links are skipped
        if let Ok(target) = std::fs::read_link(entry.path()) {
            if let Some(inode) = ports::socket_inode(&target.to_string_lossy()) {
                inodes.insert(inode);
            }
        }
    }
    if inodes.is_empty() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for table in ["tcp", "tcp6"] {
        match std::fs::read_to_string(pid_dir.join("net").join(table)) {
            Ok(content) => found.extend(
                ports::parse_proc_net_tcp(&content)
                    .into_iter()
                    .filter(|(inode, _)| inodes.contains(inode))
                    .map(|(_, port)| port),
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(ports::normalize_ports(found))
}

#[async_trait]
impl ProcessPlatform for LinuxPlatform {
    fn name(&self) -> &'static str {
        "linux"
    }

    async fn find_peer_processes(&self) -> Result<Vec<PeerProcess>, DiscoveryError> {
        scan_processes(self.binary).await
    }

    async fn listening_ports(&self, pid: u32) -> Result<Vec<u16>, DiscoveryError> {
        primary_then_fallback(pid, self.proc_ports(pid), Self::ss_ports(pid)).await
    }
}

// ── macOS ───────────────────────────────────────────────────────────

/// macOS: `lsof`, falling back to `netstat`.
#[derive(Debug, Clone)]
pub struct MacPlatform {
    binary: &'static str,
}

impl MacPlatform {
    pub fn new(binary: &'static str) -> Self {
        Self { binary }
    }

    async fn lsof_ports(pid: u32) -> Result<Vec<u16>, DiscoveryError> {
        let pid_arg = pid.to_string();
        let output = run_command(
            "lsof",
            &["-nP", "-iTCP", "-sTCP:LISTEN", "-a", "-p", &pid_arg],
        )
        .await?;
        Ok(ports::parse_lsof(&output, pid))
    }

    async fn netstat_ports(pid: u32) -> Result<Vec<u16>, DiscoveryError> {
        let output = run_command("netstat", &["-anv", "-p", "tcp"]).await?;
        Ok(ports::parse_bsd_netstat(&output, pid))
    }
}

#[async_trait]
impl ProcessPlatform for MacPlatform {
    fn name(&self) -> &'static str {
        "macos"
    }

    async fn find_peer_processes(&self) -> Result<Vec<PeerProcess>, DiscoveryError> {
        scan_processes(self.binary).await
    }

    async fn listening_ports(&self, pid: u32) -> Result<Vec<u16>, DiscoveryError> {
        primary_then_fallback(pid, Self::lsof_ports(pid), Self::netstat_ports(pid)).await
    }
}

// ── Windows ─────────────────────────────────────────────────────────

/// Windows: PowerShell `Get-NetTCPConnection`, falling back to `netstat`.
#[derive(Debug, Clone)]
pub struct WindowsPlatform {
    binary: &'static str,
}

impl WindowsPlatform {
    pub fn new(binary: &'static str) -> Self {
        Self { binary }
    }

    async fn powershell_ports(pid: u32) -> Result<Vec<u16>, DiscoveryError> {
        let script = format!(
            "Get-NetTCPConnection -State Listen -OwningProcess {pid} -ErrorAction SilentlyContinue \
             | Select-Object -ExpandProperty LocalPort"
        );
        let output = run_command(
            "powershell",
            &["-NoProfile", "-NonInteractive", "-Command", &script],
        )
        .await?;
        Ok(ports::parse_powershell_ports(&output))
    }

    async fn netstat_ports(pid: u32) -> Result<Vec<u16>, DiscoveryError> {
        let output = run_command("netstat", &["-ano", "-p", "TCP"]).await?;
        Ok(ports::parse_windows_netstat(&output, pid))
    }
}

#[async_trait]
impl ProcessPlatform for WindowsPlatform {
    fn name(&self) -> &'static str {
        "windows"
    }

    async fn find_peer_processes(&self) -> Result<Vec<PeerProcess>, DiscoveryError> {
        scan_processes(self.binary).await
    }

    async fn listening_ports(&self, pid: u32) -> Result<Vec<u16>, DiscoveryError> {
        primary_then_fallback(pid, Self::powershell_ports(pid), Self::netstat_ports(pid)).await
    }
}
