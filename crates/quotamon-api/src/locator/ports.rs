// Listening-port output parsers.
//
// Each OS query mechanism gets one pure parser so the formats can be
// tested on any host. Parsers are lenient: malformed rows are skipped,
// never reported.

use std::collections::{BTreeSet, HashMap};

/// TCP state code for LISTEN in `/proc/net/tcp{,6}`.
const TCP_LISTEN: u8 = 0x0A;

/// Deduplicate, drop port 0, and sort ascending.
pub fn normalize_ports(ports: impl IntoIterator<Item = u16>) -> Vec<u16> {
    ports
        .into_iter()
        .filter(|p| *p != 0)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Port component of `host:port`, `[v6]:port`, or `*:port`.
fn port_after_colon(addr: &str) -> Option<u16> {
    addr.rsplit_once(':').and_then(|(_, p)| p.parse().ok())
}

/// Port component of BSD-style `host.port` / `*.port`.
fn port_after_dot(addr: &str) -> Option<u16> {
    addr.rsplit_once('.').and_then(|(_, p)| p.parse().ok())
}

// ── Linux ───────────────────────────────────────────────────────────

/// Parse `/proc/<pid>/net/tcp` or `tcp6` into `inode -> port` for rows in
/// LISTEN state.
pub fn parse_proc_net_tcp(content: &str) -> HashMap<u64, u16> {
    let mut listening = HashMap::new();

    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }

        let Ok(state) = u8::from_str_radix(parts[3], 16) else {
            continue;
        };
        if state != TCP_LISTEN {
            continue;
        }

        let Some(port) = parts[1]
            .rsplit_once(':')
            .and_then(|(_, hex)| u16::from_str_radix(hex, 16).ok())
        else {
            continue;
        };
        let Ok(inode) = parts[9].parse::<u64>() else {
            continue;
        };
        if inode != 0 {
            listening.insert(inode, port);
        }
    }

    listening
}

/// Socket inode from an fd link target such as `socket:[12345]`.
pub fn socket_inode(link_target: &str) -> Option<u64> {
    link_target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Parse `ss -tlnp` output, keeping rows owned by `pid`.
pub fn parse_ss(output: &str, pid: u32) -> Vec<u16> {
    let marker = format!("pid={pid},");
    let ports = output
        .lines()
        .filter(|line| line.contains(&marker))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            // State Recv-Q Send-Q Local:Port Peer:Port Process
            fields.get(3).and_then(|addr| port_after_colon(addr))
        });
    normalize_ports(ports)
}

// ── macOS ───────────────────────────────────────────────────────────

/// Parse `lsof -nP -iTCP -sTCP:LISTEN -a -p <pid>` output.
pub fn parse_lsof(output: &str, pid: u32) -> Vec<u16> {
    let pid = pid.to_string();
    let ports = output.lines().skip(1).filter_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.get(1) != Some(&pid.as_str()) || fields.last() != Some(&"(LISTEN)") {
            return None;
        }
        let addr = fields.get(fields.len().checked_sub(2)?)?;
        port_after_colon(addr)
    });
    normalize_ports(ports)
}

/// Parse `netstat -anv -p tcp` output on macOS.
///
/// The pid column moved between releases and is sometimes rendered as
/// `name:pid`, so any column after the state that names the pid counts.
pub fn parse_bsd_netstat(output: &str, pid: u32) -> Vec<u16> {
    let pid_str = pid.to_string();
    let suffix = format!(":{pid}");
    let ports = output.lines().filter_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if !fields.first().is_some_and(|proto| proto.starts_with("tcp")) {
            return None;
        }
        let state_idx = fields.iter().position(|f| *f == "LISTEN")?;
        let owned = fields
            .iter()
            .skip(state_idx + 1)
            .any(|f| *f == pid_str || f.ends_with(&suffix));
        if !owned {
            return None;
        }
        fields.get(3).and_then(|addr| port_after_dot(addr))
    });
    normalize_ports(ports)
}

// ── Windows ─────────────────────────────────────────────────────────

/// Parse PowerShell `Get-NetTCPConnection ... | Select -ExpandProperty
/// LocalPort` output: one port per line.
pub fn parse_powershell_ports(output: &str) -> Vec<u16> {
    normalize_ports(output.lines().filter_map(|line| line.trim().parse().ok()))
}

/// Parse `netstat -ano -p TCP` output, keeping LISTENING rows owned by `pid`.
pub fn parse_windows_netstat(output: &str, pid: u32) -> Vec<u16> {
    let pid = pid.to_string();
    let ports = output.lines().filter_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [proto, local, _foreign, state, owner]
                if proto.eq_ignore_ascii_case("TCP")
                    && state.eq_ignore_ascii_case("LISTENING")
                    && *owner == pid =>
            {
                port_after_colon(local)
            }
            _ => None,
        }
    });
    normalize_ports(ports)
}
