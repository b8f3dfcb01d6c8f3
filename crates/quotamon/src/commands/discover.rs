//! `discover`: run the locator alone and show what it found.

use serde::Serialize;

use quotamon_api::{LocalPeerLocator, PeerConnection, PeerLocator};
use quotamon_core::{CoreError, EngineSettings};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "[redacted]";

#[derive(Debug, Serialize)]
struct DiscoveryView {
    pid: u32,
    advertised_port: Option<u16>,
    port: u16,
    token: &'static str,
}

impl From<&PeerConnection> for DiscoveryView {
    fn from(conn: &PeerConnection) -> Self {
        Self {
            pid: conn.pid,
            advertised_port: conn.advertised_port,
            port: conn.port,
            token: REDACTED,
        }
    }
}

fn detail(view: &DiscoveryView) -> String {
    let advertised = view
        .advertised_port
        .map_or_else(|| "-".to_owned(), |p| p.to_string());
    [
        "Language server".to_owned(),
        format!("  PID              {}", view.pid),
        format!("  Advertised port  {advertised}"),
        format!("  Working port     {}", view.port),
        format!("  CSRF token       {}", view.token),
    ]
    .join("\n")
}

pub async fn handle(settings: &EngineSettings, global: &GlobalOpts) -> Result<(), CliError> {
    let locator =
        LocalPeerLocator::for_current_platform(settings.probe_timeout).map_err(CoreError::from)?;
    let connection = locator.discover().await.map_err(CoreError::from)?;

    let view = DiscoveryView::from(&connection);
    let out = output::render_single(global.output, &view, detail, |v| {
        format!("{}\t{}", v.pid, v.port)
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
