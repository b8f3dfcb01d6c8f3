//! `status`: one cycle, rendered. Also the renderer `watch` reuses.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use quotamon_core::{
    Aggregator, FetchResult, FetchSource, PeerAccount, QuotaEngine, QuotaGroup, QuotaRecord,
};

use crate::cli::{GlobalOpts, OutputFormat, StatusArgs};
use crate::error::CliError;
use crate::output;

// ── Views ───────────────────────────────────────────────────────────

/// Everything one cycle produced, in the shape structured output uses.
#[derive(Debug, Serialize)]
pub struct StatusReport<'a> {
    pub success: bool,
    pub source: FetchSource,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<&'a PeerAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<QuotaGroup>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<QuotaRecord>>,
}

impl<'a> StatusReport<'a> {
    pub fn new(result: &'a FetchResult, groups: Vec<QuotaGroup>, flat: bool) -> Self {
        let (groups, records) = if flat {
            (None, Some(Aggregator::flatten_groups(&groups)))
        } else {
            (Some(groups), None)
        };
        Self {
            success: result.success,
            source: result.source,
            timestamp: result.timestamp,
            error: result.error.as_deref(),
            account: result.account.as_ref(),
            groups,
            records,
        }
    }
}

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "Pool")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Left")]
    left: String,
    #[tabled(rename = "Resets In")]
    resets: String,
    #[tabled(rename = "Models")]
    models: String,
}

fn group_row(group: &QuotaGroup) -> GroupRow {
    GroupRow {
        name: group.name().to_owned(),
        status: group.status.to_string(),
        left: output::percent(group.percent_remaining),
        resets: group.countdown().unwrap_or_else(|| "-".into()),
        models: group
            .members
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Model")]
    name: String,
    #[tabled(rename = "Pool")]
    pool: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Left")]
    left: String,
    #[tabled(rename = "Resets In")]
    resets: String,
}

fn record_row(record: &QuotaRecord) -> RecordRow {
    RecordRow {
        name: record.name.clone(),
        pool: record.pool_id.clone(),
        status: record.status.to_string(),
        left: output::percent(record.percent_remaining),
        resets: record.countdown().unwrap_or_else(|| "-".into()),
    }
}

// ── Rendering ───────────────────────────────────────────────────────

fn header(report: &StatusReport<'_>) -> String {
    let mut parts = vec!["Antigravity quotas".to_owned()];
    if let Some(account) = report.account {
        let who = account
            .email
            .as_deref()
            .or(account.name.as_deref())
            .unwrap_or("unknown account");
        match account.plan.as_deref() {
            Some(plan) => parts.push(format!("{who} ({plan})")),
            None => parts.push(who.to_owned()),
        }
    }
    parts.push(format!("via {}", report.source));
    parts.push(report.timestamp.format("%H:%M:%S UTC").to_string());
    parts.join(" · ")
}

fn detail(report: &StatusReport<'_>) -> String {
    let body = match (&report.groups, &report.records) {
        (Some(groups), _) if !groups.is_empty() => {
            output::render_list(OutputFormat::Table, groups, group_row, |g| g.pool_id.clone())
        }
        (_, Some(records)) if !records.is_empty() => {
            output::render_list(OutputFormat::Table, records, record_row, |r| r.id.clone())
        }
        _ => "No quota data.".to_owned(),
    };
    format!("{}\n{body}", header(report))
}

fn plain(report: &StatusReport<'_>, color: bool) -> String {
    match (&report.groups, &report.records) {
        (Some(groups), _) => output::render_list(OutputFormat::Plain, groups, group_row, |g| {
            format!(
                "{}\t{}\t{}\t{}",
                g.pool_id,
                output::status_label(g.status, color),
                output::percent(g.percent_remaining),
                g.countdown().unwrap_or_else(|| "-".into()),
            )
        }),
        (_, Some(records)) => {
            output::render_list(OutputFormat::Plain, records, record_row, |r| {
                format!(
                    "{}\t{}\t{}\t{}\t{}",
                    r.name,
                    r.pool_id,
                    output::status_label(r.status, color),
                    output::percent(r.percent_remaining),
                    r.countdown().unwrap_or_else(|| "-".into()),
                )
            })
        }
        (None, None) => String::new(),
    }
}

/// Render one result in the selected output format.
pub fn render(
    engine: &QuotaEngine,
    result: &FetchResult,
    flat: bool,
    global: &GlobalOpts,
) -> String {
    let color = output::should_color(global.color);
    let report = StatusReport::new(result, engine.groups(result), flat);
    output::render_single(global.output, &report, detail, |r| plain(r, color))
}

/// Warn on stderr when the result is a stale fallback.
pub fn report_failure(result: &FetchResult, global: &GlobalOpts) {
    if result.success || global.quiet {
        return;
    }
    if let Some(error) = result.error.as_deref() {
        let color = output::should_color(global.color);
        let message = if result.is_stale() {
            format!("showing cached quotas from an earlier poll: {error}")
        } else {
            error.to_owned()
        };
        eprintln!("{}", output::notice(&message, color));
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: StatusArgs,
    engine: &QuotaEngine,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let result = engine.poll_now().await;

    if !result.success && result.records.is_empty() {
        return Err(CliError::NoQuotaData {
            message: result
                .error
                .clone()
                .unwrap_or_else(|| "no quota source available".into()),
        });
    }

    report_failure(&result, global);
    output::print_output(&render(engine, &result, args.flat, global), global.quiet);
    Ok(())
}
