use serde::Deserialize;

use super::error::SourceUnavailable;
use super::types::StartupEntry;

pub const POWERSHELL: &str = "powershell";
pub const SERVICE_QUERY_ARGS: [&str; 4] = [
    "-NoProfile",
    "-NonInteractive",
    "-Command",
    "Get-CimInstance -ClassName Win32_Service | Select-Object Name,DisplayName,State,StartMode | ConvertTo-Json -Compress",
];

#[derive(Debug, Deserialize)]
struct ServiceRow {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "DisplayName", default)]
    display_name: Option<String>,
    #[serde(rename = "State", default)]
    state: Option<String>,
    #[serde(rename = "StartMode", default)]
    start_mode: Option<String>,
}

// ConvertTo-Json emits a bare object when there is exactly one row
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<ServiceRow>),
    One(ServiceRow),
}

fn is_automatic(start_mode: Option<&str>) -> bool {
    matches!(
        start_mode,
        Some(m) if m.eq_ignore_ascii_case("auto") || m.eq_ignore_ascii_case("automatic")
    )
}

/// Parse the JSON service listing, keeping services set to start automatically.
/// `enabled` reflects whether the service is currently running.
pub fn parse_service_listing(output: &str) -> Result<Vec<StartupEntry>, SourceUnavailable> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let rows = match serde_json::from_str::<OneOrMany>(trimmed)
        .map_err(|e| SourceUnavailable::Parse(format!("service listing: {}", e)))?
    {
        OneOrMany::Many(rows) => rows,
        OneOrMany::One(row) => vec![row],
    };

    Ok(rows
        .into_iter()
        .filter(|r| is_automatic(r.start_mode.as_deref()))
        .map(|r| {
            let stopped = r.state.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("stopped"));
            let running = !stopped;
            let display = r
                .display_name
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or(&r.name)
                .to_string();
            StartupEntry::service(&display, &r.name, running)
        })
        .collect())
}
