//! BIMI brand logos, looked up over DNS-over-HTTPS.

use serde::Deserialize;
use tracing::debug;

use crate::domain::errors::AvatarError;
use crate::domain::ports::HttpPort;

const DOH_ENDPOINT: &str = "https://cloudflare-dns.com/dns-query";
const DNS_JSON: &str = "application/dns-json";
const TXT_RECORD: u16 = 16;

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    #[serde(default)]
    data: String,
}

pub(super) async fn logo_url(
    http: &dyn HttpPort,
    domain: &str,
) -> Result<Option<String>, AvatarError> {
    let query = format!("{DOH_ENDPOINT}?name=default._bimi.{domain}&type=TXT");
    let response = http.get(&query, Some(DNS_JSON)).await?;
    if !response.is_success() {
        return Err(AvatarError::network(format!(
            "DNS query for {domain} returned {}",
            response.status
        )));
    }

    let logo = parse_bimi_logo(&response.body)?;
    debug!(domain = %domain, logo = ?logo, "BIMI lookup");
    Ok(logo)
}

/// Extracts the logo URL (`l=` tag) from a DNS JSON answer.
///
/// # Errors
/// Returns error if the body is not DNS JSON.
pub fn parse_bimi_logo(body: &[u8]) -> Result<Option<String>, AvatarError> {
    let response: DohResponse = serde_json::from_slice(body)
        .map_err(|e| AvatarError::parse(format!("invalid DNS JSON: {e}")))?;

    let Some(record) = response
        .answer
        .iter()
        .find(|answer| answer.record_type == TXT_RECORD && answer.data.contains("BIMI"))
    else {
        return Ok(None);
    };

    // long TXT values arrive as several quoted strings
    let record = record.data.replace("\" \"", "").replace('"', "");

    Ok(record
        .split(';')
        .filter_map(|tag| tag.trim().split_once('='))
        .find(|(name, _)| name.trim() == "l")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}
