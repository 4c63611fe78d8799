//! Stateless favicon API providers.

use super::Provider;

/// Favicon URL for a domain.
pub(super) fn url(provider: Provider, domain: &str) -> Option<String> {
    let url = match provider {
        Provider::DuckDuckGo => format!("https://icons.duckduckgo.com/ip3/{domain}.ico"),
        Provider::Google => format!("https://www.google.com/s2/favicons?domain={domain}"),
        Provider::IconHorse => format!("https://icon.horse/icon/{domain}"),
        Provider::Splitbee => format!("https://favicon.splitbee.io/?url={domain}"),
        _ => return None,
    };
    Some(url)
}
