//! Favicon scraped from the domain's home page.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::domain::errors::AvatarError;
use crate::domain::ports::HttpPort;

/// `rel` values, most preferred first.
const ICON_RELS: &[&str] = &[
    "icon",
    "shortcut icon",
    "apple-touch-icon",
    "apple-touch-icon-precomposed",
    "mask-icon",
];

static LINK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<link\b[^>]*>").expect("Invalid regex"));

static REL_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\brel\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("Invalid regex")
});

static HREF_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("Invalid regex")
});

pub(super) async fn favicon_url(
    http: &dyn HttpPort,
    domain: &str,
) -> Result<Option<String>, AvatarError> {
    let response = http
        .get(&format!("https://{domain}"), Some("text/html"))
        .await?;
    if !response.is_success() {
        return Err(AvatarError::network(format!(
            "home page of {domain} returned {}",
            response.status
        )));
    }

    let url = find_favicon_url(&response.text(), domain);
    debug!(domain = %domain, url = ?url, "Scraped favicon link");
    Ok(url)
}

fn attribute(re: &Regex, tag: &str) -> Option<String> {
    let captures = re.captures(tag)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().trim().to_string())
}

/// Finds the preferred icon `<link>` of a page and resolves its `href`
/// against `https://{domain}/`.
#[must_use]
pub fn find_favicon_url(html: &str, domain: &str) -> Option<String> {
    let links: Vec<(String, String)> = LINK_TAG
        .find_iter(html)
        .filter_map(|tag| {
            let rel = attribute(&REL_ATTR, tag.as_str())?.to_lowercase();
            let href = attribute(&HREF_ATTR, tag.as_str())?.replace("&amp;", "&");
            (!href.is_empty() && !href.starts_with("data:")).then_some((rel, href))
        })
        .collect();

    let href = ICON_RELS.iter().find_map(|wanted| {
        links
            .iter()
            .find(|(rel, _)| rel.split_whitespace().collect::<Vec<_>>().join(" ") == *wanted)
            .map(|(_, href)| href.as_str())
    })?;

    Some(absolutize(href, domain))
}

fn absolutize(href: &str, domain: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with('/') {
        format!("https://{domain}{href}")
    } else {
        format!("https://{domain}/{href}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::MockHttp;
    use test_case::test_case;

    #[test_case("https://cdn.example.com/i.png", "https://cdn.example.com/i.png" ; "absolute")]
    #[test_case("//cdn.example.com/i.png", "https://cdn.example.com/i.png" ; "protocol_relative")]
    #[test_case("/static/i.png", "https://example.com/static/i.png" ; "root_relative")]
    #[test_case("i.png", "https://example.com/i.png" ; "relative")]
    fn test_absolutize(href: &str, expected: &str) {
        assert_eq!(absolutize(href, "example.com"), expected);
    }

    #[test]
    fn test_prefers_icon_over_apple_touch() {
        let html = r#"
            <html><head>
            <link rel="apple-touch-icon" href="/apple.png">
            <link href="/favicon.svg" rel="icon" type="image/svg+xml">
            </head></html>
        "#;
        assert_eq!(
            find_favicon_url(html, "example.com").as_deref(),
            Some("https://example.com/favicon.svg")
        );
    }

    #[test]
    fn test_shortcut_icon_single_quotes() {
        let html = "<LINK REL='Shortcut Icon' HREF='/favicon.ico?v=2&amp;x=1'>";
        assert_eq!(
            find_favicon_url(html, "example.com").as_deref(),
            Some("https://example.com/favicon.ico?v=2&x=1")
        );
    }

    #[test]
    fn test_mask_icon_last_resort() {
        let html = r#"<link rel="stylesheet" href="/a.css"><link rel="mask-icon" href="mask.svg">"#;
        assert_eq!(
            find_favicon_url(html, "example.com").as_deref(),
            Some("https://example.com/mask.svg")
        );
    }

    #[test]
    fn test_no_icon_link() {
        let html = r#"<link rel="stylesheet" href="/a.css"><link rel="icon" href="">"#;
        assert_eq!(find_favicon_url(html, "example.com"), None);
    }

    #[tokio::test]
    async fn test_fetches_home_page() {
        let http = MockHttp::new();
        http.route(
            "https://bigcorp.com",
            "text/html; charset=utf-8",
            r#"<link rel="icon" href="/favicon.png">"#,
        );

        let url = favicon_url(&http, "bigcorp.com").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://bigcorp.com/favicon.png"));
    }
}
