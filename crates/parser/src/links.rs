use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// Anchor-text labels for legal-disclosure pages, by jurisdictional custom.
const LEGAL_LABELS: &[&str] = &[
    "impressum",
    "imprint",
    "mentions légales",
    "mentions legales",
    "aviso legal",
    "note legali",
    "legal notice",
    "legal disclosure",
    "anbieterkennzeichnung",
    "datenschutz",
];

/// The same tokens as they appear in URL paths.
const PATH_TOKENS: &[&str] = &[
    "impressum",
    "imprint",
    "mentions-legales",
    "mentions_legales",
    "mentionslegales",
    "aviso-legal",
    "avisolegal",
    "aviso_legal",
    "note-legali",
    "notelegali",
    "legal-notice",
    "legalnotice",
    "legal_notice",
    "anbieterkennzeichnung",
    "datenschutz",
    "legal",
];

const SCORE_LABEL: u32 = 100;
const SCORE_PATH: u32 = 50;
const SCORE_FOOTER: u32 = 10;

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

fn in_footer(el: ElementRef, index: usize, total: usize) -> bool {
    // Bottom 20% of the anchor sequence approximates the bottom of the DOM.
    if total > 0 && index * 5 >= total * 4 {
        return true;
    }
    el.ancestors().filter_map(ElementRef::wrap).any(|a| {
        let value = a.value();
        if value.name() == "footer" {
            return true;
        }
        let class_or_id = |attr: Option<&str>| {
            attr.map(|v| v.to_lowercase().contains("footer")).unwrap_or(false)
        };
        class_or_id(value.attr("class")) || class_or_id(value.attr("id"))
    })
}

/// Candidate legal-notice URLs from the home-page DOM, best first. Falls
/// back to nothing; the caller uses the home URL itself when this is empty.
pub fn discover_legal_links(html: &str, base: &Url, max: usize) -> Vec<Url> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let anchors: Vec<ElementRef> = document.select(&selector).collect();
    let total = anchors.len();
    let base_host = base.host_str().map(strip_www).unwrap_or("");

    let mut scored: Vec<(u32, usize, usize, Url)> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    for (index, el) in anchors.iter().enumerate() {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if href.starts_with("javascript:") || href.starts_with("mailto:") || href.starts_with('#') {
            continue;
        }
        if el
            .value()
            .attr("rel")
            .map(|r| r.to_lowercase().contains("nofollow"))
            .unwrap_or(false)
        {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        // External hosts are not legal pages of this entity.
        let host = resolved.host_str().map(strip_www).unwrap_or("");
        if host != base_host {
            continue;
        }

        let text = el
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let path = resolved.path().to_lowercase();

        let mut score = 0u32;
        if LEGAL_LABELS.iter().any(|label| text.contains(label)) {
            score += SCORE_LABEL;
        }
        if PATH_TOKENS.iter().any(|token| path.contains(token)) {
            score += SCORE_PATH;
        }
        if score > 0 && in_footer(*el, index, total) {
            score += SCORE_FOOTER;
        }
        if score == 0 {
            continue;
        }

        let mut canonical = resolved.clone();
        canonical.set_fragment(None);
        let key = canonical.to_string();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);

        let depth = canonical.path().trim_matches('/').split('/').count();
        scored.push((score, depth, index, canonical));
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
    debug!(candidates = scored.len(), "legal link candidates scored");

    scored.into_iter().map(|(_, _, _, url)| url).take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.de/").unwrap()
    }

    #[test]
    fn test_footer_impressum_wins() {
        let html = r#"<html><body>
            <nav><a href="/products">Produkte</a></nav>
            <main><a href="/about">Über uns</a></main>
            <footer><a href="/impressum">Impressum</a></footer>
        </body></html>"#;
        let links = discover_legal_links(html, &base(), 3);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].path(), "/impressum");
    }

    #[test]
    fn test_path_token_without_label() {
        let html = r#"<a href="/de/mentions-legales">Informations</a>"#;
        let links = discover_legal_links(html, &base(), 3);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].path(), "/de/mentions-legales");
    }

    #[test]
    fn test_nofollow_and_external_excluded() {
        let html = r#"<body>
            <a href="/impressum" rel="nofollow">Impressum</a>
            <a href="https://other.example.com/imprint">Imprint</a>
        </body>"#;
        let links = discover_legal_links(html, &base(), 3);
        assert!(links.is_empty());
    }

    #[test]
    fn test_label_match_outranks_path_only() {
        let html = r#"<body>
            <a href="/legal/terms">AGB</a>
            <a href="/kontakt/impressum.html">Impressum</a>
        </body>"#;
        let links = discover_legal_links(html, &base(), 3);
        assert_eq!(links[0].path(), "/kontakt/impressum.html");
    }

    #[test]
    fn test_shallower_path_breaks_ties() {
        let html = r#"<body>
            <a href="/de/legal/impressum">Impressum</a>
            <a href="/impressum">Impressum</a>
        </body>"#;
        let links = discover_legal_links(html, &base(), 3);
        assert_eq!(links[0].path(), "/impressum");
    }

    #[test]
    fn test_candidate_cap() {
        let html = r#"<body>
            <a href="/impressum">Impressum</a>
            <a href="/imprint">Imprint</a>
            <a href="/legal-notice">Legal Notice</a>
            <a href="/datenschutz">Datenschutz</a>
        </body>"#;
        let links = discover_legal_links(html, &base(), 3);
        assert_eq!(links.len(), 3);
    }

    #[test]
    fn test_www_host_counts_as_internal() {
        let html = r#"<a href="https://www.example.de/impressum">Impressum</a>"#;
        let links = discover_legal_links(html, &base(), 3);
        assert_eq!(links.len(), 1);
    }
}
