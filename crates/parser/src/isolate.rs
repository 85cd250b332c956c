use scraper::{ElementRef, Html, Selector};

/// Structural elements that never carry legal content.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript", "svg", "iframe", "form",
    "button", "select", "option", "template", "canvas",
];

/// Class/id fragments of boilerplate regions (cookie walls, menus, ...).
const BOILERPLATE_HINTS: &[&str] = &[
    "cookie",
    "consent",
    "banner",
    "menu",
    "navigation",
    "navbar",
    "breadcrumb",
    "sidebar",
    "social",
    "newsletter",
    "popup",
    "modal",
    "share",
];

/// Elements that start a new logical line in the output.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "td", "table",
    "section", "article", "address", "blockquote", "dt", "dd", "hr",
];

/// Content containers tried in order; the first one with substantial text
/// wins, otherwise the whole body is used.
const CONTENT_SELECTORS: &[&str] = &["main", "article", "[role='main']", "#content", ".content"];

const CONTENT_MIN_CHARS: usize = 200;

fn is_boilerplate(el: &ElementRef) -> bool {
    let value = el.value();
    let hit = |attr: Option<&str>| {
        attr.map(|v| {
            let v = v.to_lowercase();
            BOILERPLATE_HINTS.iter().any(|hint| v.contains(hint))
        })
        .unwrap_or(false)
    };
    hit(value.attr("class")) || hit(value.attr("id"))
}

fn collect(el: ElementRef, out: &mut String) {
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if SKIP_TAGS.contains(&name) || is_boilerplate(&child_el) {
                continue;
            }
            let block = BLOCK_TAGS.contains(&name);
            if block {
                out.push('\n');
            }
            collect(child_el, out);
            if block {
                out.push('\n');
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}

/// Collapse intra-line whitespace and runs of blank lines, keeping one
/// blank line between logical blocks. Downstream patterns are
/// line-sensitive, so this is the contract of the isolator.
fn normalize_lines(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_pending = false;
    for line in raw.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            if !lines.is_empty() {
                blank_pending = true;
            }
            continue;
        }
        if blank_pending {
            lines.push(String::new());
            blank_pending = false;
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Plain-text body of a legal page, boilerplate removed, line breaks
/// preserved.
pub fn isolate_legal_text(html: &str) -> String {
    let document = Html::parse_document(html);

    for sel in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        if let Some(region) = document.select(&selector).next() {
            let mut out = String::new();
            collect(region, &mut out);
            let text = normalize_lines(&out);
            if text.len() >= CONTENT_MIN_CHARS {
                return text;
            }
        }
    }

    let body = Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next());
    let mut out = String::new();
    match body {
        Some(body) => collect(body, &mut out),
        None => collect(document.root_element(), &mut out),
    }
    normalize_lines(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_nav_and_cookie_banner() {
        let html = r#"<html><body>
            <nav><a href="/">Home</a><a href="/shop">Shop</a></nav>
            <div class="cookie-consent">Wir verwenden Cookies.</div>
            <div>
              <h1>Impressum</h1>
              <p>Beispiel GmbH</p>
            </div>
            <footer>© 2024 Beispiel GmbH</footer>
        </body></html>"#;
        let text = isolate_legal_text(html);
        assert!(text.contains("Impressum"));
        assert!(text.contains("Beispiel GmbH"));
        assert!(!text.contains("Shop"));
        assert!(!text.contains("Cookies"));
        assert!(!text.contains("©"));
    }

    #[test]
    fn test_br_separated_address_keeps_lines() {
        let html = "<body><p>Beispiel GmbH<br>Musterweg 7<br>80333 München</p></body>";
        let text = isolate_legal_text(html);
        let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines, vec!["Beispiel GmbH", "Musterweg 7", "80333 München"]);
    }

    #[test]
    fn test_blank_runs_collapse_to_one() {
        let html = "<body><div><p>Erster Block</p></div><div></div><div></div><div><p>Zweiter Block</p></div></body>";
        let text = isolate_legal_text(html);
        assert!(!text.contains("\n\n\n"));
        assert!(text.contains("Erster Block"));
        assert!(text.contains("Zweiter Block"));
    }

    #[test]
    fn test_prefers_main_region() {
        let filler = "Rechtliche Angaben gemäß §5 TMG und weiteren Vorschriften. ".repeat(5);
        let html = format!(
            r#"<body>
                <div class="sidebar">Werbung hier</div>
                <main><h1>Impressum</h1><p>{filler}</p><p>Beispiel GmbH</p></main>
            </body>"#
        );
        let text = isolate_legal_text(&html);
        assert!(text.contains("Beispiel GmbH"));
        assert!(!text.contains("Werbung"));
    }

    #[test]
    fn test_whitespace_collapsed_within_lines() {
        let html = "<body><p>Beispiel    GmbH\t\tBerlin</p></body>";
        assert_eq!(isolate_legal_text(html), "Beispiel GmbH Berlin");
    }
}
