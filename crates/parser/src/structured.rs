use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use legalscout_core::{Country, Extraction, FieldSource};

const ORG_TYPES: &[&str] = &["Organization", "Corporation", "LocalBusiness"];

fn type_matches(node: &Value) -> bool {
    match node.get("@type") {
        Some(Value::String(t)) => ORG_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(|t| t.as_str())
            .any(|t| ORG_TYPES.contains(&t)),
        _ => false,
    }
}

/// Collect organisation nodes from a JSON-LD document, including nodes
/// nested in `@graph` and top-level arrays.
fn collect_org_nodes<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if type_matches(value) {
                out.push(value);
            }
            if let Some(graph) = map.get("@graph") {
                collect_org_nodes(graph, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_org_nodes(item, out);
            }
        }
        _ => {}
    }
}

fn str_field(node: &Value, key: &str) -> Option<String> {
    match node.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn str_values(node: &Value, key: &str) -> Vec<String> {
    match node.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn clean_email(raw: &str) -> String {
    raw.trim().trim_start_matches("mailto:").to_string()
}

fn address_nodes(node: &Value) -> Vec<&Value> {
    match node.get("address") {
        Some(addr @ Value::Object(_)) => vec![addr],
        Some(Value::Array(items)) => items.iter().filter(|v| v.is_object()).collect(),
        _ => Vec::new(),
    }
}

fn contact_points(node: &Value) -> Vec<&Value> {
    match node.get("contactPoint") {
        Some(cp @ Value::Object(_)) => vec![cp],
        Some(Value::Array(items)) => items.iter().filter(|v| v.is_object()).collect(),
        _ => Vec::new(),
    }
}

fn extraction_from_node(node: &Value) -> Extraction {
    let mut out = Extraction::with_source(FieldSource::Structured, 1.0);

    out.legal_name = str_field(node, "legalName").or_else(|| str_field(node, "name"));
    out.vat_id = str_field(node, "vatID").or_else(|| str_field(node, "taxID"));
    out.fax = str_field(node, "faxNumber");

    for addr in address_nodes(node) {
        if out.street.is_none() {
            out.street = str_field(addr, "streetAddress");
        }
        if out.postal_code.is_none() {
            out.postal_code = str_field(addr, "postalCode");
        }
        if out.city.is_none() {
            out.city = str_field(addr, "addressLocality");
        }
        if out.country.is_none() {
            let raw = match addr.get("addressCountry") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Object(map)) => {
                    map.get("name").and_then(|v| v.as_str()).map(str::to_string)
                }
                _ => None,
            };
            out.country = raw
                .map(|c| Country::from_name(&c))
                .filter(|c| *c != Country::Unknown);
        }
    }

    out.emails = str_values(node, "email")
        .iter()
        .map(|e| clean_email(e))
        .collect();
    out.phones = str_values(node, "telephone");

    for cp in contact_points(node) {
        out.emails.extend(str_values(cp, "email").iter().map(|e| clean_email(e)));
        out.phones.extend(str_values(cp, "telephone"));
    }
    out.emails.sort();
    out.emails.dedup();
    out.phones.sort();
    out.phones.dedup();

    out
}

/// Machine-readable annotations from the page. Multiple organisation nodes
/// are resolved by keeping the most populated one.
pub fn extract_structured(html: &str) -> Option<Extraction> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    let mut best: Option<Extraction> = None;
    for script in document.select(&selector) {
        let raw = script.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            debug!("skipping unparseable ld+json block");
            continue;
        };
        let mut nodes = Vec::new();
        collect_org_nodes(&value, &mut nodes);
        for node in nodes {
            let extraction = extraction_from_node(node);
            if extraction.is_empty() {
                continue;
            }
            let better = best
                .as_ref()
                .map(|b| extraction.populated_count() > b.populated_count())
                .unwrap_or(true);
            if better {
                best = Some(extraction);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_organization_annotation() {
        let html = r#"<html><head>
        <script type="application/ld+json">
        {
            "@context": "https://schema.org",
            "@type": "Organization",
            "legalName": "Example GmbH",
            "vatID": "DE123456789",
            "telephone": "+49 30 1234567",
            "address": {
                "@type": "PostalAddress",
                "streetAddress": "Musterstr. 1",
                "postalCode": "10115",
                "addressLocality": "Berlin",
                "addressCountry": "DE"
            }
        }
        </script></head><body></body></html>"#;

        let extraction = extract_structured(html).unwrap();
        assert_eq!(extraction.legal_name.as_deref(), Some("Example GmbH"));
        assert_eq!(extraction.vat_id.as_deref(), Some("DE123456789"));
        assert_eq!(extraction.street.as_deref(), Some("Musterstr. 1"));
        assert_eq!(extraction.postal_code.as_deref(), Some("10115"));
        assert_eq!(extraction.city.as_deref(), Some("Berlin"));
        assert_eq!(extraction.country, Some(Country::Germany));
        assert_eq!(extraction.phones, vec!["+49 30 1234567"]);
        assert_eq!(extraction.source, Some(FieldSource::Structured));
        assert!((extraction.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_graph_wrapper_and_contact_point() {
        let html = r#"<script type="application/ld+json">
        {
            "@graph": [
                {"@type": "WebSite", "name": "irrelevant"},
                {
                    "@type": "LocalBusiness",
                    "name": "Beispiel Bäckerei",
                    "contactPoint": [{"@type": "ContactPoint", "email": "mailto:info@beispiel.de", "telephone": "+49 89 555"}]
                }
            ]
        }
        </script>"#;
        let extraction = extract_structured(html).unwrap();
        assert_eq!(extraction.legal_name.as_deref(), Some("Beispiel Bäckerei"));
        assert_eq!(extraction.emails, vec!["info@beispiel.de"]);
        assert_eq!(extraction.phones, vec!["+49 89 555"]);
    }

    #[test]
    fn test_most_populated_node_wins() {
        let html = r#"
        <script type="application/ld+json">
        {"@type": "Organization", "name": "Sparse AG"}
        </script>
        <script type="application/ld+json">
        {"@type": "Organization", "legalName": "Dense GmbH", "vatID": "DE999999999",
         "address": {"streetAddress": "Weg 2", "postalCode": "80333", "addressLocality": "München"}}
        </script>"#;
        let extraction = extract_structured(html).unwrap();
        assert_eq!(extraction.legal_name.as_deref(), Some("Dense GmbH"));
    }

    #[test]
    fn test_no_annotation_is_none() {
        assert!(extract_structured("<html><body><p>Impressum</p></body></html>").is_none());
        let unrelated = r#"<script type="application/ld+json">{"@type": "BreadcrumbList"}</script>"#;
        assert!(extract_structured(unrelated).is_none());
    }
}
