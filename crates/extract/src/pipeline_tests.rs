//! Page-to-record tests across the parser and the extraction passes.

use legalscout_core::{Country, Extraction, FieldSource};
use legalscout_parser as parser;

use crate::{assemble, domain_label, AssembleContext, Extractor, Validator};

fn ctx<'a>(domain: &'a str, url: &'a str, from_archive: bool) -> AssembleContext<'a> {
    AssembleContext {
        domain,
        legal_source_url: url,
        run_id: "run-test",
        from_archive,
        robots_allowed: true,
        robots_reason: None,
    }
}

async fn extract_from_html(
    html: &str,
    domain: &str,
    url: &str,
    from_archive: bool,
) -> (bool, legalscout_core::CrawlResult, Country) {
    let text = parser::isolate_legal_text(html);
    let mut passes: Vec<Extraction> = Vec::new();
    if let Some(structured) = parser::extract_structured(html) {
        passes.push(structured);
    }
    let extractor = Extractor::new(Vec::new());
    let (country, pattern_passes) = extractor.run_passes(&text, domain);
    passes.extend(pattern_passes);

    let mut result = assemble(&passes, &ctx(domain, url, from_archive));
    let validator = Validator::new(false);
    let label = domain_label(domain);
    let valid = validator.validate(&mut result, country, &label, None).await;
    (valid, result, country)
}

#[tokio::test]
async fn test_structured_data_happy_path() {
    let html = r#"<html><head>
    <script type="application/ld+json">
    {
        "@context": "https://schema.org",
        "@type": "Organization",
        "legalName": "Example GmbH",
        "telephone": "+49 30 901820",
        "address": {
            "@type": "PostalAddress",
            "streetAddress": "Musterstr. 1",
            "postalCode": "10115",
            "addressLocality": "Berlin",
            "addressCountry": "DE"
        }
    }
    </script></head>
    <body><main><h1>Impressum</h1>
    <p>Example GmbH<br>Musterstr. 1<br>10115 Berlin</p>
    </main></body></html>"#;

    let (valid, result, country) =
        extract_from_html(html, "example.de", "https://example.de/impressum", false).await;

    assert!(valid);
    assert_eq!(country, Country::Germany);
    let name = result.legal_name.as_ref().unwrap();
    assert_eq!(name.value, "Example GmbH");
    assert_eq!(name.source, FieldSource::Structured);
    assert!((name.confidence - 1.0).abs() < 1e-9);
    assert_eq!(result.street.as_ref().unwrap().value, "Musterstr. 1");
    assert_eq!(result.postal_code.as_ref().unwrap().value, "10115");
    assert_eq!(result.city.as_ref().unwrap().value, "Berlin");
    assert_eq!(result.country.as_ref().unwrap().value, "Germany");
    let phones = result.phones.as_ref().unwrap();
    assert_eq!(phones.source, FieldSource::Structured);
    assert!(phones.value.iter().next().unwrap().starts_with("+49"));
}

#[tokio::test]
async fn test_anchor_and_expand_without_structured_data() {
    let html = r#"<html><body>
    <nav><a href="/">Home</a></nav>
    <main>
      <h1>Impressum</h1>
      <p>Beispiel GmbH<br>Musterweg 7<br>80333 München</p>
      <p>Geschäftsführer: Max Mustermann</p>
      <p>HRB 12345 Amtsgericht München</p>
      <p>Angaben gemäß §5 TMG. Verantwortlich für den Inhalt dieser Seiten ist die unten genannte Gesellschaft.</p>
    </main>
    </body></html>"#;

    let (valid, result, country) =
        extract_from_html(html, "beispiel.de", "https://beispiel.de/impressum", false).await;

    assert!(valid);
    assert_eq!(country, Country::Germany);
    let name = result.legal_name.as_ref().unwrap();
    assert_eq!(name.value, "Beispiel GmbH");
    assert_eq!(name.source, FieldSource::Pattern);
    assert!((name.confidence - 0.8).abs() < 1e-9);
    assert_eq!(result.legal_form.as_ref().unwrap().value, "GmbH");
    assert_eq!(result.street.as_ref().unwrap().value, "Musterweg 7");
    assert_eq!(result.postal_code.as_ref().unwrap().value, "80333");
    assert_eq!(result.city.as_ref().unwrap().value, "München");
    assert_eq!(result.registration_number.as_ref().unwrap().value, "HRB 12345");
    assert_eq!(
        result.register_court.as_ref().unwrap().value,
        "Amtsgericht München"
    );
    assert_eq!(result.ceo.as_ref().unwrap().value, "Max Mustermann");
}

#[tokio::test]
async fn test_archive_fallback_reduces_confidence() {
    let html = r#"<body><main>
      <p>Beispiel GmbH<br>Musterweg 7<br>80333 München</p>
      <p>Dieser Auszug stammt aus der Anbieterkennzeichnung der Gesellschaft und enthält die Pflichtangaben.</p>
    </main></body>"#;

    let (valid, result, _) =
        extract_from_html(html, "beispiel.de", "https://beispiel.de/impressum", true).await;

    assert!(valid);
    let name = result.legal_name.as_ref().unwrap();
    assert!((name.confidence - 0.8 * 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn test_navigation_garbage_yields_no_name() {
    let html = r#"<body><main>
      <p>Kontakt · Menü · Warenkorb (0)</p>
      <p>Hauptstraße 5<br>10115 Berlin</p>
    </main></body>"#;

    let (valid, result, _) =
        extract_from_html(html, "shopxyz.de", "https://shopxyz.de/impressum", false).await;

    assert!(!valid);
    assert!(result.legal_name.is_none());
    // Address fields survive even when the record fails as a whole.
    assert_eq!(result.postal_code.as_ref().unwrap().value, "10115");
}

#[tokio::test]
async fn test_structured_beats_pattern_on_conflict() {
    let html = r#"<html><head>
    <script type="application/ld+json">
    {"@type": "Organization", "legalName": "Beispiel Holding GmbH"}
    </script></head>
    <body><main>
      <p>Beispiel GmbH<br>Musterweg 7<br>80333 München</p>
      <p>Diese Seite enthält die gesetzlich vorgeschriebene Anbieterkennzeichnung der Gesellschaft.</p>
    </main></body></html>"#;

    let (valid, result, _) =
        extract_from_html(html, "beispiel.de", "https://beispiel.de/impressum", false).await;

    assert!(valid);
    let name = result.legal_name.as_ref().unwrap();
    assert_eq!(name.value, "Beispiel Holding GmbH");
    assert_eq!(name.source, FieldSource::Structured);
    // The street never appeared in the structured node, so the pattern pass
    // fills it in.
    assert_eq!(result.street.as_ref().unwrap().source, FieldSource::Pattern);
}
