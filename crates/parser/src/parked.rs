/// Parking-service and for-sale markers. Parking pages are template
/// output, so a substring match against the raw HTML is enough.
const PARKED_MARKERS: &[&str] = &[
    "this domain is for sale",
    "buy this domain",
    "domain is parked",
    "domain parking",
    "parked free",
    "parked by",
    "sedoparking",
    "parkingcrew",
    "hugedomains",
    "diese domain steht zum verkauf",
    "diese domain kaufen",
    "domain zu verkaufen",
    "ce domaine est à vendre",
    "este dominio está en venta",
    "questo dominio è in vendita",
];

pub fn is_parked(html: &str) -> bool {
    let lower = html.to_lowercase();
    PARKED_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sale_banner_detected() {
        let html = "<html><title>example.de</title><body><h1>This domain is for sale!</h1></body></html>";
        assert!(is_parked(html));
    }

    #[test]
    fn test_parking_service_detected() {
        let html = r#"<script src="https://www.sedoparking.com/frmpark.js"></script>"#;
        assert!(is_parked(html));
    }

    #[test]
    fn test_regular_page_not_parked() {
        let html = "<html><body><h1>Beispiel GmbH</h1><p>Willkommen in unserem Online-Shop.</p></body></html>";
        assert!(!is_parked(html));
    }
}
