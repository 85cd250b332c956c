use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use legalscout_core::{Country, CrawlResult, Field, MxResolver};

use crate::pattern::domain_similarity;
use crate::profile::{known_forms, profile_for, GENERIC_PROFILE};

static DIGIT_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{5}").unwrap());
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").unwrap()
});
static PERSONAL_EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]+\.[a-z]+@").unwrap());

/// Words that disqualify a value as a name/street (navigation labels).
const LABEL_WORDS: &[&str] = &[
    "kontakt", "anschrift", "adresse", "home", "menu", "menü", "impressum", "imprint", "telefon",
    "contact", "address", "login", "datenschutz", "sitemap",
];

/// Small lexicon of major cities; anything else passes on shape alone.
const KNOWN_CITIES: &[&str] = &[
    "berlin", "hamburg", "münchen", "köln", "frankfurt", "stuttgart", "düsseldorf", "leipzig",
    "dortmund", "essen", "bremen", "dresden", "hannover", "nürnberg", "wien", "graz", "linz",
    "salzburg", "zürich", "genf", "basel", "bern", "london", "manchester", "birmingham", "leeds",
    "glasgow", "paris", "lyon", "marseille", "toulouse", "bordeaux", "roma", "milano", "napoli",
    "torino", "madrid", "barcelona", "valencia", "sevilla",
];

/// Honorifics stripped from person names.
const TITLES: &[&str] = &[
    "Dr.", "Prof.", "Dipl.-Ing.", "Dipl.-Kfm.", "Mag.", "Ing.", "Herr", "Frau", "Mr.", "Mrs.",
    "Ms.", "Sir",
];

fn tokens(value: &str) -> Vec<String> {
    value
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn all_tokens_are_labels(value: &str) -> bool {
    let tokens = tokens(value);
    !tokens.is_empty() && tokens.iter().all(|t| LABEL_WORDS.contains(&t.as_str()))
}

fn phone_region(country: Country) -> Option<phonenumber::country::Id> {
    use phonenumber::country::Id;
    match country {
        Country::Germany => Some(Id::DE),
        Country::Austria => Some(Id::AT),
        Country::Switzerland => Some(Id::CH),
        Country::UnitedKingdom => Some(Id::GB),
        Country::France => Some(Id::FR),
        Country::Italy => Some(Id::IT),
        Country::Spain => Some(Id::ES),
        Country::Unknown => None,
    }
}

pub fn valid_legal_name(name: &str, country: Country, domain_label: &str) -> bool {
    let len = name.chars().count();
    if !(3..=120).contains(&len) {
        return false;
    }
    if DIGIT_RUN_RE.is_match(name) {
        return false;
    }
    if all_tokens_are_labels(name) {
        return false;
    }
    let forms = known_forms(country);
    let has_form = crate::pattern::find_form(name, forms).is_some();
    has_form || domain_similarity(name, domain_label, forms) >= 0.6
}

pub fn valid_legal_form(form: &str, country: Country) -> bool {
    known_forms(country)
        .iter()
        .any(|known| known.eq_ignore_ascii_case(form))
}

pub fn valid_postal_code(code: &str, country: Country) -> bool {
    let profile = profile_for(country).unwrap_or(&GENERIC_PROFILE);
    profile.postal_code.is_match(code.trim())
}

pub fn valid_street(street: &str) -> bool {
    street.chars().any(|c| c.is_ascii_digit()) && !all_tokens_are_labels(street)
}

pub fn valid_city(city: &str) -> bool {
    let city = city.trim();
    if city.chars().count() < 2 || city.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    if all_tokens_are_labels(city) {
        return false;
    }
    if KNOWN_CITIES.contains(&city.to_lowercase().as_str()) {
        return true;
    }
    // Location-shaped: letters, spaces and a few separators only.
    city.chars()
        .all(|c| c.is_alphabetic() || c.is_whitespace() || matches!(c, '.' | '-' | '(' | ')' | '/'))
}

/// Parse, check validity, and normalise to international format.
pub fn normalize_phone(raw: &str, country: Country) -> Option<String> {
    let region = phone_region(country);
    let parsed = phonenumber::parse(region, raw).ok()?;
    if !phonenumber::is_valid(&parsed) {
        return None;
    }
    Some(
        parsed
            .format()
            .mode(phonenumber::Mode::International)
            .to_string(),
    )
}

pub fn valid_email(email: &str, on_legal_page: bool) -> bool {
    if !EMAIL_RE.is_match(email) {
        return false;
    }
    // Personal first.last addresses are skipped off legal pages.
    if !on_legal_page && PERSONAL_EMAIL_RE.is_match(&email.to_lowercase()) {
        return false;
    }
    true
}

fn fr_vat_checksum(vat: &str) -> bool {
    // FRkk SSSSSSSSS with numeric key: key == (12 + 3 * (siren % 97)) % 97.
    let rest = &vat[2..];
    if rest.len() != 11 {
        return true;
    }
    let (key, siren) = rest.split_at(2);
    match (key.parse::<u64>(), siren.parse::<u64>()) {
        (Ok(key), Ok(siren)) => key == (12 + 3 * (siren % 97)) % 97,
        // Alphanumeric keys exist; pattern match is all we can do.
        _ => true,
    }
}

fn it_vat_checksum(digits: &str) -> bool {
    if digits.len() != 11 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let mut sum = 0u32;
    for (i, c) in digits.chars().enumerate() {
        let d = c.to_digit(10).unwrap_or(0);
        if i % 2 == 0 {
            sum += d;
        } else {
            let doubled = d * 2;
            sum += if doubled > 9 { doubled - 9 } else { doubled };
        }
    }
    sum % 10 == 0
}

pub fn valid_vat(vat: &str, country: Country) -> bool {
    let vat = vat.replace([' ', '.'], "");
    let vat = vat.as_str();
    match country {
        Country::Germany => Regex::new(r"^DE\d{9}$").map(|re| re.is_match(vat)).unwrap_or(false),
        Country::Austria => Regex::new(r"^ATU\d{8}$").map(|re| re.is_match(vat)).unwrap_or(false),
        Country::Switzerland => Regex::new(r"^CHE-?\d{9}$")
            .map(|re| re.is_match(vat))
            .unwrap_or(false),
        Country::UnitedKingdom => Regex::new(r"^GB\d{9}(\d{3})?$")
            .map(|re| re.is_match(vat))
            .unwrap_or(false),
        Country::France => {
            Regex::new(r"^FR[0-9A-Z]{2}\d{9}$")
                .map(|re| re.is_match(vat))
                .unwrap_or(false)
                && fr_vat_checksum(vat)
        }
        Country::Italy => {
            let digits = vat.strip_prefix("IT").unwrap_or(vat);
            it_vat_checksum(digits)
        }
        Country::Spain => Regex::new(r"^(ES)?[A-Z]\d{7}[A-Z0-9]$")
            .map(|re| re.is_match(vat))
            .unwrap_or(false),
        Country::Unknown => Regex::new(r"^[A-Z]{2}[0-9A-Z]{8,12}$")
            .map(|re| re.is_match(vat))
            .unwrap_or(false),
    }
}

pub fn valid_registration_number(number: &str, country: Country) -> bool {
    let number = number.trim();
    match country {
        Country::Germany => Regex::new(r"^HR[AB]\s?\d{1,6}$")
            .map(|re| re.is_match(number))
            .unwrap_or(false),
        Country::Austria => Regex::new(r"^(FN\s?)?\d{1,6}\s?[a-z]$")
            .map(|re| re.is_match(number))
            .unwrap_or(false),
        Country::Switzerland => Regex::new(r"^CHE[-\s]?\d{3}\.?\d{3}\.?\d{3}$")
            .map(|re| re.is_match(number))
            .unwrap_or(false),
        Country::UnitedKingdom => Regex::new(r"^\d{8}$")
            .map(|re| re.is_match(number))
            .unwrap_or(false),
        Country::France => Regex::new(r"^\d{3}\s?\d{3}\s?\d{3}(\s?\d{5})?$")
            .map(|re| re.is_match(number))
            .unwrap_or(false),
        Country::Italy => Regex::new(r"^[A-Z]{2}[-\s]?\d{5,7}$")
            .map(|re| re.is_match(number))
            .unwrap_or(false),
        Country::Spain => Regex::new(r"^[A-Z]{1,2}[-\s]?\d{3,7}$")
            .map(|re| re.is_match(number))
            .unwrap_or(false),
        Country::Unknown => !number.is_empty(),
    }
}

/// Strip titles and validate a person name: 2-4 tokens, no digits, no
/// legal-form or label tokens.
pub fn clean_person_name(raw: &str, country: Country) -> Option<String> {
    let mut name = raw.trim().to_string();
    loop {
        let mut stripped = false;
        for title in TITLES {
            if let Some(rest) = name.strip_prefix(title) {
                name = rest.trim_start().to_string();
                stripped = true;
            }
        }
        if !stripped {
            break;
        }
    }
    let name = name.trim();
    if name.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let parts: Vec<&str> = name.split_whitespace().collect();
    if !(2..=4).contains(&parts.len()) {
        return None;
    }
    let forms = known_forms(country);
    for part in &parts {
        if forms.iter().any(|f| f.eq_ignore_ascii_case(part)) {
            return None;
        }
        if LABEL_WORDS.contains(&part.to_lowercase().as_str()) {
            return None;
        }
    }
    Some(name.to_string())
}

/// Field-by-field validation pass over an assembled record. Failing fields
/// are dropped, never coerced. Returns false when no validated legal name
/// survives, which the caller maps to FAILED_EXTRACTION.
pub struct Validator {
    mx_check: bool,
}

impl Validator {
    pub fn new(mx_check: bool) -> Self {
        Self { mx_check }
    }

    pub async fn validate(
        &self,
        result: &mut CrawlResult,
        country: Country,
        domain_label: &str,
        mx: Option<&dyn MxResolver>,
    ) -> bool {
        // Country inference for postal validation when the record has none.
        let country = result
            .country
            .as_ref()
            .map(|c| Country::from_name(&c.value))
            .filter(|c| *c != Country::Unknown)
            .unwrap_or(country);

        if let Some(field) = result.legal_name.take() {
            if valid_legal_name(&field.value, country, domain_label) {
                result.legal_name = Some(field);
            } else {
                debug!(value = %field.value, "legal_name rejected");
            }
        }

        if let Some(field) = result.legal_form.take() {
            if valid_legal_form(&field.value, country) {
                result.legal_form = Some(field);
            }
        }

        if let Some(field) = result.postal_code.take() {
            if valid_postal_code(&field.value, country) {
                result.postal_code = Some(field);
            }
        }

        if let Some(field) = result.street.take() {
            if valid_street(&field.value) {
                result.street = Some(field);
            }
        }

        if let Some(field) = result.city.take() {
            if valid_city(&field.value) {
                result.city = Some(field);
            }
        }

        if let Some(field) = result.vat_id.take() {
            if valid_vat(&field.value, country) {
                result.vat_id = Some(field);
            }
        }

        // Registration data must co-occur with a register authority.
        if let Some(field) = result.registration_number.take() {
            if result.register_court.is_some()
                && valid_registration_number(&field.value, country)
            {
                result.registration_number = Some(field);
            } else {
                result.register_type = None;
            }
        }

        if let Some(field) = result.phones.take() {
            let normalized: BTreeSet<String> = field
                .value
                .iter()
                .filter_map(|raw| normalize_phone(raw, country))
                .collect();
            if !normalized.is_empty() {
                result.phones = Some(Field::new(normalized, field.source, field.confidence));
            }
        }

        if let Some(field) = result.fax.take() {
            if let Some(normalized) = normalize_phone(&field.value, country) {
                result.fax = Some(Field::new(normalized, field.source, field.confidence));
            }
        }

        if let Some(field) = result.emails.take() {
            let mut kept = BTreeSet::new();
            for email in field.value.iter().filter(|e| valid_email(e, true)) {
                if self.mx_check {
                    let Some(resolver) = mx else {
                        kept.insert(email.clone());
                        continue;
                    };
                    let domain_part = email.rsplit('@').next().unwrap_or("");
                    if resolver.has_mx(domain_part).await {
                        kept.insert(email.clone());
                    }
                } else {
                    kept.insert(email.clone());
                }
            }
            if !kept.is_empty() {
                result.emails = Some(Field::new(kept, field.source, field.confidence));
            }
        }

        if let Some(field) = result.ceo.take() {
            if let Some(name) = clean_person_name(&field.value, country) {
                result.ceo = Some(Field::new(name, field.source, field.confidence));
            }
        }

        if let Some(field) = result.directors.take() {
            let cleaned: Vec<String> = field
                .value
                .iter()
                .filter_map(|raw| clean_person_name(raw, country))
                .collect();
            if !cleaned.is_empty() {
                result.directors = Some(Field::new(cleaned, field.source, field.confidence));
            }
        }

        result.recompute_confidence();
        result.legal_name.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legalscout_core::FieldSource;
    use std::collections::BTreeSet;

    #[test]
    fn test_legal_name_rules() {
        assert!(valid_legal_name("Beispiel GmbH", Country::Germany, "beispiel"));
        // Fuzzy match to the domain label, no form token.
        assert!(valid_legal_name("Muellerbau", Country::Germany, "muellerbau"));
        // Digit run.
        assert!(!valid_legal_name("Beispiel 12345 GmbH", Country::Germany, "beispiel"));
        // Too short.
        assert!(!valid_legal_name("AG", Country::Germany, "beispiel"));
        // Pure navigation labels.
        assert!(!valid_legal_name("Kontakt", Country::Germany, "beispiel"));
        // Unrelated, no form token.
        assert!(!valid_legal_name("Willkommen auf unserer Seite", Country::Germany, "beispiel"));
    }

    #[test]
    fn test_legal_form_membership() {
        assert!(valid_legal_form("GmbH", Country::Germany));
        assert!(valid_legal_form("Ltd", Country::UnitedKingdom));
        assert!(!valid_legal_form("GmbH", Country::France));
    }

    #[test]
    fn test_postal_codes() {
        assert!(valid_postal_code("10115", Country::Germany));
        assert!(!valid_postal_code("1011", Country::Germany));
        assert!(valid_postal_code("1010", Country::Austria));
        assert!(valid_postal_code("EC1A 1BB", Country::UnitedKingdom));
        assert!(!valid_postal_code("10115", Country::Austria));
    }

    #[test]
    fn test_street_and_city() {
        assert!(valid_street("Musterweg 7"));
        assert!(!valid_street("Musterweg"));
        assert!(!valid_street("Kontakt"));
        assert!(valid_city("München"));
        assert!(valid_city("Neustadt an der Weinstraße"));
        assert!(!valid_city("B2"));
        assert!(!valid_city("X"));
    }

    #[test]
    fn test_phone_normalisation() {
        let normalized = normalize_phone("+49 30 901820", Country::Germany).unwrap();
        assert!(normalized.starts_with("+49"));
        // National format gets the region from the country context.
        assert!(normalize_phone("030 901820", Country::Germany).is_some());
        assert!(normalize_phone("not a number", Country::Germany).is_none());
    }

    #[test]
    fn test_email_rules() {
        assert!(valid_email("info@example.de", true));
        assert!(!valid_email("not-an-email", true));
        // Personal pattern allowed on legal pages, dropped elsewhere.
        assert!(valid_email("max.mustermann@example.de", true));
        assert!(!valid_email("max.mustermann@example.de", false));
    }

    #[test]
    fn test_vat_patterns_and_checksums() {
        assert!(valid_vat("DE123456789", Country::Germany));
        assert!(!valid_vat("DE12345678", Country::Germany));
        assert!(valid_vat("ATU12345678", Country::Austria));
        // FR key for SIREN 404833048 is (12 + 3 * (404833048 % 97)) % 97 = 83.
        assert!(valid_vat("FR83404833048", Country::France));
        assert!(!valid_vat("FR00404833048", Country::France));
        // IT checksum: 00154189997 is a valid Luhn-style number.
        assert!(valid_vat("IT00154189997", Country::Italy));
        assert!(!valid_vat("IT00154189998", Country::Italy));
    }

    #[test]
    fn test_registration_number_rules() {
        assert!(valid_registration_number("HRB 12345", Country::Germany));
        assert!(!valid_registration_number("12345", Country::Germany));
        assert!(valid_registration_number("01234567", Country::UnitedKingdom));
        assert!(valid_registration_number("123 456 789", Country::France));
    }

    #[test]
    fn test_person_names() {
        assert_eq!(
            clean_person_name("Dr. Max Mustermann", Country::Germany),
            Some("Max Mustermann".to_string())
        );
        assert_eq!(
            clean_person_name("Herr Dr. Max Mustermann", Country::Germany),
            Some("Max Mustermann".to_string())
        );
        assert!(clean_person_name("Max", Country::Germany).is_none());
        assert!(clean_person_name("Max 2 Mustermann", Country::Germany).is_none());
        assert!(clean_person_name("Beispiel GmbH", Country::Germany).is_none());
    }

    #[tokio::test]
    async fn test_validate_drops_bad_fields_keeps_good() {
        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/impressum", "run-1");
        let f = |v: &str| Field::new(v.to_string(), FieldSource::Pattern, 0.8);
        result.legal_name = Some(f("Beispiel GmbH"));
        result.legal_form = Some(f("GmbH"));
        result.postal_code = Some(f("80333"));
        result.city = Some(f("München"));
        result.street = Some(f("Musterweg 7"));
        // No register court: the number must be dropped.
        result.registration_number = Some(f("HRB 12345"));
        result.register_type = Some(f("HRB"));
        let mut phones = BTreeSet::new();
        phones.insert("garbage".to_string());
        phones.insert("+49 30 901820".to_string());
        result.phones = Some(Field::new(phones, FieldSource::Pattern, 0.8));

        let validator = Validator::new(false);
        let ok = validator
            .validate(&mut result, Country::Germany, "beispiel", None)
            .await;

        assert!(ok);
        assert!(result.legal_name.is_some());
        assert!(result.registration_number.is_none());
        assert!(result.register_type.is_none());
        let phones = result.phones.unwrap();
        assert_eq!(phones.value.len(), 1);
        assert!(phones.value.iter().next().unwrap().starts_with("+49"));
    }

    #[tokio::test]
    async fn test_validate_without_legal_name_reports_failure() {
        let mut result = CrawlResult::new("beispiel.de", "https://beispiel.de/", "run-1");
        result.city = Some(Field::new("München".into(), FieldSource::Pattern, 0.8));
        let validator = Validator::new(false);
        let ok = validator
            .validate(&mut result, Country::Germany, "beispiel", None)
            .await;
        assert!(!ok);
    }
}
