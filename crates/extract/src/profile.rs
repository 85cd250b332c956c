use once_cell::sync::Lazy;
use regex::Regex;

use legalscout_core::Country;

/// Pattern set for one jurisdiction. The postal regexes use named groups
/// (`code`, `city`) because the line order differs between countries.
pub struct CountryProfile {
    pub country: Country,
    /// Longest first, so "GmbH & Co. KG" wins over "GmbH".
    pub legal_forms: &'static [&'static str],
    /// Unanchored postal-code + city pattern used to find the anchor line.
    pub postal_line: Regex,
    /// Full-match validation of a bare postal code.
    pub postal_code: Regex,
    pub register: Option<Regex>,
    pub register_court: Option<Regex>,
    pub register_type: Option<&'static str>,
    pub vat: Option<Regex>,
    pub exec_labels: &'static [&'static str],
    /// Content markers used for detection when the ccTLD is inconclusive.
    pub markers: &'static [&'static str],
}

pub const DACH_FORMS: &[&str] = &[
    "GmbH & Co. KG",
    "gGmbH",
    "GmbH",
    "KGaA",
    "UG (haftungsbeschränkt)",
    "UG",
    "e.K.",
    "e.V.",
    "eG",
    "OHG",
    "KG",
    "AG",
    "S.A.",
    "Sàrl",
    "GbR",
];

pub const UK_FORMS: &[&str] = &["Limited", "Ltd.", "Ltd", "PLC", "LLP", "CIC"];

pub const FR_FORMS: &[&str] = &["SARL", "SASU", "SAS", "EURL", "SCI", "SA"];

pub const IT_FORMS: &[&str] = &["S.r.l.", "S.p.A.", "S.a.s.", "S.n.c.", "Srl", "SpA"];

pub const ES_FORMS: &[&str] = &["S.L.L.", "S.L.U.", "S.L.", "S.A.", "SL", "SA"];

pub const GENERIC_FORMS: &[&str] = &[
    "GmbH", "AG", "Inc.", "Inc", "LLC", "Corp.", "Corp", "Ltd.", "Ltd", "B.V.", "BV", "N.V.",
    "ApS", "A/S", "AB", "Oy", "Sp. z o.o.",
];

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern must compile")
}

pub static PROFILES: Lazy<Vec<CountryProfile>> = Lazy::new(|| {
    vec![
        CountryProfile {
            country: Country::Germany,
            legal_forms: DACH_FORMS,
            postal_line: re(r"(?:\bD[-\s])?\b(?P<code>\d{5})\s+(?P<city>\p{Lu}[\p{L}\s.\-()/]*)"),
            postal_code: re(r"^\d{5}$"),
            register: Some(re(r"(?i)\b(?P<kind>HR[AB])\s*[-.:]?\s*(?P<num>\d{1,6})\b")),
            register_court: Some(re(r"(?i)\b(Amtsgericht\s+\p{Lu}[\p{L}\-]+(?:\s+\p{Lu}[\p{L}\-]+)?)")),
            register_type: Some("Handelsregister"),
            vat: Some(re(r"(?i)(?:USt[-.\s]?IdNr\.?|Umsatzsteuer-?Identifikationsnummer|VAT)\s*[:.]?\s*(?P<vat>DE\s?\d{9})\b")),
            exec_labels: &[
                "Geschäftsführerin",
                "Geschäftsführer",
                "Geschäftsführung",
                "Vorstand",
                "Vertretungsberechtigter",
                "Inhaberin",
                "Inhaber",
            ],
            markers: &["Amtsgericht", "Handelsregister", "USt-IdNr", "HRB", "HRA"],
        },
        CountryProfile {
            country: Country::Austria,
            legal_forms: DACH_FORMS,
            postal_line: re(r"(?:\bA[-\s])?\b(?P<code>\d{4})\s+(?P<city>\p{Lu}[\p{L}\s.\-()/]*)"),
            postal_code: re(r"^\d{4}$"),
            register: Some(re(r"(?i)\bFN\s*[:.]?\s*(?P<num>\d{1,6}\s?[a-z])\b")),
            register_court: Some(re(r"(?i)\b((?:Landesgericht|Handelsgericht|Landes-\s?als\s?Handelsgericht)\s+\p{Lu}[\p{L}\-]+)")),
            register_type: Some("Firmenbuch"),
            vat: Some(re(r"(?i)(?:UID(?:-Nr\.?)?|ATU-?Nummer|USt[-.\s]?IdNr\.?)\s*[:.]?\s*(?P<vat>ATU\s?\d{8})\b")),
            exec_labels: &["Geschäftsführerin", "Geschäftsführer", "Geschäftsführung", "Vorstand", "Inhaber"],
            markers: &["Firmenbuch", "ATU", "Landesgericht"],
        },
        CountryProfile {
            country: Country::Switzerland,
            legal_forms: DACH_FORMS,
            postal_line: re(r"(?:\bCH[-\s])?\b(?P<code>\d{4})\s+(?P<city>\p{Lu}[\p{L}\s.\-()/]*)"),
            postal_code: re(r"^\d{4}$"),
            register: Some(re(r"(?i)\b(?P<num>CHE[-\s]?\d{3}\.?\d{3}\.?\d{3})\b")),
            register_court: Some(re(r"(?i)\b(Handelsregisteramt(?:\s+des\s+Kantons)?\s+\p{Lu}[\p{L}\-]+)")),
            register_type: Some("Handelsregister"),
            vat: Some(re(r"(?i)\b(?P<vat>CHE[-\s]?\d{3}\.?\d{3}\.?\d{3})\s?(?:MWST|TVA|IVA)\b")),
            exec_labels: &["Geschäftsführer", "Geschäftsführung", "Verwaltungsrat", "Inhaber"],
            markers: &["Handelsregisteramt", "MWST", "CHE-"],
        },
        CountryProfile {
            country: Country::UnitedKingdom,
            legal_forms: UK_FORMS,
            postal_line: re(r"(?P<city>\p{Lu}[\p{L}\s.'\-]*?)[,\s]+(?P<code>[A-Z]{1,2}\d[A-Z\d]?\s*\d[A-Z]{2})\b"),
            postal_code: re(r"^[A-Z]{1,2}\d[A-Z\d]?\s*\d[A-Z]{2}$"),
            register: Some(re(r"(?i)(?:company|registered)\s+(?:registration\s+)?(?:number|no\.?)\s*[:.]?\s*(?P<num>\d{8})\b")),
            register_court: Some(re(r"(?i)\b(Companies House)\b")),
            register_type: Some("Companies House"),
            vat: Some(re(r"(?i)VAT\s*(?:registration\s*)?(?:number|no\.?)?\s*[:.]?\s*(?P<vat>GB\s?\d{9}(?:\d{3})?)\b")),
            exec_labels: &["Managing Director", "Directors", "Director"],
            markers: &["Companies House", "Registered in England", "Registered office"],
        },
        CountryProfile {
            country: Country::France,
            legal_forms: FR_FORMS,
            postal_line: re(r"(?:\bF[-\s])?\b(?P<code>\d{5})\s+(?P<city>\p{Lu}[\p{L}\s.\-()/]*)"),
            postal_code: re(r"^\d{5}$"),
            register: Some(re(r"(?i)\b(?:RCS\s+\p{Lu}[\p{L}\-]*\s+|SIREN\s*[:.]?\s*|SIRET\s*[:.]?\s*)(?P<num>\d{3}\s?\d{3}\s?\d{3}(?:\s?\d{5})?)\b")),
            register_court: Some(re(r"(?i)\b(RCS\s+\p{Lu}[\p{L}\-]+)")),
            register_type: Some("RCS"),
            vat: Some(re(r"(?i)(?:TVA\s+intracommunautaire|N°\s?TVA|TVA)\s*[:.]?\s*(?P<vat>FR\s?[0-9A-Z]{2}\s?\d{9})\b")),
            exec_labels: &["Gérante", "Gérant", "Président", "Directeur de la publication", "Directeur Général"],
            markers: &["RCS", "SIRET", "SIREN", "Mentions légales"],
        },
        CountryProfile {
            country: Country::Italy,
            legal_forms: IT_FORMS,
            postal_line: re(r"(?:\bI[-\s])?\b(?P<code>\d{5})\s+(?P<city>\p{Lu}[\p{L}\s.\-()/]*)"),
            postal_code: re(r"^\d{5}$"),
            register: Some(re(r"(?i)\bREA\s*[:.]?\s*(?P<num>[A-Z]{2}[-\s]?\d{5,7})\b")),
            register_court: Some(re(r"(?i)\b(Registro\s+(?:delle\s+)?Imprese\s+di\s+\p{Lu}[\p{L}\-]+)")),
            register_type: Some("Registro Imprese"),
            vat: Some(re(r"(?i)P(?:artita)?\.?\s?IVA\s*[:.]?\s*(?P<vat>(?:IT\s?)?\d{11})\b")),
            exec_labels: &["Amministratore Unico", "Amministratore Delegato", "Amministratore"],
            markers: &["Registro Imprese", "P.IVA", "Partita IVA", "REA"],
        },
        CountryProfile {
            country: Country::Spain,
            legal_forms: ES_FORMS,
            postal_line: re(r"(?:\bE[-\s])?\b(?P<code>\d{5})\s+(?P<city>\p{Lu}[\p{L}\s.\-()/]*)"),
            postal_code: re(r"^\d{5}$"),
            register: Some(re(r"(?i)\bhoja\s*[:.]?\s*(?P<num>[A-Z]{1,2}[-\s]?\d{3,7})\b")),
            register_court: Some(re(r"(?i)\b(Registro\s+Mercantil\s+de\s+\p{Lu}[\p{L}\-]+)")),
            register_type: Some("Registro Mercantil"),
            vat: Some(re(r"(?i)(?:CIF|NIF|IVA)\s*[:.]?\s*(?P<vat>(?:ES\s?)?[A-Z]\d{7}[A-Z0-9])\b")),
            exec_labels: &["Administrador Único", "Administrador", "Gerente"],
            markers: &["Registro Mercantil", "CIF", "Aviso legal"],
        },
    ]
});

/// Generic family: postal codes are unchecked downstream, the form list is
/// user-extensible via configuration.
pub static GENERIC_PROFILE: Lazy<CountryProfile> = Lazy::new(|| CountryProfile {
    country: Country::Unknown,
    legal_forms: GENERIC_FORMS,
    postal_line: re(r"\b(?P<code>\d{4,6})\s+(?P<city>\p{Lu}[\p{L}\s.\-()/]*)"),
    postal_code: re(r"^[A-Za-z0-9][A-Za-z0-9 \-]{2,9}$"),
    register: None,
    register_court: None,
    register_type: None,
    vat: Some(re(r"(?i)\bVAT\s*(?:number|no\.?|id)?\s*[:.]?\s*(?P<vat>[A-Z]{2}\s?[0-9A-Z]{8,12})\b")),
    exec_labels: &["CEO", "Managing Director", "Director", "Founder", "Owner"],
    markers: &[],
});

pub fn profile_for(country: Country) -> Option<&'static CountryProfile> {
    PROFILES.iter().find(|p| p.country == country)
}

/// Country detection: ccTLD suffix first, then jurisdiction markers in the
/// isolated text.
pub fn detect_country(domain: &str, text: &str) -> Country {
    let by_tld = Country::from_tld(domain);
    if by_tld != Country::Unknown {
        return by_tld;
    }
    for profile in PROFILES.iter() {
        if profile.markers.iter().any(|m| text.contains(m)) {
            return profile.country;
        }
    }
    Country::Unknown
}

/// Known legal forms for validation, by country.
pub fn known_forms(country: Country) -> &'static [&'static str] {
    match profile_for(country) {
        Some(profile) => profile.legal_forms,
        None => GENERIC_FORMS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_tld() {
        assert_eq!(detect_country("example.de", ""), Country::Germany);
        assert_eq!(detect_country("shop.co.uk", ""), Country::UnitedKingdom);
    }

    #[test]
    fn test_detect_by_markers() {
        assert_eq!(
            detect_country("example.com", "HRB 12345 Amtsgericht München"),
            Country::Germany
        );
        assert_eq!(
            detect_country("example.com", "Registered at Companies House under number 01234567"),
            Country::UnitedKingdom
        );
        assert_eq!(
            detect_country("example.com", "RCS Paris 123 456 789"),
            Country::France
        );
        assert_eq!(detect_country("example.com", "nothing here"), Country::Unknown);
    }

    #[test]
    fn test_postal_line_captures() {
        let de = profile_for(Country::Germany).unwrap();
        let caps = de.postal_line.captures("80333 München").unwrap();
        assert_eq!(&caps["code"], "80333");
        assert_eq!(&caps["city"], "München");

        let uk = profile_for(Country::UnitedKingdom).unwrap();
        let caps = uk.postal_line.captures("London EC1A 1BB").unwrap();
        assert_eq!(caps["city"].trim(), "London");
        assert_eq!(&caps["code"], "EC1A 1BB");
    }

    #[test]
    fn test_register_patterns() {
        let de = profile_for(Country::Germany).unwrap();
        let caps = de
            .register
            .as_ref()
            .unwrap()
            .captures("HRB 12345 Amtsgericht München")
            .unwrap();
        assert_eq!(&caps["kind"], "HRB");
        assert_eq!(&caps["num"], "12345");

        let uk = profile_for(Country::UnitedKingdom).unwrap();
        let caps = uk
            .register
            .as_ref()
            .unwrap()
            .captures("Registered in England. Company number: 01234567.")
            .unwrap();
        assert_eq!(&caps["num"], "01234567");
    }

    #[test]
    fn test_vat_patterns() {
        let de = profile_for(Country::Germany).unwrap();
        let caps = de
            .vat
            .as_ref()
            .unwrap()
            .captures("USt-IdNr.: DE123456789")
            .unwrap();
        assert_eq!(&caps["vat"], "DE123456789");

        let it = profile_for(Country::Italy).unwrap();
        let caps = it
            .vat
            .as_ref()
            .unwrap()
            .captures("P.IVA 01234567890")
            .unwrap();
        assert_eq!(&caps["vat"], "01234567890");
    }
}
