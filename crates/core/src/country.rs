use serde::{Deserialize, Serialize};

/// Jurisdictions with dedicated extractor pattern sets. Everything else is
/// handled by the generic pattern family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Country {
    Germany,
    Austria,
    Switzerland,
    UnitedKingdom,
    France,
    Italy,
    Spain,
    Unknown,
}

impl Country {
    pub fn from_tld(domain: &str) -> Country {
        let host = domain.trim_end_matches('.').to_ascii_lowercase();
        if host.ends_with(".de") {
            Country::Germany
        } else if host.ends_with(".at") {
            Country::Austria
        } else if host.ends_with(".ch") || host.ends_with(".li") {
            Country::Switzerland
        } else if host.ends_with(".uk") {
            Country::UnitedKingdom
        } else if host.ends_with(".fr") {
            Country::France
        } else if host.ends_with(".it") {
            Country::Italy
        } else if host.ends_with(".es") {
            Country::Spain
        } else {
            Country::Unknown
        }
    }

    /// ISO 3166-1 alpha-2 codes as they appear in structured annotations.
    pub fn from_code(code: &str) -> Country {
        match code.trim().to_ascii_uppercase().as_str() {
            "DE" | "DEU" => Country::Germany,
            "AT" | "AUT" => Country::Austria,
            "CH" | "CHE" => Country::Switzerland,
            "GB" | "UK" | "GBR" => Country::UnitedKingdom,
            "FR" | "FRA" => Country::France,
            "IT" | "ITA" => Country::Italy,
            "ES" | "ESP" => Country::Spain,
            _ => Country::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Country::Germany => "Germany",
            Country::Austria => "Austria",
            Country::Switzerland => "Switzerland",
            Country::UnitedKingdom => "United Kingdom",
            Country::France => "France",
            Country::Italy => "Italy",
            Country::Spain => "Spain",
            Country::Unknown => "",
        }
    }

    pub fn from_name(name: &str) -> Country {
        match name.trim() {
            "Germany" | "Deutschland" => Country::Germany,
            "Austria" | "Österreich" => Country::Austria,
            "Switzerland" | "Schweiz" | "Suisse" => Country::Switzerland,
            "United Kingdom" | "Great Britain" | "England" => Country::UnitedKingdom,
            "France" => Country::France,
            "Italy" | "Italia" => Country::Italy,
            "Spain" | "España" => Country::Spain,
            other => Country::from_code(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tld() {
        assert_eq!(Country::from_tld("example.de"), Country::Germany);
        assert_eq!(Country::from_tld("www.example.co.uk"), Country::UnitedKingdom);
        assert_eq!(Country::from_tld("example.at"), Country::Austria);
        assert_eq!(Country::from_tld("example.com"), Country::Unknown);
    }

    #[test]
    fn test_from_code_and_name() {
        assert_eq!(Country::from_code("de"), Country::Germany);
        assert_eq!(Country::from_code("GB"), Country::UnitedKingdom);
        assert_eq!(Country::from_name("Deutschland"), Country::Germany);
        assert_eq!(Country::from_name("FR"), Country::France);
    }
}
