pub mod assemble;
pub mod pattern;
pub mod profile;
pub mod validate;

#[cfg(test)]
mod pipeline_tests;

pub use assemble::{assemble, AssembleContext, ARCHIVE_MULTIPLIER};
pub use profile::detect_country;
pub use validate::Validator;

use legalscout_core::{Country, Extraction, FieldSource};

/// Base confidence of country-specific pattern candidates.
pub const PATTERN_CONFIDENCE: f64 = 0.8;
/// Base confidence of generic-family candidates.
pub const GENERIC_CONFIDENCE: f64 = 0.7;

/// Second-level label of a host, the part compared against legal names.
pub fn domain_label(domain: &str) -> String {
    let host = domain.strip_prefix("www.").unwrap_or(domain);
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    match labels.len() {
        0 => String::new(),
        1 => labels[0].to_string(),
        2 => labels[0].to_string(),
        n => {
            // Multi-part registries like .co.uk keep the label one level up.
            let second_level = labels[n - 2];
            if ["co", "com", "org", "net", "ac", "gov"].contains(&second_level) {
                labels[n - 3].to_string()
            } else {
                labels[n - 2].to_string()
            }
        }
    }
}

/// Country-specific and generic pattern passes over isolated legal text.
/// The structured pass comes from the page parser; these are the other two
/// rungs of the merge priority.
pub struct Extractor {
    extra_generic_forms: Vec<String>,
}

impl Extractor {
    pub fn new(extra_generic_forms: Vec<String>) -> Self {
        Self { extra_generic_forms }
    }

    pub fn run_passes(&self, text: &str, domain: &str) -> (Country, Vec<Extraction>) {
        let country = profile::detect_country(domain, text);
        let label = domain_label(domain);
        let mut passes = Vec::new();

        if let Some(profile) = profile::profile_for(country) {
            passes.push(pattern::extract_with_profile(
                text,
                profile,
                &[],
                &label,
                FieldSource::Pattern,
                PATTERN_CONFIDENCE,
            ));
        }
        passes.push(pattern::extract_with_profile(
            text,
            &profile::GENERIC_PROFILE,
            &self.extra_generic_forms,
            &label,
            FieldSource::Generic,
            GENERIC_CONFIDENCE,
        ));

        (country, passes)
    }
}
