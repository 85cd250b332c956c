use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use legalscout_core::{Extraction, FieldSource};

use crate::profile::CountryProfile;

/// Street-suffix tokens across the covered jurisdictions. Substring match,
/// because German street names are compounds ("Musterweg", "Hauptstraße").
const STREET_TOKENS: &[&str] = &[
    "straße", "strasse", "str.", "weg", "platz", "gasse", "allee", "ring", "damm", "ufer",
    "chaussee", "markt", "road", "street", "lane", "avenue", "rue ", "via ", "viale", "piazza",
    "calle", "avenida", "plaza",
];

/// Navigation/label words that disqualify a line as a legal name.
const NAME_DENYLIST: &[&str] = &[
    "kontakt",
    "anschrift",
    "adresse",
    "home",
    "menu",
    "menü",
    "impressum",
    "imprint",
    "telefon",
    "warenkorb",
    "anfahrt",
    "öffnungszeiten",
    "contact",
    "address",
    "login",
    "suche",
];

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}").unwrap());

static PHONE_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:tel(?:efon)?|phone|tél(?:éphone)?|telefono|teléfono)\s*[.:]?\s*([+0-9][\d\s()/.\-]{5,20}\d)").unwrap()
});

static PHONE_INTL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+[1-9][\d\s()/.\-]{6,18}\d").unwrap());

static FAX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:tele)?fax\s*[.:]?\s*([+0-9][\d\s()/.\-]{5,20}\d)").unwrap()
});

static DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").unwrap());

fn contains_digit(s: &str) -> bool {
    DIGIT_RE.is_match(s)
}

/// First known legal-form token in the line, respecting token boundaries so
/// that "UG" does not fire inside "AUGUST".
pub fn find_form<'a>(line: &str, forms: &[&'a str]) -> Option<&'a str> {
    forms
        .iter()
        .find(|form| {
            line.match_indices(*form).any(|(start, matched)| {
                let before_ok = line[..start]
                    .chars()
                    .next_back()
                    .map(|c| !c.is_alphanumeric())
                    .unwrap_or(true);
                let after_ok = line[start + matched.len()..]
                    .chars()
                    .next()
                    .map(|c| !c.is_alphanumeric())
                    .unwrap_or(true);
                before_ok && after_ok
            })
        })
        .copied()
}

fn has_denylist_token(line: &str) -> bool {
    line.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .any(|token| NAME_DENYLIST.contains(&token))
}

/// Similarity of a candidate name line to the domain's second-level label.
/// The whole line (legal forms stripped) and its individual tokens are both
/// tried; the best ratio wins.
pub fn domain_similarity(line: &str, domain_label: &str, forms: &[&str]) -> f64 {
    let mut stripped = line.to_string();
    for form in forms {
        stripped = stripped.replace(form, " ");
    }
    let normalized: String = stripped
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    let label = domain_label.to_lowercase().replace('-', "");

    let whole = strsim::normalized_levenshtein(&normalized.replace(' ', ""), &label);
    let token_best = normalized
        .split_whitespace()
        .map(|token| strsim::normalized_levenshtein(token, &label))
        .fold(0.0f64, f64::max);
    whole.max(token_best)
}

fn is_street_line(line: &str) -> bool {
    if !contains_digit(line) {
        return false;
    }
    let lower = line.to_lowercase();
    STREET_TOKENS.iter().any(|token| lower.contains(token))
}

struct Anchor {
    line_idx: usize,
    match_start: usize,
    code: String,
    city: String,
}

fn find_anchor(lines: &[&str], profile: &CountryProfile) -> Option<Anchor> {
    for (idx, line) in lines.iter().enumerate() {
        if let Some(caps) = profile.postal_line.captures(line) {
            let code = caps.name("code")?.as_str().trim().to_string();
            let city = caps.name("city")?.as_str().trim().trim_end_matches(',').to_string();
            if city.is_empty() || contains_digit(&city) {
                continue;
            }
            let start = caps
                .name("code")
                .map(|m| m.start())
                .min(caps.name("city").map(|m| m.start()))
                .unwrap_or(0);
            return Some(Anchor {
                line_idx: idx,
                match_start: start,
                code,
                city,
            });
        }
    }
    None
}

/// Names after an executive label like "Geschäftsführer: Max Mustermann".
fn split_person_list(raw: &str) -> Vec<String> {
    raw.split([',', ';', '&'])
        .flat_map(|part| part.split(" und "))
        .flat_map(|part| part.split(" and "))
        .map(|name| name.trim().trim_matches(|c: char| c == '.' || c == ':').trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Run the country pattern set over isolated legal text.
///
/// The anchor & expand pass locates the postal line, then walks upward for
/// the street and the legal name; register, VAT, executive, and contact
/// fields are scanned over the whole text.
pub fn extract_with_profile(
    text: &str,
    profile: &CountryProfile,
    extra_forms: &[String],
    domain_label: &str,
    source: FieldSource,
    confidence: f64,
) -> Extraction {
    let mut out = Extraction::with_source(source, confidence);

    let mut forms: Vec<&str> = profile.legal_forms.to_vec();
    forms.extend(extra_forms.iter().map(String::as_str));

    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    // --- Anchor & expand ---
    if let Some(anchor) = find_anchor(&lines, profile) {
        out.postal_code = Some(anchor.code.clone());
        out.city = Some(anchor.city.clone());

        // Street: the portion of the anchor line before the postal match,
        // or the first non-empty line above it.
        let mut street_idx = anchor.line_idx;
        let before = lines[anchor.line_idx][..anchor.match_start]
            .trim()
            .trim_end_matches([',', '·', '|'])
            .trim();
        if is_street_line(before) {
            out.street = Some(before.to_string());
        } else if anchor.line_idx > 0 {
            let above = lines[anchor.line_idx - 1];
            if is_street_line(above) {
                out.street = Some(above.to_string());
                street_idx = anchor.line_idx - 1;
            }
        }

        // Legal name: nearest non-empty line within three above the street
        // (or anchor) that carries a legal form or resembles the domain.
        let mut inspected = 0;
        for idx in (0..street_idx).rev() {
            let line = lines[idx];
            if line.is_empty() {
                continue;
            }
            inspected += 1;
            if inspected > 3 {
                break;
            }
            if has_denylist_token(line) {
                continue;
            }
            let form = find_form(line, &forms);
            let similar = domain_similarity(line, domain_label, &forms) >= 0.6;
            if form.is_some() || similar {
                out.legal_name = Some(line.to_string());
                if let Some(form) = form {
                    out.legal_form = Some(form.to_string());
                }
                break;
            }
        }
    } else {
        debug!(domain_label, "no postal anchor line found");
    }

    // Legal form fallback: first known token anywhere in the text.
    if out.legal_form.is_none() {
        out.legal_form = lines
            .iter()
            .find_map(|line| find_form(line, &forms))
            .map(str::to_string);
    }

    // --- Whole-text scans ---
    if let Some(register) = &profile.register {
        if let Some(caps) = register.captures(text) {
            if let Some(num) = caps.name("num") {
                let number = match caps.name("kind") {
                    Some(kind) => format!("{} {}", kind.as_str().to_uppercase(), num.as_str()),
                    None => num.as_str().to_string(),
                };
                out.registration_number = Some(number);
                out.register_type = match caps.name("kind") {
                    Some(kind) => Some(kind.as_str().to_uppercase()),
                    None => profile.register_type.map(str::to_string),
                };
            }
        }
    }
    if let Some(court_re) = &profile.register_court {
        out.register_court = court_re
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string());
    }
    if let Some(vat_re) = &profile.vat {
        out.vat_id = vat_re
            .captures(text)
            .and_then(|caps| caps.name("vat"))
            .map(|m| m.as_str().replace(' ', ""));
    }

    // Executives: label-prefixed lines.
    for line in &lines {
        for label in profile.exec_labels {
            let Some(rest) = line.strip_prefix(label) else {
                continue;
            };
            let names = split_person_list(rest.trim_start_matches([':', ' ']));
            if names.is_empty() {
                continue;
            }
            if out.ceo.is_none() {
                out.ceo = Some(names[0].clone());
            }
            for name in names {
                if !out.directors.contains(&name) {
                    out.directors.push(name);
                }
            }
            break;
        }
    }

    out.emails = EMAIL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();
    out.emails.sort();
    out.emails.dedup();

    let mut phones: Vec<String> = PHONE_LABEL_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .collect();
    let fax_numbers: Vec<String> = FAX_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .collect();
    for m in PHONE_INTL_RE.find_iter(text) {
        let number = m.as_str().trim().to_string();
        // Fax numbers also match the bare international pattern.
        if !fax_numbers.contains(&number) {
            phones.push(number);
        }
    }
    phones.sort();
    phones.dedup();
    out.phones = phones;
    out.fax = fax_numbers.into_iter().next();

    if profile.country != legalscout_core::Country::Unknown {
        out.country = Some(profile.country);
    }

    out
}
