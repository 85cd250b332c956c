use std::collections::BTreeSet;

use legalscout_core::{CrawlResult, Extraction, Field, FieldSource};

/// Confidence multiplier for pages served from the archive fallback.
pub const ARCHIVE_MULTIPLIER: f64 = 0.9;

pub struct AssembleContext<'a> {
    pub domain: &'a str,
    pub legal_source_url: &'a str,
    pub run_id: &'a str,
    pub from_archive: bool,
    pub robots_allowed: bool,
    pub robots_reason: Option<String>,
}

/// Winning candidate for one field: highest source priority first, then
/// higher confidence, then earlier pass order.
fn best<T, F>(passes: &[Extraction], get: F) -> Option<(T, FieldSource, f64)>
where
    F: Fn(&Extraction) -> Option<T>,
{
    let mut winner: Option<(u8, f64, T, FieldSource)> = None;
    for pass in passes {
        let Some(source) = pass.source else {
            continue;
        };
        let Some(value) = get(pass) else {
            continue;
        };
        let better = match &winner {
            None => true,
            Some((rank, conf, _, _)) => {
                source.rank() < *rank || (source.rank() == *rank && pass.confidence > *conf)
            }
        };
        if better {
            winner = Some((source.rank(), pass.confidence, value, source));
        }
    }
    winner.map(|(_, conf, value, source)| (value, source, conf))
}

/// Merge extraction passes into an (unvalidated) record by the priority
/// rule structured > country pattern > generic.
pub fn assemble(passes: &[Extraction], ctx: &AssembleContext) -> CrawlResult {
    let mut result = CrawlResult::new(ctx.domain, ctx.legal_source_url, ctx.run_id);
    result.robots_allowed = ctx.robots_allowed;
    result.robots_reason = ctx.robots_reason.clone();

    let mult = if ctx.from_archive { ARCHIVE_MULTIPLIER } else { 1.0 };
    let field = |winner: Option<(String, FieldSource, f64)>| {
        winner.map(|(value, source, conf)| Field::new(value, source, conf * mult))
    };

    result.legal_name = field(best(passes, |p| p.legal_name.clone()));
    result.legal_form = field(best(passes, |p| p.legal_form.clone()));
    result.registration_number = field(best(passes, |p| p.registration_number.clone()));
    result.register_court = field(best(passes, |p| p.register_court.clone()));
    result.register_type = field(best(passes, |p| p.register_type.clone()));
    result.vat_id = field(best(passes, |p| p.vat_id.clone()));
    result.street = field(best(passes, |p| p.street.clone()));
    result.postal_code = field(best(passes, |p| p.postal_code.clone()));
    result.city = field(best(passes, |p| p.city.clone()));
    result.country = field(best(passes, |p| {
        p.country.map(|c| c.name().to_string()).filter(|n| !n.is_empty())
    }));
    result.ceo = field(best(passes, |p| p.ceo.clone()));

    result.directors = best(passes, |p| {
        if p.directors.is_empty() {
            None
        } else {
            Some(p.directors.clone())
        }
    })
    .map(|(value, source, conf)| Field::new(value, source, conf * mult));

    result.emails = best(passes, |p| {
        if p.emails.is_empty() {
            None
        } else {
            Some(p.emails.iter().cloned().collect::<BTreeSet<String>>())
        }
    })
    .map(|(value, source, conf)| Field::new(value, source, conf * mult));

    result.phones = best(passes, |p| {
        if p.phones.is_empty() {
            None
        } else {
            Some(p.phones.iter().cloned().collect::<BTreeSet<String>>())
        }
    })
    .map(|(value, source, conf)| Field::new(value, source, conf * mult));

    result.fax = field(best(passes, |p| p.fax.clone()));

    result.recompute_confidence();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use legalscout_core::Country;

    fn ctx<'a>() -> AssembleContext<'a> {
        AssembleContext {
            domain: "example.de",
            legal_source_url: "https://example.de/impressum",
            run_id: "run-1",
            from_archive: false,
            robots_allowed: true,
            robots_reason: None,
        }
    }

    fn structured_pass() -> Extraction {
        let mut pass = Extraction::with_source(FieldSource::Structured, 1.0);
        pass.legal_name = Some("Example GmbH".into());
        pass.phones = vec!["+49 30 1234567".into()];
        pass
    }

    fn pattern_pass() -> Extraction {
        let mut pass = Extraction::with_source(FieldSource::Pattern, 0.8);
        pass.legal_name = Some("Example Gesellschaft".into());
        pass.street = Some("Musterstr. 1".into());
        pass.country = Some(Country::Germany);
        pass
    }

    #[test]
    fn test_structured_beats_pattern() {
        let result = assemble(&[pattern_pass(), structured_pass()], &ctx());
        let name = result.legal_name.unwrap();
        assert_eq!(name.value, "Example GmbH");
        assert_eq!(name.source, FieldSource::Structured);
        assert!((name.confidence - 1.0).abs() < 1e-9);
        // Pattern still contributes fields the structured pass lacks.
        assert_eq!(result.street.unwrap().value, "Musterstr. 1");
        assert_eq!(result.country.unwrap().value, "Germany");
    }

    #[test]
    fn test_archive_multiplier_reduces_confidence() {
        let mut context = ctx();
        context.from_archive = true;
        let result = assemble(&[structured_pass()], &context);
        let name = result.legal_name.unwrap();
        assert!((name.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_equal_priority_higher_confidence_wins() {
        let mut low = Extraction::with_source(FieldSource::Pattern, 0.5);
        low.city = Some("Falschstadt".into());
        let mut high = Extraction::with_source(FieldSource::Pattern, 0.8);
        high.city = Some("München".into());
        let result = assemble(&[low, high], &ctx());
        assert_eq!(result.city.unwrap().value, "München");
    }

    #[test]
    fn test_tie_keeps_earlier_pass() {
        let mut first = Extraction::with_source(FieldSource::Pattern, 0.8);
        first.city = Some("Erststadt".into());
        let mut second = Extraction::with_source(FieldSource::Pattern, 0.8);
        second.city = Some("Zweitstadt".into());
        let result = assemble(&[first, second], &ctx());
        assert_eq!(result.city.unwrap().value, "Erststadt");
    }

    #[test]
    fn test_sets_deduplicate() {
        let mut pass = Extraction::with_source(FieldSource::Pattern, 0.8);
        pass.emails = vec!["info@example.de".into(), "info@example.de".into()];
        let result = assemble(&[pass], &ctx());
        assert_eq!(result.emails.unwrap().value.len(), 1);
    }

    #[test]
    fn test_overall_confidence_mean() {
        let result = assemble(&[pattern_pass(), structured_pass()], &ctx());
        // legal_name 1.0, street 0.8, country 0.8, phones 1.0 -> 0.9
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }
}
