//! Short identifiers read from OCR text
//!
//! Only identifiers printed after an `id.luomus.fi` / `tun.fi` URI count,
//! so label dates such as `12.VII.1998` never match. OCR garbles the URI,
//! letter-spaces namespaces and serials, and misreads the dot as a comma or
//! colon; the match tolerates that and normalises to `NS.NUMBER`.

use regex::Regex;
use std::sync::OnceLock;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?x)
            [dhtnluomsfi1,.:/\ ]{5,}            # id.luomus.fi/ or tun.fi/, with OCR errors
            [^A-Za-z0-9]*?                      # stray signs between URI and namespace
            (?P<ns>[A-Z](?:[\ ]?[A-Z]){0,5})    # namespace, possibly letter-spaced
            \s*[.,:]\s*                         # separator (often misread)
            (?P<number>[0-9](?:[\ ]{0,2}[0-9])*) # serial, possibly digit-spaced
            \b",
        )
        .expect("identifier pattern is valid")
    })
}

/// Every short identifier found in `text`, in order of appearance, without
/// duplicates
pub fn identifiers_from_text(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for caps in identifier_pattern().captures_iter(text) {
        let ns: String = caps["ns"].chars().filter(|c| !c.is_whitespace()).collect();
        let number: String = caps["number"].chars().filter(|c| !c.is_whitespace()).collect();
        let id = format!("{}.{}", ns, number);
        if !found.contains(&id) {
            found.push(id);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spaced_namespace_and_serial() {
        let text = "htto://id. luom us.fi/ ¢@\nG P .83  693\nBombus ° |\nquadricolor (Lep.)\ndet. J. Paukkunen 2012";
        assert_eq!(identifiers_from_text(text), vec!["GP.83693"]);
    }

    #[test]
    fn test_comma_for_dot() {
        assert_eq!(identifiers_from_text("http://tun.fi/GP,83684 Bombus"), vec!["GP.83684"]);
    }

    #[test]
    fn test_no_identifier() {
        assert!(identifiers_from_text("Bombus quadricolor (Lep.) det. J. Paukkunen 2012").is_empty());
        assert!(identifiers_from_text("").is_empty());
    }

    #[test]
    fn test_duplicates_are_collapsed() {
        let found = identifiers_from_text("tun.fi/GP.1 and again tun.fi/GP.1, then id.luomus.fi/HA.22");
        assert_eq!(found, vec!["GP.1", "HA.22"]);
    }

    #[test]
    fn test_identifier_needs_uri_context() {
        assert!(identifiers_from_text("label GP.83684 Bombus").is_empty());
    }

    #[test]
    fn test_roman_numeral_date_is_not_an_identifier() {
        let text = "FINLAND Ab: Turku 12.VII.1998 leg. J. Virtanen";
        assert!(identifiers_from_text(text).is_empty());
        let text = "http://id.luomus.fi/\nGP.83693\nTurku 12.VII.1998";
        assert_eq!(identifiers_from_text(text), vec!["GP.83693"]);
    }

    #[test]
    fn test_lowercase_context_does_not_match() {
        assert!(identifiers_from_text("pS.) 1903. http://id. luomus.fi/ d").is_empty());
    }
}
