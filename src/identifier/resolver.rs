//! Converge on at most one canonical identifier per sample

use strsim::normalized_levenshtein;
use tracing::{info, warn};

use super::{prefix, short_form};

/// Similarity below which an OCR reading is reported as disagreeing with
/// the adopted identifier
const OCR_AGREEMENT_THRESHOLD: f64 = 0.8;

/// Outcome of identifier resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one distinct candidate
    Resolved(String),
    /// No candidates at all
    Missing,
    /// Several distinct candidates; none is adopted
    Ambiguous(Vec<String>),
}

impl Resolution {
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Resolution::Resolved(id) => Some(id),
            _ => None,
        }
    }
}

/// Whether two readings name the same specimen: equal, or equal short
/// forms where at least one side carries no URI prefix
fn same_specimen(a: &str, b: &str) -> bool {
    a == b || ((prefix(a).is_none() || prefix(b).is_none()) && short_form(a) == short_form(b))
}

/// Resolve the identifier of sample `name`.
///
/// Candidates are the decoded barcode payloads plus any identifier already
/// on the sample. A bare short form and the full URI it abbreviates count
/// as one candidate, kept in its full form. OCR identifiers are only
/// consulted when `ocr_fallback` is set and there are no other candidates,
/// and then only a single distinct reading is adopted.
pub fn resolve(
    name: &str,
    barcodes: &[String],
    existing: Option<&str>,
    ocr_identifiers: &[String],
    ocr_fallback: bool,
) -> Resolution {
    let mut candidates: Vec<String> = Vec::new();
    for candidate in barcodes.iter().map(String::as_str).chain(existing) {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            continue;
        }
        match candidates.iter_mut().find(|c| same_specimen(c.as_str(), candidate)) {
            Some(kept) if prefix(kept.as_str()).is_none() => *kept = candidate.to_string(),
            Some(_) => {}
            None => candidates.push(candidate.to_string()),
        }
    }

    match candidates.len() {
        0 => resolve_from_ocr(name, ocr_identifiers, ocr_fallback),
        1 => {
            let identifier = candidates.remove(0);
            report_ocr_disagreement(name, &identifier, ocr_identifiers);
            Resolution::Resolved(identifier)
        }
        _ => {
            warn!("{}: ambiguous identifier, candidates {:?}", name, candidates);
            Resolution::Ambiguous(candidates)
        }
    }
}

fn resolve_from_ocr(name: &str, ocr_identifiers: &[String], ocr_fallback: bool) -> Resolution {
    if ocr_fallback {
        match ocr_identifiers {
            [single] => {
                info!("{}: identifier {} taken from OCR text", name, single);
                return Resolution::Resolved(single.clone());
            }
            [] => {}
            several => {
                warn!("{}: OCR text holds several identifiers {:?}", name, several);
                return Resolution::Ambiguous(several.to_vec());
            }
        }
    }
    warn!("{}: no identifier found", name);
    Resolution::Missing
}

fn report_ocr_disagreement(name: &str, identifier: &str, ocr_identifiers: &[String]) {
    let short = short_form(identifier);
    for read in ocr_identifiers {
        let similarity = normalized_levenshtein(short, read);
        if similarity < OCR_AGREEMENT_THRESHOLD {
            warn!(
                "{}: OCR read {} but barcode says {} (similarity {:.2})",
                name, read, short, similarity
            );
        }
    }
}
