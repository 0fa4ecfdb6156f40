//! Accession-number normalization.
//!
//! The same imaging order shows up under different textual forms across
//! the imaging archive, the report export, and the transfer manifests:
//! leading `*` markers, a site prefix in front of a date-coded `CT20..`
//! token, stray `CT` modality codes, and surrounding whitespace. All joins
//! between sources go through the normalized form produced here.

/// Strip `*` markers and the literal modality code, then trim.
///
/// This is the light normalization used when joining the image index to
/// the radiology report export, where both sides carry the same prefix
/// shape.
#[must_use]
pub fn strip_modality_markers(raw: &str) -> String {
    raw.replace('*', "").replace("CT", "").trim().to_string()
}

/// Fully normalize an accession for the transfer-manifest joins.
///
/// Drops everything up to and including the first date-coded `CT20`
/// token when one is present (the site prefix varies between sources),
/// removes any remaining `CT` modality codes, and trims whitespace.
///
/// Normalization is idempotent: applying it to an already-normalized
/// string returns it unchanged.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let stripped = raw.replace('*', "");
    let rest = match stripped.find("CT20") {
        Some(idx) => &stripped[idx + "CT20".len()..],
        None => stripped.as_str(),
    };
    rest.replace("CT", "").trim().to_string()
}

/// Reduce an archive accession to its trailing `CT`-prefixed report number.
///
/// Everything before the last `CT` token is the site prefix; the report
/// number used throughout the pipeline is `CT` plus whatever follows it.
#[must_use]
pub fn report_number(raw: &str) -> String {
    match raw.rfind("CT") {
        Some(idx) => format!("CT{}", &raw[idx + "CT".len()..]),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_marker_and_modality_code() {
        assert_eq!(strip_modality_markers("*CT 12345 "), "12345");
        assert_eq!(strip_modality_markers("CT12345"), "12345");
        assert_eq!(strip_modality_markers("12345"), "12345");
    }

    #[test]
    fn normalize_drops_site_prefix_through_dated_token() {
        assert_eq!(normalize("*NWMCT2021R12345"), "21R12345");
        assert_eq!(normalize("CT2023X0042 "), "23X0042");
        // No dated token: only the modality code goes.
        assert_eq!(normalize("*CT12345"), "12345");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["*NWMCT2021R12345", " CT2023X0042", "plain-key", "*CT12345"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn report_number_keeps_trailing_token() {
        assert_eq!(report_number("NWMHCT2021R12345"), "CT2021R12345");
        assert_eq!(report_number("no-token"), "no-token");
    }
}
