//! Parsing model replies into typed results.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{OrganizationId, PageLabel};

static ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-*•]\s*(.+?)\s*,\s*(.+?)\s*$").expect("row regex should compile")
});

static COMPANY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)COMPANY_ID\s*:\s*(\d+)").expect("company regex should compile")
});

/// Rows and sponsor read from one signin page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedExtraction {
    /// `(name, credential)` in sheet order.
    pub rows: Vec<(String, String)>,
    /// Sponsor from the `COMPANY_ID` line, if the reply had one.
    pub organization: Option<OrganizationId>,
}

/// Parse markdown `- Name, Credential` lines and the `COMPANY_ID` trailer.
///
/// Lines that do not look like rows are ignored.
pub fn parse_extraction(text: &str) -> ParsedExtraction {
    let organization = COMPANY_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(OrganizationId);

    let rows = text
        .lines()
        .filter(|line| !COMPANY_RE.is_match(line))
        .filter_map(|line| {
            let caps = ROW_RE.captures(line)?;
            let name = caps.get(1)?.as_str().trim_matches('*').trim();
            let credential = caps.get(2)?.as_str().trim_matches('*').trim();
            if name.is_empty() || credential.is_empty() {
                return None;
            }
            Some((name.to_string(), credential.to_string()))
        })
        .collect();

    ParsedExtraction { rows, organization }
}

/// Parse a page-classification reply into exactly `expected` labels.
///
/// Accepts a JSON array of label strings or of `{"label": ...}` objects,
/// optionally wrapped in prose or a code fence.
pub fn parse_page_labels(text: &str, expected: usize) -> Result<Vec<PageLabel>, String> {
    let start = text.find('[').ok_or("reply has no JSON array")?;
    let end = text.rfind(']').ok_or("reply has no JSON array")?;
    if end < start {
        return Err("reply has no JSON array".to_string());
    }

    let values: Vec<serde_json::Value> = serde_json::from_str(&text[start..=end])
        .map_err(|e| format!("invalid JSON array: {}", e))?;

    if values.len() != expected {
        return Err(format!(
            "expected {} labels, reply has {}",
            expected,
            values.len()
        ));
    }

    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let raw = match value {
                serde_json::Value::String(s) => Some(s.as_str()),
                serde_json::Value::Object(obj) => obj.get("label").and_then(|v| v.as_str()),
                _ => None,
            };
            raw.and_then(PageLabel::from_str)
                .ok_or_else(|| format!("unrecognized label for page {}: {}", i + 1, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extraction_rows_and_company() {
        let reply = "Here you go:\n- ADA LOVELACE, M.D.\n- Grace Hopper , NP\n* Alan Turing, PharmD\nnot a row\n\nCOMPANY_ID: 2\n";
        let parsed = parse_extraction(reply);
        assert_eq!(
            parsed.rows,
            vec![
                ("ADA LOVELACE".to_string(), "M.D.".to_string()),
                ("Grace Hopper".to_string(), "NP".to_string()),
                ("Alan Turing".to_string(), "PharmD".to_string()),
            ]
        );
        assert_eq!(parsed.organization, Some(OrganizationId(2)));
    }

    #[test]
    fn test_parse_extraction_without_company() {
        let parsed = parse_extraction("- Jane Smith, RN");
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.organization, None);
    }

    #[test]
    fn test_company_line_is_not_a_row() {
        let parsed = parse_extraction("- COMPANY_ID: 3, extra");
        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.organization, Some(OrganizationId(3)));
    }

    #[test]
    fn test_parse_labels_from_fenced_reply() {
        let reply = "```json\n[\"dinein\", \"signin\", {\"page\": 3, \"label\": \"SIGNIN\"}]\n```";
        let labels = parse_page_labels(reply, 3).unwrap();
        assert_eq!(
            labels,
            vec![PageLabel::Dinein, PageLabel::Signin, PageLabel::Signin]
        );
    }

    #[test]
    fn test_parse_labels_rejects_wrong_count() {
        assert!(parse_page_labels("[\"signin\"]", 2).is_err());
        assert!(parse_page_labels("signin", 1).is_err());
        assert!(parse_page_labels("[\"lunch\"]", 1).is_err());
    }
}
