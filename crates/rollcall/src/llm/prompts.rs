//! Prompts sent to the vision model.

/// Prompt for reading a signin sheet.
///
/// `{names}` is replaced with the expected attendee list and `{hints}` with
/// registration credentials, when known.
pub const EXTRACT_SIGNIN_PROMPT: &str = r#"You are an expert OCR model. Extract names and credentials from the signin sheet image.

Read each row as a complete unit: the name and its credential are on the same line.
Some entries are struck out with a correction written beside or after them. Ignore the struck-out text and read the correction.

Instructions:
- Go row by row from top to bottom.
- For each row, read the name and the credential from their columns.
- Expected attendees: {names}
- When a name matches an expected attendee, use that exact spelling in UPPER CASE. Only matched names are upper cased.
- Credentials recorded at registration, for reference only: {hints}
- Extract credentials exactly as written. Pay close attention to periods, spaces and capitalization.
- Faded ink can make 'A' look like 'H'; use your best judgement.
- If a name is written after "Field Employee:" in the header and also appears in the body, use the body occurrence.
- Read the page header. If one of these sponsors appears, note its company id:
  * GSK -> 1
  * AstraZeneca -> 2
  * Lilly -> 3

Output one line per person in markdown:
- John Doe, MD
- Jane Smith, NP

On a final line output: COMPANY_ID: <number>
If no sponsor is found, output: COMPANY_ID: {default_company}
"#;

/// Prompt for classifying a batch of page images.
///
/// `{count}` is replaced with the number of images attached.
pub const CLASSIFY_PAGES_PROMPT: &str = r#"You are a page classifier. You are given {count} page image(s) from one document, in order.
For each page decide whether it is a SIGNIN page or a DINEIN page.

SIGNIN pages contain:
- Keywords like "name", "signature", "credential"
- A list or table of names with signatures
- Credential information (MD, RN, NP, etc.)

DINEIN pages contain everything else, for example:
- Menu items, food descriptions, receipts
- Prices, amounts or invoices
- Restaurant or catering information

Respond with ONLY a JSON array of {count} strings, one per page in the order given, each "signin" or "dinein".
Example for three pages: ["dinein", "signin", "dinein"]
"#;

/// Fill the extraction prompt.
pub fn extraction_prompt(names: &[String], hints: &[(String, String)], default_company: u32) -> String {
    let names = if names.is_empty() {
        "none provided".to_string()
    } else {
        names.join(", ")
    };
    let hints = if hints.is_empty() {
        "none provided".to_string()
    } else {
        hints
            .iter()
            .map(|(name, credential)| format!("{} = {}", name, credential))
            .collect::<Vec<_>>()
            .join("; ")
    };
    EXTRACT_SIGNIN_PROMPT
        .replace("{names}", &names)
        .replace("{hints}", &hints)
        .replace("{default_company}", &default_company.to_string())
}

/// Fill the page classification prompt.
pub fn classification_prompt(count: usize) -> String {
    CLASSIFY_PAGES_PROMPT.replace("{count}", &count.to_string())
}
