//! Single-credential classification command.

use console::style;

use rollcall::config::Settings;
use rollcall::credentials::{CredentialResolver, FuzzyCredentialClassifier};
use rollcall::models::OrganizationId;

use super::helpers::reference_store;

/// Classify one credential string the way a page's records are classified.
pub async fn cmd_match(
    settings: &Settings,
    credential: &str,
    org: u32,
    state: Option<&str>,
) -> anyhow::Result<()> {
    let store = reference_store(settings)?;
    let filter = CredentialResolver::new(store, settings.credentials.always_valid.clone())
        .resolve(OrganizationId(org), state)
        .await?;
    let classifier = FuzzyCredentialClassifier::new(&settings.credentials);
    let m = classifier.classify_one(credential, &filter);

    println!("{} {:?}", style("→").cyan(), credential);
    println!("  Standardized: {}", m.standardized);
    println!("  Category:     {}", m.category);
    println!("  Method:       {}", m.method);
    println!("  Score:        {}", m.score);
    println!(
        "  {}",
        style(format!(
            "{} candidate credentials for organization {}{}",
            filter.len(),
            org,
            state.map(|s| format!(" in {}", s)).unwrap_or_default()
        ))
        .dim()
    );
    Ok(())
}
