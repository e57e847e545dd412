//! Credential resolution and classification.
//!
//! A [`CredentialResolver`] turns reference data into an immutable
//! [`CredentialFilter`] for one page; a [`FuzzyCredentialClassifier`] then
//! matches OCR'd credential text against that filter.

mod classifier;
mod filter;
mod normalize;
mod resolver;
pub mod similarity;

pub use classifier::{CredentialMatch, FuzzyCredentialClassifier};
pub use filter::CredentialFilter;
pub use normalize::normalize_credential;
pub use resolver::CredentialResolver;
