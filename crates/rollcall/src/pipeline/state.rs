//! Per-page state machine for the OCR Extraction Stage.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::PageRef;

/// Where a page is in OCR extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Pending,
    Preprocessing,
    Extracting,
    Classifying,
    Done,
    Failed,
}

impl PageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Preprocessing => "preprocessing",
            Self::Extracting => "extracting",
            Self::Classifying => "classifying",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The state after this one on the success path.
    fn next(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Preprocessing),
            Self::Preprocessing => Some(Self::Extracting),
            Self::Extracting => Some(Self::Classifying),
            Self::Classifying => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("page {page}: cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub page: PageRef,
    pub from: PageState,
    pub to: PageState,
}

/// Tracks one page through extraction. Transitions only move forward.
#[derive(Debug, Clone)]
pub struct PageRun {
    page: PageRef,
    state: PageState,
    error: Option<String>,
}

impl PageRun {
    pub fn new(page: PageRef) -> Self {
        Self {
            page,
            state: PageState::Pending,
            error: None,
        }
    }

    pub fn page(&self) -> &PageRef {
        &self.page
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Move to the next success-path state, which must be `to`.
    pub fn advance(&mut self, to: PageState) -> Result<(), InvalidTransition> {
        if self.state.next() != Some(to) || to == PageState::Failed {
            return Err(InvalidTransition {
                page: self.page.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Fail from any non-terminal state.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        if self.state.is_terminal() {
            return Err(InvalidTransition {
                page: self.page.clone(),
                from: self.state,
                to: PageState::Failed,
            });
        }
        self.state = PageState::Failed;
        self.error = Some(error.into());
        Ok(())
    }
}
