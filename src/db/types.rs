use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Option keys a single-choice question may use, in positional order.
pub(crate) const OPTION_KEYS: [&str; 8] = ["A", "B", "C", "D", "E", "F", "G", "H"];
pub(crate) const MIN_OPTIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "questiontype", rename_all = "lowercase")]
pub(crate) enum QuestionType {
    Single,
    Essay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptstatus", rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    InProgress,
    Submitted,
    Finished,
    Abandoned,
}

impl AttemptStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::Finished => "finished",
            AttemptStatus::Abandoned => "abandoned",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in_progress" => Some(AttemptStatus::InProgress),
            "submitted" => Some(AttemptStatus::Submitted),
            "finished" => Some(AttemptStatus::Finished),
            "abandoned" => Some(AttemptStatus::Abandoned),
            _ => None,
        }
    }

    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, AttemptStatus::Finished | AttemptStatus::Abandoned)
    }

    /// `finished -> finished` is allowed so a resubmission can re-grade.
    pub(crate) fn can_transition_to(self, next: AttemptStatus) -> bool {
        match (self, next) {
            (AttemptStatus::InProgress, AttemptStatus::Submitted)
            | (AttemptStatus::InProgress, AttemptStatus::Finished)
            | (AttemptStatus::InProgress, AttemptStatus::Abandoned)
            | (AttemptStatus::Submitted, AttemptStatus::Finished)
            | (AttemptStatus::Submitted, AttemptStatus::Abandoned)
            | (AttemptStatus::Finished, AttemptStatus::Finished) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum QuestionOption {
    Text(String),
    Detailed { text: String },
}

impl QuestionOption {
    pub(crate) fn text(&self) -> &str {
        match self {
            QuestionOption::Text(text) => text,
            QuestionOption::Detailed { text } => text,
        }
    }
}

/// Options payload of a single-choice question: either a positional list
/// (keys `A`, `B`, ... by index) or an object keyed by option letter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum QuestionOptions {
    List(Vec<QuestionOption>),
    Keyed(BTreeMap<String, QuestionOption>),
}

impl QuestionOptions {
    pub(crate) fn len(&self) -> usize {
        match self {
            QuestionOptions::List(items) => items.len(),
            QuestionOptions::Keyed(items) => items.len(),
        }
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        match self {
            QuestionOptions::List(items) => {
                OPTION_KEYS.iter().take(items.len()).map(|key| key.to_string()).collect()
            }
            QuestionOptions::Keyed(items) => {
                items.keys().map(|key| key.to_ascii_uppercase()).collect()
            }
        }
    }

    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.keys().iter().any(|candidate| candidate.eq_ignore_ascii_case(key.trim()))
    }

    fn texts(&self) -> Vec<&str> {
        match self {
            QuestionOptions::List(items) => items.iter().map(QuestionOption::text).collect(),
            QuestionOptions::Keyed(items) => items.values().map(QuestionOption::text).collect(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), OptionsError> {
        let count = self.len();
        if count < MIN_OPTIONS {
            return Err(OptionsError::TooFew(count));
        }
        if count > OPTION_KEYS.len() {
            return Err(OptionsError::TooMany(count));
        }

        if let QuestionOptions::Keyed(items) = self {
            for key in items.keys() {
                if !OPTION_KEYS.iter().any(|allowed| allowed.eq_ignore_ascii_case(key)) {
                    return Err(OptionsError::UnknownKey(key.clone()));
                }
            }
            let mut normalized: Vec<String> =
                items.keys().map(|key| key.to_ascii_uppercase()).collect();
            normalized.sort();
            normalized.dedup();
            if normalized.len() != items.len() {
                return Err(OptionsError::DuplicateKey);
            }
        }

        if self.texts().iter().any(|text| text.trim().is_empty()) {
            return Err(OptionsError::BlankText);
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum OptionsError {
    #[error("at least {} options are required, got {0}", MIN_OPTIONS)]
    TooFew(usize),
    #[error("at most {} options are supported, got {0}", OPTION_KEYS.len())]
    TooMany(usize),
    #[error("option key '{0}' is not one of A-H")]
    UnknownKey(String),
    #[error("option keys must be unique regardless of case")]
    DuplicateKey,
    #[error("option text must not be blank")]
    BlankText,
}
