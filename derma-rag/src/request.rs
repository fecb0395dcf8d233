//! Request and response types of the consultation operation.

use serde::{Deserialize, Serialize};

use crate::error::ConsultationError;

/// One consultation about a predicted skin condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsultationRequest {
    /// Predicted disease; must name a corpus topic.
    pub disease_name: String,
    /// Whether the patient has a fever.
    pub fever_status: bool,
    /// Whether the affected area is bleeding.
    pub blooding_status: bool,
    /// Patient age in years.
    pub age: u32,
    /// Free-text symptoms; used as the retrieval query.
    pub symptoms: String,
}

impl ConsultationRequest {
    /// Reject requests that cannot be answered.
    ///
    /// # Errors
    ///
    /// Returns [`ConsultationError::InvalidRequest`] if `disease_name` or
    /// `symptoms` is blank.
    pub fn validate(&self) -> Result<(), ConsultationError> {
        if self.disease_name.trim().is_empty() {
            return Err(ConsultationError::InvalidRequest("disease_name must not be empty".into()));
        }
        if self.symptoms.trim().is_empty() {
            return Err(ConsultationError::InvalidRequest("symptoms must not be empty".into()));
        }
        Ok(())
    }
}

/// The language model's answer, returned verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedAnswer {
    /// Raw model output.
    #[serde(rename = "answer_text")]
    pub text: String,
    /// Model that produced the answer.
    #[serde(skip)]
    pub model: String,
}
