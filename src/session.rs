use chrono::{Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const DEFAULT_AGENCY_REP_NAME: &str = "The ATM Agency Representative";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern is valid")
});

pub fn is_valid_email(email: &str) -> bool {
    !email.is_empty() && EMAIL_PATTERN.is_match(email)
}

/// Everything one visitor has typed into the form. Lives for one request;
/// the browser resends it with every action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgreementSession {
    pub accepted: bool,
    pub client_name: String,
    pub client_rep_name: String,
    pub client_email: String,
    pub agency_rep_name: String,
    pub agency_email: Option<String>,
    pub governing_state: String,
    pub effective_date: NaiveDate,
}

impl Default for AgreementSession {
    fn default() -> Self {
        AgreementSession {
            accepted: false,
            client_name: String::new(),
            client_rep_name: String::new(),
            client_email: String::new(),
            agency_rep_name: DEFAULT_AGENCY_REP_NAME.to_string(),
            agency_email: None,
            governing_state: String::new(),
            effective_date: Local::now().date_naive(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    ClientName,
    ClientRepName,
    ClientEmail,
    GoverningState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: Field,
    pub message: &'static str,
}

impl AgreementSession {
    /// The agency address, if one was actually typed in.
    pub fn agency_email(&self) -> Option<&str> {
        self.agency_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }

    pub fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.client_name.trim().is_empty() {
            errors.push(FieldError {
                field: Field::ClientName,
                message: "Please enter the Client / Company name.",
            });
        }
        if self.client_rep_name.trim().is_empty() {
            errors.push(FieldError {
                field: Field::ClientRepName,
                message: "Please enter the Client representative name.",
            });
        }
        if !is_valid_email(&self.client_email) {
            errors.push(FieldError {
                field: Field::ClientEmail,
                message: "Please enter a valid client email.",
            });
        }
        if self.governing_state.trim().is_empty() {
            errors.push(FieldError {
                field: Field::GoverningState,
                message: "Please enter the governing state for law.",
            });
        }
        errors
    }

    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let errors = self.field_errors();
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    pub fn stage(&self) -> FlowStage {
        if !self.accepted {
            FlowStage::Unaccepted
        } else if self.field_errors().is_empty() {
            FlowStage::FormValid
        } else {
            FlowStage::FormIncomplete
        }
    }

    /// `Ad_Agreement_<client name with underscores>_<YYYYMMDD>.pdf`
    pub fn download_filename(&self, generated_on: NaiveDate) -> String {
        format!(
            "Ad_Agreement_{}_{}.pdf",
            self.client_name.trim().replace(' ', "_"),
            generated_on.format("%Y%m%d")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStage {
    Unaccepted,
    FormIncomplete,
    FormValid,
    AwaitingSignatures,
    SignaturesComplete,
    PdfGenerated,
    EmailAttempted,
    EmailSkipped,
}

impl FlowStage {
    pub fn with_signatures(self, client_signed: bool, agency_signed: bool) -> FlowStage {
        match self {
            FlowStage::FormValid if client_signed && agency_signed => FlowStage::SignaturesComplete,
            FlowStage::FormValid => FlowStage::AwaitingSignatures,
            other => other,
        }
    }
}
