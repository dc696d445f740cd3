//! Extraction instructions sent to the oracle, one per document type.
//!
//! The instruction text *is* the schema: each one names the exact JSON keys
//! the oracle should return. Keeping them together here means a new field or
//! a new document type is a one-place change, and unit tests can inspect the
//! wording without spinning up a model.
//!
//! Callers can override any entry through [`InstructionRegistry::with_instruction`]
//! (the CLI exposes this as `--instruction-file`).

use crate::document::DocumentType;
use crate::error::ExtractError;
use std::collections::HashMap;

/// Malaysian identity card.
pub const IC_INSTRUCTION: &str = "Analyze the image and respond with key information in RESTful API JSON format. \
If the image is a Malaysian IC, extract: fullName, icNumber, address, nationality, and gender.";

/// Passport data page. `countryCode` feeds the passport-number normaliser.
pub const PASSPORT_INSTRUCTION: &str = r#"Input: a scan or photo of a passport.
Task: Extract exactly these fields as JSON:
  "fullName": string,
  "passportNumber": string,
  "nationality": string,
  "countryCode": string (ISO 3166-1 alpha-3 issuing state, as printed in the MRZ),
  "dateOfBirth": string (ISO 8601 date),
  "expiryDate": string (ISO 8601 date),
Then assess authenticity and include:
  "authenticityConfidence": float  (0.0=fake, 1.0=real)
Output: Valid JSON only. No markdown, no prose, no explanations.
"#;

/// Shared by cash-deposit and bank-transfer receipts.
pub const RECEIPT_INSTRUCTION: &str = r#"Input: a photo or PDF of a cash-deposit or bank-transfer receipt.
Task: Extract exactly these fields as JSON:
  "date": string (ISO 8601 date),
  "time": string (HH:MM:SS),
  "referenceNumber": string,
  "totalAmount": number,
  "currency": string (ISO 4217 code),
  "senderAccountNumber": string,
  "senderName": string,
  "receiverAccountNumber": string,
  "receiverName": string,
  "accountType": string,
  "transactionType": string,
  "branchName": string
Output: Valid JSON only. No markdown, no prose, no explanations.
"#;

/// Company-registration form (SSM Form D).
pub const SSM_FORM_D_INSTRUCTION: &str = r#"Input: a scan of a Malaysian SSM business registration certificate (Form D).
Task: Extract exactly these fields as JSON:
  "businessName": string,
  "registrationNumber": string (the 12-digit registration number only),
  "oldRegistrationNumber": string (the older format, e.g. "RT0069300-M"),
  "registrationDate": string (ISO 8601 date),
  "expiryDate": string (ISO 8601 date),
  "businessAddress": string,
  "ownerNames": array of strings
Output: Valid JSON only. No markdown, no prose, no explanations.
"#;

/// Utility bill (electricity, water, telecom).
pub const UTILITY_BILL_INSTRUCTION: &str = r#"Input: a photo or PDF of a utility bill.
Task: Extract exactly these fields as JSON:
  "providerName": string,
  "accountNumber": string,
  "accountHolderName": string,
  "serviceAddress": string,
  "billDate": string (ISO 8601 date),
  "dueDate": string (ISO 8601 date),
  "totalAmount": number,
  "currency": string (ISO 4217 code)
Output: Valid JSON only. No markdown, no prose, no explanations.
"#;

/// Lookup from [`DocumentType`] to instruction text.
///
/// A missing entry for a valid type is a deployment defect and surfaces as
/// [`ExtractError::Configuration`], never as a request error.
#[derive(Debug, Clone)]
pub struct InstructionRegistry {
    entries: HashMap<DocumentType, String>,
}

impl Default for InstructionRegistry {
    fn default() -> Self {
        let entries = DocumentType::ALL
            .into_iter()
            .map(|t| (t, default_instruction(t).to_string()))
            .collect();
        Self { entries }
    }
}

impl InstructionRegistry {
    /// A registry with no entries. Useful for deployments that supply every
    /// instruction from their own configuration.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register (or replace) the instruction for `doc_type`.
    pub fn with_instruction(mut self, doc_type: DocumentType, text: impl Into<String>) -> Self {
        self.entries.insert(doc_type, text.into());
        self
    }

    /// Drop the instruction for `doc_type`.
    pub fn without(mut self, doc_type: DocumentType) -> Self {
        self.entries.remove(&doc_type);
        self
    }

    /// Resolve the instruction for `doc_type`.
    pub fn lookup(&self, doc_type: DocumentType) -> Result<&str, ExtractError> {
        self.entries
            .get(&doc_type)
            .map(String::as_str)
            .ok_or_else(|| {
                ExtractError::Configuration(format!(
                    "no extraction instruction registered for document type '{}'",
                    doc_type
                ))
            })
    }
}

/// The built-in instruction for a document type.
pub fn default_instruction(doc_type: DocumentType) -> &'static str {
    match doc_type {
        DocumentType::Ic => IC_INSTRUCTION,
        DocumentType::Passport => PASSPORT_INSTRUCTION,
        DocumentType::CashDeposit | DocumentType::BankTransfer => RECEIPT_INSTRUCTION,
        DocumentType::SsmFormD => SSM_FORM_D_INSTRUCTION,
        DocumentType::UtilityBill => UTILITY_BILL_INSTRUCTION,
    }
}
