//! Supported document kinds.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of document being extracted, chosen by the caller per request.
///
/// Determines which instruction is sent to the oracle and which field
/// normaliser (if any) runs on its output. The wire names are the lower
/// snake-case strings accepted by [`DocumentType::from_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// National identity card.
    Ic,
    Passport,
    /// Cash-deposit receipt.
    CashDeposit,
    /// Bank-transfer receipt.
    BankTransfer,
    /// Company-registration form (SSM Form D).
    SsmFormD,
    UtilityBill,
}

impl DocumentType {
    /// Every supported type, in declaration order.
    pub const ALL: [DocumentType; 6] = [
        DocumentType::Ic,
        DocumentType::Passport,
        DocumentType::CashDeposit,
        DocumentType::BankTransfer,
        DocumentType::SsmFormD,
        DocumentType::UtilityBill,
    ];

    /// The wire name, e.g. `"ssm_form_d"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Ic => "ic",
            DocumentType::Passport => "passport",
            DocumentType::CashDeposit => "cash_deposit",
            DocumentType::BankTransfer => "bank_transfer",
            DocumentType::SsmFormD => "ssm_form_d",
            DocumentType::UtilityBill => "utility_bill",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ExtractError::UnsupportedType {
                value: s.to_string(),
            })
    }
}
