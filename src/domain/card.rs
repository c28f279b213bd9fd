use crate::error::PaymentError;
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How many years ahead of the current year an expiry date may lie.
pub const MAX_EXPIRY_YEARS_AHEAD: i32 = 25;

/// Raw card details as supplied by the caller.
///
/// Only the encryption collaborator ever sees these fields at rest; everything else
/// works with [`CardData::last_four`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardData {
    pub card_number: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
    pub cvv: String,
    pub cardholder_name: String,
}

impl CardData {
    /// Structural validation. Separators (spaces, dashes) are stripped from the card number.
    pub fn validated(mut self) -> Result<Self, PaymentError> {
        let digits: String = self
            .card_number
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) || !(13..=19).contains(&digits.len()) {
            return Err(invalid("Invalid card number length"));
        }
        self.card_number = digits;

        if !(1..=12).contains(&self.expiry_month) {
            return Err(invalid("Invalid expiry month"));
        }

        let current_year = Utc::now().year();
        if !(current_year..=current_year + MAX_EXPIRY_YEARS_AHEAD).contains(&self.expiry_year) {
            return Err(invalid("Invalid expiry year"));
        }

        if !(3..=4).contains(&self.cvv.len()) || !self.cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("Invalid CVV"));
        }

        let name = self.cardholder_name.trim();
        if name.is_empty() || name.chars().count() > 100 {
            return Err(invalid("Invalid cardholder name"));
        }
        self.cardholder_name = name.to_string();

        Ok(self)
    }

    pub fn last_four(&self) -> String {
        let skip = self.card_number.chars().count().saturating_sub(4);
        self.card_number.chars().skip(skip).collect()
    }

    /// Card number with everything but the last four digits replaced by `*`.
    pub fn masked_number(&self) -> String {
        let len = self.card_number.chars().count();
        if len <= 4 {
            return "*".repeat(len);
        }
        format!("{}{}", "*".repeat(len - 4), self.last_four())
    }
}

fn invalid(message: &str) -> PaymentError {
    PaymentError::ValidationError(message.to_string())
}

impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardData")
            .field("card_number", &self.masked_number())
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .field("cvv", &"***")
            .field("cardholder_name", &self.cardholder_name)
            .finish()
    }
}

/// Opaque blob produced by a [`CardVault`](crate::domain::ports::CardVault).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedCard(pub String);
