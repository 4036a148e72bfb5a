//! Validator stage: rejects malformed input before any ciphertext is minted
//! or I/O happens. Every violation of a call is collected and reported
//! together, so the caller sees the complete list rather than the first
//! failure.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};

use keeper_core::error::{Error, Result};
use keeper_core::model::{Binary, Card, Login, Note, SecretVisitor};

use super::Stage;

const MIN_LOGIN_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 6;
const MIN_CARD_NUMBER_LEN: usize = 13;
const MAX_CARD_NUMBER_LEN: usize = 19;
const MIN_CVC_LEN: usize = 3;
const MAX_CVC_LEN: usize = 4;

/// How far into the future a card expiry year may lie.
const MAX_EXPIRY_YEARS_AHEAD: u16 = 20;

/// Type-specific input validation.
pub struct Validator {
    now: DateTime<Utc>,
}

impl Validator {
    /// Validator anchored on the wall clock.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Validator anchored on an injected instant. The card expiry window is
    /// relative to `now`, so tests pin it.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    fn validate_expiry(&self, month: u8, year: u16) -> Option<String> {
        let current_year = self.now.year() as u16;
        let current_month = self.now.month() as u8;

        if !(1..=12).contains(&month) {
            return Some("invalid month".into());
        }
        if year < current_year || year > current_year + MAX_EXPIRY_YEARS_AHEAD {
            return Some("invalid year".into());
        }
        if year == current_year && month < current_month {
            return Some("card is expired".into());
        }
        None
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

fn all_digits(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(u8::is_ascii_digit)
}

fn join(violations: Vec<String>) -> Result<()> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(violations.join("; ")))
    }
}

#[async_trait]
impl SecretVisitor for Validator {
    async fn visit_login(&mut self, login: &mut Login) -> Result<()> {
        let mut violations = Vec::new();

        if login.login.len() < MIN_LOGIN_LEN {
            violations.push(format!("login should be at least {MIN_LOGIN_LEN} characters"));
        }
        if login.password.len() < MIN_PASSWORD_LEN {
            violations.push(format!(
                "password should be at least {MIN_PASSWORD_LEN} characters"
            ));
        }

        join(violations)
    }

    async fn visit_card(&mut self, card: &mut Card) -> Result<()> {
        let mut violations = Vec::new();

        let number_len = card.number.len();
        if !(MIN_CARD_NUMBER_LEN..=MAX_CARD_NUMBER_LEN).contains(&number_len) {
            violations.push(format!(
                "card number length should be between {MIN_CARD_NUMBER_LEN} and {MAX_CARD_NUMBER_LEN}"
            ));
        }
        if !all_digits(&card.number) {
            violations.push("card number must contain only digits".into());
        }

        if let Some(violation) = self.validate_expiry(card.expiry_month, card.expiry_year) {
            violations.push(violation);
        }

        if !all_digits(&card.cvc) {
            violations.push("CVC must contain only digits".into());
        }
        let cvc_len = card.cvc.len();
        if !(MIN_CVC_LEN..=MAX_CVC_LEN).contains(&cvc_len) {
            violations.push(format!(
                "CVC length should be between {MIN_CVC_LEN} and {MAX_CVC_LEN}"
            ));
        }

        join(violations)
    }

    async fn visit_note(&mut self, _note: &mut Note) -> Result<()> {
        Ok(())
    }

    async fn visit_binary(&mut self, _binary: &mut Binary) -> Result<()> {
        Ok(())
    }
}

impl Stage for Validator {
    fn name(&self) -> &'static str {
        "validator"
    }
}
