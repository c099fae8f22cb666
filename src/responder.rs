//! Outbound SMS replies
//!
//! Long replies are split into concatenated-SMS parts. Send failures are
//! logged and dropped; nothing here retries.

use crate::config::{GSM7_PART_LEN, SINGLE_SEGMENT_LIMIT, UCS2_PART_LEN};
use crate::platform::SmsTransport;
use std::sync::Arc;
use tracing::{debug, error};

/// What happened to a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Single,
    Multipart(usize),
    Failed,
}

#[derive(Clone)]
pub struct Responder {
    sms: Arc<dyn SmsTransport>,
}

impl Responder {
    pub fn new(sms: Arc<dyn SmsTransport>) -> Self {
        Self { sms }
    }

    pub fn send(&self, destination: &str, message: &str) -> SendOutcome {
        let (result, outcome) = if message.chars().count() > SINGLE_SEGMENT_LIMIT {
            let parts = divide_message(message);
            let count = parts.len();
            (
                self.sms.send_multipart(destination, &parts),
                SendOutcome::Multipart(count),
            )
        } else {
            (self.sms.send_text(destination, message), SendOutcome::Single)
        };

        match result {
            Ok(()) => {
                debug!(destination = %destination, ?outcome, "SMS response sent");
                outcome
            }
            Err(e) => {
                error!("Error sending SMS response to {}: {}", destination, e);
                SendOutcome::Failed
            }
        }
    }
}

/// Split text the way the SMS stack does for concatenated messages.
///
/// GSM-7 parts hold `GSM7_PART_LEN` septets, where escape-table characters
/// take two. Anything outside GSM 03.38 sends the whole message as UCS-2,
/// `UCS2_PART_LEN` code units per part.
pub fn divide_message(message: &str) -> Vec<String> {
    if message.chars().all(|c| gsm7_septets(c).is_some()) {
        chunk_by(message, GSM7_PART_LEN, |c| gsm7_septets(c).unwrap_or(2))
    } else {
        chunk_by(message, UCS2_PART_LEN, char::len_utf16)
    }
}

/// Greedy split keeping each part within `budget` units
fn chunk_by(message: &str, budget: usize, cost: impl Fn(char) -> usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut used = 0;

    for c in message.chars() {
        let units = cost(c);
        if used + units > budget && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(c);
        used += units;
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Septets a character costs in the GSM 03.38 default alphabet, `None`
/// when it needs UCS-2
pub fn gsm7_septets(c: char) -> Option<usize> {
    match c {
        'A'..='Z' | 'a'..='z' | '0'..='9' => Some(1),
        ' ' | '!' | '"' | '#' | '$' | '%' | '&' | '\'' | '(' | ')' | '*' | '+' | ','
        | '-' | '.' | '/' | ':' | ';' | '<' | '=' | '>' | '?' | '@' | '_' | '\n'
        | '\r' => Some(1),
        '£' | '¥' | 'è' | 'é' | 'ù' | 'ì' | 'ò' | 'Ç' | 'Ø' | 'ø' | 'Å' | 'å' | 'Δ' | 'Φ'
        | 'Γ' | 'Λ' | 'Ω' | 'Π' | 'Ψ' | 'Σ' | 'Θ' | 'Ξ' | 'Æ' | 'æ' | 'ß' | 'É' | '¤'
        | '¡' | 'Ä' | 'Ö' | 'Ñ' | 'Ü' | '§' | '¿' | 'ä' | 'ö' | 'ñ' | 'ü' | 'à' => Some(1),
        // Escape table
        '{' | '}' | '[' | ']' | '\\' | '^' | '~' | '|' | '€' | '\u{0C}' => Some(2),
        _ => None,
    }
}
