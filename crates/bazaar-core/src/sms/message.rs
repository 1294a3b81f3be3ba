//! Message normalization and part counting.
//!
//! ```text
//!            ASCII only          anything else
//!            ──────────          ─────────────
//!  ≤ limit   160 chars/part      70 chars/part
//!  > limit   153 chars/part      67 chars/part   (concatenation header)
//!
//!  total parts = ⌈chars / part length⌉ × receivers
//! ```

use serde::{Deserialize, Serialize};

use super::OutgoingSms;
use crate::error::ValidationError;

/// Single-part limit for ASCII text.
pub const TEXT_PART_LEN: usize = 160;
/// Per-part length of a multipart ASCII text.
pub const TEXT_MULTIPART_LEN: usize = 153;
/// Single-part limit for unicode text.
pub const UNICODE_PART_LEN: usize = 70;
/// Per-part length of a multipart unicode text.
pub const UNICODE_MULTIPART_LEN: usize = 67;

/// Encoding requested by an API caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Unicode,
}

impl MessageType {
    /// Parses the developer API `type` parameter.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "text" => Ok(MessageType::Text),
            "unicode" => Ok(MessageType::Unicode),
            _ => Err(ValidationError::NotAllowed {
                field: "type".to_string(),
                allowed: vec!["text".to_string(), "unicode".to_string()],
            }),
        }
    }

    /// Type a gateway should be told for this message body.
    pub fn detect(message: &str) -> Self {
        if is_english(message) {
            MessageType::Text
        } else {
            MessageType::Unicode
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Unicode => "unicode",
        }
    }
}

/// Unifies line endings to `\n` and trims surrounding whitespace.
pub fn normalize_message(message: &str) -> String {
    message
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .trim()
        .to_string()
}

/// True when every character is 7-bit ASCII.
pub fn is_english(message: &str) -> bool {
    message.is_ascii()
}

/// Characters per part for this message.
pub fn part_length(message: &str) -> usize {
    let len = message.chars().count();
    if is_english(message) {
        if len > TEXT_PART_LEN {
            TEXT_MULTIPART_LEN
        } else {
            TEXT_PART_LEN
        }
    } else if len > UNICODE_PART_LEN {
        UNICODE_MULTIPART_LEN
    } else {
        UNICODE_PART_LEN
    }
}

/// Number of billable parts for one receiver.
pub fn part_count(message: &str) -> i64 {
    let len = message.chars().count();
    len.div_ceil(part_length(message)) as i64
}

/// Splits a receiver list on commas and whitespace, dropping empties.
pub fn split_receivers(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Price quote for sending one message to a set of receivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageQuote {
    /// Normalized message body.
    pub message: String,
    pub message_type: MessageType,
    pub parts_per_receiver: i64,
    pub receivers: Vec<String>,
    pub total_parts: i64,
}

impl MessageQuote {
    /// Normalizes the message and counts parts over all receivers.
    ///
    /// ## Example
    /// ```rust
    /// use bazaar_core::sms::message::MessageQuote;
    ///
    /// let quote = MessageQuote::new("Hello\r\nworld ", "01711000000, 01811000000");
    /// assert_eq!(quote.message, "Hello\nworld");
    /// assert_eq!(quote.total_parts, 2);
    /// ```
    pub fn new(message: &str, receivers: &str) -> Self {
        let message = normalize_message(message);
        let receivers = split_receivers(receivers);
        let parts_per_receiver = part_count(&message);
        Self {
            message_type: MessageType::detect(&message),
            total_parts: parts_per_receiver * receivers.len() as i64,
            parts_per_receiver,
            receivers,
            message,
        }
    }
}

/// One row of a panel upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRow {
    pub receiver: String,
    pub message: String,
}

/// How an uploaded sheet maps rows to messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Every row carries its own message; rows missing either cell are skipped.
    #[default]
    Batch,
    /// A message applies to its own row and every following row with a blank
    /// message cell, until the next message.
    Broadcast,
}

/// Turns uploaded rows into messages ready to charge.
///
/// Rows with a blank receiver never count. In broadcast mode they do not
/// break the fill either, and receivers listed before the first message
/// are skipped.
///
/// ```rust
/// use bazaar_core::sms::message::{prepare_rows, BatchMode, BatchRow};
///
/// let row = |r: &str, m: &str| BatchRow { receiver: r.into(), message: m.into() };
/// let rows = [row("0171", "Eid sale"), row("0181", ""), row("0191", "")];
/// assert_eq!(prepare_rows(&rows, BatchMode::Broadcast).len(), 3);
/// assert_eq!(prepare_rows(&rows, BatchMode::Batch).len(), 1);
/// ```
pub fn prepare_rows(rows: &[BatchRow], mode: BatchMode) -> Vec<OutgoingSms> {
    let mut current: Option<String> = None;
    rows.iter()
        .filter(|row| !row.receiver.trim().is_empty())
        .filter_map(|row| {
            let message = normalize_message(&row.message);
            let message = match mode {
                BatchMode::Batch => (!message.is_empty()).then_some(message)?,
                BatchMode::Broadcast => {
                    if !message.is_empty() {
                        current = Some(message);
                    }
                    current.clone()?
                }
            };
            Some(OutgoingSms {
                receiver: row.receiver.trim().to_string(),
                msg_part_count: part_count(&message),
                message,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(receiver: &str, message: &str) -> BatchRow {
        BatchRow {
            receiver: receiver.into(),
            message: message.into(),
        }
    }

    #[test]
    fn test_batch_rows_skip_blank_cells() {
        let rows = [row("0171", "Hi"), row("", "orphan"), row("0181", "  "), row(" 0191 ", "Bye\r\n")];
        let out = prepare_rows(&rows, BatchMode::Batch);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].receiver, "0191");
        assert_eq!(out[1].message, "Bye");
    }

    #[test]
    fn test_broadcast_fills_down() {
        let rows = [
            row("0161", ""),
            row("0171", "First"),
            row("", "Second"),
            row("0181", ""),
            row("0191", "Third"),
            row("0151", ""),
        ];
        let out = prepare_rows(&rows, BatchMode::Broadcast);
        let pairs: Vec<(&str, &str)> = out.iter().map(|o| (o.receiver.as_str(), o.message.as_str())).collect();
        // a message on a row without receiver is dropped with its row
        assert_eq!(
            pairs,
            vec![("0171", "First"), ("0181", "First"), ("0191", "Third"), ("0151", "Third")]
        );
        assert!(out.iter().all(|o| o.msg_part_count == 1));
    }

    #[test]
    fn test_normalize_message() {
        assert_eq!(normalize_message("  a\r\nb\rc \n"), "a\nb\nc");
    }

    #[test]
    fn test_part_count_ascii() {
        assert_eq!(part_count(&"a".repeat(1)), 1);
        assert_eq!(part_count(&"a".repeat(160)), 1);
        // 161 chars switch to 153 per part
        assert_eq!(part_count(&"a".repeat(161)), 2);
        assert_eq!(part_count(&"a".repeat(306)), 2);
        assert_eq!(part_count(&"a".repeat(307)), 3);
    }

    #[test]
    fn test_part_count_unicode() {
        assert_eq!(part_count(&"অ".repeat(70)), 1);
        assert_eq!(part_count(&"অ".repeat(71)), 2);
        assert_eq!(part_count(&"অ".repeat(134)), 2);
        assert_eq!(part_count(&"অ".repeat(135)), 3);
        // one non-ascii char turns the whole message unicode
        assert_eq!(part_count(&format!("{}é", "a".repeat(80))), 2);
    }

    #[test]
    fn test_empty_message_has_no_parts() {
        assert_eq!(part_count(""), 0);
    }

    #[test]
    fn test_split_receivers() {
        assert_eq!(
            split_receivers(" 0171, 0181\n0191  ,,0161 "),
            vec!["0171", "0181", "0191", "0161"]
        );
        assert!(split_receivers("  ").is_empty());
    }

    #[test]
    fn test_quote() {
        let quote = MessageQuote::new(&"x".repeat(200), "a b c");
        assert_eq!(quote.parts_per_receiver, 2);
        assert_eq!(quote.total_parts, 6);
        assert_eq!(quote.message_type, MessageType::Text);
    }

    #[test]
    fn test_message_type() {
        assert_eq!(MessageType::parse("unicode").unwrap(), MessageType::Unicode);
        assert!(MessageType::parse("binary").is_err());
        assert_eq!(MessageType::detect("ধন্যবাদ"), MessageType::Unicode);
    }
}
