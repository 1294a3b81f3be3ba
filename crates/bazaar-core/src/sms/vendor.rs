//! # Vendor Reply Parsing
//!
//! Each SMS vendor reports success its own way. Parsing is pure: the engine
//! hands over the HTTP status and body and gets a [`Delivery`] back.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────────────────┐
//! │  Vendor      │  Delivered when                                          │
//! ├──────────────┼──────────────────────────────────────────────────────────┤
//! │  rtcom       │  JSON response.code == 200 ∧ response.message == Success │
//! │  elitbuzz    │  body contains "SMS SUBMITTED"                           │
//! │  jamanit     │  HTTP 200 ∧ body contains "status_code":200              │
//! │  durbarsms   │  JSON !isError ∧ message == "Success!"                   │
//! │  revesms     │  JSON Status == "0"                                      │
//! └──────────────┴──────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

/// Reason recorded when a vendor gives no usable explanation.
pub const UNKNOWN_ERROR: &str = "Unknown Error";

/// Error codes an elitbuzz gateway embeds in its reply body.
pub const ELITBUZZ_ERROR_CODES: &[(&str, &str)] = &[
    ("1002", "Sender Id/Masking Not Found"),
    ("1003", "API Not Found"),
    ("1004", "SPAM Detected"),
    ("1005", "Internal Error"),
    ("1006", "Internal Error"),
    ("1007", "Balance Insufficient"),
    ("1008", "Message is empty"),
    ("1009", "Message Type Not Set (text/unicode)"),
    ("1010", "Invalid User & Password"),
    ("1011", "Invalid User Id"),
    ("1012", "Invalid Number"),
    ("1013", "API limit error"),
    ("1014", "No matching template"),
    ("1015", "SMS Content Validation Fails"),
    ("1016", "IP address not allowed!!"),
    ("1019", "Sms Purpose Missing"),
];

/// Error codes a jamanit gateway embeds in its reply body.
pub const JAMANIT_ERROR_CODES: &[(&str, &str)] = &[
    ("1001", "Wrong Api Key"),
    ("1002", "Wrong Sender ID"),
    ("1003", "Type must be text or unicode"),
    ("1004", "Only GET and POST Methods Allow"),
    ("1005", "You can't send sms to this prefix because of prefix inactivity."),
    ("1006", "Insufficient Balance"),
    ("1007", "Please use country code (88)"),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vendor {
    Rtcom,
    Elitbuzz,
    Jamanit,
    Durbarsms,
    Revesms,
    Other(String),
}

impl Vendor {
    /// Maps a gateway's `vendor_name` (case-insensitive).
    pub fn from_name(name: Option<&str>) -> Self {
        let raw = name.unwrap_or_default().trim();
        match raw.to_ascii_lowercase().as_str() {
            "rtcom" => Vendor::Rtcom,
            "elitbuzz" => Vendor::Elitbuzz,
            "jamanit" => Vendor::Jamanit,
            "durbarsms" => Vendor::Durbarsms,
            "revesms" => Vendor::Revesms,
            _ => Vendor::Other(raw.to_string()),
        }
    }
}

/// Result of one gateway attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delivery {
    Sent,
    Failed(String),
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent)
    }

    fn failed(reason: impl Into<String>) -> Self {
        Delivery::Failed(reason.into())
    }
}

/// Interprets a gateway reply.
pub fn parse_response(vendor: &Vendor, status: u16, body: &str) -> Delivery {
    match vendor {
        Vendor::Rtcom => parse_json(body, |json| {
            let response = &json["response"];
            let message = response["message"].as_str().unwrap_or(UNKNOWN_ERROR);
            if response["code"].as_i64() == Some(200) && message == "Success" {
                Delivery::Sent
            } else {
                Delivery::failed(message)
            }
        }),
        Vendor::Elitbuzz => {
            if body.contains("SMS SUBMITTED") {
                Delivery::Sent
            } else {
                Delivery::failed(match_error_code(ELITBUZZ_ERROR_CODES, body))
            }
        }
        Vendor::Jamanit => {
            if status == 200 && body.contains("\"status_code\":200") {
                Delivery::Sent
            } else {
                Delivery::failed(match_error_code(JAMANIT_ERROR_CODES, body))
            }
        }
        Vendor::Durbarsms => parse_json(body, |json| {
            let is_error = json["isError"].as_bool().unwrap_or(false);
            let message = json["message"].as_str();
            if !is_error && message == Some("Success!") {
                Delivery::Sent
            } else {
                Delivery::failed(message.unwrap_or(UNKNOWN_ERROR))
            }
        }),
        Vendor::Revesms => parse_json(body, |json| {
            if json["Status"].as_str() == Some("0") {
                Delivery::Sent
            } else {
                Delivery::failed(json["Text"].as_str().unwrap_or(UNKNOWN_ERROR))
            }
        }),
        Vendor::Other(name) => Delivery::failed(format!("Unsupported vendor '{}'", name)),
    }
}

fn parse_json(body: &str, judge: impl FnOnce(&Value) -> Delivery) -> Delivery {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => judge(&json),
        Err(e) => Delivery::failed(format!("Invalid JSON response: {}", e)),
    }
}

/// First table entry whose code appears in the body.
fn match_error_code(table: &[(&str, &'static str)], body: &str) -> &'static str {
    table
        .iter()
        .find(|(code, _)| body.contains(code))
        .map(|(_, message)| *message)
        .unwrap_or(UNKNOWN_ERROR)
}

/// Reads the account balance from an rtcom balance reply.
///
/// ```text
/// {"response": {"code": 200, "message": "Success"}, "info": {"balance": "5321.40"}}
/// ```
pub fn parse_balance_response(body: &str) -> CoreResult<Money> {
    let json: Value =
        serde_json::from_str(body).map_err(|e| CoreError::VendorResponse(e.to_string()))?;

    let response = &json["response"];
    if response["code"].as_i64() != Some(200) {
        let message = response["message"].as_str().unwrap_or(UNKNOWN_ERROR);
        return Err(CoreError::VendorResponse(message.to_string()));
    }

    let balance = &json["info"]["balance"];
    let text = match balance {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(CoreError::VendorResponse("missing info.balance".to_string())),
    };

    parse_decimal(&text).ok_or_else(|| CoreError::VendorResponse(format!("bad balance '{}'", text)))
}

/// Parses a decimal with any number of fraction digits, truncated to minor units.
fn parse_decimal(text: &str) -> Option<Money> {
    let text = text.trim();
    let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
    let frac: String = frac.chars().chain(std::iter::repeat('0')).take(2).collect();
    Money::parse(&format!("{}.{}", whole, frac)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_names() {
        assert_eq!(Vendor::from_name(Some("RTCOM")), Vendor::Rtcom);
        assert_eq!(Vendor::from_name(Some(" revesms ")), Vendor::Revesms);
        assert_eq!(Vendor::from_name(None), Vendor::Other(String::new()));
    }

    #[test]
    fn test_rtcom() {
        let ok = r#"{"response":{"code":200,"message":"Success"}}"#;
        assert_eq!(parse_response(&Vendor::Rtcom, 200, ok), Delivery::Sent);

        let bad = r#"{"response":{"code":401,"message":"Invalid API key"}}"#;
        assert_eq!(
            parse_response(&Vendor::Rtcom, 200, bad),
            Delivery::Failed("Invalid API key".into())
        );

        let bare = r#"{"response":{"code":500}}"#;
        assert_eq!(parse_response(&Vendor::Rtcom, 200, bare), Delivery::Failed(UNKNOWN_ERROR.into()));

        assert!(matches!(
            parse_response(&Vendor::Rtcom, 502, "<html>Bad Gateway</html>"),
            Delivery::Failed(reason) if reason.starts_with("Invalid JSON")
        ));
    }

    #[test]
    fn test_elitbuzz() {
        assert!(parse_response(&Vendor::Elitbuzz, 200, "SMS SUBMITTED: ID - C2000").is_sent());
        assert_eq!(
            parse_response(&Vendor::Elitbuzz, 200, "1007"),
            Delivery::Failed("Balance Insufficient".into())
        );
        assert_eq!(
            parse_response(&Vendor::Elitbuzz, 200, "garbage"),
            Delivery::Failed(UNKNOWN_ERROR.into())
        );
    }

    #[test]
    fn test_jamanit() {
        assert!(parse_response(&Vendor::Jamanit, 200, r#"{"status_code":200,"msg":"ok"}"#).is_sent());
        // status code matters as well as the body
        assert!(!parse_response(&Vendor::Jamanit, 500, r#"{"status_code":200}"#).is_sent());
        assert_eq!(
            parse_response(&Vendor::Jamanit, 200, r#"{"error_code":1007}"#),
            Delivery::Failed("Please use country code (88)".into())
        );
    }

    #[test]
    fn test_durbarsms() {
        assert!(parse_response(&Vendor::Durbarsms, 200, r#"{"isError":false,"message":"Success!"}"#).is_sent());
        assert_eq!(
            parse_response(&Vendor::Durbarsms, 200, r#"{"isError":true,"message":"Low credit"}"#),
            Delivery::Failed("Low credit".into())
        );
    }

    #[test]
    fn test_revesms() {
        assert!(parse_response(&Vendor::Revesms, 200, r#"{"Status":"0","Text":"ACCEPTD"}"#).is_sent());
        assert_eq!(
            parse_response(&Vendor::Revesms, 200, r#"{"Status":"108","Text":"Wrong password"}"#),
            Delivery::Failed("Wrong password".into())
        );
        assert_eq!(
            parse_response(&Vendor::Revesms, 200, r#"{"Status":"1"}"#),
            Delivery::Failed(UNKNOWN_ERROR.into())
        );
    }

    #[test]
    fn test_unknown_vendor_fails() {
        assert!(!parse_response(&Vendor::Other("acme".into()), 200, "OK").is_sent());
    }

    #[test]
    fn test_balance_response() {
        let body = r#"{"response":{"code":200,"message":"Success"},"info":{"balance":"5321.4"}}"#;
        assert_eq!(parse_balance_response(body).unwrap().minor(), 532_140);

        let body = r#"{"response":{"code":200},"info":{"balance":6000}}"#;
        assert_eq!(parse_balance_response(body).unwrap(), Money::from_major(6000));

        let body = r#"{"response":{"code":200},"info":{"balance":12.3456}}"#;
        assert_eq!(parse_balance_response(body).unwrap().minor(), 1234);

        let body = r#"{"response":{"code":403,"message":"Forbidden"}}"#;
        assert!(matches!(parse_balance_response(body), Err(CoreError::VendorResponse(m)) if m == "Forbidden"));

        assert!(parse_balance_response("not json").is_err());
    }
}
