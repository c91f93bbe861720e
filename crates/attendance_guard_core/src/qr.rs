//! Decoding of scanned QR text.
//!
//! Session QR images carry either a JSON document with a `sessionCode` field or,
//! for older printed codes, the bare code string.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    pub session_code: String,
    pub class_name: Option<String>,
    /// Milliseconds since the epoch at which the image was generated.
    pub issued_at_ms: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QrDocument {
    session_code: Option<String>,
    class_name: Option<String>,
    timestamp: Option<i64>,
}

/// Returns `None` when the payload has no usable code.
pub fn decode_qr_payload(raw: &str) -> Option<QrPayload> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match serde_json::from_str::<QrDocument>(raw) {
        Ok(doc) => {
            let code = doc.session_code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())?;
            Some(QrPayload {
                session_code: code,
                class_name: doc.class_name,
                issued_at_ms: doc.timestamp,
            })
        }
        Err(_) => Some(QrPayload {
            session_code: raw.to_string(),
            class_name: None,
            issued_at_ms: None,
        }),
    }
}
