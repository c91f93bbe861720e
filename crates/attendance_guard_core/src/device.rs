//! Device signal heuristics.
//!
//! Two rule sets exist because two callers check devices: the capture checkpoint
//! (scanner side) and the stricter server re-check inside the aggregator. They are
//! kept apart rather than merged; see `DeviceRules::capture` and
//! `DeviceRules::server_recheck`.

use crate::assessment::{Assessment, ReasonCode};
use crate::domain::DeviceSignal;

/// Thresholds and penalties for one device checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRules {
    /// Scans strictly faster than this are flagged.
    pub fast_scan_below_ms: u64,
    pub fast_scan_penalty: u32,
    /// Lower-case substrings of the user agent that mark automation.
    pub automation_markers: Vec<String>,
    pub automation_penalty: u32,
    /// Penalty for a device reporting itself offline; `None` skips the check.
    pub offline_penalty: Option<u32>,
    /// Penalty for a timezone other than the expected one; `None` skips the check.
    pub timezone_penalty: Option<u32>,
}

impl DeviceRules {
    /// Capture checkpoint: broad bot markers, connectivity and timezone.
    pub fn capture() -> Self {
        Self {
            fast_scan_below_ms: 1000,
            fast_scan_penalty: 20,
            automation_markers: [
                "bot",
                "crawler",
                "spider",
                "headless",
                "phantomjs",
                "selenium",
                "webdriver",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            automation_penalty: 30,
            offline_penalty: Some(15),
            timezone_penalty: Some(20),
        }
    }

    /// Server re-check: a narrower headless marker and a stricter scan threshold.
    pub fn server_recheck() -> Self {
        Self {
            fast_scan_below_ms: 500,
            fast_scan_penalty: 15,
            automation_markers: vec!["headlesschrome".to_string()],
            automation_penalty: 40,
            offline_penalty: None,
            timezone_penalty: None,
        }
    }
}

/// Scores a device signal against one rule set. Checks are independent; the
/// result is their sum.
pub fn analyze_device(
    signal: &DeviceSignal,
    expected_timezone: Option<&str>,
    rules: &DeviceRules,
) -> Assessment {
    let mut assessment = Assessment::new();

    if let Some(duration) = signal.scan_duration_ms {
        if duration < rules.fast_scan_below_ms {
            assessment.flag(
                ReasonCode::FastScan,
                rules.fast_scan_penalty,
                format!("Unusually fast QR scan ({duration}ms)"),
            );
        }
    }

    let user_agent = signal.user_agent.to_lowercase();
    if let Some(marker) = rules
        .automation_markers
        .iter()
        .find(|marker| user_agent.contains(marker.as_str()))
    {
        assessment.flag(
            ReasonCode::AutomationMarker,
            rules.automation_penalty,
            format!("Automated browser detected ({marker})"),
        );
    }

    if let Some(penalty) = rules.offline_penalty {
        if !signal.online_status {
            assessment.flag(ReasonCode::DeviceOffline, penalty, "Device offline during scan");
        }
    }

    if let (Some(penalty), Some(expected)) = (rules.timezone_penalty, expected_timezone) {
        let reported = signal.timezone.trim();
        if !reported.is_empty() && reported != expected {
            assessment.flag(
                ReasonCode::TimezoneMismatch,
                penalty,
                format!("Timezone mismatch detected ({reported}, expected {expected})"),
            );
        }
    }

    assessment
}
