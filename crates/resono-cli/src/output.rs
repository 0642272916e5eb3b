//! JSON response envelopes printed on stdout.
//!
//! Logging stays on stderr so the single JSON document per invocation is
//! machine-parseable.

use resono_core::{Identification, Recording};
use serde::Serialize;

/// Outcome of one queued ingestion.
#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub status: &'static str,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestReport {
    pub fn ready(source: String, recording_id: i64) -> Self {
        Self {
            status: "ready",
            source,
            recording_id: Some(recording_id),
            error: None,
        }
    }

    pub fn failed(source: String, error: String) -> Self {
        Self {
            status: "failed",
            source,
            recording_id: None,
            error: Some(error),
        }
    }
}

/// Outcome of one identification.
#[derive(Debug, Serialize)]
pub struct IdentifyReport {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording: Option<Recording>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aligned_matches: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_seconds: Option<f64>,
    pub query_fingerprints: usize,
    pub processing_time_ms: f64,
}

impl IdentifyReport {
    pub fn from_identification(
        identification: &Identification,
        recording: Option<Recording>,
    ) -> Self {
        match &identification.outcome {
            Some(outcome) => Self {
                status: "match",
                recording,
                confidence: Some(outcome.confidence),
                aligned_matches: Some(outcome.aligned_matches),
                offset_seconds: Some(outcome.offset_seconds),
                query_fingerprints: identification.query_fingerprints,
                processing_time_ms: identification.processing_time_ms,
            },
            None => Self {
                status: "no_match",
                recording: None,
                confidence: None,
                aligned_matches: None,
                offset_seconds: None,
                query_fingerprints: identification.query_fingerprints,
                processing_time_ms: identification.processing_time_ms,
            },
        }
    }
}

/// Pretty-print any serializable value as the invocation's stdout document.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => log::error!("failed to serialize output: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_match_report_omits_match_fields() {
        let identification = Identification {
            outcome: None,
            query_fingerprints: 42,
            processing_time_ms: 12.5,
        };
        let report = IdentifyReport::from_identification(&identification, None);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["status"], "no_match");
        assert_eq!(value["query_fingerprints"], 42);
        assert!(value.get("confidence").is_none());
        assert!(value.get("recording").is_none());
    }
}
