//! Row shapes and conversions between SQL rows and core types.

use chrono::{DateTime, Utc};
use resono_core::{Posting, Recording, StoreStats};
use serde::Serialize;
use tokio_postgres::Row;

/// Fingerprint shape fed to the JSONB batch insert. The u32 hash widens to
/// i64 here; the high bits stay zero on the wire.
#[derive(Debug, Serialize)]
pub(crate) struct JsonFingerprint {
    pub hash: i64,
    pub time_offset: f64,
}

pub(crate) fn recording_from_row(row: &Row) -> Recording {
    let created_at: DateTime<Utc> = row.get(6);
    Recording {
        id: row.get(0),
        title: row.get(1),
        artist: row.get(2),
        album: row.get(3),
        duration: row.get(4),
        source_ref: row.get(5),
        created_at,
    }
}

pub(crate) fn posting_from_row(row: &Row) -> Posting {
    let hash: i64 = row.get(2);
    Posting {
        recording_id: row.get(0),
        time_offset: row.get(1),
        hash: hash as u32,
    }
}

pub(crate) fn stats_from_row(row: &Row) -> StoreStats {
    let recording_count: i64 = row.get(0);
    let fingerprint_count: i64 = row.get(1);
    let query_count: i64 = row.get(2);
    let successful_query_count: i64 = row.get(3);
    StoreStats {
        recording_count: recording_count as u64,
        fingerprint_count: fingerprint_count as u64,
        query_count: query_count as u64,
        successful_query_count: successful_query_count as u64,
        average_processing_time_ms: row.get(4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fingerprint_serializes_flat() {
        let fp = JsonFingerprint {
            hash: 0xFFFF_FFFF,
            time_offset: 12.345,
        };
        let value = serde_json::to_value(&fp).unwrap();
        assert_eq!(value["hash"], 4294967295i64);
        assert_eq!(value["time_offset"], 12.345);
    }
}
