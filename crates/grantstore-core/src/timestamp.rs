//! Binary timestamp blobs for `created_at` fields.
//!
//! Layout: `version (1) || unix seconds (i64 BE) || nanoseconds (u32 BE)`.

use chrono::{DateTime, Utc};

use crate::error::{CoreError, Result};

/// Current blob version.
pub const TIMESTAMP_VERSION: u8 = 1;

/// Encoded length of a version 1 blob.
pub const TIMESTAMP_LEN: usize = 13;

/// Encode an instant into a timestamp blob.
pub fn encode_timestamp(at: &DateTime<Utc>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TIMESTAMP_LEN);
    buf.push(TIMESTAMP_VERSION);
    buf.extend_from_slice(&at.timestamp().to_be_bytes());
    buf.extend_from_slice(&at.timestamp_subsec_nanos().to_be_bytes());
    buf
}

/// Decode a timestamp blob.
pub fn decode_timestamp(blob: &[u8]) -> Result<DateTime<Utc>> {
    let Some((&version, rest)) = blob.split_first() else {
        return Err(CoreError::Decoding("empty timestamp".into()));
    };
    if version != TIMESTAMP_VERSION {
        return Err(CoreError::Decoding(format!(
            "unsupported timestamp version: {}",
            version
        )));
    }
    if rest.len() != TIMESTAMP_LEN - 1 {
        return Err(CoreError::Decoding(format!(
            "invalid timestamp length: {}",
            blob.len()
        )));
    }

    let (secs, nanos) = rest.split_at(8);
    let secs = i64::from_be_bytes(secs.try_into().map_err(|_| bad_length())?);
    let nanos = u32::from_be_bytes(nanos.try_into().map_err(|_| bad_length())?);

    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| CoreError::Decoding(format!("timestamp out of range: {}s {}ns", secs, nanos)))
}

fn bad_length() -> CoreError {
    CoreError::Decoding("invalid timestamp length".into())
}
