//! Test Helper Utilities
//!
//! Shared utilities for testing frec-server

#![allow(dead_code)]

pub mod db_utils;

pub use db_utils::{
    count_rows, create_test_env, seed_instructor, seed_recording, seed_set_member, seed_tokens,
    TestEnv,
};

use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use frec_server::ingest::UploadedRecording;

/// Session envelope for speaker "Anna" on a device with a fixed IMEI.
///
/// `recordings` maps uploaded filename to token id.
pub fn session_envelope(instructor_id: i64, recordings: &[(&str, i64)]) -> Value {
    let recordings_info: serde_json::Map<String, Value> = recordings
        .iter()
        .map(|(name, token_id)| (name.to_string(), json!({ "tokenId": token_id })))
        .collect();

    json!({
        "type": "session",
        "data": {
            "speakerInfo": {"name": "Anna", "deviceImei": "356938035643809", "gender": "female"},
            "instructorId": instructor_id,
            "deviceInfo": {"userAgent": "Mozilla/5.0 (Linux; Android 5.1)", "imei": "356938035643809"},
            "location": "Reykjavik",
            "start": "2016-03-05T11:00:00.000Z",
            "end": "2016-03-05T11:20:00.000Z",
            "comments": "quiet room",
            "recordingsInfo": recordings_info
        }
    })
}

/// Fake audio upload with recognizable content
pub fn upload(filename: &str) -> UploadedRecording {
    UploadedRecording {
        filename: filename.to_string(),
        audio: format!("RIFF-{}", filename).into_bytes(),
    }
}

/// Every regular file below `dir`, sorted
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(next) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&next) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}
