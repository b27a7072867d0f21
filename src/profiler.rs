//! Process-wide memory profile: peak storage bytes and per-realization op
//! records, dumpable as JSON.

use crate::errors::{PgError, PgResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpRecord {
    pub id: usize,
    pub kind: String,
    pub shape: Vec<usize>,
    pub dtype: String,
    pub bytes: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryProfile {
    pub ops: Vec<OpRecord>,
    pub peak_bytes: usize,
    pub total_allocations: usize,
}

#[derive(Default)]
struct ProfileState {
    profile: MemoryProfile,
    live_bytes: usize,
}

static STATE: Mutex<Option<ProfileState>> = Mutex::new(None);

/// Start recording allocations. A previous profile, if any, is discarded.
pub fn enable_memory_profile() {
    *STATE.lock().unwrap() = Some(ProfileState::default());
}

/// Stop recording and drop the collected profile.
pub fn disable_memory_profile() {
    *STATE.lock().unwrap() = None;
}

/// Snapshot of the profile collected so far, if profiling is enabled.
pub fn memory_profile() -> Option<MemoryProfile> {
    STATE.lock().unwrap().as_ref().map(|s| s.profile.clone())
}

/// Serialize the collected profile to a JSON file.
pub fn save_memory_profile<P: AsRef<Path>>(path: P) -> PgResult<()> {
    let Some(profile) = memory_profile() else {
        tracing::warn!("save_memory_profile called while profiling is disabled");
        return Ok(());
    };
    let json = serde_json::to_string_pretty(&profile)
        .map_err(|e| PgError::Serialization(e.to_string()))?;
    std::fs::write(path, json)?;
    Ok(())
}

pub(crate) fn record_alloc(bytes: usize) {
    if let Some(state) = STATE.lock().unwrap().as_mut() {
        state.profile.total_allocations += 1;
        state.live_bytes += bytes;
        state.profile.peak_bytes = state.profile.peak_bytes.max(state.live_bytes);
    }
}

pub(crate) fn record_free(bytes: usize) {
    if let Some(state) = STATE.lock().unwrap().as_mut() {
        state.live_bytes = state.live_bytes.saturating_sub(bytes);
    }
}

pub(crate) fn record_op(
    id: crate::types::ArrayId,
    kind: &str,
    shape: &[usize],
    dtype: crate::dtype::DType,
    bytes: usize,
) {
    if let Some(state) = STATE.lock().unwrap().as_mut() {
        state.profile.ops.push(OpRecord {
            id: id.0,
            kind: kind.to_string(),
            shape: shape.to_vec(),
            dtype: dtype.to_string(),
            bytes,
        });
    }
}
