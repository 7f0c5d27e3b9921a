use crate::game::chart::Steps;
use crate::game::note::{HoldKind, TapNote, TimedEffect};
use crate::game::note_data::NoteData;
use crate::game::timing::{PauseSegment, TempoSegment, TimingData};
use bincode::{Decode, Encode};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::hash::Hasher;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use twox_hash::XxHash64;

/// Bumped whenever the encoded layout below changes.
pub const CACHE_VERSION: u32 = 1;

// --- SERIALIZABLE MIRROR STRUCTS ---

#[derive(Serialize, Deserialize, Clone, Copy, Encode, Decode)]
struct CachedTempo {
    row: i32,
    bps: f32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Encode, Decode)]
struct CachedPause {
    row: i32,
    seconds: f32,
}

#[derive(Serialize, Deserialize, Clone, Encode, Decode)]
enum CachedTapNote {
    Tap,
    Mine,
    Lift,
    Fake,
    Addition,
    TimedEffect { modifiers: String, duration_seconds: f32 },
}

impl CachedTapNote {
    // Hold markers travel as CachedHold instead.
    fn from_note(note: &TapNote) -> Option<Self> {
        Some(match note {
            TapNote::Tap => Self::Tap,
            TapNote::Mine => Self::Mine,
            TapNote::Lift => Self::Lift,
            TapNote::Fake => Self::Fake,
            TapNote::Addition => Self::Addition,
            TapNote::TimedEffect(effect) => Self::TimedEffect {
                modifiers: effect.modifiers.clone(),
                duration_seconds: effect.duration_seconds,
            },
            TapNote::Empty | TapNote::HoldHead(_) | TapNote::HoldTail => return None,
        })
    }
}

impl From<CachedTapNote> for TapNote {
    fn from(note: CachedTapNote) -> Self {
        match note {
            CachedTapNote::Tap => Self::Tap,
            CachedTapNote::Mine => Self::Mine,
            CachedTapNote::Lift => Self::Lift,
            CachedTapNote::Fake => Self::Fake,
            CachedTapNote::Addition => Self::Addition,
            CachedTapNote::TimedEffect { modifiers, duration_seconds } => {
                Self::TimedEffect(TimedEffect { modifiers, duration_seconds })
            }
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Encode, Decode)]
struct CachedHold {
    lane: u32,
    start_row: i32,
    end_row: i32,
    roll: bool,
}

#[derive(Serialize, Deserialize, Clone, Encode, Decode)]
struct SerializableSteps {
    chart_type: String,
    difficulty: String,
    description: String,
    meter: u32,
    step_artist: String,
    offset_sec: f32,
    bpms: Vec<CachedTempo>,
    stops: Vec<CachedPause>,
    num_lanes: u32,
    notes: Vec<(u32, i32, CachedTapNote)>,
    holds: Vec<CachedHold>,
}

impl From<&Steps> for SerializableSteps {
    fn from(steps: &Steps) -> Self {
        let mut notes = Vec::new();
        for lane in 0..steps.notes.num_lanes() {
            for (row, note) in steps.notes.lane_notes(lane, i32::MIN, i32::MAX) {
                if let Some(cached) = CachedTapNote::from_note(note) {
                    notes.push((lane as u32, row, cached));
                }
            }
        }
        let holds = steps
            .notes
            .holds()
            .iter()
            .map(|h| CachedHold {
                lane: h.lane as u32,
                start_row: h.start_row,
                end_row: h.end_row,
                roll: steps.notes.hold_kind(h) == HoldKind::Roll,
            })
            .collect();
        Self {
            chart_type: steps.chart_type.clone(),
            difficulty: steps.difficulty.clone(),
            description: steps.description.clone(),
            meter: steps.meter,
            step_artist: steps.step_artist.clone(),
            offset_sec: steps.timing.offset_seconds(),
            bpms: steps
                .timing
                .tempo_segments()
                .iter()
                .map(|s| CachedTempo { row: s.row, bps: s.bps })
                .collect(),
            stops: steps
                .timing
                .pause_segments()
                .iter()
                .map(|s| CachedPause { row: s.row, seconds: s.seconds })
                .collect(),
            num_lanes: steps.notes.num_lanes() as u32,
            notes,
            holds,
        }
    }
}

impl SerializableSteps {
    // Rejects payloads that would trip NoteData's lane and hold contracts.
    fn into_steps(self) -> Option<Steps> {
        let num_lanes = self.num_lanes as usize;
        if num_lanes == 0
            || self.notes.iter().any(|(lane, _, _)| *lane as usize >= num_lanes)
            || self
                .holds
                .iter()
                .any(|h| h.lane as usize >= num_lanes || h.start_row >= h.end_row)
        {
            return None;
        }

        let mut notes = NoteData::new(num_lanes);
        for (lane, row, note) in self.notes {
            notes.set(lane as usize, row, note.into());
        }
        for hold in self.holds {
            let kind = if hold.roll { HoldKind::Roll } else { HoldKind::Hold };
            notes.add_hold(hold.lane as usize, hold.start_row, hold.end_row, kind);
        }
        let timing = TimingData::from_segments(
            self.offset_sec,
            self.bpms.iter().map(|s| TempoSegment { row: s.row, bps: s.bps }).collect(),
            self.stops.iter().map(|s| PauseSegment { row: s.row, seconds: s.seconds }).collect(),
        );
        Some(Steps {
            chart_type: self.chart_type,
            difficulty: self.difficulty,
            description: self.description,
            meter: self.meter,
            step_artist: self.step_artist,
            timing,
            notes,
        })
    }
}

#[derive(Serialize, Deserialize, Encode, Decode)]
struct CachedSteps {
    cache_version: u32,
    source_hash: u64,
    data: SerializableSteps,
}

// --- CACHING HELPER FUNCTIONS ---

pub fn encode_steps(steps: &Steps, source_hash: u64) -> Option<Vec<u8>> {
    let cached = CachedSteps { cache_version: CACHE_VERSION, source_hash, data: steps.into() };
    match bincode::encode_to_vec(&cached, bincode::config::standard()) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("Failed to encode {} {}: {e}", steps.chart_type, steps.difficulty);
            None
        }
    }
}

/// Decodes a cache entry, returning `None` when it is corrupt, from another
/// cache version, or built from a different source.
pub fn decode_steps(bytes: &[u8], expected_hash: u64) -> Option<Steps> {
    let Ok((cached, _)) =
        bincode::decode_from_slice::<CachedSteps, _>(bytes, bincode::config::standard())
    else {
        info!("Cache entry could not be decoded ({} bytes)", bytes.len());
        return None;
    };
    if cached.cache_version != CACHE_VERSION {
        info!("Cache stale (version {} != {CACHE_VERSION})", cached.cache_version);
        return None;
    }
    if cached.source_hash != expected_hash {
        info!("Cache stale (content hash mismatch) for {}", cached.data.chart_type);
        return None;
    }
    let chart_type = cached.data.chart_type.clone();
    let steps = cached.data.into_steps();
    if steps.is_none() {
        warn!("Cache entry for {chart_type} has notes outside its lanes or bad holds");
    }
    steps
}

pub fn cache_path_for(cache_dir: &Path, key: &str) -> PathBuf {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(key.as_bytes());
    cache_dir.join(format!("{:x}.bin", hasher.finish()))
}

pub fn load_cached_steps(cache_path: &Path, expected_hash: u64) -> Option<Steps> {
    let name = cache_path.file_name().unwrap_or_default();
    if !cache_path.exists() {
        debug!("Cache miss for: {name:?}");
        return None;
    }
    let mut file = match fs::File::open(cache_path) {
        Ok(file) => file,
        Err(e) => {
            warn!("Failed to open cache file {}: {e}", cache_path.display());
            return None;
        }
    };
    let mut buffer = Vec::new();
    if let Err(e) = file.read_to_end(&mut buffer) {
        warn!("Failed to read cache file {}: {e}", cache_path.display());
        return None;
    }
    let Some(steps) = decode_steps(&buffer, expected_hash) else {
        info!("Cache rejected for: {name:?}");
        return None;
    };
    info!("Cache hit for: {name:?}");
    Some(steps)
}

pub fn write_cached_steps(
    cache_path: &Path,
    steps: &Steps,
    source_hash: u64,
) -> Result<(), std::io::Error> {
    let Some(encoded) = encode_steps(steps, source_hash) else {
        return Err(std::io::Error::other("chart could not be encoded"));
    };
    if let Some(dir) = cache_path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut file = fs::File::create(cache_path)?;
    file.write_all(&encoded)
}
