use crate::config;
use crate::game::note::{HoldKind, TapNote};
use crate::game::note_data::{NoteData, NoteStats};
use crate::game::timing::{BeatInfo, TimingData, WarpRange, note_row_to_beat};
use log::{debug, info};
use std::hash::Hasher;
use twox_hash::XxHash64;

pub fn lanes_for_chart_type(chart_type: &str) -> Option<usize> {
    match chart_type.trim().to_ascii_lowercase().as_str() {
        "dance-single" => Some(4),
        "dance-double" | "dance-couple" | "dance-routine" => Some(8),
        "dance-solo" => Some(6),
        "dance-threepanel" => Some(3),
        "pump-single" => Some(5),
        "pump-halfdouble" => Some(6),
        "pump-double" | "pump-couple" | "pump-routine" => Some(10),
        _ => None,
    }
}

#[derive(Clone, Debug)]
pub struct Steps {
    pub chart_type: String,
    pub difficulty: String,
    pub description: String,
    pub meter: u32,
    pub step_artist: String,
    pub timing: TimingData,
    pub notes: NoteData,
}

/// Deep copy of everything an edit can touch.
#[derive(Clone, Debug, PartialEq)]
pub struct StepsSnapshot {
    timing: TimingData,
    notes: NoteData,
}

impl Steps {
    pub fn new(chart_type: &str, num_lanes: usize) -> Self {
        Self {
            chart_type: chart_type.to_string(),
            difficulty: String::new(),
            description: String::new(),
            meter: 0,
            step_artist: String::new(),
            timing: TimingData::default(),
            notes: NoteData::new(num_lanes),
        }
    }

    /// End-of-load hook: normalizes timing and, when enabled in the config,
    /// resolves warps.
    pub fn finalize(&mut self, fallback_bpm: Option<f32>) -> Vec<WarpRange> {
        let cfg = config::get();
        self.finalize_with(fallback_bpm.or(Some(cfg.fallback_bpm)), cfg.warp_stabilization)
    }

    pub fn finalize_with(
        &mut self,
        fallback_bpm: Option<f32>,
        stabilize_warps: bool,
    ) -> Vec<WarpRange> {
        self.timing.tidy(fallback_bpm);
        let warps = if stabilize_warps {
            self.timing.stabilize_warps()
        } else {
            Vec::new()
        };
        info!(
            "Finalized {} {} ({}): {} BPM, {} warp(s), hash {}",
            self.chart_type,
            self.difficulty,
            self.meter,
            self.timing.display_bpm_range(),
            warps.len(),
            self.short_hash()
        );
        warps
    }

    // --- Editing ---

    pub fn insert_rows(&mut self, at_row: i32, count: i32) {
        self.timing.insert_rows(at_row, count);
        self.notes.insert_rows(at_row, count);
    }

    pub fn delete_rows(&mut self, at_row: i32, count: i32) {
        self.timing.delete_rows(at_row, count);
        self.notes.delete_rows(at_row, count);
    }

    pub fn scale_region(&mut self, start_row: i32, end_row: i32, factor: f32) {
        self.timing.scale_region(start_row, end_row, factor);
        self.notes.scale_region(start_row, end_row, factor);
    }

    /// Speeds the selection up (factor > 1) or slows it down without moving notes.
    pub fn scale_tempo_in_selection(&mut self, start_row: i32, end_row: i32, factor: f32) {
        self.timing.multiply_rate_in_row_range(start_row, end_row, factor);
    }

    pub fn snapshot(&self) -> StepsSnapshot {
        StepsSnapshot { timing: self.timing.clone(), notes: self.notes.clone() }
    }

    pub fn restore(&mut self, snapshot: StepsSnapshot) {
        debug!("Restoring snapshot for {} {}", self.chart_type, self.difficulty);
        self.timing = snapshot.timing;
        self.notes = snapshot.notes;
    }

    // --- Identity ---

    /// xxHash64 over the note stream and timing; stable across runs.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write_u64(self.notes.num_lanes() as u64);
        for lane in 0..self.notes.num_lanes() {
            for (row, note) in self.notes.lane_notes(lane, i32::MIN, i32::MAX) {
                hasher.write_u32(lane as u32);
                hasher.write_i32(row);
                hash_note(&mut hasher, note);
            }
        }
        hasher.write_u8(0xff);
        hasher.write_u32(self.timing.offset_seconds().to_bits());
        for seg in self.timing.tempo_segments() {
            hasher.write_i32(seg.row);
            hasher.write_u32(seg.bps.to_bits());
        }
        hasher.write_u8(0xfe);
        for stop in self.timing.pause_segments() {
            hasher.write_i32(stop.row);
            hasher.write_u32(stop.seconds.to_bits());
        }
        hasher.finish()
    }

    pub fn short_hash(&self) -> String {
        format!("{:016x}", self.content_hash())[..12].to_string()
    }

    // --- Playback queries ---

    pub fn beat_info_at(&self, music_time_sec: f32) -> BeatInfo {
        self.timing
            .beat_info_from_music_time(music_time_sec, config::get().global_offset_seconds)
    }

    pub fn music_time_of_row(&self, row: i32) -> f32 {
        self.timing
            .music_time_from_beat(note_row_to_beat(row), config::get().global_offset_seconds)
    }

    /// `(row, music time)` for every occupied row, in order.
    pub fn note_times(&self) -> Vec<(i32, f32)> {
        let global_offset = config::get().global_offset_seconds;
        self.notes
            .occupied_rows(i32::MIN, i32::MAX)
            .map(|row| {
                let beat = note_row_to_beat(row);
                (row, self.timing.music_time_from_beat(beat, global_offset))
            })
            .collect()
    }

    /// Music time of the last event, or 0 for an empty chart.
    pub fn last_second(&self) -> f32 {
        self.notes
            .last_occupied_row()
            .map_or(0.0, |row| self.music_time_of_row(row))
    }

    pub fn stats(&self) -> NoteStats {
        self.notes.stats()
    }
}

fn hash_note(hasher: &mut XxHash64, note: &TapNote) {
    match note {
        TapNote::Empty => hasher.write_u8(0),
        TapNote::Tap => hasher.write_u8(1),
        TapNote::HoldHead(HoldKind::Hold) => hasher.write_u8(2),
        TapNote::HoldHead(HoldKind::Roll) => hasher.write_u8(3),
        TapNote::HoldTail => hasher.write_u8(4),
        TapNote::Mine => hasher.write_u8(5),
        TapNote::Lift => hasher.write_u8(6),
        TapNote::Fake => hasher.write_u8(7),
        TapNote::Addition => hasher.write_u8(8),
        TapNote::TimedEffect(effect) => {
            hasher.write_u8(9);
            hasher.write(effect.modifiers.as_bytes());
            hasher.write_u32(effect.duration_seconds.to_bits());
        }
    }
}
