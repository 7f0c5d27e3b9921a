use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

// --- ITGMania Parity Constants and Helpers ---
pub const ROWS_PER_BEAT: i32 = 48;
pub const BEATS_PER_MEASURE: i32 = 4;
pub const ROWS_PER_MEASURE: i32 = ROWS_PER_BEAT * BEATS_PER_MEASURE;

/// Sentinel tempo used when a chart carries no tempo segments at all.
pub const DEFAULT_BPM: f32 = 60.0;
pub const DEFAULT_BPS: f32 = DEFAULT_BPM / 60.0;

/// Tempo installed across a stabilized warp. High enough that the skipped
/// region takes no perceptible time.
pub const FAST_BPM_WARP: f32 = 9_999_999.0;
const FAST_BPS_WARP: f32 = FAST_BPM_WARP / 60.0;

pub const SEGMENT_EPSILON: f32 = 1e-6;

// Real time probed past a discontinuity to find where the chart resumes.
const WARP_PROBE_SECONDS: f32 = 0.001;
// Rows closer than this to a whole row are treated as that row when rounding up.
const ROW_SNAP_TOLERANCE: f32 = 0.01;
// Pause remainders shorter than this are float noise from the probe walk.
const PAUSE_SNAP_SECONDS: f32 = 1e-4;

static DEFAULT_TEMPO: [TempoSegment; 1] = [TempoSegment { row: 0, bps: DEFAULT_BPS }];

#[inline(always)]
pub fn note_row_to_beat(row: i32) -> f32 {
    row as f32 / ROWS_PER_BEAT as f32
}

#[inline(always)]
pub fn beat_to_note_row(beat: f32) -> i32 {
    (beat * ROWS_PER_BEAT as f32).round() as i32
}

#[inline(always)]
fn ceil_note_row(beat: f32) -> i32 {
    (beat * ROWS_PER_BEAT as f32 - ROW_SNAP_TOLERANCE).ceil() as i32
}

#[inline(always)]
pub fn bpm_to_bps(bpm: f32) -> f32 {
    bpm / 60.0
}

#[inline(always)]
pub fn bps_to_bpm(bps: f32) -> f32 {
    bps * 60.0
}

#[inline(always)]
fn rates_equal(a: f32, b: f32) -> bool {
    (a - b).abs() <= SEGMENT_EPSILON * a.abs().max(b.abs()).max(1.0)
}

/// Maps `row` through a tempo-scaling edit of `[start_row, end_row]`.
///
/// Rows inside the region scale about `start_row`; rows after it shift by the
/// change in region length so everything past the edit keeps its spacing.
#[inline(always)]
pub fn scale_row(row: i32, start_row: i32, end_row: i32, factor: f32) -> i32 {
    let length = end_row - start_row;
    let new_length = (factor * length as f32).round() as i32;
    if row < start_row {
        row
    } else if row > end_row {
        row + new_length - length
    } else {
        ((row - start_row) as f32 * factor).round() as i32 + start_row
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoSegment {
    pub row: i32,
    /// Beats per second.
    pub bps: f32,
}

impl TempoSegment {
    #[inline(always)]
    pub fn beat(&self) -> f32 {
        note_row_to_beat(self.row)
    }

    #[inline(always)]
    pub fn bpm(&self) -> f32 {
        bps_to_bpm(self.bps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PauseSegment {
    pub row: i32,
    pub seconds: f32,
}

impl PauseSegment {
    #[inline(always)]
    pub fn beat(&self) -> f32 {
        note_row_to_beat(self.row)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BeatInfo {
    pub beat: f32,
    pub bps: f32,
    pub in_pause: bool,
}

/// A row range that forward real time never visits, replaced by a
/// fast-forward segment. `end_row` is exclusive; `i32::MAX` means the rest
/// of the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarpRange {
    pub start_row: i32,
    pub end_row: i32,
}

trait RowSegment: Copy {
    fn row(&self) -> i32;
}

impl RowSegment for TempoSegment {
    fn row(&self) -> i32 {
        self.row
    }
}

impl RowSegment for PauseSegment {
    fn row(&self) -> i32 {
        self.row
    }
}

// Sorted insert; a segment already on the same row is overwritten.
fn insert_by_row<T: RowSegment>(out: &mut Vec<T>, seg: T) {
    match out.binary_search_by_key(&seg.row(), RowSegment::row) {
        Ok(i) => out[i] = seg,
        Err(i) => out.insert(i, seg),
    }
}

fn sort_keep_last<T: RowSegment>(segments: &mut Vec<T>) {
    // Stable sort keeps insertion order within a row, so the last one wins.
    segments.sort_by_key(RowSegment::row);
    let mut out: Vec<T> = Vec::with_capacity(segments.len());
    for seg in segments.drain(..) {
        match out.last_mut() {
            Some(last) if last.row() == seg.row() => *last = seg,
            _ => out.push(seg),
        }
    }
    *segments = out;
}

/// Tempo map for one chart: tempo segments, pauses, and the beat-zero offset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingData {
    offset_sec: f32,
    bpms: Vec<TempoSegment>,
    stops: Vec<PauseSegment>,
}

impl TimingData {
    pub fn new(offset_sec: f32) -> Self {
        Self { offset_sec, bpms: Vec::new(), stops: Vec::new() }
    }

    pub fn with_bpm(offset_sec: f32, bpm: f32) -> Self {
        let mut timing = Self::new(offset_sec);
        timing.add_tempo_change(0, bpm_to_bps(bpm));
        timing
    }

    /// Builds a model straight from loader output. Input order does not matter.
    pub fn from_segments(
        offset_sec: f32,
        bpms: Vec<TempoSegment>,
        stops: Vec<PauseSegment>,
    ) -> Self {
        let mut timing = Self { offset_sec, bpms, stops };
        sort_keep_last(&mut timing.bpms);
        sort_keep_last(&mut timing.stops);
        timing
    }

    #[inline(always)]
    pub fn offset_seconds(&self) -> f32 {
        self.offset_sec
    }

    pub fn set_offset_seconds(&mut self, offset_sec: f32) {
        self.offset_sec = offset_sec;
    }

    #[inline(always)]
    pub fn tempo_segments(&self) -> &[TempoSegment] {
        &self.bpms
    }

    #[inline(always)]
    pub fn pause_segments(&self) -> &[PauseSegment] {
        &self.stops
    }

    #[inline(always)]
    fn tempo_slice(&self) -> &[TempoSegment] {
        if self.bpms.is_empty() { &DEFAULT_TEMPO } else { &self.bpms }
    }

    // ----------------------------- Bulk load -----------------------------

    pub fn add_tempo_change(&mut self, row: i32, bps: f32) {
        insert_by_row(&mut self.bpms, TempoSegment { row, bps });
    }

    pub fn add_pause(&mut self, row: i32, seconds: f32) {
        insert_by_row(&mut self.stops, PauseSegment { row, seconds });
    }

    /// Normalizes freshly loaded timing: drops unusable values, pins the first
    /// tempo to row 0, merges redundant tempo changes, and synthesizes a tempo
    /// from `fallback_bpm` (or [`DEFAULT_BPM`]) when none survived.
    pub fn tidy(&mut self, fallback_bpm: Option<f32>) {
        let before = (self.bpms.len(), self.stops.len());
        self.bpms.retain(|s| s.bps.is_finite());
        self.stops.retain(|s| s.seconds.is_finite() && s.seconds != 0.0);
        sort_keep_last(&mut self.bpms);
        sort_keep_last(&mut self.stops);
        if self.bpms.is_empty() {
            let bpm = fallback_bpm.filter(|b| b.is_finite() && *b > 0.0).unwrap_or(DEFAULT_BPM);
            self.bpms.push(TempoSegment { row: 0, bps: bpm_to_bps(bpm) });
        }
        self.pin_first_tempo();
        self.coalesce_tempo();
        debug!(
            "Tidied timing: {}/{} tempo segments, {}/{} pauses kept.",
            self.bpms.len(),
            before.0,
            self.stops.len(),
            before.1
        );
    }

    fn pin_first_tempo(&mut self) {
        if let Some(first) = self.bpms.first_mut() {
            first.row = 0;
        }
        // Pinning can land on a segment that was already at row 0.
        if self.bpms.len() > 1 && self.bpms[1].row == 0 {
            self.bpms.remove(0);
        }
    }

    fn coalesce_tempo(&mut self) {
        let mut out: Vec<TempoSegment> = Vec::with_capacity(self.bpms.len());
        for seg in self.bpms.drain(..) {
            if let Some(last) = out.last() {
                if rates_equal(last.bps, seg.bps) {
                    continue;
                }
            }
            out.push(seg);
        }
        self.bpms = out;
    }

    fn materialize_default(&mut self) {
        if self.bpms.is_empty() {
            self.bpms.push(DEFAULT_TEMPO[0]);
        }
    }

    // ----------------------------- Point queries -----------------------------

    pub fn bps_at_row(&self, row: i32) -> f32 {
        let bpms = self.tempo_slice();
        let idx = bpms.partition_point(|s| s.row <= row);
        bpms[idx.saturating_sub(1)].bps
    }

    pub fn bpm_at_beat(&self, beat: f32) -> f32 {
        bps_to_bpm(self.bps_at_row(beat_to_note_row(beat)))
    }

    pub fn pause_at_row(&self, row: i32) -> Option<f32> {
        self.stops
            .binary_search_by_key(&row, |s| s.row)
            .ok()
            .map(|i| self.stops[i].seconds)
    }

    pub fn has_pauses(&self) -> bool {
        self.stops.iter().any(|s| s.seconds > 0.0)
    }

    /// True while the model still carries authored warps that
    /// [`TimingData::stabilize_warps`] has not resolved.
    pub fn has_negative_segments(&self) -> bool {
        self.bpms.iter().any(|s| s.bps <= 0.0) || self.stops.iter().any(|s| s.seconds < 0.0)
    }

    #[inline(always)]
    pub fn is_warp_at_row(&self, row: i32) -> bool {
        self.bps_at_row(row) >= FAST_BPS_WARP * 0.5
    }

    /// Min/max BPM over the playable tempo segments, ignoring warp-speed and
    /// non-positive segments.
    pub fn bpm_range(&self) -> (f32, f32) {
        let mut range: Option<(f32, f32)> = None;
        for seg in self.tempo_slice() {
            if !(seg.bps > 0.0) || seg.bps >= FAST_BPS_WARP * 0.5 {
                continue;
            }
            let bpm = seg.bpm();
            range = Some(match range {
                Some((lo, hi)) => (lo.min(bpm), hi.max(bpm)),
                None => (bpm, bpm),
            });
        }
        range.unwrap_or((DEFAULT_BPM, DEFAULT_BPM))
    }

    /// BPM range as shown on the music wheel: whole numbers, single value when flat.
    pub fn display_bpm_range(&self) -> String {
        let (lo, hi) = self.bpm_range();
        let (lo, hi) = (lo.round() as i64, hi.round() as i64);
        if lo == hi { format!("{lo}") } else { format!("{lo}-{hi}") }
    }

    // ----------------------------- Editing -----------------------------

    pub fn set_tempo_at_row(&mut self, row: i32, bps: f32) {
        let row = row.max(0);
        self.materialize_default();
        match self.bpms.binary_search_by_key(&row, |s| s.row) {
            Ok(i) => {
                if i > 0 && rates_equal(self.bpms[i - 1].bps, bps) {
                    self.bpms.remove(i);
                } else {
                    self.bpms[i].bps = bps;
                }
            }
            Err(i) => {
                if !rates_equal(self.bps_at_row(row), bps) {
                    self.bpms.insert(i, TempoSegment { row, bps });
                }
            }
        }
    }

    pub fn set_pause_at_row(&mut self, row: i32, seconds: f32) {
        match self.stops.binary_search_by_key(&row, |s| s.row) {
            Ok(i) => {
                if seconds <= 0.0 {
                    self.stops.remove(i);
                } else {
                    self.stops[i].seconds = seconds;
                }
            }
            Err(i) => {
                if seconds > 0.0 {
                    self.stops.insert(i, PauseSegment { row, seconds });
                }
            }
        }
    }

    fn split_tempo_at_row(&mut self, row: i32) {
        if let Err(i) = self.bpms.binary_search_by_key(&row, |s| s.row) {
            let bps = self.bps_at_row(row);
            self.bpms.insert(i, TempoSegment { row, bps });
        }
    }

    /// Multiplies the tempo of exactly `[start_row, end_row)`, splitting any
    /// segment that straddles either boundary.
    pub fn multiply_rate_in_row_range(&mut self, start_row: i32, end_row: i32, factor: f32) {
        let start_row = start_row.max(0);
        if start_row >= end_row {
            return;
        }
        self.materialize_default();
        self.split_tempo_at_row(start_row);
        self.split_tempo_at_row(end_row);
        for seg in &mut self.bpms {
            if seg.row >= start_row && seg.row < end_row {
                seg.bps *= factor;
            }
        }
        self.coalesce_tempo();
    }

    pub fn insert_rows(&mut self, at_row: i32, count: i32) {
        if count <= 0 {
            return;
        }
        for seg in &mut self.bpms {
            if seg.row >= at_row {
                seg.row += count;
            }
        }
        for stop in &mut self.stops {
            if stop.row >= at_row {
                stop.row += count;
            }
        }
        self.pin_first_tempo();
    }

    /// Removes `[at_row, at_row + count)` and pulls later segments up. The tempo
    /// that was in effect at the end of the span takes effect at `at_row`, so
    /// audio after the cut stays in sync.
    pub fn delete_rows(&mut self, at_row: i32, count: i32) {
        if count <= 0 {
            return;
        }
        let end_row = at_row + count;
        let resumed_bps = self.bps_at_row(end_row);

        self.bpms.retain(|s| s.row < at_row || s.row >= end_row);
        for seg in &mut self.bpms {
            if seg.row >= end_row {
                seg.row -= count;
            }
        }
        self.stops.retain(|s| s.row < at_row || s.row >= end_row);
        for stop in &mut self.stops {
            if stop.row >= end_row {
                stop.row -= count;
            }
        }

        self.set_tempo_at_row(at_row, resumed_bps);
        self.pin_first_tempo();
    }

    pub fn scale_region(&mut self, start_row: i32, end_row: i32, factor: f32) {
        assert!(factor > 0.0, "scale factor must be positive, got {factor}");
        if start_row >= end_row {
            return;
        }
        for seg in &mut self.bpms {
            seg.row = scale_row(seg.row, start_row, end_row, factor);
        }
        for stop in &mut self.stops {
            stop.row = scale_row(stop.row, start_row, end_row, factor);
        }
        sort_keep_last(&mut self.bpms);
        sort_keep_last(&mut self.stops);
        self.pin_first_tempo();
    }

    // ----------------------------- Warps -----------------------------

    fn first_discontinuity_row(&self) -> Option<i32> {
        let tempo = self.bpms.iter().find(|s| s.bps < 0.0).map(|s| s.row);
        let pause = self.stops.iter().find(|s| s.seconds < 0.0).map(|s| s.row);
        match (tempo, pause) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Rewrites authored warps (negative tempo, negative pauses) into explicit
    /// fast-forward segments so real time is monotonic in beat afterwards.
    /// Returns the row ranges that were skipped.
    pub fn stabilize_warps(&mut self) -> Vec<WarpRange> {
        self.materialize_default();
        let stalled = self.bpms.iter().filter(|s| s.bps == 0.0 || !s.bps.is_finite()).count();
        if stalled > 0 {
            warn!("Dropping {stalled} zero or non-finite tempo segment(s).");
            self.bpms.retain(|s| s.bps != 0.0 && s.bps.is_finite());
            self.materialize_default();
            self.pin_first_tempo();
        }

        let mut ranges = Vec::new();
        // Each pass resolves the earliest discontinuity and only adds segments
        // after it.
        let max_passes = 2 * (self.bpms.len() + self.stops.len()) + 1;
        while let Some(row) = self.first_discontinuity_row() {
            if ranges.len() >= max_passes {
                warn!("Warp stabilization gave up after {max_passes} passes at row {row}.");
                break;
            }
            ranges.push(self.resolve_warp_at(row));
        }
        if !ranges.is_empty() {
            info!("Stabilized {} warp(s): {:?}", ranges.len(), ranges);
        }
        ranges
    }

    fn resolve_warp_at(&mut self, row: i32) -> WarpRange {
        let lead_pause = self.pause_at_row(row).filter(|s| *s > 0.0).unwrap_or(0.0);
        let warp_time = self.elapsed_seconds_before_pause(note_row_to_beat(row)) + lead_pause;
        let probe = self.beats_and_rate_from_elapsed_seconds(warp_time + WARP_PROBE_SECONDS);

        if !(probe.bps > 0.0) && !probe.in_pause {
            // Tempo never turns positive again: nothing after `row` is reachable.
            self.bpms.retain(|s| s.row < row);
            self.stops.retain(|s| s.row < row || (s.row == row && s.seconds > 0.0));
            self.bpms.push(TempoSegment { row, bps: FAST_BPS_WARP });
            self.pin_first_tempo();
            return WarpRange { start_row: row, end_row: i32::MAX };
        }

        let (end_beat, pause_left) = if probe.in_pause {
            let pause_row = beat_to_note_row(probe.beat);
            let pause_start = self.elapsed_seconds_before_pause(probe.beat);
            let pause_len = self.pause_at_row(pause_row).unwrap_or(0.0);
            (probe.beat, Some(pause_start + pause_len - warp_time))
        } else {
            (probe.beat - WARP_PROBE_SECONDS * probe.bps, None)
        };
        let end_row = ceil_note_row(end_beat).max(row + 1);
        let existing_end_pause = self.pause_at_row(end_row).unwrap_or(0.0);
        // A pause on the resume row may already be partly (or fully) spent by
        // `warp_time`. What is left of it is measured from `warp_time`, so it
        // also covers any rounding sliver before the row.
        let end_pause_left = (existing_end_pause > 0.0).then(|| {
            let pause_start = self.elapsed_seconds_before_pause(note_row_to_beat(end_row));
            let left = pause_start + existing_end_pause - warp_time;
            if left > PAUSE_SNAP_SECONDS { left } else { 0.0 }
        });

        self.bpms.retain(|s| s.row < row || s.row >= end_row);
        self.stops
            .retain(|s| s.row < row || s.row >= end_row || (s.row == row && s.seconds > 0.0));
        self.add_tempo_change(row, FAST_BPS_WARP);
        if self.bpms.binary_search_by_key(&end_row, |s| s.row).is_err() {
            self.add_tempo_change(end_row, probe.bps);
        }

        match pause_left {
            Some(left) if left > PAUSE_SNAP_SECONDS => self.add_pause(end_row, left),
            Some(_) => self.stops.retain(|s| s.row != end_row),
            None => {
                // Rounding the resume point up to a whole row skips a sliver of
                // real time; give it back as a pause so later notes stay put.
                let gap_rows = end_row as f32 - end_beat * ROWS_PER_BEAT as f32;
                let pause = end_pause_left.unwrap_or_else(|| {
                    if gap_rows > ROW_SNAP_TOLERANCE {
                        existing_end_pause + (note_row_to_beat(end_row) - end_beat) / probe.bps
                    } else {
                        existing_end_pause
                    }
                });
                if pause != 0.0 {
                    self.add_pause(end_row, pause);
                } else {
                    self.stops.retain(|s| s.row != end_row);
                }
            }
        }
        self.pin_first_tempo();
        WarpRange { start_row: row, end_row }
    }

    // ----------------------------- Beat <-> time -----------------------------

    /// Beat reached after `elapsed_sec` seconds of real time, measured from
    /// beat 0 with no offsets applied.
    pub fn beats_and_rate_from_elapsed_seconds(&self, elapsed_sec: f32) -> BeatInfo {
        let bpms = self.tempo_slice();
        let stops = &self.stops;
        let last = bpms.len() - 1;
        let mut elapsed = elapsed_sec;
        let mut stop_idx = 0usize;

        for (i, seg) in bpms.iter().enumerate() {
            // The first segment governs from beat 0 (and before) regardless of its row.
            let start_row = if i == 0 { 0 } else { seg.row };
            let start_beat = note_row_to_beat(start_row);
            let bps = seg.bps;
            let next_row = if i == last { i32::MAX } else { bpms[i + 1].row };

            while stop_idx < stops.len() && (i == last || stops[stop_idx].row < next_row) {
                let stop = stops[stop_idx];
                let time_to_stop = note_row_to_beat(stop.row - start_row) / bps;
                if elapsed < time_to_stop {
                    return BeatInfo { beat: start_beat + elapsed * bps, bps, in_pause: false };
                }
                if elapsed < time_to_stop + stop.seconds {
                    return BeatInfo { beat: stop.beat(), bps, in_pause: true };
                }
                elapsed -= stop.seconds;
                stop_idx += 1;
            }

            if i == last {
                return BeatInfo { beat: start_beat + elapsed * bps, bps, in_pause: false };
            }
            let seconds_in_segment = note_row_to_beat(next_row - start_row) / bps;
            if elapsed <= seconds_in_segment {
                return BeatInfo { beat: start_beat + elapsed * bps, bps, in_pause: false };
            }
            elapsed -= seconds_in_segment;
        }
        unreachable!("tempo_slice is never empty")
    }

    /// Real time from beat 0 to `beat`, with no offsets applied. A pause on
    /// exactly `beat` is included, so the result is when the chart moves on
    /// from that beat.
    pub fn elapsed_seconds_from_beat(&self, beat: f32) -> f32 {
        self.elapsed_seconds_to(beat, true)
    }

    // Time at which `beat` is first reached, before any pause sitting on it.
    fn elapsed_seconds_before_pause(&self, beat: f32) -> f32 {
        self.elapsed_seconds_to(beat, false)
    }

    fn elapsed_seconds_to(&self, beat: f32, include_pause_on_beat: bool) -> f32 {
        let mut elapsed = 0.0_f32;
        for stop in &self.stops {
            let stop_beat = stop.beat();
            if stop_beat > beat || (stop_beat == beat && !include_pause_on_beat) {
                break;
            }
            elapsed += stop.seconds;
        }

        let bpms = self.tempo_slice();
        let last = bpms.len() - 1;
        for (i, seg) in bpms.iter().enumerate() {
            let start_beat = if i == 0 { 0.0 } else { seg.beat() };
            if i == last {
                elapsed += (beat - start_beat) / seg.bps;
                break;
            }
            let next_beat = bpms[i + 1].beat();
            if beat <= next_beat {
                elapsed += (beat - start_beat) / seg.bps;
                break;
            }
            elapsed += (next_beat - start_beat) / seg.bps;
        }
        elapsed
    }

    #[inline(always)]
    pub fn beat_info_from_time(&self, time_sec: f32) -> BeatInfo {
        self.beats_and_rate_from_elapsed_seconds(time_sec + self.offset_sec)
    }

    #[inline(always)]
    pub fn time_from_beat(&self, beat: f32) -> f32 {
        self.elapsed_seconds_from_beat(beat) - self.offset_sec
    }

    /// Like [`TimingData::beat_info_from_time`], with the machine-wide
    /// calibration offset applied on top of the chart offset.
    #[inline(always)]
    pub fn beat_info_from_music_time(
        &self,
        music_time_sec: f32,
        global_offset_sec: f32,
    ) -> BeatInfo {
        self.beat_info_from_time(music_time_sec + global_offset_sec)
    }

    #[inline(always)]
    pub fn music_time_from_beat(&self, beat: f32, global_offset_sec: f32) -> f32 {
        self.time_from_beat(beat) - global_offset_sec
    }

    #[inline(always)]
    pub fn time_from_row(&self, row: i32) -> f32 {
        self.time_from_beat(note_row_to_beat(row))
    }
}
