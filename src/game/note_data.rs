use crate::game::note::{HoldKind, HoldNote, TapNote};
use crate::game::timing::scale_row;
use log::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::ops::Range;

static EMPTY: TapNote = TapNote::Empty;

/// Which lanes a bulk operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lanes {
    All,
    One(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteStats {
    pub total_arrows: u32,
    pub lane_counts: Vec<u32>,
    pub total_steps: u32,
    pub jumps: u32,
    pub hands: u32,
    pub quads: u32,
    pub holds: u32,
    pub rolls: u32,
    pub mines: u32,
    pub lifts: u32,
    pub fakes: u32,
    pub effects: u32,
}

#[inline(always)]
fn row_range(start_row: i32, end_row: i32) -> Range<i32> {
    // BTreeMap::range panics on inverted bounds.
    start_row..end_row.max(start_row)
}

/// Sparse per-lane note stream plus the hold intervals that span rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteData {
    lanes: Vec<BTreeMap<i32, TapNote>>,
    // Sorted by (start_row, lane).
    holds: Vec<HoldNote>,
}

impl NoteData {
    pub fn new(num_lanes: usize) -> Self {
        assert!(num_lanes > 0, "a chart needs at least one lane");
        Self { lanes: vec![BTreeMap::new(); num_lanes], holds: Vec::new() }
    }

    #[inline(always)]
    pub fn num_lanes(&self) -> usize {
        self.lanes.len()
    }

    #[inline(always)]
    fn check_lane(&self, lane: usize) {
        assert!(lane < self.lanes.len(), "lane {lane} out of range for {} lanes", self.lanes.len());
    }

    fn lane_indices(&self, lanes: Lanes) -> Range<usize> {
        match lanes {
            Lanes::All => 0..self.lanes.len(),
            Lanes::One(lane) => {
                self.check_lane(lane);
                lane..lane + 1
            }
        }
    }

    // --- Point operations ---

    pub fn get(&self, lane: usize, row: i32) -> &TapNote {
        self.check_lane(lane);
        self.lanes[lane].get(&row).unwrap_or(&EMPTY)
    }

    /// Writes one event. `Empty` erases. Writing a note anywhere on a hold, or
    /// erasing its head or tail, drops that hold. Erasing a bare row inside a
    /// hold leaves it alone. Hold markers go through [`NoteData::add_hold`].
    pub fn set(&mut self, lane: usize, row: i32, note: TapNote) {
        self.check_lane(lane);
        assert!(!note.is_hold_marker(), "hold markers are placed with add_hold, not set");
        if let Some(idx) = self.hold_index_at(lane, row) {
            let hold = self.holds[idx];
            if !note.is_empty() || row == hold.start_row || row == hold.end_row {
                self.remove_hold_at_index(idx);
            }
        }
        if note.is_empty() {
            self.lanes[lane].remove(&row);
        } else {
            self.lanes[lane].insert(row, note);
        }
    }

    // --- Iteration ---

    pub fn next_occupied_row(&self, lane: usize, after_row: i32) -> Option<i32> {
        self.check_lane(lane);
        self.lanes[lane].range((Excluded(after_row), Unbounded)).next().map(|(r, _)| *r)
    }

    pub fn prev_occupied_row(&self, lane: usize, before_row: i32) -> Option<i32> {
        self.check_lane(lane);
        self.lanes[lane].range(..before_row).next_back().map(|(r, _)| *r)
    }

    pub fn next_occupied_row_any_lane(&self, after_row: i32) -> Option<i32> {
        (0..self.lanes.len()).filter_map(|l| self.next_occupied_row(l, after_row)).min()
    }

    pub fn prev_occupied_row_any_lane(&self, before_row: i32) -> Option<i32> {
        (0..self.lanes.len()).filter_map(|l| self.prev_occupied_row(l, before_row)).max()
    }

    pub fn occupied_rows(&self, start_row: i32, end_row: i32) -> OccupiedRows<'_> {
        OccupiedRows { data: self, front: start_row, back: end_row }
    }

    pub fn lane_notes(
        &self,
        lane: usize,
        start_row: i32,
        end_row: i32,
    ) -> impl DoubleEndedIterator<Item = (i32, &TapNote)> + '_ {
        self.check_lane(lane);
        self.lanes[lane].range(row_range(start_row, end_row)).map(|(r, n)| (*r, n))
    }

    pub fn notes_at_row(&self, row: i32) -> SmallVec<[(usize, &TapNote); 8]> {
        self.lanes
            .iter()
            .enumerate()
            .filter_map(|(lane, notes)| notes.get(&row).map(|n| (lane, n)))
            .collect()
    }

    // --- Holds ---

    fn hold_index_at(&self, lane: usize, row: i32) -> Option<usize> {
        let candidates = self.holds.partition_point(|h| h.start_row <= row);
        self.holds[..candidates].iter().rposition(|h| h.lane == lane && h.contains(row))
    }

    fn remove_hold_at_index(&mut self, idx: usize) -> HoldNote {
        let hold = self.holds.remove(idx);
        let lane = &mut self.lanes[hold.lane];
        lane.remove(&hold.start_row);
        lane.remove(&hold.end_row);
        hold
    }

    /// Adds a hold, merging it with every hold it touches in the lane. Anything
    /// else inside the merged span is cleared.
    pub fn add_hold(&mut self, lane: usize, start_row: i32, end_row: i32, kind: HoldKind) {
        self.check_lane(lane);
        assert!(start_row < end_row, "hold must end after it starts ({start_row}..{end_row})");

        let (mut start, mut end) = (start_row, end_row);
        let mut i = 0;
        while i < self.holds.len() {
            let hold = self.holds[i];
            if hold.lane == lane && hold.overlaps(start, end) {
                start = start.min(hold.start_row);
                end = end.max(hold.end_row);
                self.remove_hold_at_index(i);
            } else {
                i += 1;
            }
        }

        let covered: SmallVec<[i32; 16]> =
            self.lanes[lane].range(start..=end).map(|(r, _)| *r).collect();
        for row in covered {
            self.lanes[lane].remove(&row);
        }
        self.lanes[lane].insert(start, TapNote::HoldHead(kind));
        self.lanes[lane].insert(end, TapNote::HoldTail);

        let hold = HoldNote { lane, start_row: start, end_row: end };
        let pos = self.holds.partition_point(|h| (h.start_row, h.lane) < (start, lane));
        self.holds.insert(pos, hold);
    }

    pub fn remove_hold(&mut self, lane: usize, row: i32) -> Option<HoldNote> {
        self.check_lane(lane);
        self.hold_index_at(lane, row).map(|idx| self.remove_hold_at_index(idx))
    }

    /// `(head_row, tail_row)` of the hold covering `row`, ends included.
    pub fn is_hold_at(&self, lane: usize, row: i32) -> Option<(i32, i32)> {
        self.check_lane(lane);
        self.hold_index_at(lane, row).map(|idx| {
            let hold = self.holds[idx];
            (hold.start_row, hold.end_row)
        })
    }

    #[inline(always)]
    pub fn holds(&self) -> &[HoldNote] {
        &self.holds
    }

    pub fn holds_in_lane(&self, lane: usize) -> impl Iterator<Item = &HoldNote> + '_ {
        self.check_lane(lane);
        self.holds.iter().filter(move |h| h.lane == lane)
    }

    pub fn hold_kind(&self, hold: &HoldNote) -> HoldKind {
        match self.get(hold.lane, hold.start_row) {
            TapNote::HoldHead(kind) => *kind,
            _ => HoldKind::Hold,
        }
    }

    // --- Bulk operations ---

    /// Erases `[start_row, end_row)` in the selected lanes. Holds crossing the
    /// boundaries keep the parts outside the range.
    pub fn clear_range(&mut self, lanes: Lanes, start_row: i32, end_row: i32) {
        if start_row >= end_row {
            return;
        }
        for lane in self.lane_indices(lanes) {
            let mut pieces: SmallVec<[(i32, i32, HoldKind); 4]> = SmallVec::new();
            let mut i = 0;
            while i < self.holds.len() {
                let hold = self.holds[i];
                if hold.lane == lane && hold.start_row < end_row && hold.end_row >= start_row {
                    let kind = self.hold_kind(&hold);
                    self.remove_hold_at_index(i);
                    if hold.start_row < start_row - 1 {
                        pieces.push((hold.start_row, start_row - 1, kind));
                    }
                    if end_row < hold.end_row {
                        pieces.push((end_row, hold.end_row, kind));
                    }
                } else {
                    i += 1;
                }
            }

            let doomed: SmallVec<[i32; 16]> =
                self.lanes[lane].range(start_row..end_row).map(|(r, _)| *r).collect();
            for row in doomed {
                self.lanes[lane].remove(&row);
            }
            for (start, end, kind) in pieces {
                self.add_hold(lane, start, end, kind);
            }
        }
    }

    /// Replaces `[dest_row, dest_row + (end_row - start_row))` with the events of
    /// `src` in `[start_row, end_row)`. Holds are cut at the source boundaries.
    pub fn copy_range(&mut self, src: &NoteData, start_row: i32, end_row: i32, dest_row: i32) {
        assert_eq!(
            self.num_lanes(),
            src.num_lanes(),
            "copy_range needs matching lane counts"
        );
        if start_row >= end_row {
            return;
        }
        let shift = dest_row - start_row;
        self.clear_range(Lanes::All, dest_row, dest_row + (end_row - start_row));

        for lane in 0..src.num_lanes() {
            for (row, note) in src.lane_notes(lane, start_row, end_row) {
                if !note.is_hold_marker() {
                    self.lanes[lane].insert(row + shift, note.clone());
                }
            }
        }
        for hold in &src.holds {
            if hold.start_row >= end_row || hold.end_row < start_row {
                continue;
            }
            let start = hold.start_row.max(start_row);
            let end = hold.end_row.min(end_row - 1);
            if start < end {
                self.add_hold(hold.lane, start + shift, end + shift, src.hold_kind(hold));
            }
        }
    }

    pub fn copy_all(&mut self, src: &NoteData) {
        self.clone_from(src);
    }

    /// Builds a new store where `mapping[new_lane]` names the source lane to
    /// copy into it (`None` leaves the lane empty).
    pub fn remap_lanes(&self, new_lane_count: usize, mapping: &[Option<usize>]) -> NoteData {
        assert_eq!(
            mapping.len(),
            new_lane_count,
            "lane mapping must name a source for every output lane"
        );
        let mut out = NoteData::new(new_lane_count);
        for (new_lane, source) in mapping.iter().enumerate() {
            let Some(old_lane) = *source else { continue };
            self.check_lane(old_lane);
            out.lanes[new_lane] = self.lanes[old_lane].clone();
            for hold in self.holds.iter().filter(|h| h.lane == old_lane) {
                out.holds.push(HoldNote { lane: new_lane, ..*hold });
            }
        }
        out.holds.sort_by_key(|h| (h.start_row, h.lane));
        out
    }

    // Rebuilds the store through a row mapping. Notes that collide keep the
    // later source row; holds that collapse to zero length are dropped.
    fn remapped_rows(
        &self,
        map_row: impl Fn(i32) -> Option<i32>,
        map_hold: impl Fn(&HoldNote) -> Option<(i32, i32)>,
    ) -> NoteData {
        let mut out = NoteData::new(self.num_lanes());
        for (lane, notes) in self.lanes.iter().enumerate() {
            for (row, note) in notes {
                if note.is_hold_marker() {
                    continue;
                }
                if let Some(new_row) = map_row(*row) {
                    out.lanes[lane].insert(new_row, note.clone());
                }
            }
        }
        for hold in &self.holds {
            if let Some((start, end)) = map_hold(hold) {
                if start < end {
                    out.add_hold(hold.lane, start, end, self.hold_kind(hold));
                }
            }
        }
        out
    }

    pub fn insert_rows(&mut self, at_row: i32, count: i32) {
        if count <= 0 {
            return;
        }
        let shift = |row: i32| if row >= at_row { row + count } else { row };
        *self = self.remapped_rows(
            |r| Some(shift(r)),
            |h| Some((shift(h.start_row), shift(h.end_row))),
        );
    }

    /// Removes `[at_row, at_row + count)`. Holds whose head is removed go with
    /// it; holds reaching into the span are shortened.
    pub fn delete_rows(&mut self, at_row: i32, count: i32) {
        if count <= 0 {
            return;
        }
        let end_row = at_row + count;
        let map_row = |row: i32| {
            if row < at_row {
                Some(row)
            } else if row < end_row {
                None
            } else {
                Some(row - count)
            }
        };
        let map_hold = |h: &HoldNote| {
            if h.start_row >= end_row {
                Some((h.start_row - count, h.end_row - count))
            } else if h.start_row >= at_row {
                None
            } else if h.end_row < at_row {
                Some((h.start_row, h.end_row))
            } else if h.end_row < end_row {
                Some((h.start_row, at_row - 1))
            } else {
                Some((h.start_row, h.end_row - count))
            }
        };
        *self = self.remapped_rows(map_row, map_hold);
    }

    pub fn scale_region(&mut self, start_row: i32, end_row: i32, factor: f32) {
        assert!(factor > 0.0, "scale factor must be positive, got {factor}");
        if start_row >= end_row {
            return;
        }
        let map = |row: i32| scale_row(row, start_row, end_row, factor);
        *self = self.remapped_rows(|r| Some(map(r)), |h| Some((map(h.start_row), map(h.end_row))));
    }

    // --- Aggregate scans ---

    pub fn first_occupied_row(&self) -> Option<i32> {
        self.lanes.iter().filter_map(|l| l.keys().next().copied()).min()
    }

    pub fn last_occupied_row(&self) -> Option<i32> {
        self.lanes.iter().filter_map(|l| l.keys().next_back().copied()).max()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(BTreeMap::is_empty)
    }

    pub fn is_row_empty(&self, row: i32) -> bool {
        self.lanes.iter().all(|l| !l.contains_key(&row))
    }

    pub fn is_range_empty(&self, lane: usize, start_row: i32, end_row: i32) -> bool {
        self.lane_notes(lane, start_row, end_row).next().is_none()
    }

    pub fn num_notes_in_row(&self, row: i32) -> usize {
        self.lanes.iter().filter(|l| l.contains_key(&row)).count()
    }

    pub fn count_taps(&self) -> usize {
        self.lanes.iter().flat_map(BTreeMap::values).filter(|n| n.is_step()).count()
    }

    pub fn count_holds(&self, kind: HoldKind) -> usize {
        self.holds.iter().filter(|h| self.hold_kind(h) == kind).count()
    }

    pub fn count_mines(&self) -> usize {
        self.lanes.iter().flat_map(BTreeMap::values).filter(|n| matches!(n, TapNote::Mine)).count()
    }

    fn steps_per_row(&self) -> FxHashMap<i32, u32> {
        let mut per_row: FxHashMap<i32, u32> = FxHashMap::default();
        for notes in &self.lanes {
            for (row, note) in notes {
                if note.is_step() {
                    *per_row.entry(*row).or_insert(0) += 1;
                }
            }
        }
        per_row
    }

    /// Rows with at least `min_steps` simultaneous steps.
    pub fn count_rows_with_at_least(&self, min_steps: u32) -> usize {
        self.steps_per_row().values().filter(|&&n| n >= min_steps).count()
    }

    pub fn stats(&self) -> NoteStats {
        let mut stats = NoteStats { lane_counts: vec![0; self.num_lanes()], ..Default::default() };

        for (lane, notes) in self.lanes.iter().enumerate() {
            for note in notes.values() {
                match note {
                    TapNote::Tap | TapNote::HoldHead(_) | TapNote::Lift => {
                        stats.total_arrows += 1;
                        stats.lane_counts[lane] += 1;
                    }
                    TapNote::Mine => stats.mines += 1,
                    TapNote::Fake => stats.fakes += 1,
                    TapNote::TimedEffect(_) => stats.effects += 1,
                    TapNote::Empty | TapNote::HoldTail | TapNote::Addition => {}
                }
                if matches!(note, TapNote::Lift) {
                    stats.lifts += 1;
                }
            }
        }
        for hold in &self.holds {
            match self.hold_kind(hold) {
                HoldKind::Hold => stats.holds += 1,
                HoldKind::Roll => stats.rolls += 1,
            }
        }

        let per_row = self.steps_per_row();
        stats.total_steps = per_row.len() as u32;
        for (&row, &count) in &per_row {
            if count >= 2 {
                stats.jumps += 1;
            }
            if count >= 4 {
                stats.quads += 1;
            }
            let held =
                self.holds.iter().filter(|h| h.start_row < row && row <= h.end_row).count() as u32;
            if count + held >= 3 {
                stats.hands += 1;
            }
        }
        debug!("Note stats: {stats:?}");
        stats
    }
}

/// Distinct occupied rows across all lanes in `[front, back)`, in either
/// direction. [`OccupiedRows::seek`] restarts the forward side.
pub struct OccupiedRows<'a> {
    data: &'a NoteData,
    front: i32,
    back: i32,
}

impl OccupiedRows<'_> {
    pub fn seek(&mut self, row: i32) {
        self.front = row;
    }
}

impl Iterator for OccupiedRows<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        let range = row_range(self.front, self.back);
        let row = self
            .data
            .lanes
            .iter()
            .filter_map(|l| l.range(range.clone()).next().map(|(r, _)| *r))
            .min()?;
        self.front = row + 1;
        Some(row)
    }
}

impl DoubleEndedIterator for OccupiedRows<'_> {
    fn next_back(&mut self) -> Option<i32> {
        let range = row_range(self.front, self.back);
        let row = self
            .data
            .lanes
            .iter()
            .filter_map(|l| l.range(range.clone()).next_back().map(|(r, _)| *r))
            .max()?;
        self.back = row;
        Some(row)
    }
}
