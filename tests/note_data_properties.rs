use deadsync_chart::game::note::{HoldKind, TapNote};
use deadsync_chart::game::note_data::{Lanes, NoteData};
use deadsync_chart::game::transform::{TurnOption, apply_turn};
use proptest::prelude::*;

const LANES: usize = 4;

#[derive(Debug, Clone)]
enum Edit {
    Set(usize, i32, TapNote),
    Hold(usize, i32, i32, HoldKind),
    Clear(Option<usize>, i32, i32),
    RemoveHold(usize, i32),
}

fn tap_note() -> impl Strategy<Value = TapNote> {
    prop_oneof![
        Just(TapNote::Empty),
        Just(TapNote::Tap),
        Just(TapNote::Mine),
        Just(TapNote::Lift),
        Just(TapNote::Fake),
    ]
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0..LANES, 0..400i32, tap_note()).prop_map(|(l, r, n)| Edit::Set(l, r, n)),
        (0..LANES, 0..400i32, 1..120i32, any::<bool>()).prop_map(|(l, r, len, roll)| {
            Edit::Hold(l, r, r + len, if roll { HoldKind::Roll } else { HoldKind::Hold })
        }),
        (prop::option::of(0..LANES), 0..400i32, 1..120i32)
            .prop_map(|(l, r, len)| Edit::Clear(l, r, r + len)),
        (0..LANES, 0..520i32).prop_map(|(l, r)| Edit::RemoveHold(l, r)),
    ]
}

fn apply(data: &mut NoteData, edit: &Edit) {
    match edit.clone() {
        Edit::Set(lane, row, note) => data.set(lane, row, note),
        Edit::Hold(lane, start, end, kind) => data.add_hold(lane, start, end, kind),
        Edit::Clear(lane, start, end) => {
            let lanes = lane.map_or(Lanes::All, Lanes::One);
            data.clear_range(lanes, start, end);
        }
        Edit::RemoveHold(lane, row) => {
            data.remove_hold(lane, row);
        }
    }
}

fn check_invariants(data: &NoteData) -> Result<(), TestCaseError> {
    for lane in 0..data.num_lanes() {
        for (row, note) in data.lane_notes(lane, i32::MIN, i32::MAX) {
            prop_assert!(!note.is_empty(), "Empty stored at lane {} row {}", lane, row);
            if note.is_hold_marker() {
                prop_assert!(
                    data.is_hold_at(lane, row).is_some(),
                    "orphan hold marker at {} {}", lane, row
                );
            }
        }
        let holds: Vec<_> = data.holds_in_lane(lane).copied().collect();
        for pair in holds.windows(2) {
            prop_assert!(pair[0].end_row < pair[1].start_row, "overlapping holds {:?}", pair);
        }
        for hold in &holds {
            prop_assert!(hold.start_row < hold.end_row);
            prop_assert!(matches!(data.get(lane, hold.start_row), TapNote::HoldHead(_)));
            prop_assert_eq!(data.get(lane, hold.end_row), &TapNote::HoldTail);
            prop_assert!(
                data.is_range_empty(lane, hold.start_row + 1, hold.end_row),
                "something inside hold {:?}", hold
            );
        }
    }
    Ok(())
}

#[test]
fn hold_over_taps_clears_them() {
    let mut data = NoteData::new(LANES);
    for row in [1, 30, 95] {
        data.set(1, row, TapNote::Tap);
    }
    data.set(1, 96 + 1, TapNote::Tap);
    data.add_hold(1, 0, 96, HoldKind::Hold);
    assert_eq!(data.holds_in_lane(1).count(), 1);
    assert!(data.is_range_empty(1, 1, 96), "taps under the hold are gone");
    assert_eq!(data.get(1, 97), &TapNote::Tap, "tap after the tail survives");
}

proptest! {
    #[test]
    fn set_empty_always_erases(lane in 0..LANES, row in -500..500i32, note in tap_note()) {
        let mut data = NoteData::new(LANES);
        data.set(lane, row, note);
        data.set(lane, row, TapNote::Empty);
        prop_assert_eq!(data.get(lane, row), &TapNote::Empty);
        prop_assert!(data.occupied_rows(i32::MIN, i32::MAX).next().is_none());
    }

    #[test]
    fn edits_keep_store_consistent(edits in prop::collection::vec(edit(), 1..40)) {
        let mut data = NoteData::new(LANES);
        for edit in &edits {
            apply(&mut data, edit);
            check_invariants(&data)?;
        }
    }

    #[test]
    fn overlapping_holds_merge_to_union(
        lane in 0..LANES,
        a in 0..300i32,
        alen in 1..100i32,
        b in 0..300i32,
        blen in 1..100i32,
    ) {
        prop_assume!(a <= b + blen && b <= a + alen);
        let mut data = NoteData::new(LANES);
        data.add_hold(lane, a, a + alen, HoldKind::Hold);
        data.add_hold(lane, b, b + blen, HoldKind::Hold);
        let holds: Vec<(i32, i32)> =
            data.holds().iter().map(|h| (h.start_row, h.end_row)).collect();
        prop_assert_eq!(holds, vec![(a.min(b), (a + alen).max(b + blen))]);
    }

    #[test]
    fn occupied_rows_match_both_directions(edits in prop::collection::vec(edit(), 1..30)) {
        let mut data = NoteData::new(LANES);
        for edit in &edits {
            apply(&mut data, edit);
        }
        let forward: Vec<i32> = data.occupied_rows(0, 600).collect();
        let mut backward: Vec<i32> = data.occupied_rows(0, 600).rev().collect();
        backward.reverse();
        prop_assert_eq!(&forward, &backward);
        prop_assert!(forward.windows(2).all(|w| w[0] < w[1]));
        for row in &forward {
            prop_assert!(!data.is_row_empty(*row));
        }
    }

    #[test]
    fn mirror_twice_is_identity(edits in prop::collection::vec(edit(), 1..30)) {
        let mut data = NoteData::new(LANES);
        for edit in &edits {
            apply(&mut data, edit);
        }
        let back = apply_turn(&apply_turn(&data, TurnOption::Mirror, 0), TurnOption::Mirror, 0);
        prop_assert_eq!(back, data);
    }

    #[test]
    fn copy_range_reproduces_source_span(
        edits in prop::collection::vec(edit(), 1..30),
        start in 0..200i32,
        len in 1..200i32,
    ) {
        let mut src = NoteData::new(LANES);
        for edit in &edits {
            apply(&mut src, edit);
        }
        let mut dest = NoteData::new(LANES);
        dest.copy_range(&src, start, start + len, 1000);
        check_invariants(&dest)?;
        for lane in 0..LANES {
            for (row, note) in src.lane_notes(lane, start, start + len) {
                if !note.is_hold_marker() {
                    prop_assert_eq!(dest.get(lane, row - start + 1000), note);
                }
            }
        }
    }
}
