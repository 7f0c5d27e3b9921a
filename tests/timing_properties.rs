use deadsync_chart::game::timing::{ROWS_PER_BEAT, TimingData, bpm_to_bps};
use proptest::prelude::*;

const MAX_ROW: i32 = 64 * ROWS_PER_BEAT;

fn positive_timing() -> impl Strategy<Value = TimingData> {
    (
        0.5f32..6.0,
        prop::collection::vec((1..MAX_ROW / 12, 0.5f32..6.0), 0..8),
        prop::collection::vec((0..MAX_ROW / 12, 0.01f32..2.0), 0..6),
    )
        .prop_map(|(first_bps, tempos, pauses)| {
            let mut timing = TimingData::new(0.0);
            timing.add_tempo_change(0, first_bps);
            for (slot, bps) in tempos {
                timing.add_tempo_change(slot * 12, bps);
            }
            for (slot, seconds) in pauses {
                timing.add_pause(slot * 12, seconds);
            }
            timing.tidy(None);
            timing
        })
}

fn warped_timing() -> impl Strategy<Value = TimingData> {
    (
        0.5f32..6.0,
        prop::collection::vec((1..MAX_ROW / 12, 0.5f32..6.0, any::<bool>()), 1..8),
        prop::collection::vec((0..MAX_ROW / 12, -2.0f32..2.0), 0..6),
    )
        .prop_map(|(first_bps, tempos, pauses)| {
            let mut timing = TimingData::new(0.0);
            timing.add_tempo_change(0, first_bps);
            for (slot, bps, negative) in tempos {
                timing.add_tempo_change(slot * 12, if negative { -bps } else { bps });
            }
            for (slot, seconds) in pauses {
                timing.add_pause(slot * 12, seconds);
            }
            timing
        })
}

#[test]
fn pause_example_from_the_editor_manual() {
    let mut timing = TimingData::with_bpm(0.0, 120.0);
    assert!((timing.elapsed_seconds_from_beat(4.0) - 2.0).abs() < 1e-5);
    timing.add_pause(4 * ROWS_PER_BEAT, 0.5);
    assert!(
        (timing.elapsed_seconds_from_beat(8.0) - 4.5).abs() < 1e-5,
        "2s to the stop, 0.5s stopped, 2s more"
    );
}

#[test]
fn negative_tempo_is_monotonic_after_stabilizing() {
    let mut timing = TimingData::with_bpm(0.0, 150.0);
    timing.add_tempo_change(8 * ROWS_PER_BEAT, bpm_to_bps(-150.0));
    timing.add_tempo_change(9 * ROWS_PER_BEAT, bpm_to_bps(150.0));
    let ranges = timing.stabilize_warps();
    assert_eq!(ranges.len(), 1);
    assert!(timing.tempo_segments().iter().all(|s| s.bps > 0.0));

    let mut prev = f32::MIN;
    for step in 0..(16 * ROWS_PER_BEAT) {
        let t = timing.elapsed_seconds_from_beat(step as f32 / ROWS_PER_BEAT as f32);
        assert!(t >= prev - 1e-5, "time went backwards at row {step}: {t} < {prev}");
        prev = t;
    }
}

proptest! {
    #[test]
    fn beat_time_round_trip(timing in positive_timing(), beat in 0.0f32..64.0) {
        let seconds = timing.elapsed_seconds_from_beat(beat);
        let info = timing.beats_and_rate_from_elapsed_seconds(seconds);
        prop_assert!(
            (info.beat - beat).abs() < 2e-3,
            "beat {} -> {}s -> beat {}", beat, seconds, info.beat
        );
    }

    #[test]
    fn offset_wrappers_round_trip(
        timing in positive_timing(),
        beat in 0.0f32..64.0,
        offset in -1.0f32..1.0,
        global in -0.05f32..0.05,
    ) {
        let mut timing = timing;
        timing.set_offset_seconds(offset);
        let t = timing.music_time_from_beat(beat, global);
        let back = timing.beat_info_from_music_time(t, global).beat;
        prop_assert!((back - beat).abs() < 2e-3, "beat {} came back as {}", beat, back);
    }

    #[test]
    fn set_then_restore_tempo_is_a_no_op(
        timing in positive_timing(),
        slot in 1..MAX_ROW / 12,
        bps in 0.5f32..6.0,
    ) {
        let row = slot * 12;
        let mut edited = timing.clone();
        let prior = edited.tempo_segments().iter().find(|s| s.row == row).map(|s| s.bps);
        let in_effect = edited.bps_at_row(row);
        prop_assume!((in_effect - bps).abs() > 1e-3);
        edited.set_tempo_at_row(row, bps);
        edited.set_tempo_at_row(row, prior.unwrap_or(in_effect));
        prop_assert_eq!(edited.tempo_segments(), timing.tempo_segments());
    }

    #[test]
    fn insert_rows_shifts_only_later_segments(
        timing in positive_timing(),
        at in 1..MAX_ROW,
        count in 1..200i32,
    ) {
        let mut shifted = timing.clone();
        shifted.insert_rows(at, count);
        let expect: Vec<i32> = timing
            .tempo_segments()
            .iter()
            .map(|s| if s.row >= at { s.row + count } else { s.row })
            .collect();
        let got: Vec<i32> = shifted.tempo_segments().iter().map(|s| s.row).collect();
        prop_assert_eq!(got, expect);
        let expect: Vec<i32> = timing
            .pause_segments()
            .iter()
            .map(|s| if s.row >= at { s.row + count } else { s.row })
            .collect();
        let got: Vec<i32> = shifted.pause_segments().iter().map(|s| s.row).collect();
        prop_assert_eq!(got, expect);
    }

    #[test]
    fn delete_rows_keeps_sync_after_the_cut(
        timing in positive_timing(),
        at in 0..MAX_ROW / 2,
        count in 1..400i32,
    ) {
        let mut cut = timing.clone();
        cut.delete_rows(at, count);
        let end = at + count;
        prop_assert!((cut.bps_at_row(at) - timing.bps_at_row(end)).abs() < 1e-4);
        prop_assert_eq!(cut.tempo_segments()[0].row, 0);
        prop_assert!(cut.tempo_segments().windows(2).all(|w| w[0].row < w[1].row));
    }

    #[test]
    fn multiply_rate_leaves_outside_untouched(
        timing in positive_timing(),
        start in 0..MAX_ROW,
        len in 1..MAX_ROW,
        factor in 0.25f32..4.0,
    ) {
        let end = start + len;
        let mut scaled = timing.clone();
        scaled.multiply_rate_in_row_range(start, end, factor);
        for row in [start - 1, end, end + 7] {
            if row >= 0 {
                let drift = (scaled.bps_at_row(row) - timing.bps_at_row(row)).abs();
                prop_assert!(drift < 1e-4, "row {} changed", row);
            }
        }
        for row in [start, (start + end) / 2, end - 1] {
            let expect = timing.bps_at_row(row) * factor;
            let drift = (scaled.bps_at_row(row) - expect).abs();
            prop_assert!(drift < 1e-3 * expect.max(1.0), "row {} not scaled", row);
        }
    }

    #[test]
    fn stabilized_time_never_runs_backwards(timing in warped_timing()) {
        let mut timing = timing;
        timing.stabilize_warps();
        prop_assert!(!timing.has_negative_segments());

        let mut prev = f32::MIN;
        for step in 0..(70 * 4) {
            let beat = step as f32 / 4.0;
            let t = timing.elapsed_seconds_from_beat(beat);
            prop_assert!(t >= prev - 1e-4, "beat {} at {}s after {}s", beat, t, prev);
            prev = t;
        }

        let once = timing.clone();
        prop_assert!(timing.stabilize_warps().is_empty());
        prop_assert_eq!(timing, once);
    }
}
