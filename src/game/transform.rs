use crate::game::note::TapNote;
use crate::game::note_data::NoteData;
use crate::game::timing::ROWS_PER_BEAT;
use log::{debug, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const PAD_LANES: usize = 4;

// mapping[new_lane] = old_lane for one L D U R pad.
const LEFT: [usize; PAD_LANES] = [2, 0, 3, 1];
const RIGHT: [usize; PAD_LANES] = [1, 3, 0, 2];
const LR_MIRROR: [usize; PAD_LANES] = [3, 1, 2, 0];
const UD_MIRROR: [usize; PAD_LANES] = [0, 2, 1, 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TurnOption {
    #[default]
    None,
    Mirror,
    Left,
    Right,
    LRMirror,
    UDMirror,
    Shuffle,
}

impl FromStr for TurnOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut key = String::with_capacity(s.len());
        for ch in s.trim().chars() {
            if ch.is_ascii_alphanumeric() {
                key.push(ch.to_ascii_lowercase());
            }
        }
        match key.as_str() {
            "" | "none" | "noturn" | "noturning" | "noturns" => Ok(Self::None),
            "mirror" => Ok(Self::Mirror),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "lrmirror" => Ok(Self::LRMirror),
            "udmirror" => Ok(Self::UDMirror),
            "shuffle" => Ok(Self::Shuffle),
            other => Err(format!("'{other}' is not a valid Turn setting")),
        }
    }
}

impl core::fmt::Display for TurnOption {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Mirror => write!(f, "Mirror"),
            Self::Left => write!(f, "Left"),
            Self::Right => write!(f, "Right"),
            Self::LRMirror => write!(f, "LRMirror"),
            Self::UDMirror => write!(f, "UDMirror"),
            Self::Shuffle => write!(f, "Shuffle"),
        }
    }
}

fn per_pad(num_lanes: usize, pad: &[usize; PAD_LANES], turn: TurnOption) -> Vec<usize> {
    if num_lanes % PAD_LANES != 0 {
        warn!(
            "{turn} needs a multiple of {PAD_LANES} lanes, got {num_lanes}; leaving lanes as-is."
        );
        return (0..num_lanes).collect();
    }
    (0..num_lanes).map(|lane| lane - lane % PAD_LANES + pad[lane % PAD_LANES]).collect()
}

/// `mapping[new_lane] = old_lane` for `turn` on a chart with `num_lanes` lanes.
pub fn lane_mapping(turn: TurnOption, num_lanes: usize, seed: u64) -> Vec<usize> {
    match turn {
        TurnOption::None => (0..num_lanes).collect(),
        TurnOption::Mirror => (0..num_lanes).rev().collect(),
        TurnOption::Left => per_pad(num_lanes, &LEFT, turn),
        TurnOption::Right => per_pad(num_lanes, &RIGHT, turn),
        TurnOption::LRMirror => per_pad(num_lanes, &LR_MIRROR, turn),
        TurnOption::UDMirror => per_pad(num_lanes, &UD_MIRROR, turn),
        TurnOption::Shuffle => {
            let identity: Vec<usize> = (0..num_lanes).collect();
            let mut rng = StdRng::seed_from_u64(seed);
            let mut mapping = identity.clone();
            // A shuffle that changes nothing reads as a bug to the player.
            for _ in 0..8 {
                mapping.shuffle(&mut rng);
                if num_lanes < 2 || mapping != identity {
                    break;
                }
            }
            mapping
        }
    }
}

pub fn apply_turn(notes: &NoteData, turn: TurnOption, seed: u64) -> NoteData {
    if turn == TurnOption::None {
        return notes.clone();
    }
    let mapping: Vec<Option<usize>> =
        lane_mapping(turn, notes.num_lanes(), seed).into_iter().map(Some).collect();
    debug!("Applying turn {turn}: {mapping:?}");
    notes.remap_lanes(notes.num_lanes(), &mapping)
}

pub fn remove_mines(notes: &mut NoteData) {
    for lane in 0..notes.num_lanes() {
        let mines: Vec<i32> = notes
            .lane_notes(lane, i32::MIN, i32::MAX)
            .filter(|(_, n)| matches!(n, TapNote::Mine))
            .map(|(row, _)| row)
            .collect();
        for row in mines {
            notes.set(lane, row, TapNote::Empty);
        }
    }
}

/// Turns every hold and roll into a plain tap on its head row.
pub fn holds_to_taps(notes: &mut NoteData) {
    let holds = notes.holds().to_vec();
    for hold in holds {
        notes.remove_hold(hold.lane, hold.start_row);
        notes.set(hold.lane, hold.start_row, TapNote::Tap);
    }
}

/// Keeps only notes on quarter-note rows.
pub fn little(notes: &mut NoteData) {
    let off_beat_holds: Vec<(usize, i32)> = notes
        .holds()
        .iter()
        .filter(|h| h.start_row % ROWS_PER_BEAT != 0)
        .map(|h| (h.lane, h.start_row))
        .collect();
    for (lane, row) in off_beat_holds {
        notes.remove_hold(lane, row);
    }
    for lane in 0..notes.num_lanes() {
        let off_beat: Vec<i32> = notes
            .lane_notes(lane, i32::MIN, i32::MAX)
            .filter(|(row, n)| row % ROWS_PER_BEAT != 0 && !n.is_hold_marker())
            .map(|(row, _)| row)
            .collect();
        for row in off_beat {
            notes.set(lane, row, TapNote::Empty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::note::HoldKind;

    fn one_note_per_lane() -> NoteData {
        let mut data = NoteData::new(4);
        for lane in 0..4 {
            data.set(lane, lane as i32 * 48, TapNote::Tap);
        }
        data
    }

    fn lane_of_row(data: &NoteData, row: i32) -> usize {
        data.notes_at_row(row)[0].0
    }

    #[test]
    fn parses_loose_spellings() {
        assert_eq!("LR-Mirror".parse::<TurnOption>(), Ok(TurnOption::LRMirror));
        assert_eq!(" no turn ".parse::<TurnOption>(), Ok(TurnOption::None));
        let text = TurnOption::UDMirror.to_string();
        assert_eq!(text.parse::<TurnOption>(), Ok(TurnOption::UDMirror));
        assert!("blender".parse::<TurnOption>().is_err());
    }

    #[test]
    fn left_rotates_arrows() {
        let turned = apply_turn(&one_note_per_lane(), TurnOption::Left, 0);
        // L -> D, D -> R, U -> L, R -> U
        assert_eq!(lane_of_row(&turned, 0), 1);
        assert_eq!(lane_of_row(&turned, 48), 3);
        assert_eq!(lane_of_row(&turned, 96), 0);
        assert_eq!(lane_of_row(&turned, 144), 2);
    }

    #[test]
    fn left_then_right_is_identity() {
        let data = one_note_per_lane();
        let back = apply_turn(&apply_turn(&data, TurnOption::Left, 0), TurnOption::Right, 0);
        assert_eq!(back, data);
    }

    #[test]
    fn mirror_twice_is_identity_with_holds() {
        let mut data = one_note_per_lane();
        data.add_hold(1, 200, 300, HoldKind::Roll);
        let once = apply_turn(&data, TurnOption::Mirror, 0);
        assert_eq!(once.is_hold_at(2, 250), Some((200, 300)));
        assert_eq!(apply_turn(&once, TurnOption::Mirror, 0), data);
    }

    #[test]
    fn doubles_turn_each_pad() {
        assert_eq!(lane_mapping(TurnOption::LRMirror, 8, 0), vec![3, 1, 2, 0, 7, 5, 6, 4]);
        assert_eq!(lane_mapping(TurnOption::Left, 5, 0), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn shuffle_is_seeded_permutation() {
        let a = lane_mapping(TurnOption::Shuffle, 4, 42);
        assert_eq!(a, lane_mapping(TurnOption::Shuffle, 4, 42), "same seed, same shuffle");
        assert_ne!(a, vec![0, 1, 2, 3]);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn filters_strip_what_they_name() {
        let mut data = NoteData::new(4);
        data.set(0, 0, TapNote::Mine);
        data.set(1, 12, TapNote::Tap);
        data.set(2, 48, TapNote::Tap);
        data.add_hold(3, 24, 96, HoldKind::Hold);
        data.add_hold(0, 96, 144, HoldKind::Roll);

        let mut no_mines = data.clone();
        remove_mines(&mut no_mines);
        assert_eq!(no_mines.count_mines(), 0);

        let mut tapped = data.clone();
        holds_to_taps(&mut tapped);
        assert!(tapped.holds().is_empty());
        assert_eq!(tapped.get(0, 96), &TapNote::Tap);
        assert_eq!(tapped.get(0, 144), &TapNote::Empty);

        let mut small = data.clone();
        little(&mut small);
        assert_eq!(small.get(1, 12), &TapNote::Empty);
        assert_eq!(small.is_hold_at(3, 50), None, "off-beat hold removed");
        assert_eq!(small.is_hold_at(0, 100), Some((96, 144)), "on-beat hold kept");
        assert_eq!(small.get(2, 48), &TapNote::Tap);
    }
}
