use crate::game::timing::note_row_to_beat;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HoldKind {
    Hold,
    Roll,
}

/// Modifier string applied for a while starting at the row it sits on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimedEffect {
    pub modifiers: String,
    pub duration_seconds: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum TapNote {
    #[default]
    Empty,
    Tap,
    HoldHead(HoldKind),
    HoldTail,
    Mine,
    Lift,
    Fake,
    Addition,
    TimedEffect(TimedEffect),
}

impl TapNote {
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        matches!(self, TapNote::Empty)
    }

    #[inline(always)]
    pub fn is_hold_marker(&self) -> bool {
        matches!(self, TapNote::HoldHead(_) | TapNote::HoldTail)
    }

    /// Notes the player steps on; these are what jumps and hands are made of.
    #[inline(always)]
    pub fn is_step(&self) -> bool {
        matches!(self, TapNote::Tap | TapNote::HoldHead(_) | TapNote::Lift)
    }

    #[inline(always)]
    pub fn is_judgable(&self) -> bool {
        matches!(
            self,
            TapNote::Tap | TapNote::HoldHead(_) | TapNote::HoldTail | TapNote::Mine | TapNote::Lift
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoldNote {
    pub lane: usize,
    pub start_row: i32,
    pub end_row: i32,
}

impl HoldNote {
    /// Head and tail rows both count as covered.
    #[inline(always)]
    pub fn contains(&self, row: i32) -> bool {
        self.start_row <= row && row <= self.end_row
    }

    #[inline(always)]
    pub fn overlaps(&self, start_row: i32, end_row: i32) -> bool {
        self.start_row <= end_row && start_row <= self.end_row
    }

    #[inline(always)]
    pub fn len_rows(&self) -> i32 {
        self.end_row - self.start_row
    }

    #[inline(always)]
    pub fn start_beat(&self) -> f32 {
        note_row_to_beat(self.start_row)
    }

    #[inline(always)]
    pub fn end_beat(&self) -> f32 {
        note_row_to_beat(self.end_row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_bounds_are_inclusive() {
        let hold = HoldNote { lane: 0, start_row: 48, end_row: 96 };
        assert!(hold.contains(48) && hold.contains(96));
        assert!(!hold.contains(47) && !hold.contains(97));
        assert!(hold.overlaps(96, 120), "touching at the tail overlaps");
        assert!(!hold.overlaps(97, 120));
        assert_eq!(hold.len_rows(), 48);
        assert_eq!((hold.start_beat(), hold.end_beat()), (1.0, 2.0));
    }

    #[test]
    fn fakes_and_effects_are_not_judged() {
        let effect = TapNote::TimedEffect(TimedEffect {
            modifiers: "*2 0.5x".into(),
            duration_seconds: 1.0,
        });
        assert!(!TapNote::Fake.is_judgable());
        assert!(!TapNote::Addition.is_judgable());
        assert!(!effect.is_judgable());
        assert!(TapNote::Mine.is_judgable() && !TapNote::Mine.is_step());
        assert!(TapNote::Lift.is_step());
        assert!(TapNote::HoldHead(HoldKind::Roll).is_hold_marker());
        assert!(TapNote::default().is_empty());
    }
}
