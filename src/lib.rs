//! Timing engine and note data store for SM/ITG charts.
//!
//! [`game::timing::TimingData`] maps between beats and seconds,
//! [`game::note_data::NoteData`] holds the note stream, and
//! [`game::chart::Steps`] ties the two together for one chart.

pub mod config;
pub mod game;

pub use game::chart::Steps;
pub use game::note::{HoldKind, HoldNote, TapNote, TimedEffect};
pub use game::note_data::{Lanes, NoteData, NoteStats};
pub use game::timing::{BeatInfo, PauseSegment, ROWS_PER_BEAT, TempoSegment, TimingData, WarpRange};

/// Installs `env_logger`, loads `deadsync.ini`, then applies its log level.
pub fn init_logging() {
    // Trace is the ceiling; the effective level comes from the config once loaded.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    log::set_max_level(log::LevelFilter::Warn);
    config::load();
    log::set_max_level(config::get().log_level.as_level_filter());
}
