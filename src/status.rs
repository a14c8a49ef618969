//! Periodic one-line status display.
//!
//! Reads counter snapshots only; never touches engine state.

use std::io::Write;

use sb_ir::EventKind;
use sb_master::StatsSnapshot;

/// Format the status line for one snapshot.
pub fn status_line(stats: &StatsSnapshot, frames: u64, sample_rate: u32) -> String {
    let secs = frames as f64 / sample_rate.max(1) as f64;
    format!(
        concat!(
            "{:>7.2}s | voices {:>2} | events {:>5} | last {:<10} | ",
            "stolen {:>3} | dropped {:>3} | late {:>3}"
        ),
        secs,
        stats.active_voices,
        stats.events_applied,
        kind_label(stats.last_event),
        stats.voices_stolen,
        stats.events_malformed + stats.events_overflowed,
        stats.missed_deadlines,
    )
}

pub fn print_status(stats: &StatsSnapshot, frames: u64, sample_rate: u32) {
    print!("\r{}", status_line(stats, frames, sample_rate));
    let _ = std::io::stdout().flush();
}

fn kind_label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::None => "-",
        EventKind::NoteOn => "note on",
        EventKind::NoteOff => "note off",
        EventKind::ControlChange => "control",
        EventKind::ContinuousInput => "scratch",
    }
}
