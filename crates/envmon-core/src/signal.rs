//! Signal-strength bars and status icon animation.
//!
//! The display shows two icons: WiFi and server. Each icon is either an
//! animation frame or an error placeholder.

use crate::model::{BindStatus, LinkView};

/// RSSI at or below which the signal counts as unusable (dBm).
pub const RSSI_FLOOR_DBM: i32 = -90;

/// RSSI at or above which the signal counts as excellent (dBm).
pub const RSSI_CEILING_DBM: i32 = -30;

/// Returned by [`signal_bars`] for readings outside the mapped range.
pub const OUT_OF_RANGE: i32 = -1;

/// Number of frames in the WiFi icon strip (zero to three bars).
pub const WIFI_FRAMES: usize = 4;

/// Number of frames in the server icon animation.
pub const SERVER_FRAMES: usize = 3;

/// Ticks each animation frame stays on screen.
pub const FRAME_TICKS: usize = 5;

/// Map an RSSI reading onto `0..=total_bars - 1`.
///
/// The mapping is linear between [`RSSI_FLOOR_DBM`] and
/// [`RSSI_CEILING_DBM`], rounded to the nearest bar. Readings outside that
/// closed interval, or a non-positive bar count, yield [`OUT_OF_RANGE`].
pub fn signal_bars(rssi: i32, total_bars: i32) -> i32 {
    if total_bars <= 0 || !(RSSI_FLOOR_DBM..=RSSI_CEILING_DBM).contains(&rssi) {
        return OUT_OF_RANGE;
    }

    let span = RSSI_CEILING_DBM - RSSI_FLOOR_DBM;
    let scaled = (rssi - RSSI_FLOOR_DBM) * (total_bars - 1);
    (2 * scaled + span) / (2 * span)
}

/// What an icon slot shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconState {
    /// Animation or signal frame index.
    Frame(usize),
    /// Error placeholder.
    Error,
}

impl IconState {
    /// Frame index, or `-1` for the error placeholder.
    pub fn index(self) -> i32 {
        match self {
            IconState::Frame(frame) => frame as i32,
            IconState::Error => OUT_OF_RANGE,
        }
    }
}

fn animation_frame(tick: usize, frames: usize) -> usize {
    (tick / FRAME_TICKS) % frames
}

/// WiFi icon for the current link state.
///
/// Cycles through the bar frames while no attempt has finished, shows the
/// error placeholder after a failed attempt, and the signal bars once
/// connected. A missing or out-of-range RSSI also shows the placeholder.
pub fn wifi_icon(link: &LinkView, rssi: Option<i32>, tick: usize) -> IconState {
    match link {
        LinkView::NotAttempted => IconState::Frame(animation_frame(tick, WIFI_FRAMES)),
        LinkView::Error => IconState::Error,
        LinkView::Connected(_) => match rssi.map(|r| signal_bars(r, WIFI_FRAMES as i32)) {
            Some(bars) if bars >= 0 => IconState::Frame(bars as usize),
            _ => IconState::Error,
        },
    }
}

/// Server icon: animated while the listener is bound.
pub fn server_icon(bind: BindStatus, tick: usize) -> IconState {
    match bind {
        BindStatus::Bound => IconState::Frame(animation_frame(tick, SERVER_FRAMES)),
        BindStatus::Unknown | BindStatus::Failed => IconState::Error,
    }
}
