//! Display tick scheduling.
//!
//! The display runs passes of a fixed number of ticks. Within a pass the
//! shown sensor rotates and several fields refresh on their own cadence.

/// Ticks per display pass.
pub const TOTAL_TICKS: usize = 300;

/// No sensor stays on screen for more than this fraction of a pass.
pub const MAX_SHARE_DIVISOR: usize = 10;

/// The clock is re-read from the time source every this many ticks.
pub const CLOCK_REFRESH_TICKS: usize = 100;

/// The clock string is re-formatted every this many ticks.
pub const CLOCK_FORMAT_TICKS: usize = 3;

/// The uptime string is recomputed every this many ticks.
pub const UPTIME_REFRESH_TICKS: usize = 2;

/// A pass leaves the screen on only if it was on for fewer ticks than this.
pub const AUTO_OFF_TICKS: usize = 60;

/// Number of consecutive ticks one sensor stays on screen.
///
/// `min(total_ticks / sensor_count, total_ticks / 10)`, never below one.
pub fn switch_rate(total_ticks: usize, sensor_count: usize) -> usize {
    if sensor_count == 0 {
        return total_ticks.max(1);
    }
    (total_ticks / sensor_count)
        .min(total_ticks / MAX_SHARE_DIVISOR)
        .max(1)
}

/// Index of the sensor shown at `tick`, or `None` without sensors.
pub fn active_sensor(tick: usize, total_ticks: usize, sensor_count: usize) -> Option<usize> {
    if sensor_count == 0 {
        return None;
    }
    Some((tick / switch_rate(total_ticks, sensor_count)) % sensor_count)
}

pub fn refresh_clock(tick: usize) -> bool {
    tick % CLOCK_REFRESH_TICKS == 0
}

pub fn reformat_clock(tick: usize) -> bool {
    tick % CLOCK_FORMAT_TICKS == 0
}

/// Whether the clock separator shows as a colon at `tick`.
///
/// The separator flips at every re-format, so it blinks with a period of
/// two re-formats.
pub fn clock_separator_visible(tick: usize) -> bool {
    (tick / CLOCK_FORMAT_TICKS) % 2 == 0
}

pub fn refresh_uptime(tick: usize) -> bool {
    tick % UPTIME_REFRESH_TICKS == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_switch_rate() {
        // Capped at a tenth of the pass
        assert_eq!(switch_rate(300, 3), 30);
        assert_eq!(switch_rate(300, 1), 30);
        // Many sensors share the pass evenly
        assert_eq!(switch_rate(300, 12), 25);
        assert_eq!(switch_rate(5, 10), 1);
        assert_eq!(switch_rate(300, 0), 300);
    }

    #[test]
    fn test_rotation_three_sensors() {
        let sequence: Vec<usize> = (0..TOTAL_TICKS)
            .map(|tick| active_sensor(tick, TOTAL_TICKS, 3).unwrap())
            .collect();

        // Fixed round-robin order, each block one switch-rate long
        let mut blocks: Vec<usize> = sequence.chunks(30).map(|c| c[0]).collect();
        assert!(sequence.chunks(30).all(|c| c.iter().all(|&i| i == c[0])));
        blocks.dedup();
        assert_eq!(blocks, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);

        // Every sensor gets a share, none holds more than a tenth in a row
        for sensor in 0..3 {
            let share = sequence.iter().filter(|&&i| i == sensor).count();
            assert!(share >= 90 && share <= 120, "sensor {} share {}", sensor, share);
        }
    }

    #[test]
    fn test_rotation_equal_shares_when_divisible() {
        for sensor_count in [1, 2, 5, 10, 15] {
            let mut counts = vec![0; sensor_count];
            for tick in 0..TOTAL_TICKS {
                counts[active_sensor(tick, TOTAL_TICKS, sensor_count).unwrap()] += 1;
            }
            assert!(
                counts.iter().all(|&c| c == TOTAL_TICKS / sensor_count),
                "{} sensors: {:?}",
                sensor_count,
                counts
            );
        }
    }

    #[test]
    fn test_rotation_without_sensors() {
        assert_eq!(active_sensor(42, TOTAL_TICKS, 0), None);
    }

    #[test]
    fn test_cadences() {
        assert!(refresh_clock(0) && refresh_clock(100) && !refresh_clock(150));
        assert!(reformat_clock(0) && reformat_clock(3) && !reformat_clock(4));
        assert!(refresh_uptime(298) && !refresh_uptime(299));

        assert!(clock_separator_visible(0));
        assert!(clock_separator_visible(2));
        assert!(!clock_separator_visible(3));
        assert!(clock_separator_visible(6));
    }
}
