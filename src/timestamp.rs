use streamwire::utils::timing::PTS_CLOCK_HZ;

pub fn time_str(sec: f64) -> String {
    let ms = sec * 1000f64;
    let hours = (ms / 3600000f64) as u64;
    let minutes = ((ms % 3600000f64) / 60000f64) as u64;
    let seconds = ((ms % 60000f64) / 1000f64) as u64;
    let milliseconds = (ms % 1000f64) as u64;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

/// Formats a 90 kHz timestamp.
pub fn pts_str(pts: u64) -> String {
    time_str(pts as f64 / PTS_CLOCK_HZ as f64)
}

/// Presentation time in microseconds of the `index`-th frame of
/// `samples_per_frame` samples.
pub fn frame_time_us(index: u64, samples_per_frame: u64, sample_rate: u32) -> i64 {
    if sample_rate == 0 {
        return 0;
    }
    (index as u128 * samples_per_frame as u128 * 1_000_000 / sample_rate as u128) as i64
}

#[test]
fn formats_pts() {
    assert_eq!(pts_str(0), "00:00:00.000");
    assert_eq!(pts_str(90_000 * 3725 + 45_000), "01:02:05.500");
}

#[test]
fn frame_times() {
    assert_eq!(frame_time_us(0, 1024, 48000), 0);
    assert_eq!(frame_time_us(1, 1024, 48000), 21_333);
    assert_eq!(frame_time_us(375, 1024, 48000), 8_000_000);
}
