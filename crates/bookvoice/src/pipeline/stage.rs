//! Progress values reported at each stage transition.
//!
//! UIs built against the pipeline key their progress bars on these numbers,
//! so they are fixed.

pub const STARTING: i32 = 0;
pub const SAVING_FILE: i32 = 5;
pub const EXTRACTING_TEXT: i32 = 10;
pub const TEXT_EXTRACTED: i32 = 30;
pub const GENERATING_AUDIO: i32 = 30;
pub const COMBINING_AUDIO: i32 = 58;
pub const ADJUSTING_SPEED: i32 = 60;
pub const SPEED_ADJUSTED: i32 = 62;
pub const TRANSCRIBING: i32 = 60;
pub const FINALIZING: i32 = 90;

/// Span of the generating stage; it ends below [`COMBINING_AUDIO`].
const GENERATING_SPAN: i32 = COMBINING_AUDIO - GENERATING_AUDIO;

/// Progress once `done` of `total` chunks have been synthesized.
pub fn generating_progress(done: usize, total: usize) -> i32 {
    if total == 0 {
        return GENERATING_AUDIO;
    }
    let done = done.min(total) as i64;
    GENERATING_AUDIO + (GENERATING_SPAN as i64 * done / total as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generating_progress_is_linear_and_bounded() {
        assert_eq!(generating_progress(0, 4), 30);
        assert_eq!(generating_progress(2, 4), 44);
        assert_eq!(generating_progress(4, 4), 58);
        assert_eq!(generating_progress(9, 4), 58);
        assert_eq!(generating_progress(0, 0), 30);
    }

    #[test]
    fn test_generating_progress_never_decreases() {
        let total = 7;
        let values: Vec<i32> = (0..=total).map(|d| generating_progress(d, total)).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }
}
