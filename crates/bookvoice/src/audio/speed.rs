use std::path::Path;

use crate::process::Invocation;

/// Tempo multiplier for a normalized speech speed in `[0, 1]`.
///
/// `0.5` maps to normal speed; the ends of the range halve or one-and-a-half
/// the tempo.
pub fn tempo_multiplier(speed: f32) -> f32 {
    0.5 + speed.clamp(0.0, 1.0)
}

pub fn needs_adjustment(multiplier: f32) -> bool {
    (multiplier - 1.0).abs() > f32::EPSILON
}

/// Builds the time-stretch invocation for `input` → `output`.
pub fn speed_invocation(program: &Path, input: &Path, output: &Path, multiplier: f32) -> Invocation {
    Invocation::new("adjusting_speed", program)
        .arg("-y")
        .flag("-i", input)
        .flag("-filter:a", format!("atempo={}", format_multiplier(multiplier)))
        .arg(output)
}

fn format_multiplier(multiplier: f32) -> String {
    let formatted = format!("{:.3}", multiplier);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_tempo_multiplier() {
        assert_eq!(tempo_multiplier(0.5), 1.0);
        assert_eq!(tempo_multiplier(0.0), 0.5);
        assert_eq!(tempo_multiplier(1.0), 1.5);
        assert_eq!(tempo_multiplier(3.0), 1.5);
    }

    #[test]
    fn test_needs_adjustment() {
        assert!(!needs_adjustment(tempo_multiplier(0.5)));
        assert!(needs_adjustment(tempo_multiplier(0.75)));
    }

    #[test]
    fn test_speed_invocation_arguments() {
        let inv = speed_invocation(
            Path::new("ffmpeg"),
            Path::new("/book/audio/combined.wav"),
            Path::new("/book/audio/audiobook.wav"),
            1.25,
        );
        assert_eq!(inv.stage, "adjusting_speed");
        assert!(inv.has_arg("-y"));
        assert_eq!(
            inv.flag_value("-i"),
            Some(OsStr::new("/book/audio/combined.wav"))
        );
        assert_eq!(inv.flag_value("-filter:a"), Some(OsStr::new("atempo=1.25")));
        assert_eq!(
            inv.args.last().map(|a| a.as_os_str()),
            Some(OsStr::new("/book/audio/audiobook.wav"))
        );
    }

    #[test]
    fn test_format_multiplier() {
        assert_eq!(format_multiplier(1.5), "1.5");
        assert_eq!(format_multiplier(0.75), "0.75");
        assert_eq!(format_multiplier(1.0), "1");
    }
}
