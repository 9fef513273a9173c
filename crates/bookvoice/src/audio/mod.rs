//! Audio container handling: WAVE parsing, splicing and the speed stage.

pub mod speed;
pub mod splice;
pub mod wav;

pub use speed::{needs_adjustment, speed_invocation, tempo_multiplier};
pub use splice::{remove_fragments, splice_fragments, SpliceSummary};
pub use wav::{read_wav_layout, WavLayout, WaveFormat};
