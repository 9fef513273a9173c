pub mod samples;

pub use samples::{add_sample, delete_sample, list, rename_sample, resolve, VoiceSample};
