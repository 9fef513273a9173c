pub mod loader;
pub mod schema;

pub use loader::{
    default_config_dir, default_settings_path, load_settings, load_settings_from_str,
    save_settings, set_voice_samples_dir, validate_settings, SETTINGS_FILE_NAME,
};
pub use schema::{
    AlignmentConfig, AlignmentOutputFormat, ExecutablesConfig, MissingSamplePolicy, Settings,
    SynthesisConfig,
};
