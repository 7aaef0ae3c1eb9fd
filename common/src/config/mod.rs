mod file;

pub use file::{load_config, BackupSettings, PostgresSettings, Settings, CONFIG_PATHS, ENV_PREFIX};
