use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Driver(#[from] vdc_driver::Error),

    #[error("machine {0:?} does not exist")]
    UnknownMachine(String),

    #[error("machine {0:?} already exists")]
    MachineExists(String),

    #[error("invalid machine name {0:?}: use letters, digits, '.' and '-', starting with a letter or digit")]
    InvalidName(String),

    #[error("store error at {}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt machine config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot determine storage path, set MACHINE_STORAGE_PATH")]
    NoStoragePath,
}

pub type Result<T> = std::result::Result<T, CliError>;
