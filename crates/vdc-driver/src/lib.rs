//! Machine driver for Interoute VDC.
//!
//! Maps a fixed machine lifecycle (create, start, stop, restart, kill,
//! remove, state) onto CloudStack VM, SSH key pair and zone calls. Hosts
//! drive a machine through the [`MachineDriver`] trait; [`VdcDriver`] is
//! the only implementation.

pub mod cloud;
pub mod keys;
pub mod options;
pub mod types;
pub mod vdc;

use std::path::PathBuf;

use async_trait::async_trait;

pub use cloud::{CloudApi, CloudConnector, CloudStackConnector, Endpoint};
pub use keys::{KeyGenerator, SshKeygen};
pub use options::{DriverOptions, Flag, FlagKind, OptionMap, create_flags};
pub use types::MachineState;
pub use vdc::{DriverConfig, VdcDriver};

/// Name the driver registers under.
pub const DRIVER_NAME: &str = "interoutevdc";

/// Port the container engine listens on inside the machine.
pub const ENGINE_PORT: u16 = 2376;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Interoute VDC driver requires the --interoutevdc-{0} option")]
    MissingOption(&'static str),

    #[error("invalid value {value:?} for --{name}: expected an integer")]
    InvalidOption { name: &'static str, value: String },

    #[error("unable to get zoneid: {0}")]
    Zone(#[source] cloudstack_api::Error),

    #[error(transparent)]
    Api(#[from] cloudstack_api::Error),

    #[error("machine does not exist, use create command to create it")]
    MachineNotFound,

    #[error("machine has not been created yet")]
    NotCreated,

    #[error("machine is stopped, use start command to start it")]
    MachineStopped,

    #[error("SSH key pair ({0}) already exists")]
    KeyPairExists(String),

    #[error("instance ({0}) already exists")]
    InstanceExists(String),

    #[error("instance {0} has no network interface")]
    NoNetworkInterface(String),

    #[error("ssh key generation failed: {0}")]
    KeyGeneration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle contract a host invokes to manage one machine.
///
/// Calls on one driver are expected to be serialized by the host.
#[async_trait]
pub trait MachineDriver: Send + Sync {
    /// Driver identifier.
    fn driver_name(&self) -> &'static str;

    /// Options accepted by [`MachineDriver::set_config_from_flags`].
    fn create_flags(&self) -> Vec<Flag>;

    /// Populate and validate the driver from host options.
    async fn set_config_from_flags(&mut self, opts: &dyn DriverOptions) -> Result<()>;

    /// Check that nothing would collide with the machine about to be created.
    async fn pre_create_check(&self) -> Result<()>;

    /// Create the machine and record its instance id and address.
    async fn create(&mut self) -> Result<()>;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn restart(&self) -> Result<()>;

    /// Same as [`MachineDriver::stop`]; there is no separate hard kill.
    async fn kill(&self) -> Result<()>;

    /// Delete the machine and everything created alongside it.
    async fn remove(&self) -> Result<()>;

    /// Current state as reported by the provider.
    async fn get_state(&self) -> Result<MachineState>;

    /// Address used to reach the machine.
    fn ip(&self) -> Result<String>;

    /// Container engine URL, e.g. `tcp://10.0.0.5:2376`.
    fn url(&self) -> Result<String>;

    fn ssh_hostname(&self) -> Result<String>;

    /// Login user for the machine's image.
    async fn get_ssh_username(&mut self) -> String;

    fn ssh_port(&self) -> u16;

    fn ssh_key_path(&self) -> PathBuf;

    fn machine_name(&self) -> &str;
}
