//! Command-line argument parsing.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vdc_driver::options;

/// Provision and manage machines on Interoute VDC
#[derive(Parser, Debug)]
#[command(name = "vdc-machine")]
#[command(version)]
pub struct Cli {
    /// Directory holding machine state and SSH keys [default: ~/.docker/machine]
    #[arg(short = 's', long, env = "MACHINE_STORAGE_PATH", global = true)]
    pub storage_path: Option<PathBuf>,

    /// Seconds to wait for a single CloudStack async job
    #[arg(long, env = "INTEROUTEVDC_ASYNC_TIMEOUT", default_value_t = 300, global = true)]
    pub async_timeout: u64,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short = 'D', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a machine
    Create(CreateArgs),
    /// Start a machine
    Start(MachineArg),
    /// Stop a machine
    Stop(MachineArg),
    /// Restart a running machine
    Restart(MachineArg),
    /// Kill a machine
    Kill(MachineArg),
    /// Remove a machine and its SSH key pair
    Rm(MachineArg),
    /// Print the state of a machine
    Status(MachineArg),
    /// Print the IP address of a machine
    Ip(MachineArg),
    /// Print the engine URL of a machine
    Url(MachineArg),
    /// Print the SSH login user of a machine
    SshUser(MachineArg),
    /// Print the stored configuration of a machine
    Inspect(MachineArg),
    /// List stored machines
    Ls,
    /// List the create flags understood by the driver
    Flags,
}

#[derive(Args, Debug)]
pub struct MachineArg {
    /// Machine name
    pub name: String,
}

/// Driver flags for `create`. Unset flags fall back to their environment
/// variable, then to the driver default.
#[derive(Args, Debug, Default)]
pub struct CreateArgs {
    /// Machine name
    pub name: String,

    /// Interoute VDC API URL [env: INTEROUTEVDC_API_URL]
    #[arg(long = "interoutevdc-apiurl")]
    pub api_url: Option<String>,

    /// Interoute VDC API key [env: INTEROUTEVDC_API_KEY]
    #[arg(long = "interoutevdc-apikey")]
    pub api_key: Option<String>,

    /// Interoute VDC API secret key [env: INTEROUTEVDC_SECRET_KEY]
    #[arg(long = "interoutevdc-secretkey")]
    pub secret_key: Option<String>,

    /// Interoute VDC Region [env: INTEROUTEVDC_REGION]
    #[arg(long = "interoutevdc-vdcregion")]
    pub vdc_region: Option<String>,

    /// Interoute VDC template ID
    #[arg(long = "interoutevdc-templateid")]
    pub template_id: Option<String>,

    /// Interoute VDC template filter
    #[arg(long = "interoutevdc-templatefilter")]
    pub template_filter: Option<String>,

    /// Interoute VDC service offering ID
    #[arg(long = "interoutevdc-serviceofferingid")]
    pub service_offering_id: Option<String>,

    /// Interoute VDC network ID
    #[arg(long = "interoutevdc-networkid")]
    pub network_id: Option<String>,

    /// Interoute VDC zone ID
    #[arg(long = "interoutevdc-zoneid")]
    pub zone_id: Option<String>,

    /// Interoute VDC disk offering ID
    #[arg(long = "interoutevdc-diskofferingid")]
    pub disk_offering_id: Option<String>,

    /// Interoute VDC additional disk size
    #[arg(long = "interoutevdc-disksize")]
    pub disk_size: Option<i64>,
}

impl CreateArgs {
    /// Flags given on the command line, keyed by driver flag name.
    pub fn explicit_options(&self) -> HashMap<String, String> {
        let pairs = [
            (options::API_URL, self.api_url.clone()),
            (options::API_KEY, self.api_key.clone()),
            (options::SECRET_KEY, self.secret_key.clone()),
            (options::VDC_REGION, self.vdc_region.clone()),
            (options::TEMPLATE_ID, self.template_id.clone()),
            (options::TEMPLATE_FILTER, self.template_filter.clone()),
            (options::SERVICE_OFFERING_ID, self.service_offering_id.clone()),
            (options::NETWORK_ID, self.network_id.clone()),
            (options::ZONE_ID, self.zone_id.clone()),
            (options::DISK_OFFERING_ID, self.disk_offering_id.clone()),
            (options::DISK_SIZE, self.disk_size.map(|s| s.to_string())),
        ];

        pairs
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
            .collect()
    }
}
