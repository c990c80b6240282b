use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use cloudstack_api::{
    DeployVirtualMachineParams, ListVirtualMachinesParams, ListVirtualMachinesResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cloud::{CloudApi, CloudConnector, CloudStackConnector, Endpoint};
use crate::keys::{KeyGenerator, SshKeygen};
use crate::options::{self, DriverOptions, Flag};
use crate::types::MachineState;
use crate::{DRIVER_NAME, ENGINE_PORT, Error, MachineDriver, Result};

const DEFAULT_SSH_USER: &str = "ubuntu";
const DEFAULT_SSH_PORT: u16 = 22;

/// Label attached to every deployed instance.
const WORKLOAD_DETAIL: (&str, &str) = ("workload", "ranchernode");

/// Persistent driver state.
///
/// Everything the host needs to re-attach to a machine after a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub machine_name: String,
    pub store_path: PathBuf,
    pub ssh_user: String,
    pub ssh_port: u16,
    /// CloudStack instance id, set once the instance is deployed.
    pub id: String,
    pub api_url: String,
    pub api_key: String,
    pub secret_key: String,
    pub vdc_region: String,
    pub use_private_ip: bool,
    pub ssh_key_pair: String,
    pub private_ip: String,
    pub template_id: String,
    pub template_filter: String,
    pub service_offering_id: String,
    pub network_id: String,
    pub zone_id: String,
    pub network_type: String,
    pub disk_offering_id: String,
    pub disk_size: i64,
}

/// Interoute VDC implementation of [`MachineDriver`].
pub struct VdcDriver {
    config: DriverConfig,
    connector: Arc<dyn CloudConnector>,
    keys: Arc<dyn KeyGenerator>,
}

impl VdcDriver {
    /// An unconfigured driver for `machine_name`, storing files under
    /// `store_path`.
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<PathBuf>) -> Self {
        Self::from_config(DriverConfig {
            machine_name: machine_name.into(),
            store_path: store_path.into(),
            ssh_user: DEFAULT_SSH_USER.into(),
            ssh_port: DEFAULT_SSH_PORT,
            ..Default::default()
        })
    }

    /// Re-attach to a machine from previously persisted state.
    pub fn from_config(config: DriverConfig) -> Self {
        Self {
            config,
            connector: Arc::new(CloudStackConnector::new()),
            keys: Arc::new(SshKeygen),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn CloudConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_key_generator(mut self, keys: Arc<dyn KeyGenerator>) -> Self {
        self.keys = keys;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn into_config(self) -> DriverConfig {
        self.config
    }

    /// Clean up after a `create` that failed before an instance id was
    /// recorded.
    ///
    /// Destroys any instance carrying the machine name, which a timed-out
    /// deploy may have left behind, and deletes the key pair if it was
    /// registered. A driver that never passed validation has nothing remote
    /// to clean up.
    pub async fn remove_incomplete(&self) -> Result<()> {
        if self.validate().is_err() {
            return Ok(());
        }

        let client = self.client();
        let name = &self.config.machine_name;

        let resp = self.list_instances_named(&*client).await?;
        for vm in resp.virtual_machines.iter().filter(|vm| vm.name == *name) {
            info!(vm_id = %vm.id, "removing instance left by an incomplete create");
            client.destroy_virtual_machine(&vm.id, true).await?;
        }

        let key_pair = &self.config.ssh_key_pair;
        let resp = client.list_ssh_key_pairs(key_pair).await?;
        if resp.key_pairs.iter().any(|k| k.name == *key_pair) {
            self.delete_key_pair().await?;
        }
        Ok(())
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint {
            api_url: self.config.api_url.clone(),
            api_key: self.config.api_key.clone(),
            secret_key: self.config.secret_key.clone(),
            region: self.config.vdc_region.clone(),
        }
    }

    fn client(&self) -> Arc<dyn CloudApi> {
        self.connector.connect(&self.endpoint())
    }

    fn instance_id(&self) -> Result<&str> {
        if self.config.id.is_empty() {
            return Err(Error::NotCreated);
        }
        Ok(&self.config.id)
    }

    /// Fail on the first required option that is empty.
    fn validate(&self) -> Result<()> {
        let c = &self.config;
        let required = [
            ("apiurl", &c.api_url),
            ("apikey", &c.api_key),
            ("secretkey", &c.secret_key),
            ("vdcregion", &c.vdc_region),
            ("templateid", &c.template_id),
            ("serviceofferingid", &c.service_offering_id),
            ("zoneid", &c.zone_id),
        ];

        match required.iter().find(|(_, value)| value.is_empty()) {
            Some((option, _)) => Err(Error::MissingOption(*option)),
            None => Ok(()),
        }
    }

    /// Cache the zone's network type. An empty zone clears it.
    async fn resolve_network_type(&mut self) -> Result<()> {
        self.config.network_type.clear();

        if self.config.zone_id.is_empty() {
            return Ok(());
        }

        let zone = self
            .client()
            .get_zone(&self.config.zone_id)
            .await
            .map_err(Error::Zone)?;
        self.config.network_type = zone.network_type;

        debug!(
            zone_id = %self.config.zone_id,
            network_type = %self.config.network_type,
            "resolved zone"
        );
        Ok(())
    }

    async fn check_key_pair(&self) -> Result<()> {
        let name = &self.config.ssh_key_pair;
        info!(key_pair = %name, "checking if SSH key pair already exists");

        let resp = self.client().list_ssh_key_pairs(name).await?;
        if resp.count > 0 {
            return Err(Error::KeyPairExists(name.clone()));
        }
        Ok(())
    }

    async fn list_instances_named(
        &self,
        client: &dyn CloudApi,
    ) -> Result<ListVirtualMachinesResponse> {
        let resp = client
            .list_virtual_machines(&ListVirtualMachinesParams {
                name: Some(self.config.machine_name.clone()),
                zone_id: Some(self.config.zone_id.clone()),
                ..Default::default()
            })
            .await?;
        Ok(resp)
    }

    async fn check_instance(&self) -> Result<()> {
        let name = &self.config.machine_name;
        info!(machine = %name, "checking if instance already exists");

        let resp = self.list_instances_named(&*self.client()).await?;
        if resp.count > 0 {
            return Err(Error::InstanceExists(name.clone()));
        }
        Ok(())
    }

    async fn create_key_pair(&self) -> Result<()> {
        let public_key = self.keys.generate(&self.ssh_key_path()).await?;

        info!(key_pair = %self.config.ssh_key_pair, "registering SSH key pair");
        self.client()
            .register_ssh_key_pair(&self.config.ssh_key_pair, &public_key)
            .await?;
        Ok(())
    }

    async fn delete_key_pair(&self) -> Result<()> {
        info!(key_pair = %self.config.ssh_key_pair, "deleting SSH key pair");
        self.client()
            .delete_ssh_key_pair(&self.config.ssh_key_pair)
            .await?;
        Ok(())
    }

    fn deploy_params(&self) -> DeployVirtualMachineParams {
        let c = &self.config;
        let mut req = DeployVirtualMachineParams::new(
            c.service_offering_id.clone(),
            c.template_id.clone(),
            c.zone_id.clone(),
        );
        req.name = Some(c.machine_name.clone());
        req.display_name = Some(c.machine_name.clone());
        req.details = BTreeMap::from([(
            WORKLOAD_DETAIL.0.to_string(),
            WORKLOAD_DETAIL.1.to_string(),
        )]);
        req.key_pair = Some(c.ssh_key_pair.clone());

        if !c.disk_offering_id.is_empty() {
            req.disk_offering_id = Some(c.disk_offering_id.clone());
            req.size = Some(c.disk_size);
        }
        if !c.network_id.is_empty() {
            req.network_ids = vec![c.network_id.clone()];
        }
        req
    }
}

/// Login user implied by a template's OS type.
fn ssh_user_for_os_type(os_type: &str) -> &'static str {
    if os_type.starts_with("CentOS") {
        "centos"
    } else if os_type.starts_with("Ubuntu") {
        "ubuntu"
    } else if os_type.starts_with("Red Hat") {
        "redhat"
    } else {
        DEFAULT_SSH_USER
    }
}

#[async_trait]
impl MachineDriver for VdcDriver {
    fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn create_flags(&self) -> Vec<Flag> {
        options::create_flags()
    }

    async fn set_config_from_flags(&mut self, opts: &dyn DriverOptions) -> Result<()> {
        let c = &mut self.config;
        c.api_url = opts.string(options::API_URL);
        c.api_key = opts.string(options::API_KEY);
        c.secret_key = opts.string(options::SECRET_KEY);
        c.use_private_ip = true;
        c.vdc_region = opts.string(options::VDC_REGION);
        c.template_id = opts.string(options::TEMPLATE_ID);
        c.template_filter = opts.string(options::TEMPLATE_FILTER);
        c.service_offering_id = opts.string(options::SERVICE_OFFERING_ID);
        c.network_id = opts.string(options::NETWORK_ID);
        c.disk_offering_id = opts.string(options::DISK_OFFERING_ID);
        c.disk_size = opts.int(options::DISK_SIZE);
        c.zone_id = opts.string(options::ZONE_ID);
        c.ssh_key_pair = c.machine_name.clone();

        self.validate()?;
        self.resolve_network_type().await
    }

    async fn pre_create_check(&self) -> Result<()> {
        self.check_key_pair().await?;
        self.check_instance().await
    }

    async fn create(&mut self) -> Result<()> {
        self.create_key_pair().await?;

        info!(machine = %self.config.machine_name, "creating Interoute VDC instance");
        let vm = self
            .client()
            .deploy_virtual_machine(&self.deploy_params())
            .await?;

        let ip = vm
            .nic
            .first()
            .and_then(|nic| nic.ip_address.clone())
            .ok_or_else(|| Error::NoNetworkInterface(vm.id.clone()))?;

        info!(vm_id = %vm.id, ip = %ip, "instance created");
        self.config.id = vm.id;
        self.config.private_ip = ip;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        match self.get_state().await? {
            MachineState::Running => {
                info!("machine is already running");
                return Ok(());
            }
            MachineState::Starting => {
                info!("machine is already starting");
                return Ok(());
            }
            _ => {}
        }

        let id = self.instance_id()?;
        self.client().start_virtual_machine(id).await?;
        info!(vm_id = %id, "instance started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if self.get_state().await? == MachineState::Stopped {
            info!("machine is already stopped");
            return Ok(());
        }

        let id = self.instance_id()?;
        self.client().stop_virtual_machine(id).await?;
        info!(vm_id = %id, "instance stopped");
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        if self.get_state().await? == MachineState::Stopped {
            return Err(Error::MachineStopped);
        }

        let id = self.instance_id()?;
        self.client().reboot_virtual_machine(id).await?;
        info!(vm_id = %id, "instance rebooted");
        Ok(())
    }

    async fn kill(&self) -> Result<()> {
        self.stop().await
    }

    async fn remove(&self) -> Result<()> {
        let id = self.instance_id()?;

        info!(vm_id = %id, "removing Interoute VDC instance");
        self.client().destroy_virtual_machine(id, true).await?;

        self.delete_key_pair().await
    }

    async fn get_state(&self) -> Result<MachineState> {
        let id = self.instance_id()?;
        let resp = self
            .client()
            .list_virtual_machines(&ListVirtualMachinesParams::by_id(id))
            .await?;

        if resp.count == 0 {
            return Err(Error::MachineNotFound);
        }

        let state = resp
            .virtual_machines
            .first()
            .map(|vm| MachineState::from_vm_state(&vm.state))
            .unwrap_or(MachineState::None);
        Ok(state)
    }

    fn ip(&self) -> Result<String> {
        if self.config.private_ip.is_empty() {
            return Err(Error::NotCreated);
        }
        Ok(self.config.private_ip.clone())
    }

    fn url(&self) -> Result<String> {
        let ip = self.ip()?;
        Ok(format!("tcp://{ip}:{ENGINE_PORT}"))
    }

    fn ssh_hostname(&self) -> Result<String> {
        self.ip()
    }

    async fn get_ssh_username(&mut self) -> String {
        let c = &self.config;
        // Lookup failures fall through to the default user.
        let os_type = self
            .client()
            .get_template(&c.template_id, &c.template_filter, &c.zone_id)
            .await
            .map(|t| t.os_type_name)
            .unwrap_or_default();

        let user = ssh_user_for_os_type(&os_type);
        self.config.ssh_user = user.to_string();
        self.config.ssh_user.clone()
    }

    fn ssh_port(&self) -> u16 {
        self.config.ssh_port
    }

    fn ssh_key_path(&self) -> PathBuf {
        self.config
            .store_path
            .join("machines")
            .join(&self.config.machine_name)
            .join("id_rsa")
    }

    fn machine_name(&self) -> &str {
        &self.config.machine_name
    }
}
