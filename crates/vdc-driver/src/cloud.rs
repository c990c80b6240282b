//! Remote API seam between the driver and CloudStack.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cloudstack_api::{
    CloudStackClient, DeployVirtualMachineParams, ListSshKeyPairsResponse,
    ListVirtualMachinesParams, ListVirtualMachinesResponse, Result, Template, VirtualMachine, Zone,
};

/// Credentials and location of a VDC API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub api_url: String,
    pub api_key: String,
    pub secret_key: String,
    pub region: String,
}

/// CloudStack operations the driver consumes.
///
/// Implemented for [`CloudStackClient`]; tests substitute an in-memory fake.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn get_zone(&self, id: &str) -> Result<Zone>;

    async fn get_template(&self, id: &str, template_filter: &str, zone_id: &str)
    -> Result<Template>;

    async fn list_virtual_machines(
        &self,
        req: &ListVirtualMachinesParams,
    ) -> Result<ListVirtualMachinesResponse>;

    async fn deploy_virtual_machine(&self, req: &DeployVirtualMachineParams)
    -> Result<VirtualMachine>;

    async fn start_virtual_machine(&self, id: &str) -> Result<()>;

    async fn stop_virtual_machine(&self, id: &str) -> Result<()>;

    async fn reboot_virtual_machine(&self, id: &str) -> Result<()>;

    async fn destroy_virtual_machine(&self, id: &str, expunge: bool) -> Result<()>;

    async fn list_ssh_key_pairs(&self, name: &str) -> Result<ListSshKeyPairsResponse>;

    async fn register_ssh_key_pair(&self, name: &str, public_key: &str) -> Result<()>;

    async fn delete_ssh_key_pair(&self, name: &str) -> Result<()>;
}

#[async_trait]
impl CloudApi for CloudStackClient {
    async fn get_zone(&self, id: &str) -> Result<Zone> {
        self.get_zone_by_id(id).await
    }

    async fn get_template(
        &self,
        id: &str,
        template_filter: &str,
        zone_id: &str,
    ) -> Result<Template> {
        self.get_template_by_id(id, template_filter, zone_id).await
    }

    async fn list_virtual_machines(
        &self,
        req: &ListVirtualMachinesParams,
    ) -> Result<ListVirtualMachinesResponse> {
        CloudStackClient::list_virtual_machines(self, req).await
    }

    async fn deploy_virtual_machine(
        &self,
        req: &DeployVirtualMachineParams,
    ) -> Result<VirtualMachine> {
        CloudStackClient::deploy_virtual_machine(self, req).await
    }

    async fn start_virtual_machine(&self, id: &str) -> Result<()> {
        CloudStackClient::start_virtual_machine(self, id).await?;
        Ok(())
    }

    async fn stop_virtual_machine(&self, id: &str) -> Result<()> {
        CloudStackClient::stop_virtual_machine(self, id).await?;
        Ok(())
    }

    async fn reboot_virtual_machine(&self, id: &str) -> Result<()> {
        CloudStackClient::reboot_virtual_machine(self, id).await?;
        Ok(())
    }

    async fn destroy_virtual_machine(&self, id: &str, expunge: bool) -> Result<()> {
        CloudStackClient::destroy_virtual_machine(self, id, expunge).await
    }

    async fn list_ssh_key_pairs(&self, name: &str) -> Result<ListSshKeyPairsResponse> {
        CloudStackClient::list_ssh_key_pairs(self, name).await
    }

    async fn register_ssh_key_pair(&self, name: &str, public_key: &str) -> Result<()> {
        CloudStackClient::register_ssh_key_pair(self, name, public_key).await?;
        Ok(())
    }

    async fn delete_ssh_key_pair(&self, name: &str) -> Result<()> {
        CloudStackClient::delete_ssh_key_pair(self, name).await
    }
}

/// Builds an API client for the endpoint the driver is configured with.
pub trait CloudConnector: Send + Sync {
    fn connect(&self, endpoint: &Endpoint) -> Arc<dyn CloudApi>;
}

/// Connects to a real CloudStack endpoint.
#[derive(Debug, Clone, Default)]
pub struct CloudStackConnector {
    async_timeout: Option<Duration>,
}

impl CloudStackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upper bound on how long a single async job is polled.
    pub fn with_async_timeout(mut self, timeout: Duration) -> Self {
        self.async_timeout = Some(timeout);
        self
    }
}

impl CloudConnector for CloudStackConnector {
    fn connect(&self, endpoint: &Endpoint) -> Arc<dyn CloudApi> {
        let mut client = CloudStackClient::new(
            endpoint.api_url.clone(),
            endpoint.api_key.clone(),
            endpoint.secret_key.clone(),
        )
        .with_region(endpoint.region.clone());

        if let Some(timeout) = self.async_timeout {
            client = client.with_async_timeout(timeout);
        }

        Arc::new(client)
    }
}
