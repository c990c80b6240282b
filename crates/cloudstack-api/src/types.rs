use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::params::Params;

// ── Virtual machines ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "displayname")]
    pub display_name: Option<String>,
    /// Raw CloudStack state, e.g. `Running`, `Stopped`, `Expunging`.
    #[serde(default)]
    pub state: String,
    #[serde(default, rename = "zoneid")]
    pub zone_id: Option<String>,
    #[serde(default, rename = "templateid")]
    pub template_id: Option<String>,
    #[serde(default, rename = "serviceofferingid")]
    pub service_offering_id: Option<String>,
    #[serde(default, rename = "keypair")]
    pub key_pair: Option<String>,
    #[serde(default)]
    pub nic: Vec<Nic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nic {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "ipaddress")]
    pub ip_address: Option<String>,
    #[serde(default, rename = "networkid")]
    pub network_id: Option<String>,
    #[serde(default, rename = "isdefault")]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListVirtualMachinesResponse {
    #[serde(default)]
    pub count: usize,
    #[serde(default, rename = "virtualmachine")]
    pub virtual_machines: Vec<VirtualMachine>,
}

/// Parameters for `deployVirtualMachine`.
///
/// The three IDs are mandatory; everything else is omitted from the
/// request when unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployVirtualMachineParams {
    pub service_offering_id: String,
    pub template_id: String,
    pub zone_id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub details: BTreeMap<String, String>,
    pub key_pair: Option<String>,
    pub disk_offering_id: Option<String>,
    /// Size in GB of the additional data disk. Only sent together with a
    /// disk offering.
    pub size: Option<i64>,
    pub network_ids: Vec<String>,
}

impl DeployVirtualMachineParams {
    pub fn new(
        service_offering_id: impl Into<String>,
        template_id: impl Into<String>,
        zone_id: impl Into<String>,
    ) -> Self {
        Self {
            service_offering_id: service_offering_id.into(),
            template_id: template_id.into(),
            zone_id: zone_id.into(),
            name: None,
            display_name: None,
            details: BTreeMap::new(),
            key_pair: None,
            disk_offering_id: None,
            size: None,
            network_ids: Vec::new(),
        }
    }

    pub(crate) fn to_params(&self) -> Params {
        let mut p = Params::new();
        p.set("serviceofferingid", &self.service_offering_id);
        p.set("templateid", &self.template_id);
        p.set("zoneid", &self.zone_id);
        p.set_opt("name", self.name.as_deref());
        p.set_opt("displayname", self.display_name.as_deref());
        p.set_map("details", &self.details);
        p.set_opt("keypair", self.key_pair.as_deref());
        p.set_opt("diskofferingid", self.disk_offering_id.as_deref());
        if let Some(size) = self.size {
            p.set("size", size.to_string());
        }
        p.set_list("networkids", &self.network_ids);
        p
    }
}

/// Filters for `listVirtualMachines`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListVirtualMachinesParams {
    pub id: Option<String>,
    pub name: Option<String>,
    pub zone_id: Option<String>,
}

impl ListVirtualMachinesParams {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub(crate) fn to_params(&self) -> Params {
        let mut p = Params::new();
        p.set_opt("id", self.id.as_deref());
        p.set_opt("name", self.name.as_deref());
        p.set_opt("zoneid", self.zone_id.as_deref());
        p
    }
}

// ── Zones & templates ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// `Basic` or `Advanced`.
    #[serde(default, rename = "networktype")]
    pub network_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ListZonesResponse {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub zone: Vec<Zone>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "ostypeid")]
    pub os_type_id: Option<String>,
    /// Human readable OS type, e.g. `Ubuntu 16.04 (64-bit)`.
    #[serde(default, rename = "ostypename")]
    pub os_type_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ListTemplatesResponse {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub template: Vec<Template>,
}

// ── SSH key pairs ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKeyPair {
    pub name: String,
    #[serde(default)]
    pub fingerprint: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListSshKeyPairsResponse {
    #[serde(default)]
    pub count: usize,
    #[serde(default, rename = "sshkeypair")]
    pub key_pairs: Vec<SshKeyPair>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RegisterSshKeyPairResponse {
    #[serde(rename = "keypair")]
    pub key_pair: SshKeyPair,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SuccessResponse {
    #[serde(default, deserialize_with = "bool_or_string")]
    pub success: bool,
    #[serde(default, rename = "displaytext")]
    pub display_text: Option<String>,
}

// ── Async jobs ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AsyncJobHandle {
    #[serde(rename = "jobid")]
    pub job_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AsyncJobResult {
    #[serde(rename = "jobstatus")]
    pub job_status: i32,
    #[serde(default, rename = "jobresult")]
    pub job_result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default, rename = "errorcode")]
    pub error_code: i64,
    #[serde(default, rename = "errortext")]
    pub error_text: String,
}

/// CloudStack reports `success` as a JSON bool on some versions and as the
/// string `"true"` on others.
fn bool_or_string<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Str(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => b,
        Raw::Str(s) => s.eq_ignore_ascii_case("true"),
    })
}
