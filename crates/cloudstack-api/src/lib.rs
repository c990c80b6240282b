//! Typed Rust client for the CloudStack API as exposed by Interoute VDC.
//!
//! Covers the subset needed to provision a single machine:
//! virtual machines (deploy, start, stop, reboot, destroy, list),
//! SSH key pairs (list, register, delete), zones and templates (by id).
//!
//! Every request is signed with the account's secret key. Commands that
//! CloudStack runs as async jobs are polled through `queryAsyncJobResult`
//! until they finish, so callers only ever see the final result.

mod params;
mod types;

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

pub use params::{Params, sign};
pub use types::*;

/// Default Interoute VDC API endpoint.
pub const DEFAULT_API_URL: &str = "https://myservices.interoute.com/myservices/api/vdc";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_ASYNC_TIMEOUT: Duration = Duration::from_secs(300);

const JOB_PENDING: i32 = 0;
const JOB_SUCCEEDED: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cloudstack request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("cloudstack {command} returned {status}: error {error_code}: {error_text}")]
    Api {
        command: &'static str,
        status: reqwest::StatusCode,
        error_code: i64,
        error_text: String,
    },

    #[error("cloudstack {command} job {job_id} failed: error {error_code}: {error_text}")]
    AsyncJob {
        command: &'static str,
        job_id: String,
        error_code: i64,
        error_text: String,
    },

    #[error("cloudstack {command} job {job_id} did not finish within {timeout:?}")]
    Timeout {
        command: &'static str,
        job_id: String,
        timeout: Duration,
    },

    #[error("cloudstack {command} returned an unexpected response: {reason}")]
    Malformed {
        command: &'static str,
        reason: String,
    },

    #[error("no {kind} found with id {id}")]
    NotFound { kind: &'static str, id: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the CloudStack REST API.
#[derive(Clone)]
pub struct CloudStackClient {
    api_url: String,
    api_key: String,
    secret_key: String,
    region: Option<String>,
    poll_interval: Duration,
    async_timeout: Duration,
    http: reqwest::Client,
}

impl CloudStackClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            region: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            async_timeout: DEFAULT_ASYNC_TIMEOUT,
            http: reqwest::Client::new(),
        }
    }

    /// VDC region sent with every request (`Europe`, `USA`, `Asia`).
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        let region = region.into();
        self.region = (!region.is_empty()).then_some(region);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_async_timeout(mut self, timeout: Duration) -> Self {
        self.async_timeout = timeout;
        self
    }

    /// Build the full, signed query for `command`.
    fn signed_query(&self, command: &str, params: Params) -> Vec<(String, String)> {
        let mut query = params.into_pairs();
        query.push(("apiKey".into(), self.api_key.clone()));
        query.push(("command".into(), command.into()));
        query.push(("response".into(), "json".into()));
        if let Some(region) = &self.region {
            query.push(("region".into(), region.clone()));
        }

        let signature = sign(&query, &self.secret_key);
        query.push(("signature".into(), signature));
        query
    }

    /// Issue a synchronous command and return the unwrapped response body.
    async fn request(&self, command: &'static str, params: Params) -> Result<Value> {
        let query = self.signed_query(command, params);

        let resp = self.http.get(&self.api_url).query(&query).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            // Error bodies share the envelope; fall back to the raw text for
            // proxies that answer with HTML.
            let err = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| unwrap_envelope(command, v).ok())
                .and_then(|v| serde_json::from_value::<ErrorBody>(v).ok())
                .unwrap_or_else(|| ErrorBody {
                    error_code: i64::from(status.as_u16()),
                    error_text: body.clone(),
                });
            return Err(Error::Api {
                command,
                status,
                error_code: err.error_code,
                error_text: err.error_text,
            });
        }

        let value = serde_json::from_str::<Value>(&body).map_err(|e| Error::Malformed {
            command,
            reason: e.to_string(),
        })?;
        unwrap_envelope(command, value)
    }

    /// Issue an async command, wait for its job and decode `result_key`
    /// from the job result.
    async fn request_async<T: DeserializeOwned>(
        &self,
        command: &'static str,
        params: Params,
        result_key: &str,
    ) -> Result<T> {
        let handle: AsyncJobHandle = decode(command, self.request(command, params).await?)?;
        let result = self.wait_for_job(command, &handle.job_id).await?;

        let value = match result {
            Value::Object(mut map) => map.remove(result_key),
            _ => None,
        }
        .ok_or_else(|| Error::Malformed {
            command,
            reason: format!("job result has no `{result_key}`"),
        })?;

        decode(command, value)
    }

    async fn wait_for_job(&self, command: &'static str, job_id: &str) -> Result<Value> {
        let started = Instant::now();

        loop {
            let mut p = Params::new();
            p.set("jobid", job_id);
            let job: AsyncJobResult =
                decode(command, self.request("queryAsyncJobResult", p).await?)?;

            match job.job_status {
                JOB_PENDING => {}
                JOB_SUCCEEDED => return Ok(job.job_result.unwrap_or(Value::Null)),
                _ => {
                    let err: ErrorBody = job
                        .job_result
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();
                    return Err(Error::AsyncJob {
                        command,
                        job_id: job_id.to_string(),
                        error_code: err.error_code,
                        error_text: err.error_text,
                    });
                }
            }

            if started.elapsed() >= self.async_timeout {
                return Err(Error::Timeout {
                    command,
                    job_id: job_id.to_string(),
                    timeout: self.async_timeout,
                });
            }

            debug!(command, job_id, "async job still pending");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    // ── Virtual machines ────────────────────────────────────────────

    pub async fn deploy_virtual_machine(
        &self,
        req: &DeployVirtualMachineParams,
    ) -> Result<VirtualMachine> {
        self.request_async("deployVirtualMachine", req.to_params(), "virtualmachine")
            .await
    }

    pub async fn start_virtual_machine(&self, id: &str) -> Result<VirtualMachine> {
        self.request_async("startVirtualMachine", id_params(id), "virtualmachine")
            .await
    }

    pub async fn stop_virtual_machine(&self, id: &str) -> Result<VirtualMachine> {
        self.request_async("stopVirtualMachine", id_params(id), "virtualmachine")
            .await
    }

    pub async fn reboot_virtual_machine(&self, id: &str) -> Result<VirtualMachine> {
        self.request_async("rebootVirtualMachine", id_params(id), "virtualmachine")
            .await
    }

    /// Destroy a VM. With `expunge` the VM skips the recoverable
    /// `Destroyed` state and is removed immediately.
    pub async fn destroy_virtual_machine(&self, id: &str, expunge: bool) -> Result<()> {
        let mut p = id_params(id);
        if expunge {
            p.set("expunge", "true");
        }

        let handle: AsyncJobHandle =
            decode("destroyVirtualMachine", self.request("destroyVirtualMachine", p).await?)?;
        self.wait_for_job("destroyVirtualMachine", &handle.job_id)
            .await?;
        Ok(())
    }

    pub async fn list_virtual_machines(
        &self,
        req: &ListVirtualMachinesParams,
    ) -> Result<ListVirtualMachinesResponse> {
        decode(
            "listVirtualMachines",
            self.request("listVirtualMachines", req.to_params()).await?,
        )
    }

    // ── SSH key pairs ───────────────────────────────────────────────

    pub async fn list_ssh_key_pairs(&self, name: &str) -> Result<ListSshKeyPairsResponse> {
        let mut p = Params::new();
        p.set_opt("name", Some(name));
        decode("listSSHKeyPairs", self.request("listSSHKeyPairs", p).await?)
    }

    pub async fn register_ssh_key_pair(&self, name: &str, public_key: &str) -> Result<SshKeyPair> {
        let mut p = Params::new();
        p.set("name", name);
        p.set("publickey", public_key);
        let resp: RegisterSshKeyPairResponse =
            decode("registerSSHKeyPair", self.request("registerSSHKeyPair", p).await?)?;
        Ok(resp.key_pair)
    }

    pub async fn delete_ssh_key_pair(&self, name: &str) -> Result<()> {
        let mut p = Params::new();
        p.set("name", name);
        let resp: SuccessResponse =
            decode("deleteSSHKeyPair", self.request("deleteSSHKeyPair", p).await?)?;

        if !resp.success {
            return Err(Error::Malformed {
                command: "deleteSSHKeyPair",
                reason: resp
                    .display_text
                    .unwrap_or_else(|| "success=false".into()),
            });
        }
        Ok(())
    }

    // ── Zones & templates ───────────────────────────────────────────

    pub async fn get_zone_by_id(&self, id: &str) -> Result<Zone> {
        let resp: ListZonesResponse =
            decode("listZones", self.request("listZones", id_params(id)).await?)?;
        first_match("zone", id, resp.count, resp.zone)
    }

    pub async fn get_template_by_id(
        &self,
        id: &str,
        template_filter: &str,
        zone_id: &str,
    ) -> Result<Template> {
        let mut p = id_params(id);
        p.set("templatefilter", template_filter);
        p.set_opt("zoneid", Some(zone_id));
        let resp: ListTemplatesResponse =
            decode("listTemplates", self.request("listTemplates", p).await?)?;
        first_match("template", id, resp.count, resp.template)
    }
}

fn id_params(id: &str) -> Params {
    let mut p = Params::new();
    p.set("id", id);
    p
}

/// Strip the `<command>response` wrapper CloudStack puts around every body.
fn unwrap_envelope(command: &'static str, body: Value) -> Result<Value> {
    let Value::Object(map) = body else {
        return Err(Error::Malformed {
            command,
            reason: "body is not a JSON object".into(),
        });
    };

    map.into_iter()
        .find(|(k, _)| k.ends_with("response"))
        .map(|(_, v)| v)
        .ok_or_else(|| Error::Malformed {
            command,
            reason: "missing response envelope".into(),
        })
}

fn decode<T: DeserializeOwned>(command: &'static str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Malformed {
        command,
        reason: e.to_string(),
    })
}

fn first_match<T>(kind: &'static str, id: &str, count: usize, items: Vec<T>) -> Result<T> {
    if count == 0 {
        return Err(Error::NotFound {
            kind,
            id: id.to_string(),
        });
    }
    items.into_iter().next().ok_or_else(|| Error::NotFound {
        kind,
        id: id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signed_query_carries_credentials_and_region() {
        let client = CloudStackClient::new(DEFAULT_API_URL, "key", "secret").with_region("Europe");
        let mut p = Params::new();
        p.set("id", "z1");

        let query = client.signed_query("listZones", p);
        let get = |k: &str| query.iter().find(|(qk, _)| qk == k).map(|(_, v)| v.as_str());

        assert_eq!(get("apiKey"), Some("key"));
        assert_eq!(get("command"), Some("listZones"));
        assert_eq!(get("response"), Some("json"));
        assert_eq!(get("region"), Some("Europe"));
        assert!(get("signature").is_some());
        assert_eq!(query.last().map(|(k, _)| k.as_str()), Some("signature"));
    }

    #[test]
    fn empty_region_is_not_sent() {
        let client = CloudStackClient::new(DEFAULT_API_URL, "key", "secret").with_region("");
        let query = client.signed_query("listZones", Params::new());
        assert!(query.iter().all(|(k, _)| k != "region"));
    }

    #[test]
    fn unwraps_command_envelope() {
        let body = json!({
            "listzonesresponse": {
                "count": 1,
                "zone": [{ "id": "z1", "networktype": "Advanced" }]
            }
        });
        let inner = unwrap_envelope("listZones", body).unwrap();
        let resp: ListZonesResponse = decode("listZones", inner).unwrap();
        assert_eq!(resp.zone[0].network_type, "Advanced");
    }

    #[test]
    fn envelope_without_response_key_is_malformed() {
        let err = unwrap_envelope("listZones", json!({ "zone": [] })).unwrap_err();
        assert!(matches!(err, Error::Malformed { command: "listZones", .. }));
    }

    #[test]
    fn empty_list_decodes_to_zero_count() {
        let resp: ListVirtualMachinesResponse =
            decode("listVirtualMachines", json!({})).unwrap();
        assert_eq!(resp.count, 0);
        assert!(resp.virtual_machines.is_empty());
    }

    #[test]
    fn first_match_reports_not_found() {
        let err = first_match::<Zone>("zone", "z9", 0, Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "no zone found with id z9");
    }

    #[test]
    fn decodes_virtual_machine_nics() {
        let vm: VirtualMachine = decode(
            "deployVirtualMachine",
            json!({
                "id": "vm-1",
                "name": "node-1",
                "displayname": "node-1",
                "state": "Running",
                "nic": [
                    { "id": "n1", "ipaddress": "10.0.0.5", "networkid": "net-1", "isdefault": true },
                    { "id": "n2", "ipaddress": "10.0.1.5", "networkid": "net-2", "isdefault": false }
                ]
            }),
        )
        .unwrap();

        assert_eq!(vm.state, "Running");
        assert_eq!(vm.nic.len(), 2);
        assert_eq!(vm.nic[0].ip_address.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn deploy_params_include_disk_only_when_set() {
        let mut req = DeployVirtualMachineParams::new("so-1", "tpl-1", "zone-1");
        req.name = Some("node-1".into());
        req.details.insert("workload".into(), "ranchernode".into());
        req.network_ids.push("net-1".into());

        let p = req.to_params();
        assert_eq!(p.get("details[0].workload"), Some("ranchernode"));
        assert_eq!(p.get("networkids"), Some("net-1"));
        assert_eq!(p.get("diskofferingid"), None);
        assert_eq!(p.get("size"), None);

        req.disk_offering_id = Some("do-1".into());
        req.size = Some(50);
        let p = req.to_params();
        assert_eq!(p.get("diskofferingid"), Some("do-1"));
        assert_eq!(p.get("size"), Some("50"));
    }

    #[test]
    fn delete_success_accepts_string_flag() {
        let resp: SuccessResponse =
            decode("deleteSSHKeyPair", json!({ "success": "true" })).unwrap();
        assert!(resp.success);
        let resp: SuccessResponse =
            decode("deleteSSHKeyPair", json!({ "success": false })).unwrap();
        assert!(!resp.success);
    }
}
