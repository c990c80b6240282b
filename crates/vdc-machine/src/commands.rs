use std::sync::Arc;

use tracing::{info, warn};
use vdc_driver::{
    CloudConnector, CloudStackConnector, DriverConfig, KeyGenerator, MachineDriver, OptionMap,
    SshKeygen, VdcDriver, create_flags,
};

use crate::cli::{Command, CreateArgs};
use crate::config::CliConfig;
use crate::error::{CliError, Result};
use crate::store::{MachineStore, validate_name};

/// Shared dependencies for every command.
pub struct Context {
    pub store: MachineStore,
    pub connector: Arc<dyn CloudConnector>,
    pub keys: Arc<dyn KeyGenerator>,
}

impl Context {
    pub fn new(config: &CliConfig) -> Self {
        Self {
            store: MachineStore::new(&config.storage_path),
            connector: Arc::new(
                CloudStackConnector::new().with_async_timeout(config.async_timeout),
            ),
            keys: Arc::new(SshKeygen),
        }
    }

    fn driver(&self, config: DriverConfig) -> VdcDriver {
        VdcDriver::from_config(config)
            .with_connector(self.connector.clone())
            .with_key_generator(self.keys.clone())
    }

    fn load(&self, name: &str) -> Result<VdcDriver> {
        Ok(self.driver(self.store.load(name)?))
    }
}

pub async fn run(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Create(args) => create(ctx, args).await,
        Command::Start(m) => {
            ctx.load(&m.name)?.start().await?;
            println!("Started {}", m.name);
            Ok(())
        }
        Command::Stop(m) => {
            ctx.load(&m.name)?.stop().await?;
            println!("Stopped {}", m.name);
            Ok(())
        }
        Command::Restart(m) => {
            ctx.load(&m.name)?.restart().await?;
            println!("Restarted {}", m.name);
            Ok(())
        }
        Command::Kill(m) => {
            ctx.load(&m.name)?.kill().await?;
            println!("Killed {}", m.name);
            Ok(())
        }
        Command::Rm(m) => {
            let driver = ctx.load(&m.name)?;
            if driver.config().id.is_empty() {
                driver.remove_incomplete().await?;
            } else {
                driver.remove().await?;
            }
            ctx.store.remove(&m.name)?;
            println!("Removed {}", m.name);
            Ok(())
        }
        Command::Status(m) => {
            println!("{}", ctx.load(&m.name)?.get_state().await?);
            Ok(())
        }
        Command::Ip(m) => {
            println!("{}", ctx.load(&m.name)?.ip()?);
            Ok(())
        }
        Command::Url(m) => {
            println!("{}", ctx.load(&m.name)?.url()?);
            Ok(())
        }
        Command::SshUser(m) => {
            let mut driver = ctx.load(&m.name)?;
            let user = driver.get_ssh_username().await;
            ctx.store.save(driver.config())?;
            println!("{user}");
            Ok(())
        }
        Command::Inspect(m) => {
            let config = redacted(ctx.store.load(&m.name)?);
            let json = serde_json::to_string_pretty(&config).map_err(|source| CliError::Config {
                path: ctx.store.root().to_path_buf(),
                source,
            })?;
            println!("{json}");
            Ok(())
        }
        Command::Ls => {
            for name in ctx.store.list()? {
                println!("{name}");
            }
            Ok(())
        }
        Command::Flags => {
            print_flags();
            Ok(())
        }
    }
}

async fn create(ctx: &Context, args: CreateArgs) -> Result<()> {
    validate_name(&args.name)?;
    if ctx.store.exists(&args.name) {
        return Err(CliError::MachineExists(args.name));
    }

    let flags = create_flags();
    let opts = OptionMap::resolve(&flags, args.explicit_options())?;

    let mut driver = VdcDriver::new(&args.name, ctx.store.root())
        .with_connector(ctx.connector.clone())
        .with_key_generator(ctx.keys.clone());
    driver.set_config_from_flags(&opts).await?;
    driver.pre_create_check().await?;

    // Remote resources may exist from here on; the stored machine is what
    // `rm` cleans up from.
    ctx.store.save(driver.config())?;
    let created = driver.create().await;
    ctx.store.save(driver.config())?;
    if let Err(e) = created {
        warn!(machine = %args.name, error = %e, "create failed, remove the machine to clean up");
        return Err(e.into());
    }

    let ssh_user = driver.get_ssh_username().await;
    ctx.store.save(driver.config())?;

    info!(machine = %args.name, ip = %driver.ip()?, ssh_user = %ssh_user, "machine created");
    println!("Created {} ({})", args.name, driver.url()?);
    Ok(())
}

fn redacted(mut config: DriverConfig) -> DriverConfig {
    if !config.secret_key.is_empty() {
        config.secret_key = "********".into();
    }
    config
}

fn print_flags() {
    for flag in create_flags() {
        let env = flag.env_var.map(|v| format!(" [env: {v}]")).unwrap_or_default();
        let default = flag
            .default
            .map(|v| format!(" [default: {v}]"))
            .unwrap_or_default();
        println!("--{:<34} {}{env}{default}", flag.name, flag.usage);
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use cloudstack_api::{
        DeployVirtualMachineParams, ListSshKeyPairsResponse, ListVirtualMachinesParams,
        ListVirtualMachinesResponse, SshKeyPair, Template, VirtualMachine, Zone,
    };
    use vdc_driver::{CloudApi, Endpoint};

    use super::*;
    use crate::cli::MachineArg;

    /// Cloud whose deploys always time out, leaving the instance behind.
    #[derive(Default)]
    struct TimingOutCloud {
        state: Mutex<TimingOutState>,
    }

    #[derive(Default)]
    struct TimingOutState {
        key_pairs: Vec<String>,
        vms: Vec<String>,
    }

    #[async_trait]
    impl CloudApi for TimingOutCloud {
        async fn get_zone(&self, id: &str) -> cloudstack_api::Result<Zone> {
            Ok(Zone {
                id: id.to_string(),
                name: "Frankfurt".into(),
                network_type: "Advanced".into(),
            })
        }

        async fn get_template(
            &self,
            id: &str,
            _template_filter: &str,
            _zone_id: &str,
        ) -> cloudstack_api::Result<Template> {
            Err(cloudstack_api::Error::NotFound {
                kind: "template",
                id: id.to_string(),
            })
        }

        async fn list_virtual_machines(
            &self,
            req: &ListVirtualMachinesParams,
        ) -> cloudstack_api::Result<ListVirtualMachinesResponse> {
            let s = self.state.lock().unwrap();
            let vms: Vec<VirtualMachine> = s
                .vms
                .iter()
                .filter(|n| req.name.as_ref() == Some(*n))
                .map(|n| VirtualMachine {
                    id: format!("vm-{n}"),
                    name: n.clone(),
                    display_name: None,
                    state: "Starting".into(),
                    zone_id: None,
                    template_id: None,
                    service_offering_id: None,
                    key_pair: None,
                    nic: Vec::new(),
                })
                .collect();
            Ok(ListVirtualMachinesResponse {
                count: vms.len(),
                virtual_machines: vms,
            })
        }

        async fn deploy_virtual_machine(
            &self,
            req: &DeployVirtualMachineParams,
        ) -> cloudstack_api::Result<VirtualMachine> {
            let name = req.name.clone().unwrap_or_default();
            self.state.lock().unwrap().vms.push(name);
            Err(cloudstack_api::Error::Timeout {
                command: "deployVirtualMachine",
                job_id: "job-1".into(),
                timeout: Duration::from_secs(300),
            })
        }

        async fn start_virtual_machine(&self, _id: &str) -> cloudstack_api::Result<()> {
            Ok(())
        }

        async fn stop_virtual_machine(&self, _id: &str) -> cloudstack_api::Result<()> {
            Ok(())
        }

        async fn reboot_virtual_machine(&self, _id: &str) -> cloudstack_api::Result<()> {
            Ok(())
        }

        async fn destroy_virtual_machine(
            &self,
            id: &str,
            _expunge: bool,
        ) -> cloudstack_api::Result<()> {
            self.state
                .lock()
                .unwrap()
                .vms
                .retain(|n| format!("vm-{n}") != id);
            Ok(())
        }

        async fn list_ssh_key_pairs(
            &self,
            name: &str,
        ) -> cloudstack_api::Result<ListSshKeyPairsResponse> {
            let s = self.state.lock().unwrap();
            let key_pairs: Vec<SshKeyPair> = s
                .key_pairs
                .iter()
                .filter(|k| *k == name)
                .map(|k| SshKeyPair {
                    name: k.clone(),
                    fingerprint: "aa:bb".into(),
                })
                .collect();
            Ok(ListSshKeyPairsResponse {
                count: key_pairs.len(),
                key_pairs,
            })
        }

        async fn register_ssh_key_pair(
            &self,
            name: &str,
            _public_key: &str,
        ) -> cloudstack_api::Result<()> {
            self.state.lock().unwrap().key_pairs.push(name.to_string());
            Ok(())
        }

        async fn delete_ssh_key_pair(&self, name: &str) -> cloudstack_api::Result<()> {
            self.state.lock().unwrap().key_pairs.retain(|k| k != name);
            Ok(())
        }
    }

    struct FixedConnector(Arc<TimingOutCloud>);

    impl CloudConnector for FixedConnector {
        fn connect(&self, _endpoint: &Endpoint) -> Arc<dyn CloudApi> {
            self.0.clone()
        }
    }

    struct StaticKeys;

    #[async_trait]
    impl KeyGenerator for StaticKeys {
        async fn generate(&self, _path: &Path) -> vdc_driver::Result<String> {
            Ok("ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQ test".into())
        }
    }

    fn context(root: &Path, cloud: &Arc<TimingOutCloud>) -> Context {
        Context {
            store: MachineStore::new(PathBuf::from(root)),
            connector: Arc::new(FixedConnector(cloud.clone())),
            keys: Arc::new(StaticKeys),
        }
    }

    fn create_args(name: &str) -> CreateArgs {
        CreateArgs {
            name: name.into(),
            api_url: Some("https://vdc.example/api".into()),
            api_key: Some("api-key".into()),
            secret_key: Some("secret-key".into()),
            vdc_region: Some("Europe".into()),
            template_id: Some("tpl-1".into()),
            service_offering_id: Some("so-1".into()),
            zone_id: Some("zone-1".into()),
            ..Default::default()
        }
    }

    fn rm(name: &str) -> Command {
        Command::Rm(MachineArg { name: name.into() })
    }

    #[tokio::test]
    async fn failed_create_is_kept_for_rm() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = Arc::new(TimingOutCloud::default());
        let ctx = context(dir.path(), &cloud);

        let err = run(&ctx, Command::Create(create_args("node-1")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::Driver(vdc_driver::Error::Api(cloudstack_api::Error::Timeout { .. }))
        ));

        let saved = ctx.store.load("node-1").unwrap();
        assert!(saved.id.is_empty());
        assert_eq!(saved.ssh_key_pair, "node-1");
        assert_eq!(cloud.state.lock().unwrap().key_pairs, ["node-1"]);
        assert_eq!(cloud.state.lock().unwrap().vms, ["node-1"]);

        run(&ctx, rm("node-1")).await.unwrap();

        assert!(!ctx.store.exists("node-1"));
        assert!(cloud.state.lock().unwrap().key_pairs.is_empty());
        assert!(cloud.state.lock().unwrap().vms.is_empty());
    }

    #[tokio::test]
    async fn rejected_pre_create_check_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = Arc::new(TimingOutCloud::default());
        cloud.state.lock().unwrap().key_pairs.push("node-1".into());
        let ctx = context(dir.path(), &cloud);

        let err = run(&ctx, Command::Create(create_args("node-1")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::Driver(vdc_driver::Error::KeyPairExists(_))
        ));
        assert!(!ctx.store.exists("node-1"));

        let err = run(&ctx, rm("node-1")).await.unwrap_err();
        assert!(matches!(err, CliError::UnknownMachine(_)));
        assert_eq!(cloud.state.lock().unwrap().key_pairs, ["node-1"]);
    }

    #[test]
    fn inspect_hides_secret_key() {
        let config = DriverConfig {
            api_key: "visible".into(),
            secret_key: "s3cr3t".into(),
            ..Default::default()
        };

        let shown = redacted(config);
        assert_eq!(shown.secret_key, "********");
        assert_eq!(shown.api_key, "visible");
        assert_eq!(redacted(DriverConfig::default()).secret_key, "");
    }
}
