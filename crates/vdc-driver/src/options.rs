//! Create-time options and their resolution.

use std::collections::HashMap;

use crate::{Error, Result};

pub const API_URL: &str = "interoutevdc-apiurl";
pub const API_KEY: &str = "interoutevdc-apikey";
pub const SECRET_KEY: &str = "interoutevdc-secretkey";
pub const TEMPLATE_ID: &str = "interoutevdc-templateid";
pub const TEMPLATE_FILTER: &str = "interoutevdc-templatefilter";
pub const SERVICE_OFFERING_ID: &str = "interoutevdc-serviceofferingid";
pub const NETWORK_ID: &str = "interoutevdc-networkid";
pub const ZONE_ID: &str = "interoutevdc-zoneid";
pub const DISK_OFFERING_ID: &str = "interoutevdc-diskofferingid";
pub const DISK_SIZE: &str = "interoutevdc-disksize";
pub const VDC_REGION: &str = "interoutevdc-vdcregion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    String,
    Int,
}

/// A named create option with optional env var fallback and default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    pub name: &'static str,
    pub usage: &'static str,
    pub env_var: Option<&'static str>,
    pub kind: FlagKind,
    pub default: Option<&'static str>,
}

impl Flag {
    fn string(name: &'static str, usage: &'static str) -> Self {
        Self {
            name,
            usage,
            env_var: None,
            kind: FlagKind::String,
            default: None,
        }
    }

    fn env(mut self, var: &'static str) -> Self {
        self.env_var = Some(var);
        self
    }

    fn default_value(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }
}

/// Every option the driver understands.
pub fn create_flags() -> Vec<Flag> {
    vec![
        Flag::string(API_URL, "Interoute VDC API URL")
            .env("INTEROUTEVDC_API_URL")
            .default_value(cloudstack_api::DEFAULT_API_URL),
        Flag::string(API_KEY, "Interoute VDC API key").env("INTEROUTEVDC_API_KEY"),
        Flag::string(SECRET_KEY, "Interoute VDC API secret key").env("INTEROUTEVDC_SECRET_KEY"),
        Flag::string(TEMPLATE_ID, "Interoute VDC template ID"),
        Flag::string(SERVICE_OFFERING_ID, "Interoute VDC service offering ID"),
        Flag::string(NETWORK_ID, "Interoute VDC network ID"),
        Flag::string(ZONE_ID, "Interoute VDC zone ID"),
        Flag::string(TEMPLATE_FILTER, "Interoute VDC template filter"),
        Flag::string(DISK_OFFERING_ID, "Interoute VDC disk offering ID"),
        Flag {
            kind: FlagKind::Int,
            ..Flag::string(DISK_SIZE, "Interoute VDC additional disk size").default_value("0")
        },
        Flag::string(VDC_REGION, "Interoute VDC Region").env("INTEROUTEVDC_REGION"),
    ]
}

/// Typed access to resolved option values.
///
/// Unset options read as the empty string or zero.
pub trait DriverOptions: Send + Sync {
    fn string(&self, name: &str) -> String;
    fn int(&self, name: &str) -> i64;
}

/// Option values keyed by flag name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionMap {
    values: HashMap<String, String>,
}

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Resolve every flag from, in order: `explicit`, the process
    /// environment, the flag default.
    pub fn resolve(flags: &[Flag], explicit: HashMap<String, String>) -> Result<Self> {
        Self::resolve_with(flags, explicit, |var| std::env::var(var).ok())
    }

    /// Like [`OptionMap::resolve`] with a custom environment lookup.
    pub fn resolve_with(
        flags: &[Flag],
        mut explicit: HashMap<String, String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut map = Self::new();

        for flag in flags {
            let value = explicit
                .remove(flag.name)
                .or_else(|| flag.env_var.and_then(&env).filter(|v| !v.is_empty()))
                .or_else(|| flag.default.map(str::to_string));

            let Some(value) = value else { continue };

            if flag.kind == FlagKind::Int && value.trim().parse::<i64>().is_err() {
                return Err(Error::InvalidOption {
                    name: flag.name,
                    value,
                });
            }
            map.set(flag.name, value);
        }

        Ok(map)
    }
}

impl DriverOptions for OptionMap {
    fn string(&self, name: &str) -> String {
        self.values.get(name).cloned().unwrap_or_default()
    }

    fn int(&self, name: &str) -> i64 {
        self.values
            .get(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn api_url_has_default_endpoint() {
        let opts = OptionMap::resolve_with(&create_flags(), HashMap::new(), no_env).unwrap();
        assert_eq!(
            opts.string(API_URL),
            "https://myservices.interoute.com/myservices/api/vdc"
        );
        assert_eq!(opts.string(API_KEY), "");
        assert_eq!(opts.int(DISK_SIZE), 0);
    }

    #[test]
    fn explicit_beats_env_beats_default() {
        let env = |var: &str| match var {
            "INTEROUTEVDC_API_URL" => Some("https://env.example/api".to_string()),
            "INTEROUTEVDC_API_KEY" => Some("env-key".to_string()),
            _ => None,
        };
        let explicit = HashMap::from([(API_KEY.to_string(), "flag-key".to_string())]);

        let opts = OptionMap::resolve_with(&create_flags(), explicit, env).unwrap();
        assert_eq!(opts.string(API_URL), "https://env.example/api");
        assert_eq!(opts.string(API_KEY), "flag-key");
    }

    #[test]
    fn empty_env_var_falls_through_to_default() {
        let env = |_: &str| Some(String::new());
        let opts = OptionMap::resolve_with(&create_flags(), HashMap::new(), env).unwrap();
        assert_eq!(opts.string(API_URL), cloudstack_api::DEFAULT_API_URL);
    }

    #[test]
    fn env_only_applies_to_flags_that_declare_one() {
        let env = |_: &str| Some("from-env".to_string());
        let opts = OptionMap::resolve_with(&create_flags(), HashMap::new(), env).unwrap();
        assert_eq!(opts.string(VDC_REGION), "from-env");
        assert_eq!(opts.string(TEMPLATE_ID), "");
    }

    #[test]
    fn disk_size_must_be_an_integer() {
        let explicit = HashMap::from([(DISK_SIZE.to_string(), "fifty".to_string())]);
        let err = OptionMap::resolve_with(&create_flags(), explicit, no_env).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { name: DISK_SIZE, .. }));

        let explicit = HashMap::from([(DISK_SIZE.to_string(), "50".to_string())]);
        let opts = OptionMap::resolve_with(&create_flags(), explicit, no_env).unwrap();
        assert_eq!(opts.int(DISK_SIZE), 50);
    }

    #[test]
    fn flag_table_matches_documented_options() {
        let flags = create_flags();
        assert_eq!(flags.len(), 11);

        let env_vars: Vec<_> = flags.iter().filter_map(|f| f.env_var).collect();
        assert_eq!(
            env_vars,
            [
                "INTEROUTEVDC_API_URL",
                "INTEROUTEVDC_API_KEY",
                "INTEROUTEVDC_SECRET_KEY",
                "INTEROUTEVDC_REGION",
            ]
        );
        assert!(flags.iter().all(|f| f.name.starts_with("interoutevdc-")));
    }
}
