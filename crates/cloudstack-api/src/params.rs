//! Request parameters and request signing.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

/// Ordered list of query parameters for a single API command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    /// Set `key` only when `value` is present and non-empty.
    pub fn set_opt(&mut self, key: &str, value: Option<&str>) {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self.set(key, v);
        }
    }

    /// Encode a map as `key[0].name=value`, one index per entry.
    pub fn set_map(&mut self, key: &str, map: &BTreeMap<String, String>) {
        for (i, (k, v)) in map.iter().enumerate() {
            self.set(format!("{key}[{i}].{k}"), v.clone());
        }
    }

    /// Encode a list as a single comma separated value.
    pub fn set_list(&mut self, key: &str, values: &[String]) {
        if !values.is_empty() {
            self.set(key, values.join(","));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn into_pairs(self) -> Vec<(String, String)> {
        self.pairs
    }
}

/// Compute the CloudStack request signature.
///
/// Parameters are sorted by lower-cased key, percent-encoded (space as
/// `%20`), joined with `&` and the whole string lower-cased before being
/// HMAC-SHA1'd with the secret key.
pub fn sign(pairs: &[(String, String)], secret_key: &str) -> String {
    let mut sorted: Vec<&(String, String)> = pairs.iter().collect();
    sorted.sort_by_key(|(k, _)| k.to_lowercase());

    let canonical = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
        .to_lowercase();

    let mut mac = Hmac::<Sha1>::new_from_slice(secret_key.as_bytes())
        .expect("HMAC accepts any key size");
    mac.update(canonical.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn signs_list_zones_request() {
        let p = pairs(&[
            (
                "apiKey",
                "plgWJfZK4gyS3mOMTVmjUVg-X-jlWlnfaUJ9GAbBbf9EdM-kAYMmAiLqzzq1ElZLYq_u38zCm0bewzGUdP66mg",
            ),
            ("command", "listZones"),
            ("response", "json"),
            ("id", "1128bd56-b4d9-4ac6-a7b9-c715b187ce11"),
        ]);
        let secret =
            "VDaACYb0LV9eNjTetIOElcVQkvJck_J_QljX_FcHRj87ZKiy0z0ty0ZsYBkoXkY9b7eq1EhwJaw7FF3akA3KBQ";

        assert_eq!(sign(&p, secret), "/ZO7aNdzfBryqaQq9AxoId9p5PY=");
    }

    #[test]
    fn signature_encodes_spaces_and_brackets() {
        let p = pairs(&[
            ("name", "my machine"),
            ("details[0].workload", "ranchernode"),
        ]);
        assert_eq!(sign(&p, "secret"), "pAHBLH3GxHBEp54o6rZYmNcMH/k=");
    }

    #[test]
    fn signature_ignores_parameter_order() {
        let a = pairs(&[("command", "listZones"), ("id", "z1")]);
        let b = pairs(&[("id", "z1"), ("command", "listZones")]);
        assert_eq!(sign(&a, "k"), sign(&b, "k"));
    }

    #[test]
    fn set_replaces_existing_value() {
        let mut p = Params::new();
        p.set("name", "a");
        p.set("name", "b");
        assert_eq!(p.get("name"), Some("b"));
        assert_eq!(p.into_pairs().len(), 1);
    }

    #[test]
    fn empty_optional_values_are_skipped() {
        let mut p = Params::new();
        p.set_opt("networkids", Some(""));
        p.set_opt("keypair", None);
        p.set_list("networkids", &[]);
        assert!(p.into_pairs().is_empty());
    }
}
