//! Configuration types of the operator core.
//!
//! These map to `kubeconverge.yaml`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::apply::{ApplyObject, ApplyOptions};
use crate::sync::KindPolicy;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Controller identity and timeouts.
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Apply option overrides, keyed by kind (e.g. `ServiceAccount`).
    #[serde(default)]
    pub kinds: BTreeMap<String, ApplyOptions>,
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Controller identity and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Name reported on events.
    #[serde(default = "default_controller_name")]
    pub name: String,
    /// Instance reported on events, usually the pod name.
    #[serde(default)]
    pub instance: Option<String>,
    /// Timeout of a single store request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Timeout of a whole reconciliation pass, in seconds.
    #[serde(default)]
    pub pass_timeout_secs: Option<u64>,
}

/// Logging setup.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log at debug level.
    #[serde(default)]
    pub verbose: bool,
    /// Emit JSON lines.
    #[serde(default)]
    pub json: bool,
}

fn default_controller_name() -> String {
    String::from("kubeconverge")
}

const fn default_request_timeout() -> u64 {
    30
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: default_controller_name(),
            instance: None,
            request_timeout_secs: default_request_timeout(),
            pass_timeout_secs: None,
        }
    }
}

impl ControllerConfig {
    /// Timeout of a single store request.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Bounds the requests of a Kubernetes client by the request timeout.
    pub fn configure_client(&self, config: &mut kube::Config) {
        config.read_timeout = Some(self.request_timeout());
        config.write_timeout = Some(self.request_timeout());
    }

    /// Timeout of a whole pass, if bounded.
    #[must_use]
    pub fn pass_timeout(&self) -> Option<Duration> {
        self.pass_timeout_secs.map(Duration::from_secs)
    }
}

impl OperatorConfig {
    /// Apply options configured for `kind`, or the defaults.
    #[must_use]
    pub fn apply_options(&self, kind: &str) -> ApplyOptions {
        self.kinds.get(kind).copied().unwrap_or_default()
    }

    /// Sync policy of `K`, with the configured apply options.
    ///
    /// Kinds without an override keep `fallback`.
    #[must_use]
    pub fn policy_for<K: ApplyObject>(&self, fallback: KindPolicy) -> KindPolicy {
        match self.kinds.get(K::kind(&()).as_ref()) {
            Some(options) => fallback.with_options(*options),
            None => fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Secret, ServiceAccount};

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::default();
        assert_eq!(config.controller.name, "kubeconverge");
        assert_eq!(config.controller.request_timeout(), Duration::from_secs(30));
        assert!(config.controller.pass_timeout().is_none());
        assert_eq!(config.apply_options("Secret"), ApplyOptions::new());
    }

    #[test]
    fn test_configure_client() {
        let controller = ControllerConfig {
            request_timeout_secs: 7,
            ..ControllerConfig::default()
        };
        let mut config = kube::Config::new("https://127.0.0.1:6443".parse().unwrap());

        controller.configure_client(&mut config);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(7)));
        assert_eq!(config.write_timeout, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_policy_override() {
        let mut config = OperatorConfig::default();
        config.kinds.insert(
            String::from("Secret"),
            ApplyOptions::new().with_allow_missing_controller_ref(true),
        );

        let secret = config.policy_for::<Secret>(KindPolicy::for_kind::<Secret>());
        assert!(secret.options.allow_missing_controller_ref);
        assert_eq!(secret.condition_type, "SecretControllerProgressing");

        let fallback = KindPolicy::for_kind::<ServiceAccount>()
            .with_options(ApplyOptions::new().with_force_ownership(true));
        let sa = config.policy_for::<ServiceAccount>(fallback.clone());
        assert_eq!(sa, fallback);
    }
}
