// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::errors::Error;
use crate::integration::Config;

/// Turns a discovered config into the form node agents run.
#[derive(Debug, Clone, Default)]
pub struct Patcher {
    extra_tags: Vec<String>,
}

impl Patcher {
    pub fn new(extra_tags: Vec<String>) -> Self {
        Patcher { extra_tags }
    }

    /// Returns a patched copy of `config`:
    /// - AD identifiers are cleared so node agents do not treat it as a template
    /// - the cluster-check flag is cleared
    /// - every instance gets `empty_default_hostname: true`
    /// - the extra tags are merged into every instance
    ///
    /// The input is never modified.
    pub fn patch(&self, config: &Config) -> Result<Config, Error> {
        let mut out = config.clone();
        out.ad_identifiers.clear();
        out.cluster_check = false;

        for (index, instance) in out.instances.iter_mut().enumerate() {
            let failure = |source| Error::PatcherFailure {
                check: config.name.clone(),
                index,
                source,
            };
            instance
                .set_field("empty_default_hostname", true)
                .map_err(failure)?;
            if self.extra_tags.is_empty() {
                continue;
            }
            instance
                .merge_additional_tags(&self.extra_tags)
                .map_err(failure)?;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::Data;

    fn config() -> Config {
        Config {
            name: "http_check".to_string(),
            instances: vec![
                Data::new("url: http://a\ntags:\n- env:prod\n"),
                Data::new("url: http://b\n"),
            ],
            init_config: Data::new("timeout: 5\n"),
            ad_identifiers: vec!["_kube_service".to_string()],
            cluster_check: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_patch() {
        let input = config();
        let patched = Patcher::new(vec!["cluster_name:prod".to_string()])
            .patch(&input)
            .unwrap();

        assert!(patched.ad_identifiers.is_empty());
        assert!(!patched.cluster_check);
        assert_eq!(patched.init_config, input.init_config);
        assert_eq!(patched.instances.len(), 2);
        for instance in &patched.instances {
            let value: serde_yaml::Value = serde_yaml::from_str(instance.as_str()).unwrap();
            assert_eq!(value["empty_default_hostname"], serde_yaml::Value::Bool(true));
            let tags = value["tags"].as_sequence().unwrap();
            assert_eq!(tags.last().and_then(|t| t.as_str()), Some("cluster_name:prod"));
        }

        // Input untouched
        assert_eq!(input, config());
        assert_ne!(input.digest(), patched.digest());
    }

    #[test]
    fn test_patch_without_extra_tags() {
        let patched = Patcher::default().patch(&config()).unwrap();
        let value: serde_yaml::Value =
            serde_yaml::from_str(patched.instances[1].as_str()).unwrap();
        assert!(value.get("tags").is_none());
        assert_eq!(value["empty_default_hostname"], serde_yaml::Value::Bool(true));
    }

    #[test]
    fn test_patch_failure_reports_instance_index() {
        let mut input = config();
        input.instances.push(Data::new("- not\n- a mapping\n"));
        let err = Patcher::default().patch(&input).unwrap_err();
        match err {
            Error::PatcherFailure { check, index, .. } => {
                assert_eq!(check, "http_check");
                assert_eq!(index, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
