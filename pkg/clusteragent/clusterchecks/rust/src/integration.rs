// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashSet;
use std::hash::Hasher;
use std::path::Path;

use anyhow::{Context, Result};
use fnv::FnvHasher;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::errors::DataError;

/// Raw YAML payload of an instance, an init config or a logs config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Data(String);

impl Data {
    pub fn new(raw: impl Into<String>) -> Self {
        Data(raw.into())
    }

    pub fn from_value(value: &Value) -> Result<Self, DataError> {
        if value.is_null() {
            return Ok(Data::default());
        }
        Ok(Data(serde_yaml::to_string(value)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    fn mapping(&self) -> Result<Mapping, DataError> {
        if self.is_empty() {
            return Ok(Mapping::new());
        }
        match serde_yaml::from_str::<Value>(&self.0)? {
            Value::Mapping(m) => Ok(m),
            Value::Null => Ok(Mapping::new()),
            _ => Err(DataError::NotAMapping),
        }
    }

    fn replace(&mut self, m: Mapping) -> Result<(), DataError> {
        self.0 = serde_yaml::to_string(&Value::Mapping(m))?;
        Ok(())
    }

    /// Sets `key` to `value` at the top level of the payload.
    pub fn set_field(&mut self, key: &str, value: impl Into<Value>) -> Result<(), DataError> {
        let mut m = self.mapping()?;
        m.insert(Value::from(key), value.into());
        self.replace(m)
    }

    /// Appends `tags` to the payload's `tags` list. Existing tags keep their
    /// order and duplicates are dropped.
    pub fn merge_additional_tags(&mut self, tags: &[String]) -> Result<(), DataError> {
        let mut m = self.mapping()?;
        let existing = match m.get("tags") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(seq)) => seq
                .iter()
                .map(|v| v.as_str().map(str::to_owned).ok_or(DataError::InvalidTags))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(DataError::InvalidTags),
        };

        let mut seen = HashSet::new();
        let merged: Vec<Value> = existing
            .iter()
            .chain(tags)
            .filter(|tag| seen.insert(tag.as_str()))
            .map(|tag| Value::from(tag.as_str()))
            .collect();
        m.insert(Value::from("tags"), Value::Sequence(merged));
        self.replace(m)
    }

    /// Name of the instance, taken from its `name` or `namespace` field.
    pub fn name_for_instance(&self) -> Option<String> {
        let m = self.mapping().ok()?;
        ["name", "namespace"]
            .iter()
            .find_map(|key| m.get(*key).and_then(Value::as_str))
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
    }

    /// Key-order and tag-order insensitive rendering of the payload, falling
    /// back to the raw text when it is not a plain mapping.
    fn canonical(&self) -> String {
        let Ok(m) = self.mapping() else {
            return self.0.clone();
        };
        let Ok(mut json) = serde_json::to_value(&m) else {
            return self.0.clone();
        };
        if let Some(serde_json::Value::Array(tags)) = json.get_mut("tags") {
            tags.sort_by_key(|tag| tag.to_string());
        }
        json.to_string()
    }
}

/// A check configuration as produced by service discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    #[serde(default)]
    pub instances: Vec<Data>,
    #[serde(default)]
    pub init_config: Data,
    #[serde(default, skip_serializing_if = "Data::is_empty")]
    pub logs_config: Data,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ad_identifiers: Vec<String>,
    #[serde(default)]
    pub cluster_check: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_name: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
}

fn write_field(h: &mut FnvHasher, bytes: &[u8]) {
    h.write(bytes);
    // separator, so that ("ab", "c") and ("a", "bc") differ
    h.write_u8(0xff);
}

impl Config {
    /// Stable identity of the config over every semantically meaningful
    /// field. Instance key order and tag order do not matter.
    pub fn digest(&self) -> String {
        let mut h = FnvHasher::default();
        write_field(&mut h, self.name.as_bytes());
        for instance in &self.instances {
            write_field(&mut h, instance.canonical().as_bytes());
        }
        write_field(&mut h, self.init_config.canonical().as_bytes());
        write_field(&mut h, self.logs_config.canonical().as_bytes());
        let mut ad_identifiers: Vec<&str> =
            self.ad_identifiers.iter().map(String::as_str).collect();
        ad_identifiers.sort_unstable();
        for id in ad_identifiers {
            write_field(&mut h, id.as_bytes());
        }
        h.write_u8(u8::from(self.cluster_check));
        write_field(&mut h, self.node_name.as_bytes());
        format!("{:016x}", h.finish())
    }

    /// Cheaper fingerprint over the raw payloads, only used to derive check
    /// IDs.
    pub fn fast_digest(&self) -> u64 {
        let mut h = FnvHasher::default();
        write_field(&mut h, self.name.as_bytes());
        for instance in &self.instances {
            write_field(&mut h, instance.as_str().as_bytes());
        }
        write_field(&mut h, self.init_config.as_str().as_bytes());
        write_field(&mut h, self.logs_config.as_str().as_bytes());
        for id in &self.ad_identifiers {
            write_field(&mut h, id.as_bytes());
        }
        h.write_u8(u8::from(self.cluster_check));
        write_field(&mut h, self.node_name.as_bytes());
        h.finish()
    }

    /// Estimated cost of running the config: one unit per instance.
    pub fn weight(&self) -> u64 {
        self.instances.len().max(1) as u64
    }
}

#[derive(Debug, Deserialize)]
struct CheckFile {
    #[serde(default)]
    init_config: Value,
    #[serde(default)]
    instances: Vec<Value>,
    #[serde(default)]
    logs: Value,
    #[serde(default)]
    ad_identifiers: Vec<String>,
    #[serde(default)]
    cluster_check: bool,
}

/// Scans `dir` for `*.yaml`/`*.yml` check configurations. The check name is
/// the file name without its extension. Files that fail to parse are logged
/// and skipped.
pub fn load_check_configs(dir: &Path) -> Result<Vec<Config>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read checks directory: {}", dir.display()))?;

    let mut paths: Vec<_> = entries
        .filter_map(|e| match e {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!("skipping unreadable entry in {}: {e}", dir.display());
                None
            }
        })
        .filter(|path| {
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if !is_yaml {
                debug!("skipping non-YAML file: {}", path.display());
            }
            is_yaml
        })
        .collect();
    paths.sort();

    let mut configs = Vec::with_capacity(paths.len());
    for path in paths {
        match parse_check_file(&path) {
            Ok(config) => configs.push(config),
            Err(e) => warn!("skipping {}: {e:#}", path.display()),
        }
    }
    Ok(configs)
}

fn parse_check_file(path: &Path) -> Result<Config> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: CheckFile =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;

    let instances = file
        .instances
        .iter()
        .map(Data::from_value)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("encoding instances of {}", path.display()))?;

    Ok(Config {
        name,
        instances,
        init_config: Data::from_value(&file.init_config)?,
        logs_config: Data::from_value(&file.logs)?,
        ad_identifiers: file.ad_identifiers,
        cluster_check: file.cluster_check,
        node_name: String::new(),
        source: format!("file:{}", path.display()),
        provider: "file".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tags_of(data: &Data) -> Vec<String> {
        let m = data.mapping().unwrap();
        m.get("tags")
            .and_then(Value::as_sequence)
            .map(|seq| {
                seq.iter()
                    .map(|v| v.as_str().unwrap().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_set_field() {
        let mut data = Data::new("host: localhost\nport: 5432\n");
        data.set_field("empty_default_hostname", true).unwrap();
        let m = data.mapping().unwrap();
        assert_eq!(m.get("empty_default_hostname"), Some(&Value::Bool(true)));
        assert_eq!(m.get("host").and_then(Value::as_str), Some("localhost"));
    }

    #[test]
    fn test_set_field_on_empty_payload() {
        let mut data = Data::default();
        data.set_field("foo", "bar").unwrap();
        assert_eq!(
            data.mapping().unwrap().get("foo").and_then(Value::as_str),
            Some("bar")
        );
    }

    #[test]
    fn test_set_field_not_a_mapping() {
        let mut data = Data::new("- a\n- b\n");
        let err = data.set_field("foo", true).unwrap_err();
        assert!(matches!(err, DataError::NotAMapping));
        assert_eq!(data.as_str(), "- a\n- b\n");
    }

    #[test]
    fn test_merge_additional_tags() {
        let mut data = Data::new("tags:\n- b:2\n- a:1\n- b:2\n");
        data.merge_additional_tags(&["c:3".to_string(), "a:1".to_string(), "d:4".to_string()])
            .unwrap();
        assert_eq!(tags_of(&data), vec!["b:2", "a:1", "c:3", "d:4"]);
    }

    #[test]
    fn test_merge_additional_tags_without_tags() {
        let mut data = Data::new("url: http://foo\n");
        data.merge_additional_tags(&["cluster_name:foo".to_string()])
            .unwrap();
        assert_eq!(tags_of(&data), vec!["cluster_name:foo"]);
    }

    #[test]
    fn test_merge_additional_tags_invalid() {
        let mut data = Data::new("tags: not-a-list\n");
        let err = data
            .merge_additional_tags(&["a:b".to_string()])
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidTags));
    }

    #[test]
    fn test_name_for_instance() {
        assert_eq!(
            Data::new("name: primary\nnamespace: ns\n").name_for_instance(),
            Some("primary".to_string())
        );
        assert_eq!(
            Data::new("namespace: ns\n").name_for_instance(),
            Some("ns".to_string())
        );
        assert_eq!(Data::new("url: x\n").name_for_instance(), None);
        assert_eq!(Data::new("[broken").name_for_instance(), None);
    }

    #[test]
    fn test_digest_ignores_key_and_tag_order() {
        let a = Config {
            name: "http_check".to_string(),
            instances: vec![Data::new("url: a\ntags:\n- x\n- y\n")],
            ..Default::default()
        };
        let b = Config {
            name: "http_check".to_string(),
            instances: vec![Data::new("tags:\n- y\n- x\nurl: a\n")],
            ..Default::default()
        };
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.fast_digest(), b.fast_digest());
    }

    #[test]
    fn test_digest_changes_with_content() {
        let base = Config {
            name: "http_check".to_string(),
            instances: vec![Data::new("url: a\n")],
            ..Default::default()
        };
        let mut other = base.clone();
        other.instances = vec![Data::new("url: b\n")];
        assert_ne!(base.digest(), other.digest());

        let mut flagged = base.clone();
        flagged.cluster_check = true;
        assert_ne!(base.digest(), flagged.digest());

        assert_eq!(base.digest().len(), 16);
        assert_eq!(base.digest(), base.clone().digest());
    }

    #[test]
    fn test_digest_ignores_source() {
        let a = Config {
            name: "redis".to_string(),
            source: "kube_services:1".to_string(),
            ..Default::default()
        };
        let b = Config {
            source: "file:/etc/redis.yaml".to_string(),
            ..a.clone()
        };
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_weight() {
        let mut config = Config::default();
        assert_eq!(config.weight(), 1);
        config.instances = vec![Data::new("a: 1"), Data::new("a: 2"), Data::new("a: 3")];
        assert_eq!(config.weight(), 3);
    }

    #[test]
    fn test_load_check_configs() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
cluster_check: true
init_config:
  min_collection_interval: 30
instances:
  - name: frontend
    url: http://frontend:8080
  - name: backend
    url: http://backend:8080
"#;
        fs::write(dir.path().join("http_check.yaml"), yaml).unwrap();
        fs::write(dir.path().join("broken.yaml"), "instances: [").unwrap();
        fs::write(dir.path().join("README.md"), "not a check").unwrap();

        let configs = load_check_configs(dir.path()).unwrap();
        assert_eq!(configs.len(), 1);
        let config = &configs[0];
        assert_eq!(config.name, "http_check");
        assert!(config.cluster_check);
        assert_eq!(config.instances.len(), 2);
        assert_eq!(
            config.instances[0].name_for_instance(),
            Some("frontend".to_string())
        );
        assert!(config.source.starts_with("file:"));
        assert!(!config.init_config.is_empty());
    }

    #[test]
    fn test_load_check_configs_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["charlie", "alpha", "bravo"] {
            fs::write(dir.path().join(format!("{name}.yml")), "instances: [{}]\n").unwrap();
        }
        let configs = load_check_configs(dir.path()).unwrap();
        let names: Vec<&str> = configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
    }

    #[test]
    fn test_load_check_configs_missing_dir() {
        assert!(load_check_configs(Path::new("/nonexistent/conf.d")).is_err());
    }
}
