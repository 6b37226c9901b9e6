//! Hadoop cluster configuration (`core-site.xml`, `hdfs-site.xml`)

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;

pub const CONFIG_FILES: [&str; 2] = ["core-site.xml", "hdfs-site.xml"];

const WEBHDFS_HTTP_PORT: u16 = 9870;
const WEBHDFS_HTTPS_PORT: u16 = 9871;

static PROPERTY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<property>(.*?)</property>").expect("Failed to compile property regex")
});

static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<name>\s*(.*?)\s*</name>").expect("Failed to compile name regex")
});

static VALUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<value>\s*(.*?)\s*</value>").expect("Failed to compile value regex")
});

static DEFAULT_FS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^hdfs://(?P<host>[^:/]+)").expect("Failed to compile defaultFS regex")
});

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

static HOST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z]+://)?(?P<host>\[[^\]]*\]|[^:/\[]+)")
        .expect("Failed to compile host regex")
});

fn host(address: &str) -> &str {
    HOST_REGEX
        .captures(address)
        .and_then(|captures| captures.name("host"))
        .map_or(address, |host| host.as_str())
}

fn default_webhdfs_port(use_https: bool) -> u16 {
    if use_https {
        WEBHDFS_HTTPS_PORT
    } else {
        WEBHDFS_HTTP_PORT
    }
}

/// WebHDFS addresses of the namenode named by the authority of an `hdfs://` URL.
///
/// The authority carries the RPC port, so only its host is kept: `known` addresses on that host
/// are used as configured, otherwise the host is reached on the default WebHDFS port.
#[must_use]
pub fn endpoint_addresses(authority: &str, known: &[String], use_https: bool) -> Vec<String> {
    let wanted = host(authority);
    let matching: Vec<String> = known
        .iter()
        .filter(|address| host(address).eq_ignore_ascii_case(wanted))
        .cloned()
        .collect();
    if !matching.is_empty() {
        return matching;
    }
    vec![format!("{wanted}:{}", default_webhdfs_port(use_https))]
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// Key/value properties merged from the cluster configuration files, later files win
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterConfig {
    properties: HashMap<String, String>,
}

impl ClusterConfig {
    /// Add the properties defined in `xml`, overriding existing ones
    pub fn merge_xml(&mut self, xml: &str) {
        for block in PROPERTY_REGEX.captures_iter(xml) {
            let block = &block[1];
            let Some(name) = NAME_REGEX.captures(block) else {
                continue;
            };
            let value = VALUE_REGEX
                .captures(block)
                .map(|value| unescape(&value[1]))
                .unwrap_or_default();
            self.properties.insert(unescape(&name[1]), value);
        }
    }

    /// Load whichever of the configuration files are present in `conf_dir`
    pub async fn load(conf_dir: &Path) -> anyhow::Result<Self> {
        let mut config = Self::default();
        for name in CONFIG_FILES {
            let path = conf_dir.join(name);
            match tokio::fs::read_to_string(&path).await {
                Ok(xml) => config.merge_xml(&xml),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("{path:?} not present, skipping");
                }
                Err(error) => {
                    return Err(error).with_context(|| format!("failed reading {path:?}"));
                }
            }
        }
        Ok(config)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn use_https(&self) -> bool {
        self.get("dfs.http.policy") == Some("HTTPS_ONLY")
    }

    /// WebHDFS `host:port` addresses of the cluster's namenodes.
    ///
    /// HA namenodes of every configured nameservice come first, then the single namenode address,
    /// then the host of `fs.defaultFS` on the default WebHDFS port.
    #[must_use]
    pub fn webhdfs_addresses(&self) -> Vec<String> {
        let use_https = self.use_https();
        let kind = if use_https { "https" } else { "http" };
        let port = default_webhdfs_port(use_https);
        let key = format!("dfs.namenode.{kind}-address");
        let mut addresses = Vec::new();
        if let Some(nameservices) = self.get("dfs.nameservices") {
            for ns in split_list(nameservices) {
                match self.get(&format!("dfs.ha.namenodes.{ns}")) {
                    Some(namenodes) => addresses.extend(
                        split_list(namenodes)
                            .filter_map(|nn| self.get(&format!("{key}.{ns}.{nn}")))
                            .map(str::to_string),
                    ),
                    None => addresses.extend(self.get(&format!("{key}.{ns}")).map(str::to_string)),
                }
            }
        }
        if addresses.is_empty()
            && let Some(address) = self.get(&key)
        {
            addresses.push(address.to_string());
        }
        if addresses.is_empty()
            && let Some(default_fs) = self.get("fs.defaultFS")
            && let Some(captures) = DEFAULT_FS_REGEX.captures(default_fs)
        {
            addresses.push(format!("{}:{port}", &captures["host"]));
        }
        addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(xml: &str) -> ClusterConfig {
        let mut config = ClusterConfig::default();
        config.merge_xml(&format!("<?xml version=\"1.0\"?><configuration>{xml}</configuration>"));
        config
    }

    fn property(name: &str, value: &str) -> String {
        format!("<property>\n  <name>{name}</name>\n  <value>{value}</value>\n</property>\n")
    }

    #[test]
    fn parses_properties() {
        let config = config(&format!(
            "{}<!-- comment -->{}<property><name>empty</name></property>",
            property("fs.defaultFS", "hdfs://nn.example:8020"),
            property("x.y", " a &amp; b "),
        ));
        assert_eq!(config.get("fs.defaultFS"), Some("hdfs://nn.example:8020"));
        assert_eq!(config.get("x.y"), Some("a & b"));
        assert_eq!(config.get("empty"), None);
        assert_eq!(config.get("missing"), None);
    }

    #[test]
    fn later_definitions_win() {
        let mut config = config(&property("k", "core"));
        config.merge_xml(&property("k", "hdfs"));
        assert_eq!(config.get("k"), Some("hdfs"));
    }

    #[test]
    fn ha_namenodes_come_first() {
        let config = config(
            &[
                property("dfs.nameservices", "ns1"),
                property("dfs.ha.namenodes.ns1", "nn1, nn2"),
                property("dfs.namenode.http-address.ns1.nn1", "host1:9870"),
                property("dfs.namenode.http-address.ns1.nn2", "host2:9870"),
                property("dfs.namenode.http-address", "single:9870"),
            ]
            .concat(),
        );
        assert_eq!(config.webhdfs_addresses(), vec!["host1:9870", "host2:9870"]);
    }

    #[test]
    fn single_namenode_address() {
        let config = config(&property("dfs.namenode.http-address", "single:50070"));
        assert_eq!(config.webhdfs_addresses(), vec!["single:50070"]);
    }

    #[test]
    fn https_policy_selects_https_addresses() {
        let config = config(
            &[
                property("dfs.http.policy", "HTTPS_ONLY"),
                property("dfs.namenode.http-address", "plain:9870"),
                property("dfs.namenode.https-address", "secure:9871"),
            ]
            .concat(),
        );
        assert!(config.use_https());
        assert_eq!(config.webhdfs_addresses(), vec!["secure:9871"]);
    }

    #[test]
    fn falls_back_to_default_fs_host() {
        let config = config(&property("fs.defaultFS", "hdfs://nn.example:8020"));
        assert!(!config.use_https());
        assert_eq!(config.webhdfs_addresses(), vec!["nn.example:9870"]);
        assert!(ClusterConfig::default().webhdfs_addresses().is_empty());
    }

    #[test]
    fn endpoint_keeps_host_and_switches_to_webhdfs_port() {
        assert_eq!(
            endpoint_addresses("nn.example:8020", &[], false),
            vec!["nn.example:9870"]
        );
        assert_eq!(endpoint_addresses("nn.example", &[], true), vec!["nn.example:9871"]);
        assert_eq!(endpoint_addresses("[::1]:8020", &[], false), vec!["[::1]:9870"]);
    }

    #[test]
    fn endpoint_prefers_configured_addresses_on_the_same_host() {
        let known = vec![
            "nn1.example:50070".to_string(),
            "http://nn2.example:50070".to_string(),
        ];
        assert_eq!(
            endpoint_addresses("NN2.example:8020", &known, false),
            vec!["http://nn2.example:50070"]
        );
        assert_eq!(
            endpoint_addresses("nn3.example:8020", &known, false),
            vec!["nn3.example:9870"]
        );
    }

    #[tokio::test]
    async fn loads_present_files_only() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("hdfs-site.xml"),
            property("dfs.namenode.http-address", "nn:9870"),
        )?;
        let config = ClusterConfig::load(dir.path()).await?;
        assert_eq!(config.webhdfs_addresses(), vec!["nn:9870"]);
        Ok(())
    }
}
