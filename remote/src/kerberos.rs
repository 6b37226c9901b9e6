//! Delegated identity: keytab and realm configuration loading, ticket acquisition
//!
//! The configuration directory holds `user.keytab` (MIT keytab, version 0x502) and `krb5.conf`.
//! Credentials are read on every login attempt and never written anywhere by rhdfs, the only
//! state produced is the private ticket cache `kinit` fills in.

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use bytes::Buf;
use tracing::instrument;

pub const KEYTAB_FILE: &str = "user.keytab";
pub const KRB5_CONF_FILE: &str = "krb5.conf";
pub const DEFAULT_REALM: &str = "HADOOP.COM";

const KEYTAB_VERSION: u16 = 0x502;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub components: Vec<String>,
    pub realm: String,
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}@{}", self.components.join("/"), self.realm)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeytabEntry {
    pub principal: Principal,
    pub kvno: u32,
    pub enctype: u16,
}

/// Principals and key versions found in a keytab, key material is not retained
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keytab {
    pub entries: Vec<KeytabEntry>,
}

fn need(buf: &[u8], len: usize, what: &str) -> anyhow::Result<()> {
    if buf.remaining() < len {
        bail!(
            "truncated keytab: {what} needs {len} bytes, {} left",
            buf.remaining()
        );
    }
    Ok(())
}

fn counted_bytes<'a>(buf: &mut &'a [u8], what: &str) -> anyhow::Result<&'a [u8]> {
    need(buf, 2, what)?;
    let len = buf.get_u16() as usize;
    need(buf, len, what)?;
    let current: &'a [u8] = *buf;
    let (data, rest) = current.split_at(len);
    *buf = rest;
    Ok(data)
}

fn counted_string(buf: &mut &[u8], what: &str) -> anyhow::Result<String> {
    let data = counted_bytes(buf, what)?;
    String::from_utf8(data.to_vec()).with_context(|| format!("{what} is not valid UTF-8"))
}

fn parse_entry(mut buf: &[u8]) -> anyhow::Result<KeytabEntry> {
    need(buf, 2, "component count")?;
    let count = buf.get_u16();
    let realm = counted_string(&mut buf, "realm")?;
    let components = (0..count)
        .map(|_| counted_string(&mut buf, "principal component"))
        .collect::<anyhow::Result<Vec<_>>>()?;
    // name type, timestamp, 8 bit key version
    need(buf, 9, "entry header")?;
    buf.advance(4);
    buf.advance(4);
    let kvno8 = buf.get_u8();
    need(buf, 2, "key type")?;
    let enctype = buf.get_u16();
    counted_bytes(&mut buf, "key")?;
    // the 32 bit key version supersedes the 8 bit one when present
    let kvno = if buf.remaining() >= 4 {
        buf.get_u32()
    } else {
        u32::from(kvno8)
    };
    Ok(KeytabEntry {
        principal: Principal { components, realm },
        kvno,
        enctype,
    })
}

impl Keytab {
    pub fn parse(data: &[u8]) -> anyhow::Result<Self> {
        let mut buf = data;
        need(buf, 2, "version")?;
        let version = buf.get_u16();
        if version != KEYTAB_VERSION {
            bail!("unsupported keytab version {version:#x}, expected {KEYTAB_VERSION:#x}");
        }
        let mut entries = Vec::new();
        while buf.has_remaining() {
            need(buf, 4, "entry size")?;
            let size = buf.get_i32();
            let len = size.unsigned_abs() as usize;
            need(buf, len, "entry")?;
            let (entry, rest) = buf.split_at(len);
            buf = rest;
            // negative sizes mark deleted entries
            if size > 0 {
                entries.push(parse_entry(entry)?);
            }
        }
        Ok(Self { entries })
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed reading keytab {path:?}"))?;
        Self::parse(&data).with_context(|| format!("failed parsing keytab {path:?}"))
    }

    #[must_use]
    pub fn has_principal(&self, principal: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.principal.to_string() == principal)
    }
}

/// The subset of `krb5.conf` rhdfs cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Krb5Config {
    pub default_realm: Option<String>,
}

impl Krb5Config {
    pub fn parse(text: &str) -> Self {
        let mut section = String::new();
        let mut default_realm = None;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_string();
                continue;
            }
            if section != "libdefaults" {
                continue;
            }
            if let Some((key, value)) = line.split_once('=')
                && key.trim() == "default_realm"
                && !value.trim().is_empty()
            {
                default_realm = Some(value.trim().to_string());
            }
        }
        Self { default_realm }
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed reading {path:?}"))?;
        Ok(Self::parse(&text))
    }

    #[must_use]
    pub fn realm(&self) -> &str {
        self.default_realm.as_deref().unwrap_or(DEFAULT_REALM)
    }
}

/// Everything needed to obtain a ticket for `principal`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KerberosCredential {
    pub principal: String,
    pub keytab_path: PathBuf,
    pub krb5_conf: PathBuf,
    pub ticket_cache: PathBuf,
}

impl KerberosCredential {
    /// Load the keytab and realm configuration from `conf_dir` and build the credential of `user`.
    ///
    /// Fails if the keytab has no entry for `<user>@<realm>`.
    #[instrument]
    pub async fn load(conf_dir: &Path, user: &str) -> anyhow::Result<Self> {
        let keytab_path = conf_dir.join(KEYTAB_FILE);
        let krb5_conf = conf_dir.join(KRB5_CONF_FILE);
        let keytab = Keytab::load(&keytab_path).await?;
        let config = Krb5Config::load(&krb5_conf).await?;
        let principal = format!("{user}@{}", config.realm());
        if !keytab.has_principal(&principal) {
            return Err(anyhow!(
                "keytab {keytab_path:?} has no entry for {principal}"
            ));
        }
        let uid = nix::unistd::Uid::current();
        Ok(Self {
            principal,
            keytab_path,
            krb5_conf,
            ticket_cache: std::env::temp_dir().join(format!("rhdfs_krb5cc_{uid}")),
        })
    }
}

#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    /// Obtain a ticket for `credential`, leaving it in the credential's ticket cache
    async fn login(&self, credential: &KerberosCredential) -> anyhow::Result<()>;
}

/// Logs in by running `kinit -k -t <keytab> <principal>`
#[derive(Debug, Clone)]
pub struct Kinit {
    program: PathBuf,
}

impl Default for Kinit {
    fn default() -> Self {
        Self {
            program: PathBuf::from("kinit"),
        }
    }
}

impl Kinit {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait::async_trait]
impl Authenticator for Kinit {
    #[instrument(skip(self))]
    async fn login(&self, credential: &KerberosCredential) -> anyhow::Result<()> {
        let output = tokio::process::Command::new(&self.program)
            .arg("-k")
            .arg("-t")
            .arg(&credential.keytab_path)
            .arg(&credential.principal)
            .env("KRB5_CONFIG", &credential.krb5_conf)
            .env(
                "KRB5CCNAME",
                format!("FILE:{}", credential.ticket_cache.display()),
            )
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to run {:?}", self.program))?;
        if !output.status.success() {
            bail!(
                "{:?} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        tracing::debug!("got a ticket for {}", credential.principal);
        Ok(())
    }
}
