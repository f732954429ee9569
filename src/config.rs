//! Connection options and the on-disk profile store.
//!
//! Profiles live in a single TOML file, one table per profile. The reserved
//! `_meta` table records which profile is current:
//!
//! ```toml
//! [prod]
//! host = "10.0.0.1"
//! port = 6379
//! db = 0
//!
//! [_meta]
//! current = "prod"
//! ```

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use crate::error::{ClientError, Result};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;

/// Overrides the directory holding `config.toml`.
pub const CONFIG_DIR_ENV: &str = "MZRDS_CONFIG_DIR";
pub const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "mzrds";

/// Section reserved for store metadata; never a profile.
pub const META_SECTION: &str = "_meta";
const META_CURRENT_KEY: &str = "current";

/// How to reach the store. When `uri` is set it takes precedence over
/// `host` and `port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub db: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub tls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cacert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub cluster: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            password: None,
            username: None,
            db: 0,
            uri: None,
            tls: false,
            cacert: None,
            cert: None,
            key: None,
            cluster: false,
        }
    }
}

/// Options given explicitly for one invocation. `None` means "keep the base value".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub username: Option<String>,
    pub db: Option<u32>,
    pub uri: Option<String>,
    pub tls: Option<bool>,
    pub cacert: Option<String>,
    pub cert: Option<String>,
    pub key: Option<String>,
    pub cluster: Option<bool>,
}

impl ConnectionOptions {
    /// Apply `overrides` on top of `base`, or on top of the defaults when
    /// there is no base profile.
    pub fn merge(base: Option<&ConnectionOptions>, overrides: &ConnectionOverrides) -> Self {
        let mut merged = base.cloned().unwrap_or_default();

        if let Some(host) = &overrides.host {
            merged.host = host.clone();
        }
        if let Some(port) = overrides.port {
            merged.port = port;
        }
        if let Some(db) = overrides.db {
            merged.db = db;
        }
        if let Some(tls) = overrides.tls {
            merged.tls = tls;
        }
        if let Some(cluster) = overrides.cluster {
            merged.cluster = cluster;
        }
        for (target, value) in [
            (&mut merged.password, &overrides.password),
            (&mut merged.username, &overrides.username),
            (&mut merged.uri, &overrides.uri),
            (&mut merged.cacert, &overrides.cacert),
            (&mut merged.cert, &overrides.cert),
            (&mut merged.key, &overrides.key),
        ] {
            if value.is_some() {
                target.clone_from(value);
            }
        }

        merged
    }

    /// TLS is implied by any certificate path, even without `tls = true`.
    pub fn wants_tls(&self) -> bool {
        self.tls || self.cacert.is_some() || self.cert.is_some() || self.key.is_some()
    }

    /// `uri` when set, `host:port` otherwise.
    pub fn endpoint(&self) -> String {
        match &self.uri {
            Some(uri) => uri.clone(),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    /// Set fields as `(name, value)` in file order, with the password masked.
    pub fn display_fields(&self) -> Result<Vec<(String, String)>> {
        let Value::Table(table) = Value::try_from(self)? else {
            return Err(ClientError::Config(
                "connection options did not serialize to a table".into(),
            ));
        };
        Ok(table
            .into_iter()
            .map(|(name, value)| {
                let shown = match (name.as_str(), value) {
                    ("password", _) => "******".to_string(),
                    (_, Value::String(s)) => s,
                    (_, other) => other.to_string(),
                };
                (name, shown)
            })
            .collect())
    }
}

/// Location of `config.toml`: `$MZRDS_CONFIG_DIR`, then `$XDG_CONFIG_HOME/mzrds`,
/// then `$HOME/.config/mzrds`.
pub fn default_config_path() -> Result<PathBuf> {
    config_path_from(
        env::var_os(CONFIG_DIR_ENV),
        env::var_os("XDG_CONFIG_HOME"),
        env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")),
    )
    .ok_or_else(|| ClientError::Config("could not determine home directory".into()))
}

fn config_path_from(
    override_dir: Option<OsString>,
    xdg_config_home: Option<OsString>,
    home: Option<OsString>,
) -> Option<PathBuf> {
    let non_empty = |v: Option<OsString>| v.filter(|s| !s.is_empty());

    if let Some(dir) = non_empty(override_dir) {
        return Some(PathBuf::from(dir).join(CONFIG_FILE_NAME));
    }
    if let Some(xdg) = non_empty(xdg_config_home) {
        let dir = PathBuf::from(xdg).join(APP_DIR_NAME);
        return Some(dir.join(CONFIG_FILE_NAME));
    }
    non_empty(home).map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    })
}

/// Named connection profiles persisted in one TOML file.
///
/// Every operation re-reads the file, so concurrent invocations see each
/// other's writes (last writer wins).
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn at_default_location() -> Result<Self> {
        Ok(Self::new(default_config_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All profiles in file order.
    pub fn list(&self) -> Result<Vec<(String, ConnectionOptions)>> {
        let table = self.load()?;
        Ok(table
            .into_iter()
            .filter(|(name, _)| name != META_SECTION)
            .filter_map(|(name, value)| parse_profile(&name, value).map(|opts| (name, opts)))
            .collect())
    }

    pub fn get(&self, name: &str) -> Result<Option<ConnectionOptions>> {
        if name == META_SECTION {
            return Ok(None);
        }
        let mut table = self.load()?;
        let value = table.remove(name);
        Ok(value.and_then(|value| parse_profile(name, value)))
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)?.is_some())
    }

    /// Create or overwrite a profile. The first profile saved becomes current.
    pub fn save(&self, name: &str, options: &ConnectionOptions) -> Result<()> {
        if name == META_SECTION {
            return Err(ClientError::ReservedProfileName(name.to_string()));
        }
        if name.trim().is_empty() {
            return Err(ClientError::usage("profile name must not be empty"));
        }

        let mut table = self.load()?;
        table.insert(name.to_string(), Value::try_from(options)?);
        let meta = meta_mut(&mut table);
        if !meta.contains_key(META_CURRENT_KEY) {
            let current = Value::String(name.to_string());
            meta.insert(META_CURRENT_KEY.to_string(), current);
        }
        self.dump(&table)?;

        tracing::info!(profile = name, path = %self.path.display(), "saved profile");
        Ok(())
    }

    /// Remove a profile. If it was current, the first remaining profile takes
    /// its place, or the pointer is cleared when none are left.
    pub fn delete(&self, name: &str) -> Result<()> {
        let table = self.load()?;
        if name == META_SECTION || !matches!(table.get(name), Some(Value::Table(_))) {
            return Err(ClientError::ProfileNotFound(name.to_string()));
        }

        let was_current = current_of(&table).as_deref() == Some(name);
        let mut table: Table = table.into_iter().filter(|(k, _)| k != name).collect();

        if was_current {
            let next = table
                .iter()
                .find(|(k, v)| k.as_str() != META_SECTION && v.is_table())
                .map(|(k, _)| k.clone());
            let meta = meta_mut(&mut table);
            match next {
                Some(next) => {
                    tracing::info!(profile = %next, "current profile moved");
                    meta.insert(META_CURRENT_KEY.to_string(), Value::String(next));
                }
                None => {
                    meta.remove(META_CURRENT_KEY);
                }
            }
        }
        self.dump(&table)?;

        tracing::info!(profile = name, "deleted profile");
        Ok(())
    }

    pub fn current(&self) -> Result<Option<String>> {
        Ok(current_of(&self.load()?))
    }

    pub fn set_current(&self, name: &str) -> Result<()> {
        let mut table = self.load()?;
        if name == META_SECTION || !matches!(table.get(name), Some(Value::Table(_))) {
            return Err(ClientError::ProfileNotFound(name.to_string()));
        }
        let current = Value::String(name.to_string());
        let meta = meta_mut(&mut table);
        meta.insert(META_CURRENT_KEY.to_string(), current);
        self.dump(&table)
    }

    fn load(&self) -> Result<Table> {
        if !self.path.exists() {
            return Ok(Table::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(content.parse::<Table>()?)
    }

    fn dump(&self, table: &Table) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(table)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

fn parse_profile(name: &str, value: Value) -> Option<ConnectionOptions> {
    if !value.is_table() {
        return None;
    }
    match value.try_into::<ConnectionOptions>() {
        Ok(options) => Some(options),
        Err(e) => {
            tracing::warn!(profile = name, error = %e, "skipping malformed profile");
            None
        }
    }
}

fn current_of(table: &Table) -> Option<String> {
    table
        .get(META_SECTION)?
        .as_table()?
        .get(META_CURRENT_KEY)?
        .as_str()
        .map(str::to_string)
}

fn meta_mut(table: &mut Table) -> &mut Table {
    if !matches!(table.get(META_SECTION), Some(Value::Table(_))) {
        table.insert(META_SECTION.to_string(), Value::Table(Table::new()));
    }
    match table.get_mut(META_SECTION) {
        Some(Value::Table(meta)) => meta,
        _ => unreachable!("meta section was just inserted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, ProfileStore) {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path().join("mzrds").join(CONFIG_FILE_NAME));
        (dir, store)
    }

    fn host(h: &str) -> ConnectionOptions {
        ConnectionOptions {
            host: h.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_connection_options_defaults() {
        let opts = ConnectionOptions::default();
        assert_eq!(opts.host, "127.0.0.1");
        assert_eq!(opts.port, 6379);
        assert_eq!(opts.db, 0);
        assert!(opts.password.is_none());
        assert!(!opts.tls);
        assert!(!opts.cluster);
    }

    #[test]
    fn test_serialization_skips_unset_fields() {
        let opts = ConnectionOptions {
            host: "test.com".into(),
            port: 6380,
            password: Some("secret".into()),
            ..Default::default()
        };
        let text = toml::to_string(&opts).unwrap();
        assert!(text.contains("host = \"test.com\""));
        assert!(text.contains("port = 6380"));
        assert!(text.contains("password = \"secret\""));
        assert!(!text.contains("username"));
        assert!(!text.contains("cacert"));
    }

    #[test]
    fn test_partial_profile_fills_defaults() {
        let opts: ConnectionOptions = toml::from_str("host = \"test.com\"\nport = 6380").unwrap();
        assert_eq!(opts.host, "test.com");
        assert_eq!(opts.port, 6380);
        assert_eq!(opts.db, 0);
        assert!(!opts.cluster);
    }

    #[test]
    fn test_merge_overrides_base() {
        let base = ConnectionOptions {
            host: "base.com".into(),
            port: 6379,
            password: Some("base-pass".into()),
            db: 0,
            ..Default::default()
        };
        let overrides = ConnectionOverrides {
            host: Some("override.com".into()),
            db: Some(1),
            tls: Some(true),
            ..Default::default()
        };

        let merged = ConnectionOptions::merge(Some(&base), &overrides);
        assert_eq!(merged.host, "override.com");
        assert_eq!(merged.db, 1);
        assert!(merged.tls);
        assert_eq!(merged.port, 6379);
        assert_eq!(merged.password.as_deref(), Some("base-pass"));
    }

    #[test]
    fn test_merge_without_base_uses_defaults() {
        let overrides = ConnectionOverrides {
            host: Some("new.com".into()),
            port: Some(6380),
            ..Default::default()
        };
        let merged = ConnectionOptions::merge(None, &overrides);
        assert_eq!(merged.host, "new.com");
        assert_eq!(merged.port, 6380);
        assert_eq!(merged.db, 0);
        assert!(!merged.tls);
        assert!(merged.uri.is_none());
    }

    #[test]
    fn test_merge_no_overrides_is_identity() {
        let base = host("keep.me");
        assert_eq!(
            ConnectionOptions::merge(Some(&base), &ConnectionOverrides::default()),
            base
        );
    }

    #[test]
    fn test_wants_tls_from_cert_paths() {
        assert!(!ConnectionOptions::default().wants_tls());
        let opts = ConnectionOptions {
            cacert: Some("/etc/ca.pem".into()),
            ..Default::default()
        };
        assert!(opts.wants_tls());
    }

    #[test]
    fn test_display_fields_masks_password() {
        let opts = ConnectionOptions {
            password: Some("hunter2".into()),
            ..Default::default()
        };
        let fields = opts.display_fields().unwrap();
        assert_eq!(fields[0], ("host".to_string(), "127.0.0.1".to_string()));
        assert_eq!(fields[1], ("port".to_string(), "6379".to_string()));
        let masked = ("password".to_string(), "******".to_string());
        assert!(fields.contains(&masked));
        assert!(!fields.iter().any(|(_, v)| v.contains("hunter2")));
    }

    #[test]
    fn test_config_path_precedence() {
        let p = config_path_from(
            Some("/override".into()),
            Some("/xdg".into()),
            Some("/home/u".into()),
        );
        assert_eq!(p, Some(PathBuf::from("/override/config.toml")));

        let p = config_path_from(None, Some("/xdg".into()), Some("/home/u".into()));
        assert_eq!(p, Some(PathBuf::from("/xdg/mzrds/config.toml")));

        let p = config_path_from(Some("".into()), None, Some("/home/u".into()));
        let home = PathBuf::from("/home/u/.config/mzrds/config.toml");
        assert_eq!(p, Some(home));

        assert_eq!(config_path_from(None, None, None), None);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (_dir, store) = temp_store();
        assert!(store.list().unwrap().is_empty());
        assert!(store.get("prod").unwrap().is_none());
        assert!(store.current().unwrap().is_none());
    }

    #[test]
    fn test_save_and_get_roundtrip() {
        let (_dir, store) = temp_store();
        let opts = ConnectionOptions {
            host: "prod.example.com".into(),
            port: 6380,
            password: Some("secret".into()),
            username: Some("app".into()),
            db: 3,
            uri: None,
            tls: true,
            cacert: Some("/etc/ca.pem".into()),
            cert: None,
            key: None,
            cluster: false,
        };
        store.save("prod", &opts).unwrap();
        assert_eq!(store.get("prod").unwrap(), Some(opts));
    }

    #[test]
    fn test_first_save_becomes_current() {
        let (_dir, store) = temp_store();
        store.save("prod", &host("prod.com")).unwrap();
        store.save("dev", &host("dev.com")).unwrap();
        assert_eq!(store.current().unwrap().as_deref(), Some("prod"));
    }

    #[test]
    fn test_save_overwrites_in_place() {
        let (_dir, store) = temp_store();
        store.save("prod", &host("old.com")).unwrap();
        store.save("dev", &host("dev.com")).unwrap();
        store.save("prod", &host("new.com")).unwrap();

        let profiles = store.list().unwrap();
        let names: Vec<_> = profiles.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["prod", "dev"]);
        assert_eq!(profiles[0].1.host, "new.com");
    }

    #[test]
    fn test_list_profiles() {
        let (_dir, store) = temp_store();
        store.save("prod", &host("prod.com")).unwrap();
        store.save("dev", &host("dev.com")).unwrap();

        let profiles = store.list().unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].0, "prod");
        assert_eq!(profiles[1].0, "dev");
    }

    #[test]
    fn test_reserved_name_rejected() {
        let (_dir, store) = temp_store();
        let err = store.save(META_SECTION, &host("x")).unwrap_err();
        assert!(matches!(err, ClientError::ReservedProfileName(_)));
        assert!(store.get(META_SECTION).unwrap().is_none());
    }

    #[test]
    fn test_set_current() {
        let (_dir, store) = temp_store();
        store.save("prod", &host("prod.com")).unwrap();
        store.save("dev", &host("dev.com")).unwrap();

        store.set_current("dev").unwrap();
        assert_eq!(store.current().unwrap().as_deref(), Some("dev"));
        store.set_current("prod").unwrap();
        assert_eq!(store.current().unwrap().as_deref(), Some("prod"));
    }

    #[test]
    fn test_set_current_unknown_profile() {
        let (_dir, store) = temp_store();
        store.save("prod", &host("prod.com")).unwrap();
        let err = store.set_current("missing").unwrap_err();
        let ClientError::ProfileNotFound(name) = &err else {
            panic!("unexpected error {:?}", err);
        };
        assert_eq!(name.as_str(), "missing");
        assert_eq!(store.current().unwrap().as_deref(), Some("prod"));
    }

    #[test]
    fn test_delete_profile() {
        let (_dir, store) = temp_store();
        store.save("test", &host("test.com")).unwrap();
        store.delete("test").unwrap();
        assert!(store.get("test").unwrap().is_none());
    }

    #[test]
    fn test_delete_missing_profile() {
        let (_dir, store) = temp_store();
        let err = store.delete("ghost").unwrap_err();
        assert!(matches!(err, ClientError::ProfileNotFound(_)));
    }

    #[test]
    fn test_delete_current_repoints_to_first_remaining() {
        let (_dir, store) = temp_store();
        store.save("a", &host("a")).unwrap();
        store.save("b", &host("b")).unwrap();
        store.save("c", &host("c")).unwrap();
        store.set_current("b").unwrap();

        store.delete("b").unwrap();
        assert_eq!(store.current().unwrap().as_deref(), Some("a"));

        store.delete("a").unwrap();
        assert_eq!(store.current().unwrap().as_deref(), Some("c"));
    }

    #[test]
    fn test_delete_last_clears_current() {
        let (_dir, store) = temp_store();
        store.save("only", &host("only")).unwrap();
        store.delete("only").unwrap();
        assert!(store.current().unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_delete_non_current_keeps_pointer() {
        let (_dir, store) = temp_store();
        store.save("a", &host("a")).unwrap();
        store.save("b", &host("b")).unwrap();
        store.delete("b").unwrap();
        assert_eq!(store.current().unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn test_non_table_sections_skipped() {
        let (_dir, store) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            "stray = 1\n\n[prod]\nhost = \"prod.com\"\n\n[_meta]\ncurrent = \"prod\"\n",
        )
        .unwrap();

        let profiles = store.list().unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].0, "prod");
        assert!(store.get("stray").unwrap().is_none());
    }
}
