//! Save profiles for the second player. The core only reads the name and
//! world position; everything else rides along untouched in `payload`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::atomic_io::write_text_atomic;
use crate::json::parse_with_path;
use crate::math::Vec3;

pub const PROFILE_FORMAT_VERSION: u16 = 1;
const PROFILE_FILE_SUFFIX: &str = ".profile.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub world_position: Option<Vec3>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            world_position: None,
            payload: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("invalid profile name '{0}': use letters, digits, '-' or '_'")]
    InvalidName(String),
    #[error("profile '{0}' does not exist")]
    NotFound(String),
    #[error("profile i/o failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse profile '{path}'{location}: {source}")]
    Parse {
        path: PathBuf,
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode profile '{name}': {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("profile '{path}' has format version {found}, expected {expected}")]
    UnsupportedVersion {
        path: PathBuf,
        found: u16,
        expected: u16,
    },
    #[error("profile '{path}' failed its checksum (expected {expected}, computed {actual})")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

pub trait ProfileStore {
    fn load(&self, name: &str) -> Result<Profile, ProfileError>;
    fn save(&mut self, profile: &Profile) -> Result<(), ProfileError>;
    fn list(&self) -> Result<Vec<String>, ProfileError>;
}

pub fn validate_profile_name(name: &str) -> Result<(), ProfileError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ProfileError::InvalidName(name.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileEnvelope {
    format_version: u16,
    checksum_sha256_hex: String,
    profile: serde_json::Value,
}

/// One `<name>.profile.json` per profile under a directory.
#[derive(Debug, Clone)]
pub struct JsonProfileStore {
    dir: PathBuf,
}

impl JsonProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}{PROFILE_FILE_SUFFIX}"))
    }
}

impl ProfileStore for JsonProfileStore {
    fn load(&self, name: &str) -> Result<Profile, ProfileError> {
        validate_profile_name(name)?;
        let path = self.path_for(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(ProfileError::NotFound(name.to_string()));
            }
            Err(source) => return Err(ProfileError::Io { path, source }),
        };

        let envelope: ProfileEnvelope = parse_with_path(&raw).map_err(|error| ProfileError::Parse {
            path: path.clone(),
            location: error.location(),
            source: error.source,
        })?;
        if envelope.format_version != PROFILE_FORMAT_VERSION {
            return Err(ProfileError::UnsupportedVersion {
                path,
                found: envelope.format_version,
                expected: PROFILE_FORMAT_VERSION,
            });
        }
        let actual = checksum_hex(&envelope.profile);
        if actual != envelope.checksum_sha256_hex {
            return Err(ProfileError::ChecksumMismatch {
                path,
                expected: envelope.checksum_sha256_hex,
                actual,
            });
        }
        let profile: Profile =
            serde_json::from_value(envelope.profile).map_err(|source| ProfileError::Parse {
                path: path.clone(),
                location: " at profile".to_string(),
                source,
            })?;
        debug!(profile = %profile.name, path = %path.display(), "profile_loaded");
        Ok(profile)
    }

    fn save(&mut self, profile: &Profile) -> Result<(), ProfileError> {
        validate_profile_name(&profile.name)?;
        let encode = |source| ProfileError::Encode {
            name: profile.name.clone(),
            source,
        };
        let value = serde_json::to_value(profile).map_err(encode)?;
        let envelope = ProfileEnvelope {
            format_version: PROFILE_FORMAT_VERSION,
            checksum_sha256_hex: checksum_hex(&value),
            profile: value,
        };
        let text = serde_json::to_string_pretty(&envelope).map_err(encode)?;
        let path = self.path_for(&profile.name);
        write_text_atomic(&path, &text).map_err(|source| ProfileError::Io {
            path: path.clone(),
            source,
        })?;
        info!(profile = %profile.name, path = %path.display(), "profile_saved");
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, ProfileError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ProfileError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ProfileError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let file_name = entry.file_name();
            let Some(name) = file_name
                .to_str()
                .and_then(|file_name| file_name.strip_suffix(PROFILE_FILE_SUFFIX))
            else {
                continue;
            };
            if validate_profile_name(name).is_ok() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// In-memory store for tests and for running without a profile directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryProfileStore {
    profiles: BTreeMap<String, Profile>,
    saves: usize,
}

impl MemoryProfileStore {
    pub fn with_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|profile| (profile.name.clone(), profile))
                .collect(),
            saves: 0,
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load(&self, name: &str) -> Result<Profile, ProfileError> {
        validate_profile_name(name)?;
        self.profiles
            .get(name)
            .cloned()
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))
    }

    fn save(&mut self, profile: &Profile) -> Result<(), ProfileError> {
        validate_profile_name(&profile.name)?;
        self.profiles.insert(profile.name.clone(), profile.clone());
        self.saves += 1;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, ProfileError> {
        Ok(self.profiles.keys().cloned().collect())
    }
}

fn checksum_hex(value: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    to_hex_lower(&hasher.finalize())
}

fn to_hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Profile {
        Profile {
            name: "bram".to_string(),
            world_position: Some(Vec3::new(1.5, 0.0, -3.25)),
            payload: json!({ "inventory": ["rope", "lantern"], "health": 87 }),
        }
    }

    #[test]
    fn saved_profile_loads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = JsonProfileStore::new(dir.path());
        store.save(&sample()).expect("save");
        assert_eq!(store.load("bram").expect("load"), sample());
    }

    #[test]
    fn tampered_profile_fails_checksum() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = JsonProfileStore::new(dir.path());
        store.save(&sample()).expect("save");
        let path = store.path_for("bram");
        let raw = fs::read_to_string(&path).expect("read");
        fs::write(&path, raw.replace("87", "99")).expect("tamper");
        assert!(matches!(
            store.load("bram"),
            Err(ProfileError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn newer_format_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonProfileStore::new(dir.path());
        let value = json!({ "name": "cleo" });
        let envelope = json!({
            "format_version": PROFILE_FORMAT_VERSION + 1,
            "checksum_sha256_hex": checksum_hex(&value),
            "profile": value,
        });
        fs::write(store.path_for("cleo"), envelope.to_string()).expect("write");
        assert!(matches!(
            store.load("cleo"),
            Err(ProfileError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn malformed_envelope_reports_field_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonProfileStore::new(dir.path());
        fs::write(
            store.path_for("ada"),
            r#"{ "format_version": "one", "checksum_sha256_hex": "", "profile": {} }"#,
        )
        .expect("write");
        let error = store.load("ada").expect_err("bad version type");
        assert!(error.to_string().contains("format_version"), "{error}");
    }

    #[test]
    fn missing_profile_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonProfileStore::new(dir.path());
        assert!(matches!(store.load("nobody"), Err(ProfileError::NotFound(_))));
    }

    #[test]
    fn names_that_could_escape_the_directory_are_rejected() {
        for name in ["", "../etc", "a b", "x/y"] {
            assert!(matches!(
                validate_profile_name(name),
                Err(ProfileError::InvalidName(_))
            ));
        }
        assert!(validate_profile_name("player_2-alt").is_ok());
    }

    #[test]
    fn list_returns_sorted_profile_names_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = JsonProfileStore::new(dir.path());
        store.save(&Profile::new("cleo")).expect("save");
        store.save(&Profile::new("ada")).expect("save");
        fs::write(dir.path().join("notes.txt"), "ignore me").expect("write");
        assert_eq!(store.list().expect("list"), vec!["ada", "cleo"]);
    }

    #[test]
    fn list_of_missing_directory_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonProfileStore::new(dir.path().join("absent"));
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn memory_store_counts_saves() {
        let mut store = MemoryProfileStore::with_profiles([Profile::new("ada")]);
        store.save(&sample()).expect("save");
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.list().expect("list"), vec!["ada", "bram"]);
        assert_eq!(store.get("bram"), Some(&sample()));
    }

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(to_hex_lower(&[0x00, 0x0f, 0xab]), "000fab");
    }
}
