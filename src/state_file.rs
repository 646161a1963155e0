//! Local JSON files used by the CLI host: the state file recording every
//! managed instance and the configuration document describing the desired
//! resources.

use std::collections::BTreeMap;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::AttributeMap;
use crate::state::ResourceState;

/// State file used when none is given on the command line.
pub const DEFAULT_STATE_PATH: &str = "stratus.state.json";

const STATE_VERSION: u32 = 1;

/// Errors raised while reading or writing local files.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum StateFileError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a file does not hold the expected JSON document.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a path does not end in a file name.
    #[error("{path} does not name a file")]
    MissingFileName {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Raised when a resource address is not of the form `type.name`.
    #[error("invalid resource address '{0}': expected <type>.<name>")]
    InvalidAddress(String),
    /// Raised when a state file was written by a newer release.
    #[error("{path} uses state version {found}, newest supported is {STATE_VERSION}")]
    UnsupportedVersion {
        /// Path of the state file.
        path: Utf8PathBuf,
        /// Version recorded in the file.
        found: u32,
    },
}

/// Resource address of the form `<type>.<name>`.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Address {
    /// Registered type name.
    pub type_name: String,
    /// Operator-chosen instance name.
    pub name: String,
}

impl Address {
    /// Parses `<type>.<name>`.
    ///
    /// # Errors
    ///
    /// Returns [`StateFileError::InvalidAddress`] when either part is missing.
    pub fn parse(raw: &str) -> Result<Self, StateFileError> {
        match raw.split_once('.') {
            Some((type_name, name)) if !type_name.is_empty() && !name.is_empty() => Ok(Self {
                type_name: type_name.to_owned(),
                name: name.to_owned(),
            }),
            _ => Err(StateFileError::InvalidAddress(raw.to_owned())),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.type_name, self.name)
    }
}

/// Desired resources and data sources keyed by address.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ConfigDocument {
    /// Managed resources.
    #[serde(default)]
    pub resources: BTreeMap<String, AttributeMap>,
    /// Data sources read on every apply.
    #[serde(default)]
    pub data: BTreeMap<String, AttributeMap>,
}

impl ConfigDocument {
    /// Reads a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`StateFileError`] when the file cannot be read or parsed.
    pub fn load(path: &Utf8Path) -> Result<Self, StateFileError> {
        let contents = read_file(path)?;
        parse_json(path, &contents)
    }
}

/// Managed instances keyed by address.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StateFile {
    /// Format version.
    pub version: u32,
    /// Instance state keyed by `<type>.<name>`.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            resources: BTreeMap::new(),
        }
    }
}

impl StateFile {
    /// Reads the state file, treating a missing file as empty state.
    ///
    /// # Errors
    ///
    /// Returns [`StateFileError`] when the file exists but cannot be read,
    /// parsed, or was written by a newer release.
    pub fn load(path: &Utf8Path) -> Result<Self, StateFileError> {
        if !path_exists(path)? {
            return Ok(Self::default());
        }
        let contents = read_file(path)?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let state: Self = parse_json(path, &contents)?;
        if state.version > STATE_VERSION {
            return Err(StateFileError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: state.version,
            });
        }
        Ok(state)
    }

    /// Writes the state file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StateFileError`] when the file cannot be written.
    pub fn save(&self, path: &Utf8Path) -> Result<(), StateFileError> {
        let rendered =
            serde_json::to_string_pretty(self).map_err(|err| StateFileError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        write_file(path, &rendered)
    }

    /// Looks up an instance.
    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&ResourceState> {
        self.resources.get(&address.to_string())
    }

    /// Records or replaces an instance.
    pub fn insert(&mut self, address: &Address, state: ResourceState) {
        self.resources.insert(address.to_string(), state);
    }

    /// Forgets an instance.
    pub fn remove(&mut self, address: &Address) -> Option<ResourceState> {
        self.resources.remove(&address.to_string())
    }
}

fn split(path: &Utf8Path) -> Result<(&Utf8Path, &str), StateFileError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| StateFileError::MissingFileName {
            path: path.to_path_buf(),
        })?;
    Ok((parent, file_name))
}

fn path_exists(path: &Utf8Path) -> Result<bool, StateFileError> {
    let (parent, file_name) = split(path)?;
    match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir.try_exists(file_name).map_err(|err| StateFileError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(StateFileError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

fn read_file(path: &Utf8Path) -> Result<String, StateFileError> {
    let (parent, file_name) = split(path)?;
    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| StateFileError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        })?;
    dir.read_to_string(file_name)
        .map_err(|err| StateFileError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

fn parse_json<T: DeserializeOwned>(path: &Utf8Path, contents: &str) -> Result<T, StateFileError> {
    serde_json::from_str(contents).map_err(|err| StateFileError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn write_file(path: &Utf8Path, contents: &str) -> Result<(), StateFileError> {
    let (parent, file_name) = split(path)?;
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| {
        StateFileError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }
    })?;
    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| StateFileError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        })?;

    // Written beside the target, then renamed over it.
    let staging = format!(".{file_name}.tmp");
    dir.write(&staging, contents)
        .map_err(|err| StateFileError::Io {
            path: parent.join(&staging),
            message: err.to_string(),
        })?;
    dir.rename(&staging, &dir, file_name)
        .map_err(|err| StateFileError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
        (tmp, root)
    }

    #[test]
    fn missing_state_file_is_empty_state() {
        let (_tmp, root) = temp_root();
        let state = StateFile::load(&root.join("absent/state.json"))
            .unwrap_or_else(|err| panic!("load: {err}"));
        assert_eq!(state, StateFile::default());
    }

    #[test]
    fn saved_state_is_read_back() {
        let (_tmp, root) = temp_root();
        let path = root.join("nested/stratus.state.json");
        let address = Address::parse("workflow_domain.orders")
            .unwrap_or_else(|err| panic!("address: {err}"));
        let mut state = StateFile::default();
        state.insert(
            &address,
            ResourceState {
                type_name: String::from("workflow_domain"),
                id: String::from("orders"),
                attributes: json!({ "name": "orders" })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
                tainted: false,
            },
        );

        state.save(&path).unwrap_or_else(|err| panic!("save: {err}"));
        let loaded = StateFile::load(&path).unwrap_or_else(|err| panic!("load: {err}"));

        assert_eq!(loaded, state);
        assert_eq!(loaded.get(&address).map(|entry| entry.id.as_str()), Some("orders"));
    }

    #[test]
    fn corrupt_state_is_a_parse_error() {
        let (_tmp, root) = temp_root();
        let path = root.join("state.json");
        write_file(&path, "{ not json").unwrap_or_else(|err| panic!("write: {err}"));

        let err = StateFile::load(&path).expect_err("corrupt file");
        assert!(matches!(err, StateFileError::Parse { .. }), "{err:?}");
    }

    #[test]
    fn newer_state_versions_are_refused() {
        let (_tmp, root) = temp_root();
        let path = root.join("state.json");
        write_file(&path, r#"{ "version": 9, "resources": {} }"#)
            .unwrap_or_else(|err| panic!("write: {err}"));

        let err = StateFile::load(&path).expect_err("future version");
        assert!(
            matches!(err, StateFileError::UnsupportedVersion { found: 9, .. }),
            "{err:?}"
        );
    }

    #[test]
    fn config_document_sections_default_to_empty() {
        let (_tmp, root) = temp_root();
        let path = root.join("main.json");
        write_file(&path, r#"{ "resources": { "workflow_domain.orders": { "name": "orders" } } }"#)
            .unwrap_or_else(|err| panic!("write: {err}"));

        let document = ConfigDocument::load(&path).unwrap_or_else(|err| panic!("load: {err}"));
        assert_eq!(document.resources.len(), 1);
        assert!(document.data.is_empty());
    }

    #[rstest]
    #[case("lattice_target_group.web", Some(("lattice_target_group", "web")))]
    #[case("workflow_domain.orders.v2", Some(("workflow_domain", "orders.v2")))]
    #[case("lattice_target_group", None)]
    #[case(".web", None)]
    #[case("lattice_target_group.", None)]
    fn address_parsing(#[case] raw: &str, #[case] expected: Option<(&str, &str)>) {
        let parsed = Address::parse(raw).ok();
        assert_eq!(
            parsed
                .as_ref()
                .map(|address| (address.type_name.as_str(), address.name.as_str())),
            expected
        );
    }
}
