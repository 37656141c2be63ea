// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::SessionConfigError;
use camino::Utf8Path;
use serde::Deserialize;
use std::{collections::BTreeSet, io};
use tracing::{debug, warn};

/// Resolved session settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionConfig {
    /// Name of the suite that collects tests reported without a prior tree
    /// entry.
    pub unrooted_suite_name: String,

    /// Test-ended names starting with this prefix mark the test as ignored.
    pub ignored_prefix: String,

    /// Failure names starting with this prefix mark an assumption failure.
    pub assumption_failure_prefix: String,
}

impl SessionConfig {
    /// Loads config from `path`, layered on top of the defaults.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub fn from_path(path: &Utf8Path) -> Result<Option<Self>, SessionConfigError> {
        Self::from_path_with_warnings(path, &mut DefaultConfigWarnings)
    }

    /// Parses config from a TOML string, layered on top of the defaults.
    ///
    /// `path` is only used for error messages and warnings.
    pub fn from_toml_str(contents: &str, path: &Utf8Path) -> Result<Self, SessionConfigError> {
        Self::from_str_with_warnings(contents, path, &mut DefaultConfigWarnings)
    }

    fn from_path_with_warnings(
        path: &Utf8Path,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Option<Self>, SessionConfigError> {
        debug!("session config: attempting to load from {path}");
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("session config: file does not exist at {path}");
                return Ok(None);
            }
            Err(error) => {
                return Err(SessionConfigError::Read {
                    path: path.to_owned(),
                    error,
                });
            }
        };
        Self::from_str_with_warnings(&contents, path, warnings).map(Some)
    }

    fn from_str_with_warnings(
        contents: &str,
        path: &Utf8Path,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, SessionConfigError> {
        let (config, unknown) = deserialize_toml::<DeserializedConfig>(contents).map_err(
            |error| SessionConfigError::Parse {
                path: path.to_owned(),
                error,
            },
        )?;
        if !unknown.is_empty() {
            warnings.unknown_config_keys(path, &unknown);
        }

        let mut resolved = Self::default();
        let DeserializedSessionConfig {
            unrooted_suite_name,
            ignored_prefix,
            assumption_failure_prefix,
        } = config.session;
        if let Some(name) = unrooted_suite_name {
            resolved.unrooted_suite_name = name;
        }
        if let Some(prefix) = ignored_prefix {
            resolved.ignored_prefix = prefix;
        }
        if let Some(prefix) = assumption_failure_prefix {
            resolved.assumption_failure_prefix = prefix;
        }
        debug!("session config: loaded from {path}");
        Ok(resolved)
    }

    /// The embedded default config TOML.
    const DEFAULT_CONFIG: &'static str = include_str!("../../default-session-config.toml");

    /// Parses the embedded defaults.
    ///
    /// Panics if the embedded TOML is invalid or contains unknown keys.
    fn from_embedded() -> Self {
        let (config, unknown) = deserialize_toml::<DefaultConfig>(Self::DEFAULT_CONFIG)
            .expect("embedded default session config should be valid");

        // The default config ships with the library, so unknown keys in it are
        // a bug.
        if !unknown.is_empty() {
            panic!(
                "found unknown keys in default session config: {}",
                unknown.into_iter().collect::<Vec<_>>().join(", ")
            );
        }

        let DefaultSessionConfig {
            unrooted_suite_name,
            ignored_prefix,
            assumption_failure_prefix,
        } = config.session;
        Self {
            unrooted_suite_name,
            ignored_prefix,
            assumption_failure_prefix,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_embedded()
    }
}

/// Handles warnings raised while loading config.
trait ConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let keys = unknown.iter().map(String::as_str).collect::<Vec<_>>();
        warn!(
            "in session config file {config_file}, ignoring unknown configuration keys: {}",
            keys.join(", "),
        );
    }
}

fn deserialize_toml<T>(contents: &str) -> Result<(T, BTreeSet<String>), toml::de::Error>
where
    T: for<'de> Deserialize<'de>,
{
    let deserializer = toml::Deserializer::parse(contents)?;
    let mut unknown = BTreeSet::new();
    let config: T = serde_ignored::deserialize(deserializer, |path| {
        unknown.insert(path.to_string());
    })?;
    Ok((config, unknown))
}

/// A user config file. Every key is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedConfig {
    #[serde(default)]
    session: DeserializedSessionConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedSessionConfig {
    #[serde(default)]
    unrooted_suite_name: Option<String>,
    #[serde(default)]
    ignored_prefix: Option<String>,
    #[serde(default)]
    assumption_failure_prefix: Option<String>,
}

/// The embedded defaults. Every key is required.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultConfig {
    session: DefaultSessionConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultSessionConfig {
    unrooted_suite_name: String,
    ignored_prefix: String,
    assumption_failure_prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use camino_tempfile::tempdir;
    use indoc::indoc;

    #[derive(Default)]
    struct TestConfigWarnings {
        unknown_keys: Option<(Utf8PathBuf, BTreeSet<String>)>,
    }

    impl ConfigWarnings for TestConfigWarnings {
        fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
            self.unknown_keys = Some((config_file.to_owned(), unknown.clone()));
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = SessionConfig::default();
        assert_eq!(config.unrooted_suite_name, "Unrooted Tests");
        assert_eq!(config.ignored_prefix, "@Ignore: ");
        assert_eq!(config.assumption_failure_prefix, "@AssumptionFailure: ");
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("session.toml");
        std::fs::write(
            &config_path,
            indoc! {r#"
                [session]
                unrooted-suite-name = "Orphans"
            "#},
        )
        .unwrap();

        let mut warnings = TestConfigWarnings::default();
        let config = SessionConfig::from_path_with_warnings(&config_path, &mut warnings)
            .expect("config is valid")
            .expect("config file exists");

        assert_eq!(
            config,
            SessionConfig {
                unrooted_suite_name: "Orphans".to_owned(),
                ..SessionConfig::default()
            }
        );
        assert!(warnings.unknown_keys.is_none());
    }

    #[test]
    fn ignored_keys() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("session.toml");
        std::fs::write(
            &config_path,
            indoc! {r#"
                stray = 1

                [session]
                ignored-prefix = "SKIPPED "
                colour = "blue"
            "#},
        )
        .unwrap();

        let mut warnings = TestConfigWarnings::default();
        let config = SessionConfig::from_path_with_warnings(&config_path, &mut warnings)
            .expect("config is valid")
            .expect("config file exists");
        assert_eq!(config.ignored_prefix, "SKIPPED ");

        let (path, unknown) = warnings.unknown_keys.expect("unknown keys are reported");
        assert_eq!(path, config_path);
        assert_eq!(
            unknown,
            BTreeSet::from(["session.colour".to_owned(), "stray".to_owned()])
        );
    }

    #[test]
    fn missing_file_is_none() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("does-not-exist.toml");
        let config = SessionConfig::from_path(&config_path).expect("missing file is not an error");
        assert_eq!(config, None);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let error = SessionConfig::from_toml_str(
            "[session]\nignored-prefix = 5\n",
            Utf8Path::new("session.toml"),
        )
        .expect_err("integer is not a string");
        assert!(
            matches!(&error, SessionConfigError::Parse { path, .. } if path == "session.toml"),
            "unexpected error: {error:?}"
        );
    }
}
