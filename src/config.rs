//! Parsing of the `[tool.whey-conda]` and `[tool.mkrecipe]` tables.
//!
//! Both tables are parsed into a partial [`CondaTable`]. The tables are then
//! layered (`[tool.whey-conda]` over `[tool.mkrecipe]` over the defaults) and
//! frozen into a [`CondaConfig`] that the rest of the build consumes.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use miette::Diagnostic;
use pep440_rs::Version;
use thiserror::Error;
use toml::{Table, Value};

/// The dotted path of the whey-conda configuration table.
pub const WHEY_CONDA_TABLE: &str = "tool.whey-conda";

/// The dotted path of the mkrecipe configuration table.
pub const MKRECIPE_TABLE: &str = "tool.mkrecipe";

/// The channel used when neither table names any.
pub const DEFAULT_CHANNEL: &str = "conda-forge";

/// The description template used when none is configured.
pub const DEFAULT_DESCRIPTION: &str = "%s";

const WHEY_CONDA_KEYS: &[&str] = &[
    "conda-description",
    "conda-channels",
    "conda-extras",
    "min-python-version",
    "max-python-version",
];

/// Errors raised while reading the project configuration.
#[allow(missing_docs)]
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("Could not read {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Could not parse {0}: {1}")]
    TomlParse(PathBuf, toml::de::Error),

    #[error("Invalid type for '{path}': expected {expected}, got {found}")]
    InvalidType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid value for [{path}]: Expected 'all', 'none' or a list of strings.")]
    #[diagnostic(help("use `conda-extras = \"all\"`, `\"none\"` or a list such as `[\"cli\"]`"))]
    InvalidExtras { path: String },

    #[error("Invalid Python version '{version}' for '{path}': {message}")]
    InvalidPythonVersion {
        path: String,
        version: String,
        message: String,
    },

    #[error("'{path}' must be a Python 3 version, got '{version}'")]
    UnsupportedPythonVersion { path: String, version: String },

    #[error(
        "min-python-version (3.{min}) must not be greater than max-python-version (3.{max})"
    )]
    PythonVersionRange { min: u64, max: u64 },

    #[error("Missing required field '{0}'")]
    #[diagnostic(help("whey-conda needs the project name and version to be set statically"))]
    MissingField(String),

    #[error("Invalid value for '{path}': {message}")]
    InvalidValue { path: String, message: String },
}

/// Which optional-dependency groups become runtime requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CondaExtras {
    /// Every optional-dependency group
    All,
    /// No optional-dependency group
    #[default]
    None,
    /// Only the named groups
    Named(Vec<String>),
}

impl fmt::Display for CondaExtras {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CondaExtras::All => write!(f, "all"),
            CondaExtras::None => write!(f, "none"),
            CondaExtras::Named(names) => write!(f, "[{}]", names.join(", ")),
        }
    }
}

/// The keys set in one configuration table. Unset keys are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CondaTable {
    /// `conda-description`
    pub conda_description: Option<String>,
    /// `conda-channels`
    pub conda_channels: Option<Vec<String>>,
    /// `conda-extras` (`extras` in `[tool.mkrecipe]`)
    pub conda_extras: Option<CondaExtras>,
    /// `min-python-version`, as the minor version of Python 3
    pub min_python_version: Option<u64>,
    /// `max-python-version`, as the minor version of Python 3
    pub max_python_version: Option<u64>,
}

impl CondaTable {
    /// The static defaults for every key.
    pub fn defaults() -> Self {
        Self {
            conda_description: Some(DEFAULT_DESCRIPTION.to_string()),
            conda_channels: Some(vec![DEFAULT_CHANNEL.to_string()]),
            conda_extras: Some(CondaExtras::None),
            min_python_version: None,
            max_python_version: None,
        }
    }

    /// Parse the `[tool.whey-conda]` table.
    ///
    /// With `set_defaults`, keys missing from the table are backfilled from
    /// [`CondaTable::defaults`].
    pub fn parse(table: &Table, set_defaults: bool) -> Result<Self, ConfigError> {
        for key in table.keys() {
            if !WHEY_CONDA_KEYS.contains(&key.as_str()) {
                tracing::warn!("Ignoring unknown key '{WHEY_CONDA_TABLE}.{key}'");
            }
        }

        let parsed = Self {
            conda_description: table
                .get("conda-description")
                .map(|value| parse_string(value, &key_path(WHEY_CONDA_TABLE, "conda-description")))
                .transpose()?,
            conda_channels: table
                .get("conda-channels")
                .map(|value| parse_string_list(value, &key_path(WHEY_CONDA_TABLE, "conda-channels")))
                .transpose()?,
            conda_extras: table
                .get("conda-extras")
                .map(|value| parse_extras(value, &key_path(WHEY_CONDA_TABLE, "conda-extras")))
                .transpose()?,
            min_python_version: table
                .get("min-python-version")
                .map(|value| {
                    parse_python_minor(value, &key_path(WHEY_CONDA_TABLE, "min-python-version"))
                })
                .transpose()?,
            max_python_version: table
                .get("max-python-version")
                .map(|value| {
                    parse_python_minor(value, &key_path(WHEY_CONDA_TABLE, "max-python-version"))
                })
                .transpose()?,
        };

        Ok(if set_defaults {
            parsed.or(Self::defaults())
        } else {
            parsed
        })
    }

    /// Parse the keys whey-conda shares with the `[tool.mkrecipe]` table.
    ///
    /// mkrecipe calls the extras key `extras`. Keys that only mkrecipe
    /// understands are ignored.
    pub fn parse_mkrecipe(table: &Table) -> Result<Self, ConfigError> {
        Ok(Self {
            conda_description: None,
            conda_channels: table
                .get("conda-channels")
                .map(|value| parse_string_list(value, &key_path(MKRECIPE_TABLE, "conda-channels")))
                .transpose()?,
            conda_extras: table
                .get("extras")
                .map(|value| parse_extras(value, &key_path(MKRECIPE_TABLE, "extras")))
                .transpose()?,
            min_python_version: table
                .get("min-python-version")
                .map(|value| {
                    parse_python_minor(value, &key_path(MKRECIPE_TABLE, "min-python-version"))
                })
                .transpose()?,
            max_python_version: table
                .get("max-python-version")
                .map(|value| {
                    parse_python_minor(value, &key_path(MKRECIPE_TABLE, "max-python-version"))
                })
                .transpose()?,
        })
    }

    /// Fill every key unset in `self` from `fallback`.
    pub fn or(self, fallback: CondaTable) -> Self {
        Self {
            conda_description: self.conda_description.or(fallback.conda_description),
            conda_channels: self.conda_channels.or(fallback.conda_channels),
            conda_extras: self.conda_extras.or(fallback.conda_extras),
            min_python_version: self.min_python_version.or(fallback.min_python_version),
            max_python_version: self.max_python_version.or(fallback.max_python_version),
        }
    }
}

/// The resolved conda configuration of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondaConfig {
    /// The conda description with the project description substituted in
    pub description: String,
    /// Channels the requirements must be available from, in order
    pub channels: Vec<String>,
    /// Which extras to include as requirements
    pub extras: CondaExtras,
    /// Lowest Python 3 minor version to consider requirements for
    pub min_python_version: Option<u64>,
    /// Highest Python 3 minor version to consider requirements for
    pub max_python_version: Option<u64>,
}

impl Default for CondaConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            channels: vec![DEFAULT_CHANNEL.to_string()],
            extras: CondaExtras::None,
            min_python_version: None,
            max_python_version: None,
        }
    }
}

impl CondaConfig {
    /// Resolve the configuration from the `[tool]` table of `pyproject.toml`.
    ///
    /// `project_description` replaces the `%s` placeholder of the conda
    /// description; a missing description substitutes an empty string.
    pub fn from_tool_table(
        tool: Option<&Table>,
        project_description: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let subtable = |name: &str| -> Result<Option<&Table>, ConfigError> {
            match tool.and_then(|tool| tool.get(name)) {
                None => Ok(None),
                Some(Value::Table(table)) => Ok(Some(table)),
                Some(other) => Err(ConfigError::InvalidType {
                    path: format!("tool.{name}"),
                    expected: "table",
                    found: other.type_str(),
                }),
            }
        };

        let mkrecipe = match subtable("mkrecipe")? {
            Some(table) => CondaTable::parse_mkrecipe(table)?,
            None => CondaTable::default(),
        };
        let whey_conda = match subtable("whey-conda")? {
            Some(table) => CondaTable::parse(table, false)?,
            None => CondaTable::default(),
        };

        Self::from_tables(whey_conda.or(mkrecipe), project_description)
    }

    /// Freeze a parsed table, backfilling defaults for unset keys.
    pub fn from_tables(
        table: CondaTable,
        project_description: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let table = table.or(CondaTable::defaults());

        if let (Some(min), Some(max)) = (table.min_python_version, table.max_python_version)
            && min > max
        {
            return Err(ConfigError::PythonVersionRange { min, max });
        }

        let template = table
            .conda_description
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

        Ok(Self {
            description: template.replacen("%s", project_description.unwrap_or_default(), 1),
            channels: table.conda_channels.unwrap_or_default(),
            extras: table.conda_extras.unwrap_or_default(),
            min_python_version: table.min_python_version,
            max_python_version: table.max_python_version,
        })
    }
}

pub(crate) fn key_path(table: &str, key: &str) -> String {
    format!("{table}.{key}")
}

pub(crate) fn parse_string(value: &Value, path: &str) -> Result<String, ConfigError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidType {
            path: path.to_string(),
            expected: "string",
            found: value.type_str(),
        })
}

pub(crate) fn parse_string_list(value: &Value, path: &str) -> Result<Vec<String>, ConfigError> {
    let Value::Array(items) = value else {
        return Err(ConfigError::InvalidType {
            path: path.to_string(),
            expected: "array",
            found: value.type_str(),
        });
    };

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| parse_string(item, &format!("{path}[{idx}]")))
        .collect()
}

fn parse_extras(value: &Value, path: &str) -> Result<CondaExtras, ConfigError> {
    match value {
        Value::String(keyword) => match keyword.to_lowercase().as_str() {
            "all" => Ok(CondaExtras::All),
            "none" => Ok(CondaExtras::None),
            _ => Err(ConfigError::InvalidExtras {
                path: path.to_string(),
            }),
        },
        Value::Array(_) => parse_string_list(value, path).map(CondaExtras::Named),
        _ => Err(ConfigError::InvalidExtras {
            path: path.to_string(),
        }),
    }
}

/// Parse a Python version given as a string, float or integer.
pub(crate) fn parse_python_version(value: &Value, path: &str) -> Result<Version, ConfigError> {
    let version = match value {
        Value::String(s) => s.clone(),
        Value::Float(f) => f.to_string(),
        Value::Integer(i) => i.to_string(),
        other => {
            return Err(ConfigError::InvalidType {
                path: path.to_string(),
                expected: "string",
                found: other.type_str(),
            });
        }
    };

    Version::from_str(version.trim()).map_err(|e| ConfigError::InvalidPythonVersion {
        path: path.to_string(),
        version,
        message: e.to_string(),
    })
}

/// Parse a `3.x` version (string, float or integer) into its minor component.
fn parse_python_minor(value: &Value, path: &str) -> Result<u64, ConfigError> {
    let parsed = parse_python_version(value, path)?;

    match parsed.release() {
        [3, rest @ ..] => Ok(rest.first().copied().unwrap_or(0)),
        _ => Err(ConfigError::UnsupportedPythonVersion {
            path: path.to_string(),
            version: parsed.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn whey_conda_table(source: &str) -> Table {
        let document: Table = toml::from_str(source).unwrap();
        document["tool"]["whey-conda"].as_table().unwrap().clone()
    }

    #[rstest]
    #[case::all(r#"conda-extras = "all""#, CondaExtras::All)]
    #[case::all_upper(r#"conda-extras = "ALL""#, CondaExtras::All)]
    #[case::none(r#"conda-extras = "none""#, CondaExtras::None)]
    #[case::none_capitalised(r#"conda-extras = "None""#, CondaExtras::None)]
    #[case::named(
        r#"conda-extras = ["cli", "testing"]"#,
        CondaExtras::Named(vec!["cli".to_string(), "testing".to_string()])
    )]
    #[case::empty_list(r#"conda-extras = []"#, CondaExtras::Named(vec![]))]
    fn test_valid_extras(#[case] source: &str, #[case] expected: CondaExtras) {
        let table = whey_conda_table(&format!("[tool.whey-conda]\n{source}"));
        let parsed = CondaTable::parse(&table, false).unwrap();
        assert_eq!(parsed.conda_extras, Some(expected));
    }

    #[rstest]
    #[case::keyword(r#"conda-extras = "cli""#)]
    #[case::integer("conda-extras = 1")]
    fn test_invalid_extras(#[case] source: &str) {
        let table = whey_conda_table(&format!("[tool.whey-conda]\n{source}"));
        let err = CondaTable::parse(&table, false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for [tool.whey-conda.conda-extras]: Expected 'all', 'none' or a list of strings."
        );
    }

    #[test]
    fn test_extras_list_with_non_string() {
        let table = whey_conda_table("[tool.whey-conda]\nconda-extras = [\"cli\", false]");
        let err = CondaTable::parse(&table, false).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Invalid type for 'tool.whey-conda.conda-extras[1]': expected string, got boolean"
        );
    }

    #[test]
    fn test_channels() {
        let table =
            whey_conda_table("[tool.whey-conda]\nconda-channels = [\"domdfcoding\", \"conda-forge\"]");
        let parsed = CondaTable::parse(&table, false).unwrap();
        assert_eq!(
            parsed.conda_channels,
            Some(vec!["domdfcoding".to_string(), "conda-forge".to_string()])
        );
    }

    #[test]
    fn test_channels_must_be_array() {
        let table = whey_conda_table("[tool.whey-conda]\nconda-channels = \"conda-forge\"");
        let err = CondaTable::parse(&table, false).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Invalid type for 'tool.whey-conda.conda-channels': expected array, got string"
        );
    }

    #[test]
    fn test_channels_with_non_string() {
        let table = whey_conda_table("[tool.whey-conda]\nconda-channels = [\"conda-forge\", 1]");
        let err = CondaTable::parse(&table, false).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Invalid type for 'tool.whey-conda.conda-channels[1]': expected string, got integer"
        );
    }

    #[test]
    fn test_description_must_be_string() {
        let table = whey_conda_table("[tool.whey-conda]\nconda-description = [\"spam\"]");
        let err = CondaTable::parse(&table, false).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Invalid type for 'tool.whey-conda.conda-description': expected string, got array"
        );
    }

    #[rstest]
    #[case::string(r#""3.8""#, 8)]
    #[case::two_digit(r#""3.10""#, 10)]
    #[case::patch(r#""3.9.1""#, 9)]
    #[case::float("3.7", 7)]
    #[case::major_only(r#""3""#, 0)]
    fn test_min_python_version(#[case] value: &str, #[case] expected: u64) {
        let table = whey_conda_table(&format!("[tool.whey-conda]\nmin-python-version = {value}"));
        let parsed = CondaTable::parse(&table, false).unwrap();
        assert_eq!(parsed.min_python_version, Some(expected));
    }

    #[test]
    fn test_python_version_major_must_be_3() {
        let table = whey_conda_table("[tool.whey-conda]\nmax-python-version = \"2.7\"");
        let err = CondaTable::parse(&table, false).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"'tool.whey-conda.max-python-version' must be a Python 3 version, got '2.7'"
        );
    }

    #[test]
    fn test_python_version_unparsable() {
        let table = whey_conda_table("[tool.whey-conda]\nmin-python-version = \"three\"");
        let err = CondaTable::parse(&table, false).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPythonVersion { .. }));
    }

    #[test]
    fn test_set_defaults() {
        let table = whey_conda_table("[tool.whey-conda]\nconda-description = \"Fantastic Spam!\"");

        let without = CondaTable::parse(&table, false).unwrap();
        assert_eq!(without.conda_channels, None);
        assert_eq!(without.conda_extras, None);

        let with = CondaTable::parse(&table, true).unwrap();
        assert_eq!(with.conda_description.as_deref(), Some("Fantastic Spam!"));
        assert_eq!(with.conda_channels, Some(vec!["conda-forge".to_string()]));
        assert_eq!(with.conda_extras, Some(CondaExtras::None));
        assert_eq!(with.min_python_version, None);
    }

    #[test]
    fn test_description_template() {
        let tool: Table = toml::from_str(
            "[whey-conda]\nconda-description = \"%s (conda build)\"",
        )
        .unwrap();

        let config =
            CondaConfig::from_tool_table(Some(&tool), Some("Lovely Spam! Wonderful Spam!")).unwrap();
        assert_eq!(config.description, "Lovely Spam! Wonderful Spam! (conda build)");

        let config = CondaConfig::from_tool_table(Some(&tool), None).unwrap();
        assert_eq!(config.description, " (conda build)");
    }

    #[test]
    fn test_defaults_without_tables() {
        let config = CondaConfig::from_tool_table(None, Some("Spam")).unwrap();
        assert_eq!(
            config,
            CondaConfig {
                description: "Spam".to_string(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_mkrecipe_extras_alias() {
        let tool: Table = toml::from_str(
            "[mkrecipe]\nextras = [\"test\"]\nconda-channels = [\"bioconda\"]\nlicense-key = \"MIT\"",
        )
        .unwrap();

        let config = CondaConfig::from_tool_table(Some(&tool), None).unwrap();
        assert_eq!(config.extras, CondaExtras::Named(vec!["test".to_string()]));
        assert_eq!(config.channels, vec!["bioconda".to_string()]);
    }

    #[test]
    fn test_whey_conda_overrides_mkrecipe() {
        let tool: Table = toml::from_str(
            r#"
[mkrecipe]
extras = ["test"]
conda-channels = ["bioconda"]
min-python-version = "3.7"

[whey-conda]
conda-extras = "all"
"#,
        )
        .unwrap();

        let config = CondaConfig::from_tool_table(Some(&tool), None).unwrap();
        assert_eq!(config.extras, CondaExtras::All);
        assert_eq!(config.channels, vec!["bioconda".to_string()]);
        assert_eq!(config.min_python_version, Some(7));
    }

    #[test]
    fn test_min_greater_than_max() {
        let tool: Table = toml::from_str(
            "[whey-conda]\nmin-python-version = \"3.10\"\nmax-python-version = \"3.8\"",
        )
        .unwrap();

        let err = CondaConfig::from_tool_table(Some(&tool), None).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"min-python-version (3.10) must not be greater than max-python-version (3.8)"
        );
    }

    #[test]
    fn test_table_must_be_a_table() {
        let tool: Table = toml::from_str("whey-conda = \"spam\"").unwrap();
        let err = CondaConfig::from_tool_table(Some(&tool), None).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Invalid type for 'tool.whey-conda': expected table, got string"
        );
    }
}
