//! Reading project metadata from `pyproject.toml`.
//!
//! Only the parts of `[project]` (PEP 621) and `[tool.whey]` that end up in
//! the conda package are read.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use pep440_rs::Version;
use pep508_rs::PackageName;
use toml::{Table, Value};

use crate::config::{
    CondaConfig, ConfigError, key_path, parse_python_version, parse_string, parse_string_list,
};

/// The Python versions considered for environment markers when
/// `[tool.whey] python-versions` is not set.
pub const DEFAULT_PYTHON_MINORS: std::ops::RangeInclusive<u64> = 7..=13;

/// An entry of `[project] authors` or `maintainers`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person {
    /// The person's name
    pub name: Option<String>,
    /// The person's email address
    pub email: Option<String>,
}

/// Project metadata from `[project]` and `[tool.whey]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectConfig {
    /// The project name as written in `pyproject.toml`
    pub name: String,
    /// The normalized name used for `.dist-info` directories, e.g. `spam_eggs`
    pub dist_info_name: String,
    /// The normalized PEP 440 version
    pub version: String,
    /// The one-line project summary
    pub description: Option<String>,
    /// The full text of the license, if the project has one
    pub license_text: Option<String>,
    /// The short license identifier, e.g. `MIT`
    pub license_key: Option<String>,
    /// `[project] authors`
    pub authors: Vec<Person>,
    /// `[project] maintainers`
    pub maintainers: Vec<Person>,
    /// `[project.urls]`, in file order
    pub urls: IndexMap<String, String>,
    /// `[project] dependencies`
    pub dependencies: Vec<String>,
    /// `[project.optional-dependencies]`, in file order
    pub optional_dependencies: IndexMap<String, Vec<String>>,
    /// `[project] requires-python`
    pub requires_python: Option<String>,
    /// `[tool.whey] source-dir`
    pub source_dir: PathBuf,
    /// `[tool.whey] package`
    pub package: String,
    /// `[tool.whey] python-versions`, as Python 3 minor versions
    pub python_versions: Vec<u64>,
}

/// The parsed `pyproject.toml` of a project.
#[derive(Debug, Clone)]
pub struct PyProject {
    document: Table,
}

impl PyProject {
    /// Read `pyproject.toml` from the project directory.
    pub fn from_dir(project_dir: &Path) -> Result<Self, ConfigError> {
        let path = project_dir.join("pyproject.toml");
        let contents =
            fs_err::read_to_string(&path).map_err(|e| ConfigError::Io(path.clone(), e))?;
        Self::from_str(&contents).map_err(|e| ConfigError::TomlParse(path, e))
    }

    fn table(&self, path: &str) -> Result<Option<&Table>, ConfigError> {
        let mut current = &self.document;
        for part in path.split('.') {
            match current.get(part) {
                None => return Ok(None),
                Some(Value::Table(table)) => current = table,
                Some(other) => {
                    return Err(ConfigError::InvalidType {
                        path: path.to_string(),
                        expected: "table",
                        found: other.type_str(),
                    });
                }
            }
        }
        Ok(Some(current))
    }

    /// Read `[project]` and `[tool.whey]`.
    ///
    /// A license given as `{ file = "..." }` is read relative to `project_dir`.
    pub fn project_config(&self, project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
        let project = self
            .table("project")?
            .ok_or_else(|| ConfigError::MissingField("project".to_string()))?;
        let empty = Table::new();
        let whey = self.table("tool.whey")?.unwrap_or(&empty);

        let name = required_string(project, "project", "name")?;
        let dist_info_name = PackageName::from_str(&name)
            .map_err(|e| ConfigError::InvalidValue {
                path: "project.name".to_string(),
                message: e.to_string(),
            })?
            .as_dist_info_name()
            .into_owned();
        let raw_version = required_string(project, "project", "version")?;
        let version = Version::from_str(&raw_version)
            .map_err(|e| ConfigError::InvalidValue {
                path: "project.version".to_string(),
                message: e.to_string(),
            })?
            .to_string();

        let (license_text, license_expression) = match project.get("license") {
            None => (None, None),
            Some(Value::String(expression)) => (None, Some(expression.clone())),
            Some(Value::Table(license)) => {
                if let Some(text) = license.get("text") {
                    (Some(parse_string(text, "project.license.text")?), None)
                } else if let Some(file) = license.get("file") {
                    let path = project_dir.join(parse_string(file, "project.license.file")?);
                    let text =
                        fs_err::read_to_string(&path).map_err(|e| ConfigError::Io(path, e))?;
                    (Some(text), None)
                } else {
                    return Err(ConfigError::InvalidValue {
                        path: "project.license".to_string(),
                        message: "expected a 'text' or 'file' key".to_string(),
                    });
                }
            }
            Some(other) => {
                return Err(ConfigError::InvalidType {
                    path: "project.license".to_string(),
                    expected: "string or table",
                    found: other.type_str(),
                });
            }
        };

        let license_key = whey
            .get("license-key")
            .map(|value| parse_string(value, "tool.whey.license-key"))
            .transpose()?
            .or(license_expression);

        let package = match whey.get("package") {
            Some(value) => parse_string(value, "tool.whey.package")?,
            None => dist_info_name.clone(),
        };

        let python_versions = match whey.get("python-versions") {
            Some(Value::Array(items)) => {
                let mut minors = Vec::new();
                for (idx, item) in items.iter().enumerate() {
                    let path = format!("tool.whey.python-versions[{idx}]");
                    let version = parse_python_version(item, &path)?;
                    match version.release() {
                        [3, rest @ ..] => minors.push(rest.first().copied().unwrap_or(0)),
                        _ => tracing::debug!("Ignoring Python version {version} from {path}"),
                    }
                }
                minors
            }
            Some(other) => {
                return Err(ConfigError::InvalidType {
                    path: "tool.whey.python-versions".to_string(),
                    expected: "array",
                    found: other.type_str(),
                });
            }
            None => Vec::new(),
        };

        Ok(ProjectConfig {
            name,
            dist_info_name,
            version,
            description: optional_string(project, "project", "description")?,
            license_text,
            license_key,
            authors: parse_people(project, "authors")?,
            maintainers: parse_people(project, "maintainers")?,
            urls: parse_string_map(self.table("project.urls")?, "project.urls")?,
            dependencies: project
                .get("dependencies")
                .map(|value| parse_string_list(value, "project.dependencies"))
                .transpose()?
                .unwrap_or_default(),
            optional_dependencies: parse_optional_dependencies(
                self.table("project.optional-dependencies")?,
            )?,
            requires_python: optional_string(project, "project", "requires-python")?,
            source_dir: whey
                .get("source-dir")
                .map(|value| parse_string(value, "tool.whey.source-dir"))
                .transpose()?
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            package,
            python_versions,
        })
    }

    /// Resolve the conda configuration from `[tool.mkrecipe]` and `[tool.whey-conda]`.
    pub fn conda_config(&self, project: &ProjectConfig) -> Result<CondaConfig, ConfigError> {
        CondaConfig::from_tool_table(self.table("tool")?, project.description.as_deref())
    }
}

impl FromStr for PyProject {
    type Err = toml::de::Error;

    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            document: contents.parse()?,
        })
    }
}

impl ProjectConfig {
    /// The name of the wheel's `.dist-info` directory without the suffix,
    /// e.g. `spam_eggs-1.0.0`.
    pub fn archive_name(&self) -> String {
        format!("{}-{}", self.dist_info_name, self.version)
    }

    /// The conda package name (the project name, lowercased).
    pub fn conda_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// The top-level import package, e.g. `spam` for `spam.eggs`.
    pub fn top_level_package(&self) -> &str {
        self.package.split('.').next().unwrap_or(&self.package)
    }

    /// The directory that holds the import package, relative to the project.
    pub fn package_dir(&self) -> PathBuf {
        self.package
            .split('.')
            .fold(self.source_dir.clone(), |dir, part| dir.join(part))
    }

    /// The Python 3 minor versions requirements are evaluated for.
    ///
    /// Starts from `[tool.whey] python-versions` (or a default range) and
    /// keeps the versions within the configured bounds that satisfy
    /// `requires-python`.
    pub fn candidate_python_minors(&self, conda: &CondaConfig) -> Vec<u64> {
        let requires_python = self.requires_python.as_deref().and_then(|specifiers| {
            pep440_rs::VersionSpecifiers::from_str(specifiers)
                .inspect_err(|e| {
                    tracing::warn!("Ignoring unparsable requires-python '{specifiers}': {e}")
                })
                .ok()
        });

        let listed = if self.python_versions.is_empty() {
            DEFAULT_PYTHON_MINORS.collect()
        } else {
            self.python_versions.clone()
        };

        listed
            .into_iter()
            .filter(|minor| conda.min_python_version.is_none_or(|min| *minor >= min))
            .filter(|minor| conda.max_python_version.is_none_or(|max| *minor <= max))
            .filter(|minor| {
                requires_python
                    .as_ref()
                    .is_none_or(|specifiers| specifiers.contains(&Version::new([3, *minor])))
            })
            .collect()
    }

    /// The names of the maintainers, falling back to the authors.
    pub fn maintainer_names(&self) -> Vec<String> {
        let names = |people: &[Person]| -> Vec<String> {
            people
                .iter()
                .filter_map(|person| person.name.clone())
                .filter(|name| !name.is_empty())
                .collect()
        };

        let maintainers = names(&self.maintainers);
        if maintainers.is_empty() {
            names(&self.authors)
        } else {
            maintainers
        }
    }
}

fn required_string(table: &Table, table_path: &str, key: &str) -> Result<String, ConfigError> {
    optional_string(table, table_path, key)?
        .ok_or_else(|| ConfigError::MissingField(key_path(table_path, key)))
}

fn optional_string(
    table: &Table,
    table_path: &str,
    key: &str,
) -> Result<Option<String>, ConfigError> {
    table
        .get(key)
        .map(|value| parse_string(value, &key_path(table_path, key)))
        .transpose()
}

fn parse_people(project: &Table, key: &str) -> Result<Vec<Person>, ConfigError> {
    let path = key_path("project", key);
    let Some(value) = project.get(key) else {
        return Ok(Vec::new());
    };
    let Value::Array(items) = value else {
        return Err(ConfigError::InvalidType {
            path,
            expected: "array",
            found: value.type_str(),
        });
    };

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let item_path = format!("{path}[{idx}]");
            let Value::Table(person) = item else {
                return Err(ConfigError::InvalidType {
                    path: item_path,
                    expected: "table",
                    found: item.type_str(),
                });
            };
            Ok(Person {
                name: optional_string(person, &item_path, "name")?,
                email: optional_string(person, &item_path, "email")?,
            })
        })
        .collect()
}

fn parse_string_map(
    table: Option<&Table>,
    path: &str,
) -> Result<IndexMap<String, String>, ConfigError> {
    table
        .into_iter()
        .flatten()
        .map(|(key, value)| Ok((key.clone(), parse_string(value, &key_path(path, key))?)))
        .collect()
}

fn parse_optional_dependencies(
    table: Option<&Table>,
) -> Result<IndexMap<String, Vec<String>>, ConfigError> {
    table
        .into_iter()
        .flatten()
        .map(|(extra, value)| {
            let path = key_path("project.optional-dependencies", extra);
            Ok((extra.clone(), parse_string_list(value, &path)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CondaExtras;
    use rstest::rstest;

    const MINIMAL_CONFIG: &str = r#"
[project]
name = "spam"
version = "2020.0.0"
"#;

    fn project(source: &str) -> ProjectConfig {
        PyProject::from_str(source)
            .unwrap()
            .project_config(Path::new("."))
            .unwrap()
    }

    #[test]
    fn test_minimal() {
        let config = project(MINIMAL_CONFIG);
        assert_eq!(config.name, "spam");
        assert_eq!(config.version, "2020.0.0");
        assert_eq!(config.package, "spam");
        assert_eq!(config.source_dir, PathBuf::from("."));
        assert_eq!(config.archive_name(), "spam-2020.0.0");
        assert_eq!(config.conda_name(), "spam");
        assert!(config.license_text.is_none());
        assert!(config.dependencies.is_empty());
    }

    #[test]
    fn test_complete() {
        let config = project(
            r#"
[project]
name = "Whey"
version = "2021.0.0"
description = "A simple Python wheel builder for simple projects."
dependencies = ["httpx", "gidgethub[httpx]>4.0.0"]

[project.license]
text = "This is the license"

[[project.authors]]
email = "dominic@davis-foster.co.uk"
name = "Dominic Davis-Foster"

[project.urls]
Homepage = "https://whey.readthedocs.io/en/latest"
Documentation = "https://whey.readthedocs.io/en/latest"
"Source Code" = "https://github.com/repo-helper/whey"

[project.optional-dependencies]
test = ["pytest"]
doc = ["sphinx>=3.0.3"]

[tool.whey]
python-versions = ["3.6", "3.7", "3.8"]
license-key = "MIT"
package = "whey"
"#,
        );

        assert_eq!(config.conda_name(), "whey");
        assert_eq!(config.archive_name(), "whey-2021.0.0");
        assert_eq!(config.license_text.as_deref(), Some("This is the license"));
        assert_eq!(config.license_key.as_deref(), Some("MIT"));
        assert_eq!(config.maintainer_names(), vec!["Dominic Davis-Foster"]);
        assert_eq!(
            config.urls.keys().collect::<Vec<_>>(),
            vec!["Homepage", "Documentation", "Source Code"]
        );
        assert_eq!(
            config.optional_dependencies.keys().collect::<Vec<_>>(),
            vec!["test", "doc"]
        );
        assert_eq!(config.python_versions, vec![6, 7, 8]);
    }

    #[test]
    fn test_license_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs_err::write(temp_dir.path().join("LICENSE"), "Spam license").unwrap();

        let config = PyProject::from_str(&format!("{MINIMAL_CONFIG}license = {{ file = \"LICENSE\" }}"))
            .unwrap()
            .project_config(temp_dir.path())
            .unwrap();
        assert_eq!(config.license_text.as_deref(), Some("Spam license"));
    }

    #[test]
    fn test_license_expression_is_key() {
        let config = project(&format!("{MINIMAL_CONFIG}license = \"BSD-3-Clause\""));
        assert_eq!(config.license_key.as_deref(), Some("BSD-3-Clause"));
        assert!(config.license_text.is_none());
    }

    #[rstest]
    #[case::dashes("spam-eggs", "spam_eggs-1.0")]
    #[case::mixed("Spam.Eggs__Ham", "spam_eggs_ham-1.0")]
    fn test_archive_name(#[case] name: &str, #[case] expected: &str) {
        let config = project(&format!("[project]\nname = \"{name}\"\nversion = \"1.0\""));
        assert_eq!(config.archive_name(), expected);
    }

    #[test]
    fn test_invalid_name() {
        let err = PyProject::from_str("[project]\nname = \"spam eggs!\"\nversion = \"1.0\"")
            .unwrap()
            .project_config(Path::new("."))
            .unwrap_err();
        assert!(matches!(
            &err,
            ConfigError::InvalidValue { path, .. } if path == "project.name"
        ));
    }

    #[test]
    fn test_default_package_and_dir() {
        let config = project(
            "[project]\nname = \"spam-eggs\"\nversion = \"1.0\"\n[tool.whey]\nsource-dir = \"src\"",
        );
        assert_eq!(config.package, "spam_eggs");
        assert_eq!(config.package_dir(), Path::new("src").join("spam_eggs"));

        let config = project("[project]\nname = \"spam\"\nversion = \"1.0\"\n[tool.whey]\npackage = \"spam.eggs\"");
        assert_eq!(config.top_level_package(), "spam");
        assert_eq!(config.package_dir(), Path::new(".").join("spam").join("eggs"));
    }

    #[test]
    fn test_missing_version() {
        let err = PyProject::from_str("[project]\nname = \"spam\"")
            .unwrap()
            .project_config(Path::new("."))
            .unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"Missing required field 'project.version'");
    }

    #[test]
    fn test_dependency_type_error() {
        let err = PyProject::from_str(&format!("{MINIMAL_CONFIG}dependencies = [\"httpx\", 3]"))
            .unwrap()
            .project_config(Path::new("."))
            .unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Invalid type for 'project.dependencies[1]': expected string, got integer"
        );
    }

    #[test]
    fn test_maintainers_preferred_over_authors() {
        let config = project(&format!(
            "{MINIMAL_CONFIG}authors = [{{ name = \"Author\" }}]\nmaintainers = [{{ email = \"m@example.com\" }}, {{ name = \"Maintainer\" }}]"
        ));
        assert_eq!(config.maintainer_names(), vec!["Maintainer"]);
    }

    #[rstest]
    #[case::defaults("", "", vec![7, 8, 9, 10, 11, 12, 13])]
    #[case::bounds("", "min-python-version = \"3.8\"\nmax-python-version = \"3.10\"", vec![8, 9, 10])]
    #[case::requires_python("requires-python = \">=3.9\"\n", "", vec![9, 10, 11, 12, 13])]
    #[case::requires_python_complex(
        "requires-python = \">=2.7,!=3.0.*,!=3.2.*,<3.9\"\n",
        "",
        vec![7, 8]
    )]
    fn test_candidate_python_minors(
        #[case] project_extra: &str,
        #[case] conda_table: &str,
        #[case] expected: Vec<u64>,
    ) {
        let pyproject = PyProject::from_str(&format!(
            "{MINIMAL_CONFIG}{project_extra}\n[tool.whey-conda]\n{conda_table}"
        ))
        .unwrap();
        let config = pyproject.project_config(Path::new(".")).unwrap();
        let conda = pyproject.conda_config(&config).unwrap();
        assert_eq!(config.candidate_python_minors(&conda), expected);
    }

    #[test]
    fn test_conda_config_uses_description() {
        let pyproject = PyProject::from_str(&format!(
            "{MINIMAL_CONFIG}description = \"Lovely Spam! Wonderful Spam!\"\n\n[tool.whey-conda]\nconda-extras = \"all\""
        ))
        .unwrap();
        let config = pyproject.project_config(Path::new(".")).unwrap();
        let conda = pyproject.conda_config(&config).unwrap();
        assert_eq!(conda.description, "Lovely Spam! Wonderful Spam!");
        assert_eq!(conda.extras, CondaExtras::All);
    }
}
