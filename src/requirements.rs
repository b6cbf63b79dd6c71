//! Computing the runtime requirements of the conda package.
//!
//! The declared dependencies (plus the selected extras) are filtered by their
//! environment markers, stripped down to `name<specifiers>`, merged per name
//! and checked against the configured conda channels.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use miette::Diagnostic;
use pep440_rs::{Version, VersionSpecifiers};
use pep508_rs::{MarkerEnvironment, MarkerEnvironmentBuilder, MarkerTree, VerbatimUrl, VersionOrUrl};
use thiserror::Error;

use crate::channels::ChannelValidator;
use crate::config::{CondaConfig, CondaExtras};
use crate::pyproject::ProjectConfig;

/// The requirement that replaces any `numpy` requirement.
///
/// conda-forge pins numpy per build through its ABI migration; runtime
/// requirements only carry this floor.
pub const NUMPY_FLOOR: &str = "numpy>=1.19.0";

const NUMPY: &str = "numpy";

/// `(sys_platform, os_name, platform_system, platform_machine)` of the
/// platforms a noarch package can be installed on.
const MARKER_PLATFORMS: [(&str, &str, &str, &str); 3] = [
    ("linux", "posix", "Linux", "x86_64"),
    ("darwin", "posix", "Darwin", "x86_64"),
    ("win32", "nt", "Windows", "AMD64"),
];

/// Errors raised while computing the runtime requirements.
#[allow(missing_docs)]
#[derive(Debug, Error, Diagnostic)]
pub enum RequirementError {
    #[error("Invalid requirement '{requirement}': {message}")]
    InvalidRequirement { requirement: String, message: String },

    #[error("Cannot satisfy the requirement '{name}' from any of the channels: {channels}")]
    #[diagnostic(help("add a channel providing the package to `conda-channels`"))]
    Unsatisfiable { name: String, channels: String },

    #[error("Invalid channel '{channel}': {message}")]
    InvalidChannel { channel: String, message: String },

    #[error("Failed to fetch repodata: {0}")]
    Repodata(String),

    #[error("Could not create the marker environment for Python 3.{minor}: {message}")]
    MarkerEnvironment { minor: u64, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A requirement stripped of extras and markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequirement {
    /// The normalized package name
    pub name: String,
    /// The version specifiers, in declaration order
    pub specifiers: Vec<String>,
}

impl fmt::Display for PreparedRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.specifiers.join(","))
    }
}

/// The declared dependencies followed by the dependencies of the selected extras.
///
/// Extras that the project does not declare are ignored.
pub fn selected_requirements<'a>(project: &'a ProjectConfig, extras: &CondaExtras) -> Vec<&'a str> {
    let extra_requirements: Vec<&str> = match extras {
        CondaExtras::All => project
            .optional_dependencies
            .values()
            .flatten()
            .map(String::as_str)
            .collect(),
        CondaExtras::None => Vec::new(),
        CondaExtras::Named(names) => names
            .iter()
            .filter_map(|name| {
                let group = project.optional_dependencies.get(name);
                if group.is_none() {
                    tracing::debug!("Ignoring unknown extra '{name}'");
                }
                group
            })
            .flatten()
            .map(String::as_str)
            .collect(),
    };

    project
        .dependencies
        .iter()
        .map(String::as_str)
        .chain(extra_requirements)
        .collect()
}

/// Parse PEP 508 requirement strings.
pub fn parse_requirements(
    requirements: &[&str],
) -> Result<Vec<pep508_rs::Requirement<VerbatimUrl>>, RequirementError> {
    requirements
        .iter()
        .map(|requirement| {
            pep508_rs::Requirement::<VerbatimUrl>::from_str(requirement).map_err(|e| {
                RequirementError::InvalidRequirement {
                    requirement: requirement.to_string(),
                    message: e.to_string(),
                }
            })
        })
        .collect()
}

/// The marker environments of every supported platform for each Python 3 minor version.
pub fn marker_environments(minors: &[u64]) -> Result<Vec<MarkerEnvironment>, RequirementError> {
    let mut environments = Vec::with_capacity(minors.len() * MARKER_PLATFORMS.len());
    for &minor in minors {
        let python_version = format!("3.{minor}");
        let python_full_version = format!("3.{minor}.0");
        for (sys_platform, os_name, platform_system, platform_machine) in MARKER_PLATFORMS {
            let environment = MarkerEnvironment::try_from(MarkerEnvironmentBuilder {
                implementation_name: "cpython",
                implementation_version: &python_full_version,
                os_name,
                platform_machine,
                platform_python_implementation: "CPython",
                platform_release: "",
                platform_system,
                platform_version: "",
                python_full_version: &python_full_version,
                python_version: &python_version,
                sys_platform,
            })
            .map_err(|e| RequirementError::MarkerEnvironment {
                minor,
                message: e.to_string(),
            })?;
            environments.push(environment);
        }
    }
    Ok(environments)
}

/// Keep requirements without a marker, and those whose marker holds in at
/// least one of the environments.
pub fn filter_by_markers(
    requirements: Vec<pep508_rs::Requirement<VerbatimUrl>>,
    environments: &[MarkerEnvironment],
) -> Vec<pep508_rs::Requirement<VerbatimUrl>> {
    requirements
        .into_iter()
        .filter(|requirement| {
            if requirement.marker == MarkerTree::default() {
                return true;
            }
            let keep = environments
                .iter()
                .any(|environment| requirement.marker.evaluate(environment, &[]));
            if !keep {
                tracing::debug!(
                    "Dropping '{}': its marker does not apply to any supported environment",
                    requirement
                );
            }
            keep
        })
        .collect()
}

/// Strip extras and markers, merge the specifiers of requirements on the
/// same package, and sort by name.
pub fn prepare_requirements(
    requirements: &[pep508_rs::Requirement<VerbatimUrl>],
) -> Vec<PreparedRequirement> {
    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for requirement in requirements {
        let specifiers = merged.entry(requirement.name.to_string()).or_default();
        match &requirement.version_or_url {
            Some(VersionOrUrl::VersionSpecifier(version_specifiers)) => {
                for specifier in version_specifiers.iter() {
                    let specifier = specifier.to_string();
                    if !specifiers.contains(&specifier) {
                        specifiers.push(specifier);
                    }
                }
            }
            Some(VersionOrUrl::Url(url)) => {
                tracing::warn!(
                    "Requirement '{}' points to {url}; only the package name is kept",
                    requirement.name
                );
            }
            None => {}
        }
    }

    merged
        .into_iter()
        .map(|(name, specifiers)| PreparedRequirement { name, specifiers })
        .collect()
}

/// Check that every requirement is available from at least one channel.
///
/// A package may be published under the `_` spelling of its name, in which
/// case the returned requirement uses that spelling. A requirement whose
/// specifiers match none of the published versions only raises a warning.
pub fn validate_requirements(
    requirements: Vec<PreparedRequirement>,
    channels: &[String],
    validator: &dyn ChannelValidator,
) -> Result<Vec<PreparedRequirement>, RequirementError> {
    if requirements.is_empty() {
        return Ok(requirements);
    }

    tracing::info!(
        "Checking dependencies against the following channels: {}",
        channels.iter().map(|c| format!("'{c}'")).join(", ")
    );

    let names = requirements
        .iter()
        .flat_map(|requirement| [requirement.name.clone(), requirement.name.replace('-', "_")])
        .unique()
        .collect::<Vec<_>>();
    let available = validator.available_versions(channels, &names)?;

    requirements
        .into_iter()
        .map(|mut requirement| {
            let underscored = requirement.name.replace('-', "_");
            let found = match available.get(&requirement.name) {
                Some(versions) => Some((requirement.name.clone(), versions)),
                None => available
                    .get(&underscored)
                    .map(|versions| (underscored, versions)),
            };
            let Some((name, versions)) = found else {
                return Err(RequirementError::Unsatisfiable {
                    name: requirement.name,
                    channels: channels.iter().map(|c| format!("'{c}'")).join(", "),
                });
            };

            if !requirement.specifiers.is_empty() && !any_version_matches(&requirement, versions) {
                tracing::warn!(
                    "No version of '{}' in the channels satisfies '{}'",
                    name,
                    requirement.specifiers.join(",")
                );
            }

            requirement.name = name;
            Ok(requirement)
        })
        .collect()
}

fn any_version_matches(requirement: &PreparedRequirement, versions: &[String]) -> bool {
    let Ok(specifiers) = VersionSpecifiers::from_str(&requirement.specifiers.join(",")) else {
        return true;
    };
    versions
        .iter()
        .filter_map(|version| Version::from_str(version).ok())
        .any(|version| specifiers.contains(&version))
}

/// Replace any `numpy` requirement with [`NUMPY_FLOOR`], appended last.
pub fn apply_numpy_floor(requirements: Vec<String>) -> Vec<String> {
    let (numpy, mut rest): (Vec<_>, Vec<_>) = requirements.into_iter().partition(|requirement| {
        requirement == NUMPY
            || requirement
                .strip_prefix(NUMPY)
                .is_some_and(|specifier| specifier.starts_with(['<', '>', '=', '!', '~']))
    });
    if !numpy.is_empty() {
        rest.push(NUMPY_FLOOR.to_string());
    }
    rest
}

/// Compute the `depends` entries of the conda package (without `python`).
///
/// Without a validator the channel check is skipped.
pub fn runtime_requirements(
    project: &ProjectConfig,
    conda: &CondaConfig,
    validator: Option<&dyn ChannelValidator>,
) -> Result<Vec<String>, RequirementError> {
    let requirements = parse_requirements(&selected_requirements(project, &conda.extras))?;

    let minors = project.candidate_python_minors(conda);
    if minors.is_empty() {
        tracing::warn!("No Python version satisfies the configured bounds and requires-python");
    }
    let requirements = filter_by_markers(requirements, &marker_environments(&minors)?);

    let prepared = prepare_requirements(&requirements);
    let prepared = match validator {
        Some(validator) => validate_requirements(prepared, &conda.channels, validator)?,
        None => {
            tracing::info!("Skipping the channel check of the requirements");
            prepared
        }
    };

    Ok(apply_numpy_floor(
        prepared.iter().map(ToString::to_string).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use indexmap::IndexMap;
    use rstest::rstest;

    use super::*;
    use crate::channels::StaticChannelIndex;

    fn project(dependencies: &[&str], extras: &[(&str, &[&str])]) -> ProjectConfig {
        ProjectConfig {
            name: "spam".to_string(),
            dist_info_name: "spam".to_string(),
            version: "2020.0.0".to_string(),
            dependencies: dependencies.iter().map(ToString::to_string).collect(),
            optional_dependencies: extras
                .iter()
                .map(|(name, reqs)| {
                    (name.to_string(), reqs.iter().map(ToString::to_string).collect())
                })
                .collect::<IndexMap<_, _>>(),
            ..Default::default()
        }
    }

    fn index(packages: &[&str]) -> StaticChannelIndex {
        let mut index = StaticChannelIndex::default();
        for package in packages {
            index.add("conda-forge", package, "1.0.0");
        }
        index
    }

    #[rstest]
    #[case::none(CondaExtras::None, vec!["httpx"])]
    #[case::all(CondaExtras::All, vec!["httpx", "pytest", "sphinx>=3.0.3"])]
    #[case::named(CondaExtras::Named(vec!["doc".to_string()]), vec!["httpx", "sphinx>=3.0.3"])]
    #[case::unknown(CondaExtras::Named(vec!["spam".to_string()]), vec!["httpx"])]
    fn test_selected_requirements(#[case] extras: CondaExtras, #[case] expected: Vec<&str>) {
        let project = project(&["httpx"], &[("test", &["pytest"]), ("doc", &["sphinx>=3.0.3"])]);
        assert_eq!(selected_requirements(&project, &extras), expected);
    }

    #[test]
    fn test_prepare_strips_and_merges() {
        let requirements = parse_requirements(&[
            "httpx",
            "gidgethub[httpx]>4.0.0",
            "django>2.1; os_name != 'nt'",
            "django>2.0; os_name == 'nt'",
            "Domdf_Python_Tools>=2.0.0",
        ])
        .unwrap();

        let prepared: Vec<String> = prepare_requirements(&requirements)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            prepared,
            vec![
                "django>2.1,>2.0",
                "domdf-python-tools>=2.0.0",
                "gidgethub>4.0.0",
                "httpx",
            ]
        );
    }

    #[rstest]
    #[case::no_marker("httpx", true)]
    #[case::windows_only("pywin32; sys_platform == 'win32'", true)]
    #[case::old_python("typing-extensions; python_version < '3.8'", true)]
    #[case::ancient_python("futures; python_version < '3.0'", false)]
    #[case::extra_marker("pytest; extra == 'test'", false)]
    fn test_filter_by_markers(#[case] requirement: &str, #[case] kept: bool) {
        let environments = marker_environments(&[7, 8, 9]).unwrap();
        let requirements = parse_requirements(&[requirement]).unwrap();
        assert_eq!(filter_by_markers(requirements, &environments).len(), usize::from(kept));
    }

    #[test]
    fn test_marker_respects_candidate_versions() {
        let environments = marker_environments(&[9, 10]).unwrap();
        let requirements = parse_requirements(&["typing-extensions; python_version < '3.8'"]).unwrap();
        assert!(filter_by_markers(requirements, &environments).is_empty());
    }

    #[rstest]
    #[case::bare(vec!["numpy"], vec!["numpy>=1.19.0"])]
    #[case::pinned(vec!["attrs>=20", "numpy>=1.16,<2", "six"], vec!["attrs>=20", "six", "numpy>=1.19.0"])]
    #[case::lookalike(vec!["numpydoc>=1.0"], vec!["numpydoc>=1.0"])]
    #[case::absent(vec!["six"], vec!["six"])]
    fn test_numpy_floor(#[case] requirements: Vec<&str>, #[case] expected: Vec<&str>) {
        let requirements = requirements.into_iter().map(String::from).collect();
        assert_eq!(apply_numpy_floor(requirements), expected);
    }

    #[test]
    fn test_all_extras_superset() {
        let project = project(
            &["httpx", "numpy>=1.16"],
            &[("test", &["pytest>=6.0"]), ("doc", &["sphinx"])],
        );
        let conda = CondaConfig {
            extras: CondaExtras::All,
            ..Default::default()
        };
        let validator = index(&["httpx", "numpy", "pytest", "sphinx"]);

        let requirements = runtime_requirements(&project, &conda, Some(&validator)).unwrap();
        assert_eq!(
            requirements,
            vec!["httpx", "pytest>=6.0", "sphinx", "numpy>=1.19.0"]
        );
    }

    #[test]
    fn test_unsatisfiable() {
        let project = project(&["httpx", "not-on-conda"], &[]);
        let conda = CondaConfig {
            channels: vec!["conda-forge".to_string(), "domdfcoding".to_string()],
            ..Default::default()
        };

        let err = runtime_requirements(&project, &conda, Some(&index(&["httpx"]))).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Cannot satisfy the requirement 'not-on-conda' from any of the channels: 'conda-forge', 'domdfcoding'"
        );
    }

    #[test]
    fn test_underscore_spelling() {
        let project = project(&["domdf-python-tools>=2.0"], &[]);
        let conda = CondaConfig::default();

        let requirements =
            runtime_requirements(&project, &conda, Some(&index(&["domdf_python_tools"]))).unwrap();
        assert_eq!(requirements, vec!["domdf_python_tools>=2.0"]);
    }

    #[test]
    fn test_version_mismatch_is_not_fatal() {
        let project = project(&["httpx>=2.0"], &[]);
        let requirements =
            runtime_requirements(&project, &CondaConfig::default(), Some(&index(&["httpx"])))
                .unwrap();
        assert_eq!(requirements, vec!["httpx>=2.0"]);
    }

    #[test]
    fn test_skip_channel_check() {
        let project = project(&["anything-goes"], &[]);
        let requirements = runtime_requirements(&project, &CondaConfig::default(), None).unwrap();
        assert_eq!(requirements, vec!["anything-goes"]);
    }

    #[test]
    fn test_invalid_requirement() {
        let project = project(&["@@@"], &[]);
        let err = runtime_requirements(&project, &CondaConfig::default(), None).unwrap_err();
        assert!(matches!(err, RequirementError::InvalidRequirement { .. }));
    }

    #[test]
    fn test_validator_sees_both_spellings() {
        struct Recording(std::cell::RefCell<Vec<String>>);

        impl ChannelValidator for Recording {
            fn available_versions(
                &self,
                _channels: &[String],
                names: &[String],
            ) -> Result<HashMap<String, Vec<String>>, RequirementError> {
                self.0.borrow_mut().extend(names.iter().cloned());
                Ok(names.iter().map(|n| (n.clone(), vec!["1.0".to_string()])).collect())
            }
        }

        let recording = Recording(Default::default());
        let prepared = prepare_requirements(&parse_requirements(&["spam-eggs", "ham"]).unwrap());
        validate_requirements(prepared, &["conda-forge".to_string()], &recording).unwrap();
        assert_eq!(
            recording.0.into_inner(),
            vec!["ham", "spam-eggs", "spam_eggs"]
        );
    }
}
