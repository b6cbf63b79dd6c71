//! Looking up packages in conda channels.

use std::collections::HashMap;
use std::path::PathBuf;

use indicatif::MultiProgress;
use rattler_conda_types::{
    Channel, ChannelConfig, MatchSpec, PackageName, PackageNameMatcher, Platform,
};
use rattler_repodata_gateway::Gateway;

use crate::console_utils::spinner;
use crate::requirements::RequirementError;

/// Answers which versions of a set of packages the channels provide.
pub trait ChannelValidator {
    /// Map each package in `names` that any of `channels` provides to its
    /// available versions. Packages that no channel provides are left out.
    fn available_versions(
        &self,
        channels: &[String],
        names: &[String],
    ) -> Result<HashMap<String, Vec<String>>, RequirementError>;
}

/// Validates against the repodata of the channels for `noarch` and the
/// current platform.
pub struct RepodataValidator {
    gateway: Gateway,
    channel_config: ChannelConfig,
    platform: Platform,
    multi_progress: MultiProgress,
}

impl RepodataValidator {
    /// Create a validator. Channels given as paths are resolved against `root_dir`.
    pub fn new(root_dir: PathBuf, multi_progress: MultiProgress) -> Self {
        Self {
            gateway: Gateway::builder().finish(),
            channel_config: ChannelConfig::default_with_root_dir(root_dir),
            platform: Platform::current(),
            multi_progress,
        }
    }
}

impl ChannelValidator for RepodataValidator {
    fn available_versions(
        &self,
        channels: &[String],
        names: &[String],
    ) -> Result<HashMap<String, Vec<String>>, RequirementError> {
        let channels = channels
            .iter()
            .map(|channel| {
                Channel::from_str(channel, &self.channel_config).map_err(|e| {
                    RequirementError::InvalidChannel {
                        channel: channel.clone(),
                        message: e.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let specs = names
            .iter()
            .filter_map(|name| match PackageName::try_from(name.as_str()) {
                Ok(name) => Some(MatchSpec {
                    name: PackageNameMatcher::Exact(name),
                    ..Default::default()
                }),
                Err(e) => {
                    tracing::debug!("'{name}' cannot be a conda package name: {e}");
                    None
                }
            })
            .collect::<Vec<_>>();

        let progress = spinner(&self.multi_progress, "Fetching repodata");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let query = self
            .gateway
            .query(channels, [self.platform, Platform::NoArch], specs)
            .recursive(false);
        let result = runtime.block_on(async move { query.await });

        progress.finish_and_clear();

        let repodata = result.map_err(|e| RequirementError::Repodata(e.to_string()))?;

        let mut available: HashMap<String, Vec<String>> = HashMap::new();
        for repo in repodata {
            for record in repo.iter() {
                available
                    .entry(record.package_record.name.as_normalized().to_string())
                    .or_default()
                    .push(record.package_record.version.to_string());
            }
        }

        tracing::debug!(
            "Found {} of {} packages in the channels",
            available.len(),
            names.len()
        );

        Ok(available)
    }
}

/// A fixed, in-memory listing of channel contents.
///
/// Useful for offline builds where the set of available packages is known.
#[derive(Debug, Clone, Default)]
pub struct StaticChannelIndex {
    channels: HashMap<String, HashMap<String, Vec<String>>>,
}

impl StaticChannelIndex {
    /// Record that `channel` provides `version` of `package`.
    pub fn add(&mut self, channel: &str, package: &str, version: &str) {
        self.channels
            .entry(channel.to_string())
            .or_default()
            .entry(package.to_string())
            .or_default()
            .push(version.to_string());
    }
}

impl ChannelValidator for StaticChannelIndex {
    fn available_versions(
        &self,
        channels: &[String],
        names: &[String],
    ) -> Result<HashMap<String, Vec<String>>, RequirementError> {
        let mut available: HashMap<String, Vec<String>> = HashMap::new();
        for listing in channels.iter().filter_map(|channel| self.channels.get(channel)) {
            for name in names {
                if let Some(versions) = listing.get(name) {
                    available
                        .entry(name.clone())
                        .or_default()
                        .extend(versions.iter().cloned());
                }
            }
        }
        Ok(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_index_respects_channels() {
        let mut index = StaticChannelIndex::default();
        index.add("conda-forge", "httpx", "0.18.0");
        index.add("domdfcoding", "domdf_python_tools", "2.0.0");
        index.add("conda-forge", "httpx", "0.19.0");

        let names = vec!["httpx".to_string(), "domdf_python_tools".to_string()];

        let available = index
            .available_versions(&["conda-forge".to_string()], &names)
            .unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available["httpx"], vec!["0.18.0", "0.19.0"]);

        let available = index
            .available_versions(
                &["conda-forge".to_string(), "domdfcoding".to_string()],
                &names,
            )
            .unwrap();
        assert_eq!(available.len(), 2);
    }
}
