//! AboutJson builder

use rattler_conda_types::package::AboutJson;
use serde_json::Value;
use std::collections::BTreeMap;

/// Builder for creating AboutJson metadata
///
/// URL setters replace any previously set value, so the last call wins.
///
/// # Example
/// ```rust
/// use whey_conda_package::metadata::AboutJsonBuilder;
///
/// let about = AboutJsonBuilder::new()
///     .with_homepage("https://example.com".to_string())
///     .with_license("MIT".to_string())
///     .with_summary("A test package".to_string())
///     .with_maintainers(vec!["Jane Doe".to_string()])
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct AboutJsonBuilder {
    home: Option<String>,
    license: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    doc_url: Option<String>,
    dev_url: Option<String>,
    channels: Vec<String>,
    extra: BTreeMap<String, Value>,
}

impl AboutJsonBuilder {
    /// Create a new AboutJsonBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the homepage URL
    pub fn with_homepage(mut self, url: String) -> Self {
        self.home = Some(url);
        self
    }

    /// Set the license
    pub fn with_license(mut self, license: String) -> Self {
        self.license = Some(license);
        self
    }

    /// Set the summary
    pub fn with_summary(mut self, summary: String) -> Self {
        self.summary = Some(summary);
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    /// Set the documentation URL
    pub fn with_doc_url(mut self, url: String) -> Self {
        self.doc_url = Some(url);
        self
    }

    /// Set the development URL
    pub fn with_dev_url(mut self, url: String) -> Self {
        self.dev_url = Some(url);
        self
    }

    /// Set the channels the package is meant to be installed from
    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = channels;
        self
    }

    /// Record the package maintainers under `extra.maintainers`
    ///
    /// An empty list leaves `extra` untouched.
    pub fn with_maintainers(mut self, maintainers: Vec<String>) -> Self {
        if !maintainers.is_empty() {
            self.extra.insert(
                "maintainers".to_string(),
                Value::Array(maintainers.into_iter().map(Value::String).collect()),
            );
        }
        self
    }

    /// Build the AboutJson
    ///
    /// URLs that do not parse are dropped with a warning.
    pub fn build(self) -> AboutJson {
        use url::Url;

        let parse_url = |url: Option<String>| -> Vec<Url> {
            url.into_iter()
                .filter_map(|s| match Url::parse(&s) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        tracing::warn!("Ignoring invalid URL '{}' in about.json: {}", s, e);
                        None
                    }
                })
                .collect()
        };

        AboutJson {
            home: parse_url(self.home),
            license: self.license,
            license_family: None,
            summary: self.summary,
            description: self.description,
            doc_url: parse_url(self.doc_url),
            dev_url: parse_url(self.dev_url),
            source_url: None,
            channels: self.channels,
            extra: self.extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_about_builder() {
        use url::Url;

        let about = AboutJsonBuilder::new()
            .with_homepage("https://example.com".to_string())
            .with_license("MIT".to_string())
            .with_summary("Test".to_string())
            .build();

        assert_eq!(about.home.len(), 1);
        assert_eq!(about.home[0], Url::parse("https://example.com").unwrap());
        assert_eq!(about.license, Some("MIT".to_string()));
        assert_eq!(about.summary, Some("Test".to_string()));
        assert!(about.extra.is_empty());
    }

    #[test]
    fn test_last_url_wins() {
        let about = AboutJsonBuilder::new()
            .with_dev_url("https://example.com/first".to_string())
            .with_dev_url("https://example.com/second".to_string())
            .with_doc_url("not a url".to_string())
            .build();

        assert_eq!(about.dev_url.len(), 1);
        assert_eq!(about.dev_url[0].as_str(), "https://example.com/second");
        assert!(about.doc_url.is_empty());
    }

    #[test]
    fn test_maintainers_in_extra() {
        let about = AboutJsonBuilder::new()
            .with_maintainers(vec!["Jane Doe".to_string(), "John Doe".to_string()])
            .build();

        assert_eq!(
            about.extra.get("maintainers"),
            Some(&serde_json::json!(["Jane Doe", "John Doe"]))
        );

        let about = AboutJsonBuilder::new().with_maintainers(Vec::new()).build();
        assert!(!about.extra.contains_key("maintainers"));
    }
}
