//! Source adapters and the ordered registry the orchestrator runs.
//!
//! Registration order matters: when two sources emit the same posting in
//! one run, the source registered later wins.

pub mod demo;
pub mod file;
pub mod yingjiesheng;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FetchError, FetchResult};
use crate::traits::source::SourceAdapter;

pub use demo::DemoSource;
pub use file::FileSource;
pub use yingjiesheng::YingjieshengSource;

/// Knobs shared by the built-in adapters.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Minimum gap between HTTP requests to one site
    pub request_delay: Duration,

    pub request_timeout: Duration,

    pub user_agent: String,

    /// Attempts after an HTTP 429 before giving up on a page
    pub max_retries: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("jobsync/{}", env!("CARGO_PKG_VERSION")),
            max_retries: 3,
        }
    }
}

impl SourceSettings {
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }
}

/// Ordered, name-unique set of adapters.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an adapter. Names must be unique.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> FetchResult<&mut Self> {
        if self.get(adapter.name()).is_some() {
            return Err(FetchError::Config(format!(
                "source '{}' registered twice",
                adapter.name()
            )));
        }
        self.adapters.push(adapter);
        Ok(self)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, adapter: impl SourceAdapter + 'static) -> FetchResult<Self> {
        self.register(Arc::new(adapter))?;
        Ok(self)
    }

    /// Build a registry from configured names, in the given order.
    ///
    /// Recognized names: `demo`, `yingjiesheng`, and `file:<path>`.
    pub fn from_names<I, S>(names: I, settings: &SourceSettings) -> FetchResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for name in names {
            let name = name.as_ref().trim();
            let adapter: Arc<dyn SourceAdapter> = match name {
                "" => continue,
                "demo" => Arc::new(DemoSource::new()),
                "yingjiesheng" => Arc::new(YingjieshengSource::new(settings)?),
                other => match other.strip_prefix("file:") {
                    Some(path) => Arc::new(FileSource::new(PathBuf::from(path))),
                    None => {
                        return Err(FetchError::Config(format!("unknown source '{other}'")));
                    }
                },
            };
            registry.register(adapter)?;
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn SourceAdapter>> {
        self.adapters.iter().find(|a| a.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SourceAdapter>> {
        self.adapters.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_names_keeps_order() {
        let registry =
            SourceRegistry::from_names(["file:jobs.json", "demo"], &SourceSettings::default())
                .unwrap();
        assert_eq!(registry.names(), vec!["file:jobs.json", "demo"]);
        assert_eq!(
            format!("{registry:?}"),
            r#"SourceRegistry { sources: ["file:jobs.json", "demo"] }"#
        );
    }

    #[test]
    fn test_unknown_source_is_config_error() {
        let err = SourceRegistry::from_names(["nope"], &SourceSettings::default()).unwrap_err();
        assert!(matches!(err, FetchError::Config(_)));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = SourceRegistry::new()
            .with(DemoSource::new())
            .unwrap()
            .with(DemoSource::new())
            .err()
            .unwrap();
        assert!(matches!(err, FetchError::Config(_)));
    }
}
