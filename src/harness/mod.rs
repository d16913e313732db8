//! Test harness wiring
//!
//! Ties the builder and the runtime manager together the way an integration
//! test suite uses them: seed a builder from the configured base file, write
//! the rendered document next to the tests, start it, and share the running
//! deployment for as long as the configured [`ContainerScope`] lasts.

pub mod config;

pub use config::{ContainerScope, HarnessConfig};

use crate::compose::ComposeBuilder;
use crate::error::Result;
use crate::runtime::{Collaborators, ComposeDescriptor, ComposeManager, ComposeOptions};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Where a test lives, used to derive its scope key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestLocation {
    pub package: String,
    pub module: String,
    pub class: Option<String>,
    pub function: String,
}

impl TestLocation {
    pub fn new(package: &str, module: &str, function: &str) -> Self {
        Self {
            package: package.to_string(),
            module: module.to_string(),
            class: None,
            function: function.to_string(),
        }
    }

    /// Place the test inside a test group
    pub fn in_class(mut self, class: &str) -> Self {
        self.class = Some(class.to_string());
        self
    }

    /// Key shared by every test that falls into the same `scope` instance
    pub fn scope_key(&self, scope: ContainerScope) -> String {
        let module = format!("{}::{}", self.package, self.module);
        let class = match &self.class {
            Some(class) => format!("{}::{}", module, class),
            None => module.clone(),
        };
        match scope {
            ContainerScope::Session => "session".to_string(),
            ContainerScope::Package => self.package.clone(),
            ContainerScope::Module => module,
            ContainerScope::Class => class,
            ContainerScope::Function => format!("{}::{}", class, self.function),
        }
    }
}

/// One value per scope instance, created on first use
#[derive(Debug)]
pub struct ScopedCache<T> {
    scope: ContainerScope,
    entries: HashMap<String, T>,
}

impl<T> ScopedCache<T> {
    pub fn new(scope: ContainerScope) -> Self {
        Self {
            scope,
            entries: HashMap::new(),
        }
    }

    pub fn scope(&self) -> ContainerScope {
        self.scope
    }

    /// Value for the scope instance of `location`, creating it with `init`
    pub fn get_or_try_init<F>(&mut self, location: &TestLocation, init: F) -> Result<&mut T>
    where
        F: FnOnce() -> Result<T>,
    {
        match self.entries.entry(location.scope_key(self.scope)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                tracing::debug!("Creating {} scoped value for {}", self.scope, entry.key());
                Ok(entry.insert(init()?))
            }
        }
    }

    /// End the scope instance of `location`, handing back its value
    pub fn finish(&mut self, location: &TestLocation) -> Option<T> {
        self.entries.remove(&location.scope_key(self.scope))
    }

    /// End the scope of `current` unless `next` shares it
    pub fn leave(&mut self, current: &TestLocation, next: Option<&TestLocation>) -> Option<T> {
        let key = current.scope_key(self.scope);
        match next {
            Some(next) if next.scope_key(self.scope) == key => None,
            _ => self.entries.remove(&key),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rendered compose file on disk, deleted when dropped
#[derive(Debug)]
pub struct ComposeFile {
    path: PathBuf,
}

impl ComposeFile {
    /// Write `contents` to `path`
    pub fn write(path: impl Into<PathBuf>, contents: &str) -> Result<Self> {
        let path = path.into();
        std::fs::write(&path, contents)?;
        tracing::debug!("Wrote compose file {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ComposeFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

/// Running deployment together with the compose file it was started from
///
/// The process group is stopped before the file is removed.
#[derive(Debug)]
pub struct Deployment {
    manager: ComposeManager,
    file: ComposeFile,
}

impl Deployment {
    pub fn manager(&self) -> &ComposeManager {
        &self.manager
    }

    pub fn compose_file(&self) -> &Path {
        self.file.path()
    }

    /// Stop the process group and remove the compose file
    pub fn stop(self) -> Result<()> {
        let Deployment { manager, file } = self;
        let result = manager.stop();
        drop(file);
        result
    }
}

impl Deref for Deployment {
    type Target = ComposeManager;

    fn deref(&self) -> &ComposeManager {
        &self.manager
    }
}

/// Builder and runtime wiring driven by a [`HarnessConfig`]
#[derive(Debug, Clone, Default)]
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// Harness configured from `TESTCOMPOSE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(HarnessConfig::from_env()?))
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Builder seeded from the configured base file, if any
    pub fn builder(&self) -> Result<ComposeBuilder> {
        let mut builder = ComposeBuilder::new();
        if let Some(base) = &self.config.base_config {
            builder.from_base(base)?;
        }
        Ok(builder)
    }

    /// Render `builder` into the configured compose file
    pub fn write_config(&self, builder: &ComposeBuilder) -> Result<ComposeFile> {
        let contents = builder.build_config(true)?;
        ComposeFile::write(self.config.compose_file_path(), &contents)
    }

    /// Write and start `builder` with the Docker CLI collaborators
    pub fn launch(&self, builder: &ComposeBuilder) -> Result<Deployment> {
        self.launch_with(builder, Collaborators::docker())
    }

    /// Write and start `builder` with the given collaborators
    pub fn launch_with(
        &self,
        builder: &ComposeBuilder,
        collaborators: Collaborators,
    ) -> Result<Deployment> {
        let file = self.write_config(builder)?;
        let mut options = ComposeOptions::new(ComposeDescriptor::from_path(file.path())?);
        options.project_prefix = self.config.project_prefix.clone();
        let manager = ComposeManager::start(options, collaborators)?;
        Ok(Deployment { manager, file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Service;
    use crate::runtime::tests::{fake_collaborators, CallLog};
    use crate::runtime::ProjectState;

    fn harness(dir: &Path) -> Harness {
        Harness::new(HarnessConfig {
            working_dir: dir.to_path_buf(),
            project_prefix: Some("it".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_scope_keys() {
        let location = TestLocation::new("api", "users", "test_create").in_class("Crud");
        assert_eq!(location.scope_key(ContainerScope::Session), "session");
        assert_eq!(location.scope_key(ContainerScope::Package), "api");
        assert_eq!(location.scope_key(ContainerScope::Module), "api::users");
        assert_eq!(location.scope_key(ContainerScope::Class), "api::users::Crud");
        assert_eq!(
            location.scope_key(ContainerScope::Function),
            "api::users::Crud::test_create"
        );
    }

    #[test]
    fn test_cache_shares_within_scope() {
        let mut cache = ScopedCache::new(ContainerScope::Module);
        let first = TestLocation::new("api", "users", "test_a");
        let second = TestLocation::new("api", "users", "test_b");
        let other = TestLocation::new("api", "orders", "test_c");

        let mut created = 0;
        for location in [&first, &second, &other] {
            cache
                .get_or_try_init(location, || {
                    created += 1;
                    Ok(created)
                })
                .unwrap();
        }
        assert_eq!(created, 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(*cache.get_or_try_init(&second, || Ok(99)).unwrap(), 1);

        assert_eq!(cache.leave(&first, Some(&second)), None);
        assert_eq!(cache.leave(&second, Some(&other)), Some(1));
        assert_eq!(cache.finish(&other), Some(2));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_init_failure_is_not_cached() {
        let mut cache: ScopedCache<u32> = ScopedCache::new(ContainerScope::Session);
        let location = TestLocation::default();
        assert!(cache
            .get_or_try_init(&location, || Err(crate::ComposeError::InvalidState(
                "down".to_string()
            )))
            .is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_compose_file_is_removed_on_drop() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("compose.yaml");
        let file = ComposeFile::write(&path, "services: {}\n").unwrap();
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "services: {}\n");

        drop(file);
        assert!(!path.exists());

        // already gone
        let file = ComposeFile::write(&path, "").unwrap();
        std::fs::remove_file(&path).unwrap();
        drop(file);
    }

    #[test]
    fn test_builder_from_base_config() {
        let temp = tempfile::tempdir().unwrap();
        let base = temp.path().join("base.yaml");
        std::fs::write(&base, "services:\n  web:\n    image: nginx\n").unwrap();

        let harness = Harness::new(HarnessConfig {
            base_config: Some(base),
            ..Default::default()
        });
        assert_eq!(harness.builder().unwrap().spec().service_names(), vec!["web"]);
        assert!(Harness::default().builder().unwrap().spec().services.is_none());
    }

    #[test]
    fn test_launch_writes_starts_and_cleans_up() {
        let temp = tempfile::tempdir().unwrap();
        let harness = harness(temp.path());
        let mut builder = ComposeBuilder::new();
        builder.add_service("web", Service::from_image("nginx"));

        let calls = CallLog::default();
        let deployment = harness
            .launch_with(&builder, fake_collaborators(calls.clone()))
            .unwrap();
        let path = deployment.compose_file().to_path_buf();
        assert_eq!(path, temp.path().join("test-docker-compose-file.yaml"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "services:\n  web:\n    image: nginx\n"
        );
        assert_eq!(deployment.state(), ProjectState::Running);
        assert!(deployment.project_name().starts_with("it-"));
        assert_eq!(
            deployment.get_service_host_and_port("web", 80).unwrap(),
            ("localhost".to_string(), 40080)
        );

        deployment.stop().unwrap();
        assert!(!path.exists());
        assert_eq!(calls.borrow().last().map(String::as_str), Some("stop"));
    }

    #[test]
    fn test_deployments_shared_per_scope() {
        let temp = tempfile::tempdir().unwrap();
        let harness = harness(temp.path());
        let mut builder = ComposeBuilder::new();
        builder.add_service("web", Service::from_image("nginx"));

        let calls = CallLog::default();
        let mut cache = ScopedCache::new(ContainerScope::Session);
        let first = TestLocation::new("api", "users", "test_a");
        let second = TestLocation::new("api", "orders", "test_b");
        for location in [&first, &second] {
            cache
                .get_or_try_init(location, || {
                    harness.launch_with(&builder, fake_collaborators(calls.clone()))
                })
                .unwrap();
        }
        assert_eq!(calls.borrow().iter().filter(|c| c.starts_with("start")).count(), 1);

        drop(cache.leave(&second, None));
        assert_eq!(calls.borrow().iter().filter(|c| *c == "stop").count(), 1);
    }
}
