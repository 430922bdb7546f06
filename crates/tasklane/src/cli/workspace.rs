//! Config loading and registry setup shared by the commands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use tracing::{debug, info};

use tasklane_core::config::{load_config, load_config_or_default, resolve_config, Config};
use tasklane_core::{FactoryRegistry, Registries, RegistryBuilder, RenderingContext};
use tasklane_tasks::{builtin_renderers, builtin_shells, register_builtins, TaskReporter};

/// A loaded config together with the registries built from it
pub struct Workspace {
    /// Directory relative paths in the config resolve against
    pub root: PathBuf,
    pub config: Config,
    pub config_path: Option<PathBuf>,
    pub registries: Arc<Registries>,
}

impl Workspace {
    /// Load the config (explicit path or upward search from `dir`) and
    /// resolve it into frozen registries
    pub fn load(
        dir: &Path,
        explicit: Option<&Path>,
        reporter: Arc<dyn TaskReporter>,
    ) -> anyhow::Result<Self> {
        let (config, config_path) = match explicit {
            Some(path) => {
                let path = dir.join(path);
                let config = load_config(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?;
                (config, Some(path))
            }
            None => load_config_or_default(dir)?,
        };

        let root = config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dir.to_path_buf());
        let cache_dir = root.join(&config.cache_dir);

        let mut factories = FactoryRegistry::new();
        register_builtins(&mut factories, reporter)?;

        let mut builder = RegistryBuilder::new();
        if config.shells.is_empty() {
            for (i, shell) in builtin_shells().into_iter().enumerate() {
                builder.add_shell(shell, i == 0);
            }
        }
        for renderer in builtin_renderers() {
            builder.add_renderer(renderer);
        }
        let registries = resolve_config(&config, &factories, builder, &cache_dir)?.freeze();

        info!(
            config = ?config_path,
            tools = registries.tools().len(),
            tasks = registries.tasks().len(),
            "workspace loaded"
        );

        Ok(Self {
            root,
            config,
            config_path,
            registries,
        })
    }

    /// Rendering state seeded from the process environment and the config's `env`
    pub fn rendering(&self) -> Arc<RenderingContext> {
        let rendering = RenderingContext::from_process_env();
        debug!(vars = self.config.env.len(), "adding config env");
        rendering.extend_env(self.config.env.clone());
        Arc::new(rendering)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(&self.config.cache_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tasklane_core::{TaskKey, ToolKey};
    use tasklane_tasks::CollectingReporter;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
env:
  GREETING: hello
tasks:
  workflow:run:
    - name: build
      steps:
        - run: echo ${GREETING}
"#;

    #[test]
    fn test_load_searches_upwards() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("tasklane.yaml"), CONFIG).unwrap();
        let nested = temp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let ws = Workspace::load(&nested, None, Arc::new(CollectingReporter::default())).unwrap();

        assert_eq!(ws.root, temp.path());
        assert_eq!(ws.cache_dir(), temp.path().join(".tasklane/cache"));
        assert!(ws
            .registries
            .tasks()
            .get(&ToolKey::new("workflow", ""), &TaskKey::new("run", "build"))
            .is_some());
        assert_eq!(ws.registries.shells().get(None).unwrap().name(), "sh");
        assert_eq!(ws.rendering().env("GREETING").as_deref(), Some("hello"));
    }

    #[test]
    fn test_load_without_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::load(temp.path(), None, Arc::new(CollectingReporter::default())).unwrap();
        assert!(ws.config_path.is_none());
        assert!(ws.registries.tasks().is_empty());
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let result = Workspace::load(
            temp.path(),
            Some(Path::new("nope.yaml")),
            Arc::new(CollectingReporter::default()),
        );
        assert!(result.is_err());
    }
}
