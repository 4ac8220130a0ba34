//! Process-level wiring of compiler, module cache and sweeper
//!
//! A [`ScriptHost`] is started once from configuration and handed to
//! whatever needs to compile or evaluate scripts. Independent hosts share
//! nothing, so tests can run several side by side.

use std::sync::Arc;
use tracing::{debug, info};

use crate::compiler::TemplateCompiler;
use crate::config::RowscriptConfig;
use crate::error::ScriptError;
use crate::execution::ScriptConsumer;
use crate::modules::sweeper::{spawn_module_sweeper, SweeperHandle};
use crate::modules::ModuleCache;
use crate::orchestrator::EvaluationService;
use crate::repository::{MemoryScriptRepository, RecordRepository, ResultRepository};

pub struct ScriptHost {
    config: RowscriptConfig,
    compiler: TemplateCompiler,
    cache: Arc<ModuleCache>,
    sweeper: Option<SweeperHandle>,
}

impl ScriptHost {
    /// Validate `config` and bring up the pipeline
    ///
    /// When caching is enabled the sweeper is spawned on the current tokio
    /// runtime.
    pub fn start(config: RowscriptConfig) -> Result<Self, ScriptError> {
        config
            .validate()
            .map_err(|e| ScriptError::Config(format!("{:#}", e)))?;

        let compiler = TemplateCompiler::new(config.compiler.language_version.clone());
        if config.compiler.initialize {
            compiler.warm_up()?;
        }

        let ttl = config
            .cache
            .ttl()
            .map_err(|e| ScriptError::Config(format!("{:#}", e)))?;
        let cache = Arc::new(ModuleCache::new(ttl));

        let sweeper = match config.cache.sweep_interval() {
            Ok(Some(interval)) if cache.is_enabled() => {
                if tokio::runtime::Handle::try_current().is_err() {
                    return Err(ScriptError::Config(
                        "module caching requires a running tokio runtime".to_string(),
                    ));
                }
                Some(spawn_module_sweeper(Arc::clone(&cache), interval))
            }
            Ok(_) => None,
            Err(e) => return Err(ScriptError::Config(format!("{:#}", e))),
        };

        info!(
            language_version = %config.compiler.language_version,
            cache_ttl = ?cache.ttl(),
            timeout = %config.evaluation.timeout,
            "Script host started"
        );

        Ok(Self {
            config,
            compiler,
            cache,
            sweeper,
        })
    }

    pub fn config(&self) -> &RowscriptConfig {
        &self.config
    }

    pub fn compiler(&self) -> &TemplateCompiler {
        &self.compiler
    }

    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// In-memory script storage wired to this host's compiler and cache
    pub fn script_repository<C: ScriptConsumer>(&self) -> MemoryScriptRepository<C> {
        MemoryScriptRepository::new(self.compiler.clone(), Arc::clone(&self.cache))
    }

    pub fn evaluation_service<C, R, W>(
        &self,
        records: Arc<R>,
        results: Arc<W>,
    ) -> EvaluationService<C, R, W>
    where
        C: ScriptConsumer,
        R: RecordRepository<C>,
        W: ResultRepository,
    {
        EvaluationService::new(
            records,
            results,
            Arc::clone(&self.cache),
            self.config.evaluation.clone(),
        )
    }

    /// Stop the sweeper and unload every cached module
    ///
    /// Returns the number of modules removed from the cache.
    pub async fn shutdown(self) -> usize {
        if let Some(sweeper) = self.sweeper {
            sweeper.shutdown().await;
        }
        let cleared = self.cache.clear_all();
        debug!("Script host stopped, {} modules unloaded", cleared);
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::model::{Script, StockQuote};
    use crate::repository::ScriptRepository;

    fn caching_config() -> RowscriptConfig {
        RowscriptConfig {
            cache: CacheConfig {
                ttl: Some("10m".to_string()),
                sweep_interval: None,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let host = ScriptHost::start(caching_config()).unwrap();
        assert!(host.cache().is_enabled());

        let scripts = host.script_repository::<StockQuote>();
        let id = scripts.add(Script::new("open", "return OpenPrice;")).unwrap();
        let script = scripts.get_by_id(id, true).unwrap().unwrap();
        host.cache().resolve(StockQuote::TYPE_ID, &script).unwrap();

        assert_eq!(host.shutdown().await, 1);
    }

    #[tokio::test]
    async fn test_default_config_disables_cache() {
        let host = ScriptHost::start(RowscriptConfig::default()).unwrap();
        assert!(!host.cache().is_enabled());
        assert_eq!(host.shutdown().await, 0);
    }

    #[tokio::test]
    async fn test_warm_up_on_start() {
        let mut config = RowscriptConfig::default();
        config.compiler.initialize = true;
        let host = ScriptHost::start(config).unwrap();
        host.shutdown().await;
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = RowscriptConfig::default();
        config.compiler.language_version = "ES3".to_string();
        assert!(matches!(
            ScriptHost::start(config),
            Err(ScriptError::Config(_))
        ));
    }

    #[test]
    fn test_caching_needs_runtime() {
        assert!(matches!(
            ScriptHost::start(caching_config()),
            Err(ScriptError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_independent_hosts() {
        let first = ScriptHost::start(caching_config()).unwrap();
        let second = ScriptHost::start(caching_config()).unwrap();

        let scripts = first.script_repository::<StockQuote>();
        let id = scripts.add(Script::new("close", "return ClosePrice;")).unwrap();
        let script = scripts.get_by_id(id, true).unwrap().unwrap();
        first.cache().resolve(StockQuote::TYPE_ID, &script).unwrap();

        assert_eq!(first.cache().len(), 1);
        assert!(second.cache().is_empty());

        first.shutdown().await;
        second.shutdown().await;
    }
}
