//! Background TTL sweep
//!
//! Runs [`ModuleCache::sweep`] on a fixed interval in a tokio task, so
//! expired modules are unloaded without any caller paying for it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::ModuleCache;

/// Handle to control the sweeper task
pub struct SweeperHandle {
    shutdown: Arc<AtomicBool>,
    /// Wakes the task for an immediate sweep or shutdown
    notify: Arc<Notify>,
    join_handle: Option<tokio::task::JoinHandle<()>>,
}

impl SweeperHandle {
    /// Request a sweep now instead of waiting for the interval
    pub fn trigger_sweep(&self) {
        self.notify.notify_one();
    }

    /// Stop the sweeper and wait for it to exit
    pub async fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_one();

        if let Some(handle) = self.join_handle.take() {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(())) => debug!("Module sweeper stopped"),
                Ok(Err(e)) => warn!("Module sweeper panicked: {}", e),
                Err(_) => warn!("Module sweeper did not stop in time"),
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
    }
}

/// Spawn the sweeper for `cache`; must be called inside a tokio runtime
pub fn spawn_module_sweeper(cache: Arc<ModuleCache>, interval: Duration) -> SweeperHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let notify = Arc::new(Notify::new());

    let join_handle = tokio::spawn(run_sweep_loop(
        cache,
        interval,
        Arc::clone(&shutdown),
        Arc::clone(&notify),
    ));

    info!("Module sweeper started (interval: {:?})", interval);

    SweeperHandle {
        shutdown,
        notify,
        join_handle: Some(join_handle),
    }
}

async fn run_sweep_loop(
    cache: Arc<ModuleCache>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = notify.notified() => {
                if shutdown.load(Ordering::SeqCst) {
                    debug!("Module sweeper received shutdown signal");
                    break;
                }
                debug!("Module sweep triggered manually");
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let removed = cache.sweep();
        debug!(
            "Sweep removed {} modules, {} remain",
            removed,
            cache.len()
        );
    }

    info!("Module sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::TemplateCompiler;
    use crate::execution::ScriptConsumer;
    use crate::model::{Script, StockQuote};

    fn compiled(snippet: &str) -> Script {
        let mut script = Script::new("sweep", snippet);
        script.apply(
            TemplateCompiler::default()
                .compile::<StockQuote>(snippet)
                .unwrap(),
        );
        script
    }

    #[tokio::test]
    async fn test_sweeper_evicts_expired_modules() {
        let cache = Arc::new(ModuleCache::new(Some(Duration::from_millis(30))));
        cache
            .resolve(StockQuote::TYPE_ID, &compiled("return OpenPrice;"))
            .unwrap();
        assert_eq!(cache.len(), 1);

        let handle = spawn_module_sweeper(Arc::clone(&cache), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(cache.is_empty());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_manual_trigger() {
        let cache = Arc::new(ModuleCache::new(Some(Duration::from_millis(10))));
        let handle = spawn_module_sweeper(Arc::clone(&cache), Duration::from_secs(60));

        cache
            .resolve(StockQuote::TYPE_ID, &compiled("return HighPrice;"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.len(), 1);

        handle.trigger_sweep();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(cache.is_empty());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_keeps_fresh_modules() {
        let cache = Arc::new(ModuleCache::new(Some(Duration::from_secs(60))));
        cache
            .resolve(StockQuote::TYPE_ID, &compiled("return LowPrice;"))
            .unwrap();

        let handle = spawn_module_sweeper(Arc::clone(&cache), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(cache.len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_shutdown() {
        let cache = Arc::new(ModuleCache::new(Some(Duration::from_secs(1))));
        let handle = spawn_module_sweeper(cache, Duration::from_millis(10));

        assert!(handle.is_running());
        handle.shutdown().await;
    }
}
