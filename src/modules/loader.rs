//! Loading compiled artifacts into isolated engine runtimes
//!
//! Every [`LoadedModule`] owns its own QuickJS runtime. Dropping the last
//! handle tears the runtime down and releases all memory of the module.

use rquickjs::function::{Constructor, This};
use rquickjs::{
    CatchResultExt, CaughtError, Context, Ctx, Exception, Function, Module, Object, Runtime, Value,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::compiler::{artifact, LanguageVersion, DEFAULT_IMPORTS};
use crate::error::ScriptError;
use crate::execution::EvaluationContext;

/// Global slot holding the module's entry class
const ENTRY_SLOT: &str = "__rowscript_entry";
/// Export name of the entry class
const ENTRY_EXPORT: &str = "default";
/// Entry method invoked on every instance
const ENTRY_METHOD: &str = "evaluate";

/// Why an invocation produced no result
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fault {
    /// The watchdog stopped the script at its deadline
    Interrupted,
    /// The script threw or returned something unusable
    Thrown(String),
}

/// Deadline polled by the engine's interrupt handler
#[derive(Debug)]
pub(crate) struct Watchdog {
    epoch: Instant,
    /// Nanoseconds since `epoch`; 0 when disarmed
    deadline: AtomicU64,
    tripped: AtomicBool,
}

impl Watchdog {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            deadline: AtomicU64::new(0),
            tripped: AtomicBool::new(false),
        }
    }

    fn arm(&self, deadline: Option<Instant>) -> ArmedWatchdog<'_> {
        let nanos = deadline.map_or(0, |deadline| {
            (deadline.saturating_duration_since(self.epoch).as_nanos() as u64).max(1)
        });
        self.tripped.store(false, Ordering::SeqCst);
        self.deadline.store(nanos, Ordering::SeqCst);
        ArmedWatchdog { watchdog: self }
    }

    /// Polled by the engine; true stops the running script
    fn expired(&self) -> bool {
        let deadline = self.deadline.load(Ordering::SeqCst);
        if deadline == 0 {
            return false;
        }
        if self.epoch.elapsed().as_nanos() as u64 >= deadline {
            self.tripped.store(true, Ordering::SeqCst);
            return true;
        }
        false
    }

    fn tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

/// Disarms the watchdog when the invocation ends
struct ArmedWatchdog<'a> {
    watchdog: &'a Watchdog,
}

impl Drop for ArmedWatchdog<'_> {
    fn drop(&mut self) {
        self.watchdog.deadline.store(0, Ordering::SeqCst);
    }
}

/// A compiled script loaded into its own runtime, ready for instantiation
pub struct LoadedModule {
    consumer: &'static str,
    hash: i32,
    language: LanguageVersion,
    watchdog: Arc<Watchdog>,
    context: Context,
    _runtime: Runtime,
}

impl LoadedModule {
    /// Load a framed binary into a fresh runtime and evaluate its module body
    pub(crate) fn load(
        consumer: &'static str,
        hash: i32,
        binary: &[u8],
    ) -> Result<Self, ScriptError> {
        let (language, bytecode) = artifact::unframe(binary).map_err(ScriptError::Load)?;

        let runtime = Runtime::new().map_err(|e| ScriptError::Load(e.to_string()))?;
        DEFAULT_IMPORTS.install(&runtime);

        let watchdog = Arc::new(Watchdog::new());
        let handler = Arc::clone(&watchdog);
        runtime.set_interrupt_handler(Some(Box::new(move || handler.expired())));

        let context = Context::full(&runtime).map_err(|e| ScriptError::Load(e.to_string()))?;
        context.with(|ctx| {
            install_entry(&ctx, bytecode)
                .catch(&ctx)
                .map_err(|caught| ScriptError::Load(caught.to_string()))
        })?;

        Ok(Self {
            consumer,
            hash,
            language,
            watchdog,
            context,
            _runtime: runtime,
        })
    }

    pub fn consumer(&self) -> &'static str {
        self.consumer
    }

    pub fn hash(&self) -> i32 {
        self.hash
    }

    pub fn language(&self) -> LanguageVersion {
        self.language
    }

    /// Instantiate the entry class with `context` and call its entry method
    ///
    /// Blocks the calling thread. Returns `Ok(None)` when the script produced
    /// no value, otherwise the JSON text of the value.
    pub(crate) fn invoke(
        &self,
        context: &EvaluationContext,
        deadline: Option<Instant>,
    ) -> Result<Option<String>, Fault> {
        // queued behind another invocation for longer than our deadline
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(Fault::Interrupted);
        }

        self.context.with(|ctx| {
            let _armed = self.watchdog.arm(deadline);
            match run_entry(&ctx, context).catch(&ctx) {
                Ok(json) => Ok(json),
                Err(_) if self.watchdog.tripped() => Err(Fault::Interrupted),
                Err(caught) => Err(Fault::Thrown(describe(caught))),
            }
        })
    }
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        debug!(
            consumer = self.consumer,
            script_hash = self.hash,
            "Unloaded module"
        );
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("consumer", &self.consumer)
            .field("hash", &self.hash)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

fn install_entry<'js>(ctx: &Ctx<'js>, bytecode: &[u8]) -> rquickjs::Result<()> {
    // SAFETY: `artifact::unframe` only returns bytecode whose SHA-256 matches
    // the digest written next to it by `TemplateCompiler`. Bytes forged
    // together with a matching digest are not guarded against.
    let declared = unsafe { Module::load(ctx.clone(), bytecode)? };
    let (module, promise) = declared.eval()?;
    promise.finish::<()>()?;

    let entry: Constructor = module.get(ENTRY_EXPORT)?;
    ctx.globals().set(ENTRY_SLOT, entry)
}

fn run_entry<'js>(ctx: &Ctx<'js>, context: &EvaluationContext) -> rquickjs::Result<Option<String>> {
    let entry: Constructor = ctx.globals().get(ENTRY_SLOT)?;
    let instance: Object = entry.construct((context.to_js(ctx)?,))?;
    let evaluate: Function = instance.get(ENTRY_METHOD)?;
    let value: Value = evaluate.call((This(instance),))?;

    if value.is_undefined() || value.is_null() {
        return Ok(None);
    }

    match ctx.json_stringify(value)? {
        Some(json) => Ok(Some(json.to_string()?)),
        None => Err(Exception::throw_type(
            ctx,
            "script result is not JSON serializable",
        )),
    }
}

/// `Name: message` for thrown errors, the engine's rendering otherwise
fn describe(caught: CaughtError<'_>) -> String {
    match caught {
        CaughtError::Exception(exception) => {
            let name = exception
                .get::<_, Option<String>>("name")
                .ok()
                .flatten()
                .unwrap_or_else(|| "Error".to_string());
            format!("{}: {}", name, exception.message().unwrap_or_default())
        }
        other => other.to_string(),
    }
}
