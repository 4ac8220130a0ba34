// Library interface for rowscript
// The binary and the integration tests drive the pipeline through these modules

pub mod compiler;
pub mod config;
pub mod error;
pub mod execution;
pub mod hash;
pub mod host;
pub mod logging;
pub mod model;
pub mod modules;
pub mod orchestrator;
pub mod repository;

// Re-export commonly used types
pub use compiler::{CompiledScript, LanguageVersion, TemplateCompiler};
pub use error::{CompileError, Diagnostic, ScriptError};
pub use execution::{EvaluationContext, ScriptConsumer};
pub use host::ScriptHost;
pub use model::{EvaluationResult, Script, StockQuote};
pub use modules::{CacheStats, LoadedModule, ModuleCache};
pub use orchestrator::EvaluationService;
