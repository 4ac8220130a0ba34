//! Template compiler
//!
//! Turns a raw snippet into a loadable artifact:
//!
//! 1. trim the snippet and terminate it
//! 2. splice it into the consumer's template region
//! 3. prepend the default imports
//! 4. compile the composed ES module to QuickJS bytecode
//! 5. hash the composed source
//!
//! The compiler never touches the module cache or any repository.

use rquickjs::{CatchResultExt, Context, Module, Runtime};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, warn};

pub(crate) mod artifact;
mod diagnostics;
pub mod prelude;
pub mod template;

pub use prelude::{DefaultImports, HostModule, DEFAULT_IMPORTS};

use crate::error::CompileError;
use crate::execution::ScriptConsumer;
use crate::hash::script_hash;

/// Default language version when none is configured
pub const DEFAULT_LANGUAGE_VERSION: &str = "ES2023";

const WARM_UP_TEMPLATE: &str =
    "export default class WarmUp {\n    evaluate() {\n        // #region Script\n        // #endregion\n    }\n}\n";

/// Output of a successful compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledScript {
    /// Framed module bytecode
    pub binary: Vec<u8>,
    /// Hash of the composed source, never 0
    pub hash: i32,
}

/// ECMAScript edition scripts are written against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageVersion {
    Es2020,
    Es2022,
    Es2023,
}

impl LanguageVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageVersion::Es2020 => "ES2020",
            LanguageVersion::Es2022 => "ES2022",
            LanguageVersion::Es2023 => "ES2023",
        }
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            LanguageVersion::Es2020 => 20,
            LanguageVersion::Es2022 => 22,
            LanguageVersion::Es2023 => 23,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            20 => Some(LanguageVersion::Es2020),
            22 => Some(LanguageVersion::Es2022),
            23 => Some(LanguageVersion::Es2023),
            _ => None,
        }
    }
}

impl FromStr for LanguageVersion {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ES2020" | "ES11" => Ok(LanguageVersion::Es2020),
            "ES2022" | "ES13" => Ok(LanguageVersion::Es2022),
            "ES2023" | "ES14" | "LATEST" => Ok(LanguageVersion::Es2023),
            _ => Err(CompileError::InvalidLanguageVersion(s.to_string())),
        }
    }
}

impl fmt::Display for LanguageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiles snippets for any [`ScriptConsumer`]
///
/// Cheap to clone. The language setting is parsed on first use and the
/// outcome, success or failure, is kept for the lifetime of the compiler.
///
/// The language version does not select a dialect: every script is compiled
/// by the same engine parser. The validated version is only recorded in the
/// artifact header and reported back by [`LoadedModule::language`].
///
/// [`LoadedModule::language`]: crate::LoadedModule::language
#[derive(Debug, Clone)]
pub struct TemplateCompiler {
    language_setting: Arc<str>,
    language: Arc<OnceLock<Result<LanguageVersion, String>>>,
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE_VERSION)
    }
}

impl TemplateCompiler {
    pub fn new(language_setting: impl Into<String>) -> Self {
        Self {
            language_setting: Arc::from(language_setting.into()),
            language: Arc::new(OnceLock::new()),
        }
    }

    /// The validated language version
    pub fn language_version(&self) -> Result<LanguageVersion, CompileError> {
        self.language
            .get_or_init(|| {
                self.language_setting
                    .parse::<LanguageVersion>()
                    .map_err(|_| self.language_setting.to_string())
            })
            .clone()
            .map_err(CompileError::InvalidLanguageVersion)
    }

    /// Compile `snippet` with the consumer's template
    pub fn compile<C: ScriptConsumer>(&self, snippet: &str) -> Result<CompiledScript, CompileError> {
        self.compile_with(C::TYPE_ID, C::TEMPLATE, snippet)
    }

    /// Compile `snippet` spliced into `template`, labelling the unit `unit_name`
    pub fn compile_with(
        &self,
        unit_name: &str,
        template: &str,
        snippet: &str,
    ) -> Result<CompiledScript, CompileError> {
        let start = Instant::now();

        let source = compose(template, snippet)?;
        let language = self.language_version()?;
        let bytecode = emit_bytecode(unit_name, &source)?;
        let hash = script_hash(&source);

        info!(
            operation = "compile",
            status = "success",
            unit = unit_name,
            script_hash = hash,
            size_bytes = bytecode.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "script compiled"
        );

        Ok(CompiledScript {
            binary: artifact::frame(language, &bytecode),
            hash,
        })
    }

    /// Compile a trivial script so the engine is warm before real traffic
    pub fn warm_up(&self) -> Result<(), CompileError> {
        self.compile_with("warm_up", WARM_UP_TEMPLATE, "return 0")
            .map(|_| debug!("Compiler warm-up finished"))
    }
}

/// Build the final compilable source for `snippet`
pub fn compose(template: &str, snippet: &str) -> Result<String, CompileError> {
    let code = template::prepare_snippet(snippet)?;
    let body = template::splice(template, &code)?;

    let header = DEFAULT_IMPORTS.header();
    let mut source = String::with_capacity(header.len() + body.len());
    source.push_str(header);
    source.push_str(&body);
    Ok(source)
}

/// Run the engine compiler over `source` in a throwaway runtime
fn emit_bytecode(unit_name: &str, source: &str) -> Result<Vec<u8>, CompileError> {
    let runtime = Runtime::new().map_err(|e| CompileError::Toolchain(e.to_string()))?;
    DEFAULT_IMPORTS.install(&runtime);
    let context = Context::full(&runtime).map_err(|e| CompileError::Toolchain(e.to_string()))?;

    context.with(|ctx| {
        let module = Module::declare(ctx.clone(), unit_name, source)
            .catch(&ctx)
            .map_err(|caught| {
                let diagnostic = diagnostics::from_caught(caught, unit_name, source);
                warn!(
                    operation = "compile",
                    status = "error",
                    unit = unit_name,
                    "{}",
                    diagnostic
                );
                CompileError::Diagnostics(vec![diagnostic])
            })?;

        module
            .write(false)
            .map_err(|e| CompileError::Toolchain(e.to_string()))
    })
}
