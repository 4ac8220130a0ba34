//! Default imports shared by every compiled script
//!
//! The set is built once per process and never changes afterwards. The
//! compiler prepends its import header to each composed source, and each
//! loaded module runtime installs a resolver/loader pair serving the same
//! host modules.

use rquickjs::loader::{BuiltinLoader, BuiltinResolver};
use rquickjs::Runtime;
use std::sync::LazyLock;

/// A JS module provided by the host under a fixed specifier
#[derive(Debug)]
pub struct HostModule {
    pub specifier: &'static str,
    pub exports: &'static [&'static str],
    pub source: &'static str,
}

#[derive(Debug)]
pub struct DefaultImports {
    modules: Vec<HostModule>,
    header: String,
}

pub static DEFAULT_IMPORTS: LazyLock<DefaultImports> = LazyLock::new(DefaultImports::builtin);

impl DefaultImports {
    fn builtin() -> Self {
        Self::from_modules(vec![HostModule {
            specifier: "rowscript:math",
            exports: &["round", "clamp", "sum", "avg"],
            source: include_str!("../templates/math.js"),
        }])
    }

    fn from_modules(modules: Vec<HostModule>) -> Self {
        let header = modules
            .iter()
            .map(|module| {
                format!(
                    "import {{ {} }} from \"{}\";\n",
                    module.exports.join(", "),
                    module.specifier
                )
            })
            .collect();

        Self { modules, header }
    }

    /// Import statements prepended to every composed source
    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn modules(&self) -> &[HostModule] {
        &self.modules
    }

    /// Make the host modules resolvable from scripts loaded into `runtime`
    pub(crate) fn install(&self, runtime: &Runtime) {
        let mut resolver = BuiltinResolver::default();
        let mut loader = BuiltinLoader::default();
        for module in &self.modules {
            resolver = resolver.with_module(module.specifier);
            loader = loader.with_module(module.specifier, module.source);
        }
        runtime.set_loader(resolver, loader);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_imports_every_export() {
        assert_eq!(
            DEFAULT_IMPORTS.header(),
            "import { round, clamp, sum, avg } from \"rowscript:math\";\n"
        );
    }

    #[test]
    fn test_header_is_stable() {
        let first = DEFAULT_IMPORTS.header().to_string();
        assert_eq!(first, DEFAULT_IMPORTS.header());
        assert_eq!(DEFAULT_IMPORTS.modules().len(), 1);
    }

    #[test]
    fn test_empty_set_has_empty_header() {
        assert_eq!(DefaultImports::from_modules(Vec::new()).header(), "");
    }
}
