//! Script compilation and `require` rewriting.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::info;

use super::sourcemap::append_inline;
use super::{UnitContext, UnitDriver};
use crate::cache::{CacheEntry, CacheKey, CopyDependency};
use crate::error::BuildResult;
use crate::paths::require_path;
use crate::resolver::Resolved;
use crate::toolchain::{OutputKind, PluginInput};
use crate::unit::SourceUnit;

static REQUIRE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)(^|[^.\w$])require\(\s*['"]([\w\-./@]+)['"]\s*\)"#).expect("valid regex")
});
static DEFAULT_EXPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"exports\.default\s*=\s*(\w+);").expect("valid regex"));

/// Runtime registration appended to compiled page and app scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    None,
    /// A page, with its path relative to the entry unit's directory.
    Page { path: String },
    /// The app entry, with the configured app options.
    App { options: Value },
}

impl Registration {
    /// Replace the `exports.default = X;` assignment with a registration call.
    pub fn apply(&self, code: &str, runtime: &str) -> String {
        if *self == Registration::None {
            return code.to_string();
        }
        DEFAULT_EXPORT_RE
            .replace_all(code, |caps: &Captures<'_>| {
                let export = &caps[1];
                if export == "undefined" {
                    return String::new();
                }
                match self {
                    Registration::Page { path } => format!(
                        "\nPage(require('{runtime}').default.$createPage({export} , '{path}'));\n"
                    ),
                    Registration::App { options } => format!(
                        "\nApp(require('{runtime}').default.$createApp({export}, {options}));\n"
                    ),
                    Registration::None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// Inline `process.env.NODE_ENV` as a string literal.
pub fn rewrite_node_env(code: &str, node_env: Option<&str>) -> String {
    let literal = match node_env {
        Some(value) => Value::from(value).to_string(),
        None => "undefined".to_string(),
    };
    code.replace("process.env.NODE_ENV", &literal)
}

/// One script to compile.
#[derive(Debug)]
pub(crate) struct ScriptJob<'a> {
    pub unit: &'a SourceUnit,
    pub code: String,
    pub lang: String,
    /// File the code came from: the unit or a linked section file.
    pub origin: &'a Path,
    pub target: PathBuf,
    pub registration: Registration,
}

impl UnitDriver {
    pub(crate) async fn compile_script_unit(
        &self,
        unit: &SourceUnit,
        ctx: &mut UnitContext,
    ) -> BuildResult<()> {
        let lang = match unit.path().extension().and_then(|e| e.to_str()) {
            Some("ts") => "typescript",
            _ if unit.is_npm() => "js",
            _ => self.toolchain.compilers.script_lang(),
        };
        let target = match unit.package() {
            Some(package) => self.params().npm_output_path(package, unit.path()),
            None => self.params().script_output_path(unit.path()),
        };
        let job = ScriptJob {
            unit,
            code: unit.content()?.to_string(),
            lang: lang.to_string(),
            origin: unit.path(),
            target,
            registration: Registration::None,
        };
        self.compile_script(job, ctx).await
    }

    pub(crate) async fn compile_script(
        &self,
        job: ScriptJob<'_>,
        ctx: &mut UnitContext,
    ) -> BuildResult<()> {
        let params = self.params();
        let code = if job.unit.is_npm() {
            rewrite_node_env(&job.code, params.node_env.as_deref())
        } else {
            job.code
        };

        let key = CacheKey::compute(params.salt(), &job.target, code.as_bytes());
        if let Some(entry) = self.cached(&key) {
            ctx.from_cache = true;
            return self.replay(entry, ctx);
        }

        let compiled = self
            .toolchain
            .compilers
            .compile(&job.lang, &code, job.origin)
            .await?;
        let code = job.registration.apply(&compiled.code, &params.config.runtime);
        let (mut code, deps, requires) = self.rewrite_requires(job.unit, &code, &job.target, ctx)?;
        if let Some(map) = compiled.source_map {
            append_inline(&mut code, map, &job.target);
        }

        let kind = if job.unit.is_npm() {
            OutputKind::Npm
        } else {
            OutputKind::Script
        };
        let output = self.toolchain.plugins.apply(PluginInput {
            kind,
            file: job.origin.to_path_buf(),
            output: job.target,
            code: Some(code),
        })?;

        let entry = CacheEntry::new(output.code.unwrap_or_default(), output.output, deps)
            .with_requires(requires);
        self.store(&key, &entry);
        self.toolchain.writer.write(&entry.target, entry.code.as_bytes())?;
        info!(unit = %job.origin.display(), lang = %job.lang, "compile");
        Ok(())
    }

    /// Resolve every `require` and point it at the resolved output, relative
    /// to the directory `target` is written to.
    ///
    /// Package files go through the copy gate; stubbed references become `{}`.
    fn rewrite_requires(
        &self,
        unit: &SourceUnit,
        code: &str,
        target: &Path,
        ctx: &mut UnitContext,
    ) -> BuildResult<(String, Vec<CopyDependency>, Vec<PathBuf>)> {
        let out_dir = target.parent().unwrap_or(Path::new("/"));
        let mut rewritten = String::with_capacity(code.len());
        let mut deps: Vec<CopyDependency> = Vec::new();
        let mut requires: Vec<PathBuf> = Vec::new();
        let mut last = 0;

        for caps in REQUIRE_RE.captures_iter(code) {
            let (Some(call), Some(reference)) = (caps.get(0), caps.get(2)) else {
                continue;
            };
            let start = caps.get(1).map_or(call.start(), |m| m.end());
            rewritten.push_str(&code[last..start]);
            last = call.end();

            match self.session.resolver().resolve(reference.as_str(), unit)? {
                Resolved::Empty => rewritten.push_str("{}"),
                Resolved::File(file) => {
                    rewritten.push_str("require('");
                    rewritten.push_str(&require_path(out_dir, &file.target));
                    rewritten.push_str("')");
                    match file.package {
                        Some(package) => {
                            let dep = CopyDependency {
                                source: file.source,
                                package,
                            };
                            self.claim(&dep, ctx)?;
                            if !deps.contains(&dep) {
                                deps.push(dep);
                            }
                        }
                        None => {
                            ctx.depend(&file.source);
                            if !requires.contains(&file.source) {
                                requires.push(file.source);
                            }
                        }
                    }
                }
            }
        }
        rewritten.push_str(&code[last..]);
        Ok((rewritten, deps, requires))
    }
}
