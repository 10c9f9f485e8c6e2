//! Language compilers.
//!
//! The engine treats a compiler as an opaque async transform from code to
//! code plus an optional source map. Compilers are looked up by language name
//! in a [`CompilerRegistry`] filled once at startup.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use kiln_config::{KilnConfig, PASSTHROUGH_LANGS};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{BuildError, BuildResult};

#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub code: &'a str,
    pub lang: &'a str,
    pub file: &'a Path,
    pub options: &'a Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutput {
    pub code: String,
    pub source_map: Option<Value>,
}

impl CompileOutput {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            source_map: None,
        }
    }
}

#[async_trait]
pub trait LanguageCompiler: Send + Sync + fmt::Debug {
    /// Compile one block of code. Errors are compiler diagnostics.
    async fn compile(&self, request: CompileRequest<'_>) -> Result<CompileOutput, String>;
}

/// Returns the code unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

#[async_trait]
impl LanguageCompiler for Passthrough {
    async fn compile(&self, request: CompileRequest<'_>) -> Result<CompileOutput, String> {
        Ok(CompileOutput::code(request.code))
    }
}

/// Pipes code through an external command: stdin in, stdout out.
///
/// Configured as `{ command = ["npx", "babel", "--filename", "{file}"] }`;
/// `{file}` is replaced by the source path.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from compiler options; `None` when no `command` is configured.
    pub fn from_options(lang: &str, options: &Value) -> BuildResult<Option<Self>> {
        let Some(command) = options.get("command") else {
            return Ok(None);
        };
        let parts: Vec<String> = match command {
            Value::String(line) => line.split_whitespace().map(str::to_string).collect(),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<_>>()
                .ok_or_else(|| {
                    BuildError::Config(format!("compilers.{lang}.command must hold strings"))
                })?,
            _ => {
                return Err(BuildError::Config(format!(
                    "compilers.{lang}.command must be a string or an array"
                )));
            }
        };
        let mut parts = parts.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| BuildError::Config(format!("compilers.{lang}.command is empty")))?;
        Ok(Some(Self::new(program, parts.collect())))
    }
}

#[async_trait]
impl LanguageCompiler for CommandCompiler {
    async fn compile(&self, request: CompileRequest<'_>) -> Result<CompileOutput, String> {
        let file = request.file.to_string_lossy();
        let args: Vec<String> = self.args.iter().map(|a| a.replace("{file}", &file)).collect();

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("cannot run `{}`: {e}", self.program))?;

        // Feed stdin while stdout drains; the child blocks once its pipe is full.
        let stdin = child.stdin.take();
        let code = request.code.as_bytes();
        let write = async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(code).await,
                None => Ok(()),
            }
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());

        let output = output.map_err(|e| format!("`{}` failed: {e}", self.program))?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        written.map_err(|e| format!("cannot write to `{}`: {e}", self.program))?;
        Ok(CompileOutput::code(String::from_utf8_lossy(&output.stdout)))
    }
}

#[derive(Debug, Clone)]
pub struct CompilerRegistry {
    compilers: FxHashMap<String, Arc<dyn LanguageCompiler>>,
    options: BTreeMap<String, Value>,
}

impl Default for CompilerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerRegistry {
    /// Registry holding passthrough compilers for the built-in languages.
    pub fn new() -> Self {
        let passthrough: Arc<dyn LanguageCompiler> = Arc::new(Passthrough);
        let compilers = PASSTHROUGH_LANGS
            .iter()
            .map(|lang| (lang.to_string(), passthrough.clone()))
            .collect();
        Self {
            compilers,
            options: BTreeMap::new(),
        }
    }

    /// Registry for `config.compilers`.
    ///
    /// Entries with a `command` become [`CommandCompiler`]s. Any other
    /// configured name must already be registered, so embedders register
    /// their compilers first and call [`CompilerRegistry::configure`].
    pub fn from_config(config: &KilnConfig) -> BuildResult<Self> {
        let mut registry = Self::new();
        registry.configure(config)?;
        Ok(registry)
    }

    pub fn configure(&mut self, config: &KilnConfig) -> BuildResult<()> {
        for (lang, options) in &config.compilers {
            if let Some(command) = CommandCompiler::from_options(lang, options)? {
                self.register(lang.clone(), Arc::new(command));
            }
            if !self.compilers.contains_key(lang) {
                return Err(BuildError::UnknownCapability {
                    kind: "compiler",
                    name: lang.clone(),
                });
            }
            self.options.insert(lang.clone(), options.clone());
        }
        Ok(())
    }

    pub fn register(&mut self, lang: impl Into<String>, compiler: Arc<dyn LanguageCompiler>) {
        self.compilers.insert(lang.into(), compiler);
    }

    pub fn has(&self, lang: &str) -> bool {
        self.compilers.contains_key(lang)
    }

    pub fn get(&self, lang: &str) -> BuildResult<Arc<dyn LanguageCompiler>> {
        self.compilers
            .get(lang)
            .cloned()
            .ok_or_else(|| BuildError::UnknownCapability {
                kind: "compiler",
                name: lang.to_string(),
            })
    }

    pub fn options(&self, lang: &str) -> &Value {
        static EMPTY: Value = Value::Null;
        self.options.get(lang).unwrap_or(&EMPTY)
    }

    /// Language for plain scripts: `babel` when available, otherwise passthrough `js`.
    pub fn script_lang(&self) -> &'static str {
        if self.has("babel") { "babel" } else { "js" }
    }

    /// Compile with the compiler registered for `lang`.
    pub async fn compile(&self, lang: &str, code: &str, file: &Path) -> BuildResult<CompileOutput> {
        let compiler = self.get(lang)?;
        let request = CompileRequest {
            code,
            lang,
            file,
            options: self.options(lang),
        };
        compiler
            .compile(request)
            .await
            .map_err(|diagnostic| BuildError::compile(file, diagnostic))
    }
}
