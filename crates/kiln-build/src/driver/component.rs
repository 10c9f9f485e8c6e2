//! Single-file components: one script, template, style and config output
//! per component.

use serde_json::Value;
use tracing::info;

use super::script::{Registration, ScriptJob};
use super::{UnitContext, UnitDriver};
use crate::cache::{CacheEntry, CacheKey};
use crate::error::{BuildError, BuildResult};
use crate::graph::UnitRole;
use crate::paths::{relative_path, to_slash};
use crate::toolchain::{OutputKind, PluginInput, Section};
use crate::unit::SourceUnit;

const TEMPLATE_LANG: &str = "wxml";
const STYLE_LANG: &str = "css";

impl UnitDriver {
    pub(crate) async fn compile_component(
        &self,
        unit: &SourceUnit,
        ctx: &mut UnitContext,
    ) -> BuildResult<()> {
        let sections = self.toolchain.parser.parse(unit)?;
        for link in sections.links() {
            ctx.depend(link);
        }
        let config = &self.params().config;
        let compilers = &self.toolchain.compilers;

        if let Some(script) = &sections.script {
            let job = ScriptJob {
                unit,
                code: script.code()?,
                lang: script.lang_or(compilers.script_lang()).to_string(),
                origin: script.origin(unit.path()),
                target: self.output_for(unit, "js"),
                registration: self.registration(unit),
            };
            self.compile_script(job, ctx).await?;
        }

        if let Some(template) = &sections.template {
            let compiled = compilers
                .compile(
                    template.lang_or(TEMPLATE_LANG),
                    &template.code()?,
                    template.origin(unit.path()),
                )
                .await?;
            let target = self.output_for(unit, &config.template_ext);
            self.toolchain.writer.write(&target, compiled.code.as_bytes())?;
        }

        if !sections.styles.is_empty() {
            let mut sheets = Vec::with_capacity(sections.styles.len());
            for style in &sections.styles {
                let compiled = compilers
                    .compile(
                        style.lang_or(STYLE_LANG),
                        &style.code()?,
                        style.origin(unit.path()),
                    )
                    .await?;
                sheets.push(compiled.code);
            }
            let target = self.output_for(unit, &config.style_ext);
            self.toolchain.writer.write(&target, sheets.join("\n").as_bytes())?;
        }

        if let Some(section) = &sections.config {
            self.compile_config(unit, section, ctx)?;
        }
        Ok(())
    }

    /// Page path relative to the entry unit's directory, without extension.
    fn page_path(&self, unit: &SourceUnit) -> String {
        let params = self.params();
        let entry = params.entry_path();
        let entry_dir = entry.parent().unwrap_or(&params.root);
        let name = unit
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = name
            .strip_suffix(params.config.component_ext.as_str())
            .unwrap_or(&name);
        to_slash(&relative_path(entry_dir, unit.dir()).join(stem))
    }

    fn registration(&self, unit: &SourceUnit) -> Registration {
        if unit.is_npm() {
            return Registration::None;
        }
        match UnitRole::classify(self.params(), unit.path()) {
            UnitRole::Entry => Registration::App {
                options: self.params().config.app_config.clone(),
            },
            UnitRole::Page => Registration::Page {
                path: self.page_path(unit),
            },
            _ => Registration::None,
        }
    }

    /// The `<config>` block, validated and written as `<name>.json` through
    /// the result store.
    fn compile_config(
        &self,
        unit: &SourceUnit,
        section: &Section,
        ctx: &mut UnitContext,
    ) -> BuildResult<()> {
        let origin = section.origin(unit.path());
        let code = section.code()?;
        let target = self.output_for(unit, "json");

        let key = CacheKey::compute(self.params().salt(), &target, code.as_bytes());
        if let Some(entry) = self.cached(&key) {
            return self.replay(entry, ctx);
        }

        let value: Value = if code.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&code)
                .map_err(|e| BuildError::compile(origin, format!("invalid config JSON: {e}")))?
        };
        let text = serde_json::to_string_pretty(&value)
            .map_err(|e| BuildError::compile(origin, e.to_string()))?;
        let output = self.toolchain.plugins.apply(PluginInput {
            kind: OutputKind::Config,
            file: origin.to_path_buf(),
            output: target,
            code: Some(text),
        })?;

        let entry = CacheEntry::new(output.code.unwrap_or_default(), output.output, Vec::new());
        self.store(&key, &entry);
        self.toolchain.writer.write(&entry.target, entry.code.as_bytes())?;
        info!(unit = %origin.display(), "config");
        Ok(())
    }
}
