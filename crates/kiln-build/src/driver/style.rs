//! Standalone style sheets.

use tracing::info;

use super::UnitDriver;
use crate::error::BuildResult;
use crate::unit::SourceUnit;

impl UnitDriver {
    /// Compile a style sheet with the compiler named by its extension.
    pub(crate) async fn compile_style_unit(&self, unit: &SourceUnit) -> BuildResult<()> {
        let lang = unit
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("css");
        let lang = if self.toolchain.compilers.has(lang) { lang } else { "css" };
        let code = unit.content()?;
        let compiled = self
            .toolchain
            .compilers
            .compile(lang, &code, unit.path())
            .await?;

        let target = self.output_for(unit, &self.params().config.style_ext);
        self.toolchain.writer.write(&target, compiled.code.as_bytes())?;
        info!(unit = %unit.path().display(), lang, "compile");
        Ok(())
    }
}
