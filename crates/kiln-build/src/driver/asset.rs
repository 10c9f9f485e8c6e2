//! Files with no compiler: run through the plugin chain, else copied.

use tracing::{debug, warn};

use super::UnitDriver;
use crate::error::BuildResult;
use crate::toolchain::{OutputKind, PluginInput};
use crate::unit::SourceUnit;

impl UnitDriver {
    pub(crate) fn compile_asset(&self, unit: &SourceUnit) -> BuildResult<()> {
        let target = self.params().output_path(unit.path(), None);
        let input = PluginInput {
            kind: OutputKind::Asset,
            file: unit.path().to_path_buf(),
            output: target.clone(),
            code: None,
        };

        match self.toolchain.plugins.apply(input) {
            Ok(PluginInput {
                code: Some(code),
                output,
                ..
            }) => {
                self.toolchain.writer.write(&output, code.as_bytes())?;
                debug!(unit = %unit.path().display(), "asset transformed");
            }
            Ok(_) => self.toolchain.writer.copy(unit.path(), &target)?,
            Err(e) => {
                warn!(unit = %unit.path().display(), error = %e, "plugin failed, copying asset verbatim");
                self.toolchain.writer.copy(unit.path(), &target)?;
            }
        }
        Ok(())
    }
}
