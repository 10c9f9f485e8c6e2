#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kiln_build::toolchain::{CompileOutput, CompileRequest, CompilerRegistry, LanguageCompiler};
use kiln_build::{
    BuildParams, Builder, InProcessTransport, Toolchain, ToolchainFactory,
};
use kiln_config::KilnConfig;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Passthrough compiler driven by markers in the code:
/// `@fail` rejects, `@panic` panics, `@slow` sleeps first.
#[derive(Debug)]
pub struct Scripted;

#[async_trait]
impl LanguageCompiler for Scripted {
    async fn compile(&self, request: CompileRequest<'_>) -> Result<CompileOutput, String> {
        if request.code.contains("@slow") {
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        if request.code.contains("@panic") {
            panic!("compiler crashed on {}", request.file.display());
        }
        if request.code.contains("@fail") {
            return Err("scripted failure".to_string());
        }
        Ok(CompileOutput::code(request.code))
    }
}

pub fn scripted_factory() -> ToolchainFactory {
    Arc::new(|params: &BuildParams| {
        let mut compilers = CompilerRegistry::from_config(&params.config)?;
        compilers.register("js", Arc::new(Scripted));
        Ok(Toolchain::from_params(params)?.with_compilers(compilers))
    })
}

pub struct Project {
    _dir: TempDir,
    pub root: PathBuf,
    pub config: KilnConfig,
}

impl Project {
    /// Empty project with the runtime and one package installed.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let mut config = KilnConfig::default();
        config.workers.idle_window_ms = 300;
        config.workers.pool_size = Some(2);
        let project = Self {
            _dir: dir,
            root,
            config,
        };
        project.write("node_modules/wepy/package.json", r#"{ "main": "lib/wepy.js" }"#);
        project.write("node_modules/wepy/lib/wepy.js", "module.exports = {};");
        project.write("node_modules/lodash/package.json", r#"{ "main": "lodash.js" }"#);
        project.write(
            "node_modules/lodash/lodash.js",
            "require('./_base');\nmodule.exports = process.env.NODE_ENV;",
        );
        project.write("node_modules/lodash/_base.js", "module.exports = {};");
        project
    }

    /// `app` plus the pages `home` and `profile`; `profile` imports `utils`.
    pub fn app() -> Self {
        let project = Self::new();
        project.write(
            "src/app.wpy",
            "<script>exports.default = App;</script>\n<config>{ \"pages\": [\"pages/home\", \"pages/profile\"] }</config>",
        );
        project.write(
            "src/pages/home.wpy",
            "<template><view>home</view></template>\n<script>\nvar _ = require('lodash');\nexports.default = Home;\n</script>",
        );
        project.write(
            "src/pages/profile.wpy",
            "<template><view>profile</view></template>\n<script>\nvar _ = require('lodash');\nvar utils = require('../utils');\nexports.default = Profile;\n</script>",
        );
        project.write("src/utils.js", "module.exports = { now: 1 };");
        project
    }

    pub fn write(&self, path: &str, content: &str) {
        let path = self.root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn src(&self, path: &str) -> PathBuf {
        self.root.join("src").join(path)
    }

    pub fn dist(&self, path: &str) -> PathBuf {
        self.root.join("dist").join(path)
    }

    pub fn params(&self) -> BuildParams {
        BuildParams::new(&self.root, self.config.clone())
            .with_node_env(Some("production".to_string()))
    }

    pub fn builder(&self) -> (Builder, InProcessTransport) {
        let transport = InProcessTransport::new(scripted_factory());
        let builder = Builder::new(
            self.params(),
            scripted_factory(),
            Arc::new(transport.clone()),
        )
        .unwrap();
        (builder, transport)
    }

    pub fn outputs(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(self.root.join("dist"))
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }
}

/// Poll `check` until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
