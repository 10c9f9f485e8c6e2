use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use kiln_config::{KilnConfig, PluginSpec};
use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::cache::{ContentStore, MemoryStore};
use crate::error::BuildError;
use crate::resolver::FsManifestReader;
use crate::toolchain::{
    CompileOutput, CompileRequest, CompilerRegistry, LanguageCompiler, MemoryWriter, PluginCatalog,
    PluginChain, SfcParser,
};

const HOME: &str = r#"
<template><view>{{ name }}</view></template>
<script>
var _ = require('lodash');
var utils = require('../utils');
var stub = require('false');
exports.default = Home;
</script>
<style>.a { color: red; }</style>
<style lang="css" src="./home.css"></style>
<config>{ "navigationBarTitleText": "Home" }</config>
"#;

struct Project {
    _dir: TempDir,
    root: PathBuf,
    store: Arc<MemoryStore>,
    writer: Arc<MemoryWriter>,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let files: &[(&str, &str)] = &[
            ("src/app.wpy", "<script>exports.default = App;</script>"),
            ("src/pages/home.wpy", HOME),
            ("src/pages/home.css", ".b { margin: 0; }"),
            ("src/utils.js", "module.exports = 1;"),
            ("src/img/logo.png", "PNG"),
            ("src/styles/main.less", "@a: 1;"),
            ("src/broken.js", "var x = require('not-installed');"),
            ("node_modules/lodash/package.json", r#"{ "name": "lodash", "main": "lodash.js" }"#),
            (
                "node_modules/lodash/lodash.js",
                "var base = require('./_base');\nmodule.exports = process.env.NODE_ENV;",
            ),
            ("node_modules/lodash/_base.js", "module.exports = {};"),
            ("node_modules/wepy/package.json", r#"{ "name": "wepy", "main": "lib/wepy.js" }"#),
            ("node_modules/wepy/lib/wepy.js", "module.exports = {};"),
        ];
        for (path, content) in files {
            let path = root.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        Self {
            _dir: dir,
            root,
            store: Arc::new(MemoryStore::new()),
            writer: Arc::new(MemoryWriter::new()),
        }
    }

    fn driver_with(&self, config: KilnConfig, compilers: CompilerRegistry) -> UnitDriver {
        let params = Arc::new(
            BuildParams::new(&self.root, config).with_node_env(Some("production".to_string())),
        );
        let plugins =
            PluginChain::from_config(&params.config.plugins, &PluginCatalog::builtin()).unwrap();
        let manifests = Arc::new(FsManifestReader::new());
        let toolchain = Toolchain {
            parser: Arc::new(SfcParser),
            compilers: Arc::new(compilers),
            plugins: Arc::new(plugins),
            manifests: manifests.clone(),
            store: self.store.clone(),
            writer: self.writer.clone(),
        };
        let session = Arc::new(BuildSession::new(params, manifests, true));
        UnitDriver::new(session, toolchain)
    }

    fn driver(&self) -> UnitDriver {
        self.driver_with(KilnConfig::default(), CompilerRegistry::new())
    }

    fn src(&self, path: &str) -> PathBuf {
        self.root.join("src").join(path)
    }

    fn dist(&self, path: &str) -> PathBuf {
        self.root.join("dist").join(path)
    }

    fn output(&self, path: &str) -> String {
        self.writer
            .get(&self.dist(path))
            .unwrap_or_else(|| panic!("no output at {path}"))
    }
}

#[derive(Debug)]
struct Failing;

#[async_trait]
impl LanguageCompiler for Failing {
    async fn compile(&self, _request: CompileRequest<'_>) -> Result<CompileOutput, String> {
        Err("Unexpected token (1:4)".to_string())
    }
}

#[derive(Debug)]
struct WithMap;

#[async_trait]
impl LanguageCompiler for WithMap {
    async fn compile(&self, request: CompileRequest<'_>) -> Result<CompileOutput, String> {
        Ok(CompileOutput {
            code: request.code.to_string(),
            source_map: Some(json!({ "version": 3, "mappings": "" })),
        })
    }
}

#[tokio::test]
async fn page_component_writes_every_output() {
    let project = Project::new();
    let driver = project.driver();

    let outcome = driver.compile(&project.src("pages/home.wpy")).await.unwrap();
    assert!(!outcome.from_cache);
    // lodash.js, _base.js and the runtime
    assert_eq!(outcome.copied, 3);
    assert!(outcome.dependencies.contains(&project.src("utils.js")));
    assert!(outcome.dependencies.contains(&project.src("pages/home.css")));

    let script = project.output("pages/home.js");
    assert!(script.contains("require('../npm/lodash/lodash.js')"));
    assert!(script.contains("require('../utils.js')"));
    assert!(script.contains("var stub = {};"));
    assert!(script.contains("Page(require('../npm/wepy/lib/wepy.js').default.$createPage(Home , 'pages/home'))"));

    assert_eq!(project.output("pages/home.wxml"), "<view>{{ name }}</view>");
    assert_eq!(
        project.output("pages/home.wxss"),
        ".a { color: red; }\n.b { margin: 0; }"
    );
    assert!(project.output("pages/home.json").contains("\"navigationBarTitleText\": \"Home\""));

    let lodash = project.output("npm/lodash/lodash.js");
    assert!(lodash.contains("require('./_base.js')"));
    assert!(lodash.contains("module.exports = \"production\";"));
    assert_eq!(project.output("npm/lodash/_base.js"), "module.exports = {};");
}

#[tokio::test]
async fn entry_registers_app_with_options() {
    let project = Project::new();
    let mut config = KilnConfig::default();
    config.app_config = json!({ "noPromiseAPI": ["request"] });
    let driver = project.driver_with(config, CompilerRegistry::new());

    driver.compile(&project.src("app.wpy")).await.unwrap();
    assert!(project.output("app.js").contains(r#"$createApp(App, {"noPromiseAPI":["request"]})"#));
}

#[tokio::test]
async fn cache_hit_replays_copy_obligations() {
    let project = Project::new();
    let home = project.src("pages/home.wpy");

    let first = project.driver().compile(&home).await.unwrap();
    assert!(!first.from_cache);

    // Same session: packages are up to date, nothing is copied again.
    let driver = project.driver();
    let warm = driver.compile(&home).await.unwrap();
    assert!(warm.from_cache);
    assert_eq!(warm.copied, 3);
    let again = driver.compile(&home).await.unwrap();
    assert!(again.from_cache);
    assert_eq!(again.copied, 0);
    assert!(again.dependencies.contains(&project.src("utils.js")));
}

#[tokio::test]
async fn corrupt_entries_are_recompiled() {
    let project = Project::new();
    let driver = project.driver();
    let utils = project.src("utils.js");

    let params = driver.session().params();
    let key = CacheKey::compute(params.salt(), &project.dist("utils.js"), b"module.exports = 1;");
    project.store.put_raw(&key, b"not bincode".to_vec());

    let outcome = driver.compile(&utils).await.unwrap();
    assert!(!outcome.from_cache);
    assert_eq!(project.output("utils.js"), "module.exports = 1;");
    assert!(project.store.get(&key).is_ok());
}

#[tokio::test]
async fn disabled_cache_never_hits() {
    let project = Project::new();
    let mut config = KilnConfig::default();
    config.cache = false;
    let utils = project.src("utils.js");

    project.driver_with(config.clone(), CompilerRegistry::new()).compile(&utils).await.unwrap();
    let second = project
        .driver_with(config, CompilerRegistry::new())
        .compile(&utils)
        .await
        .unwrap();
    assert!(!second.from_cache);
    assert!(project.store.is_empty());
}

#[tokio::test]
async fn compiler_rejection_names_the_unit() {
    let project = Project::new();
    let mut compilers = CompilerRegistry::new();
    compilers.register("js", Arc::new(Failing));
    let driver = project.driver_with(KilnConfig::default(), compilers);

    match driver.compile(&project.src("utils.js")).await {
        Err(BuildError::Compile { unit, diagnostic }) => {
            assert_eq!(unit, project.src("utils.js"));
            assert!(diagnostic.contains("Unexpected token"));
        }
        other => panic!("expected compile error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_package_is_module_not_found() {
    let project = Project::new();
    let err = project
        .driver()
        .compile(&project.src("broken.js"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BuildError::ModuleNotFound { ref reference, ref from }
            if reference == "not-installed" && from == &project.src("broken.js")
    ));
}

#[tokio::test]
async fn source_maps_are_inlined() {
    let project = Project::new();
    let mut compilers = CompilerRegistry::new();
    compilers.register("js", Arc::new(WithMap));
    let driver = project.driver_with(KilnConfig::default(), compilers);

    driver.compile(&project.src("utils.js")).await.unwrap();
    assert!(
        project
            .output("utils.js")
            .contains("//# sourceMappingURL=data:application/json;charset=utf-8;base64,")
    );
}

#[tokio::test]
async fn assets_copy_or_transform() {
    let project = Project::new();
    project.driver().compile(&project.src("img/logo.png")).await.unwrap();
    assert_eq!(project.output("img/logo.png"), "PNG");

    let mut config = KilnConfig::default();
    config.plugins = vec![PluginSpec {
        name: "banner".to_string(),
        options: json!({ "text": "/* kiln */" }),
    }];
    let driver = project.driver_with(config, CompilerRegistry::new());
    driver.compile(&project.src("utils.js")).await.unwrap();
    assert_eq!(project.output("utils.js"), "/* kiln */\nmodule.exports = 1;");
}

#[tokio::test]
async fn styles_compile_by_extension() {
    let project = Project::new();
    let mut compilers = CompilerRegistry::new();
    compilers.register("less", Arc::new(crate::toolchain::Passthrough));
    let driver = project.driver_with(KilnConfig::default(), compilers);

    driver.compile(&project.src("styles/main.less")).await.unwrap();
    assert_eq!(project.output("styles/main.wxss"), "@a: 1;");
}
