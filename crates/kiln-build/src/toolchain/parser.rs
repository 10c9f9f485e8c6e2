//! Single-file component parsing.
//!
//! A component holds up to one `<script>`, one `<template>`, one `<config>`
//! and any number of `<style>` blocks. Each block is either inline or points
//! at another file through a `src` attribute.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{BuildResult, IoResultExt};
use crate::unit::SourceUnit;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionSource {
    Inline(String),
    /// Absolute path named by the block's `src` attribute.
    Link(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub lang: Option<String>,
    pub source: SectionSource,
    pub attrs: BTreeMap<String, String>,
}

impl Section {
    pub fn lang_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.lang.as_deref().unwrap_or(default)
    }

    pub fn link(&self) -> Option<&Path> {
        match &self.source {
            SectionSource::Link(path) => Some(path),
            SectionSource::Inline(_) => None,
        }
    }

    /// The block's code, reading the linked file when there is one.
    pub fn code(&self) -> BuildResult<String> {
        match &self.source {
            SectionSource::Inline(code) => Ok(code.clone()),
            SectionSource::Link(path) => fs::read_to_string(path).at(path),
        }
    }

    /// File the code belongs to, for diagnostics and source maps.
    pub fn origin<'a>(&'a self, component: &'a Path) -> &'a Path {
        self.link().unwrap_or(component)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentSections {
    pub script: Option<Section>,
    pub template: Option<Section>,
    pub styles: Vec<Section>,
    pub config: Option<Section>,
}

impl ComponentSections {
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.script
            .iter()
            .chain(self.template.iter())
            .chain(self.styles.iter())
            .chain(self.config.iter())
    }

    /// Files this component pulls in by reference.
    pub fn links(&self) -> Vec<&Path> {
        self.sections().filter_map(Section::link).collect()
    }
}

pub trait ComponentParser: Send + Sync + fmt::Debug {
    fn parse(&self, unit: &SourceUnit) -> BuildResult<ComponentSections>;
}

static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| block_regex("script", false));
static STYLE_RE: Lazy<Regex> = Lazy::new(|| block_regex("style", false));
static CONFIG_RE: Lazy<Regex> = Lazy::new(|| block_regex("config", false));
// Greedy: templates may nest `<template>` tags.
static TEMPLATE_RE: Lazy<Regex> = Lazy::new(|| block_regex("template", true));
static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([\w:@-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex"));
static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

fn block_regex(tag: &str, greedy: bool) -> Regex {
    let body = if greedy { ".*" } else { ".*?" };
    Regex::new(&format!(
        r"(?s)<{tag}(\s[^>]*?)?(?:/>|>({body})</{tag}\s*>)"
    ))
    .expect("valid regex")
}

/// Regex-based parser for the block layout above.
#[derive(Debug, Default, Clone, Copy)]
pub struct SfcParser;

impl SfcParser {
    pub fn parse_source(&self, path: &Path, source: &str) -> ComponentSections {
        let source = COMMENT_RE.replace_all(source, "");
        let dir = path.parent().unwrap_or(Path::new("/"));
        let blocks = |re: &Regex| -> Vec<Section> {
            re.captures_iter(&source)
                .map(|caps| {
                    let attrs = parse_attrs(caps.get(1).map_or("", |m| m.as_str()));
                    let body = caps.get(2).map_or("", |m| m.as_str());
                    section(dir, attrs, body)
                })
                .collect()
        };

        ComponentSections {
            script: blocks(&SCRIPT_RE).into_iter().next(),
            template: blocks(&TEMPLATE_RE).into_iter().next(),
            styles: blocks(&STYLE_RE),
            config: blocks(&CONFIG_RE).into_iter().next(),
        }
    }
}

impl ComponentParser for SfcParser {
    fn parse(&self, unit: &SourceUnit) -> BuildResult<ComponentSections> {
        let content = unit.content()?;
        Ok(self.parse_source(unit.path(), &content))
    }
}

fn parse_attrs(raw: &str) -> BTreeMap<String, String> {
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            (caps[1].to_string(), value.to_string())
        })
        .collect()
}

fn section(dir: &Path, attrs: BTreeMap<String, String>, body: &str) -> Section {
    let source = match attrs.get("src") {
        Some(src) if !src.is_empty() => SectionSource::Link(path_clean::clean(dir.join(src))),
        _ => SectionSource::Inline(body.trim_matches('\n').to_string()),
    };
    Section {
        lang: attrs.get("lang").cloned(),
        source,
        attrs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<!-- a comment with <script> inside -->
<template>
  <view>
    <template is="item" data="{{ item }}" />
  </view>
</template>

<script lang="babel">
import utils from '../utils'
export default class Profile {}
</script>

<style lang="less" src="./profile.less"></style>
<style>
.a { color: red; }
</style>

<config>
{ "navigationBarTitleText": "Profile" }
</config>
"#;

    #[test]
    fn parses_every_block() {
        let sections = SfcParser.parse_source(Path::new("/p/src/pages/profile.wpy"), PAGE);

        let script = sections.script.as_ref().unwrap();
        assert_eq!(script.lang_or("js"), "babel");
        assert!(script.code().unwrap().contains("import utils from '../utils'"));

        let template = sections.template.as_ref().unwrap().code().unwrap();
        assert!(template.contains(r#"<template is="item""#));
        assert!(template.trim_end().ends_with("</view>"));

        assert_eq!(sections.styles.len(), 2);
        assert_eq!(sections.styles[0].lang.as_deref(), Some("less"));
        assert_eq!(
            sections.styles[0].link(),
            Some(Path::new("/p/src/pages/profile.less"))
        );
        assert_eq!(sections.styles[1].lang_or("css"), "css");

        let config = sections.config.as_ref().unwrap().code().unwrap();
        assert!(config.contains("navigationBarTitleText"));
    }

    #[test]
    fn self_closing_script_with_src() {
        let sections = SfcParser.parse_source(
            Path::new("/p/src/components/list.wpy"),
            r#"<script src="../shared/list.js" />"#,
        );
        assert_eq!(
            sections.links(),
            vec![Path::new("/p/src/shared/list.js")]
        );
        assert!(sections.template.is_none());
    }

    #[test]
    fn empty_component_has_no_sections() {
        let sections = SfcParser.parse_source(Path::new("/p/a.wpy"), "");
        assert_eq!(sections, ComponentSections::default());
    }
}
