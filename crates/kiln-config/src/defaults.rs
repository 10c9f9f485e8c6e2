//! Default values used by serde for missing configuration fields.

use std::path::PathBuf;

pub fn default_src() -> PathBuf {
    PathBuf::from("src")
}

pub fn default_target() -> PathBuf {
    PathBuf::from("dist")
}

pub fn default_component_ext() -> String {
    ".wpy".to_string()
}

pub fn default_output() -> String {
    "weapp".to_string()
}

pub fn default_cache() -> bool {
    true
}

pub fn default_components_dir() -> String {
    "components".to_string()
}

pub fn default_npm_dir() -> String {
    "npm".to_string()
}

pub fn default_runtime() -> String {
    "wepy".to_string()
}

pub fn default_template_ext() -> String {
    "wxml".to_string()
}

pub fn default_style_ext() -> String {
    "wxss".to_string()
}

pub fn default_modules() -> Vec<String> {
    vec!["node_modules".to_string()]
}

pub fn default_fields() -> Vec<String> {
    vec!["browser".to_string()]
}

pub fn default_debounce_ms() -> u64 {
    500
}

pub fn default_idle_window_ms() -> u64 {
    20_000
}

pub fn default_app_config() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
