//! Inline source maps.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

const PREFIX: &str = "//# sourceMappingURL=data:application/json;charset=utf-8;base64,";

/// Append `map` to `code` as an inline `sourceMappingURL` comment.
///
/// `sources` and `file` are pointed at the output script name.
pub fn append_inline(code: &mut String, mut map: Value, output: &Path) {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Value::Object(fields) = &mut map {
        fields.insert("sources".to_string(), Value::from(vec![name.clone()]));
        fields.insert("file".to_string(), Value::from(name));
    }
    let encoded = STANDARD.encode(map.to_string());
    code.push_str("\r\n");
    code.push_str(PREFIX);
    code.push_str(&encoded);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appends_base64_comment() {
        let mut code = "var a;".to_string();
        append_inline(
            &mut code,
            json!({ "version": 3, "mappings": "AAAA", "sources": ["x"] }),
            Path::new("/dist/pages/home.js"),
        );
        let (head, encoded) = code.split_once(PREFIX).unwrap();
        assert_eq!(head, "var a;\r\n");

        let decoded: Value = serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded["sources"], json!(["home.js"]));
        assert_eq!(decoded["file"], "home.js");
        assert_eq!(decoded["mappings"], "AAAA");
    }
}
