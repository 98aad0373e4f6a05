//! C4 — ToolOutputCompressor: schema-aware shrinking and size-threshold
//! externalization of `Tool` message payloads. Non-`Tool` messages pass
//! through untouched.

use std::sync::Arc;

use context_types::{ArtifactKey, ArtifactStore, ContentType, ExternalizedContent, Message};
use serde_json::Value;
use tracing::warn;

const TWO_KIB: usize = 2 * 1024;
const DEFAULT_THRESHOLD_BYTES: usize = 8 * 1024;

/// Parameters `ToolOutputCompressor::compress` is called with.
#[derive(Debug, Clone, Copy)]
pub struct ToolOutputCompressorConfig {
    /// Above this size, a tool payload is externalized rather than
    /// inline-compressed.
    pub threshold_bytes: usize,
}

impl Default for ToolOutputCompressorConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_THRESHOLD_BYTES,
        }
    }
}

/// Priority-ordered content-type detection over trimmed content.
fn detect_content_type(trimmed: &str) -> ContentType {
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(trimmed).is_ok()
    {
        return ContentType::Json;
    }
    if trimmed.contains("---") && (trimmed.contains(':') || trimmed.contains('-')) {
        return ContentType::Yaml;
    }
    if trimmed.contains("ERROR:") || trimmed.contains("Exception") || trimmed.contains("Traceback")
    {
        return ContentType::Error;
    }
    if trimmed.contains("INFO ") || trimmed.contains("DEBUG ") || trimmed.contains("WARN ") {
        return ContentType::Log;
    }
    if trimmed.starts_with("data:") || trimmed.contains("base64") {
        return ContentType::Binary;
    }
    ContentType::Text
}

fn short_summary(content_type: ContentType, content: &str) -> String {
    match content_type {
        ContentType::Json => format!("{} bytes of JSON", content.len()),
        ContentType::Yaml => format!("{} bytes of YAML", content.len()),
        ContentType::Log => format!("{} bytes of log output", content.len()),
        ContentType::Error => format!("{} bytes of error output", content.len()),
        ContentType::Binary => format!("{} bytes of binary data", content.len()),
        ContentType::Text => format!("{} bytes of text", content.len()),
    }
}

/// Recursively prune null/empty-string/empty-array fields, collapse long
/// arrays, and round large whole numbers.
fn prune_json(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let pruned: serde_json::Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| {
                    let v = prune_json(v);
                    let drop = matches!(&v, Value::Null)
                        || matches!(&v, Value::String(s) if s.is_empty())
                        || matches!(&v, Value::Array(a) if a.is_empty());
                    if drop { None } else { Some((k, v)) }
                })
                .collect();
            Value::Object(pruned)
        }
        Value::Array(items) => {
            let items: Vec<Value> = items.into_iter().map(prune_json).collect();
            if items.len() > 20 {
                let mut collapsed: Vec<Value> = items[..10].to_vec();
                collapsed.push(Value::String(format!("...[+{} items]...", items.len() - 20)));
                collapsed.extend_from_slice(&items[items.len() - 10..]);
                Value::Array(collapsed)
            } else {
                Value::Array(items)
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if i.unsigned_abs() > 1000 {
                    let rounded = (i / 1000) * 1000;
                    return Value::Number(rounded.into());
                }
            }
            Value::Number(n)
        }
        other => other,
    }
}

fn compress_json(content: &str) -> String {
    match serde_json::from_str::<Value>(content) {
        Ok(value) => {
            let pruned = prune_json(value);
            serde_json::to_string(&pruned).unwrap_or_else(|_| content.to_string())
        }
        Err(_) => compress_text(content),
    }
}

fn compress_log(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let kept: Vec<String> = if lines.len() > 120 {
        let dropped = lines.len() - 120;
        let mut out = Vec::with_capacity(80 + 40 + 1);
        out.extend(lines[..80].iter().map(|l| l.to_string()));
        out.push(format!("... [collapsed {dropped} repeated/verbose log lines] ..."));
        out.extend(lines[lines.len() - 40..].iter().map(|l| l.to_string()));
        out
    } else {
        lines.iter().map(|l| l.to_string()).collect()
    };

    let mut collapsed: Vec<String> = Vec::with_capacity(kept.len());
    let mut i = 0;
    while i < kept.len() {
        let line = &kept[i];
        let mut run = 1;
        while i + run < kept.len() && kept[i + run] == *line {
            run += 1;
        }
        if run > 1 {
            collapsed.push(format!("{line} \u{d7}{run}"));
        } else {
            collapsed.push(line.clone());
        }
        i += run;
    }
    collapsed.join("\n")
}

fn is_stack_frame(line: &str) -> bool {
    line.trim_start().starts_with("at ")
        || line.contains(".java:")
        || line.contains(".scala:")
        || line.contains(".kt:")
        || line.contains(".rs:")
}

fn compress_error(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let header_len = lines.len().min(3);
    let header = &lines[..header_len];

    let frames: Vec<&&str> = lines[header_len..].iter().filter(|l| is_stack_frame(l)).collect();
    let kept_frames = frames.iter().take(10).map(|l| l.to_string());
    let remaining = frames.len().saturating_sub(10);

    let mut out: Vec<String> = header.iter().map(|l| l.to_string()).collect();
    out.extend(kept_frames);
    if remaining > 0 {
        out.push(format!("... [+{remaining} additional stack frames] ..."));
    }
    out.join("\n")
}

fn compress_text(content: &str) -> String {
    if content.chars().count() <= 1000 {
        return content.to_string();
    }
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.len() <= 70 {
        return content.to_string();
    }
    let head = &words[..50];
    let tail = &words[words.len() - 20..];
    let remaining = words.len() - 70;
    format!(
        "{} ... [+{remaining} words] ... {}",
        head.join(" "),
        tail.join(" ")
    )
}

fn inline_compress(content_type: ContentType, content: &str, tool_call_id: &str) -> String {
    match content_type {
        ContentType::Json => compress_json(content),
        ContentType::Binary => {
            format!("[BINARY DATA: {} bytes, tool_call_id={tool_call_id}]", content.len())
        }
        ContentType::Log => compress_log(content),
        ContentType::Error => compress_error(content),
        ContentType::Yaml | ContentType::Text => compress_text(content),
    }
}

/// Schema-aware tool output shrinking with size-threshold externalization.
pub struct ToolOutputCompressor {
    artifact_store: Arc<dyn ArtifactStore>,
    config: ToolOutputCompressorConfig,
}

impl ToolOutputCompressor {
    pub fn new(artifact_store: Arc<dyn ArtifactStore>, config: ToolOutputCompressorConfig) -> Self {
        Self { artifact_store, config }
    }

    /// `compress_tool_outputs` — see module docs.
    pub async fn compress(&self, messages: &[Message]) -> Vec<Message> {
        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            out.push(self.compress_one(message).await);
        }
        out
    }

    async fn compress_one(&self, message: &Message) -> Message {
        let Message::Tool { content, tool_call_id } = message else {
            return message.clone();
        };

        let size = content.len();
        if size <= TWO_KIB {
            return message.clone();
        }

        let trimmed = content.trim();
        let content_type = detect_content_type(trimmed);

        if size > self.config.threshold_bytes {
            let key = ArtifactKey::of(content.as_bytes());
            let summary = short_summary(content_type, content);
            match self.artifact_store.store(&key, content.as_bytes()).await {
                Ok(()) => {
                    let externalized = ExternalizedContent {
                        key,
                        size_bytes: size,
                        content_type,
                        summary,
                    };
                    return message.with_content(externalized.pointer());
                }
                Err(err) => {
                    warn!(
                        tool_call_id,
                        error = %err,
                        "artifact store write failed, falling back to inline compression"
                    );
                }
            }
        }

        let compressed = inline_compress(content_type, content, tool_call_id);
        message.with_content(compressed)
    }
}

#[cfg(test)]
mod tests {
    use context_types::Message;

    use super::*;
    use crate::artifact::InMemoryArtifactStore;

    fn compressor(threshold_bytes: usize) -> ToolOutputCompressor {
        ToolOutputCompressor::new(
            Arc::new(InMemoryArtifactStore::new()),
            ToolOutputCompressorConfig { threshold_bytes },
        )
    }

    #[tokio::test]
    async fn non_tool_messages_pass_through_untouched() {
        let compressor = compressor(8192);
        let messages = vec![Message::user("hi"), Message::assistant("hello")];
        let out = compressor.compress(&messages).await;
        assert_eq!(out, messages);
    }

    #[tokio::test]
    async fn small_tool_output_is_unchanged() {
        let compressor = compressor(8192);
        let messages = vec![Message::tool("short result", "call_1")];
        let out = compressor.compress(&messages).await;
        assert_eq!(out, messages);
    }

    #[tokio::test]
    async fn large_tool_output_is_externalized() {
        let compressor = compressor(8192);
        let payload = "A".repeat(20_000);
        let messages = vec![Message::tool(payload.clone(), "call_1")];
        let out = compressor.compress(&messages).await;

        let pointer = out[0].content();
        assert!(pointer.starts_with("[EXTERNALIZED: "));
        assert!(pointer.contains("| TEXT |"));

        let key_hex = pointer
            .trim_start_matches("[EXTERNALIZED: ")
            .split(' ')
            .next()
            .unwrap();
        assert!(key_hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn externalization_is_idempotent_on_content() {
        let content = "B".repeat(20_000);
        let a = ArtifactKey::of(content.as_bytes());
        let b = ArtifactKey::of(content.as_bytes());
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn json_pruning_drops_empty_fields_and_collapses_long_arrays() {
        let compressor = compressor(8192);
        let array = (1..=22).collect::<Vec<_>>();
        let payload = serde_json::json!({
            "a": null,
            "b": "",
            "c": [],
            "d": array,
            "padding": " ".repeat(3000),
        })
        .to_string();
        let messages = vec![Message::tool(payload, "call_1")];
        let out = compressor.compress(&messages).await;
        let result: Value = serde_json::from_str(out[0].content()).unwrap();
        let obj = result.as_object().unwrap();
        assert!(!obj.contains_key("a"));
        assert!(!obj.contains_key("b"));
        assert!(!obj.contains_key("c"));
        let d = obj.get("d").unwrap().as_array().unwrap();
        assert_eq!(d.len(), 21); // head(10) + marker + tail(10)
        assert_eq!(d[10], Value::String("...[+2 items]...".to_string()));
    }

    #[tokio::test]
    async fn error_output_keeps_header_and_caps_stack_frames() {
        let compressor = compressor(8192);
        let mut payload = String::from("ERROR: request failed\nroot cause: timeout\ncontext: retrying\n");
        for i in 0..15 {
            payload.push_str(&format!("  at module.fn{i} (file.rs:{i})\n"));
        }
        payload.push_str(&" ".repeat(2200));
        let messages = vec![Message::tool(payload, "call_1")];
        let out = compressor.compress(&messages).await;
        assert!(out[0].content().contains("[+5 additional stack frames]"));
    }

    #[test]
    fn detects_json_yaml_error_log_binary_text() {
        assert_eq!(detect_content_type(r#"{"a":1}"#), ContentType::Json);
        assert_eq!(detect_content_type("---\nkey: value"), ContentType::Yaml);
        assert_eq!(detect_content_type("ERROR: boom"), ContentType::Error);
        assert_eq!(detect_content_type("INFO starting up"), ContentType::Log);
        assert_eq!(detect_content_type("data:image/png;base64,abc"), ContentType::Binary);
        assert_eq!(detect_content_type("just some text"), ContentType::Text);
    }
}
