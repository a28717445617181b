//! JSON document codec
//!
//! A stored value is a `Document`: a JSON tree whose root is an object.
//! Artifacts on disk are the bare encoded bytes — no framing, no header —
//! so stores written by older tooling read back unchanged.

use std::path::Path;

use crate::error::{SatchelError, SatchelResult};

/// A JSON-compatible tree value stored under a key.
///
/// Leaves are strings, numbers, booleans, or null; interior nodes are
/// arrays or maps. Map key order survives a round trip. The root must be
/// an object — `encode` rejects anything else.
pub type Document = serde_json::Value;

/// Encode a document to its durable byte representation.
///
/// Rejects documents whose root is not an object. For any accepted
/// document, `decode(encode(d))` returns a value that re-encodes to the
/// same bytes.
pub fn encode(document: &Document) -> SatchelResult<Vec<u8>> {
    if !document.is_object() {
        return Err(SatchelError::InvalidDocument {
            reason: format!(
                "top-level value must be an object, got {}",
                kind_name(document)
            ),
        });
    }
    serde_json::to_vec(document).map_err(|e| SatchelError::InvalidDocument {
        reason: format!("serialization failed: {}", e),
    })
}

/// Decode artifact bytes back into a document.
///
/// Bytes that fail to parse, or parse to a non-object root, mean the
/// artifact was corrupted or written by something else entirely; the path
/// is carried in the error for the caller's report.
pub fn decode(path: &Path, bytes: &[u8]) -> SatchelResult<Document> {
    let document: Document =
        serde_json::from_slice(bytes).map_err(|e| SatchelError::CorruptArtifact {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if !document.is_object() {
        return Err(SatchelError::CorruptArtifact {
            path: path.to_path_buf(),
            reason: format!("artifact root is {}, not an object", kind_name(&document)),
        });
    }

    Ok(document)
}

fn kind_name(value: &Document) -> &'static str {
    match value {
        Document::Null => "null",
        Document::Bool(_) => "a boolean",
        Document::Number(_) => "a number",
        Document::String(_) => "a string",
        Document::Array(_) => "an array",
        Document::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_path() -> &'static Path {
        Path::new("/store/artifact")
    }

    #[test]
    fn test_roundtrip_is_byte_exact() {
        let doc = json!({
            "name": "ada",
            "logins": 42,
            "ratio": 0.5,
            "tags": ["a", "b", null],
            "nested": { "deep": { "flag": true } }
        });

        let bytes = encode(&doc).unwrap();
        let decoded = decode(test_path(), &bytes).unwrap();
        assert_eq!(decoded, doc);
        assert_eq!(encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_key_order_preserved() {
        let doc = json!({ "zebra": 1, "apple": 2, "mango": 3 });
        let bytes = encode(&doc).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        let z = text.find("zebra").unwrap();
        let a = text.find("apple").unwrap();
        let m = text.find("mango").unwrap();
        assert!(z < a && a < m, "insertion order lost: {}", text);
    }

    #[test]
    fn test_non_object_roots_rejected() {
        for doc in [json!(42), json!("bare string"), json!([1, 2, 3]), json!(null), json!(true)] {
            let result = encode(&doc);
            assert!(
                matches!(result, Err(SatchelError::InvalidDocument { .. })),
                "expected rejection for {:?}",
                doc
            );
        }
    }

    #[test]
    fn test_empty_object_accepted() {
        let doc = json!({});
        let bytes = encode(&doc).unwrap();
        assert_eq!(decode(test_path(), &bytes).unwrap(), doc);
    }

    #[test]
    fn test_garbage_bytes_are_corrupt() {
        let result = decode(test_path(), b"{\"truncated\": ");
        assert!(matches!(result, Err(SatchelError::CorruptArtifact { .. })));
    }

    #[test]
    fn test_non_object_artifact_is_corrupt() {
        // Parses fine as JSON, but no valid artifact has a bare-array root
        let result = decode(test_path(), b"[1, 2, 3]");
        assert!(matches!(result, Err(SatchelError::CorruptArtifact { .. })));
    }

    #[test]
    fn test_unicode_content() {
        let doc = json!({ "greeting": "こんにちは", "emoji": "🗄️" });
        let bytes = encode(&doc).unwrap();
        assert_eq!(decode(test_path(), &bytes).unwrap(), doc);
    }
}
