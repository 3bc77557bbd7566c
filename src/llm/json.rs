//! Lenient JSON extraction from model output.
//!
//! Models are instructed to return bare JSON, but in practice wrap it in
//! markdown fences or surround it with commentary. The helpers here cut the
//! JSON payload out of whatever came back before handing it to serde.

use crate::error::{ExtractError, Result};
use serde::de::DeserializeOwned;

/// Extract the JSON payload from a potentially fenced or chatty response.
pub fn extract_json(response: &str) -> String {
    let response = response.trim();

    // Check for ```json code block
    if response.starts_with("```json") {
        if let Some(end) = response.rfind("```") {
            let start = "```json".len();
            if end > start {
                return response[start..end].trim().to_string();
            }
        }
    }

    // Check for ``` code block
    if response.starts_with("```") {
        if let Some(end) = response.rfind("```") {
            let start = response.find('\n').map(|n| n + 1).unwrap_or(3);
            if end > start {
                return response[start..end].trim().to_string();
            }
        }
    }

    // Find JSON array or object
    if let Some(start) = response.find('[') {
        if let Some(end) = response.rfind(']') {
            if end > start {
                return response[start..=end].to_string();
            }
        }
    }

    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end > start {
                return response[start..=end].to_string();
            }
        }
    }

    response.to_string()
}

/// Strip a leading markdown fence without hunting for brackets. Used when
/// concatenating partial JSON text across continuation turns, where bracket
/// matching would cut the fragment short.
pub fn strip_code_fence(response: &str) -> String {
    let response = response.trim();
    if let Some(rest) = response
        .strip_prefix("```json")
        .or_else(|| response.strip_prefix("```"))
    {
        return rest.trim_end_matches("```").trim().to_string();
    }
    response.to_string()
}

/// Extract and decode the JSON payload into `T`.
pub fn parse_json<T: DeserializeOwned>(response: &str) -> Result<T> {
    let json_str = extract_json(response);
    serde_json::from_str(&json_str).map_err(|e| {
        let preview: String = response.chars().take(200).collect();
        ExtractError::LlmParse(format!("{} in response: {}", e, preview))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let response = r#"[{"title": "Test"}]"#;
        assert_eq!(extract_json(response), r#"[{"title": "Test"}]"#);
    }

    #[test]
    fn test_extract_json_markdown() {
        let response = "```json\n[{\"title\": \"Test\"}]\n```";
        assert_eq!(extract_json(response), r#"[{"title": "Test"}]"#);
    }

    #[test]
    fn test_extract_json_with_text() {
        let response = "Here's the structure:\n[{\"title\": \"Test\"}]\nThat's the result.";
        assert_eq!(extract_json(response), r#"[{"title": "Test"}]"#);
    }

    #[test]
    fn test_extract_json_object_with_commentary() {
        let response = "Sure!\n{\"answer\": \"yes\"}\nHope that helps.";
        assert_eq!(extract_json(response), r#"{"answer": "yes"}"#);
    }

    #[test]
    fn test_strip_code_fence_keeps_partial_json() {
        let response = "```json\n{\"table_of_contents\": [\n  {\"title\": \"A\"";
        let stripped = strip_code_fence(response);
        assert!(stripped.starts_with("{\"table_of_contents\""));
        assert!(stripped.ends_with("\"A\""));
    }

    #[test]
    fn test_parse_json_typed() {
        #[derive(serde::Deserialize)]
        struct Verdict {
            answer: String,
        }

        let verdict: Verdict =
            parse_json("```json\n{\"thinking\": \"...\", \"answer\": \"yes\"}\n```").unwrap();
        assert_eq!(verdict.answer, "yes");

        assert!(parse_json::<Verdict>("not json at all").is_err());
    }
}
