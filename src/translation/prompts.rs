/*!
 * Prompt construction and response parsing shared by the network backends.
 *
 * Items go out as a JSON array of `{id, text, context}` objects and come back
 * as `{"translations": [{"id": ..., "text": ...}]}`. Models sometimes wrap
 * the JSON in prose or code fences, so the reply is unwrapped before parsing.
 */

use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::providers::{BackendRequest, TranslatedTask};

/// Default system prompt for network backends
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a translation engine. Return only translations, preserving placeholders and numbering. Do not add explanations.";

#[derive(Debug, Serialize)]
struct PromptItem<'a> {
    id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslationReply {
    translations: Vec<ReplyItem>,
}

#[derive(Debug, Deserialize)]
struct ReplyItem {
    #[serde(default)]
    id: serde_json::Value,
    text: Option<String>,
}

/// Fill `{source_language}` / `{target_language}` placeholders of a system prompt
pub fn render_system_prompt(template: &str, request: &BackendRequest<'_>) -> String {
    template
        .replace("{source_language}", request.source_language.unwrap_or("the source language"))
        .replace("{target_language}", request.target_language)
}

/// User message for one batch
pub fn build_user_prompt(request: &BackendRequest<'_>) -> Result<String, ProviderError> {
    let items: Vec<PromptItem<'_>> = request
        .tasks
        .iter()
        .map(|t| PromptItem {
            id: &t.id,
            text: &t.text,
            context: t.context.as_deref(),
        })
        .collect();
    let items = serde_json::to_string(&items)
        .map_err(|e| ProviderError::RequestError(format!("Failed to encode batch: {}", e)))?;

    let mut prompt = format!(
        "Translate each item from {} to {}. \
Return JSON: {{\"translations\": [{{\"id\": \"...\", \"text\": \"<translated>\"}} ...]}} \
Do not drop or reorder items. Preserve placeholders and numbering. \
Keep line breaks where they occur in the source. \
Only respond with valid JSON and nothing else.\n",
        request.source_language.unwrap_or("auto-detect"),
        request.target_language
    );
    let context = request.guidance.shared_context.trim();
    if !context.is_empty() {
        prompt.push_str(&format!("Context: {}\n", context));
    }
    let glossary = format_glossary(request);
    if !glossary.is_empty() {
        prompt.push_str(&glossary);
        prompt.push('\n');
    }
    prompt.push_str(&format!("\nItems: {}", items));
    Ok(prompt)
}

fn format_glossary(request: &BackendRequest<'_>) -> String {
    let pairs: Vec<String> = request
        .guidance
        .glossary
        .iter()
        .filter(|(source, target)| !source.is_empty() && !target.is_empty())
        .map(|(source, target)| format!("'{}' -> '{}'", source, target))
        .collect();
    if pairs.is_empty() {
        return String::new();
    }
    format!("Glossary (must use these translations): {}", pairs.join("; "))
}

/// Extract a JSON object from a potentially wrapped reply
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }

    if let Some(start) = trimmed.find("```json") {
        if let Some(end) = trimmed[start + 7..].find("```") {
            return Some(trimmed[start + 7..start + 7 + end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        if let Some(end) = trimmed[start + 3..].find("```") {
            let json = trimmed[start + 3..start + 3 + end].trim();
            if json.starts_with('{') {
                return Some(json);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some(&trimmed[start..=end]),
        _ => None,
    }
}

/// Parse a model reply into translated tasks
pub fn parse_translations(content: &str) -> Result<Vec<TranslatedTask>, ProviderError> {
    let json = extract_json(content)
        .ok_or_else(|| ProviderError::ParseError("reply contains no JSON object".to_string()))?;
    let reply: TranslationReply = serde_json::from_str(json)
        .map_err(|e| ProviderError::ParseError(format!("reply is not a translations object: {}", e)))?;

    reply
        .translations
        .into_iter()
        .map(|item| {
            let id = match item.id {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => {
                    return Err(ProviderError::MalformedResponse("translation without id".to_string()));
                }
                other => other.to_string(),
            };
            let text = item
                .text
                .ok_or_else(|| ProviderError::MalformedResponse(format!("translation {} has no text", id)))?;
            Ok(TranslatedTask { id, text })
        })
        .collect()
}
