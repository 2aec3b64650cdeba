use crate::command::BoxId;
use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Breaks an instruction into an ordered list of atomic UI goals.
#[async_trait]
pub trait GoalExtractor: Send + Sync {
    async fn extract_goals(&self, instruction: &str) -> Result<Vec<String>, CapabilityError>;
}

/// Outcome of asking the model where a goal's target sits on the annotated
/// screenshot. `box_id` is `None` when the model answered "N/A" or produced
/// a label that does not fit the grid.
#[derive(Clone, Debug, Default)]
pub struct Localization {
    pub box_id: Option<BoxId>,
    pub rationale: Option<String>,
}

/// Maps a goal plus a grid-annotated screenshot to a grid cell.
#[async_trait]
pub trait ElementLocator: Send + Sync {
    async fn locate(&self, goal: &str, image: &[u8]) -> Result<Localization, CapabilityError>;
}

#[derive(Clone)]
pub struct LlmConfig {
    pub api_base: String, // e.g. "https://generativelanguage.googleapis.com/v1beta"
    pub api_key: String,  // env GEMINI_API_KEY
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into()),
            api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-pro-preview-03-25".into()),
        }
    }
}

/// OpenAI-compatible chat-completions client with forced function calls, so
/// both capabilities come back as structured JSON rather than prose.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    cfg: LlmConfig,
}

impl LlmClient {
    pub fn new(cfg: LlmConfig) -> Result<Self> {
        if cfg.api_key.is_empty() {
            bail!("GEMINI_API_KEY missing");
        }
        Ok(Self {
            http: Client::new(),
            cfg,
        })
    }

    async fn forced_tool_call(&self, tool_name: &str, mut req: Value) -> Result<Value, CapabilityError> {
        let url = format!(
            "{}/chat/completions",
            self.cfg.api_base.trim_end_matches('/')
        );
        req["model"] = Value::String(self.cfg.model.clone());
        req["tool_choice"] = json!({ "type": "function", "function": { "name": tool_name } });

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.api_key)
            .json(&req)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(CapabilityError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        let v: Value = serde_json::from_str(&text)
            .map_err(|e| CapabilityError::Malformed(format!("response is not JSON: {e}")))?;
        tool_arguments(&v)
    }
}

/// Extracts and parses `choices[0].message.tool_calls[0].function.arguments`.
pub(crate) fn tool_arguments(v: &Value) -> Result<Value, CapabilityError> {
    let args = v
        .pointer("/choices/0/message/tool_calls/0/function/arguments")
        .and_then(|x| x.as_str())
        .ok_or_else(|| CapabilityError::Malformed("no tool call in response".into()))?;
    serde_json::from_str(args)
        .map_err(|e| CapabilityError::Malformed(format!("tool arguments are not JSON: {e}")))
}

#[async_trait]
impl GoalExtractor for LlmClient {
    async fn extract_goals(&self, instruction: &str) -> Result<Vec<String>, CapabilityError> {
        let prompt = format!(
            "Break down this instruction into detailed, modular UI goals as if you are \
             automating a mobile interface.\n\
             Each goal should be command-like and concrete. Include tapping, typing, and \
             navigation as needed. If the instruction includes a query (like \"search for ...\"), \
             break it into tapping the search bar, typing the query (e.g., \"Type 'capital of \
             France'\"), and tapping the search or enter button.\n\
             Return the result under `goals`.\n\
             Instruction: \"{instruction}\""
        );
        let req = json!({
            "temperature": 0,
            "tools": [{
                "type": "function",
                "function": {
                    "name": "extract_goals",
                    "description": "Extract actionable goals from a user instruction.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "goals": { "type": "array", "items": { "type": "string" } }
                        },
                        "required": ["goals"]
                    }
                }
            }],
            "messages": [{ "role": "user", "content": prompt }]
        });
        let args = self.forced_tool_call("extract_goals", req).await?;
        let goals = args
            .get("goals")
            .and_then(|g| g.as_array())
            .ok_or_else(|| CapabilityError::Malformed("missing `goals` array".into()))?
            .iter()
            .filter_map(|g| g.as_str())
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();
        Ok(goals)
    }
}

#[async_trait]
impl ElementLocator for LlmClient {
    async fn locate(&self, goal: &str, image: &[u8]) -> Result<Localization, CapabilityError> {
        let prompt = format!(
            "You are shown a screenshot of a phone screen with bounding boxes labeled a0, b2, ...\n\
             Return the single best box that fully contains **{goal}**, or \"N/A\" if it is not \
             visible, only partially visible, or you are unsure. Do not return multiple boxes. \
             No explanations."
        );
        let image_url = format!("data:image/png;base64,{}", B64.encode(image));
        let req = json!({
            "temperature": 0.4,
            "tools": [{
                "type": "function",
                "function": {
                    "name": "select_best_box",
                    "description": "Identify the box ID covering the target UI element.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "box_id": { "type": "string", "pattern": "^([a-t][0-9]|N/A)$" }
                        },
                        "required": ["box_id"]
                    }
                }
            }],
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image_url } }
                ]
            }]
        });
        let args = self.forced_tool_call("select_best_box", req).await?;
        let raw = args
            .get("box_id")
            .and_then(|b| b.as_str())
            .ok_or_else(|| CapabilityError::Malformed("missing `box_id`".into()))?;
        Ok(parse_box_answer(raw))
    }
}

/// "N/A" and unparseable labels both degrade to not-found; a garbage label is
/// never allowed to crash the pipeline or masquerade as a real cell.
pub(crate) fn parse_box_answer(raw: &str) -> Localization {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("n/a") {
        return Localization::default();
    }
    match raw.parse::<BoxId>() {
        Ok(box_id) => Localization {
            box_id: Some(box_id),
            rationale: None,
        },
        Err(_) => {
            warn!(label = raw, "locator returned an unrecognized box label");
            Localization {
                box_id: None,
                rationale: Some(format!("unrecognized box label '{raw}'")),
            }
        }
    }
}

/// Fixed-goal extractor for tests and offline runs.
#[derive(Clone, Debug)]
pub struct StaticExtractor(pub Vec<String>);

#[async_trait]
impl GoalExtractor for StaticExtractor {
    async fn extract_goals(&self, _instruction: &str) -> Result<Vec<String>, CapabilityError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_reply(arguments: &str) -> Value {
        json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "function": { "name": "x", "arguments": arguments }
                    }]
                }
            }]
        })
    }

    #[test]
    fn tool_arguments_parses_nested_json_string() {
        let v = chat_reply(r#"{"goals": ["Tap search icon", "Type 'pizza'"]}"#);
        let args = tool_arguments(&v).unwrap();
        assert_eq!(args["goals"][0], "Tap search icon");
    }

    #[test]
    fn tool_arguments_rejects_missing_call() {
        let v = json!({ "choices": [{ "message": { "content": "hello" } }] });
        assert!(matches!(
            tool_arguments(&v),
            Err(CapabilityError::Malformed(_))
        ));
    }

    #[test]
    fn box_answer_parses_label_and_sentinel() {
        assert_eq!(
            parse_box_answer("b3").box_id,
            Some("b3".parse().unwrap())
        );
        assert!(parse_box_answer("N/A").box_id.is_none());
        assert!(parse_box_answer("n/a").box_id.is_none());
    }

    #[test]
    fn box_answer_degrades_on_garbage() {
        let loc = parse_box_answer("zz99");
        assert!(loc.box_id.is_none());
        assert!(loc.rationale.unwrap().contains("zz99"));
    }
}
