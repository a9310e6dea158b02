// 该文件是 Panshi （盘食） 项目的一部分。
// src/oracle/openai.rs - OpenAI 视觉语言模型客户端
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::frame::to_data_uri;
use crate::oracle::{
  ContainmentVerdict, OracleError, VisionOracle, match_containment_answer, parse_confirmation,
  parse_quality_answer,
};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const ANALYSIS_PROMPT: &str = "You are a food and nutrition assistant.\n\n\
  Analyze the food in this image. Answer with exactly these numbered sections, \
  each formatted as `N. **Title**: content`:\n\n\
  1. **Description**: A short paragraph describing the food.\n\
  2. **Items**: The distinct items on the plate, one per line.\n\
  3. **Calories**: Estimated calories for each item.\n\
  4. **Total Calories**: The total calorie estimate.\n\
  5. **Health Score**: A real number from 0 to 10.\n\
  6. **Rationale**: Why this score was given.\n\
  7. **Macronutrient Estimate**: Rough protein (g), fat (g), carbs (g).\n\
  8. **Eat Frequency**: One of 'Can eat daily', 'Occasional treat', 'Avoid except rarely'.\n\
  9. **Comparison to Ideal Meal**: How this compares with a typical healthy meal.\n\
  10. **Mood/Energy Impact**: Likely short-term effects such as an energy crash or satiety.\n\
  11. **Satiety Score**: 0 to 10, how full this meal will make the person feel.\n\
  12. **Bloat Score**: 0 to 10, how much bloating this meal might cause.\n\
  13. **Tasty Score**: 0 to 10, how tasty this meal is likely to be.\n\
  14. **Addiction Score**: 0 to 10, how likely this meal is to trigger addictive eating.\n\
  15. **Summary**: Total calories, final health score and a brief closing note.";

/// 基于 chat completions 接口的视觉语言模型
#[derive(Debug, Clone)]
pub struct OpenAiVision {
  api_key: String,
  model: String,
  endpoint: String,
  client: Client,
}

impl OpenAiVision {
  pub fn new(api_key: impl Into<String>) -> Result<Self, OracleError> {
    let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    Ok(Self {
      api_key: api_key.into(),
      model: DEFAULT_MODEL.to_string(),
      endpoint: CHAT_COMPLETIONS_URL.to_string(),
      client,
    })
  }

  pub fn with_model(mut self, model: impl Into<String>) -> Self {
    self.model = model.into();
    self
  }

  pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
    self.endpoint = endpoint.into();
    self
  }

  fn request_body(&self, content: Value, max_tokens: Option<u32>) -> Value {
    let mut body = json!({
      "model": self.model,
      "messages": [{ "role": "user", "content": content }],
    });
    if let Some(max_tokens) = max_tokens {
      body["max_tokens"] = json!(max_tokens);
    }
    body
  }

  fn chat(&self, content: Value, max_tokens: Option<u32>) -> Result<String, OracleError> {
    let body = self.request_body(content, max_tokens);
    let response = self
      .client
      .post(&self.endpoint)
      .header("Authorization", format!("Bearer {}", self.api_key))
      .json(&body)
      .send()?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().unwrap_or_default();
      return Err(OracleError::Status {
        status: status.as_u16(),
        body,
      });
    }

    let payload: Value = response.json()?;
    let answer = extract_message_content(&payload)?;
    debug!("模型回答: {}", answer);
    Ok(answer)
  }
}

fn text_with_image(text: &str, image: &[u8]) -> Value {
  json!([
    { "type": "text", "text": text },
    { "type": "image_url", "image_url": { "url": to_data_uri(image) } },
  ])
}

fn extract_message_content(payload: &Value) -> Result<String, OracleError> {
  payload["choices"][0]["message"]["content"]
    .as_str()
    .map(str::to_string)
    .ok_or_else(|| OracleError::Malformed(format!("响应中没有消息内容: {}", payload)))
}

impl VisionOracle for OpenAiVision {
  fn analyze(&self, image: &[u8]) -> Result<String, OracleError> {
    self.chat(text_with_image(ANALYSIS_PROMPT, image), None)
  }

  fn confirm(&self, crop: &[u8], description: &str) -> Result<Option<String>, OracleError> {
    let prompt = format!(
      "Given this description of the full plate: {}. \
       Is this crop one of the described food items? \
       Reply with just the food name or 'None'.",
      description
    );
    let answer = self.chat(text_with_image(&prompt, crop), Some(50))?;
    Ok(parse_confirmation(&answer))
  }

  fn check_quality(&self, crop: &[u8], label: &str) -> Result<bool, OracleError> {
    let prompt = format!("Does this image clearly show {}? Reply 'yes' or 'no'.", label);
    let answer = self.chat(text_with_image(&prompt, crop), Some(10))?;
    Ok(parse_quality_answer(&answer))
  }

  fn resolve_containment(
    &self,
    inner_label: &str,
    outer_label: &str,
  ) -> Result<ContainmentVerdict, OracleError> {
    let prompt = format!(
      "I detected '{}' inside '{}' in a food photo. \
       Which is more useful to show the user as a separate food item? \
       Reply with just the label to KEEP.",
      inner_label, outer_label
    );
    let answer = self.chat(json!(prompt), Some(30))?;
    Ok(match_containment_answer(&answer, inner_label, outer_label))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn request_body_carries_image_and_token_limit() {
    let oracle = OpenAiVision::new("sk-test").unwrap().with_model("gpt-test");
    let body = oracle.request_body(text_with_image("hi", b"abc"), Some(10));
    assert_eq!(body["model"], "gpt-test");
    assert_eq!(body["max_tokens"], 10);
    let content = &body["messages"][0]["content"];
    assert_eq!(content[0]["text"], "hi");
    assert_eq!(
      content[1]["image_url"]["url"],
      "data:image/jpeg;base64,YWJj"
    );
  }

  #[test]
  fn request_body_without_limit() {
    let oracle = OpenAiVision::new("sk-test").unwrap();
    let body = oracle.request_body(json!("plain"), None);
    assert!(body.get("max_tokens").is_none());
    assert_eq!(body["messages"][0]["content"], "plain");
  }

  #[test]
  fn message_content_is_extracted() {
    let payload = json!({ "choices": [{ "message": { "content": "yes" } }] });
    assert_eq!(extract_message_content(&payload).unwrap(), "yes");
    assert!(matches!(
      extract_message_content(&json!({ "choices": [] })),
      Err(OracleError::Malformed(_))
    ));
  }
}
