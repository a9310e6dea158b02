// 该文件是 Panshi （盘食） 项目的一部分。
// src/oracle/replicate.rs - Replicate 托管的检测（YOLO-World）与分割（lang-SAM）模型
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

use std::{thread, time::Duration};

use reqwest::blocking::{Client, Response};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
  frame::to_data_uri,
  geometry::{BBox, MASK_LUMA_THRESHOLD, Mask},
  nms::DetectedBox,
  oracle::{DetectionOracle, DetectionRequest, OracleError, SegmentationOracle},
};

const PREDICTIONS_URL: &str = "https://api.replicate.com/v1/predictions";
const YOLO_WORLD_VERSION: &str = "fd1305d3fc19e81540542f51c2530cf8f393e28cc6ff4976337c3e2b75c7c292";
const LANG_SAM_VERSION: &str = "891411c38a6ed2d44c004b7b9e44217df7a5b07848f29ddefd2e28bc7cbf93bc";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_POLLS: u32 = 600;

/// Replicate 预测接口
#[derive(Debug, Clone)]
pub struct ReplicateClient {
  token: String,
  client: Client,
  poll_interval: Duration,
  max_polls: u32,
}

impl ReplicateClient {
  pub fn new(token: impl Into<String>) -> Result<Self, OracleError> {
    let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    Ok(Self {
      token: token.into(),
      client,
      poll_interval: POLL_INTERVAL,
      max_polls: MAX_POLLS,
    })
  }

  pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
    self.poll_interval = interval;
    self.max_polls = max_polls;
    self
  }

  fn checked_json(response: Response) -> Result<Value, OracleError> {
    let status = response.status();
    if !status.is_success() {
      let body = response.text().unwrap_or_default();
      return Err(OracleError::Status {
        status: status.as_u16(),
        body,
      });
    }
    Ok(response.json()?)
  }

  /// 创建预测并轮询直到结束，返回 `output` 字段
  pub fn predict(&self, version: &str, input: Value) -> Result<Value, OracleError> {
    let response = self
      .client
      .post(PREDICTIONS_URL)
      .bearer_auth(&self.token)
      .header("Prefer", "wait")
      .json(&json!({ "version": version, "input": input }))
      .send()?;
    let mut prediction = Self::checked_json(response)?;

    for _ in 0..self.max_polls {
      match prediction_status(&prediction)? {
        PredictionStatus::Succeeded => return Ok(prediction["output"].clone()),
        PredictionStatus::Failed(reason) => return Err(OracleError::PredictionFailed(reason)),
        PredictionStatus::Pending => {}
      }
      let url = prediction["urls"]["get"]
        .as_str()
        .ok_or_else(|| OracleError::Malformed("预测缺少 urls.get".to_string()))?
        .to_string();
      thread::sleep(self.poll_interval);
      let response = self.client.get(&url).bearer_auth(&self.token).send()?;
      prediction = Self::checked_json(response)?;
    }

    Err(OracleError::Timeout(
      prediction["id"].as_str().unwrap_or("unknown").to_string(),
    ))
  }

  pub fn download(&self, url: &str) -> Result<Vec<u8>, OracleError> {
    let response = self.client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
      return Err(OracleError::Status {
        status: status.as_u16(),
        body: format!("下载失败: {}", url),
      });
    }
    Ok(response.bytes()?.to_vec())
  }
}

#[derive(Debug, PartialEq)]
enum PredictionStatus {
  Pending,
  Succeeded,
  Failed(String),
}

fn prediction_status(prediction: &Value) -> Result<PredictionStatus, OracleError> {
  match prediction["status"].as_str() {
    Some("succeeded") => Ok(PredictionStatus::Succeeded),
    Some("failed") | Some("canceled") => Ok(PredictionStatus::Failed(
      prediction["error"]
        .as_str()
        .unwrap_or("未知错误")
        .to_string(),
    )),
    Some("starting") | Some("processing") => Ok(PredictionStatus::Pending),
    other => Err(OracleError::Malformed(format!("未知的预测状态: {:?}", other))),
  }
}

/// YOLO-World 开放词表检测
#[derive(Debug, Clone)]
pub struct ReplicateDetector {
  client: ReplicateClient,
}

impl ReplicateDetector {
  pub fn new(client: ReplicateClient) -> Self {
    Self { client }
  }
}

impl DetectionOracle for ReplicateDetector {
  fn detect(
    &self,
    image: &[u8],
    request: &DetectionRequest<'_>,
  ) -> Result<Vec<DetectedBox>, OracleError> {
    let input = json!({
      "input_media": to_data_uri(image),
      "class_names": request.class_names.join(", "),
      "score_thr": request.score_threshold,
      "nms_thr": request.nms_threshold,
      "max_num_boxes": request.max_boxes,
      "return_json": true,
    });
    let output = self.client.predict(YOLO_WORLD_VERSION, input)?;
    parse_detections(&output)
  }
}

fn as_f32(value: &Value) -> Option<f32> {
  match value {
    Value::Number(n) => n.as_f64().map(|v| v as f32),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// 解析 `{"json_str": "{\"Det-0\": {x0, y0, x1, y1, score, cls}, ...}"}`。
///
/// 单条格式错误的检测被跳过；退化框被丢弃。
pub fn parse_detections(output: &Value) -> Result<Vec<DetectedBox>, OracleError> {
  let json_str = output["json_str"]
    .as_str()
    .ok_or_else(|| OracleError::Malformed("检测输出缺少 json_str".to_string()))?;
  let detections: Value = serde_json::from_str(json_str)
    .map_err(|e| OracleError::Malformed(format!("json_str 解析失败: {}", e)))?;
  let Some(detections) = detections.as_object() else {
    return Err(OracleError::Malformed("json_str 不是对象".to_string()));
  };

  let mut boxes = Vec::with_capacity(detections.len());
  for (key, det) in detections {
    let parsed = (|| -> Option<DetectedBox> {
      let bbox = BBox::new(
        as_f32(&det["x0"])?,
        as_f32(&det["y0"])?,
        as_f32(&det["x1"])?,
        as_f32(&det["y1"])?,
      );
      let label = match &det["cls"] {
        Value::String(s) => s.clone(),
        Value::Null => return None,
        other => other.to_string(),
      };
      Some(DetectedBox::new(bbox, label, as_f32(&det["score"])?))
    })();

    match parsed {
      Some(b) if b.bbox.is_degenerate() => debug!("丢弃退化检测框 {}: {:?}", key, b.bbox),
      Some(b) => boxes.push(b),
      None => warn!("跳过无法解析的检测 {}: {}", key, det),
    }
  }
  Ok(boxes)
}

/// lang-segment-anything 文本提示分割
#[derive(Debug, Clone)]
pub struct ReplicateSegmenter {
  client: ReplicateClient,
}

impl ReplicateSegmenter {
  pub fn new(client: ReplicateClient) -> Self {
    Self { client }
  }
}

fn output_url(output: &Value) -> Option<&str> {
  match output {
    Value::String(s) => Some(s),
    Value::Array(items) => items.iter().find_map(Value::as_str),
    _ => None,
  }
}

/// 掩码图像转灰度后以中点阈值二值化
pub fn mask_from_image_bytes(bytes: &[u8]) -> Result<Mask, OracleError> {
  let gray = image::load_from_memory(bytes)?.to_luma8();
  Ok(Mask::from_luma(&gray, MASK_LUMA_THRESHOLD))
}

impl SegmentationOracle for ReplicateSegmenter {
  fn segment(&self, image: &[u8], prompt: &str) -> Result<Mask, OracleError> {
    let input = json!({
      "image": to_data_uri(image),
      "text_prompt": prompt,
    });
    let output = self.client.predict(LANG_SAM_VERSION, input)?;
    let url = output_url(&output)
      .ok_or_else(|| OracleError::Malformed(format!("分割输出不是 URL: {}", output)))?;
    debug!("下载掩码: {}", url);
    let bytes = self.client.download(url)?;
    mask_from_image_bytes(&bytes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{GrayImage, ImageFormat, Luma};
  use std::io::Cursor;

  #[test]
  fn parses_detections_leniently() {
    let inner = json!({
      "Det-0": { "x0": 1.0, "y0": 2.0, "x1": 30.5, "y1": 40.0, "score": 0.8, "cls": "rice" },
      "Det-1": { "x0": "5", "y0": "5", "x1": "9", "y1": "9", "score": "0.3", "cls": "dal" },
      "Det-2": { "x0": 1.0, "y0": 2.0, "score": 0.8, "cls": "broken" },
      "Det-3": { "x0": 10.0, "y0": 2.0, "x1": 10.0, "y1": 40.0, "score": 0.8, "cls": "flat" },
      "Det-4": 7,
    });
    let output = json!({ "json_str": inner.to_string(), "media_path": "x" });
    let mut boxes = parse_detections(&output).unwrap();
    boxes.sort_by(|a, b| a.label.cmp(&b.label));
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[0].label, "dal");
    assert_eq!(boxes[0].confidence, 0.3);
    assert_eq!(boxes[1].bbox, BBox::new(1.0, 2.0, 30.5, 40.0));
  }

  #[test]
  fn rejects_output_without_json_str() {
    assert!(matches!(
      parse_detections(&json!({ "media_path": "x" })),
      Err(OracleError::Malformed(_))
    ));
    assert!(matches!(
      parse_detections(&json!({ "json_str": "not json" })),
      Err(OracleError::Malformed(_))
    ));
  }

  #[test]
  fn empty_detection_map_is_not_an_error() {
    let boxes = parse_detections(&json!({ "json_str": "{}" })).unwrap();
    assert!(boxes.is_empty());
  }

  #[test]
  fn prediction_status_is_classified() {
    assert_eq!(
      prediction_status(&json!({ "status": "processing" })).unwrap(),
      PredictionStatus::Pending
    );
    assert_eq!(
      prediction_status(&json!({ "status": "failed", "error": "oom" })).unwrap(),
      PredictionStatus::Failed("oom".to_string())
    );
    assert!(prediction_status(&json!({})).is_err());
  }

  #[test]
  fn output_url_accepts_string_or_list() {
    assert_eq!(output_url(&json!("https://a/m.png")), Some("https://a/m.png"));
    assert_eq!(output_url(&json!(["https://a/m.png"])), Some("https://a/m.png"));
    assert_eq!(output_url(&json!({})), None);
  }

  #[test]
  fn mask_bytes_are_thresholded_at_midpoint() {
    let gray = GrayImage::from_fn(4, 1, |x, _| Luma([[0, 128, 129, 255][x as usize]]));
    let mut bytes = Vec::new();
    gray
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .unwrap();
    let mask = mask_from_image_bytes(&bytes).unwrap();
    assert_eq!(mask.dimensions(), (4, 1));
    assert!(!mask.get(0, 0) && !mask.get(1, 0));
    assert!(mask.get(2, 0) && mask.get(3, 0));
  }
}
