// 该文件是 Panshi （盘食） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use panshi::{
  Collaborators, FromUrl, Pipeline, PipelineConfig,
  input::ImageFileInput,
  oracle::{OpenAiVision, ReplicateClient, ReplicateDetector, ReplicateSegmenter},
  output::Visualizer,
  storage::storage_from_url,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("输入图像: {}", args.input);
  info!("保存位置: {}", args.storage);

  let input = ImageFileInput::from_url(&args.input)?;
  let storage = storage_from_url(&args.storage)?;
  let vision = OpenAiVision::new(&args.openai_api_key)?.with_model(&args.openai_model);
  let replicate = ReplicateClient::new(&args.replicate_api_token)?;
  let detector = ReplicateDetector::new(replicate.clone());
  let segmenter = ReplicateSegmenter::new(replicate);

  let config = PipelineConfig::default()
    .with_workers(args.workers)
    .with_quality_check(!args.no_quality_check);
  let collaborators = Collaborators {
    vision: &vision,
    detector: &detector,
    segmenter: &segmenter,
    storage: storage.as_ref(),
  };
  let visualizer = match &args.font {
    Some(path) => Visualizer::from_font_path_or_embedded(path),
    None => Visualizer::new(),
  };
  let pipeline = Pipeline::new(collaborators, config).with_visualizer(visualizer);

  let bytes = input.read()?;
  info!("开始分析...");
  let now = std::time::Instant::now();
  let response = pipeline.analyze(&bytes)?;
  info!(
    "分析完成，共 {} 项，耗时: {:.2?}",
    response.item_count,
    now.elapsed()
  );

  println!("{}", serde_json::to_string_pretty(&response)?);

  Ok(())
}
