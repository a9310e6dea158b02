// 该文件是 Panshi （盘食） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use panshi::fanout::DEFAULT_WORKERS;

/// Panshi 菜品分割
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像，例如 image:///path/to/meal.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 保存位置，例如 folder:///tmp/media?prefix=/media
  #[arg(long, value_name = "STORAGE")]
  pub storage: Url,

  /// OpenAI API 密钥
  #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
  pub openai_api_key: String,

  /// OpenAI 模型名称
  #[arg(long, default_value = "gpt-4o", value_name = "MODEL")]
  pub openai_model: String,

  /// Replicate API 令牌
  #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
  pub replicate_api_token: String,

  /// 跳过裁剪图质量检查
  #[arg(long)]
  pub no_quality_check: bool,

  /// 标签字体文件，默认使用内置字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 并发调用外部服务的线程数
  #[arg(long, value_name = "COUNT", default_value_t = DEFAULT_WORKERS)]
  pub workers: usize,
}
