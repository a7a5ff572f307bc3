// 该文件是 Biaozhu （标注） 项目的一部分。
// src/bin/serve.rs - 预测服务主程序
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

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::info;

use biaozhu::{
  fetch::ImageFetcher,
  model::Yolov5Loader,
  registry::ModelRegistry,
  service::PredictionService,
  storage::{S3Config, S3ObjectStore},
};

/// Biaozhu 预测服务参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型配置文件路径（JSON 数组）
  #[arg(long, env = "MODELS_CONFIG", default_value = "weights/models_config.json", value_name = "FILE")]
  pub models_config: PathBuf,

  /// 监听地址
  #[arg(long, env = "SERVE_BIND_ADDR", default_value = "0.0.0.0:8000", value_name = "ADDR")]
  pub bind: SocketAddr,

  /// 对象存储地址
  #[arg(long, env = "S3_ENDPOINT", value_name = "URL")]
  pub s3_endpoint: String,

  #[arg(long, env = "S3_REGION", default_value = "us-east-1")]
  pub s3_region: String,

  #[arg(long, env = "S3_ACCESS_KEY", hide_env_values = true)]
  pub s3_access_key: String,

  #[arg(long, env = "S3_SECRET_KEY", hide_env_values = true)]
  pub s3_secret_key: String,

  /// 没有检测结果时使用的标签
  #[arg(long, env = "LABEL_STUDIO_BG_LABEL", value_name = "LABEL")]
  pub background_label: String,

  /// 图像下载超时（秒），不设置则不限制
  #[arg(long, env = "FETCH_TIMEOUT", value_name = "SECONDS")]
  pub fetch_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型配置文件: {}", args.models_config.display());
  info!("监听地址: {}", args.bind);
  info!("背景标签: {}", args.background_label);

  info!("正在加载模型...");
  let registry = ModelRegistry::from_config_file(&args.models_config, &Yolov5Loader)?;
  info!("模型加载完成，共 {} 个项目", registry.len());

  let store = S3ObjectStore::new(&S3Config {
    endpoint: args.s3_endpoint,
    region: args.s3_region,
    access_key: args.s3_access_key,
    secret_key: args.s3_secret_key,
  })?;
  let fetcher = ImageFetcher::new(Arc::new(store), args.fetch_timeout.map(Duration::from_secs));

  let service = PredictionService::new(Arc::new(registry), fetcher, args.background_label);
  biaozhu::server::serve(args.bind, Arc::new(service)).await?;

  Ok(())
}
