// 该文件是 Biaozhu （标注） 项目的一部分。
// src/bin/backend.rs - Label Studio ML 后端主程序
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

use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use biaozhu::backend::{BackendAdapter, BackendState, DEFAULT_PREDICT_ENDPOINT, HttpTransport};

/// Biaozhu ML 后端参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 预测服务地址
  #[arg(long, env = "PREDICT_ENDPOINT", default_value = DEFAULT_PREDICT_ENDPOINT, value_name = "URL")]
  pub endpoint: String,

  /// 监听地址
  #[arg(long, env = "BACKEND_BIND_ADDR", default_value = "0.0.0.0:9090", value_name = "ADDR")]
  pub bind: SocketAddr,

  /// 上报给 Label Studio 的模型版本
  #[arg(long, env = "MODEL_VERSION", default_value = "biaozhu", value_name = "VERSION")]
  pub model_version: String,
}

#[tokio::main]
async fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("预测服务地址: {}", args.endpoint);
  info!("监听地址: {}", args.bind);

  let adapter = BackendAdapter::new(HttpTransport::new(args.endpoint));
  let state = BackendState::new(adapter, args.model_version);
  biaozhu::backend::serve(args.bind, state).await?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  #[test]
  fn bind_address_has_its_own_env_var() {
    let command = Args::command();
    let bind = command
      .get_arguments()
      .find(|arg| arg.get_id() == "bind")
      .unwrap();
    assert_eq!(bind.get_env().and_then(|env| env.to_str()), Some("BACKEND_BIND_ADDR"));
  }
}
