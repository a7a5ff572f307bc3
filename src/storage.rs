// 该文件是 Biaozhu （标注） 项目的一部分。
// src/storage.rs - 对象存储
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

use std::path::Path;

use s3::{Bucket, Region, creds::Credentials};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

const DEFAULT_SCHEME: &str = "https";

#[derive(Error, Debug)]
pub enum StorageError {
  #[error("Invalid object path: {0}")]
  InvalidPath(String),
  #[error("Object store credentials error: {0}")]
  Credentials(String),
  #[error("Object store error: {0}")]
  Backend(String),
  #[error("Object `{bucket}/{key}` returned status {status}")]
  Status {
    bucket: String,
    key: String,
    status: u16,
  },
}

pub trait ObjectStore: Send + Sync {
  fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// 将 `.../bucket/object.jpg` 拆分为 (bucket, key)
pub fn split_object_path(locator: &str) -> Result<(String, String), StorageError> {
  let path = Path::new(locator);
  let key = path.file_name().and_then(|s| s.to_str());
  let bucket = path
    .parent()
    .and_then(|p| p.file_name())
    .and_then(|s| s.to_str());

  match (bucket, key) {
    (Some(bucket), Some(key)) => Ok((bucket.to_string(), key.to_string())),
    _ => Err(StorageError::InvalidPath(locator.to_string())),
  }
}

#[derive(Debug, Clone)]
pub struct S3Config {
  pub endpoint: String,
  pub region: String,
  pub access_key: String,
  pub secret_key: String,
}

/// S3 / MinIO 客户端，按路径方式访问存储桶
pub struct S3ObjectStore {
  region: Region,
  credentials: Credentials,
}

impl S3ObjectStore {
  pub fn new(config: &S3Config) -> Result<Self, StorageError> {
    let endpoint = normalize_endpoint(&config.endpoint);
    info!("对象存储地址: {}", endpoint);

    let credentials = Credentials::new(
      Some(&config.access_key),
      Some(&config.secret_key),
      None,
      None,
      None,
    )
    .map_err(|e| StorageError::Credentials(e.to_string()))?;

    Ok(S3ObjectStore {
      region: Region::Custom {
        region: config.region.clone(),
        endpoint,
      },
      credentials,
    })
  }
}

/// 没有 http(s) 协议头的地址按 https 处理
fn normalize_endpoint(endpoint: &str) -> String {
  match Url::parse(endpoint) {
    Ok(url) if matches!(url.scheme(), "http" | "https") => endpoint.trim_end_matches('/').to_string(),
    _ => format!("{}://{}", DEFAULT_SCHEME, endpoint.trim_end_matches('/')),
  }
}

impl ObjectStore for S3ObjectStore {
  fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
    debug!("读取对象: bucket={}, key={}", bucket, key);
    let handle = Bucket::new(bucket, self.region.clone(), self.credentials.clone())
      .map_err(|e| StorageError::Backend(e.to_string()))?
      .with_path_style();

    let response = handle
      .get_object(key)
      .map_err(|e| StorageError::Backend(e.to_string()))?;

    let status = response.status_code();
    if status != 200 {
      return Err(StorageError::Status {
        bucket: bucket.to_string(),
        key: key.to_string(),
        status,
      });
    }
    Ok(response.bytes().to_vec())
  }
}
