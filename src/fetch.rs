// 该文件是 Biaozhu （标注） 项目的一部分。
// src/fetch.rs - 图像获取
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

use std::{io::Read, sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, error};

use crate::storage::{ObjectStore, StorageError, split_object_path};

const HTTP_SCHEME: &str = "http";

#[derive(Error, Debug)]
pub enum FetchError {
  #[error("Image request returned status {status}: {body}")]
  Upstream { status: u16, body: String },
  #[error("Image request failed: {0}")]
  Transport(String),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Object store error: {0}")]
  Storage(#[from] StorageError),
}

/// 根据图像地址选择 HTTP 下载或对象存储读取
pub struct ImageFetcher {
  agent: ureq::Agent,
  store: Arc<dyn ObjectStore>,
}

impl ImageFetcher {
  pub fn new(store: Arc<dyn ObjectStore>, timeout: Option<Duration>) -> Self {
    let mut builder = ureq::AgentBuilder::new();
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    ImageFetcher {
      agent: builder.build(),
      store,
    }
  }

  pub fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
    if locator.starts_with(HTTP_SCHEME) {
      self.fetch_http(locator)
    } else {
      let (bucket, key) = split_object_path(locator)?;
      Ok(self.store.get_object(&bucket, &key)?)
    }
  }

  fn fetch_http(&self, url: &str) -> Result<Vec<u8>, FetchError> {
    debug!("下载图像: {}", url);
    match self.agent.get(url).call() {
      Ok(response) if response.status() == 200 => {
        let mut data = Vec::new();
        response.into_reader().read_to_end(&mut data)?;
        debug!("图像大小: {} 字节", data.len());
        Ok(data)
      }
      Ok(response) => Err(upstream(response.status(), response)),
      Err(ureq::Error::Status(status, response)) => Err(upstream(status, response)),
      Err(ureq::Error::Transport(transport)) => {
        error!("图像下载失败: {}", transport);
        Err(FetchError::Transport(transport.to_string()))
      }
    }
  }
}

fn upstream(status: u16, response: ureq::Response) -> FetchError {
  let body = response.into_string().unwrap_or_default();
  error!("图像下载返回状态码 {}: {}", status, body);
  FetchError::Upstream { status, body }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  #[derive(Default)]
  struct Recorder {
    calls: Mutex<Vec<(String, String)>>,
  }

  impl ObjectStore for Recorder {
    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
      self
        .calls
        .lock()
        .unwrap()
        .push((bucket.to_string(), key.to_string()));
      Ok(vec![1, 2, 3])
    }
  }

  #[test]
  fn object_path_requests_bucket_and_key() {
    let store = Arc::new(Recorder::default());
    let fetcher = ImageFetcher::new(store.clone(), None);

    let data = fetcher.fetch("bucket/object.jpg").unwrap();
    assert_eq!(data, vec![1, 2, 3]);
    assert_eq!(
      *store.calls.lock().unwrap(),
      vec![("bucket".to_string(), "object.jpg".to_string())]
    );
  }

  #[test]
  fn unreachable_host_is_transport_error() {
    let fetcher = ImageFetcher::new(Arc::new(Recorder::default()), Some(Duration::from_secs(2)));
    let err = fetcher.fetch("http://127.0.0.1:1/image.jpg").unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)));
  }
}
