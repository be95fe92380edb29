//! HTTP seam for queue replay.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::error::NetworkError;

/// Issues one HTTP request on behalf of the sync manager.
///
/// Success is any 2xx response; everything else, including transport
/// failures, is an error for retry-counting purposes.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn execute(&self, method: &str, url: &str, body: Option<&Value>)
    -> Result<(), NetworkError>;
}

/// Transport backed by reqwest. Queued urls may be absolute or
/// relative to the configured API base.
pub struct HttpTransport {
  client: reqwest::Client,
  base: Url,
}

impl HttpTransport {
  pub fn new(base: Url) -> Self {
    Self {
      client: reqwest::Client::new(),
      base,
    }
  }

  pub fn base(&self) -> &Url {
    &self.base
  }

  fn resolve(&self, url: &str) -> Result<Url, NetworkError> {
    self
      .base
      .join(url)
      .map_err(|e| NetworkError::BadRequest(format!("invalid url {}: {}", url, e)))
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn execute(
    &self,
    method: &str,
    url: &str,
    body: Option<&Value>,
  ) -> Result<(), NetworkError> {
    let method = Method::from_bytes(method.as_bytes())
      .map_err(|_| NetworkError::BadRequest(format!("invalid method {}", method)))?;
    let url = self.resolve(url)?;

    // JSON body is omitted for GET-like methods
    let send_body = method != Method::GET && method != Method::HEAD;
    let mut request = self.client.request(method, url);
    if let (true, Some(body)) = (send_body, body) {
      request = request.json(body);
    }

    let response = request.send().await?;
    if response.status().is_success() {
      Ok(())
    } else {
      Err(NetworkError::Status(response.status().as_u16()))
    }
  }
}

#[cfg(test)]
pub(crate) mod testing {
  //! Scripted transport for exercising the sync manager without a
  //! network.

  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;

  /// Records every request and answers from a script.
  pub struct ScriptedTransport {
    requests: Mutex<Vec<(String, String, Option<Value>)>>,
    fail: AtomicBool,
    fail_urls: Mutex<std::collections::HashSet<String>>,
    delay: Option<Duration>,
  }

  impl ScriptedTransport {
    pub fn succeeding() -> Self {
      Self {
        requests: Mutex::new(Vec::new()),
        fail: AtomicBool::new(false),
        fail_urls: Mutex::new(std::collections::HashSet::new()),
        delay: None,
      }
    }

    pub fn failing() -> Self {
      let transport = Self::succeeding();
      transport.fail.store(true, Ordering::SeqCst);
      transport
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
      self.delay = Some(delay);
      self
    }

    /// Fail only requests for this exact url.
    pub fn fail_url(&self, url: &str) {
      self.fail_urls.lock().unwrap().insert(url.to_string());
    }

    /// Requests seen so far, in issue order.
    pub fn requests(&self) -> Vec<(String, String, Option<Value>)> {
      self.requests.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl Transport for ScriptedTransport {
    async fn execute(
      &self,
      method: &str,
      url: &str,
      body: Option<&Value>,
    ) -> Result<(), NetworkError> {
      self
        .requests
        .lock()
        .unwrap()
        .push((method.to_string(), url.to_string(), body.cloned()));

      if let Some(delay) = self.delay {
        tokio::time::sleep(delay).await;
      }

      if self.fail.load(Ordering::SeqCst) || self.fail_urls.lock().unwrap().contains(url) {
        Err(NetworkError::Status(500))
      } else {
        Ok(())
      }
    }
  }
}
