//! Blocking HTTP client for the remote topology service.
//!
//! Cell sets travel as `application/octet-stream` bodies in the binary
//! codec layout; `/meta` and `/save` answer JSON.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::TopologyService;
use crate::config::PatchMeta;
use crate::error::{GridError, GridResult};
use crate::grid::codec;
use crate::types::{CellSet, SaveInfo};

const OCTET_STREAM: &str = "application/octet-stream";

/// Client for one patch's topology endpoints under `base_url`.
pub struct HttpTopologyService {
  client: Client,
  base_url: String,
}

impl HttpTopologyService {
  /// `base_url` is the patch's topology root, e.g.
  /// `http://127.0.0.1:8000/api/topo`.
  pub fn new(base_url: &str) -> GridResult<Self> {
    Self::with_timeout(base_url, Duration::from_secs(30))
  }

  pub fn with_timeout(base_url: &str, timeout: Duration) -> GridResult<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
    })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  fn url(&self, route: &str) -> String {
    format!("{}/{}", self.base_url, route)
  }

  fn check(operation: &'static str, response: Response) -> GridResult<Response> {
    let status = response.status();
    if !status.is_success() {
      return Err(GridError::transport(
        operation,
        format!("HTTP status {}", status),
      ));
    }
    Ok(response)
  }

  fn get_cells(&self, operation: &'static str, route: &str) -> GridResult<CellSet> {
    let response = self
      .client
      .get(self.url(route))
      .send()
      .map_err(|e| GridError::transport(operation, e))?;
    let bytes = Self::check(operation, response)?
      .bytes()
      .map_err(|e| GridError::transport(operation, e))?;
    debug!(operation, bytes = bytes.len(), "received cell set");
    codec::decode(&bytes)
  }

  fn post_cells(&self, operation: &'static str, route: &str, targets: &CellSet) -> GridResult<Vec<u8>> {
    let body = codec::encode(targets)?;
    let response = self
      .client
      .post(self.url(route))
      .header(CONTENT_TYPE, OCTET_STREAM)
      .body(body)
      .send()
      .map_err(|e| GridError::transport(operation, e))?;
    let bytes = Self::check(operation, response)?
      .bytes()
      .map_err(|e| GridError::transport(operation, e))?;
    Ok(bytes.to_vec())
  }
}

impl TopologyService for HttpTopologyService {
  fn meta(&self) -> GridResult<PatchMeta> {
    let response = self
      .client
      .get(self.url("meta"))
      .send()
      .map_err(|e| GridError::transport("meta", e))?;
    let bytes = Self::check("meta", response)?
      .bytes()
      .map_err(|e| GridError::transport("meta", e))?;
    PatchMeta::from_json(&bytes)
  }

  fn activate_info(&self) -> GridResult<CellSet> {
    self.get_cells("activate_info", "activate-info")
  }

  fn deleted_info(&self) -> GridResult<CellSet> {
    self.get_cells("deleted_info", "deleted-info")
  }

  fn subdivide(&self, targets: &CellSet) -> GridResult<CellSet> {
    let bytes = self.post_cells("subdivide", "subdivide", targets)?;
    codec::decode(&bytes)
  }

  fn merge(&self, targets: &CellSet) -> GridResult<CellSet> {
    let bytes = self.post_cells("merge", "merge", targets)?;
    codec::decode(&bytes)
  }

  fn delete(&self, targets: &CellSet) -> GridResult<()> {
    self.post_cells("delete", "delete", targets).map(|_| ())
  }

  fn recover(&self, targets: &CellSet) -> GridResult<()> {
    self.post_cells("recover", "recover", targets).map(|_| ())
  }

  fn pick(&self, feature_dir: &str) -> GridResult<CellSet> {
    let response = self
      .client
      .get(self.url("pick"))
      .query(&[("feature_dir", feature_dir)])
      .send()
      .map_err(|e| GridError::transport("pick", e))?;
    let bytes = Self::check("pick", response)?
      .bytes()
      .map_err(|e| GridError::transport("pick", e))?;
    codec::decode(&bytes)
  }

  fn save(&self) -> GridResult<SaveInfo> {
    let response = self
      .client
      .get(self.url("save"))
      .send()
      .map_err(|e| GridError::transport("save", e))?;
    let info = Self::check("save", response)?
      .json::<SaveInfo>()
      .map_err(|e| GridError::transport("save", e))?;
    Ok(info)
  }
}
