use serde::{Deserialize, Serialize};

use crate::config::CheckOptions;
use crate::error::CheckError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckRequest {
    pub address: String,
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default)]
    pub proxy: String,
}

impl CheckRequest {
    /// Options for this request. `default_proxy` stands in when `use_proxy` is set
    /// without an explicit proxy.
    pub fn options(&self, base: &CheckOptions, default_proxy: Option<&str>) -> Result<CheckOptions, CheckError> {
        if !self.use_proxy {
            return Ok(base.clone().with_proxy(""));
        }

        let proxy = match self.proxy.trim() {
            "" => default_proxy.map(str::trim).unwrap_or_default(),
            proxy => proxy,
        };
        if proxy.is_empty() {
            return Err(CheckError::InvalidRequest(
                "use_proxy is set but no proxy was given".to_string(),
            ));
        }
        Ok(base.clone().with_proxy(proxy))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub host: String,
    pub port: u16,
    pub ping_success: bool,
    pub ping_summary: String,
    pub port_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_error: Option<String>,
    pub http_checked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_error: Option<String>,
    pub message: String,
}
