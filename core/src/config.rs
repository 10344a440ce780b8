// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::str::FromStr;
use std::time::Duration;

use log::warn;

pub const ENDPOINT_VAR: &str = "NGF_IPC_ENDPOINT";
pub const REQUEST_TIMEOUT_VAR: &str = "NGF_REQUEST_TIMEOUT_MS";

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

/// Client settings. Every field can be overridden from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Local socket (unix) or named pipe (windows) the daemon listens on.
    pub endpoint: String,
    /// Upper bound for a pause, resume or stop call. Plays are not limited.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(None),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let endpoint = match lookup(ENDPOINT_VAR) {
            Some(endpoint) if !endpoint.trim().is_empty() => endpoint,
            _ => default_endpoint(lookup("XDG_RUNTIME_DIR")),
        };
        let timeout_ms = parse_or(&lookup, REQUEST_TIMEOUT_VAR, DEFAULT_REQUEST_TIMEOUT_MS);

        Self {
            endpoint,
            request_timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

fn parse_or<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    match lookup(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value '{}' for {}", raw, name);
            default
        }),
    }
}

#[allow(unused_variables)]
fn default_endpoint(runtime_dir: Option<String>) -> String {
    #[cfg(windows)]
    { r"\\.\pipe\ngfd".to_string() }
    #[cfg(not(windows))]
    {
        let base = runtime_dir.unwrap_or_else(|| "/tmp".into());
        format!("{base}/ngf/ngfd.sock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = ClientConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENDPOINT_VAR, "/run/user/1000/custom.sock"),
            (REQUEST_TIMEOUT_VAR, "250"),
        ]));
        assert_eq!(config.endpoint, "/run/user/1000/custom.sock");
        assert_eq!(config.request_timeout, Duration::from_millis(250));
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[(REQUEST_TIMEOUT_VAR, "-1")]));
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
    }

    #[cfg(unix)]
    #[test]
    fn endpoint_follows_runtime_dir() {
        let config = ClientConfig::from_lookup(lookup_from(&[("XDG_RUNTIME_DIR", "/run/user/1000")]));
        assert_eq!(config.endpoint, "/run/user/1000/ngf/ngfd.sock");

        let config = ClientConfig::from_lookup(lookup_from(&[(ENDPOINT_VAR, "  ")]));
        assert_eq!(config.endpoint, "/tmp/ngf/ngfd.sock");
    }
}
