// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::collections::HashMap;
use std::fs;

use crate::param::{CHUNK_SIZE, DEFAULT_AUTHORITY, MAX_BODY_SIZE};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_www_root")]
    www_root: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_cache_size")]
    cache_size: usize,
    #[serde(default = "default_local")]
    local: bool,
    /// 静态文件服务的 URL 前缀
    #[serde(default = "default_web_prefix")]
    web_prefix: String,
    #[serde(default)]
    cors: bool,
    #[serde(default = "default_cors_max_age")]
    cors_max_age: u32,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    /// 单个请求体允许的最大字节数
    #[serde(default = "default_max_body_size")]
    max_body_size: usize,
    /// 推送请求缺少 `:authority` 时使用
    #[serde(default = "default_push_authority")]
    push_authority: String,
    /// 演示用的用户名 → 密码表
    #[serde(default)]
    credentials: HashMap<String, String>,
}

fn default_www_root() -> String {
    "./static".to_string()
}

fn default_port() -> u16 {
    8888
}

fn default_cache_size() -> usize {
    16
}

fn default_local() -> bool {
    true
}

fn default_web_prefix() -> String {
    "/web/".to_string()
}

fn default_cors_max_age() -> u32 {
    86400
}

fn default_chunk_size() -> usize {
    CHUNK_SIZE
}

fn default_max_body_size() -> usize {
    MAX_BODY_SIZE
}

fn default_push_authority() -> String {
    DEFAULT_AUTHORITY.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            www_root: default_www_root(),
            port: default_port(),
            worker_threads: 0,
            cache_size: default_cache_size(),
            local: default_local(),
            web_prefix: default_web_prefix(),
            cors: false,
            cors_max_age: default_cors_max_age(),
            chunk_size: default_chunk_size(),
            max_body_size: default_max_body_size(),
            push_authority: default_push_authority(),
            credentials: HashMap::new(),
        }
    }

    /// 从 TOML 文件读取配置，文件不可读或格式错误时使用默认配置
    pub fn from_toml(filename: &str) -> Self {
        let raw = match fs::read_to_string(filename) {
            Ok(s) => s,
            Err(e) => {
                error!("无法读取配置文件{}：{}，使用默认配置", filename, e);
                return Self::new().normalized();
            }
        };
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Self {
        let config = match toml::from_str(raw) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        };
        config.normalized()
    }

    fn normalized(mut self) -> Self {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.chunk_size == 0 {
            warn!("chunk_size被设置为0，改为默认值{}", CHUNK_SIZE);
            self.chunk_size = CHUNK_SIZE;
        }
        if !self.web_prefix.starts_with('/') {
            self.web_prefix.insert(0, '/');
        }
        if !self.web_prefix.ends_with('/') {
            self.web_prefix.push('/');
        }
        self
    }

    pub fn with_www_root(mut self, root: &str) -> Self {
        self.www_root = root.to_string();
        self
    }

    pub fn with_cors(mut self, cors: bool) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_credential(mut self, username: &str, password: &str) -> Self {
        self.credentials
            .insert(username.to_string(), password.to_string());
        self
    }
}

impl Config {
    pub fn www_root(&self) -> &str {
        &self.www_root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn web_prefix(&self) -> &str {
        &self.web_prefix
    }

    pub fn cors(&self) -> bool {
        self.cors
    }

    pub fn cors_max_age(&self) -> u32 {
        self.cors_max_age
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    pub fn push_authority(&self) -> &str {
        &self.push_authority
    }

    pub fn credentials(&self) -> &HashMap<String, String> {
        &self.credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_missing_fields() {
        let config = Config::from_toml_str("port = 9000\ncors = true\n");
        assert_eq!(config.port(), 9000);
        assert!(config.cors());
        assert_eq!(config.web_prefix(), "/web/");
        assert_eq!(config.chunk_size(), 32 * 1024);
        assert_eq!(config.push_authority(), "localhost:8888");
        assert_eq!(config.max_body_size(), 8 * 1024 * 1024);
        assert!(config.worker_threads() > 0);
    }

    #[test]
    fn test_credentials_table() {
        let config = Config::from_toml_str("[credentials]\nadmin = \"secret\"\n");
        assert_eq!(config.credentials().get("admin").map(String::as_str), Some("secret"));
    }

    #[test]
    fn test_invalid_toml_falls_back() {
        let config = Config::from_toml_str("port = \"not a number\"");
        assert_eq!(config.port(), 8888);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = Config::from_toml("/nonexistent/development.toml");
        assert_eq!(config.www_root(), "./static");
    }

    #[test]
    fn test_web_prefix_normalized() {
        let config = Config::from_toml_str("web_prefix = \"assets\"");
        assert_eq!(config.web_prefix(), "/assets/");
    }
}
