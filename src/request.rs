// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求头解析模块
//!
//! 将从连接读取的原始请求头字节解析为强类型的 [`RequestHead`]：
//! 1. 请求行（方法、目标、版本）。
//! 2. 全部请求头，保留顺序。
//! 3. 路径与查询字符串的拆分、`Content-Length` 与 keep-alive 规则。
//!
//! 请求体不在此处处理，由连接状态机按 `Content-Length` 分块读取。

use crate::{exception::Exception, header::Headers, param::*};
use log::error;

/// 一个请求的头部元数据。
#[derive(Debug, Clone)]
pub struct RequestHead {
    method: HttpRequestMethod,
    /// 请求目标（包含查询字符串）
    uri: String,
    version: HttpVersion,
    headers: Headers,
}

impl RequestHead {
    /// 直接由已解码的各部分构造，HTTP/2 适配层使用。
    pub fn new(method: HttpRequestMethod, uri: &str, version: HttpVersion, headers: Headers) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            version,
            headers,
        }
    }

    /// 从原始字节尝试构建 `RequestHead`。
    ///
    /// `buffer` 应包含请求行与全部请求头，可以带或不带结尾的空行。
    /// `id` 仅用于日志追踪。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let head = match std::str::from_utf8(buffer) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let mut lines = head.split(CRLF);
        let request_line = lines.next().unwrap_or_default();
        let parts: Vec<&str> = request_line.split(' ').filter(|p| !p.is_empty()).collect();
        if parts.len() != 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::MalformedRequest);
        }

        let method = match HttpRequestMethod::parse(parts[0]) {
            Some(m) => m,
            None => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, parts[0]);
                return Err(Exception::UnsupportedRequestMethod);
            }
        };

        let version = match parts[2].to_ascii_uppercase().as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            other => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, other);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        let uri = parts[1].to_string();
        if uri.contains('\0') {
            error!("[ID{}]请求目标中包含空字节", id);
            return Err(Exception::MalformedRequest);
        }

        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => {
                    headers.append(name.trim(), value.trim());
                }
                _ => {
                    error!("[ID{}]无法解析的请求头：{}", id, line);
                    return Err(Exception::MalformedRequest);
                }
            }
        }

        Ok(Self {
            method,
            uri,
            version,
            headers,
        })
    }
}

impl RequestHead {
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// 完整的请求目标（含查询字符串）
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// 去掉查询字符串后的路径
    pub fn path(&self) -> &str {
        match self.uri.split_once('?') {
            Some((path, _)) => path,
            None => &self.uri,
        }
    }

    /// 查询字符串（不含 `?`）
    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, q)| q)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// 缺失时为 0。值不是十进制数字，或多个 `Content-Length` 互相冲突时，
    /// 请求体边界无法确定，返回 [`Exception::MalformedRequest`]。
    pub fn content_length(&self) -> Result<usize, Exception> {
        let mut length = None;
        for value in self.headers.get_all("Content-Length").flat_map(|v| v.split(',')) {
            let value = value.trim();
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Exception::MalformedRequest);
            }
            let parsed = value
                .parse::<usize>()
                .map_err(|_| Exception::MalformedRequest)?;
            match length {
                Some(previous) if previous != parsed => return Err(Exception::MalformedRequest),
                _ => length = Some(parsed),
            }
        }
        Ok(length.unwrap_or(0))
    }

    /// HTTP/1.1 默认保持连接，HTTP/1.0 默认关闭，`Connection` 头可覆盖。
    pub fn keep_alive(&self) -> bool {
        match self.header("Connection").map(|v| v.to_ascii_lowercase()) {
            Some(v) if v.contains("close") => false,
            Some(v) if v.contains("keep-alive") => true,
            _ => self.version != HttpVersion::V1_0,
        }
    }
}
