// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块集中定义引擎遵循的 HTTP 协议常量和强类型枚举：
//! - 状态码与原因短语（Reason Phrase）映射表。
//! - 文件后缀到 MIME 类型的映射表。
//! - 会话 Cookie 名称、分块大小等运行参数。
//! - HTTP 方法、版本及压缩编码的枚举。

use lazy_static::lazy_static;
use std::{collections::HashMap, fmt, path::Path};

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "webengine";

/// HTTP/1.x 报文换行符
pub const CRLF: &str = "\r\n";

/// 静态文件与推送资源的分块大小（32 KiB）
pub const CHUNK_SIZE: usize = 32 * 1024;

/// 请求头部分允许的最大字节数，超出视为畸形请求
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// 请求体默认的最大字节数（8 MiB）
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// 会话 ID 所在的 Cookie 名称
pub const SESSION_COOKIE: &str = "sessionId";

/// 登录令牌所在的 Cookie 名称
pub const TOKEN_COOKIE: &str = "token";

/// 推送请求缺失 `:authority` 时使用的默认值
pub const DEFAULT_AUTHORITY: &str = "localhost:8888";

/// “永不过期” Cookie 的过期时间
pub const FAR_FUTURE_EXPIRES: &str = "Fri, 31 Dec 9999 23:59:59 GMT";

/// 用于清除 Cookie 的过去时间
pub const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

lazy_static! {
    /// 状态码与标准原因短语映射表（RFC 9110）。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(100, "Continue");
        map.insert(101, "Switching Protocols");

        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(202, "Accepted");
        map.insert(204, "No Content");
        map.insert(206, "Partial Content");

        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(303, "See Other");
        map.insert(304, "Not Modified");
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");

        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(406, "Not Acceptable");
        map.insert(408, "Request Timeout");
        map.insert(409, "Conflict");
        map.insert(411, "Length Required");
        map.insert(413, "Content Too Large");
        map.insert(414, "URI Too Long");
        map.insert(415, "Unsupported Media Type");
        map.insert(422, "Unprocessable Content");
        map.insert(429, "Too Many Requests");

        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(502, "Bad Gateway");
        map.insert(503, "Service Unavailable");
        map.insert(504, "Gateway Timeout");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

lazy_static! {
    /// 文件后缀名到 `Content-Type` 的映射表。
    ///
    /// 文本类型统一携带 `charset=utf-8`。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("html", "text/html; charset=utf-8");
        map.insert("htm", "text/html; charset=utf-8");
        map.insert("css", "text/css; charset=utf-8");
        map.insert("js", "text/javascript; charset=utf-8");
        map.insert("mjs", "text/javascript; charset=utf-8");
        map.insert("txt", "text/plain; charset=utf-8");
        map.insert("csv", "text/csv; charset=utf-8");
        map.insert("xml", "text/xml; charset=utf-8");
        map.insert("json", "application/json");
        map.insert("map", "application/json");
        map.insert("webmanifest", "application/manifest+json");
        map.insert("wasm", "application/wasm");
        map.insert("pdf", "application/pdf");
        map.insert("zip", "application/zip");
        map.insert("gz", "application/gzip");
        map.insert("png", "image/png");
        map.insert("jpg", "image/jpeg");
        map.insert("jpeg", "image/jpeg");
        map.insert("gif", "image/gif");
        map.insert("svg", "image/svg+xml");
        map.insert("ico", "image/x-icon");
        map.insert("webp", "image/webp");
        map.insert("avif", "image/avif");
        map.insert("woff", "font/woff");
        map.insert("woff2", "font/woff2");
        map.insert("ttf", "font/ttf");
        map.insert("otf", "font/otf");
        map.insert("mp3", "audio/mpeg");
        map.insert("mp4", "video/mp4");
        map.insert("webm", "video/webm");
        map
    };
}

/// 无法识别后缀时使用的兜底类型
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// 查询状态码的原因短语，未知状态码返回 `"Unknown Status"`。
pub fn reason_phrase(code: u16) -> &'static str {
    STATUS_CODES.get(&code).copied().unwrap_or("Unknown Status")
}

/// 根据文件后缀推断 `Content-Type`。
pub fn mime_for(path: &Path) -> &'static str {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .and_then(|e| MIME_TYPES.get(e.as_str()).copied())
        .unwrap_or(DEFAULT_MIME)
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    V1_0,
    V1_1,
    /// 经由 HTTP/2 适配层进入的请求
    V2,
}

/// 标准 HTTP 请求方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpRequestMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpRequestMethod {
    /// 解析方法名（大小写不敏感），不支持的方法返回 `None`。
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            _ => None,
        }
    }
}

/// 响应压缩支持的内容编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpEncoding {
    /// GNU zip 压缩
    Gzip,
    /// zlib 封装的 deflate 压缩
    Deflate,
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
            HttpVersion::V2 => write!(f, "HTTP/2"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 格式化为大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            HttpRequestMethod::Get => "GET",
            HttpRequestMethod::Head => "HEAD",
            HttpRequestMethod::Options => "OPTIONS",
            HttpRequestMethod::Post => "POST",
            HttpRequestMethod::Put => "PUT",
            HttpRequestMethod::Delete => "DELETE",
            HttpRequestMethod::Patch => "PATCH",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for HttpEncoding {
    /// 格式化为 `Content-Encoding` 头所使用的标识符
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpEncoding::Gzip => write!(f, "gzip"),
            HttpEncoding::Deflate => write!(f, "deflate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_phrase() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(reason_phrase(401), "Unauthorized");
        assert_eq!(reason_phrase(999), "Unknown Status");
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(mime_for(Path::new("a/b/STYLE.CSS")), "text/css; charset=utf-8");
        assert_eq!(mime_for(Path::new("noext")), DEFAULT_MIME);
        assert_eq!(mime_for(Path::new("x.unknown")), DEFAULT_MIME);
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(HttpRequestMethod::parse("get"), Some(HttpRequestMethod::Get));
        assert_eq!(HttpRequestMethod::parse("DELETE"), Some(HttpRequestMethod::Delete));
        assert_eq!(HttpRequestMethod::parse("BREW"), None);
        assert_eq!(HttpRequestMethod::Options.to_string(), "OPTIONS");
    }
}
