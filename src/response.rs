// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use crate::{
    header::Headers,
    param::*,
    util::{format_http_date, HtmlBuilder},
};

use bytes::Bytes;
use chrono::Utc;

/// 正在组装或已经完成的响应。
///
/// 构造时即带有 `Server` 与 `Date` 头；发送前调用 [`Response::finalize`]
/// 补齐 `Content-Length` 和错误页。
#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    headers: Headers,
    content: Option<Bytes>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        let mut headers = Headers::new();
        headers.append("Server", SERVER_NAME);
        headers.append("Date", &format_http_date(&Utc::now()));
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: reason_phrase(200).to_string(),
            headers,
            content: None,
        }
    }

    pub fn from_status_code(code: u16) -> Self {
        let mut response = Self::new();
        response.set_code(code);
        response
    }

    /// 带说明文字的错误响应，正文为 HTML 错误页
    pub fn error_page(code: u16, note: &str) -> Self {
        let mut response = Self::from_status_code(code);
        let html = HtmlBuilder::from_status_code(code, Some(note)).build();
        response
            .set_header("Content-Type", "text/html; charset=utf-8")
            .set_body(Bytes::from(html));
        response
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = reason_phrase(code).to_string();
        self
    }

    pub fn set_version(&mut self, version: HttpVersion) -> &mut Self {
        self.version = version;
        self
    }

    /// 替换同名头
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    /// 追加头，`Set-Cookie` 等允许重复的头使用
    pub fn append_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.append(name, value);
        self
    }

    pub fn set_body(&mut self, body: Bytes) -> &mut Self {
        self.content = Some(body);
        self
    }

    /// 设置 `Content-Length`；状态码 ≥300 且没有显式正文时生成最小 HTML 错误页。
    /// 1xx 与 204 响应不带正文，也不带 `Content-Length`。
    pub fn finalize(&mut self) -> &mut Self {
        if self.status_code < 200 || self.status_code == 204 {
            self.content = None;
            self.headers.remove("Content-Length");
            return self;
        }
        if self.status_code >= 300 && self.content.is_none() {
            let html = HtmlBuilder::from_status_code(self.status_code, None).build();
            self.headers.insert("Content-Type", "text/html; charset=utf-8");
            self.content = Some(Bytes::from(html));
        }
        let length = self.content.as_ref().map_or(0, |c| c.len());
        self.headers.insert("Content-Length", &length.to_string());
        self
    }

    /// 状态行与头部（含结尾空行）
    pub fn head_bytes(&self) -> Vec<u8> {
        let version = match self.version {
            HttpVersion::V1_0 => "HTTP/1.0",
            _ => "HTTP/1.1",
        };
        let mut head = format!("{} {} {}{}", version, self.status_code, self.information, CRLF);
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str(CRLF);
        }
        head.push_str(CRLF);
        head.into_bytes()
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let mut bytes = self.head_bytes();
        if let Some(content) = &self.content {
            bytes.extend_from_slice(content);
        }
        bytes
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    /// 拆分为头部与正文，HTTP/2 适配层转换帧时使用
    pub fn into_parts(self) -> (u16, Headers, Option<Bytes>) {
        (self.status_code, self.headers, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_new_has_server_and_date() {
        let response = Response::new();
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.information(), "OK");
        assert_eq!(response.header("Server"), Some(SERVER_NAME));
        assert!(response.header("Date").is_some_and(|d| d.ends_with("GMT")));
    }

    #[test]
    fn test_response_as_bytes_basic() {
        let mut response = Response::new();
        response.finalize();
        let text = String::from_utf8(response.as_bytes()).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.contains("Server: webengine\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_response_as_bytes_with_content() {
        let mut response = Response::new();
        response
            .set_header("Content-Type", "text/plain")
            .set_body(Bytes::from("Hello"))
            .finalize();
        let text = String::from_utf8(response.as_bytes()).unwrap();

        assert!(text.contains("Content-Type: text/plain"));
        assert!(text.contains("Content-Length: 5"));
        assert!(text.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn test_finalize_synthesizes_error_page() {
        let mut response = Response::from_status_code(404);
        response.finalize();
        let body = String::from_utf8(response.body().unwrap().to_vec()).unwrap();
        assert!(body.contains("404 Not Found"));
        assert_eq!(
            response.header("Content-Length").unwrap(),
            body.len().to_string()
        );
    }

    #[test]
    fn test_finalize_keeps_explicit_error_body() {
        let mut response = Response::from_status_code(400);
        response.set_body(Bytes::from("{\"error\":\"bad\"}")).finalize();
        assert_eq!(response.body().unwrap(), &Bytes::from("{\"error\":\"bad\"}"));
    }

    #[test]
    fn test_finalize_no_page_below_300() {
        let mut response = Response::from_status_code(200);
        response.finalize();
        assert!(response.body().is_none());
        assert_eq!(response.header("Content-Length"), Some("0"));
    }

    #[test]
    fn test_finalize_no_content_length_on_204() {
        let mut response = Response::from_status_code(204);
        response.set_body(Bytes::from("ignored")).finalize();
        assert!(response.body().is_none());
        assert_eq!(response.header("Content-Length"), None);
        let text = String::from_utf8(response.as_bytes()).unwrap();
        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
        assert!(!text.contains("Content-Length"));
    }

    #[test]
    fn test_status_code_various() {
        for (code, expected_info) in [
            (201, "Created"),
            (301, "Moved Permanently"),
            (401, "Unauthorized"),
            (403, "Forbidden"),
            (500, "Internal Server Error"),
        ] {
            let response = Response::from_status_code(code);
            assert_eq!(response.status_code(), code);
            assert_eq!(response.information(), expected_info);
        }
    }

    #[test]
    fn test_set_cookie_headers_are_appended() {
        let mut response = Response::new();
        response
            .append_header("Set-Cookie", "a=1")
            .append_header("Set-Cookie", "b=2");
        let text = String::from_utf8(response.head_bytes()).unwrap();
        assert!(text.contains("Set-Cookie: a=1\r\n"));
        assert!(text.contains("Set-Cookie: b=2\r\n"));
    }

    #[test]
    fn test_http10_status_line() {
        let mut response = Response::new();
        response.set_version(HttpVersion::V1_0);
        let text = String::from_utf8(response.head_bytes()).unwrap();
        assert!(text.starts_with("HTTP/1.0 200 OK"));
    }
}
