// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求上下文与响应构建器
//!
//! [`RequestContext`] 是交给处理器的请求视图：不可变的请求头与正文，
//! 加上一张参数表。参数来源依次为查询字符串、路径参数、请求体
//! （form-urlencoded 或 multipart），键冲突时后写入者覆盖先写入者。
//!
//! [`ResponseBuilder`] 持有一次性通道的发送端，`complete`/`fail`
//! 按值消费自身，因此每个响应至多完成一次。

use std::collections::HashMap;

use bytes::Bytes;
use log::{debug, error};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::{
    header::Headers,
    param::{HttpRequestMethod, TOKEN_COOKIE},
    request::RequestHead,
    response::Response,
    session::Session,
    util::parse_cookies,
};

/// 参数值：文本，或上传文件的原始字节
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Binary(Bytes),
}

impl ParamValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s.as_str()),
            ParamValue::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ParamValue::Text(s) => s.as_bytes(),
            ParamValue::Binary(b) => &b[..],
        }
    }
}

#[derive(Debug)]
pub struct RequestContext {
    id: u128,
    head: RequestHead,
    body: Bytes,
    params: HashMap<String, ParamValue>,
    session: Option<Session>,
    remote_ip: String,
}

impl RequestContext {
    /// 创建上下文并立即解析查询字符串
    pub fn new(id: u128, head: RequestHead, body: Bytes, remote_ip: &str) -> Self {
        let mut context = Self {
            id,
            head,
            body,
            params: HashMap::new(),
            session: None,
            remote_ip: remote_ip.to_string(),
        };
        if let Some(query) = context.head.query() {
            let pairs = parse_urlencoded(query.as_bytes());
            context.insert_params(pairs);
        }
        context
    }

    pub(crate) fn insert_path_params(&mut self, params: HashMap<String, String>) {
        self.insert_params(params.into_iter().map(|(k, v)| (k, ParamValue::Text(v))));
    }

    pub(crate) fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    fn insert_params<I: IntoIterator<Item = (String, ParamValue)>>(&mut self, pairs: I) {
        for (key, value) in pairs {
            self.params.insert(key, value);
        }
    }

    /// 按 `Content-Type` 解析请求体参数，其他类型的正文保持原样不解析。
    pub(crate) fn parse_body(&mut self) {
        if self.body.is_empty() {
            return;
        }
        let content_type = match self.head.header("Content-Type") {
            Some(ct) => ct.to_ascii_lowercase(),
            None => return,
        };
        if content_type.starts_with("application/x-www-form-urlencoded") {
            let pairs = parse_urlencoded(&self.body);
            self.insert_params(pairs);
        } else if content_type.starts_with("multipart/form-data") {
            let boundary = self
                .head
                .header("Content-Type")
                .and_then(multipart_boundary);
            match boundary {
                Some(boundary) => {
                    let parts = parse_multipart(&self.body, &boundary);
                    debug!("[ID{}]multipart解析得到{}个参数", self.id, parts.len());
                    self.insert_params(parts);
                }
                None => error!("[ID{}]multipart请求缺少boundary参数", self.id),
            }
        }
    }
}

impl RequestContext {
    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.head.method()
    }

    pub fn path(&self) -> &str {
        self.head.path()
    }

    pub fn uri(&self) -> &str {
        self.head.uri()
    }

    pub fn headers(&self) -> &Headers {
        self.head.headers()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.header(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// 文本参数的便捷访问
    pub fn param_text(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(ParamValue::as_text)
    }

    pub fn params(&self) -> &HashMap<String, ParamValue> {
        &self.params
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn remote_ip(&self) -> &str {
        &self.remote_ip
    }

    /// 请求携带的 `token` Cookie
    pub fn token_cookie(&self) -> Option<String> {
        self.header("Cookie")
            .map(parse_cookies)
            .and_then(|mut c| c.remove(TOKEN_COOKIE))
    }
}

fn parse_urlencoded(input: &[u8]) -> Vec<(String, ParamValue)> {
    url::form_urlencoded::parse(input)
        .map(|(k, v)| (k.into_owned(), ParamValue::Text(v.into_owned())))
        .collect()
}

/// 从 `Content-Type` 中取出 `boundary=` 参数并加上 `--` 前缀
fn multipart_boundary(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then(|| format!("--{}", value))
        } else {
            None
        }
    })
}

fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// 单遍扫描已完整缓冲的 multipart 正文。
///
/// 带 `filename` 的部分写入两条参数：`name → filename` 与
/// `filename → 原始字节`；其余部分写入 `name → 文本`。
fn parse_multipart(body: &[u8], boundary: &str) -> Vec<(String, ParamValue)> {
    let boundary = boundary.as_bytes();
    let mut params = Vec::new();
    let mut cursor = match find_from(body, boundary, 0) {
        Some(p) => p + boundary.len(),
        None => return params,
    };

    while let Some(next) = find_from(body, boundary, cursor) {
        if body[cursor..].starts_with(b"--") {
            break;
        }
        let part = trim_crlf(&body[cursor..next]);
        cursor = next + boundary.len();

        let split = match find_from(part, b"\r\n\r\n", 0) {
            Some(s) => s,
            None => continue,
        };
        let header_block = String::from_utf8_lossy(&part[..split]);
        let content = &part[split + 4..];

        let mut name = None;
        let mut filename = None;
        for line in header_block.split("\r\n") {
            if !line.to_ascii_lowercase().starts_with("content-disposition") {
                continue;
            }
            for field in line.split(';') {
                if let Some((key, value)) = field.trim().split_once('=') {
                    let key = key.trim();
                    let value = value.trim().trim_matches('"').to_string();
                    if key.eq_ignore_ascii_case("name") {
                        name = Some(value);
                    } else if key.eq_ignore_ascii_case("filename") {
                        filename = Some(value);
                    }
                }
            }
        }

        let name = match name {
            Some(n) => n,
            None => continue,
        };
        match filename {
            Some(filename) => {
                params.push((name, ParamValue::Text(filename.clone())));
                params.push((filename, ParamValue::Binary(Bytes::copy_from_slice(content))));
            }
            None => {
                let text = String::from_utf8_lossy(content).into_owned();
                params.push((name, ParamValue::Text(text)));
            }
        }
    }
    params
}

fn trim_crlf(mut part: &[u8]) -> &[u8] {
    if part.starts_with(b"\r\n") {
        part = &part[2..];
    }
    if part.ends_with(b"\r\n") {
        part = &part[..part.len() - 2];
    }
    part
}

/// 处理器填写响应的入口。
///
/// 分发器会预先写入 CORS 与会话 Cookie 等头，处理器在此基础上补充。
#[derive(Debug)]
pub struct ResponseBuilder {
    response: Response,
    completion: oneshot::Sender<Response>,
}

impl ResponseBuilder {
    pub(crate) fn new(response: Response, completion: oneshot::Sender<Response>) -> Self {
        Self {
            response,
            completion,
        }
    }

    /// 创建一个独立的构建器与接收端，测试处理器时使用
    pub fn channel() -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(Response::new(), tx), rx)
    }

    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        self.response.set_header(name, value);
        self
    }

    /// 追加 `Set-Cookie`
    pub fn cookie(&mut self, name: &str, value: &str, expires: &str) -> &mut Self {
        let cookie = crate::util::set_cookie_value(name, value, expires);
        self.response.append_header("Set-Cookie", &cookie);
        self
    }

    pub fn body<B: Into<Bytes>>(&mut self, body: B) -> &mut Self {
        self.response.set_body(body.into());
        self
    }

    /// 序列化为 JSON 正文并设置 `Content-Type`
    pub fn json<T: Serialize>(&mut self, value: &T) -> &mut Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.response
                    .set_header("Content-Type", "application/json")
                    .set_body(Bytes::from(bytes));
            }
            Err(e) => error!("无法序列化JSON响应: {}", e),
        }
        self
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// 以 `status` 完成响应
    pub fn complete(mut self, status: u16) {
        self.response.set_code(status);
        self.send();
    }

    /// 以错误状态完成响应，`reason` 写入错误页正文
    pub fn fail(self, status: u16, reason: &str) {
        let mut error = Response::error_page(status, reason);
        for (name, value) in self.response.headers() {
            if name.eq_ignore_ascii_case("Set-Cookie") || name.starts_with("Access-Control-") {
                error.append_header(name, value);
            }
        }
        let _ = self.completion.send(error);
    }

    fn send(self) {
        if self.completion.send(self.response).is_err() {
            debug!("连接已关闭，响应被丢弃");
        }
    }
}
