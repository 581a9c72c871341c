// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 集成测试共用的服务端构造与报文收发工具

#![allow(dead_code)]

use std::{fs, sync::Arc, time::Duration};

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use webengine::{
    login_handler, logout_handler, serve, Config, HttpRequestMethod::*, RouteRegistry, Server,
    SessionStore, StaticAuthenticator,
};

pub const INDEX_HTML: &[u8] = b"<!DOCTYPE html>\n<html><body><h1>webengine</h1></body></html>\n";

/// 带静态根目录与登录路由的测试服务端
pub fn test_server() -> (TempDir, Arc<Server>) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("index.html"), INDEX_HTML).unwrap();
    fs::create_dir_all(dir.path().join("css")).unwrap();
    fs::write(dir.path().join("css/site.css"), b"body{margin:0}").unwrap();

    let config = Config::new()
        .with_www_root(&dir.path().to_string_lossy())
        .with_cors(true)
        .with_credential("alice", "wonderland");
    let sessions = Arc::new(SessionStore::new());
    let authenticator = Arc::new(StaticAuthenticator::new(config.credentials().clone()));

    let mut routes = RouteRegistry::new();
    routes
        .register(Post, "/api/login", login_handler(authenticator, Arc::clone(&sessions)))
        .unwrap();
    routes
        .register(Post, "/api/logout", logout_handler(Arc::clone(&sessions)))
        .unwrap();
    routes
        .register(Get, "/api/profile", |ctx, mut res| {
            let user = ctx
                .session()
                .and_then(|s| s.token())
                .and_then(|t| t.basic_credential.clone())
                .unwrap_or_default();
            res.body(user);
            res.complete(200);
        })
        .unwrap();
    routes
        .register(Get, "/hello/:name", |ctx, mut res| {
            let name = ctx.param_text("name").unwrap_or_default().to_string();
            res.header("Content-Type", "text/plain; charset=utf-8")
                .body(format!("hello, {}", name));
            res.complete(200);
        })
        .unwrap();
    routes.set_secured(true, &[Get], "/api/*");

    let server = Server::new(config, routes, sessions);
    (dir, Arc::new(server))
}

/// 在内存双工流上发送原始请求，读取服务端关闭连接前写出的全部字节
pub async fn exchange(server: &Arc<Server>, raw: &[u8]) -> Vec<u8> {
    let (mut client, server_side) = tokio::io::duplex(256 * 1024);
    let server = Arc::clone(server);
    let task = tokio::spawn(async move { serve(server_side, "192.0.2.7", server, 0).await });

    client.write_all(raw).await.unwrap();
    client.shutdown().await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();
    let _ = task.await.unwrap();
    out
}

pub struct ParsedResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ParsedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// 按 `Content-Length` 依次切分连接上的多个响应
pub fn parse_responses(mut raw: &[u8]) -> Vec<ParsedResponse> {
    let mut responses = Vec::new();
    while !raw.is_empty() {
        let end = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let head = String::from_utf8(raw[..end].to_vec()).unwrap();
        let mut lines = head.split("\r\n");
        let status_code = lines
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .unwrap_or(0);
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(": "))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);
        let body_start = end + 4;
        let body_end = (body_start + length).min(raw.len());
        responses.push(ParsedResponse {
            status_code,
            headers,
            body: raw[body_start..body_end].to_vec(),
        });
        raw = &raw[body_end..];
    }
    responses
}

pub fn parse_single(raw: &[u8]) -> ParsedResponse {
    let mut responses = parse_responses(raw);
    assert_eq!(responses.len(), 1, "expected exactly one response");
    responses.remove(0)
}

/// 从 `Set-Cookie` 中取出指定 Cookie 的值
pub fn cookie_value(response: &ParsedResponse, name: &str) -> Option<String> {
    response.headers_named("Set-Cookie").find_map(|cookie| {
        let (pair, _) = cookie.split_once(';').unwrap_or((cookie, ""));
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}
