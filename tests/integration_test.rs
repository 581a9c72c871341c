// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 端到端集成测试：请求经由 `serve` 在内存双工流上完成完整的收发过程

mod common;

use common::*;
use tokio::sync::mpsc;
use webengine::{Frame, Headers, Http2Connection};

#[tokio::test]
async fn test_static_file_is_byte_identical() {
    let (_dir, server) = test_server();
    let raw = exchange(
        &server,
        b"GET /web/index.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    let response = parse_single(&raw);

    assert_eq!(response.status_code, 200);
    assert_eq!(response.header("Content-Type"), Some("text/html; charset=utf-8"));
    assert_eq!(
        response.header("Content-Length"),
        Some(INDEX_HTML.len().to_string().as_str())
    );
    assert_eq!(response.body, INDEX_HTML);
}

#[tokio::test]
async fn test_head_request_has_no_body() {
    let (_dir, server) = test_server();
    let raw = exchange(
        &server,
        b"HEAD /web/css/site.css HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    let text = String::from_utf8(raw).unwrap();

    assert!(text.starts_with("HTTP/1.1 200"));
    assert!(text.contains("Content-Length: 14\r\n"));
    assert!(text.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn test_missing_static_file_is_404() {
    let (_dir, server) = test_server();
    let raw = exchange(
        &server,
        b"GET /web/missing.png HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(parse_single(&raw).status_code, 404);
}

#[tokio::test]
async fn test_unmatched_route_is_404() {
    let (_dir, server) = test_server();
    let raw = exchange(&server, b"GET /nowhere HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    let response = parse_single(&raw);
    assert_eq!(response.status_code, 404);
    assert!(cookie_value(&response, "sessionId").is_none());
}

#[tokio::test]
async fn test_options_preflight() {
    let (_dir, server) = test_server();
    let raw = exchange(
        &server,
        b"OPTIONS /api/login HTTP/1.1\r\nOrigin: http://app.test\r\nConnection: close\r\n\r\n",
    )
    .await;
    let response = parse_single(&raw);

    assert_eq!(response.status_code, 204);
    assert_eq!(response.header("Content-Length"), None);
    assert_eq!(response.header("Access-Control-Max-Age"), Some("86400"));
    assert_eq!(
        response.header("Access-Control-Allow-Origin"),
        Some("http://app.test")
    );
    assert_eq!(response.header("Access-Control-Allow-Credentials"), Some("true"));
}

#[tokio::test]
async fn test_path_parameters_and_session_cookie() {
    let (_dir, server) = test_server();
    let raw = exchange(&server, b"GET /hello/ferris HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    let response = parse_single(&raw);

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body, b"hello, ferris");
    let session_id = cookie_value(&response, "sessionId").unwrap();
    assert!(server.sessions().contains(&session_id));
    assert_eq!(server.sessions().get(&session_id).unwrap().client_ip(), "192.0.2.7");
}

#[tokio::test]
async fn test_referer_suppresses_new_session() {
    let (_dir, server) = test_server();
    let raw = exchange(
        &server,
        b"GET /hello/ferris HTTP/1.1\r\nReferer: http://localhost/web/index.html\r\nConnection: close\r\n\r\n",
    )
    .await;
    let response = parse_single(&raw);
    assert_eq!(response.status_code, 200);
    assert!(cookie_value(&response, "sessionId").is_none());
    assert!(server.sessions().is_empty());
}

#[tokio::test]
async fn test_keep_alive_pipelined_requests() {
    let (_dir, server) = test_server();
    let raw = exchange(
        &server,
        b"GET /hello/a HTTP/1.1\r\n\r\nGET /hello/b HTTP/1.1\r\n\r\nGET /web/css/site.css HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;
    let responses = parse_responses(&raw);

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0].body, b"hello, a");
    assert_eq!(responses[1].body, b"hello, b");
    assert_eq!(responses[2].body, b"body{margin:0}");
    assert_eq!(responses[2].header("Connection"), Some("close"));
}

#[tokio::test]
async fn test_login_then_access_secured_route() {
    let (_dir, server) = test_server();

    let body = "username=alice&password=wonderland";
    let login = format!(
        "POST /api/login HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let response = parse_single(&exchange(&server, login.as_bytes()).await);
    assert_eq!(response.status_code, 200);
    assert_eq!(response.header("Content-Type"), Some("application/json"));

    let reply: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    let token = reply["token"].as_str().unwrap().to_string();
    assert_eq!(cookie_value(&response, "token").as_deref(), Some(token.as_str()));

    let profile = format!(
        "GET /api/profile HTTP/1.1\r\nAuthorization: Bearer {}\r\nConnection: close\r\n\r\n",
        token
    );
    let response = parse_single(&exchange(&server, profile.as_bytes()).await);
    assert_eq!(response.status_code, 200);
    assert_eq!(response.body, b"alice");

    // 只带 token Cookie 同样视为已认证
    let session_id = server
        .sessions()
        .find(Some(format!("Bearer {}", token).as_str()), None)
        .unwrap()
        .id()
        .to_string();
    let by_cookie = format!(
        "GET /api/profile HTTP/1.1\r\nCookie: sessionId={}; token={}\r\nConnection: close\r\n\r\n",
        session_id, token
    );
    let response = parse_single(&exchange(&server, by_cookie.as_bytes()).await);
    assert_eq!(response.status_code, 200);
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let (_dir, server) = test_server();
    let body = r#"{"username":"alice","password":"looking-glass"}"#;
    let login = format!(
        "POST /api/login HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let response = parse_single(&exchange(&server, login.as_bytes()).await);
    assert_eq!(response.status_code, 401);
    assert!(cookie_value(&response, "token").is_none());
}

#[tokio::test]
async fn test_h2_static_file_and_secured_route() {
    let (_dir, server) = test_server();
    let (tx, mut rx) = mpsc::channel(64);
    let mut connection = Http2Connection::new(1, "192.0.2.7", server, tx);

    for (stream_id, path) in [(1, "/web/index.html"), (3, "/api/profile")] {
        let mut headers = Headers::new();
        headers.append(":method", "GET");
        headers.append(":scheme", "https");
        headers.append(":path", path);
        headers.append(":authority", "localhost");
        connection
            .on_frame(Frame::Headers {
                stream_id,
                headers,
                end_stream: true,
            })
            .await
            .unwrap();
    }

    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }

    let status = |id: u32| {
        frames.iter().find_map(|f| match f {
            Frame::Headers { stream_id, headers, .. } if *stream_id == id => {
                headers.get(":status").map(str::to_string)
            }
            _ => None,
        })
    };
    assert_eq!(status(1).as_deref(), Some("200"));
    assert_eq!(status(3).as_deref(), Some("401"));

    let body: Vec<u8> = frames
        .iter()
        .filter_map(|f| match f {
            Frame::Data { stream_id: 1, data, .. } => Some(data.to_vec()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(body, INDEX_HTML);
}
