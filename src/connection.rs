// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 连接生命周期
//!
//! 每个连接持有一个 [`Connection`] 状态机：
//!
//! ```text
//! Idle --request_head--> AwaitingBody --request_end--> SendingResponse --write_complete--> Idle
//! ```
//!
//! 任何在错误状态下到达的事件都是该连接的致命错误，连接随即关闭。
//! [`serve`] 在任意 `AsyncRead + AsyncWrite` 之上驱动 HTTP/1 请求循环，
//! 同一连接上的请求严格串行处理。

use std::sync::Arc;

use bytes::BytesMut;
use log::{debug, error, info, warn};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use crate::{
    exception::Exception,
    param::{HttpRequestMethod, CHUNK_SIZE, MAX_HEAD_SIZE},
    request::RequestHead,
    response::Response,
    server::{Outgoing, Server},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    AwaitingBody,
    SendingResponse,
}

pub struct Connection {
    id: u128,
    remote_ip: String,
    server: Arc<Server>,
    state: ConnectionState,
    head: Option<RequestHead>,
    body: BytesMut,
}

impl Connection {
    pub fn new(id: u128, remote_ip: &str, server: Arc<Server>) -> Self {
        Self {
            id,
            remote_ip: remote_ip.to_string(),
            server,
            state: ConnectionState::Idle,
            head: None,
            body: BytesMut::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn expect_state(&self, expected: ConnectionState, event: &'static str) -> Result<(), Exception> {
        if self.state == expected {
            return Ok(());
        }
        error!("[ID{}]连接状态为{:?}时收到{}，关闭连接", self.id, self.state, event);
        Err(Exception::ProtocolViolation {
            state: self.state,
            event,
        })
    }

    pub fn request_head(&mut self, head: RequestHead) -> Result<(), Exception> {
        self.expect_state(ConnectionState::Idle, "request_head")?;
        self.head = Some(head);
        self.body.clear();
        self.state = ConnectionState::AwaitingBody;
        Ok(())
    }

    pub fn request_body(&mut self, chunk: &[u8]) -> Result<(), Exception> {
        self.expect_state(ConnectionState::AwaitingBody, "request_body")?;
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    /// 请求接收完毕，分发并返回待发送的响应
    pub async fn request_end(&mut self) -> Result<Outgoing, Exception> {
        self.expect_state(ConnectionState::AwaitingBody, "request_end")?;
        let head = match self.head.take() {
            Some(head) => head,
            None => {
                return Err(Exception::ProtocolViolation {
                    state: self.state,
                    event: "request_end",
                })
            }
        };
        self.state = ConnectionState::SendingResponse;
        let body = std::mem::take(&mut self.body).freeze();
        Ok(self
            .server
            .dispatch(self.id, head, body, &self.remote_ip)
            .await)
    }

    pub fn write_complete(&mut self) -> Result<(), Exception> {
        self.expect_state(ConnectionState::SendingResponse, "write_complete")?;
        self.state = ConnectionState::Idle;
        Ok(())
    }
}

/// 读取一个请求头块（不含结尾空行）。跳过请求之间多余的空行；
/// 对端在两个请求之间关闭连接时返回 `None`。
async fn read_head<R>(reader: &mut R, id: u128) -> Result<Option<Vec<u8>>, Exception>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            if !head.is_empty() {
                debug!("[ID{}]请求头未接收完整，对端已关闭", id);
            }
            return Ok(None);
        }
        let content = line.strip_suffix(b"\n").unwrap_or(&line);
        let content = content.strip_suffix(b"\r").unwrap_or(content);
        if content.is_empty() {
            if head.is_empty() {
                continue;
            }
            return Ok(Some(head));
        }
        if head.len() + line.len() > MAX_HEAD_SIZE {
            error!("[ID{}]请求头超过{}字节上限", id, MAX_HEAD_SIZE);
            return Err(Exception::MalformedRequest);
        }
        if !head.is_empty() {
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(content);
    }
}

async fn write_error<W>(writer: &mut W, code: u16, id: u128) -> Result<(), Exception>
where
    W: AsyncWrite + Unpin,
{
    let mut response = Response::from_status_code(code);
    response.set_header("Connection", "close").finalize();
    writer.write_all(&response.as_bytes()).await?;
    writer.flush().await?;
    debug!("[ID{}]已发送{}错误响应", id, code);
    Ok(())
}

/// 在一个双工字节流上处理 HTTP/1 请求，直到对端关闭或不再保持连接。
///
/// 状态机违规与传输错误以 `Err` 返回，调用方只需丢弃该连接。
pub async fn serve<S>(stream: S, remote_ip: &str, server: Arc<Server>, id: u128) -> Result<(), Exception>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let max_body_size = server.config().max_body_size();
    let mut connection = Connection::new(id, remote_ip, server);
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let raw = match read_head(&mut reader, id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => break,
            Err(Exception::MalformedRequest) => {
                write_error(&mut writer, 400, id).await?;
                break;
            }
            Err(e) => return Err(e),
        };

        let head = match RequestHead::try_from(&raw, id) {
            Ok(head) => head,
            Err(e) => {
                write_error(&mut writer, e.status_code(), id).await?;
                break;
            }
        };
        if head
            .header("Transfer-Encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
        {
            warn!("[ID{}]不支持分块编码的请求体", id);
            write_error(&mut writer, 501, id).await?;
            break;
        }

        let mut remaining = match head.content_length() {
            Ok(length) => length,
            Err(e) => {
                warn!("[ID{}]Content-Length无效或互相冲突，关闭连接", id);
                write_error(&mut writer, e.status_code(), id).await?;
                break;
            }
        };
        if remaining > max_body_size {
            warn!("[ID{}]请求体{}字节超过{}字节上限", id, remaining, max_body_size);
            write_error(&mut writer, Exception::PayloadTooLarge.status_code(), id).await?;
            break;
        }

        let keep_alive = head.keep_alive();
        let method = head.method();
        let version = head.version();
        let path = head.uri().to_string();
        connection.request_head(head)?;

        while remaining > 0 {
            let want = remaining.min(buffer.len());
            let n = reader.read(&mut buffer[..want]).await?;
            if n == 0 {
                debug!("[ID{}]请求体未接收完整，对端已关闭", id);
                return Ok(());
            }
            connection.request_body(&buffer[..n])?;
            remaining -= n;
        }

        let mut outgoing = connection.request_end().await?;
        let status = outgoing.status_code();
        {
            let head = outgoing.head_mut();
            head.set_version(version);
            if !keep_alive {
                head.set_header("Connection", "close");
            }
        }

        match outgoing {
            Outgoing::Full(response) => {
                let bytes = if method == HttpRequestMethod::Head {
                    response.head_bytes()
                } else {
                    response.as_bytes()
                };
                writer.write_all(&bytes).await?;
                writer.flush().await?;
            }
            Outgoing::File { head, file } => {
                if method == HttpRequestMethod::Head {
                    writer.write_all(&head.head_bytes()).await?;
                    writer.flush().await?;
                } else {
                    file.send(head, &mut writer, id).await?;
                }
            }
        }
        info!("[ID{}] {}, {}, {}, {}", id, version, method, path, status);
        connection.write_complete()?;

        if !keep_alive {
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("[ID{}]关闭写端失败：{}", id, e);
    }
    Ok(())
}
