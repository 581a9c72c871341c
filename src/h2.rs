// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP/2 适配层
//!
//! 帧的编解码、HPACK 与连接级流控由底层传输库负责，这里只处理已解码的
//! 头部帧与数据帧：
//! - [`Http2Connection`] 把入站帧组装成请求并交给 [`Server::dispatch`]；
//! - [`Http2Pipeline`] 让出站帧依次经过压缩层与推送层，再写入 [`FrameSink`]。
//!
//! 同一连接上的流按到达顺序逐个分发。

use std::{collections::HashMap, sync::Arc};

use bytes::{Bytes, BytesMut};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::{
    compress::ResponseCompressor,
    exception::Exception,
    header::Headers,
    param::{HttpRequestMethod, HttpVersion},
    push::PushPromiseEmitter,
    request::RequestHead,
    response::Response,
    server::{Outgoing, Server},
    static_files::StaticFile,
};

/// 已解码的 HTTP/2 帧。头部名统一为小写，伪头部以 `:` 开头。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Headers {
        stream_id: u32,
        headers: Headers,
        end_stream: bool,
    },
    Data {
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
    },
    PushPromise {
        stream_id: u32,
        promised_stream_id: u32,
        headers: Headers,
    },
}

impl Frame {
    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::Headers { stream_id, .. }
            | Frame::Data { stream_id, .. }
            | Frame::PushPromise { stream_id, .. } => *stream_id,
        }
    }

    pub fn is_end_stream(&self) -> bool {
        match self {
            Frame::Headers { end_stream, .. } | Frame::Data { end_stream, .. } => *end_stream,
            Frame::PushPromise { .. } => false,
        }
    }
}

/// 一次出站写入的完成通知
pub type WritePromise = oneshot::Sender<Result<(), Exception>>;

/// 交给底层传输的帧队列
pub type FrameSink = mpsc::Sender<Frame>;

pub(crate) fn fail_all(promises: Vec<WritePromise>, reason: Exception) {
    for promise in promises {
        let _ = promise.send(Err(reason));
    }
}

/// 出站处理链：压缩 → 推送 → 传输
pub struct Http2Pipeline {
    compressor: ResponseCompressor,
    push: PushPromiseEmitter,
    sink: FrameSink,
}

impl Http2Pipeline {
    pub fn new(push: PushPromiseEmitter, sink: FrameSink) -> Self {
        Self {
            compressor: ResponseCompressor::new(),
            push,
            sink,
        }
    }

    /// 入站请求头帧，供压缩层与推送层记录请求信息
    pub fn inbound(&mut self, frame: &Frame) {
        self.compressor.observe(frame);
        self.push.observe(frame);
    }

    /// 写出一个帧。`promise` 在该帧（或包含它的压缩批次）真正交给传输后完成。
    pub async fn write(&mut self, frame: Frame, promise: Option<WritePromise>) -> Result<(), Exception> {
        if self.sink.is_closed() {
            warn!("传输已关闭，放弃流{}上的写入", frame.stream_id());
            if let Some(promise) = promise {
                let _ = promise.send(Err(Exception::PendingWritesAbandoned));
            }
            self.compressor.abandon();
            return Err(Exception::PendingWritesAbandoned);
        }

        let batch = match self.compressor.write(frame, promise) {
            Some(batch) => batch,
            None => return Ok(()),
        };
        let mut result = Ok(());
        for frame in batch.frames {
            if let Err(e) = self.push.write(frame, &self.sink).await {
                result = Err(e);
                break;
            }
        }
        for promise in batch.promises {
            let _ = promise.send(result);
        }
        if result.is_err() {
            self.compressor.abandon();
        }
        result
    }

    /// 连接关闭时调用，仍在缓冲的响应以 `UncompressedWritesPending` 失败
    pub fn close(mut self) {
        self.compressor.handler_removed();
    }
}

/// 一条 HTTP/2 连接上的请求组装与分发
pub struct Http2Connection {
    id: u128,
    remote_ip: String,
    server: Arc<Server>,
    pipeline: Http2Pipeline,
    /// 正在接收请求体的流
    requests: HashMap<u32, (RequestHead, BytesMut)>,
}

impl Http2Connection {
    pub fn new(id: u128, remote_ip: &str, server: Arc<Server>, sink: FrameSink) -> Self {
        let pipeline = Http2Pipeline::new(server.push_emitter(), sink);
        Self {
            id,
            remote_ip: remote_ip.to_string(),
            server,
            pipeline,
            requests: HashMap::new(),
        }
    }

    /// 处理一个入站帧；请求完整时立即分发并写出响应
    pub async fn on_frame(&mut self, frame: Frame) -> Result<(), Exception> {
        self.pipeline.inbound(&frame);
        match frame {
            Frame::Headers {
                stream_id,
                headers,
                end_stream,
            } => {
                let head = match request_head(&headers, self.id) {
                    Ok(head) => head,
                    Err(e) => {
                        let response = Response::from_status_code(e.status_code());
                        return self
                            .send_response(stream_id, response, HttpRequestMethod::Get)
                            .await;
                    }
                };
                if end_stream {
                    self.dispatch(stream_id, head, Bytes::new()).await
                } else {
                    self.requests.insert(stream_id, (head, BytesMut::new()));
                    Ok(())
                }
            }
            Frame::Data {
                stream_id,
                data,
                end_stream,
            } => {
                let body = match self.requests.get_mut(&stream_id) {
                    Some((_, body)) => body,
                    None => {
                        warn!("[ID{}]流{}上收到无主的数据帧，忽略", self.id, stream_id);
                        return Ok(());
                    }
                };
                body.extend_from_slice(&data);
                if !end_stream {
                    return Ok(());
                }
                match self.requests.remove(&stream_id) {
                    Some((head, body)) => self.dispatch(stream_id, head, body.freeze()).await,
                    None => Ok(()),
                }
            }
            Frame::PushPromise { stream_id, .. } => {
                error!("[ID{}]客户端在流{}上发送了PUSH_PROMISE", self.id, stream_id);
                Err(Exception::MalformedRequest)
            }
        }
    }

    async fn dispatch(&mut self, stream_id: u32, head: RequestHead, body: Bytes) -> Result<(), Exception> {
        let method = head.method();
        let path = head.uri().to_string();
        let outgoing = self
            .server
            .dispatch(self.id, head, body, &self.remote_ip)
            .await;
        info!(
            "[ID{}] HTTP/2 stream {}, {}, {}, {}",
            self.id,
            stream_id,
            method,
            path,
            outgoing.status_code()
        );
        match outgoing {
            Outgoing::Full(response) => self.send_response(stream_id, response, method).await,
            Outgoing::File { head, file } => self.send_file(stream_id, head, file, method).await,
        }
    }

    async fn send_response(
        &mut self,
        stream_id: u32,
        mut response: Response,
        method: HttpRequestMethod,
    ) -> Result<(), Exception> {
        response.finalize();
        let (status, headers, body) = response.into_parts();
        let body = body.filter(|b| !b.is_empty() && method != HttpRequestMethod::Head);
        let headers = h2_headers(status, &headers);
        match body {
            None => {
                self.pipeline
                    .write(
                        Frame::Headers {
                            stream_id,
                            headers,
                            end_stream: true,
                        },
                        None,
                    )
                    .await
            }
            Some(data) => {
                self.pipeline
                    .write(
                        Frame::Headers {
                            stream_id,
                            headers,
                            end_stream: false,
                        },
                        None,
                    )
                    .await?;
                self.pipeline
                    .write(
                        Frame::Data {
                            stream_id,
                            data,
                            end_stream: true,
                        },
                        None,
                    )
                    .await
            }
        }
    }

    async fn send_file(
        &mut self,
        stream_id: u32,
        head: Response,
        mut file: StaticFile,
        method: HttpRequestMethod,
    ) -> Result<(), Exception> {
        let len = file.len();
        let without_body = len == 0 || method == HttpRequestMethod::Head;
        let (status, headers, _) = head.into_parts();
        let headers = h2_headers(status, &headers);
        self.pipeline
            .write(
                Frame::Headers {
                    stream_id,
                    headers,
                    end_stream: without_body,
                },
                None,
            )
            .await?;
        if without_body {
            return Ok(());
        }

        let mut sent = 0u64;
        while sent < len {
            let chunk = file.next_chunk(len - sent).await?;
            if chunk.is_empty() {
                error!("[ID{}]文件在传输过程中被截断：{}/{}字节", self.id, sent, len);
                return Err(Exception::Io(std::io::ErrorKind::UnexpectedEof));
            }
            sent += chunk.len() as u64;
            self.pipeline
                .write(
                    Frame::Data {
                        stream_id,
                        data: chunk,
                        end_stream: sent >= len,
                    },
                    None,
                )
                .await?;
        }
        debug!("[ID{}]流{}文件传输完成，共{}字节", self.id, stream_id, sent);
        Ok(())
    }

    pub fn close(self) {
        self.pipeline.close();
    }
}

/// 由伪头部构造请求头：`:method`、`:path` 必需，`:authority` 转为 `host`
fn request_head(headers: &Headers, id: u128) -> Result<RequestHead, Exception> {
    let method = match headers.get(":method").and_then(HttpRequestMethod::parse) {
        Some(m) => m,
        None => {
            error!("[ID{}]HTTP/2请求缺少或使用了不支持的:method", id);
            return Err(Exception::UnsupportedRequestMethod);
        }
    };
    let path = match headers.get(":path") {
        Some(p) if !p.is_empty() => p,
        _ => {
            error!("[ID{}]HTTP/2请求缺少:path", id);
            return Err(Exception::MalformedRequest);
        }
    };

    let mut regular: Headers = headers
        .iter()
        .filter(|(name, _)| !name.starts_with(':'))
        .cloned()
        .collect();
    if let Some(authority) = headers.get(":authority") {
        if !regular.contains("host") {
            regular.append("host", authority);
        }
    }
    Ok(RequestHead::new(method, path, HttpVersion::V2, regular))
}

/// 响应头转换为 HTTP/2 头部：`:status` 在前，名称小写，去掉逐跳头
fn h2_headers(status: u16, headers: &Headers) -> Headers {
    let mut out = Headers::new();
    out.append(":status", &status.to_string());
    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        if matches!(
            name.as_str(),
            "connection" | "keep-alive" | "transfer-encoding" | "upgrade" | "proxy-connection"
        ) {
            continue;
        }
        out.append(&name, value);
    }
    out
}
