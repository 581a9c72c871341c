// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP/2 响应压缩
//!
//! 按客户端 `Accept-Encoding` 偏好为每个响应选择编码，缓冲整个响应体，
//! 收到结束帧后一次性压缩，并按压缩后的大小重写 `content-length`。
//!
//! 每个流的待发送响应由独立的 [`PendingResponse`] 持有，发出后即丢弃。

use std::{collections::HashMap, io::Write};

use bytes::{Bytes, BytesMut};
use flate2::{
    write::{GzEncoder, ZlibEncoder},
    Compression,
};
use log::{debug, error, warn};

use crate::{
    exception::Exception,
    h2::{fail_all, Frame, WritePromise},
    header::Headers,
    param::HttpEncoding,
};

/// 拆分 `Accept-Encoding` 头为逐项的 token，保留 `;q=` 参数
pub fn parse_accept_encoding(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// 解析 token 的 `q` 权重：缺省为 1.0，无法解析或不在 [0, 1] 内视为 0
fn weight(params: &str) -> f32 {
    for param in params.split(';') {
        if let Some((key, value)) = param.split_once('=') {
            if key.trim().eq_ignore_ascii_case("q") {
                return match value.trim().parse::<f32>() {
                    Ok(q) if (0.0..=1.0).contains(&q) => q,
                    _ => 0.0,
                };
            }
        }
    }
    1.0
}

/// 根据 token 列表选择编码。
///
/// gzip 与 deflate 中任一权重为正时，除非 deflate 权重严格更高，否则选 gzip。
/// 两者都未被接受时，通配符 `*` 权重为正则选择客户端没有明确拒绝的那一种，优先 gzip。
pub fn select_encoding<S: AsRef<str>>(tokens: &[S]) -> Option<HttpEncoding> {
    let mut gzip: Option<f32> = None;
    let mut deflate: Option<f32> = None;
    let mut star: Option<f32> = None;

    for token in tokens {
        let token = token.as_ref();
        let (name, params) = token.split_once(';').unwrap_or((token, ""));
        let q = weight(params);
        let slot = match name.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => &mut gzip,
            "deflate" => &mut deflate,
            "*" => &mut star,
            _ => continue,
        };
        *slot = Some(slot.map_or(q, |old: f32| old.max(q)));
    }

    let gzip_q = gzip.unwrap_or(0.0);
    let deflate_q = deflate.unwrap_or(0.0);
    if gzip_q > 0.0 || deflate_q > 0.0 {
        return if deflate_q > gzip_q {
            Some(HttpEncoding::Deflate)
        } else {
            Some(HttpEncoding::Gzip)
        };
    }
    if star.unwrap_or(0.0) > 0.0 {
        if gzip.is_none() {
            return Some(HttpEncoding::Gzip);
        }
        if deflate.is_none() {
            return Some(HttpEncoding::Deflate);
        }
    }
    None
}

/// 压缩输出的最坏情况大小：deflate 流上界加上封装格式的头尾开销
pub fn compress_bound(len: usize, encoding: HttpEncoding) -> usize {
    let deflate = len + (len >> 12) + (len >> 14) + (len >> 25) + 13;
    match encoding {
        HttpEncoding::Deflate => deflate + 6,
        HttpEncoding::Gzip => deflate + 18,
    }
}

/// 一次性压缩完整的响应体
pub fn compress(input: &[u8], encoding: HttpEncoding) -> Result<Vec<u8>, Exception> {
    let output = Vec::with_capacity(compress_bound(input.len(), encoding));
    let compressed = match encoding {
        HttpEncoding::Gzip => {
            let mut encoder = GzEncoder::new(output, Compression::default());
            encoder.write_all(input)?;
            encoder.finish()?
        }
        HttpEncoding::Deflate => {
            let mut encoder = ZlibEncoder::new(output, Compression::default());
            encoder.write_all(input)?;
            encoder.finish()?
        }
    };
    Ok(compressed)
}

/// 正在累积的单个响应
struct PendingResponse {
    stream_id: u32,
    encoding: HttpEncoding,
    head: Headers,
    body: BytesMut,
    promises: Vec<WritePromise>,
}

impl PendingResponse {
    fn fail(self, reason: Exception) {
        fail_all(self.promises, reason);
    }

    /// 压缩并生成要发出的帧；压缩失败时退回未压缩的原始正文
    fn emit(self) -> Outbound {
        let PendingResponse {
            stream_id,
            encoding,
            mut head,
            body,
            promises,
        } = self;

        let data = match compress(&body, encoding) {
            Ok(compressed) => {
                debug!(
                    "流{}使用{}压缩：{} -> {}字节",
                    stream_id,
                    encoding,
                    body.len(),
                    compressed.len()
                );
                Bytes::from(compressed)
            }
            Err(e) => {
                error!("流{}压缩失败，按原样发送：{}", stream_id, e);
                head.remove("content-encoding");
                body.freeze()
            }
        };
        head.insert("content-length", &data.len().to_string());

        Outbound {
            frames: vec![
                Frame::Headers {
                    stream_id,
                    headers: head,
                    end_stream: false,
                },
                Frame::Data {
                    stream_id,
                    data,
                    end_stream: true,
                },
            ],
            promises,
        }
    }
}

/// 压缩层交给下游的一批帧，以及在这批帧写出后需要完成的 promise
pub struct Outbound {
    pub frames: Vec<Frame>,
    pub promises: Vec<WritePromise>,
}

impl Outbound {
    fn pass(frame: Frame, promise: Option<WritePromise>) -> Self {
        Self {
            frames: vec![frame],
            promises: promise.into_iter().collect(),
        }
    }
}

#[derive(Default)]
pub struct ResponseCompressor {
    /// 入站请求流 ID → 该请求的 `Accept-Encoding` token
    accept_encodings: HashMap<u32, Vec<String>>,
    pending: HashMap<u32, PendingResponse>,
}

impl ResponseCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录入站请求头帧中的 `Accept-Encoding`
    pub fn observe(&mut self, frame: &Frame) {
        if let Frame::Headers {
            stream_id, headers, ..
        } = frame
        {
            let tokens = headers
                .get_all("accept-encoding")
                .flat_map(parse_accept_encoding)
                .collect();
            self.accept_encodings.insert(*stream_id, tokens);
        }
    }

    /// 处理一个出站帧，返回此刻可以发出的帧批次（可能为空）
    pub fn write(&mut self, frame: Frame, promise: Option<WritePromise>) -> Option<Outbound> {
        match frame {
            Frame::Headers {
                stream_id,
                headers,
                end_stream,
            } => self.write_head(stream_id, headers, end_stream, promise),
            Frame::Data {
                stream_id,
                data,
                end_stream,
            } => self.write_data(stream_id, data, end_stream, promise),
            other => Some(Outbound::pass(other, promise)),
        }
    }

    fn write_head(
        &mut self,
        stream_id: u32,
        mut headers: Headers,
        end_stream: bool,
        promise: Option<WritePromise>,
    ) -> Option<Outbound> {
        let tokens = self.accept_encodings.remove(&stream_id).unwrap_or_default();
        let frame = |headers| Frame::Headers {
            stream_id,
            headers,
            end_stream,
        };

        let status = headers.get(":status").unwrap_or("200");
        if end_stream
            || headers.contains("content-encoding")
            || status.starts_with('1')
            || status == "204"
            || status == "304"
        {
            return Some(Outbound::pass(frame(headers), promise));
        }
        let encoding = match select_encoding(&tokens) {
            Some(e) => e,
            None => return Some(Outbound::pass(frame(headers), promise)),
        };

        headers.insert("content-encoding", &encoding.to_string());
        headers.remove("content-length");
        if let Some(previous) = self.pending.remove(&stream_id) {
            warn!("流{}上一个响应尚未结束就收到新的响应头", stream_id);
            previous.fail(Exception::UncompressedWritesPending);
        }
        self.pending.insert(
            stream_id,
            PendingResponse {
                stream_id,
                encoding,
                head: headers,
                body: BytesMut::new(),
                promises: promise.into_iter().collect(),
            },
        );
        None
    }

    fn write_data(
        &mut self,
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
        promise: Option<WritePromise>,
    ) -> Option<Outbound> {
        let pending = match self.pending.get_mut(&stream_id) {
            Some(p) => p,
            None => {
                let frame = Frame::Data {
                    stream_id,
                    data,
                    end_stream,
                };
                return Some(Outbound::pass(frame, promise));
            }
        };
        pending.body.extend_from_slice(&data);
        pending.promises.extend(promise);
        if !end_stream {
            return None;
        }

        let pending = self.pending.remove(&stream_id)?;
        if pending.body.is_empty() {
            error!("流{}的响应没有任何正文可写", stream_id);
            pending.fail(Exception::NothingToWrite);
            return None;
        }
        Some(pending.emit())
    }

    /// 压缩层被移除：丢弃所有缓冲状态，未完成的 promise 以
    /// [`Exception::UncompressedWritesPending`] 失败
    pub fn handler_removed(&mut self) {
        self.fail_pending(Exception::UncompressedWritesPending);
    }

    /// 连接已关闭，未完成的 promise 以 [`Exception::PendingWritesAbandoned`] 失败
    pub fn abandon(&mut self) {
        self.fail_pending(Exception::PendingWritesAbandoned);
    }

    fn fail_pending(&mut self, reason: Exception) {
        self.accept_encodings.clear();
        for (stream_id, pending) in self.pending.drain() {
            warn!("流{}仍有未发出的写入，放弃：{}", stream_id, reason);
            pending.fail(reason);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl Drop for ResponseCompressor {
    fn drop(&mut self) {
        self.handler_removed();
    }
}
