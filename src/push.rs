// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP/2 服务器推送
//!
//! 出站响应头帧带有 `link` 头时，为其中每个目标：
//! 1. 从静态根目录读取资源，读取失败的目标直接跳过；
//! 2. 分配新的推送流 ID，在原始流上发出 PUSH_PROMISE；
//! 3. 原始响应头发出之后，在推送流上发送 200 响应头与按块切分的正文。
//!
//! 所有 PUSH_PROMISE 都先于被推送内容以及原始响应的数据帧发出。

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use lazy_static::lazy_static;
use log::{debug, error, warn};
use regex::Regex;

use crate::{
    cache::ResourceCache,
    exception::Exception,
    h2::{Frame, FrameSink},
    header::Headers,
    param::mime_for,
    static_files::StaticFileServer,
};

lazy_static! {
    /// `Link` 条目中的 `<目标>` 部分
    static ref LINK_TARGET: Result<Regex, regex::Error> = Regex::new(r"<([^>]*)>");
}

/// 客户端发起的流使用奇数 ID，服务端推送流使用偶数 ID
pub const MAX_STREAM_ID: u32 = (1 << 31) - 1;

/// 从 `Link` 头中取出可推送的本地路径。
///
/// 带 `nopush` 参数的条目与跨源的绝对 URL 不会被推送。
pub fn parse_link_header(value: &str) -> Vec<String> {
    let re = match LINK_TARGET.as_ref() {
        Ok(re) => re,
        Err(e) => {
            error!("Link解析表达式无效：{}", e);
            return Vec::new();
        }
    };
    value
        .split(',')
        .filter(|entry| {
            !entry
                .split(';')
                .skip(1)
                .any(|param| param.trim().eq_ignore_ascii_case("nopush"))
        })
        .filter_map(|entry| re.captures(entry))
        .filter_map(|captures| captures.get(1))
        .map(|target| target.as_str().trim())
        .filter(|target| target.starts_with('/') && !target.starts_with("//"))
        .map(str::to_string)
        .collect()
}

/// 推送流 ID 分配器：单调递增的偶数序列，耗尽后报错而不是回绕
#[derive(Debug)]
pub struct StreamIdAllocator {
    next: u32,
}

impl Default for StreamIdAllocator {
    fn default() -> Self {
        Self { next: 2 }
    }
}

impl StreamIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> Result<u32, Exception> {
        if self.next > MAX_STREAM_ID {
            return Err(Exception::StreamIdsExhausted);
        }
        let id = self.next;
        self.next += 2;
        Ok(id)
    }

    /// 传输层自行占用了某个服务端流 ID 时调用，之后的分配跳过它
    pub fn reserve(&mut self, id: u32) {
        if id % 2 == 0 && id >= self.next {
            self.next = id.saturating_add(2);
        }
    }
}

pub struct PushPromiseEmitter {
    files: Arc<StaticFileServer>,
    cache: Arc<Mutex<ResourceCache>>,
    streams: StreamIdAllocator,
    /// 请求流 ID → 请求的 `:authority`
    authorities: HashMap<u32, String>,
    default_authority: String,
    web_prefix: String,
}

impl PushPromiseEmitter {
    pub fn new(
        files: Arc<StaticFileServer>,
        cache: Arc<Mutex<ResourceCache>>,
        default_authority: &str,
        web_prefix: &str,
    ) -> Self {
        Self {
            files,
            cache,
            streams: StreamIdAllocator::new(),
            authorities: HashMap::new(),
            default_authority: default_authority.to_string(),
            web_prefix: web_prefix.to_string(),
        }
    }

    /// 记录入站请求的 `:authority`（缺省时取 `host`）
    pub fn observe(&mut self, frame: &Frame) {
        if let Frame::Headers {
            stream_id, headers, ..
        } = frame
        {
            if let Some(authority) = headers.get(":authority").or_else(|| headers.get("host")) {
                self.authorities.insert(*stream_id, authority.to_string());
            }
        }
    }

    pub fn streams_mut(&mut self) -> &mut StreamIdAllocator {
        &mut self.streams
    }

    /// 写出一个帧；带 `link` 头的响应头帧会先触发推送
    pub async fn write(&mut self, frame: Frame, sink: &FrameSink) -> Result<(), Exception> {
        if !matches!(frame, Frame::Headers { .. }) {
            return send(sink, frame).await;
        }
        let stream_id = frame.stream_id();
        let links: Vec<String> = match &frame {
            Frame::Headers { headers, .. } if stream_id % 2 == 1 => {
                headers.get_all("link").flat_map(parse_link_header).collect()
            }
            _ => Vec::new(),
        };
        let authority = self
            .authorities
            .remove(&stream_id)
            .unwrap_or_else(|| self.default_authority.clone());
        if links.is_empty() {
            return send(sink, frame).await;
        }

        // 先读取全部资源，保证每个发出的 PUSH_PROMISE 都有内容跟上
        let mut resources = Vec::with_capacity(links.len());
        for path in links {
            match self.load(&path).await {
                Ok(content) => resources.push((path, content)),
                Err(e) => warn!("流{}无法读取推送资源{}，跳过：{}", stream_id, path, e),
            }
        }

        let mut promised = Vec::with_capacity(resources.len());
        for (path, content) in resources {
            let promised_stream_id = match self.streams.next_id() {
                Ok(id) => id,
                Err(e) => {
                    warn!("流{}停止推送：{}", stream_id, e);
                    break;
                }
            };
            let mut headers = Headers::new();
            headers.append(":method", "GET");
            headers.append(":scheme", "https");
            headers.append(":path", &path);
            headers.append(":authority", &authority);
            send(
                sink,
                Frame::PushPromise {
                    stream_id,
                    promised_stream_id,
                    headers,
                },
            )
            .await?;
            debug!("流{}承诺推送{}到流{}", stream_id, path, promised_stream_id);
            promised.push((promised_stream_id, path, content));
        }

        send(sink, frame).await?;

        for (promised_stream_id, path, content) in promised {
            self.push_resource(promised_stream_id, &path, content, sink)
                .await?;
        }
        Ok(())
    }

    async fn push_resource(
        &self,
        stream_id: u32,
        path: &str,
        content: Bytes,
        sink: &FrameSink,
    ) -> Result<(), Exception> {
        let mut headers = Headers::new();
        headers.append(":status", "200");
        headers.append("content-length", &content.len().to_string());
        headers.append("content-type", mime_for(std::path::Path::new(path)));
        send(
            sink,
            Frame::Headers {
                stream_id,
                headers,
                end_stream: content.is_empty(),
            },
        )
        .await?;

        let chunk_size = self.files.chunk_size();
        let mut offset = 0;
        while offset < content.len() {
            let end = (offset + chunk_size).min(content.len());
            send(
                sink,
                Frame::Data {
                    stream_id,
                    data: content.slice(offset..end),
                    end_stream: end == content.len(),
                },
            )
            .await?;
            offset = end;
        }
        Ok(())
    }

    /// 读取推送资源，修改时间未变时直接使用缓存
    async fn load(&self, path: &str) -> Result<Bytes, Exception> {
        let relative = path
            .strip_prefix(self.web_prefix.as_str())
            .unwrap_or(path)
            .trim_start_matches('/');
        let modified = self.files.modified(relative).await?;
        if let Some(content) = lock(&self.cache).find(path, modified) {
            return Ok(content);
        }
        let (content, modified) = self.files.read(relative).await?;
        lock(&self.cache).push(path, content.clone(), modified);
        Ok(content)
    }
}

fn lock(cache: &Mutex<ResourceCache>) -> std::sync::MutexGuard<'_, ResourceCache> {
    match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn send(sink: &FrameSink, frame: Frame) -> Result<(), Exception> {
    sink.send(frame)
        .await
        .map_err(|_| Exception::PendingWritesAbandoned)
}
