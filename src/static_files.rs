// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 静态文件服务
//!
//! 把去掉服务前缀（如 `/web/`）的请求路径映射到配置的根目录下，
//! 以固定大小的块流式发送文件。每块写入完成后才读取下一块，
//! 慢速客户端会直接拖慢文件读取。

use std::{
    path::{Component, Path, PathBuf},
    time::SystemTime,
};

use bytes::{Bytes, BytesMut};
use log::{debug, error, warn};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWrite, AsyncWriteExt},
};

use crate::{exception::Exception, param::mime_for, response::Response};

#[derive(Debug, Clone)]
pub struct StaticFileServer {
    root: PathBuf,
    chunk_size: usize,
}

impl StaticFileServer {
    pub fn new<P: Into<PathBuf>>(root: P, chunk_size: usize) -> Self {
        Self {
            root: root.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 路径中含有 `..` 段（包括百分号编码形式）或绝对路径前缀
    pub fn is_traversal(relative: &str) -> bool {
        let normalized = relative
            .replace("%2e", ".")
            .replace("%2E", ".")
            .replace("%2f", "/")
            .replace("%2F", "/")
            .replace("%5c", "/")
            .replace("%5C", "/")
            .replace('\\', "/");
        if normalized.split('/').any(|segment| segment == "..") {
            return true;
        }
        Path::new(normalized.trim_start_matches('/'))
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    }

    /// 解析为根目录下的绝对路径，路径穿越时不访问文件系统
    fn resolve(&self, relative: &str) -> Result<PathBuf, Exception> {
        if Self::is_traversal(relative) {
            return Err(Exception::PathTraversal);
        }
        let relative = relative.split_once('?').map_or(relative, |(p, _)| p);
        Ok(self.root.join(relative.trim_start_matches('/')))
    }

    /// 打开文件，准备流式发送
    pub async fn open(&self, relative: &str, id: u128) -> Result<StaticFile, Exception> {
        let path = match self.resolve(relative) {
            Ok(p) => p,
            Err(e) => {
                warn!("[ID{}]拒绝路径穿越请求：{}", id, relative);
                return Err(e);
            }
        };
        debug!("[ID{}]映射物理路径：{}", id, path.display());

        let file = File::open(&path).await?;
        let metadata = file.metadata().await?;
        if metadata.is_dir() {
            debug!("[ID{}]{}是目录，按不存在处理", id, path.display());
            return Err(Exception::FileNotFound);
        }
        Ok(StaticFile {
            file,
            len: metadata.len(),
            content_type: mime_for(&path),
            chunk_size: self.chunk_size,
        })
    }

    /// 文件的最后修改时间，用于校验缓存
    pub async fn modified(&self, relative: &str) -> Result<SystemTime, Exception> {
        let path = self.resolve(relative)?;
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH))
    }

    /// 一次性读取整个文件及其修改时间，推送资源时使用
    pub async fn read(&self, relative: &str) -> Result<(Bytes, SystemTime), Exception> {
        let path = self.resolve(relative)?;
        let metadata = tokio::fs::metadata(&path).await?;
        if metadata.is_dir() {
            return Err(Exception::FileNotFound);
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let content = tokio::fs::read(&path).await?;
        Ok((Bytes::from(content), modified))
    }

    /// 文件系统错误映射为 HTTP 响应：穿越 403，不存在 404，其余 500 并附带诊断信息
    pub fn error_response(exception: Exception) -> Response {
        match exception {
            Exception::PathTraversal => Response::error_page(403, "路径中不允许包含“..”"),
            Exception::FileNotFound => Response::from_status_code(404),
            other => Response::error_page(500, &format!("读取文件失败：{}", other)),
        }
    }
}

/// 已打开、等待发送的文件
#[derive(Debug)]
pub struct StaticFile {
    file: File,
    len: u64,
    content_type: &'static str,
    chunk_size: usize,
}

impl StaticFile {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// 200 响应头，`Content-Length` 取文件大小
    pub fn response_head(&self) -> Response {
        let mut head = Response::new();
        head.set_header("Content-Type", self.content_type)
            .set_header("Content-Length", &self.len.to_string());
        head
    }

    /// 读取下一块，最多 `chunk_size` 字节，最多读到 `remaining` 为止；文件结束返回空块
    pub(crate) async fn next_chunk(&mut self, remaining: u64) -> Result<Bytes, Exception> {
        let want = (self.chunk_size as u64).min(remaining) as usize;
        let mut buffer = BytesMut::zeroed(want);
        let mut filled = 0;
        while filled < want {
            let n = self.file.read(&mut buffer[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buffer.truncate(filled);
        Ok(buffer.freeze())
    }

    /// 发送响应头与文件内容，返回发送的正文字节数。
    ///
    /// 第一块在写出响应头之前读取：此时失败（包括文件在打开后被截空）会改为
    /// 发送错误页并返回 `Ok(0)`，连接可以继续使用。响应头发出之后的任何失败
    /// 都返回 `Err`，调用方应关闭连接。
    pub async fn send<W>(mut self, head: Response, writer: &mut W, id: u128) -> Result<u64, Exception>
    where
        W: AsyncWrite + Unpin,
    {
        let first = match self.next_chunk(self.len).await {
            Ok(chunk) if chunk.is_empty() && self.len > 0 => {
                Err(Exception::Io(std::io::ErrorKind::UnexpectedEof))
            }
            other => other,
        };
        let first = match first {
            Ok(chunk) => chunk,
            Err(e) => {
                error!("[ID{}]读取文件失败：{}", id, e);
                let mut response = StaticFileServer::error_response(e);
                response.finalize();
                writer.write_all(&response.as_bytes()).await?;
                writer.flush().await?;
                return Ok(0);
            }
        };

        writer.write_all(&head.head_bytes()).await?;

        let mut sent = 0u64;
        let mut chunk = first;
        loop {
            if chunk.is_empty() {
                break;
            }
            writer.write_all(&chunk).await?;
            sent += chunk.len() as u64;
            if sent >= self.len {
                break;
            }
            chunk = self.next_chunk(self.len - sent).await?;
        }
        writer.flush().await?;

        if sent < self.len {
            error!("[ID{}]文件在传输过程中被截断：{}/{}字节", id, sent, self.len);
            return Err(Exception::Io(std::io::ErrorKind::UnexpectedEof));
        }
        debug!("[ID{}]文件传输完成，共发送{}字节", id, sent);
        Ok(sent)
    }
}
