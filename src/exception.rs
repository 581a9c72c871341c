// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 定义引擎在请求处理生命周期中可能出现的各类异常。
//!
//! - **协议错误**：请求报文无法解析、连接状态机收到乱序事件。
//! - **业务错误**：重复注册路由、认证失败、文件不存在或越权访问。
//! - **写出契约错误**：HTTP/2 压缩与推送层的 promise 失败原因。
//!
//! 面向客户端的变体可通过 [`Exception::status_code`] 映射为 HTTP 状态码。

use crate::connection::ConnectionState;
use std::{fmt, io};

/// 引擎处理过程中发生的异常类型。
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Exception {
    /// 请求头无法按 UTF-8 解码
    RequestIsNotUtf8,
    /// 请求行或请求头格式不合法，或超过长度上限
    MalformedRequest,
    /// 请求体超过配置的上限
    PayloadTooLarge,
    /// 不支持的请求方法
    UnsupportedRequestMethod,
    /// 不支持的 HTTP 协议版本
    UnsupportedHttpVersion,
    /// 相同方法下已存在字面量相同的路由
    DuplicateRoute,
    /// 连接状态机在 `state` 状态下收到了不合法的 `event`
    ProtocolViolation {
        state: ConnectionState,
        event: &'static str,
    },
    /// 静态资源不存在
    FileNotFound,
    /// 路径中包含 `..` 段
    PathTraversal,
    /// 其他 I/O 错误
    Io(io::ErrorKind),
    /// 处理器在完成响应前丢弃了 `ResponseBuilder`
    HandlerDropped,
    /// 认证协作方拒绝了凭据
    AuthenticationFailed,
    /// 压缩层收到结束帧时没有任何缓冲数据
    NothingToWrite,
    /// 压缩层被移除时仍有未压缩的写入
    UncompressedWritesPending,
    /// 连接关闭时仍有未完成的写入
    PendingWritesAbandoned,
    /// 推送流 ID 空间耗尽
    StreamIdsExhausted,
}

use Exception::*;

impl Exception {
    /// 面向客户端的 HTTP 状态码。
    pub fn status_code(&self) -> u16 {
        match self {
            RequestIsNotUtf8 | MalformedRequest => 400,
            UnsupportedRequestMethod => 405,
            PayloadTooLarge => 413,
            UnsupportedHttpVersion => 505,
            FileNotFound => 404,
            PathTraversal => 403,
            AuthenticationFailed => 401,
            _ => 500,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            MalformedRequest => write!(f, "Malformed request head"),
            PayloadTooLarge => write!(f, "Request body too large"),
            UnsupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            DuplicateRoute => write!(f, "Route already registered"),
            ProtocolViolation { state, event } => {
                write!(f, "Protocol violation: {} while {:?}", event, state)
            }
            FileNotFound => write!(f, "File not found (404)"),
            PathTraversal => write!(f, "Path traversal rejected (403)"),
            Io(kind) => write!(f, "I/O error: {:?}", kind),
            HandlerDropped => write!(f, "Handler dropped the response without completing it"),
            AuthenticationFailed => write!(f, "Authentication failed"),
            NothingToWrite => write!(f, "Nothing to write"),
            UncompressedWritesPending => write!(f, "Uncompressed writes pending"),
            PendingWritesAbandoned => write!(f, "Pending writes abandoned"),
            StreamIdsExhausted => write!(f, "Push stream ids exhausted"),
        }
    }
}

impl std::error::Error for Exception {}

impl From<io::Error> for Exception {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FileNotFound,
            kind => Io(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(PathTraversal.status_code(), 403);
        assert_eq!(FileNotFound.status_code(), 404);
        assert_eq!(Io(io::ErrorKind::PermissionDenied).status_code(), 500);
        assert_eq!(MalformedRequest.status_code(), 400);
        assert_eq!(PayloadTooLarge.status_code(), 413);
    }

    #[test]
    fn test_from_io_error() {
        let e: Exception = io::Error::new(io::ErrorKind::NotFound, "x").into();
        assert_eq!(e, FileNotFound);
        let e: Exception = io::Error::new(io::ErrorKind::BrokenPipe, "x").into();
        assert_eq!(e, Io(io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn test_display_protocol_violation() {
        let e = ProtocolViolation {
            state: ConnectionState::AwaitingBody,
            event: "request_head",
        };
        assert!(e.to_string().contains("request_head"));
        assert!(e.to_string().contains("AwaitingBody"));
    }
}
