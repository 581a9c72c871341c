// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # webengine
//!
//! 可嵌入的 HTTP 服务引擎：路由分发、会话管理、静态文件流式传输，
//! 以及 HTTP/2 路径上的响应压缩与服务器推送。

pub mod auth;
pub mod cache;
pub mod compress;
pub mod config;
pub mod connection;
pub mod context;
pub mod exception;
pub mod h2;
pub mod header;
pub mod param;
pub mod push;
pub mod request;
pub mod response;
pub mod route;
pub mod server;
pub mod session;
pub mod static_files;
pub mod util;

pub use auth::{login_handler, logout_handler, Authenticator, StaticAuthenticator};
pub use cache::ResourceCache;
pub use compress::{select_encoding, ResponseCompressor};
pub use config::Config;
pub use connection::{serve, Connection, ConnectionState};
pub use context::{ParamValue, RequestContext, ResponseBuilder};
pub use exception::Exception;
pub use h2::{Frame, FrameSink, Http2Connection, Http2Pipeline, WritePromise};
pub use header::Headers;
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use push::{PushPromiseEmitter, StreamIdAllocator};
pub use request::RequestHead;
pub use response::Response;
pub use route::{Handler, Route, RouteRegistry};
pub use server::{Outgoing, Server};
pub use session::{Session, SessionStore, SessionToken};
pub use static_files::{StaticFile, StaticFileServer};
pub use util::HtmlBuilder;
