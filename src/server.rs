// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求分发
//!
//! [`Server`] 持有路由表、会话存储与静态文件服务，启动时构造一次，
//! 以 `Arc` 形式交给每个连接。HTTP/1 与 HTTP/2 两条路径都经由
//! [`Server::dispatch`] 得到响应。

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::{debug, error, warn};
use tokio::sync::oneshot;

use crate::{
    cache::ResourceCache,
    config::Config,
    context::{RequestContext, ResponseBuilder},
    exception::Exception,
    param::{HttpRequestMethod, FAR_FUTURE_EXPIRES, SESSION_COOKIE},
    push::PushPromiseEmitter,
    request::RequestHead,
    response::Response,
    route::RouteRegistry,
    session::SessionStore,
    static_files::{StaticFile, StaticFileServer},
    util::set_cookie_value,
};

/// 单个推送资源进入缓存的大小上限
const PUSH_CACHE_THRESHOLD: u64 = 1024 * 1024;

/// 分发结果：完整响应，或等待流式发送的静态文件
#[derive(Debug)]
pub enum Outgoing {
    Full(Response),
    File { head: Response, file: StaticFile },
}

impl Outgoing {
    pub fn status_code(&self) -> u16 {
        match self {
            Outgoing::Full(response) => response.status_code(),
            Outgoing::File { head, .. } => head.status_code(),
        }
    }

    pub fn head_mut(&mut self) -> &mut Response {
        match self {
            Outgoing::Full(response) => response,
            Outgoing::File { head, .. } => head,
        }
    }
}

pub struct Server {
    config: Config,
    routes: RouteRegistry,
    sessions: Arc<SessionStore>,
    files: Arc<StaticFileServer>,
    push_cache: Arc<Mutex<ResourceCache>>,
}

impl Server {
    pub fn new(config: Config, routes: RouteRegistry, sessions: Arc<SessionStore>) -> Self {
        let files = Arc::new(StaticFileServer::new(config.www_root(), config.chunk_size()));
        let push_cache = Arc::new(Mutex::new(ResourceCache::from_capacity(
            config.cache_size(),
            PUSH_CACHE_THRESHOLD,
        )));
        Self {
            config,
            routes,
            sessions,
            files,
            push_cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn files(&self) -> &Arc<StaticFileServer> {
        &self.files
    }

    /// 为一条 HTTP/2 连接创建推送发射器，资源缓存在所有连接间共享
    pub fn push_emitter(&self) -> PushPromiseEmitter {
        PushPromiseEmitter::new(
            Arc::clone(&self.files),
            Arc::clone(&self.push_cache),
            self.config.push_authority(),
            self.config.web_prefix(),
        )
    }

    /// 分发一个已完整接收的请求
    pub async fn dispatch(&self, id: u128, head: RequestHead, body: Bytes, remote_ip: &str) -> Outgoing {
        let method = head.method();

        if method == HttpRequestMethod::Options {
            let mut response = Response::from_status_code(204);
            response.set_header("Access-Control-Max-Age", &self.config.cors_max_age().to_string());
            self.apply_cors(&head, &mut response);
            response.finalize();
            return Outgoing::Full(response);
        }

        let prefix = self.config.web_prefix();
        if matches!(method, HttpRequestMethod::Get | HttpRequestMethod::Head)
            && head.path().starts_with(prefix)
        {
            return self.serve_static(id, &head).await;
        }

        let (route, params) = match self.routes.resolve(method, head.path()) {
            Some(found) => found,
            None => {
                warn!("[ID{}]没有匹配{} {}的路由，返回404", id, method, head.path());
                let mut response = Response::from_status_code(404);
                response.finalize();
                return Outgoing::Full(response);
            }
        };
        let handler = Arc::clone(route.handler());
        let secured = route.is_secured();

        let mut base = Response::new();
        self.apply_cors(&head, &mut base);

        let authorization = head.header("Authorization").map(str::to_string);
        let cookie = head.header("Cookie").map(str::to_string);
        let mut session = match self
            .sessions
            .find(authorization.as_deref(), cookie.as_deref())
        {
            Some(session) => session,
            None => {
                let session = self.sessions.create(None, None);
                // 带 Referer 的首次请求不持久化新会话，该规则有待重新评估
                if head.header("Referer").is_none() {
                    debug!("[ID{}]创建新会话{}", id, session.id());
                    self.sessions.save(session.clone());
                    base.append_header(
                        "Set-Cookie",
                        &set_cookie_value(SESSION_COOKIE, session.id(), FAR_FUTURE_EXPIRES),
                    );
                }
                session
            }
        };
        session.set_client_ip(remote_ip);
        self.sessions.touch(session.id(), remote_ip);

        if secured && !session.is_authenticated_by(authorization.as_deref(), cookie.as_deref()) {
            warn!("[ID{}]未认证的请求访问受保护路由{}，返回401", id, route.pattern());
            base.set_code(401).finalize();
            return Outgoing::Full(base);
        }

        let mut context = RequestContext::new(id, head, body, remote_ip);
        context.insert_path_params(params);
        context.set_session(session);
        context.parse_body();

        let (tx, rx) = oneshot::channel();
        handler(context, ResponseBuilder::new(base, tx));
        let mut response = match rx.await {
            Ok(response) => response,
            Err(_) => {
                error!("[ID{}]{}", id, Exception::HandlerDropped);
                Response::error_page(500, &Exception::HandlerDropped.to_string())
            }
        };
        response.finalize();
        Outgoing::Full(response)
    }

    async fn serve_static(&self, id: u128, head: &RequestHead) -> Outgoing {
        let relative = &head.path()[self.config.web_prefix().len()..];
        match self.files.open(relative, id).await {
            Ok(file) => {
                let mut response = file.response_head();
                self.apply_cors(head, &mut response);
                Outgoing::File {
                    head: response,
                    file,
                }
            }
            Err(e) => {
                warn!("[ID{}]静态文件{}无法访问：{}", id, relative, e);
                let mut response = StaticFileServer::error_response(e);
                self.apply_cors(head, &mut response);
                response.finalize();
                Outgoing::Full(response)
            }
        }
    }

    fn apply_cors(&self, head: &RequestHead, response: &mut Response) {
        if !self.config.cors() {
            return;
        }
        let origin = head.header("Origin").unwrap_or("*");
        response
            .set_header("Access-Control-Allow-Origin", origin)
            .set_header(
                "Access-Control-Allow-Methods",
                "GET, HEAD, POST, PUT, DELETE, PATCH, OPTIONS",
            )
            .set_header("Access-Control-Allow-Headers", "Authorization, Content-Type");
        if origin != "*" {
            response
                .set_header("Access-Control-Allow-Credentials", "true")
                .append_header("Vary", "Origin");
        }
    }
}
