// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 登录与登出
//!
//! 凭据校验交给 [`Authenticator`]，引擎只使用校验成功后返回的唯一标识，
//! 把它作为 bearer 令牌附加到当前会话上。

use std::{
    collections::hash_map::RandomState,
    collections::HashMap,
    future::Future,
    hash::{BuildHasher, Hash, Hasher},
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::Utc;
use log::{info, warn};
use serde_derive::{Deserialize, Serialize};

use crate::{
    context::{RequestContext, ResponseBuilder},
    exception::Exception,
    param::{EXPIRED, FAR_FUTURE_EXPIRES, SESSION_COOKIE, TOKEN_COOKIE},
    session::{SessionStore, SessionToken},
};

pub type AuthFuture = Pin<Box<dyn Future<Output = Result<String, Exception>> + Send>>;

/// 凭据校验协作方。成功时返回一个唯一标识，用作会话令牌。
#[cfg_attr(test, mockall::automock)]
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, username: &str, password: &str) -> AuthFuture;
}

/// 基于配置文件中用户名/密码表的校验器
pub struct StaticAuthenticator {
    credentials: HashMap<String, String>,
    hasher: RandomState,
    sequence: AtomicU64,
}

impl StaticAuthenticator {
    pub fn new(credentials: HashMap<String, String>) -> Self {
        Self {
            credentials,
            hasher: RandomState::new(),
            sequence: AtomicU64::new(0),
        }
    }

    fn issue_token(&self, username: &str) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now().timestamp_micros();
        let mut parts = [0u64; 2];
        for (round, part) in parts.iter_mut().enumerate() {
            let mut hasher = self.hasher.build_hasher();
            (username, now, sequence, round).hash(&mut hasher);
            *part = hasher.finish();
        }
        format!("{:016x}{:016x}", parts[0], parts[1])
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, username: &str, password: &str) -> AuthFuture {
        let result = match self.credentials.get(username) {
            Some(expected) if expected == password => Ok(self.issue_token(username)),
            _ => Err(Exception::AuthenticationFailed),
        };
        Box::pin(async move { result })
    }
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginReply {
    token: String,
}

/// 从表单参数或 JSON 正文中取出用户名与密码
fn credentials(ctx: &RequestContext) -> Option<(String, String)> {
    if let (Some(username), Some(password)) = (ctx.param_text("username"), ctx.param_text("password")) {
        return Some((username.to_string(), password.to_string()));
    }
    serde_json::from_slice::<LoginRequest>(ctx.body())
        .ok()
        .map(|r| (r.username, r.password))
}

/// 登录处理器：校验成功后把令牌附加到会话，并以 JSON 正文与 `token` Cookie 返回
pub fn login_handler(
    authenticator: Arc<dyn Authenticator>,
    sessions: Arc<SessionStore>,
) -> impl Fn(RequestContext, ResponseBuilder) + Send + Sync + 'static {
    move |ctx, mut res| {
        let (username, password) = match credentials(&ctx) {
            Some(c) => c,
            None => {
                res.fail(400, "缺少用户名或密码");
                return;
            }
        };
        let authenticator = Arc::clone(&authenticator);
        let sessions = Arc::clone(&sessions);
        let session = ctx.session().cloned();
        let id = ctx.id();
        tokio::spawn(async move {
            match authenticator.authenticate(&username, &password).await {
                Ok(token) => {
                    if let Some(session) = session {
                        sessions.attach_token(
                            &session,
                            SessionToken {
                                basic_credential: Some(username.clone()),
                                bearer: token.clone(),
                            },
                        );
                    }
                    info!("[ID{}]用户{}登录成功", id, username);
                    res.cookie(TOKEN_COOKIE, &token, FAR_FUTURE_EXPIRES)
                        .json(&LoginReply { token });
                    res.complete(200);
                }
                Err(e) => {
                    warn!("[ID{}]用户{}登录失败：{}", id, username, e);
                    res.fail(401, "用户名或密码错误");
                }
            }
        });
    }
}

/// 登出处理器：删除会话并清除两个 Cookie
pub fn logout_handler(
    sessions: Arc<SessionStore>,
) -> impl Fn(RequestContext, ResponseBuilder) + Send + Sync + 'static {
    move |ctx, mut res| {
        if let Some(session) = ctx.session() {
            sessions.remove(session.id());
            info!("[ID{}]会话{}已登出", ctx.id(), session.id());
        }
        res.cookie(SESSION_COOKIE, "", EXPIRED)
            .cookie(TOKEN_COOKIE, "", EXPIRED);
        res.complete(204);
    }
}
