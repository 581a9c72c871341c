// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 会话存储
//!
//! 进程内的会话表，以不透明 ID 为键。请求通过 `Authorization: Bearer`
//! 或 `sessionId`/`token` Cookie 找到自己的会话。
//!
//! 整张表由一把互斥锁保护，读取方拿到的总是完整记录的克隆，
//! 不会观察到写了一半的会话。

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
};

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::{
    param::{SESSION_COOKIE, TOKEN_COOKIE},
    util::{bearer_token, parse_cookies},
};

/// 认证成功后附加在会话上的令牌
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// 登录时使用的用户名
    pub basic_credential: Option<String>,
    pub bearer: String,
}

impl SessionToken {
    pub fn bearer(token: &str) -> Self {
        Self {
            basic_credential: None,
            bearer: token.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    client_ip: String,
    created_at: DateTime<Utc>,
    token: Option<SessionToken>,
    /// 由 Cookie 合成、令牌尚未在存储中得到证实
    recovered: bool,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub fn set_client_ip(&mut self, ip: &str) {
        self.client_ip = ip.to_string();
    }

    pub fn set_token(&mut self, token: Option<SessionToken>) {
        self.token = token;
    }

    pub fn is_recovered(&self) -> bool {
        self.recovered
    }

    /// 请求携带的 bearer 令牌或 `token` Cookie 与会话令牌一致。
    /// 从 Cookie 恢复的会话的令牌来自客户端本身，永远不算认证。
    pub fn is_authenticated_by(&self, authorization: Option<&str>, cookie: Option<&str>) -> bool {
        if self.recovered {
            return false;
        }
        let stored = match &self.token {
            Some(t) => t.bearer.as_str(),
            None => return false,
        };
        if authorization.and_then(bearer_token) == Some(stored) {
            return true;
        }
        cookie
            .map(parse_cookies)
            .and_then(|c| c.get(TOKEN_COOKIE).cloned())
            .is_some_and(|t| t == stored)
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    sequence: AtomicU64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        match self.sessions.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("会话表锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    /// 按 bearer 令牌、`sessionId` Cookie 的顺序查找会话。
    ///
    /// Cookie 中的 ID 已不在表中但同时带有 `token` Cookie 时（例如服务重启后），
    /// 用这两个值合成一个新会话返回，但不写入存储。
    pub fn find(&self, authorization: Option<&str>, cookie: Option<&str>) -> Option<Session> {
        if let Some(token) = authorization.and_then(bearer_token) {
            return self
                .table()
                .values()
                .find(|s| s.token.as_ref().is_some_and(|t| t.bearer == token))
                .cloned();
        }

        let cookies = parse_cookies(cookie?);
        let id = cookies.get(SESSION_COOKIE)?;
        if let Some(session) = self.table().get(id) {
            return Some(session.clone());
        }
        cookies.get(TOKEN_COOKIE).map(|token| {
            debug!("会话{}不在存储中，使用token Cookie恢复", id);
            let mut session = self.create(Some(id.as_str()), Some(SessionToken::bearer(token)));
            session.recovered = true;
            session
        })
    }

    /// 创建会话但不持久化；`id` 为空时生成基于时间戳的 ID。
    pub fn create(&self, id: Option<&str>, token: Option<SessionToken>) -> Session {
        let id = match id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.generate_id(),
        };
        Session {
            id,
            client_ip: String::new(),
            created_at: Utc::now(),
            token,
            recovered: false,
        }
    }

    fn generate_id(&self) -> String {
        let now = Utc::now();
        let nanos = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros() * 1000);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{:x}{:04x}", nanos, sequence & 0xffff)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.table().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.table().get(id).cloned()
    }

    /// 按 ID 插入或覆盖
    pub fn save(&self, session: Session) {
        self.table().insert(session.id.clone(), session);
    }

    /// 删除会话，重复删除不报错
    pub fn remove(&self, id: &str) {
        if self.table().remove(id).is_some() {
            debug!("会话{}已删除", id);
        }
    }

    /// 为会话附加令牌；会话不在表中时以 `session` 快照为基础写入。
    pub fn attach_token(&self, session: &Session, token: SessionToken) {
        let mut table = self.table();
        let entry = table
            .entry(session.id.clone())
            .or_insert_with(|| session.clone());
        entry.token = Some(token);
        entry.recovered = false;
    }

    /// 更新已存储会话的客户端 IP，会话不存在时什么也不做
    pub fn touch(&self, id: &str, client_ip: &str) {
        if let Some(session) = self.table().get_mut(id) {
            session.client_ip = client_ip.to_string();
        }
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashSet, sync::Arc, thread};

    #[test]
    fn test_create_generates_unique_ids() {
        let store = SessionStore::new();
        let ids: HashSet<String> = (0..1000).map(|_| store.create(None, None).id).collect();
        assert_eq!(ids.len(), 1000);
        assert!(store.is_empty(), "create不应隐式持久化");
    }

    #[test]
    fn test_bearer_round_trip() {
        let store = SessionStore::new();
        let session = store.create(None, Some(SessionToken::bearer("tok-1")));
        let id = session.id().to_string();
        store.save(session);

        let found = store.find(Some("Bearer tok-1"), None).unwrap();
        assert_eq!(found.id(), id);
    }

    #[test]
    fn test_unknown_bearer_does_not_fall_back_to_cookie() {
        let store = SessionStore::new();
        let session = store.create(Some("s1"), None);
        store.save(session);

        assert!(store.find(Some("Bearer nope"), Some("sessionId=s1")).is_none());
    }

    #[test]
    fn test_find_by_cookie() {
        let store = SessionStore::new();
        store.save(store.create(Some("abc"), None));

        let found = store.find(None, Some("theme=dark; sessionId=abc")).unwrap();
        assert_eq!(found.id(), "abc");
        assert!(store.find(None, Some("sessionId=other")).is_none());
        assert!(store.find(None, None).is_none());
    }

    #[test]
    fn test_recover_from_token_cookie() {
        let store = SessionStore::new();
        let found = store.find(None, Some("sessionId=gone; token=t-9")).unwrap();

        assert_eq!(found.id(), "gone");
        assert_eq!(found.token().unwrap().bearer, "t-9");
        assert!(found.is_recovered());
        assert!(!store.contains("gone"), "合成的会话不应被持久化");
    }

    #[test]
    fn test_recovered_session_is_not_authenticated() {
        let store = SessionStore::new();
        let found = store.find(None, Some("sessionId=gone; token=t-9")).unwrap();

        assert!(!found.is_authenticated_by(None, Some("sessionId=gone; token=t-9")));
        assert!(!found.is_authenticated_by(Some("Bearer t-9"), None));

        store.attach_token(&found, SessionToken::bearer("t-10"));
        let stored = store.get("gone").unwrap();
        assert!(!stored.is_recovered());
        assert!(stored.is_authenticated_by(None, Some("token=t-10")));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = SessionStore::new();
        store.save(store.create(Some("x"), None));
        store.remove("x");
        store.remove("x");
        assert!(!store.contains("x"));
    }

    #[test]
    fn test_attach_token_upserts() {
        let store = SessionStore::new();
        let session = store.create(Some("fresh"), None);
        store.attach_token(&session, SessionToken::bearer("t"));

        let stored = store.get("fresh").unwrap();
        assert_eq!(stored.token().unwrap().bearer, "t");
    }

    #[test]
    fn test_is_authenticated_by() {
        let store = SessionStore::new();
        let session = store.create(None, Some(SessionToken::bearer("secret")));

        assert!(session.is_authenticated_by(Some("Bearer secret"), None));
        assert!(session.is_authenticated_by(None, Some("token=secret")));
        assert!(!session.is_authenticated_by(Some("Bearer wrong"), Some("token=wrong")));
        assert!(!store.create(None, None).is_authenticated_by(Some("Bearer secret"), None));
    }

    #[test]
    fn test_concurrent_save_and_find() {
        let store = Arc::new(SessionStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..100 {
                        let token = format!("t{}-{}", t, i);
                        let session = store.create(None, Some(SessionToken::bearer(&token)));
                        store.save(session.clone());
                        let found = store.find(Some(format!("Bearer {}", token).as_str()), None).unwrap();
                        assert_eq!(found, session);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 800);
    }
}
