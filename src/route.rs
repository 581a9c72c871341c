// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由表
//!
//! 注册时把 URL 模式编译为“字面量 / 捕获”段序列，匹配时逐段线性比较，
//! 不依赖正则引擎。`:name` 段捕获恰好一个路径段。
//!
//! 同一方法下按注册顺序查找，第一个结构上匹配的路由胜出，因此更具体的
//! 字面量路由应先于可能与之重叠的捕获路由注册。

use std::{collections::HashMap, fmt, sync::Arc};

use log::{debug, warn};

use crate::{
    context::{RequestContext, ResponseBuilder},
    exception::Exception,
    param::HttpRequestMethod,
};

/// 路由处理器。必须最终对 `ResponseBuilder` 调用一次 `complete` 或 `fail`。
pub type Handler = Arc<dyn Fn(RequestContext, ResponseBuilder) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
}

pub struct Route {
    method: HttpRequestMethod,
    pattern: String,
    segments: Vec<Segment>,
    secured: bool,
    handler: Handler,
}

impl Route {
    fn compile(method: HttpRequestMethod, pattern: &str, handler: Handler) -> Self {
        let segments = pattern
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) if !name.is_empty() => Segment::Capture(name.to_string()),
                _ => Segment::Literal(segment.to_string()),
            })
            .collect();
        Self {
            method,
            pattern: pattern.to_string(),
            segments,
            secured: false,
            handler,
        }
    }

    /// 字面量完全相同，或逐段结构匹配
    fn matches(&self, path: &str) -> bool {
        if path == self.pattern {
            return true;
        }
        let mut parts = path.split('/');
        for segment in &self.segments {
            let part = match parts.next() {
                Some(p) => p,
                None => return false,
            };
            let ok = match segment {
                Segment::Literal(literal) => literal == part,
                Segment::Capture(_) => !part.is_empty(),
            };
            if !ok {
                return false;
            }
        }
        parts.next().is_none()
    }

    fn extract(&self, path: &str) -> HashMap<String, String> {
        self.segments
            .iter()
            .zip(path.split('/'))
            .filter_map(|(segment, part)| match segment {
                Segment::Capture(name) => Some((name.clone(), part.to_string())),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_secured(&self) -> bool {
        self.secured
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("secured", &self.secured)
            .finish()
    }
}

/// `set_secured` 记录下的过滤条件，对之后注册的路由同样生效
#[derive(Debug, Clone)]
struct SecuredFilter {
    value: bool,
    methods: Vec<HttpRequestMethod>,
    url_pattern: String,
}

impl SecuredFilter {
    fn applies_to(&self, route: &Route) -> bool {
        if !self.methods.contains(&route.method) {
            return false;
        }
        match self.url_pattern.strip_suffix('*') {
            Some(prefix) => route.pattern.starts_with(prefix),
            None => route.pattern == self.url_pattern,
        }
    }
}

#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: HashMap<HttpRequestMethod, Vec<Route>>,
    filters: Vec<SecuredFilter>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册路由。相同方法下已有字面量相同的模式时拒绝注册并返回
    /// [`Exception::DuplicateRoute`]，已有的路由保持不变。
    pub fn register<F>(
        &mut self,
        method: HttpRequestMethod,
        pattern: &str,
        handler: F,
    ) -> Result<(), Exception>
    where
        F: Fn(RequestContext, ResponseBuilder) + Send + Sync + 'static,
    {
        let duplicate = self
            .routes
            .get(&method)
            .is_some_and(|routes| routes.iter().any(|r| r.pattern == pattern));
        if duplicate {
            warn!("路由 {} {} 已存在，忽略本次注册", method, pattern);
            return Err(Exception::DuplicateRoute);
        }

        let mut route = Route::compile(method, pattern, Arc::new(handler));
        for filter in &self.filters {
            if filter.applies_to(&route) {
                route.secured = filter.value;
            }
        }
        debug!("注册路由 {} {}，secured={}", method, pattern, route.secured);
        self.routes.entry(method).or_default().push(route);
        Ok(())
    }

    /// 查找第一个匹配 `path` 的路由并提取路径参数。查询字符串不参与匹配。
    pub fn resolve(
        &self,
        method: HttpRequestMethod,
        path: &str,
    ) -> Option<(&Route, HashMap<String, String>)> {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        self.routes
            .get(&method)?
            .iter()
            .find(|route| route.matches(path))
            .map(|route| (route, route.extract(path)))
    }

    /// 把匹配 `url_pattern`（精确或 `prefix*` 通配）的路由标记为 `value`。
    pub fn set_secured(&mut self, value: bool, methods: &[HttpRequestMethod], url_pattern: &str) {
        let filter = SecuredFilter {
            value,
            methods: methods.to_vec(),
            url_pattern: url_pattern.to_string(),
        };
        for method in methods {
            if let Some(routes) = self.routes.get_mut(method) {
                for route in routes.iter_mut().filter(|r| filter.applies_to(r)) {
                    route.secured = value;
                }
            }
        }
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
