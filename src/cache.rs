// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 推送资源的 LRU 缓存，以文件修改时间校验有效性。

use std::num::NonZeroUsize;
use std::time::SystemTime;

use bytes::Bytes;
use log::warn;
use lru::LruCache;

#[derive(Clone)]
struct CacheEntry {
    content: Bytes,
    modified_time: SystemTime,
}

pub struct ResourceCache {
    cache: LruCache<String, CacheEntry>,
    /// 超过该大小的文件不进入缓存
    threshold: u64,
}

impl ResourceCache {
    // 根据容量构造，容量为0时按1处理
    pub fn from_capacity(capacity: usize, threshold: u64) -> Self {
        let capacity = match NonZeroUsize::new(capacity) {
            Some(c) => c,
            None => {
                warn!("cache_size被设置为0，但目前尚不支持禁用缓存，因此该值将被改为1。");
                NonZeroUsize::MIN
            }
        };
        Self {
            cache: LruCache::new(capacity),
            threshold,
        }
    }

    // 放入，过大的文件直接忽略
    pub fn push(&mut self, path: &str, bytes: Bytes, modified_time: SystemTime) {
        if !Self::should_cache(bytes.len() as u64, self.threshold) {
            return;
        }
        let entry = CacheEntry {
            content: bytes,
            modified_time,
        };
        self.cache.put(path.to_string(), entry);
    }

    // 检查文件大小是否适合缓存
    pub fn should_cache(file_size: u64, threshold: u64) -> bool {
        file_size <= threshold
    }

    // 查询有效缓存，修改时间不一致视为失效并移除
    pub fn find(&mut self, path: &str, current_modified_time: SystemTime) -> Option<Bytes> {
        let stale = match self.cache.get(path) {
            Some(entry) if entry.modified_time == current_modified_time => {
                return Some(entry.content.clone());
            }
            Some(_) => true,
            None => false,
        };
        if stale {
            self.cache.pop(path);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}
