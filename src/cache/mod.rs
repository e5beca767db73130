//! 响应缓存模块：提供可插拔的缓存后端以减少重复 API 调用。
//!
//! # Response Caching Module
//!
//! Caches successful chat responses under a fingerprint of the request, so an
//! identical request can be answered without reaching the provider.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheManager`] | Typed get/set with TTL, key prefix and statistics |
//! | [`CacheConfig`] | TTL, enable flag, entry size limit, key prefix |
//! | [`CacheBackend`] | Trait for implementing custom cache backends |
//! | [`MemoryCache`] | In-memory backend with lazy expiry and a background sweep |
//! | [`NullCache`] | No-op cache for disabling caching |
//! | [`CacheKeyGenerator`] | SHA-256 request fingerprint |
//!
//! ## Example
//!
//! ```rust
//! use llmx::cache::{CacheConfig, CacheKeyGenerator, CacheManager, MemoryCache};
//! use llmx::types::{ChatRequest, Message};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let backend = Arc::new(MemoryCache::new(1000)); // max 1000 entries
//! let cache = CacheManager::new(CacheConfig::new().with_ttl(Duration::from_secs(3600)), backend);
//!
//! let request = ChatRequest::new("gpt-4o").message(Message::user("hi"));
//! let key = CacheKeyGenerator::new().generate(&request).unwrap();
//! assert_eq!(key.as_str().len(), 64);
//! ```

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, MemoryCache, NullCache};
pub use key::{CacheKey, CacheKeyGenerator};
pub use manager::{CacheConfig, CacheManager, CacheStats};
