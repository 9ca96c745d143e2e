//! Reflection / metadata lookup
//!
//! [`MetadataResolver`] is the contract of the scripting runtime walker
//! (IL2CPP or Mono API calls, possibly fuzzy-matching obfuscated names). The
//! walker itself lives outside this crate.
//!
//! [`ResolverCache`] memoizes `(class, member)` lookups, misses included.
//! Concurrent first lookups of one member may both run the walker; the first
//! stored result is the one every caller gets.
//!
//! # Example
//!
//! ```ignore
//! let cache = ResolverCache::new();
//! if let Some(addr) = cache.method_address(&walker, "Assembly-CSharp", "PlayerController", "Update") {
//!     UPDATE_HOOK.target(unsafe { PlayerUpdateFn::from_addr(addr) });
//! }
//! ```

use dashmap::DashMap;

use unihook_sdk::{ClassHandle, MethodHandle};

/// Lookup contract of the scripting runtime metadata walker
pub trait MetadataResolver: Send + Sync {
    /// Find a class by image/module name and (possibly namespaced) class name
    fn resolve_class(&self, module: &str, name: &str) -> Option<ClassHandle>;

    /// Find a method on a class
    fn resolve_method(&self, class: ClassHandle, name: &str) -> Option<MethodHandle>;

    /// Native entry point of a method
    fn method_address(&self, method: MethodHandle) -> Option<usize>;

    /// Byte offset of an instance field
    fn resolve_field_offset(&self, class: ClassHandle, name: &str) -> Option<usize>;
}

type MemberKey = (String, String);

/// Memoizing cache over a [`MetadataResolver`]
#[derive(Debug, Default)]
pub struct ResolverCache {
    methods: DashMap<MemberKey, Option<usize>>,
    fields: DashMap<MemberKey, Option<usize>>,
}

fn member_key(module: &str, class: &str, member: &str) -> MemberKey {
    (format!("{}!{}", module, class), member.to_string())
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Native address of `module!class::method`
    pub fn method_address(
        &self,
        resolver: &dyn MetadataResolver,
        module: &str,
        class: &str,
        method: &str,
    ) -> Option<usize> {
        let key = member_key(module, class, method);
        if let Some(cached) = self.methods.get(&key) {
            return *cached;
        }

        // No shard lock is held while the walker runs; it may use this cache
        let addr = resolver
            .resolve_class(module, class)
            .and_then(|c| resolver.resolve_method(c, method))
            .and_then(|m| resolver.method_address(m));

        match addr {
            Some(addr) => tracing::debug!("Resolved {}::{} at {:x}", class, method, addr),
            None => tracing::warn!("Failed to resolve method {}::{}", class, method),
        }

        // A racing lookup may have stored first; every caller sees that entry
        *self.methods.entry(key).or_insert(addr)
    }

    /// Instance field offset of `module!class::field`
    pub fn field_offset(
        &self,
        resolver: &dyn MetadataResolver,
        module: &str,
        class: &str,
        field: &str,
    ) -> Option<usize> {
        let key = member_key(module, class, field);
        if let Some(cached) = self.fields.get(&key) {
            return *cached;
        }

        let offset = resolver
            .resolve_class(module, class)
            .and_then(|c| resolver.resolve_field_offset(c, field));

        if offset.is_none() {
            tracing::warn!("Failed to resolve field {}::{}", class, field);
        }

        *self.fields.entry(key).or_insert(offset)
    }

    /// Number of cached lookups (hits and misses)
    pub fn len(&self) -> usize {
        self.methods.len() + self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry, forcing re-resolution
    pub fn clear(&self) {
        self.methods.clear();
        self.fields.clear();
    }
}
