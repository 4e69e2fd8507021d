//! Key module - Deterministic cache keys for query descriptors.
//!
//! Keys have the shape `prefix:collection:method:digest[:extra,keys]`, or
//! `prefix:__raw__:query:digest` for raw SQL. The digest covers the
//! canonical JSON form of the options, so semantically identical queries
//! map to the same key whatever placeholder instances they were built with.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let deriver = KeyDeriver::new("cacher");
//! let key = deriver.derive_key(&descriptor);      // cacher:users:findAll:3f2a...
//! let raw = deriver.derive_raw_key("SELECT 1", None); // cacher:__raw__:query:9c1e...
//! ```

mod canonical;

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::query::{QueryDescriptor, QueryValue};

pub use canonical::{CIRCULAR, FlattenHook, LabelHook, canonicalize};

/// Digest length in bytes (160 bits).
const DIGEST_BYTES: usize = 20;

/// Collection segment used for raw queries.
const RAW_COLLECTION: &str = "__raw__";

/// Derives cache keys under a fixed prefix.
///
/// Cloning is cheap; the hook is shared.
#[derive(Clone)]
pub struct KeyDeriver {
    prefix: Arc<str>,
    hook: Arc<dyn FlattenHook>,
}

impl KeyDeriver {
    /// Create a deriver using the default [`LabelHook`].
    pub fn new(prefix: impl Into<Arc<str>>) -> Self {
        Self {
            prefix: prefix.into(),
            hook: Arc::new(LabelHook),
        }
    }

    /// Replace the hook used to flatten placeholder values.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn FlattenHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Same hook, different prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<Arc<str>>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key for a structured query.
    pub fn derive_key(&self, descriptor: &QueryDescriptor) -> String {
        let digest = match descriptor.options() {
            Some(options) => digest("", &self.serialize(options)),
            None => digest(
                &format!("{}:{}", descriptor.collection(), descriptor.method()),
                "",
            ),
        };

        let mut key = format!(
            "{}:{}:{}:{}",
            self.prefix,
            descriptor.collection(),
            descriptor.method(),
            digest
        );

        if !descriptor.extra_keys().is_empty() {
            key.push(':');
            key.push_str(&descriptor.extra_keys().join(","));
        }

        key
    }

    /// Key for a raw SQL query.
    pub fn derive_raw_key(&self, sql: &str, options: Option<&QueryValue>) -> String {
        let body = options.map(|options| self.serialize(options)).unwrap_or_default();
        format!(
            "{}:{}:query:{}",
            self.prefix,
            RAW_COLLECTION,
            digest(sql, &body)
        )
    }

    /// Glob matching every key under this prefix containing `pattern`.
    pub fn invalidation_pattern(&self, pattern: &str) -> String {
        format!("{}:*{}*", self.prefix, pattern)
    }

    /// Stable textual form of an option tree.
    pub fn serialize(&self, options: &QueryValue) -> String {
        canonicalize(options, self.hook.as_ref()).to_string()
    }
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new("cacher")
    }
}

impl std::fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDeriver")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Hex digest of `prefix` followed by `body`, truncated to 160 bits.
pub(crate) fn digest(prefix: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(body.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..DIGEST_BYTES])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Field, Marker, Method, Op};
    use crate::source::{Model, TableModel};

    #[derive(Debug)]
    struct Now;

    impl Marker for Now {
        fn label(&self) -> String {
            "fn:now".to_string()
        }
    }

    fn users_where(age: i64) -> QueryValue {
        QueryValue::map([
            (
                Field::from("where"),
                QueryValue::map([
                    (Field::from(Op::Or), QueryValue::list([QueryValue::from("a"), QueryValue::from("b")])),
                    (Field::from("age"), QueryValue::map([(Op::Gt, age)])),
                ]),
            ),
            (Field::from("limit"), QueryValue::from(10)),
        ])
    }

    fn segments(key: &str) -> Vec<&str> {
        key.split(':').collect()
    }

    #[test]
    fn test_key_shape() {
        let deriver = KeyDeriver::new("cacher");
        let descriptor = QueryDescriptor::new(Method::FindAll, "users", Some(users_where(18)));
        let key = deriver.derive_key(&descriptor);

        let parts = segments(&key);
        assert_eq!(parts.len(), 4);
        assert_eq!(&parts[..3], ["cacher", "users", "findAll"]);
        assert_eq!(parts[3].len(), 40);
        assert!(parts[3].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_identical_descriptors_share_key() {
        let deriver = KeyDeriver::default();
        let a = QueryDescriptor::new(Method::FindAll, "users", Some(users_where(18)));
        let b = QueryDescriptor::new(Method::FindAll, "users", Some(users_where(18)));
        assert_eq!(deriver.derive_key(&a), deriver.derive_key(&b));
    }

    #[test]
    fn test_distinct_marker_instances_share_key() {
        let deriver = KeyDeriver::default();
        let build = || {
            QueryValue::map([(
                "where",
                QueryValue::map([("created_at", QueryValue::map([(Op::Lt, QueryValue::marker(Now))]))]),
            )])
        };

        let a = QueryDescriptor::new(Method::Find, "posts", Some(build()));
        let b = QueryDescriptor::new(Method::Find, "posts", Some(build()));
        assert_eq!(deriver.derive_key(&a), deriver.derive_key(&b));
    }

    #[test]
    fn test_entry_order_does_not_matter() {
        let deriver = KeyDeriver::default();
        let a = QueryValue::map([("limit", 5), ("offset", 10)]);
        let b = QueryValue::map([("offset", 10), ("limit", 5)]);

        assert_eq!(
            deriver.derive_key(&QueryDescriptor::new(Method::FindAll, "users", Some(a))),
            deriver.derive_key(&QueryDescriptor::new(Method::FindAll, "users", Some(b)))
        );
    }

    #[test]
    fn test_different_options_differ() {
        let deriver = KeyDeriver::default();
        let a = QueryDescriptor::new(Method::FindAll, "users", Some(users_where(18)));
        let b = QueryDescriptor::new(Method::FindAll, "users", Some(users_where(19)));
        assert_ne!(deriver.derive_key(&a), deriver.derive_key(&b));
    }

    #[test]
    fn test_different_operators_differ() {
        let deriver = KeyDeriver::default();
        let a = QueryValue::map([(Op::Gt, 1)]);
        let b = QueryValue::map([(Op::Lt, 1)]);
        assert_ne!(deriver.serialize(&a), deriver.serialize(&b));
    }

    #[test]
    fn test_extra_keys_appended_in_order() {
        let deriver = KeyDeriver::default();
        let descriptor = QueryDescriptor::new(Method::Count, "users", None).with_extra_keys(["zeta", "alpha"]);
        let key = deriver.derive_key(&descriptor);

        assert!(key.ends_with(":zeta,alpha"));
        assert!(key.starts_with("cacher:users:count:"));

        let reversed = QueryDescriptor::new(Method::Count, "users", None).with_extra_keys(["alpha", "zeta"]);
        assert_ne!(key, deriver.derive_key(&reversed));
    }

    #[test]
    fn test_no_options_hashes_identity() {
        let deriver = KeyDeriver::default();
        let count = deriver.derive_key(&QueryDescriptor::new(Method::Count, "users", None));
        let all = deriver.derive_key(&QueryDescriptor::new(Method::All, "users", None));
        let groups = deriver.derive_key(&QueryDescriptor::new(Method::Count, "groups", None));

        assert_ne!(segments(&count)[3], segments(&all)[3]);
        assert_ne!(segments(&count)[3], segments(&groups)[3]);
    }

    #[test]
    fn test_model_handles_hash_by_name() {
        let deriver = KeyDeriver::default();
        let first: Arc<dyn Model> = Arc::new(TableModel::new("profiles"));
        let second: Arc<dyn Model> = Arc::new(TableModel::new("profiles"));

        let with = |model: Arc<dyn Model>| QueryValue::map([("include", QueryValue::list([QueryValue::model(model)]))]);
        assert_eq!(deriver.serialize(&with(first.clone())), r#"{"include":["profiles"]}"#);
        assert_eq!(deriver.serialize(&with(first)), deriver.serialize(&with(second)));
    }

    #[test]
    fn test_cyclic_options_derive_a_key() {
        let deriver = KeyDeriver::default();
        let node = QueryValue::shared(QueryValue::map([("limit", 1)]));
        node.write().insert("parent", node.clone());

        let descriptor = QueryDescriptor::new(Method::FindOne, "users", Some(QueryValue::Shared(node.clone())));
        let first = deriver.derive_key(&descriptor);
        let second = deriver.derive_key(&descriptor);
        assert_eq!(first, second);

        node.write().insert("parent", QueryValue::Null);
    }

    #[test]
    fn test_raw_key_shape() {
        let deriver = KeyDeriver::new("app");
        let key = deriver.derive_raw_key("SELECT * FROM users", None);
        let parts = segments(&key);
        assert_eq!(&parts[..3], ["app", "__raw__", "query"]);

        let with_params = deriver.derive_raw_key("SELECT * FROM users", Some(&QueryValue::map([("id", 1)])));
        assert_ne!(key, with_params);
        assert_ne!(key, deriver.derive_raw_key("SELECT * FROM groups", None));
    }

    #[test]
    fn test_invalidation_pattern() {
        let deriver = KeyDeriver::new("cacher");
        assert_eq!(deriver.invalidation_pattern("users"), "cacher:*users*");
    }

    #[test]
    fn test_digest_is_160_bits() {
        assert_eq!(digest("", "").len(), DIGEST_BYTES * 2);
        assert_eq!(digest("a", "b"), digest("", "ab"));
        assert_ne!(digest("a", "b"), digest("a", "c"));
    }
}
