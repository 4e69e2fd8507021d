//! Query module - What a cacheable query looks like.
//!
//! A query is described by a [`QueryDescriptor`]: the retrieval [`Method`],
//! the target collection and an arbitrary [`QueryValue`] option tree. Option
//! trees may contain operator placeholders ([`Op`]), opaque [`Marker`]s,
//! collection handles and shared (possibly cyclic) nodes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let options = QueryValue::map([
//!     ("where", QueryValue::map([(Field::from("age"), QueryValue::map([(Op::Gt, 18)]))])),
//!     ("limit", QueryValue::from(10)),
//! ]);
//! let descriptor = QueryDescriptor::new(Method::FindAll, "users", Some(options));
//! ```

mod descriptor;
mod method;
mod op;
mod value;

pub use descriptor::{QueryDescriptor, QueryType, RawOptions};
pub use method::Method;
pub use op::Op;
pub use value::{Field, Marker, ModelRef, QueryValue, SharedValue};
