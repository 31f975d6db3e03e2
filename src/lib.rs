pub mod models;
pub mod error;
pub mod ordered_map;
pub mod dataformat;
pub mod value;
pub mod protected;
pub mod component;
pub mod config;
pub mod engine;

// Re-export commonly used items
pub use component::{Component, ComponentKind, RequestComponent};
pub use config::SurfaceConfig;
pub use dataformat::{Codec, FieldValue, KvMap, Registry};
pub use error::{CodecError, ComponentError, ConfigError, ErrorKind, RequestError};
pub use models::{HttpRequest, Method};
pub use ordered_map::OrderedMap;
pub use protected::ProtectedKeys;
pub use value::Value;
