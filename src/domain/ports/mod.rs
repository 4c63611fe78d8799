mod byte_store_port;
mod contact_port;
mod http_port;

pub use byte_store_port::{ByteStorePort, StoredEntry, StoredValue, ValueKind};
pub use contact_port::ContactPhotoPort;
pub use http_port::{HttpPort, HttpResponse};
