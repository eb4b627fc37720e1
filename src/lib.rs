//! TwinLog storage engine library.

pub mod checksum;
pub mod codec;
pub mod engine;
pub mod error;
pub mod index;
pub mod logs;
pub mod recovery;

pub use codec::{Bincode, Encoding, Key, ObjectCodec, Value};
pub use engine::{Store, StoreBuilder};
pub use error::{Error, Result};
