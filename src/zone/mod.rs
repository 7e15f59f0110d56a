//! In-memory zone data and the lookups that answer from it.

pub mod answer;
pub mod index;
pub mod record;
pub mod subnet;
pub mod walker;

pub use answer::expand_ipv6;
pub use index::{ZoneEntry, ZoneIndex};
pub use record::{ChangeEvent, RecordType, ResourceRecord};
pub use subnet::{Subnet, in_subnet, ip2long};
pub use walker::{Walker, domain_parts};
