//! Decoder for the tab-separated `wg show <iface> dump` text format.

pub mod error;
pub mod key;
pub mod parse;
pub mod record;

pub use error::{DumpError, Result};
pub use key::PeerKey;
pub use parse::{parse, parse_device_dump};
pub use record::{AllowedIp, DeviceDump, DumpPeerRecord};
