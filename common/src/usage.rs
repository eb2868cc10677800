use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CommonError;

/// Traffic counters of one peer at a point in time.
///
/// Within a single interface lifetime both counters only grow; a restart of
/// the interface drops them back to (near) zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerUsage {
    pub public_key: String,
    pub upload: u64,
    pub download: u64,
}

impl PeerUsage {
    pub fn new<S: Into<String>>(public_key: S, upload: u64, download: u64) -> Self {
        Self {
            public_key: public_key.into(),
            upload,
            download,
        }
    }
}

/// Usage keyed by peer public key.
pub type UsageMap = HashMap<String, PeerUsage>;

/// Index a sequence of readings by public key. A key seen twice keeps the
/// last reading.
pub fn index_by_key<I>(usages: I) -> UsageMap
where
    I: IntoIterator<Item = PeerUsage>,
{
    usages
        .into_iter()
        .map(|usage| (usage.public_key.clone(), usage))
        .collect()
}

/// Flatten a map back into a sequence ordered by public key, so that writes
/// are deterministic.
pub fn into_sorted_vec(map: UsageMap) -> Vec<PeerUsage> {
    let mut out: Vec<PeerUsage> = map.into_values().collect();
    out.sort_by(|a, b| a.public_key.cmp(&b.public_key));
    out
}

/// Which of the interface's receive/transmit counters is reported as the
/// peer's upload.
///
/// The interface receives what a peer uploads, so `ReceiveIsUpload` is the
/// default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterMapping {
    #[default]
    ReceiveIsUpload,
    TransmitIsUpload,
}

impl CounterMapping {
    /// Returns `(upload, download)`.
    pub fn apply(self, receive_bytes: u64, transmit_bytes: u64) -> (u64, u64) {
        match self {
            CounterMapping::ReceiveIsUpload => (receive_bytes, transmit_bytes),
            CounterMapping::TransmitIsUpload => (transmit_bytes, receive_bytes),
        }
    }

    pub fn to_usage<S: Into<String>>(
        self,
        public_key: S,
        receive_bytes: u64,
        transmit_bytes: u64,
    ) -> PeerUsage {
        let (upload, download) = self.apply(receive_bytes, transmit_bytes);
        PeerUsage::new(public_key, upload, download)
    }
}

impl fmt::Display for CounterMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterMapping::ReceiveIsUpload => f.write_str("receive_is_upload"),
            CounterMapping::TransmitIsUpload => f.write_str("transmit_is_upload"),
        }
    }
}

impl FromStr for CounterMapping {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "receive_is_upload" | "rx" => Ok(CounterMapping::ReceiveIsUpload),
            "transmit_is_upload" | "tx" => Ok(CounterMapping::TransmitIsUpload),
            _ => Err(CommonError::UnknownCounterMapping(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_by_key_keeps_last_reading() {
        let map = index_by_key(vec![
            PeerUsage::new("a", 1, 2),
            PeerUsage::new("b", 3, 4),
            PeerUsage::new("a", 5, 6),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], PeerUsage::new("a", 5, 6));
    }

    #[test]
    fn test_into_sorted_vec() {
        let map = index_by_key(vec![PeerUsage::new("z", 1, 1), PeerUsage::new("m", 2, 2)]);
        let keys: Vec<_> = into_sorted_vec(map)
            .into_iter()
            .map(|u| u.public_key)
            .collect();
        assert_eq!(keys, vec!["m".to_string(), "z".to_string()]);
    }

    #[test]
    fn test_counter_mapping_directions() {
        assert_eq!(CounterMapping::ReceiveIsUpload.apply(10, 30), (10, 30));
        assert_eq!(CounterMapping::TransmitIsUpload.apply(10, 30), (30, 10));
        assert_eq!(CounterMapping::default(), CounterMapping::ReceiveIsUpload);
    }

    #[test]
    fn test_counter_mapping_from_str() {
        assert_eq!(
            "receive_is_upload".parse::<CounterMapping>().unwrap(),
            CounterMapping::ReceiveIsUpload
        );
        assert_eq!(
            "Transmit-Is-Upload".parse::<CounterMapping>().unwrap(),
            CounterMapping::TransmitIsUpload
        );
        assert!("sideways".parse::<CounterMapping>().is_err());
    }
}
