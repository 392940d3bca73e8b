//! Device-subset filter shared by the resolver, the HTTP query parameter and
//! the client-side visibility pass.
//!
//! Filtering is best-effort: blank identifiers are dropped rather than
//! rejected, and a filter left with no identifiers selects every sensor.

use std::collections::BTreeSet;

use crate::models::snapshot::SensorView;

/// Query parameter carrying the comma-separated device identifiers.
pub const DEVICE_IDS_PARAM: &str = "deviceIds";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    ids: BTreeSet<String>,
}

impl DeviceFilter {
    /// A filter that matches every sensor.
    pub fn all() -> Self {
        DeviceFilter::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = ids
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        DeviceFilter { ids }
    }

    /// Parse the `deviceIds=A,B,C` wire form.
    pub fn parse(raw: &str) -> Self {
        Self::from_ids(raw.split(','))
    }

    /// Merge every `deviceIds` occurrence of a query string. A repeated
    /// parameter widens the set; no occurrence at all means no filter.
    pub fn from_query<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::from_ids(values.into_iter().flat_map(|v| v.split(',')))
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Identifiers in ascending order, suitable for an `= ANY($1)` bind.
    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn matches(&self, device_id: &str) -> bool {
        self.ids.is_empty() || self.ids.contains(device_id)
    }

    /// Value for the `deviceIds` query parameter; `None` means "omit it".
    pub fn to_query_value(&self) -> Option<String> {
        if self.ids.is_empty() {
            None
        } else {
            Some(self.ids.iter().map(String::as_str).collect::<Vec<_>>().join(","))
        }
    }

    /// Client-side pass over a decoded payload. Applied even though the
    /// server already filtered, so a server that ignores `deviceIds` still
    /// renders only the requested devices.
    pub fn visible(&self, markers: &[SensorView]) -> Vec<SensorView> {
        markers.iter().filter(|m| self.matches(&m.device_id)).cloned().collect()
    }
}

impl std::fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_query_value() {
            Some(v) => write!(f, "[{}]", v),
            None => write!(f, "[all]"),
        }
    }
}
