//! Filter-based device selection

use crate::domain::audio::Device;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_INPUT_FILTER: &str = "Virtual Audio Cable";
pub const DEFAULT_PRIMARY_FILTER: &str = "Headphones";
pub const DEFAULT_FALLBACK_FILTER: &str = "Speakers";

/// Returns the first device, in catalog order, whose description contains
/// `filter`.
///
/// An empty filter is contained in every description and therefore picks the
/// first device.
pub fn select<'a>(devices: &'a [Device], filter: &str) -> Option<&'a Device> {
    devices.iter().find(|d| d.description.contains(filter))
}

/// The three substrings used to resolve the route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    pub input_filter: String,
    pub primary_filter: String,
    pub fallback_filter: String,
}

impl Default for FilterSet {
    fn default() -> Self {
        Self {
            input_filter: DEFAULT_INPUT_FILTER.to_string(),
            primary_filter: DEFAULT_PRIMARY_FILTER.to_string(),
            fallback_filter: DEFAULT_FALLBACK_FILTER.to_string(),
        }
    }
}

impl FilterSet {
    pub fn new(
        input_filter: impl Into<String>,
        primary_filter: impl Into<String>,
        fallback_filter: impl Into<String>,
    ) -> Self {
        Self {
            input_filter: input_filter.into(),
            primary_filter: primary_filter.into(),
            fallback_filter: fallback_filter.into(),
        }
    }

    pub fn set_input(&mut self, filter: impl Into<String>) {
        self.input_filter = checked("input", filter.into());
    }

    pub fn set_primary(&mut self, filter: impl Into<String>) {
        self.primary_filter = checked("primary", filter.into());
    }

    pub fn set_fallback(&mut self, filter: impl Into<String>) {
        self.fallback_filter = checked("fallback", filter.into());
    }
}

fn checked(slot: &str, filter: String) -> String {
    if filter.is_empty() {
        warn!(slot, "Empty filter matches every device; the first one will be selected");
    }
    filter
}
