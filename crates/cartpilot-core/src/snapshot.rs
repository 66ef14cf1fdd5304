use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Options listed per filter category in a snapshot.
pub const MAX_FILTER_OPTIONS: usize = 5;

/// A simplified, serializable view of the current page, handed to the
/// language model when deterministic steps run out of options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub title: String,
    pub url: String,
    pub platform: Option<Platform>,
    pub products: Vec<SnapshotProduct>,
    pub filters: Vec<SnapshotFilter>,
    pub buttons: Vec<SnapshotButton>,
    pub inputs: Vec<SnapshotInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotProduct {
    pub index: usize,
    pub title: String,
    pub price: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFilter {
    pub category: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotButton {
    pub text: String,
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInput {
    pub name: String,
    pub placeholder: String,
    pub selector: String,
}

impl PageSnapshot {
    /// `true` when the snapshot offers the model nothing to act on.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
            && self.filters.is_empty()
            && self.buttons.is_empty()
            && self.inputs.is_empty()
    }
}
