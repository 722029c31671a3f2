//! Summary subset of the exposition document

use std::collections::BTreeMap;

use serde::Serialize;

use super::exposition::ExpositionDocument;

/// Keys shown in the summary by default (columns of the AssetCache `ZMETRIC` table).
pub const DEFAULT_SUMMARY_KEYS: &[&str] = &[
    "acc_zrequestsfromclient",
    "acc_zrepliesfromorigintoclient",
    "acc_zbytesfromcachetoclient",
    "acc_zbytesfromorigintoclient",
    "acc_zbytesdropped",
    "acc_zcreationdate",
];

/// Allow-listed metric key → raw sample value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FilteredView(BTreeMap<String, String>);

impl FilteredView {
    /// Parse the document's sample lines and keep only allow-listed keys.
    ///
    /// Keys are compared lowercase with labels stripped. When a key occurs
    /// more than once the last sample wins.
    pub fn from_document<S: AsRef<str>>(doc: &ExpositionDocument, allow_list: &[S]) -> Self {
        let mut view = BTreeMap::new();
        for sample in doc.samples() {
            let key = sample.name.to_ascii_lowercase();
            if allow_list
                .iter()
                .any(|allowed| allowed.as_ref().eq_ignore_ascii_case(&key))
            {
                view.insert(key, sample.value.to_string());
            }
        }
        Self(view)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
