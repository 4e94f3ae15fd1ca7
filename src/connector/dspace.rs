//! DSpace REST payload types shared by the OAPEN and DOAB connectors.

use serde::Deserialize;

use super::utils::join_authors;

#[derive(Debug, Deserialize)]
pub(crate) struct DspaceItem {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub metadata: Vec<DspaceMetadataEntry>,
    #[serde(default)]
    pub bitstreams: Vec<DspaceBitstream>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DspaceMetadataEntry {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DspaceBitstream {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bundle_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub retrieve_link: Option<String>,
}

impl DspaceItem {
    /// All non-empty values recorded under `key`.
    pub(crate) fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.metadata
            .iter()
            .filter(move |entry| entry.key == key)
            .filter_map(|entry| entry.value.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// First non-empty value recorded under `key`.
    pub(crate) fn value(&self, key: &str) -> Option<String> {
        self.values(key).next().map(str::to_string)
    }

    /// Title from `dc.title`, falling back to the item name.
    pub(crate) fn title(&self) -> Option<String> {
        self.value("dc.title")
            .or_else(|| self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string))
    }

    /// Authors, falling back to editors.
    pub(crate) fn authors(&self) -> Option<String> {
        join_authors(self.values("dc.contributor.author"))
            .or_else(|| join_authors(self.values("dc.contributor.editor")))
    }

    /// Subjects from free-text and classification fields.
    pub(crate) fn subjects(&self) -> Vec<String> {
        self.values("dc.subject.other")
            .chain(self.values("dc.subject.classification"))
            .map(str::to_string)
            .take(10)
            .collect()
    }

    /// Stable provider id: handle when present, else uuid.
    pub(crate) fn stable_id(&self) -> Option<String> {
        self.handle
            .as_deref()
            .or(self.uuid.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_accessors() {
        let item: DspaceItem = serde_json::from_value(serde_json::json!({
            "uuid": "u-1",
            "name": "Fallback Name",
            "metadata": [
                {"key": "dc.contributor.editor", "value": "Editor One"},
                {"key": "dc.subject.other", "value": "economics"},
                {"key": "dc.subject.classification", "value": "bic Book Industry Communication::K"},
                {"key": "dc.title", "value": "  "}
            ]
        }))
        .unwrap();
        assert_eq!(item.title().as_deref(), Some("Fallback Name"));
        assert_eq!(item.authors().as_deref(), Some("Editor One"));
        assert_eq!(item.subjects().len(), 2);
        assert_eq!(item.stable_id().as_deref(), Some("u-1"));
    }
}
