//! Application level metadata extracted from the manifest and the layout
//! resources by external parsers.

use crate::errors::{AnalysisError, AnalysisResult};
use dr_bytecode::types::internal_class_name;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppManifest {
    pub package: String,
    /// Activity declared with the `MAIN` action and `LAUNCHER` category,
    /// either as a Java name (`com.example.Main`), a name relative to the
    /// package (`.Main`) or an internal one (`com/example/Main`).
    #[serde(default)]
    pub main_activity: Option<String>,
}

impl AppManifest {
    #[must_use]
    pub fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            main_activity: None,
        }
    }

    #[must_use]
    pub fn with_main_activity(mut self, name: &str) -> Self {
        self.main_activity = Some(name.to_string());
        self
    }

    /// Internal class name of the main activity.
    ///
    /// # Errors
    ///
    /// Fails when the manifest declares no launcher activity.
    pub fn main_activity(&self) -> AnalysisResult<String> {
        let name = self.main_activity.as_deref().ok_or_else(|| {
            AnalysisError::MissingManifestEntry(format!(
                "no MAIN/LAUNCHER activity declared for package {}",
                self.package
            ))
        })?;
        let full = if let Some(relative) = name.strip_prefix('.') {
            format!("{}.{relative}", self.package)
        } else {
            name.to_string()
        };
        Ok(internal_class_name(&full))
    }
}

/// Fragments declared in layout files, by layout resource id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<i64, BTreeSet<String>>", into = "BTreeMap<i64, BTreeSet<String>>")]
pub struct Layouts {
    inner: BTreeMap<i64, BTreeSet<String>>,
}

impl From<BTreeMap<i64, BTreeSet<String>>> for Layouts {
    fn from(raw: BTreeMap<i64, BTreeSet<String>>) -> Self {
        let mut layouts = Self::new();
        for (id, fragments) in raw {
            for fragment in fragments {
                layouts.insert(id, &fragment);
            }
        }
        layouts
    }
}

impl From<Layouts> for BTreeMap<i64, BTreeSet<String>> {
    fn from(layouts: Layouts) -> Self {
        layouts.inner
    }
}

impl Layouts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: i64, fragment: &str) {
        self.inner
            .entry(id)
            .or_default()
            .insert(internal_class_name(fragment));
    }

    /// Fragment classes declared in a layout (internal names).
    pub fn fragments(&self, id: i64) -> impl Iterator<Item = &str> {
        self.inner.get(&id).into_iter().flatten().map(String::as_str)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_activity_names() {
        let m = AppManifest::new("com.example").with_main_activity(".ui.Main");
        assert_eq!(m.main_activity().unwrap(), "com/example/ui/Main");
        let m = AppManifest::new("com.example").with_main_activity("org.other.Start");
        assert_eq!(m.main_activity().unwrap(), "org/other/Start");
    }

    #[test]
    fn missing_main_activity() {
        let m = AppManifest::new("com.example");
        assert!(matches!(m.main_activity(), Err(AnalysisError::MissingManifestEntry(_))));
    }

    #[test]
    fn layouts_from_json() {
        let layouts: Layouts =
            serde_json::from_str(r#"{"2131296284": ["com.example.MapFragment"]}"#).unwrap();
        assert_eq!(
            layouts.fragments(2_131_296_284).collect::<Vec<_>>(),
            vec!["com/example/MapFragment"]
        );
        assert_eq!(layouts.fragments(1).count(), 0);
    }
}
