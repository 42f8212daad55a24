//! Cluster option descriptors.

use serde::{Deserialize, Serialize};

use crate::error::{MetadataError, MetadataResult};

/// Classification flags on an option.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionFlags {
    /// For experts only; hidden from the main listing.
    pub advanced: bool,
    /// Will be removed in a future release.
    pub deprecated: bool,
    /// Value is produced by the cluster rather than configured.
    pub generated: bool,
}

impl OptionFlags {
    pub fn advanced() -> Self {
        Self {
            advanced: true,
            ..Self::default()
        }
    }

    pub fn deprecated() -> Self {
        Self {
            deprecated: true,
            ..Self::default()
        }
    }

    /// Whether this set carries every flag the filter asks for.
    pub fn contains(self, filter: OptionFlags) -> bool {
        (!filter.advanced || self.advanced)
            && (!filter.deprecated || self.deprecated)
            && (!filter.generated || self.generated)
    }
}

/// One configurable cluster option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterOption {
    pub name: String,
    /// Value type: "string", "boolean", "integer", "duration",
    /// "nonnegative_integer", "select", ...
    pub kind: String,
    pub default_value: Option<String>,
    /// Comma-separated allowed values, for `select` options.
    pub values: Option<String>,
    pub description_short: Option<String>,
    pub description_long: Option<String>,
    pub flags: OptionFlags,
}

impl ClusterOption {
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            default_value: None,
            values: None,
            description_short: None,
            description_long: None,
            flags: OptionFlags::default(),
        }
    }

    /// Split the comma-separated `values` list. Commas and spaces both
    /// separate, so `"on,off"` and `"on, off"` read the same.
    pub(crate) fn value_list(&self) -> Vec<&str> {
        self.values
            .as_deref()
            .map(|values| {
                values
                    .split([',', ' '])
                    .filter(|value| !value.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Descriptions for text output: the short one leads, and when it
    /// is missing the long one takes its place.
    pub(crate) fn text_descriptions(&self) -> MetadataResult<(&str, Option<&str>)> {
        match (&self.description_short, &self.description_long) {
            (Some(short), long) => Ok((short, long.as_deref())),
            (None, Some(long)) => Ok((long, None)),
            (None, None) => Err(MetadataError::MissingDescription(self.name.clone())),
        }
    }

    /// Descriptions for XML output: both are required by the standard,
    /// so a missing one borrows the other.
    pub(crate) fn xml_descriptions(&self) -> MetadataResult<(&str, &str)> {
        match (&self.description_long, &self.description_short) {
            (Some(long), Some(short)) => Ok((long, short)),
            (Some(long), None) => Ok((long, long)),
            (None, Some(short)) => Ok((short, short)),
            (None, None) => Err(MetadataError::MissingDescription(self.name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_containment() {
        let flags = OptionFlags::advanced();
        assert!(flags.contains(OptionFlags::default()));
        assert!(flags.contains(OptionFlags::advanced()));
        assert!(!flags.contains(OptionFlags::deprecated()));
        assert!(!OptionFlags::default().contains(OptionFlags::advanced()));
    }

    #[test]
    fn value_list_splits_on_commas_and_spaces() {
        let mut option = ClusterOption::new("mode", "select");
        option.values = Some("on,off".to_string());
        assert_eq!(option.value_list(), vec!["on", "off"]);

        option.values = Some("on, off, auto".to_string());
        assert_eq!(option.value_list(), vec!["on", "off", "auto"]);

        option.values = None;
        assert!(option.value_list().is_empty());
    }

    #[test]
    fn text_descriptions_fall_back_to_long() {
        let mut option = ClusterOption::new("mode", "string");
        option.description_long = Some("the long story".to_string());
        let (short, long) = option.text_descriptions().unwrap();
        assert_eq!(short, "the long story");
        assert_eq!(long, None);
    }

    #[test]
    fn missing_both_descriptions_fails_fast() {
        let option = ClusterOption::new("mode", "string");
        assert!(matches!(
            option.text_descriptions(),
            Err(MetadataError::MissingDescription(_))
        ));
        assert!(matches!(
            option.xml_descriptions(),
            Err(MetadataError::MissingDescription(_))
        ));
    }
}
