//! OCF-style XML metadata construction.
//!
//! The XML output is built as a plain value tree and handed to the
//! caller's sink for serialization. The legacy transform (for old
//! daemon metadata commands) is isolated here, at output time; the
//! option model itself knows nothing about it.

use serde::{Deserialize, Serialize};

use crate::error::MetadataResult;
use crate::option::{ClusterOption, OptionFlags};
use crate::translate::Translator;

/// OCF standard version advertised in the metadata.
pub const OCF_VERSION: &str = "1.1";

/// A plain XML element: name, attributes, optional text, children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn element(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn text_element(name: &str, text: &str) -> Self {
        let mut node = Self::element(name);
        node.text = Some(text.to_string());
        node
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn push(&mut self, child: XmlNode) {
        self.children.push(child);
    }

    /// First child element with the given name.
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn attr_value(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Build the OCF-style metadata tree for a list of options.
///
/// `name` and `version` describe the pseudo resource agent. With
/// `legacy` set, option types are mapped to their historical names,
/// deprecation/advanced markers fold into the short description, the
/// allowed values inline into the long description, and the
/// `advanced`/`generated` attributes are omitted.
pub fn option_list_xml(
    name: &str,
    version: &str,
    desc_short: &str,
    desc_long: &str,
    filter: OptionFlags,
    options: &[ClusterOption],
    legacy: bool,
    translator: &dyn Translator,
) -> MetadataResult<XmlNode> {
    let mut root = XmlNode::element("resource-agent")
        .attr("name", name)
        .attr("version", version);
    root.push(XmlNode::text_element("version", OCF_VERSION));
    add_desc(&mut root, true, desc_long, translator);
    add_desc(&mut root, false, desc_short, translator);

    let mut parameters = XmlNode::element("parameters");
    for option in options {
        if option.flags.contains(filter) {
            parameters.push(option_xml(option, legacy, translator)?);
        }
    }
    root.push(parameters);
    Ok(root)
}

/// Add a `longdesc`/`shortdesc` element, plus a translated sibling when
/// the active locale provides a differing translation.
fn add_desc(parent: &mut XmlNode, for_long: bool, desc: &str, translator: &dyn Translator) {
    let tag = if for_long { "longdesc" } else { "shortdesc" };
    parent.push(XmlNode::text_element(tag, desc).attr("lang", "en"));

    if let (Some(locale), Some(translated)) = (translator.locale(), translator.translate(desc)) {
        if translated != desc {
            parent.push(XmlNode::text_element(tag, &translated).attr("lang", locale));
        }
    }
}

/// Option types historically shown under different names by the daemon
/// metadata commands.
fn map_legacy_kind(kind: &str) -> &str {
    match kind {
        "duration" => "time",
        "nonnegative_integer" => "integer",
        other => other,
    }
}

fn option_xml(
    option: &ClusterOption,
    legacy: bool,
    translator: &dyn Translator,
) -> MetadataResult<XmlNode> {
    let (long, short) = option.xml_descriptions()?;
    let mut desc_long = long.to_string();
    let mut desc_short = short.to_string();
    let mut kind = option.kind.as_str();

    if legacy {
        kind = map_legacy_kind(kind);

        if let Some(values) = &option.values {
            desc_long = format!("{desc_long}  Allowed values: {values}");
        }

        if option.flags.deprecated || option.flags.advanced {
            // When the long description was borrowed from the short
            // one, the markers make up the whole short description.
            let base = if option.description_long.is_none() {
                String::new()
            } else {
                option.description_short.clone().unwrap_or_default()
            };
            let mut rebuilt = String::new();
            if option.flags.deprecated {
                rebuilt.push_str("*** Deprecated ***");
            }
            if option.flags.advanced {
                if !rebuilt.is_empty() {
                    rebuilt.push(' ');
                }
                rebuilt.push_str("*** Advanced Use Only ***");
            }
            if !base.is_empty() {
                if !rebuilt.is_empty() {
                    rebuilt.push(' ');
                }
                rebuilt.push_str(&base);
            }
            desc_short = rebuilt;
        }
    }

    let mut parameter = XmlNode::element("parameter").attr("name", &option.name);
    if !legacy {
        parameter = parameter
            .attr("advanced", if option.flags.advanced { "1" } else { "0" })
            .attr("generated", if option.flags.generated { "1" } else { "0" });
        if option.flags.deprecated {
            parameter.push(XmlNode::element("deprecated"));
        }
    }

    add_desc(&mut parameter, true, &desc_long, translator);
    add_desc(&mut parameter, false, &desc_short, translator);

    let mut content = XmlNode::element("content").attr("type", kind);
    if let Some(default) = &option.default_value {
        content = content.attr("default", default);
    }
    if option.kind == "select" {
        for value in option.value_list() {
            content.push(XmlNode::element("option").attr("value", value));
        }
    }
    parameter.push(content);
    Ok(parameter)
}
