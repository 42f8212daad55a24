//! herd-metadata — formats cluster option metadata.
//!
//! Cluster options (and resource-agent-style parameters) are described
//! once and rendered in two shapes: human-readable text pushed through
//! a caller-supplied sink, and an OCF-style XML tree handed back as
//! plain data. A legacy toggle reproduces the output historically
//! consumed by older daemon metadata commands.
//!
//! # Components
//!
//! - **`option`** — option descriptors and filter flags
//! - **`text`** — text emission behind the [`TextSink`](text::TextSink) trait
//! - **`xml`** — OCF-style XML construction and the legacy transform
//! - **`translate`** — locale seam for translated descriptions
//! - **`error`** — metadata error types

pub mod error;
pub mod option;
pub mod text;
pub mod translate;
pub mod xml;

pub use error::{MetadataError, MetadataResult};
pub use option::{ClusterOption, OptionFlags};
pub use text::{TextSink, option_list_text};
pub use translate::{NoTranslation, Translator};
pub use xml::{OCF_VERSION, XmlNode, option_list_xml};
