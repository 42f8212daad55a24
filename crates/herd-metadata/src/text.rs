//! Text emission of option metadata.
//!
//! Output goes through a caller-supplied sink; the sink carries a
//! "fancy" toggle that is forced on for the duration of a listing and
//! restored afterwards. Advanced and deprecated options are buffered
//! out of the main run and emitted in trailing groups, in their
//! original input order.

use crate::error::MetadataResult;
use crate::option::{ClusterOption, OptionFlags};
use crate::translate::{Translator, localized};

/// Sink for formatted text output.
pub trait TextSink {
    fn info(&mut self, text: &str);
    fn spacer(&mut self);
    /// One list entry; `name` is the entry's label, if it has one.
    fn list_item(&mut self, name: Option<&str>, value: &str);
    fn begin_list(&mut self, header: Option<&str>);
    fn end_list(&mut self);
    /// The sink's fancy-output toggle.
    fn fancy(&self) -> bool;
    fn set_fancy(&mut self, fancy: bool);
}

/// Emit the metadata for a list of options as text.
///
/// An option is emitted only when its flags carry everything in
/// `filter`. Advanced and deprecated options land in trailing groups;
/// each group is shown only when `all` is set, the filter names the
/// corresponding flag, or no filter is in effect at all.
pub fn option_list_text(
    out: &mut dyn TextSink,
    desc_short: &str,
    desc_long: &str,
    filter: OptionFlags,
    options: &[ClusterOption],
    all: bool,
    translator: &dyn Translator,
) -> MetadataResult<()> {
    let old_fancy = out.fancy();
    out.set_fancy(true);
    let result = emit_option_list(out, desc_short, desc_long, filter, options, all, translator);
    out.set_fancy(old_fancy);
    result
}

fn emit_option_list(
    out: &mut dyn TextSink,
    desc_short: &str,
    desc_long: &str,
    filter: OptionFlags,
    options: &[ClusterOption],
    all: bool,
    translator: &dyn Translator,
) -> MetadataResult<()> {
    let unfiltered = filter == OptionFlags::default();
    let show_deprecated = all || unfiltered || filter.deprecated;
    let show_advanced = all || unfiltered || filter.advanced;

    out.info(&localized(translator, desc_short));
    out.spacer();
    out.info(&localized(translator, desc_long));
    out.begin_list(None);

    let mut advanced = Vec::new();
    let mut deprecated = Vec::new();

    for option in options {
        if !option.flags.contains(filter) {
            continue;
        }
        // Deprecated and advanced options are held back for the
        // trailing groups.
        if option.flags.deprecated {
            if show_deprecated {
                deprecated.push(option);
            }
        } else if option.flags.advanced {
            if show_advanced {
                advanced.push(option);
            }
        } else {
            out.spacer();
            emit_option(out, option, translator)?;
        }
    }

    if !advanced.is_empty() {
        out.spacer();
        out.begin_list(Some("ADVANCED OPTIONS"));
        for option in advanced {
            out.spacer();
            emit_option(out, option, translator)?;
        }
        out.end_list();
    }

    if !deprecated.is_empty() {
        out.spacer();
        out.begin_list(Some(
            "DEPRECATED OPTIONS (will be removed in a future release)",
        ));
        for option in deprecated {
            out.spacer();
            emit_option(out, option, translator)?;
        }
        out.end_list();
    }

    out.end_list();
    Ok(())
}

fn emit_option(
    out: &mut dyn TextSink,
    option: &ClusterOption,
    translator: &dyn Translator,
) -> MetadataResult<()> {
    let (short, long) = option.text_descriptions()?;
    out.list_item(Some(&option.name), &localized(translator, short));
    out.begin_list(None);
    if let Some(long) = long {
        out.list_item(None, &localized(translator, long));
    }
    emit_possible_values(out, option);
    out.end_list();
    Ok(())
}

fn emit_possible_values(out: &mut dyn TextSink, option: &ClusterOption) {
    let label = if option.flags.generated {
        "Possible values (generated)"
    } else {
        "Possible values"
    };

    let values = option.value_list();
    let buf = if !values.is_empty() && option.kind == "select" {
        // A select with no configured default never marks one; with a
        // default, only the first equal value gets the marker.
        let mut found_default = option.default_value.is_none();
        let mut buf = String::new();
        for value in values {
            if !buf.is_empty() {
                buf.push_str(", ");
            }
            buf.push('"');
            buf.push_str(value);
            buf.push('"');
            if !found_default && Some(value) == option.default_value.as_deref() {
                found_default = true;
                buf.push_str(" (default)");
            }
        }
        buf
    } else if let Some(default) = &option.default_value {
        format!("{} (default: \"{}\")", option.kind, default)
    } else {
        format!("{} (no default)", option.kind)
    };

    out.list_item(Some(label), &buf);
}
