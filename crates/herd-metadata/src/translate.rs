//! Locale seam for translated option descriptions.

/// External translation provider. When a locale is active and a
/// description has a differing translation, the XML output gains a
/// second description element tagged with the locale, and text output
/// shows the translated form inline.
pub trait Translator {
    /// Primary language tag of the active locale, if any.
    fn locale(&self) -> Option<&str>;

    /// The translation of `text` under the active locale, if one
    /// exists.
    fn translate(&self, text: &str) -> Option<String>;
}

/// No active locale; all text passes through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranslation;

impl Translator for NoTranslation {
    fn locale(&self) -> Option<&str> {
        None
    }

    fn translate(&self, _text: &str) -> Option<String> {
        None
    }
}

/// The text to show for `text` under the active locale.
pub(crate) fn localized(translator: &dyn Translator, text: &str) -> String {
    translator
        .translate(text)
        .unwrap_or_else(|| text.to_string())
}
