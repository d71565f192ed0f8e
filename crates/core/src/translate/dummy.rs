use crate::config::TargetLang;
use crate::translate::{TranslateError, Translation, Translator};
use futures::future::BoxFuture;
use futures::FutureExt;

/// Hands the text back untouched.
#[derive(Clone)]
pub struct DummyTranslator;

impl DummyTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DummyTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator for DummyTranslator {
    fn translate(
        &self,
        text: String,
        _target: TargetLang,
    ) -> BoxFuture<'_, Result<Translation, TranslateError>> {
        async move {
            if text.trim().is_empty() {
                return Err(TranslateError::EmptyText);
            }
            Ok(Translation { text })
        }
        .boxed()
    }
}
