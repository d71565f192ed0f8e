//! Text in, shaped speech out: translate, synthesize, decode, render.

use crate::config::TargetLang;
use crate::decode::SymphoniaDecoder;
use crate::render::{AudioBackend, EmotionAudioRenderer, RenderError};
use crate::translate::Translator;
use crate::tts::{TtsClient, TtsError, TtsRequest, VoiceId};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("text must not be empty")]
    EmptyText,

    #[error("speech synthesis failed: {0}")]
    Synthesis(#[from] TtsError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Clone, Debug)]
pub struct SpeakRequest {
    pub text: String,
    /// `None` speaks the text as given.
    pub target_lang: Option<TargetLang>,
    pub voice: Option<VoiceId>,
    pub emotion: String,
}

#[derive(Clone, Debug)]
pub struct SpeakOutcome<H> {
    /// The text that was actually synthesized.
    pub spoken_text: String,
    pub translated: bool,
    /// `None` when a newer request superseded this one during decoding.
    pub handle: Option<H>,
}

pub struct SpeakPipeline<B: AudioBackend> {
    translator: Option<Arc<dyn Translator>>,
    tts: Arc<dyn TtsClient>,
    decoder: SymphoniaDecoder,
    renderer: EmotionAudioRenderer<B>,
}

impl<B: AudioBackend> SpeakPipeline<B> {
    pub fn new(tts: Arc<dyn TtsClient>, backend: B) -> Self {
        Self {
            translator: None,
            tts,
            decoder: SymphoniaDecoder::new(),
            renderer: EmotionAudioRenderer::new(backend),
        }
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn renderer(&self) -> &EmotionAudioRenderer<B> {
        &self.renderer
    }

    pub fn stop(&self) {
        self.renderer.stop();
    }

    pub async fn speak(
        &self,
        request: SpeakRequest,
    ) -> Result<SpeakOutcome<B::Handle>, PipelineError> {
        if request.text.trim().is_empty() {
            return Err(PipelineError::EmptyText);
        }

        let (spoken_text, translated) = self
            .maybe_translate(request.text, request.target_lang)
            .await;

        let audio = self
            .tts
            .synthesize(TtsRequest {
                text: spoken_text.clone(),
                voice: request.voice,
            })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "speech synthesis failed");
                PipelineError::Synthesis(e)
            })?;
        tracing::debug!(
            bytes = audio.bytes.len(),
            content_type = %audio.content_type,
            "speech synthesized"
        );

        let handle = self
            .renderer
            .render_encoded(&self.decoder, audio, &request.emotion)
            .await?;

        Ok(SpeakOutcome {
            spoken_text,
            translated,
            handle,
        })
    }

    /// Falls back to the original text when translation is off or fails.
    async fn maybe_translate(&self, text: String, target: Option<TargetLang>) -> (String, bool) {
        let (Some(translator), Some(target)) = (self.translator.as_ref(), target) else {
            return (text, false);
        };
        match translator.translate(text.clone(), target.clone()).await {
            Ok(t) if !t.text.trim().is_empty() => {
                tracing::info!(target_lang = %target.as_str(), "text translated");
                (t.text, true)
            }
            Ok(_) => (text, false),
            Err(e) => {
                tracing::warn!(error = %e, "translation failed; speaking original text");
                (text, false)
            }
        }
    }
}
