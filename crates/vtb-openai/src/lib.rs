//! OpenAI adapter (voice transcription).
//!
//! Downloads the platform file link and uploads it to the `audio/transcriptions`
//! endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use vtb_core::{
    errors::Error,
    language::LanguageCode,
    ports::{RecognitionMeta, VoiceConverter},
    Result,
};

const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const MODEL: &str = "whisper-1";

#[derive(Deserialize)]
struct TranscriptionDto {
    #[serde(default)]
    text: String,
}

#[derive(Clone, Debug)]
pub struct WhisperConverter {
    api_key: String,
    endpoint: String,
    http: reqwest::Client,
}

impl WhisperConverter {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("openai http client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            endpoint: TRANSCRIPTIONS_URL.to_string(),
            http,
        })
    }

    #[cfg(test)]
    fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn download(&self, file_link: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(file_link)
            .send()
            .await
            .map_err(|e| Error::Recognition(format!("file download error: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Recognition(format!(
                "file download failed: {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Recognition(format!("file download error: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Upload name and mime type Whisper should see for the file.
///
/// Whisper picks the decoder from the file extension, so the name has to
/// match the container the platform reported.
fn upload_kind(mime_type: Option<&str>, is_video: bool) -> (&'static str, &'static str) {
    let mime = mime_type
        .and_then(|m| m.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase());
    match mime.as_deref() {
        Some("audio/ogg" | "audio/opus" | "audio/x-opus+ogg") => ("audio.ogg", "audio/ogg"),
        Some("audio/mpeg" | "audio/mp3") => ("audio.mp3", "audio/mpeg"),
        Some("audio/mp4" | "audio/m4a" | "audio/x-m4a") => ("audio.m4a", "audio/mp4"),
        Some("audio/wav" | "audio/x-wav") => ("audio.wav", "audio/wav"),
        Some("audio/webm") => ("audio.webm", "audio/webm"),
        Some("video/webm") => ("video.webm", "video/webm"),
        Some(m) if m.starts_with("video/") => ("video.mp4", "video/mp4"),
        _ if is_video => ("video.mp4", "video/mp4"),
        _ => ("audio.ogg", "audio/ogg"),
    }
}

fn parse_transcription(body: &str) -> Result<String> {
    let dto: TranscriptionDto = serde_json::from_str(body)
        .map_err(|e| Error::Recognition(format!("openai json error: {e}")))?;
    Ok(dto.text.trim().to_string())
}

#[async_trait]
impl VoiceConverter for WhisperConverter {
    async fn transform_to_text(
        &self,
        file_link: &str,
        is_video: bool,
        lang: LanguageCode,
        meta: &RecognitionMeta,
    ) -> Result<String> {
        info!(
            file_id = %meta.file_id,
            duration_secs = meta.duration_secs,
            "{} starting recognition",
            meta.log_prefix
        );
        let bytes = self.download(file_link).await?;
        let (file_name, mime) = upload_kind(meta.mime_type.as_deref(), is_video);

        let form = reqwest::multipart::Form::new()
            .text("model", MODEL)
            .text("language", lang.short().to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str(mime)
                    .map_err(|e| Error::External(format!("openai multipart error: {e}")))?,
            );

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Recognition(format!("openai request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Recognition(format!("openai response read error: {e}")))?;
        if !status.is_success() {
            warn!("{} openai transcription failed: {status}", meta.log_prefix);
            return Err(Error::Recognition(format!(
                "openai transcription failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let text = parse_transcription(&body)?;
        info!(chars = text.chars().count(), "{} recognition finished", meta.log_prefix);
        Ok(text)
    }
}
