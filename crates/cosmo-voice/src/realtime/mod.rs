//! Realtime link to the speech model.
//!
//! The wire protocol is JSON over a WebSocket: one `setup` message, then a
//! stream of `realtimeInput` media chunks upstream and `serverContent`
//! messages downstream. [`RealtimeTransport`] is the seam the session talks
//! to; [`GeminiLiveTransport`](gemini::GeminiLiveTransport) is the
//! production implementation.

pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::codec::MediaBlob;
use crate::error::VoiceError;

// ── Configuration ──────────────────────────────────────────────────

/// Output modality requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Audio,
    Text,
}

/// Parameters of one live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConfig {
    /// Model name without the `models/` prefix.
    pub model: String,

    /// Persona prompt.
    pub system_instruction: String,

    /// Prebuilt voice name; the server default when `None`.
    pub voice: Option<String>,

    pub response_modalities: Vec<Modality>,

    /// Ask the server to transcribe the microphone stream.
    pub input_transcription: bool,

    /// Ask the server to transcribe its own speech.
    pub output_transcription: bool,
}

// ── Client messages ────────────────────────────────────────────────

/// Message sent from the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<Empty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<Empty>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// Serializes as `{}`; presence alone enables a feature.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Empty {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaBlob>,
}

impl ClientMessage {
    /// Build the opening `setup` message.
    pub fn setup(config: &LiveConfig) -> Self {
        let enabled = |on: bool| on.then_some(Empty {});
        Self::Setup(Setup {
            model: format!("models/{}", config.model),
            generation_config: GenerationConfig {
                response_modalities: config.response_modalities.clone(),
                speech_config: config.voice.as_ref().map(|name| SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: name.clone(),
                        },
                    },
                }),
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: config.system_instruction.clone(),
                }],
            },
            input_audio_transcription: enabled(config.input_transcription),
            output_audio_transcription: enabled(config.output_transcription),
        })
    }

    /// Wrap one captured blob.
    pub fn media(blob: MediaBlob) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![blob],
        })
    }

    pub fn to_json(&self) -> Result<String, VoiceError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Server messages ────────────────────────────────────────────────

/// Message received from the server. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    pub input_transcription: Option<Transcription>,
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub inline_data: Option<InlineData>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    pub time_left: Option<String>,
}

impl ServerContent {
    /// Audio payload of the first part, if it carries one.
    pub fn first_inline_audio(&self) -> Option<&InlineData> {
        self.model_turn
            .as_ref()?
            .parts
            .first()?
            .inline_data
            .as_ref()
    }
}

/// Translate one raw server frame into an event.
///
/// Returns `Ok(None)` for messages the session does not act on.
pub fn parse_server_message(raw: &str) -> Result<Option<ServerEvent>, VoiceError> {
    let message: ServerMessage = serde_json::from_str(raw)?;

    if message.setup_complete.is_some() {
        return Ok(Some(ServerEvent::Open));
    }
    if let Some(content) = message.server_content {
        return Ok(Some(ServerEvent::Content(content)));
    }
    if let Some(go_away) = message.go_away {
        return Ok(Some(ServerEvent::GoAway {
            time_left: go_away.time_left,
        }));
    }
    Ok(None)
}

// ── Link ───────────────────────────────────────────────────────────

/// Event delivered by an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Setup acknowledged; media may flow.
    Open,
    Content(ServerContent),
    /// The server will close the session soon.
    GoAway { time_left: Option<String> },
    /// Transport or remote failure.
    Error(String),
    /// The link closed.
    Closed { code: Option<u16>, reason: String },
}

/// Request sent to an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Media(MediaBlob),
    /// Close the session gracefully.
    Close,
}

/// An established link: requests go out, events come back.
///
/// Dropping the link closes it.
#[derive(Debug)]
pub struct RealtimeLink {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Opens realtime links.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Connect and send the setup for `config`.
    ///
    /// Resolves once the socket is up; [`ServerEvent::Open`] follows when
    /// the server acknowledges the setup.
    async fn connect(&self, config: &LiveConfig) -> Result<RealtimeLink, VoiceError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::codec::create_blob;

    fn config() -> LiveConfig {
        LiveConfig {
            model: "gemini-test".into(),
            system_instruction: "Be brief.".into(),
            voice: None,
            response_modalities: vec![Modality::Audio],
            input_transcription: true,
            output_transcription: true,
        }
    }

    #[test]
    fn setup_serializes_to_wire_shape() {
        let value: serde_json::Value =
            serde_json::from_str(&ClientMessage::setup(&config()).to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": "models/gemini-test",
                    "generationConfig": { "responseModalities": ["AUDIO"] },
                    "systemInstruction": { "parts": [{ "text": "Be brief." }] },
                    "inputAudioTranscription": {},
                    "outputAudioTranscription": {}
                }
            })
        );
    }

    #[test]
    fn voice_and_disabled_transcription() {
        let mut config = config();
        config.voice = Some("Orus".into());
        config.input_transcription = false;

        let value = serde_json::to_value(ClientMessage::setup(&config)).unwrap();
        let setup = &value["setup"];
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Orus"
        );
        assert!(setup.get("inputAudioTranscription").is_none());
        assert!(setup.get("outputAudioTranscription").is_some());
    }

    #[test]
    fn media_chunk_carries_mime_and_data() {
        let blob = create_blob(&[0.0]);
        let value = serde_json::to_value(ClientMessage::media(blob)).unwrap();
        assert_eq!(
            value,
            json!({
                "realtimeInput": {
                    "mediaChunks": [{ "data": "AAA=", "mimeType": "audio/pcm;rate=16000" }]
                }
            })
        );
    }

    #[test]
    fn setup_complete_opens() {
        let event = parse_server_message(r#"{"setupComplete":{}}"#).unwrap();
        assert_eq!(event, Some(ServerEvent::Open));
    }

    #[test]
    fn server_content_is_parsed() {
        let raw = json!({
            "serverContent": {
                "modelTurn": { "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAA=" } }
                ]},
                "outputTranscription": { "text": "Hello" },
                "inputTranscription": { "text": "Hi" },
                "interrupted": true
            }
        })
        .to_string();

        let Some(ServerEvent::Content(content)) = parse_server_message(&raw).unwrap() else {
            panic!("expected content");
        };
        assert_eq!(content.first_inline_audio().unwrap().mime_type, "audio/pcm;rate=24000");
        assert_eq!(content.output_transcription.unwrap().text, "Hello");
        assert_eq!(content.input_transcription.unwrap().text, "Hi");
        assert!(content.interrupted);
        assert!(!content.turn_complete);
    }

    #[test]
    fn only_the_first_part_supplies_audio() {
        let raw = json!({
            "serverContent": { "modelTurn": { "parts": [
                { "text": "thinking" },
                { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAA=" } }
            ]}}
        })
        .to_string();

        let Some(ServerEvent::Content(content)) = parse_server_message(&raw).unwrap() else {
            panic!("expected content");
        };
        assert!(content.first_inline_audio().is_none());
    }

    #[test]
    fn go_away_and_unknown_messages() {
        assert_eq!(
            parse_server_message(r#"{"goAway":{"timeLeft":"10s"}}"#).unwrap(),
            Some(ServerEvent::GoAway {
                time_left: Some("10s".into())
            })
        );
        assert_eq!(parse_server_message(r#"{"usageMetadata":{}}"#).unwrap(), None);
        assert!(parse_server_message("not json").is_err());
    }
}
