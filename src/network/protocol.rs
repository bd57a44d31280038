//! JSON messages of the bidirectional live streaming endpoint

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::network::{AudioBlob, InboundItem, LiveSetup};

/// First message on a new connection
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<EmptyConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Default, Serialize)]
pub struct EmptyConfig {}

impl SetupMessage {
    pub fn from_setup(setup: &LiveSetup) -> Self {
        let model = if setup.model.starts_with("models/") {
            setup.model.clone()
        } else {
            format!("models/{}", setup.model)
        };

        Self {
            setup: Setup {
                model,
                generation_config: GenerationConfig {
                    response_modalities: vec![setup.response_modality.clone()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: setup.voice_name.clone(),
                            },
                        },
                    },
                },
                system_instruction: Content {
                    parts: vec![TextPart {
                        text: setup.system_instruction.clone(),
                    }],
                },
                input_audio_transcription: setup.transcribe_input.then(EmptyConfig::default),
            },
        }
    }
}

/// Streaming microphone input
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
pub struct RealtimeInput {
    pub audio: EncodedBlob,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedBlob {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

impl RealtimeInputMessage {
    pub fn from_blob(blob: &AudioBlob) -> Self {
        Self {
            realtime_input: RealtimeInput {
                audio: EncodedBlob {
                    mime_type: blob.mime_type.clone(),
                    data: STANDARD.encode(&blob.data),
                },
            },
        }
    }
}

/// Any message sent by the server
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ModelPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPart {
    #[serde(default)]
    pub inline_data: Option<EncodedBlob>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    pub fn parse(raw: &[u8]) -> Result<Self, RemoteError> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Flatten the message into inbound items
    ///
    /// Audio parts come first and `TurnComplete` last, so a turn never
    /// completes ahead of the audio carried by the same message.
    pub fn into_items(self) -> Result<Vec<InboundItem>, RemoteError> {
        let mut items = Vec::new();
        let Some(content) = self.server_content else {
            return Ok(items);
        };

        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                let Some(blob) = part.inline_data else {
                    continue;
                };
                if !blob.mime_type.is_empty() && !blob.mime_type.starts_with("audio/") {
                    continue;
                }
                let data = STANDARD
                    .decode(blob.data.as_bytes())
                    .map_err(|e| RemoteError::InvalidMessage(format!("audio payload: {}", e)))?;
                items.push(InboundItem::Audio(Bytes::from(data)));
            }
        }

        if let Some(text) = content.input_transcription.and_then(|t| t.text) {
            if !text.is_empty() {
                items.push(InboundItem::InputTranscript(text));
            }
        }

        if content.interrupted {
            items.push(InboundItem::Interrupted);
        }

        if content.turn_complete {
            items.push(InboundItem::TurnComplete);
        }

        Ok(items)
    }
}
