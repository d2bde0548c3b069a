use aws_config::{BehaviorVersion, Region};
use aws_sdk_bedrockruntime::types::error::ConverseStreamOutputError;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, ConverseStreamOutput, InferenceConfiguration, Message,
    SystemContentBlock,
};
use aws_sdk_bedrockruntime::Client;

use anyhow::Result;
use tracing::{debug, info};

use super::common::AiBackend;
use crate::constants::{DEFAULT_BEDROCK_MODEL_ID, SYSTEM_PROMPT};
use crate::settings::AwsSettings;

/// Sends the few-shot prompt to a Bedrock-hosted model.
///
/// Chat models answer with the continuation only, so the prompt is echoed in
/// front of the reply to match what the local pipeline returns.
pub struct BedrockAiBackend {
    client: Client,
    model_id: String,
    runtime: tokio::runtime::Runtime,
}

impl BedrockAiBackend {
    pub fn new(settings: &AwsSettings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let region = settings.region.clone();
        info!("Using region: {}", region);

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region));
        if let Some(profile) = &settings.profile {
            info!("Using profile: {}", profile);
            loader = loader.profile_name(profile);
        }
        let sdk_config = runtime.block_on(loader.load());
        let client = Client::new(&sdk_config);
        info!("Client created");

        Ok(Self {
            client,
            model_id: settings
                .model_id
                .clone()
                .unwrap_or_else(|| DEFAULT_BEDROCK_MODEL_ID.to_string()),
            runtime,
        })
    }

    fn get_converse_output_text(
        output: ConverseStreamOutput,
    ) -> Result<String, Box<ConverseStreamOutputError>> {
        Ok(match output {
            ConverseStreamOutput::ContentBlockDelta(event) => match event.delta() {
                Some(delta) => {
                    debug!("{:?}", delta);
                    delta.as_text().cloned().unwrap_or_else(|_| "".into())
                }
                None => "".into(),
            },
            // rest log and return empty string
            ConverseStreamOutput::MessageStart(e) => {
                debug!("MessageStart: {:?}", e);
                "".into()
            }
            ConverseStreamOutput::MessageStop(e) => {
                debug!("MessageStop: {:?}", e);
                "".into()
            }
            ConverseStreamOutput::Metadata(e) => {
                debug!("Metadata: {:?}", e);
                "".into()
            }
            _ => {
                debug!("Received non-content block delta");
                "".into()
            }
        })
    }

    async fn converse(&self, prompt: &str, max_new_tokens: usize) -> Result<String> {
        let inference_config = InferenceConfiguration::builder()
            .max_tokens(i32::try_from(max_new_tokens).unwrap_or(i32::MAX))
            .build();
        let response = self
            .client
            .converse_stream()
            .model_id(&self.model_id)
            .messages(
                Message::builder()
                    .role(ConversationRole::User)
                    .content(ContentBlock::Text(prompt.to_string()))
                    .build()
                    .map_err(|_| anyhow::anyhow!("failed to build message"))?,
            )
            .set_system(Some(vec![SystemContentBlock::Text(
                SYSTEM_PROMPT.to_string(),
            )]))
            .inference_config(inference_config)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send message: {:?}", e))?;
        info!("Response received");
        let mut stream = response.stream;

        let mut response_text = String::new();
        loop {
            match stream.recv().await {
                Ok(Some(output)) => {
                    let text = BedrockAiBackend::get_converse_output_text(output).map_err(|e| {
                        anyhow::anyhow!(e
                            .meta()
                            .message()
                            .unwrap_or("Unable to see stream error message")
                            .to_string())
                    })?;
                    response_text.push_str(&text);
                }
                // means the stream is complete
                Ok(None) => break,
                Err(e) => {
                    if let Some(error) = e.as_service_error() {
                        return Err(anyhow::anyhow!(error
                            .meta()
                            .message()
                            .unwrap_or("Unable to open stream error message")
                            .to_string()));
                    }
                    anyhow::bail!("Unable to see stream error message");
                }
            }
        }
        Ok(response_text)
    }
}

impl AiBackend for BedrockAiBackend {
    fn invoke(&mut self, prompt: &str, max_new_tokens: usize) -> Result<Vec<u8>> {
        debug!("Sending prompt to {}", self.model_id);
        let reply = self.runtime.block_on(self.converse(prompt, max_new_tokens))?;
        Ok(echo_prompt(prompt, &reply).into_bytes())
    }
}

fn echo_prompt(prompt: &str, reply: &str) -> String {
    format!("{prompt} {}", reply.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::example_bank::ExampleBank;
    use crate::generator::{extract_command, Extraction};
    use crate::prompt::build_prompt;

    #[test]
    fn echoed_reply_extracts_like_a_local_completion() {
        let prompt = build_prompt(&ExampleBank::default(), "show uptime");
        let full = echo_prompt(&prompt, "\nuptime\n");
        assert_eq!(
            extract_command(full.as_bytes()),
            Extraction::Command("uptime".to_string())
        );
    }
}
