//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。会话历史保存
//! 在客户端内部；模型被系统提示词约定用 JSON 块表达要执行的指令与重开会话。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::llm::{parse_ai_output, AiClient, AiTurn, LlmError, Message, Role};

/// OpenAI 兼容客户端：持有 Client、模型参数与会话历史
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    system_prompt: String,
    history: Mutex<Vec<Message>>,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        temperature: f32,
        max_output_tokens: u32,
        system_prompt: &str,
    ) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature,
            max_output_tokens,
            system_prompt: system_prompt.to_string(),
            history: Mutex::new(vec![Message::system(system_prompt)]),
        }
    }

    fn to_openai_messages(&self, messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .unwrap(),
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .unwrap(),
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .unwrap(),
                ),
            })
            .collect()
    }

    /// 追加一条消息、请求补全、把原始回复写回历史并解析为 AiTurn
    async fn send_and_parse(&self, message: Message) -> Result<AiTurn, LlmError> {
        let messages = {
            let mut history = self.history.lock().await;
            history.push(message);
            self.to_openai_messages(&history)
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .max_completion_tokens(self.max_output_tokens)
            .messages(messages)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or(LlmError::EmptyResponse)?;

        tracing::debug!(raw = %content, "model output");
        {
            let mut history = self.history.lock().await;
            history.push(Message::assistant(content.clone()));
        }

        // 会话重置由调用方通过 start_new_chat 触发，这里只负责解析
        Ok(parse_ai_output(&content))
    }
}

#[async_trait]
impl AiClient for OpenAiClient {
    async fn process_user_message(&self, message: &str) -> Result<AiTurn, LlmError> {
        self.send_and_parse(Message::user(message)).await
    }

    async fn process_command_results(&self, results: &[String]) -> Result<AiTurn, LlmError> {
        // 与 run_command 的回传约定对齐：按到达顺序给出结果数组
        let content = serde_json::json!({ "command_results": results }).to_string();
        self.send_and_parse(Message::user(content)).await
    }

    async fn start_new_chat(&self) {
        tracing::info!("starting a new chat session");
        let mut history = self.history.lock().await;
        history.clear();
        history.push(Message::system(&self.system_prompt));
    }
}
