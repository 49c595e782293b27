//! AI 客户端抽象与实现
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 AiClient：把玩家消息或指令批次结果交给
//! 模型，换回一个 AiTurn（可选文本 + 待执行指令 + 是否重开会话）。

mod mock;
mod openai;
mod traits;

use serde::Deserialize;

pub use mock::ScriptedAiClient;
pub use openai::OpenAiClient;
pub use traits::{AiClient, LlmError};

/// 会话消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 会话消息
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// AI 一轮回应：文本、待执行指令（提交顺序）、是否重开会话
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiTurn {
    pub text: Option<String>,
    pub commands: Vec<String>,
    pub new_session: bool,
}

impl AiTurn {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            commands: Vec::new(),
            new_session: false,
        }
    }
}

/// 模型按约定输出的 JSON 指令块
#[derive(Debug, Clone, Default, Deserialize)]
struct TurnDirective {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default)]
    new_session: bool,
}

/// 解析模型输出：提取 ```json 块或首尾大括号间的 JSON
///
/// 无 JSON、或 JSON 不含任何指令字段时，整段输出按纯文本回复处理——聊天场景
/// 下把格式错误抛给玩家没有意义。
pub fn parse_ai_output(output: &str) -> AiTurn {
    let trimmed = output.trim();

    let (json_str, prose) = if let Some(start) = trimmed.find("```json") {
        let before = trimmed[..start].trim();
        let rest = &trimmed[start + 7..];
        let inner = rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
        (Some(inner), before)
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            (Some(&trimmed[start..=end]), trimmed[..start].trim())
        } else {
            (None, trimmed)
        }
    } else {
        (None, trimmed)
    };

    let Some(json_str) = json_str else {
        return AiTurn::text_only(trimmed);
    };

    match serde_json::from_str::<TurnDirective>(json_str) {
        Ok(directive)
            if !directive.commands.is_empty()
                || directive.new_session
                || directive.text.is_some() =>
        {
            let text = directive.text.or_else(|| {
                if prose.is_empty() {
                    None
                } else {
                    Some(prose.to_string())
                }
            });
            AiTurn {
                text,
                commands: directive.commands,
                new_session: directive.new_session,
            }
        }
        _ => AiTurn::text_only(trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_becomes_text_only_turn() {
        let turn = parse_ai_output("你好，有什么可以帮你？");
        assert_eq!(turn, AiTurn::text_only("你好，有什么可以帮你？"));
    }

    #[test]
    fn json_block_with_commands_is_parsed() {
        let output = r#"帮你把时间调到白天。
```json
{"commands": ["time set day", "weather clear"]}
```"#;
        let turn = parse_ai_output(output);
        assert_eq!(
            turn.commands,
            vec!["time set day".to_string(), "weather clear".to_string()]
        );
        assert_eq!(turn.text.as_deref(), Some("帮你把时间调到白天。"));
        assert!(!turn.new_session);
    }

    #[test]
    fn bare_json_with_text_field() {
        let turn = parse_ai_output(r#"{"text": "已完成", "commands": [], "new_session": true}"#);
        assert_eq!(turn.text.as_deref(), Some("已完成"));
        assert!(turn.new_session);
        assert!(turn.commands.is_empty());
    }

    #[test]
    fn invalid_json_falls_back_to_plain_text() {
        let output = "坐标是 {x: 10, z: -3} 附近";
        let turn = parse_ai_output(output);
        assert_eq!(turn, AiTurn::text_only(output));
    }

    #[test]
    fn empty_directive_is_plain_text() {
        let output = "{}";
        let turn = parse_ai_output(output);
        assert_eq!(turn, AiTurn::text_only("{}"));
    }

    #[test]
    fn closing_brace_before_opening_is_plain_text() {
        let output = "} 之后才有 {";
        assert_eq!(parse_ai_output(output), AiTurn::text_only(output));
    }
}
