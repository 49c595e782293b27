//! 线协议信封
//!
//! 出站 commandRequest / subscribe，入站 commandResponse / PlayerMessage。
//! 编码尺寸必须在发送前可计算，Dispatcher 依赖它做超长拒发。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bedrock `/wsserver` 单帧可靠传输的最大字节数
pub const WSS_MAXIMUM_BYTES: usize = 661;

/// 基岩版线协议版本号
pub const PROTOCOL_VERSION: u32 = 17_104_896;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestHeader {
    request_id: String,
    message_purpose: String,
    version: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommandRequestBody {
    command_line: String,
    version: u32,
}

#[derive(Debug, Clone, Serialize)]
struct CommandRequest {
    header: RequestHeader,
    body: CommandRequestBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeBody {
    event_name: String,
}

#[derive(Debug, Clone, Serialize)]
struct SubscribeRequest {
    header: RequestHeader,
    body: SubscribeBody,
}

/// 将指令与 correlation id 包进 commandRequest 信封
pub fn encode_command(request_id: &Uuid, command: &str) -> String {
    let payload = CommandRequest {
        header: RequestHeader {
            request_id: request_id.to_string(),
            message_purpose: "commandRequest".to_string(),
            version: PROTOCOL_VERSION,
        },
        body: CommandRequestBody {
            command_line: command.to_string(),
            version: PROTOCOL_VERSION,
        },
    };
    serde_json::to_string(&payload).expect("command envelope serializes")
}

/// 编码后的字节数（不触发发送）
pub fn encoded_size(request_id: &Uuid, command: &str) -> usize {
    encode_command(request_id, command).len()
}

/// 事件订阅信封（连接建立后订阅 PlayerMessage）
pub fn subscribe_payload(event_name: &str) -> String {
    let payload = SubscribeRequest {
        header: RequestHeader {
            request_id: Uuid::new_v4().to_string(),
            message_purpose: "subscribe".to_string(),
            version: PROTOCOL_VERSION,
        },
        body: SubscribeBody {
            event_name: event_name.to_string(),
        },
    };
    serde_json::to_string(&payload).expect("subscribe envelope serializes")
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawHeader {
    request_id: Option<String>,
    message_purpose: Option<String>,
    event_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawBody {
    #[serde(rename = "statusMessage")]
    status_message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    sender: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFrame {
    #[serde(default)]
    header: RawHeader,
    #[serde(default)]
    body: RawBody,
}

/// 已分类的入站帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientBound {
    /// 指令执行结果，correlation id 在 header.requestId
    CommandResponse {
        request_id: String,
        status_message: String,
    },
    /// 玩家聊天事件
    PlayerChat { sender: String, message: String },
    /// 其他事件 / 不关心的帧
    Other,
}

/// 解析入站帧；无法解析的 JSON 返回 Err，由调用方记录后丢弃
pub fn parse_client_frame(raw: &str) -> Result<ClientBound, serde_json::Error> {
    let frame: RawFrame = serde_json::from_str(raw)?;

    if frame.header.message_purpose.as_deref() == Some("commandResponse") {
        if let Some(request_id) = frame.header.request_id {
            return Ok(ClientBound::CommandResponse {
                request_id,
                // 部分指令没有 statusMessage，按成功处理
                status_message: frame
                    .body
                    .status_message
                    .unwrap_or_else(|| "success".to_string()),
            });
        }
        return Ok(ClientBound::Other);
    }

    if frame.header.event_name.as_deref() == Some("PlayerMessage")
        && frame.body.kind.as_deref() == Some("chat")
    {
        if let (Some(sender), Some(message)) = (frame.body.sender, frame.body.message) {
            return Ok(ClientBound::PlayerChat { sender, message });
        }
    }

    Ok(ClientBound::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_envelope_round_trips_fields() {
        let id = Uuid::new_v4();
        let encoded = encode_command(&id, "say hello");
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["header"]["requestId"], id.to_string());
        assert_eq!(value["header"]["messagePurpose"], "commandRequest");
        assert_eq!(value["header"]["version"], PROTOCOL_VERSION);
        assert_eq!(value["body"]["commandLine"], "say hello");
    }

    #[test]
    fn encoded_size_matches_encoded_payload() {
        let id = Uuid::new_v4();
        for cmd in ["say hi", "tellraw @a {\"rawtext\":[]}", "帮助"] {
            assert_eq!(encoded_size(&id, cmd), encode_command(&id, cmd).len());
        }
    }

    #[test]
    fn parses_command_response() {
        let raw = r#"{"header":{"requestId":"abc","messagePurpose":"commandResponse"},"body":{"statusMessage":"done"}}"#;
        assert_eq!(
            parse_client_frame(raw).unwrap(),
            ClientBound::CommandResponse {
                request_id: "abc".to_string(),
                status_message: "done".to_string(),
            }
        );
    }

    #[test]
    fn missing_status_message_defaults_to_success() {
        let raw = r#"{"header":{"requestId":"abc","messagePurpose":"commandResponse"},"body":{}}"#;
        match parse_client_frame(raw).unwrap() {
            ClientBound::CommandResponse { status_message, .. } => {
                assert_eq!(status_message, "success")
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn parses_player_chat() {
        let raw = r#"{"header":{"eventName":"PlayerMessage"},"body":{"type":"chat","sender":"Steve","message":"-ai? hi"}}"#;
        assert_eq!(
            parse_client_frame(raw).unwrap(),
            ClientBound::PlayerChat {
                sender: "Steve".to_string(),
                message: "-ai? hi".to_string(),
            }
        );
    }

    #[test]
    fn non_chat_player_message_is_other() {
        let raw = r#"{"header":{"eventName":"PlayerMessage"},"body":{"type":"tell","sender":"Steve","message":"x"}}"#;
        assert_eq!(parse_client_frame(raw).unwrap(), ClientBound::Other);
    }

    #[test]
    fn malformed_frame_is_an_error() {
        assert!(parse_client_frame("not json").is_err());
    }
}
