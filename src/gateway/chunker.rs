//! 消息分块
//!
//! 聊天文本最终会被包进 `tellraw ... {"rawtext":[{"text":<json>}]}`，再整体塞进
//! commandRequest 信封，所以估算时对文本做两层 JSON 转义，外加固定信封开销与
//! 反引号的额外惩罚。对 ASCII 安全编码而言更长的前缀编码后不会更短，因此
//! 逐字符线性扫描即可找到最长可行前缀。

use crate::gateway::GatewayError;

/// 信封 + tellraw 包装的固定字节开销
///
/// 实测：UUID requestId 的 commandRequest 信封加 `tellraw @a {"rawtext":...}`
/// 包装共 197 字节，取 200 留余量。估算值必须 ≥ 实际编码尺寸，否则
/// 满预算的分块会在下发时被尺寸校验拒绝。
pub const PAYLOAD_FIXED_OVERHEAD: usize = 200;

/// 每个字面反引号在客户端侧的额外转义开销
const BACKTICK_PENALTY: usize = 5;

/// 估算一段文本作为 tellraw 聊天发送时的最终酬载字节数
pub fn estimate_payload_bytes(message: &str) -> usize {
    let backtick_overhead = message.matches('`').count() * BACKTICK_PENALTY;
    let once = serde_json::to_string(message).expect("string serializes");
    let twice = serde_json::to_string(&once).expect("string serializes");
    PAYLOAD_FIXED_OVERHEAD + backtick_overhead + twice.len()
}

/// 将文本切成若干片段，每段编码后都不超过 `byte_budget`
///
/// 片段按序拼接可精确还原原文；每段都是当前位置的最长可行前缀。
/// 预算小到连单个字符都放不下时返回 `BudgetTooSmall`，绝不空转。
pub fn chunk(text: &str, byte_budget: usize) -> Result<Vec<String>, GatewayError> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if estimate_payload_bytes(remaining) <= byte_budget {
            chunks.push(remaining.to_string());
            break;
        }

        // 沿字符边界扫描最长可行前缀
        let mut best_end = 0;
        for (idx, ch) in remaining.char_indices() {
            let end = idx + ch.len_utf8();
            if estimate_payload_bytes(&remaining[..end]) > byte_budget {
                break;
            }
            best_end = end;
        }

        if best_end == 0 {
            return Err(GatewayError::BudgetTooSmall {
                budget: byte_budget,
            });
        }

        chunks.push(remaining[..best_end].to_string());
        remaining = &remaining[best_end..];
    }

    Ok(chunks)
}
