//! 像素画建造（-art?）
//!
//! 画作是一行一条指令的 .txt（Java 版语法），逐行做 Java -> 基岩版的方块与
//! 方块状态转换后下发；建造期间用 tickingarea 固定加载范围，分片限速。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::gateway::CommandDispatcher;

/// 每发这么多条指令停 50ms
const COMMANDS_PER_SLICE: usize = 15;

/// Java 版方块 id -> 基岩版
const BLOCK_MAP: &[(&str, &str)] = &[
    ("snow_block", "snow"),
    ("nether_quartz_ore", "quartz_ore"),
    ("end_stone_bricks", "end_bricks"),
    ("nether_bricks", "nether_brick"),
    ("red_nether_bricks", "red_nether_brick"),
    ("note_block", "noteblock"),
    ("light_gray_glazed_terracotta", "silver_glazed_terracotta"),
    ("bricks", "brick_block"),
    ("clay", "hardened_clay"),
];

/// Java 版方块状态 -> 基岩版
const STATE_MAP: &[(&str, &str)] = &[
    ("[axis=z]", " [\"pillar_axis\"=\"z\"]"),
    ("[axis=x]", " [\"pillar_axis\"=\"x\"]"),
    ("[axis=y]", " [\"pillar_axis\"=\"y\"]"),
];

/// 单条指令的 Java -> 基岩版转换
pub fn convert_java_to_bedrock(command: &str) -> String {
    let mut converted = command.to_string();
    for (java, bedrock) in STATE_MAP {
        converted = converted.replace(java, bedrock);
    }
    for (java, bedrock) in BLOCK_MAP {
        converted = replace_word(&converted, java, bedrock);
    }
    converted
}

/// 整词替换：两侧都不是 [A-Za-z0-9_] 才算命中
fn replace_word(text: &str, word: &str, replacement: &str) -> String {
    let is_word_char = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut offset = 0;

    while let Some(pos) = rest.find(word) {
        let before = text[..offset + pos].chars().next_back();
        let after = rest[pos + word.len()..].chars().next();
        out.push_str(&rest[..pos]);
        if is_word_char(before) || is_word_char(after) {
            out.push_str(word);
        } else {
            out.push_str(replacement);
        }
        offset += pos + word.len();
        rest = &rest[pos + word.len()..];
    }
    out.push_str(rest);
    out
}

/// 像素画建造器
pub struct ArtBuilder {
    dispatcher: Arc<CommandDispatcher>,
    art_dir: PathBuf,
}

impl ArtBuilder {
    pub fn new(dispatcher: Arc<CommandDispatcher>, art_dir: PathBuf) -> Self {
        Self {
            dispatcher,
            art_dir,
        }
    }

    fn art_path(&self, name: &str) -> PathBuf {
        self.art_dir.join(format!("{}.txt", name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.art_path(name).exists()
    }

    /// 目录下全部画作名（去掉 .txt），目录不存在时为空
    pub fn list(&self) -> Vec<String> {
        list_txt_stems(&self.art_dir)
    }

    /// 读取并执行一幅画作的全部指令
    pub async fn build(&self, name: &str) {
        let path = self.art_path(name);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(?path, %err, "art command file unreadable");
                self.dispatcher
                    .send_chat(&format!("§c[繪圖系統] 找不到名為 \"{}\" 的指令檔", name))
                    .await;
                return;
            }
        };

        self.dispatcher
            .send_chat(&format!(
                "§e[繪圖系統] 正在讀取 \"{}\" 並準備執行... 請發送指令者不要移動",
                name
            ))
            .await;

        for area in [
            "tickingarea add ~0 ~0 ~0 ~-1500 ~379 ~0 painting_area1",
            "tickingarea add ~0 ~0 ~0 ~1500 ~379 ~0 painting_area2",
            "tickingarea add ~0 ~0 ~0 ~0 ~379 ~-1500 painting_area3",
            "tickingarea add ~0 ~0 ~0 ~0 ~379 ~1500 painting_area4",
        ] {
            self.dispatcher.run_command(area).await;
        }

        let mut count = 0usize;
        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.dispatcher
                .run_command(&convert_java_to_bedrock(line))
                .await;
            count += 1;
            if count % COMMANDS_PER_SLICE == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        }

        self.dispatcher
            .send_chat(&format!("§b[繪圖系統] \"{}\" 繪製完成！", name))
            .await;
        for i in 1..=4 {
            self.dispatcher
                .run_command(&format!("tickingarea remove painting_area{}", i))
                .await;
        }
        tracing::info!(name, count, "art build complete");
    }
}

/// 目录里的 .txt 文件名（无扩展名）
fn list_txt_stems(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|e| {
            let path = e.path();
            (path.extension().is_some_and(|ext| ext == "txt"))
                .then(|| path.file_stem()?.to_str().map(String::from))
                .flatten()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_ids_are_translated() {
        assert_eq!(
            convert_java_to_bedrock("setblock ~ ~ ~ note_block"),
            "setblock ~ ~ ~ noteblock"
        );
        assert_eq!(
            convert_java_to_bedrock("fill ~ ~ ~ ~1 ~1 ~1 bricks"),
            "fill ~ ~ ~ ~1 ~1 ~1 brick_block"
        );
    }

    #[test]
    fn axis_states_are_translated() {
        assert_eq!(
            convert_java_to_bedrock("setblock ~ ~ ~ oak_log[axis=x]"),
            "setblock ~ ~ ~ oak_log [\"pillar_axis\"=\"x\"]"
        );
    }

    #[test]
    fn whole_word_match_only() {
        // snow_block 要转换，但 brown_mushroom_block 里的子串不能乱动
        let cmd = convert_java_to_bedrock("setblock ~ ~ ~ brown_mushroom_block");
        assert_eq!(cmd, "setblock ~ ~ ~ brown_mushroom_block");
        // clay 是整词才转换
        assert_eq!(
            convert_java_to_bedrock("setblock ~ ~ ~ clay_pot"),
            "setblock ~ ~ ~ clay_pot"
        );
    }

    #[test]
    fn unrelated_commands_pass_through() {
        let cmd = "fill ~ ~ ~ ~3 ~3 ~3 white_concrete";
        assert_eq!(convert_java_to_bedrock(cmd), cmd);
    }

    #[test]
    fn list_ignores_non_txt_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("castle.txt"), "say hi").unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();
        let stems = list_txt_stems(dir.path());
        assert_eq!(stems, vec!["castle".to_string()]);
    }
}
