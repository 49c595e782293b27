//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `GOLEM__*` 覆盖（双下划线表示嵌套，
//! 如 `GOLEM__AI__API_KEY=sk-...`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub ai: AiSection,
    #[serde(default)]
    pub features: FeaturesSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            ai: AiSection::default(),
            features: FeaturesSection::default(),
        }
    }
}

/// [server] 段：端口、冷却、管理员名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    /// 每位玩家触发功能的冷却秒数，0 表示关闭
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// 允许使用 AI 的玩家名正则，空表示不过滤
    pub player_regex: Option<String>,
    /// 管理员名单文件（一行一个玩家名，定期重读）
    #[serde(default = "default_admin_file")]
    pub admin_file: PathBuf,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            cooldown_secs: default_cooldown_secs(),
            player_regex: None,
            admin_file: default_admin_file(),
        }
    }
}

fn default_port() -> u16 {
    5218
}

fn default_cooldown_secs() -> u64 {
    5
}

fn default_admin_file() -> PathBuf {
    PathBuf::from("admin.txt")
}

/// [ai] 段：唤醒词、模型与回合参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiSection {
    #[serde(default = "default_wake_word")]
    pub wake_word: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// 指令批次超时（秒）
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
    /// 单回合内 AI 连续请求指令的轮数上限
    #[serde(default = "default_max_turn_depth")]
    pub max_turn_depth: usize,
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            wake_word: default_wake_word(),
            model: default_model(),
            base_url: None,
            api_key: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            prompt: default_prompt(),
            batch_timeout_secs: default_batch_timeout_secs(),
            max_turn_depth: default_max_turn_depth(),
        }
    }
}

fn default_wake_word() -> String {
    "-ai?".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_max_output_tokens() -> u32 {
    512
}

fn default_batch_timeout_secs() -> u64 {
    60
}

fn default_max_turn_depth() -> usize {
    8
}

fn default_prompt() -> String {
    r#"你是一個Minecraft bedrock助理，請盡你所能幫助玩家。
你收到的訊息格式為: <玩家遊戲ID> 玩家訊息
需要執行遊戲指令時，回覆一個JSON區塊：{"text": "給玩家看的話", "commands": ["指令1", "指令2"], "new_session": false}
避免使用@s、指令開頭不用輸入斜線、使用最新的基岩版指令。
指令執行後你會收到 {"command_results": [...]} 格式的結果；若指令有誤可以先用 help [指令] 查看用法再修正。
玩家明確要求重新開始對話時，回覆 {"new_session": true}。"#
        .to_string()
}

/// [features] 段：外部查询 API 与资源路径
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeaturesSection {
    pub openweather_api_key: Option<String>,
    pub geocoding_api_key: Option<String>,
    pub wolfram_api_key: Option<String>,
    /// 像素画指令档目录（<名称>.txt）
    #[serde(default = "default_art_dir")]
    pub art_dir: PathBuf,
    /// 数学题库 JSON
    #[serde(default = "default_math_db")]
    pub math_db: PathBuf,
    /// 玩家做题统计 JSON
    #[serde(default = "default_stats_file")]
    pub stats_file: PathBuf,
}

impl Default for FeaturesSection {
    fn default() -> Self {
        Self {
            openweather_api_key: None,
            geocoding_api_key: None,
            wolfram_api_key: None,
            art_dir: default_art_dir(),
            math_db: default_math_db(),
            stats_file: default_stats_file(),
        }
    }
}

fn default_art_dir() -> PathBuf {
    PathBuf::from("commands")
}

fn default_math_db() -> PathBuf {
    PathBuf::from("math_db.json")
}

fn default_stats_file() -> PathBuf {
    PathBuf::from("players_stats.json")
}

/// 从 config 目录加载配置，环境变量 GOLEM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 GOLEM__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("GOLEM")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_cover_every_section() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 5218);
        assert_eq!(cfg.ai.wake_word, "-ai?");
        assert_eq!(cfg.ai.batch_timeout_secs, 60);
        assert_eq!(cfg.ai.max_output_tokens, 512);
        assert_eq!(cfg.ai.max_turn_depth, 8);
        assert_eq!(cfg.server.cooldown_secs, 5);
    }

    #[test]
    fn toml_overrides_defaults() {
        let toml = r#"
            [server]
            port = 19132
            cooldown_secs = 0

            [ai]
            wake_word = "-golem?"
            model = "gpt-4o"
        "#;
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.server.port, 19132);
        assert_eq!(cfg.server.cooldown_secs, 0);
        assert_eq!(cfg.ai.wake_word, "-golem?");
        assert_eq!(cfg.ai.model, "gpt-4o");
        // 未覆盖的键保持默认
        assert_eq!(cfg.ai.max_turn_depth, 8);
    }
}
