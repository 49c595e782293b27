//! 聊天功能路由
//!
//! 玩家聊天以唤醒词（`-ai?`、`-weather?`、`-maze?`…）触发各功能；路由器负责
//! 每位玩家的冷却、管理员权限（名单文件定期重读）、AI 通道的玩家名过滤，
//! 以及打错指令时的相似度建议。

mod art;
mod calc;
mod exam;
mod maze;
pub mod similarity;
mod weather;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::sync::Mutex;

pub use art::{convert_java_to_bedrock, ArtBuilder};
pub use calc::{CalcError, WolframCalculator};
pub use exam::{ExamSystem, PlayerStats, Question, QuestionKind};
pub use maze::MazeBuilder;
pub use weather::{WeatherError, WeatherLookup};

use crate::config::AppConfig;
use crate::gateway::CommandDispatcher;
use crate::orchestrator::TurnOrchestrator;

/// 管理员名单重读间隔
const ADMIN_REFRESH: Duration = Duration::from_secs(30);

struct AdminList {
    names: Vec<String>,
    loaded_at: Option<Instant>,
}

/// 聊天功能路由器
pub struct FeatureRouter {
    dispatcher: Arc<CommandDispatcher>,
    orchestrator: Arc<TurnOrchestrator>,
    weather: WeatherLookup,
    calculator: WolframCalculator,
    maze: MazeBuilder,
    art: ArtBuilder,
    exam: ExamSystem,
    wake_word: String,
    cooldown: Duration,
    cooldowns: Mutex<HashMap<String, Instant>>,
    admin_path: PathBuf,
    admins: Mutex<AdminList>,
    player_regex: Option<Regex>,
}

impl FeatureRouter {
    pub fn new(
        cfg: &AppConfig,
        dispatcher: Arc<CommandDispatcher>,
        orchestrator: Arc<TurnOrchestrator>,
    ) -> Self {
        let player_regex = cfg.server.player_regex.as_deref().and_then(|pattern| {
            match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    tracing::warn!(%pattern, %err, "invalid player_regex, AI open to everyone");
                    None
                }
            }
        });

        Self {
            weather: WeatherLookup::new(
                cfg.features.geocoding_api_key.clone(),
                cfg.features.openweather_api_key.clone(),
            ),
            calculator: WolframCalculator::new(cfg.features.wolfram_api_key.clone()),
            maze: MazeBuilder::new(Arc::clone(&dispatcher)),
            art: ArtBuilder::new(Arc::clone(&dispatcher), cfg.features.art_dir.clone()),
            exam: ExamSystem::new(
                Arc::clone(&dispatcher),
                cfg.features.math_db.clone(),
                cfg.features.stats_file.clone(),
            ),
            dispatcher,
            orchestrator,
            wake_word: cfg.ai.wake_word.clone(),
            cooldown: Duration::from_secs(cfg.server.cooldown_secs),
            cooldowns: Mutex::new(HashMap::new()),
            admin_path: cfg.server.admin_file.clone(),
            admins: Mutex::new(AdminList {
                names: Vec::new(),
                loaded_at: None,
            }),
            player_regex,
        }
    }

    /// 入站玩家聊天的唯一入口
    pub async fn handle_chat(&self, sender: &str, message: &str) {
        let message = message.trim();
        if !message.starts_with('-') {
            return;
        }

        if let Some(prompt) = message.strip_prefix(self.wake_word.as_str()) {
            if let Some(ref re) = self.player_regex {
                if !re.is_match(sender) {
                    tracing::debug!(%sender, "AI request filtered by player_regex");
                    return;
                }
            }
            if !self.pass_cooldown(sender).await {
                return;
            }
            self.orchestrator.run_turn(sender, prompt.trim()).await;
            return;
        }

        if let Some(city) = message.strip_prefix("-weather?") {
            if !self.pass_cooldown(sender).await {
                return;
            }
            self.handle_weather(sender, city.trim()).await;
            return;
        }

        if let Some(query) = message.strip_prefix("-calc?") {
            if !self.pass_cooldown(sender).await {
                return;
            }
            self.handle_calc(sender, query.trim()).await;
            return;
        }

        if let Some(args) = message.strip_prefix("-maze?") {
            if !self.require_admin(sender).await || !self.pass_cooldown(sender).await {
                return;
            }
            match parse_maze_args(args.trim()) {
                Some((width, depth)) => match maze_cells_from_blocks(width, depth) {
                    Some((cells_x, cells_z)) => self.maze.build(cells_x, cells_z, "stone").await,
                    None => {
                        self.dispatcher
                            .send_private(sender, "§c[迷宮] 尺寸過大！最大限制為160x160")
                            .await;
                    }
                },
                None => {
                    self.dispatcher
                        .send_private(sender, "§c[迷宮] 格式：-maze?寬*高，例如 -maze?10*10")
                        .await;
                }
            }
            return;
        }

        if let Some(name) = message.strip_prefix("-art?") {
            if !self.require_admin(sender).await || !self.pass_cooldown(sender).await {
                return;
            }
            self.handle_art(sender, name.trim()).await;
            return;
        }

        if let Some(topic) = message.strip_prefix("-exam?") {
            if !self.pass_cooldown(sender).await {
                return;
            }
            self.exam.start(sender, topic).await;
            return;
        }

        if let Some(answer) = message.strip_prefix("-answer?") {
            // 作答不计冷却，连续六题才答得完
            self.exam.answer(sender, answer).await;
            return;
        }

        if message == "-help" {
            self.send_help(sender).await;
            return;
        }

        self.suggest_command(sender, message).await;
    }

    async fn handle_weather(&self, sender: &str, city: &str) {
        if city.is_empty() {
            self.dispatcher
                .send_private(sender, "§c[天氣] 請輸入地點，例如 -weather?台北")
                .await;
            return;
        }
        match self.weather.report(city).await {
            Ok(report) => self.dispatcher.send_chat(&report).await,
            Err(WeatherError::NotConfigured) => {
                self.dispatcher
                    .send_private(sender, "§c[天氣] 此伺服器未設定天氣查詢金鑰")
                    .await;
            }
            Err(WeatherError::PlaceNotFound(place)) => {
                self.dispatcher
                    .send_private(sender, &format!("§c[天氣] 找不到地點「{}」", place))
                    .await;
            }
            Err(WeatherError::Upstream(err)) => {
                tracing::warn!(%err, "weather lookup failed");
                self.dispatcher
                    .send_private(sender, "§c[天氣] 查詢失敗，請稍後再試")
                    .await;
            }
        }
    }

    async fn handle_calc(&self, sender: &str, query: &str) {
        if query.is_empty() {
            self.dispatcher
                .send_private(sender, "§c[計算] 請輸入算式，例如 -calc?integrate x^2")
                .await;
            return;
        }
        match self.calculator.ask(query).await {
            Ok(answer) => {
                self.dispatcher
                    .send_chat(&format!("§b[計算結果] §r{}", answer))
                    .await;
            }
            Err(CalcError::NotConfigured) => {
                self.dispatcher
                    .send_private(sender, "§c[計算] 此伺服器未設定計算服務金鑰")
                    .await;
            }
            Err(CalcError::NotUnderstood) => {
                self.dispatcher
                    .send_private(sender, "§c[計算] 看不懂這個問題，換個問法試試")
                    .await;
            }
            Err(CalcError::Upstream(err)) => {
                tracing::warn!(%err, "calculator query failed");
                self.dispatcher
                    .send_private(sender, "§c[計算] 查詢失敗，請稍後再試")
                    .await;
            }
        }
    }

    async fn handle_art(&self, sender: &str, name: &str) {
        if name.is_empty() || name == "list" {
            let names = self.art.list();
            if names.is_empty() {
                self.dispatcher
                    .send_private(sender, "§c[像素畫] 目前沒有可用的圖案")
                    .await;
            } else {
                self.dispatcher
                    .send_private(sender, &format!("§e[像素畫] 可用圖案：{}", names.join("、")))
                    .await;
            }
            return;
        }
        if self.art.exists(name) {
            self.art.build(name).await;
            return;
        }
        let names = self.art.list();
        match similarity::best_match(name, names.iter().map(String::as_str)) {
            Some((suggestion, score)) if score > similarity::SUGGESTION_THRESHOLD => {
                self.dispatcher
                    .send_private(
                        sender,
                        &format!("§c[像素畫] 沒有「{}」，您是不是要找：{}？", name, suggestion),
                    )
                    .await;
            }
            _ => {
                self.dispatcher
                    .send_private(
                        sender,
                        &format!("§c[像素畫] 沒有「{}」，輸入 -art?list 查看圖案", name),
                    )
                    .await;
            }
        }
    }

    async fn send_help(&self, sender: &str) {
        let lines = [
            "§6§l========== 指令說明 ==========".to_string(),
            format!("§e{}訊息 §7- 和 AI 對話（可代為執行指令）", self.wake_word),
            "§e-weather?地點 §7- 查詢即時天氣".to_string(),
            "§e-calc?問題 §7- Wolfram 計算".to_string(),
            "§e-exam?主題 §7- 開始數學測驗（-answer?作答）".to_string(),
            "§e-maze?寬*高 §7- 生成迷宮（管理員）".to_string(),
            "§e-art?名稱 §7- 建造像素畫（管理員，-art?list 列出）".to_string(),
        ];
        for line in lines {
            self.dispatcher.send_private(sender, &line).await;
        }
    }

    /// 打错指令时按相似度给建议
    async fn suggest_command(&self, sender: &str, message: &str) {
        // 只比对指令头（到第一个 ? 为止），参数不参与相似度
        let head = match message.find('?') {
            Some(pos) => &message[..=pos],
            None => message,
        };
        let known = [
            self.wake_word.as_str(),
            "-weather?",
            "-calc?",
            "-maze?",
            "-art?",
            "-exam?",
            "-answer?",
            "-help",
        ];
        if let Some((suggestion, score)) = similarity::best_match(head, known) {
            if score > similarity::SUGGESTION_THRESHOLD {
                self.dispatcher
                    .send_private(
                        sender,
                        &format!("§e沒有「{}」這個指令，您是不是要用：{}？", head, suggestion),
                    )
                    .await;
                return;
            }
        }
        self.dispatcher
            .send_private(sender, "§7未知指令，輸入 -help 查看可用功能")
            .await;
    }

    /// 冷却检查；在冷却中时提示剩余秒数并返回 false
    async fn pass_cooldown(&self, sender: &str) -> bool {
        if self.cooldown.is_zero() {
            return true;
        }
        let now = Instant::now();
        let mut cooldowns = self.cooldowns.lock().await;
        if let Some(last) = cooldowns.get(sender) {
            let elapsed = now.duration_since(*last);
            if elapsed < self.cooldown {
                let remain = (self.cooldown - elapsed).as_secs() + 1;
                self.dispatcher
                    .send_private(sender, &format!("§7冷卻中，請 {} 秒後再試", remain))
                    .await;
                return false;
            }
        }
        cooldowns.insert(sender.to_string(), now);
        true
    }

    async fn require_admin(&self, sender: &str) -> bool {
        if self.is_admin(sender).await {
            return true;
        }
        self.dispatcher
            .send_private(sender, "§c[系統] 你沒有權限使用此功能")
            .await;
        false
    }

    /// 名单文件一行一个玩家名，每 30 秒重读一次
    async fn is_admin(&self, sender: &str) -> bool {
        let mut admins = self.admins.lock().await;
        let stale = admins
            .loaded_at
            .map_or(true, |at| at.elapsed() >= ADMIN_REFRESH);
        if stale {
            match tokio::fs::read_to_string(&self.admin_path).await {
                Ok(data) => {
                    admins.names = data
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(String::from)
                        .collect();
                }
                Err(err) => {
                    tracing::debug!(path = %self.admin_path.display(), %err, "admin list unreadable");
                    admins.names.clear();
                }
            }
            admins.loaded_at = Some(Instant::now());
        }
        admins.names.iter().any(|name| name == sender)
    }
}

/// `-maze?10*10` 的参数部分 -> (宽, 高)
fn parse_maze_args(args: &str) -> Option<(usize, usize)> {
    let (x, z) = args.split_once('*')?;
    let x: usize = x.trim().parse().ok()?;
    let z: usize = z.trim().parse().ok()?;
    if x == 0 || z == 0 {
        return None;
    }
    Some((x, z))
}

/// 玩家输入的是方块尺寸，迷宫按通道格生成，一格占两个方块。
/// 超过 160x160 方块直接拒绝。
fn maze_cells_from_blocks(width: usize, depth: usize) -> Option<(usize, usize)> {
    const MAX_BLOCKS_PER_AXIS: usize = 160;
    if width > MAX_BLOCKS_PER_AXIS || depth > MAX_BLOCKS_PER_AXIS {
        return None;
    }
    Some(((width / 2).max(1), (depth / 2).max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maze_args_parse() {
        assert_eq!(parse_maze_args("10*10"), Some((10, 10)));
        assert_eq!(parse_maze_args(" 5 * 12 "), Some((5, 12)));
        assert_eq!(parse_maze_args("0*10"), None);
        assert_eq!(parse_maze_args("10"), None);
        assert_eq!(parse_maze_args("a*b"), None);
    }

    #[test]
    fn maze_blocks_halve_into_cells() {
        assert_eq!(maze_cells_from_blocks(10, 10), Some((5, 5)));
        assert_eq!(maze_cells_from_blocks(11, 7), Some((5, 3)));
        // 1x1 也至少给一格通道
        assert_eq!(maze_cells_from_blocks(1, 1), Some((1, 1)));
        assert_eq!(maze_cells_from_blocks(160, 160), Some((80, 80)));
    }

    #[test]
    fn maze_over_size_limit_is_rejected() {
        assert_eq!(maze_cells_from_blocks(161, 10), None);
        assert_eq!(maze_cells_from_blocks(10, 161), None);
        assert_eq!(maze_cells_from_blocks(500, 500), None);
    }

    #[test]
    fn typo_suggestion_targets_the_command_head() {
        // 指令头截到第一个 ?，参数不影响相似度
        let message = "-wether?台北";
        let head = &message[..=message.find('?').unwrap()];
        let (suggestion, score) =
            similarity::best_match(head, ["-weather?", "-calc?", "-help"]).unwrap();
        assert_eq!(suggestion, "-weather?");
        assert!(score > similarity::SUGGESTION_THRESHOLD);
    }
}
