//! 数学刷题（-exam? / -answer?）
//!
//! 题库是一份 JSON（单选 / 多选 / 填充），按遗忘曲线给每位玩家加权抽 6 题：
//! 答对次数越多、距上次作答越近，权重越低。玩家掌握度统计持久化到 JSON 档。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::features::similarity::{best_match, SUGGESTION_THRESHOLD};
use crate::gateway::CommandDispatcher;

/// 一场测验的题数：单选 / 多选 / 填充各 2
const QUESTIONS_PER_EXAM: usize = 6;
const QUESTIONS_PER_TYPE: usize = 2;
/// 默认主题 = 全题库
const DEFAULT_TOPIC: &str = "高中數學";
/// 遗忘曲线的时间尺度：一周（小时）
const FORGETTING_HOURS: f64 = 168.0;

/// 题库中的一道题
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Single,
    Multiple,
    Math,
}

impl QuestionKind {
    fn label(self) -> &'static str {
        match self {
            QuestionKind::Single => "單選題",
            QuestionKind::Multiple => "多選題",
            QuestionKind::Math => "填充題",
        }
    }
}

/// 某玩家对某题的掌握度
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasteryRecord {
    pub correct_count: u32,
    /// 上次作答时间（毫秒时间戳）
    pub last_time: i64,
}

/// 单个玩家的统计档
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerStats {
    #[serde(default)]
    pub mastery: HashMap<String, MasteryRecord>,
}

/// 进行中的测验
struct ExamSession {
    questions: Vec<Question>,
    current: usize,
    score: u32,
}

/// 考试系统
pub struct ExamSystem {
    dispatcher: Arc<CommandDispatcher>,
    db_path: PathBuf,
    stats_path: PathBuf,
    sessions: Mutex<HashMap<String, ExamSession>>,
}

impl ExamSystem {
    pub fn new(dispatcher: Arc<CommandDispatcher>, db_path: PathBuf, stats_path: PathBuf) -> Self {
        Self {
            dispatcher,
            db_path,
            stats_path,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// 题库里出现过的全部主题
    pub fn topics(&self) -> Vec<String> {
        let Ok(questions) = load_questions(&self.db_path) else {
            return Vec::new();
        };
        let mut topics: Vec<String> = questions
            .into_iter()
            .filter_map(|q| q.topic)
            .map(|t| t.trim().to_string())
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }

    /// 开始一场测验；主题不认识时按相似度建议或退回全范围
    pub async fn start(&self, player: &str, topic: &str) {
        let topic = topic.trim();
        if topic.is_empty() {
            self.start_with_topic(player, DEFAULT_TOPIC).await;
            return;
        }

        let topics = self.topics();
        if topic == DEFAULT_TOPIC || topics.iter().any(|t| t == topic) {
            self.start_with_topic(player, topic).await;
            return;
        }

        match best_match(topic, topics.iter().map(String::as_str)) {
            Some((suggestion, score)) if score > SUGGESTION_THRESHOLD => {
                self.dispatcher
                    .send_private(player, &format!("§c[考試系統] 找不到主題「{}」", topic))
                    .await;
                self.dispatcher
                    .send_private(player, &format!("§e您是不是要找：{}？", suggestion))
                    .await;
                self.dispatcher
                    .send_private(player, &format!("§7輸入 -exam?{} 即可開始", suggestion))
                    .await;
            }
            _ => {
                self.dispatcher
                    .send_private(
                        player,
                        &format!("§c[考試系統] 找不到主題「{}」，改為練習全範圍", topic),
                    )
                    .await;
                self.start_with_topic(player, DEFAULT_TOPIC).await;
            }
        }
    }

    async fn start_with_topic(&self, player: &str, topic: &str) {
        {
            let sessions = self.sessions.lock().await;
            if sessions.contains_key(player) {
                self.dispatcher
                    .send_private(player, "§c[考試系統] 你已經在考試中，請完成後再重新開始。")
                    .await;
                return;
            }
        }

        let questions = match load_questions(&self.db_path) {
            Ok(q) => q,
            Err(err) => {
                tracing::error!(%err, "question bank unreadable");
                self.dispatcher
                    .send_private(player, "§c題庫讀取失敗。")
                    .await;
                return;
            }
        };

        let mut pool: Vec<Question> = if topic == DEFAULT_TOPIC {
            questions.clone()
        } else {
            questions
                .iter()
                .filter(|q| q.topic.as_deref().map(str::trim) == Some(topic))
                .cloned()
                .collect()
        };
        if pool.len() < QUESTIONS_PER_EXAM {
            if topic != DEFAULT_TOPIC {
                self.dispatcher
                    .send_private(player, &format!("§7主題「{}」題目較少，已混合其他題目", topic))
                    .await;
            }
            pool = questions;
        }

        let stats = load_stats(&self.stats_path, player);
        let exam_set = sample_exam_set(&pool, &stats, chrono::Utc::now().timestamp_millis());
        if exam_set.len() < QUESTIONS_PER_EXAM {
            self.dispatcher
                .send_private(player, "§c[考試系統] 題庫題目不足，無法組成6題測驗")
                .await;
            return;
        }

        self.sessions.lock().await.insert(
            player.to_string(),
            ExamSession {
                questions: exam_set,
                current: 0,
                score: 0,
            },
        );

        self.dispatcher
            .send_private(player, "§e[考試系統] 測驗開始 共六題 輸入-answer?作答")
            .await;
        self.send_current_question(player).await;
    }

    async fn send_current_question(&self, player: &str) {
        let (question, index) = {
            let sessions = self.sessions.lock().await;
            let Some(session) = sessions.get(player) else {
                return;
            };
            (session.questions[session.current].clone(), session.current)
        };

        self.dispatcher
            .send_private(player, "§f--------------------------------")
            .await;
        self.dispatcher
            .send_private(
                player,
                &format!("§e第 {} 題 ({})", index + 1, question.kind.label()),
            )
            .await;
        self.dispatcher
            .send_private(
                player,
                &format!("§a主題：§7{}", question.topic.as_deref().unwrap_or("一般")),
            )
            .await;
        self.dispatcher
            .send_private(player, &format!("§f{}", question.question))
            .await;
        for option in &question.options {
            self.dispatcher
                .send_private(player, &format!("§7{}", option))
                .await;
        }
    }

    /// 作答当前题目
    pub async fn answer(&self, player: &str, user_answer: &str) {
        let user_answer = user_answer.trim().to_uppercase();
        let (question, finished, score) = {
            let mut sessions = self.sessions.lock().await;
            let Some(session) = sessions.get_mut(player) else {
                self.dispatcher
                    .send_private(player, "§c[考試系統] 目前你沒有在進行的考試 請輸入-exam?...")
                    .await;
                return;
            };
            let question = session.questions[session.current].clone();
            session.current += 1;
            let finished = session.current >= session.questions.len();
            (question, finished, session.score)
        };

        let correct = question.answer.to_uppercase();
        let is_right = if question.kind == QuestionKind::Multiple {
            sorted_chars(&user_answer) == sorted_chars(&correct)
        } else {
            user_answer == correct
        };

        let mut stats = load_stats(&self.stats_path, player);
        let record = stats.mastery.entry(question.id.clone()).or_default();
        if is_right {
            record.correct_count += 1;
            self.dispatcher
                .send_private(player, "§a§l✔ 回答正確")
                .await;
        } else {
            record.correct_count = record.correct_count.saturating_sub(1);
            self.dispatcher
                .send_private(player, &format!("§c§l✘ 回答錯誤  正確答案為§6{}", correct))
                .await;
        }
        record.last_time = chrono::Utc::now().timestamp_millis();
        if let Err(err) = save_stats(&self.stats_path, player, &stats) {
            tracing::warn!(%err, "failed to persist player stats");
        }

        let score = if is_right { score + 1 } else { score };
        if finished {
            self.sessions.lock().await.remove(player);
            self.dispatcher
                .run_command(&format!("playsound random.screenshot \"{}\"", player))
                .await;
            self.dispatcher
                .send_private(
                    player,
                    &format!(
                        "§6§l[測驗結束] §e總共答對§a{} §e/ {}題！",
                        score, QUESTIONS_PER_EXAM
                    ),
                )
                .await;
        } else {
            {
                let mut sessions = self.sessions.lock().await;
                if let Some(session) = sessions.get_mut(player) {
                    session.score = score;
                }
            }
            self.send_current_question(player).await;
        }
    }
}

fn sorted_chars(s: &str) -> Vec<char> {
    let mut chars: Vec<char> = s.chars().collect();
    chars.sort_unstable();
    chars
}

fn load_questions(path: &Path) -> anyhow::Result<Vec<Question>> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// 读某位玩家的统计（档案不存在或坏档时给空统计）
fn load_stats(path: &Path, player: &str) -> PlayerStats {
    let Ok(data) = std::fs::read_to_string(path) else {
        return PlayerStats::default();
    };
    let all: HashMap<String, PlayerStats> = serde_json::from_str(&data).unwrap_or_default();
    all.get(player).cloned().unwrap_or_default()
}

fn save_stats(path: &Path, player: &str, stats: &PlayerStats) -> anyhow::Result<()> {
    let mut all: HashMap<String, PlayerStats> = std::fs::read_to_string(path)
        .ok()
        .and_then(|data| serde_json::from_str(&data).ok())
        .unwrap_or_default();
    all.insert(player.to_string(), stats.clone());
    std::fs::write(path, serde_json::to_string_pretty(&all)?)?;
    Ok(())
}

/// 遗忘曲线权重：答对次数越多权重越低，离上次作答越久权重越高
fn question_weight(record: Option<&MasteryRecord>, now_millis: i64) -> f64 {
    match record {
        None => 1.0,
        Some(record) => {
            let hours_since = (now_millis - record.last_time) as f64 / 3_600_000.0;
            (1.0 / (record.correct_count as f64 + 1.0)) * (1.0 + hours_since / FORGETTING_HOURS)
        }
    }
}

/// 每种题型按权重取前 2n 再随机抽 n，组成 2+2+2 的测验卷
fn sample_exam_set(pool: &[Question], stats: &PlayerStats, now_millis: i64) -> Vec<Question> {
    let mut rng = rand::thread_rng();
    let mut exam = Vec::with_capacity(QUESTIONS_PER_EXAM);

    for kind in [QuestionKind::Single, QuestionKind::Multiple, QuestionKind::Math] {
        let mut weighted: Vec<(&Question, f64)> = pool
            .iter()
            .filter(|q| q.kind == kind)
            .map(|q| (q, question_weight(stats.mastery.get(&q.id), now_millis)))
            .collect();
        weighted.sort_by(|a, b| b.1.total_cmp(&a.1));
        weighted.truncate(QUESTIONS_PER_TYPE * 2);
        weighted.shuffle(&mut rng);
        exam.extend(
            weighted
                .into_iter()
                .take(QUESTIONS_PER_TYPE)
                .map(|(q, _)| q.clone()),
        );
    }
    exam
}
