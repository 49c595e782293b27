//! 数学计算（-calc?）
//!
//! Wolfram Alpha Short Answers API：问题进、单行答案出；501 表示引擎无法理解
//! 该问题，单独成一类错误好给玩家换种问法的提示。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalcError {
    #[error("Wolfram Alpha API Key未設定，無法執行運算")]
    NotConfigured,

    /// 引擎无法理解问题（HTTP 501）
    #[error("Wolfram Alpha無法理解這個問題，請試著換種說法")]
    NotUnderstood,

    #[error("計算服務暫時不可用，請檢查網路或API Key")]
    Upstream(#[from] reqwest::Error),
}

/// Wolfram 短答案查询器
pub struct WolframCalculator {
    client: reqwest::Client,
    app_id: Option<String>,
}

impl WolframCalculator {
    pub fn new(app_id: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            app_id,
        }
    }

    /// 用英文问题换一行答案
    pub async fn ask(&self, query: &str) -> Result<String, CalcError> {
        let Some(app_id) = &self.app_id else {
            return Err(CalcError::NotConfigured);
        };

        let response = self
            .client
            .get("https://api.wolframalpha.com/v1/result")
            .query(&[("appid", app_id.as_str()), ("i", query), ("units", "metric")])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_IMPLEMENTED {
            return Err(CalcError::NotUnderstood);
        }

        Ok(response.error_for_status()?.text().await?)
    }
}
