use crate::config::AnalysisConfig;
use crate::error::LiveError;
use crate::types::RiskReport;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// 分析エンドポイントの非成功レスポンスボディ
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// リスク分析エンドポイントのHTTPクライアント
#[derive(Clone)]
pub struct RiskApiClient {
    client: reqwest::Client,
    live_endpoint: String,
}

impl RiskApiClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self, LiveError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LiveError::AnalysisRequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            live_endpoint: config.live_endpoint.clone(),
        })
    }

    /// テキストをリスク分析エンドポイントへ送信
    ///
    /// 成功時はリスクレポートを返す。非成功レスポンスは
    /// `{"message": ...}` 形式のエラーボディを抽出して
    /// `AnalysisRequestFailed` として返す。
    pub async fn analyze_text(&self, text: &str) -> Result<RiskReport, LiveError> {
        log::debug!("リスク分析リクエスト: {} 文字", text.chars().count());

        let response = self
            .client
            .post(&self.live_endpoint)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| LiveError::AnalysisRequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<ApiErrorBody>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| "不明なエラー".to_string());
            return Err(LiveError::AnalysisRequestFailed(format!(
                "{} - {}",
                status, message
            )));
        }

        let report: RiskReport = response
            .json::<RiskReport>()
            .await
            .map_err(|e| LiveError::AnalysisRequestFailed(format!("レスポンスパース失敗: {}", e)))?;

        log::debug!(
            "リスク分析結果: score={}, level={:?}",
            report.risk_score,
            report.risk_level
        );

        Ok(report)
    }
}
