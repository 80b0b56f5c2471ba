use crate::config::AnalysisConfig;
use crate::error::LiveError;
use crate::types::{JobStatus, MediaKind, MediaReport, UploadTicket};
use serde_json::json;
use std::time::Duration;

/// メディア分析リクエストの結果
///
/// サーバー側処理が長引く場合は202でジョブトークンが返り、
/// 呼び出し側は同じエンドポイントへトークンを再送してポーリングする。
#[derive(Debug)]
pub enum MediaOutcome {
    /// 分析完了
    Completed(MediaReport),
    /// ジョブ処理中（ポーリングトークンを含む）
    Pending(MediaReport),
}

/// 署名付きアップロードとメディア分析のクライアント
///
/// フロー: アップロードURL発行 → 署名付きURLへPUT → s3Keyで分析開始
/// → (202なら) ジョブトークンでポーリング。
pub struct UploadClient {
    client: reqwest::Client,
    api_base: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl UploadClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self, LiveError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LiveError::AnalysisRequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_poll_attempts: config.max_poll_attempts,
        })
    }

    /// 署名付きアップロードURLを発行してもらう
    pub async fn request_upload_url(
        &self,
        content_type: &str,
        ext: &str,
    ) -> Result<UploadTicket, LiveError> {
        let url = format!("{}/upload-url", self.api_base);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "contentType": content_type, "ext": ext }))
            .send()
            .await
            .map_err(|e| LiveError::AnalysisRequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LiveError::AnalysisRequestFailed(format!(
                "アップロードURL発行失敗: {}",
                response.status()
            )));
        }

        response
            .json::<UploadTicket>()
            .await
            .map_err(|e| LiveError::AnalysisRequestFailed(format!("レスポンスパース失敗: {}", e)))
    }

    /// ファイルを署名付きURLへPUT
    pub async fn put_presigned(
        &self,
        upload_url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), LiveError> {
        let response = self
            .client
            .put(upload_url)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| LiveError::AnalysisRequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LiveError::AnalysisRequestFailed(format!(
                "ストレージへのアップロード失敗: {} - {}",
                status, body
            )));
        }

        Ok(())
    }

    /// メディア分析を開始（またはジョブトークンで進行を確認）
    pub async fn analyze_media(
        &self,
        kind: MediaKind,
        payload: &serde_json::Value,
    ) -> Result<MediaOutcome, LiveError> {
        let url = format!("{}/analyze/{}", self.api_base, kind.as_str());
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| LiveError::AnalysisRequestFailed(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 202 {
            let report: MediaReport = response.json().await.map_err(|e| {
                LiveError::AnalysisRequestFailed(format!("レスポンスパース失敗: {}", e))
            })?;
            return Ok(MediaOutcome::Pending(report));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LiveError::AnalysisRequestFailed(format!(
                "メディア分析失敗: {} - {}",
                status, body
            )));
        }

        let report: MediaReport = response
            .json()
            .await
            .map_err(|e| LiveError::AnalysisRequestFailed(format!("レスポンスパース失敗: {}", e)))?;

        // ボディ側のステータスが処理中を示す場合もポーリング継続
        if report.status == Some(JobStatus::InProgress) {
            return Ok(MediaOutcome::Pending(report));
        }

        Ok(MediaOutcome::Completed(report))
    }

    /// ジョブトークンを再送して完了までポーリング
    pub async fn poll_until_complete(
        &self,
        kind: MediaKind,
        pending: &MediaReport,
    ) -> Result<MediaReport, LiveError> {
        let payload = if let Some(job) = &pending.transcribe_job {
            json!({ "transcribe_job": job })
        } else if let Some(job) = &pending.job_id {
            json!({ "jobId": job })
        } else {
            return Err(LiveError::AnalysisRequestFailed(
                "ポーリングトークンがありません".to_string(),
            ));
        };

        for attempt in 1..=self.max_poll_attempts {
            tokio::time::sleep(self.poll_interval).await;

            log::debug!(
                "ジョブポーリング {}/{} ({})",
                attempt,
                self.max_poll_attempts,
                kind.as_str()
            );

            match self.analyze_media(kind, &payload).await? {
                MediaOutcome::Completed(report) => return Ok(report),
                MediaOutcome::Pending(_) => {}
            }
        }

        Err(LiveError::AnalysisRequestFailed(
            "ジョブのポーリング上限に達しました".to_string(),
        ))
    }

    /// アップロードから分析完了までの一括フロー
    ///
    /// # Arguments
    /// * `kind` - メディア種別
    /// * `bytes` - ファイル内容
    /// * `ext` - 拡張子（文書分析は `fileType` として送信される）
    pub async fn upload_and_analyze(
        &self,
        kind: MediaKind,
        bytes: Vec<u8>,
        ext: &str,
    ) -> Result<MediaReport, LiveError> {
        let content_type = content_type_for(ext);

        let ticket = self.request_upload_url(content_type, ext).await?;
        log::info!("アップロード先を取得しました: {}", ticket.s3_key);

        self.put_presigned(&ticket.upload_url, bytes, content_type)
            .await?;
        log::info!("アップロード完了。分析を開始します");

        let mut payload = json!({ "s3Key": ticket.s3_key });
        if kind == MediaKind::Document {
            payload["fileType"] = json!(ext);
        }

        match self.analyze_media(kind, &payload).await? {
            MediaOutcome::Completed(report) => Ok(report),
            MediaOutcome::Pending(report) => {
                log::info!("サーバー側で処理中。完了までポーリングします");
                self.poll_until_complete(kind, &report).await
            }
        }
    }
}

/// 拡張子からContent-Typeを決定
pub fn content_type_for(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" | "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}
