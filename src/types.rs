use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// 1ブロック分のマイク入力サンプル
///
/// キャプチャパイプラインが生成する固定長の浮動小数点サンプル列。
/// 各サンプルは -1.0 ～ 1.0 の範囲で、キャプチャ時のサンプリングレートを保持する。
/// 生成後は不変で、リサンプラーが一度だけ消費する。
///
/// # Examples
///
/// ```
/// # use trustcheck_live::types::AudioBlock;
/// let block = AudioBlock {
///     samples: vec![0.0f32; 4096],
///     sample_rate: 48000,
/// };
/// assert_eq!(block.samples.len(), 4096);
/// ```
#[derive(Clone, Debug)]
pub struct AudioBlock {
    /// 浮動小数点サンプルの配列 (-1.0 ～ 1.0)
    pub samples: Vec<f32>,

    /// キャプチャ時のサンプリングレート (Hz)
    ///
    /// デバイスのネイティブレート。典型的な値: 44100, 48000
    pub sample_rate: u32,
}

/// ゲートウェイへ送信する制御メッセージ
///
/// テキストフレームとしてJSONシリアライズされる。
/// 音声データは制御メッセージではなくバイナリフレームで送信する。
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// ストリーミング開始（言語と送信サンプルレートを宣言）
    Start {
        #[serde(rename = "languageCode")]
        language_code: String,
        #[serde(rename = "sampleRateHertz")]
        sample_rate_hertz: u32,
    },
    /// ストリーミング終了
    Stop,
}

/// ゲートウェイが報告するセッション状態
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayState {
    Idle,
    Starting,
    Streaming,
    Stopping,
    Ended,
}

impl GatewayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayState::Idle => "idle",
            GatewayState::Starting => "starting",
            GatewayState::Streaming => "streaming",
            GatewayState::Stopping => "stopping",
            GatewayState::Ended => "ended",
        }
    }
}

/// ゲートウェイから受信するメッセージ
///
/// テキストフレームのJSONをタグ付きでパースする。
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// セッション状態の更新
    Status { state: GatewayState },
    /// 文字起こし結果（部分または確定）
    Transcript {
        text: String,
        #[serde(rename = "isPartial")]
        is_partial: bool,
    },
    /// ゲートウェイ側のエラー
    Error { message: String },
}

/// リスクレベル
///
/// 分析エンドポイントが返す4段階の判定。
/// Ord導出により深刻度の比較ができる (low < medium < high < critical)。
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// 検出された危険シグナル
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RedFlag {
    /// シグナルの種類 (例: "urgency", "payment_request")
    #[serde(rename = "type")]
    pub kind: String,

    /// このシグナル単体の深刻度
    pub severity: RiskLevel,

    /// 根拠となったテキスト片
    pub evidence: String,
}

/// リスク分析レポート
///
/// 分析エンドポイントのJSONレスポンス。
///
/// # JSON例
///
/// ```json
/// {
///   "risk_score": 82,
///   "risk_level": "high",
///   "summary": "Caller pressures for an urgent gift card payment.",
///   "red_flags": [
///     {"type": "payment_request", "severity": "high", "evidence": "buy gift cards now"}
///   ],
///   "recommended_actions": ["Hang up", "Do not share codes"],
///   "safe_reply": "I will call the official number back."
/// }
/// ```
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RiskReport {
    /// リスクスコア (0-100)
    pub risk_score: u8,

    /// 総合リスクレベル
    pub risk_level: RiskLevel,

    /// 判定理由の要約
    pub summary: String,

    #[serde(default)]
    pub red_flags: Vec<RedFlag>,

    #[serde(default)]
    pub recommended_actions: Vec<String>,

    /// 推奨される安全な返答（ある場合のみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_reply: Option<String>,
}

/// 非同期ジョブの進行状態
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Completed,
    Failed,
}

/// メディア分析レポート
///
/// 画像・文書・音声ファイル分析のレスポンス。リスクレポートに加えて
/// サーバー側抽出テキストと、処理未完了時のジョブトークンを持つ。
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MediaReport {
    #[serde(flatten)]
    pub report: RiskReport,

    /// OCR等で抽出されたテキスト（画像・文書）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,

    /// 文字起こしテキスト（音声）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub textract_mode: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,

    /// 文書ジョブのポーリングトークン
    #[serde(rename = "jobId", skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    /// 音声文字起こしジョブのポーリングトークン
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcribe_job: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
}

/// 署名付きアップロードURLの発行結果
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UploadTicket {
    #[serde(rename = "uploadUrl")]
    pub upload_url: String,

    #[serde(rename = "s3Key")]
    pub s3_key: String,
}

/// アップロード対象のメディア種別
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Document,
    Audio,
}

impl MediaKind {
    /// 分析エンドポイントのパス名
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
        }
    }

    /// 拡張子からメディア種別を推定
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" => Some(MediaKind::Image),
            "pdf" | "doc" | "docx" | "txt" => Some(MediaKind::Document),
            "mp3" | "wav" | "mp4" | "m4a" => Some(MediaKind::Audio),
            _ => None,
        }
    }
}

/// 文字起こしセグメント
///
/// ゲートウェイから受信した1件の文字起こし結果。
/// JSON形式でシリアライズして標準出力に出力される。
///
/// # JSON出力例
///
/// ```json
/// {
///   "timestamp": "2025-01-02T14:30:15+00:00",
///   "timestamp_seconds": 15.234,
///   "text": "hello this is your bank calling",
///   "is_partial": false
/// }
/// ```
#[derive(Clone, Debug, Serialize)]
pub struct TranscriptSegment {
    /// ISO 8601形式のタイムスタンプ
    pub timestamp: String,

    /// セッション開始からの経過秒数
    pub timestamp_seconds: f64,

    /// 文字起こしテキスト
    pub text: String,

    /// 部分結果かどうか
    ///
    /// true: 部分結果, false: 確定結果
    pub is_partial: bool,
}

impl TranscriptSegment {
    /// 新しい文字起こしセグメントを作成
    ///
    /// # Arguments
    ///
    /// * `text` - 文字起こしテキスト
    /// * `is_partial` - 部分結果かどうか
    /// * `start_time` - セッション開始時刻（経過秒数の基準）
    pub fn new(text: String, is_partial: bool, start_time: SystemTime) -> Self {
        let now = SystemTime::now();

        let duration = now.duration_since(start_time).unwrap_or_default();
        let timestamp_seconds = duration.as_secs_f64();

        let timestamp = chrono::DateTime::from_timestamp(
            now.duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64,
            0,
        )
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default();

        Self {
            timestamp,
            timestamp_seconds,
            text,
            is_partial,
        }
    }
}
