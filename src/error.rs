use thiserror::Error;

/// ライブセッションで発生するエラーの分類
///
/// 呼び出し側が失敗の種類ごとに対処を分けられるように、
/// コンポーネント境界ではこの型でエラーを返す。
#[derive(Debug, Error)]
pub enum LiveError {
    /// マイクの権限拒否またはデバイス不在
    ///
    /// セッション開始に対して致命的。キャプチャは開始されない。
    #[error("マイクデバイスが利用できません: {0}")]
    MicrophoneUnavailable(String),

    /// ゲートウェイへの接続確立に失敗
    #[error("ゲートウェイ接続に失敗: {0}")]
    GatewayConnect(String),

    /// ソケットレベルのトランスポートエラー
    ///
    /// キャプチャセッションを即座にローカル停止させる。
    #[error("トランスポートエラー: {0}")]
    Transport(String),

    /// 分析エンドポイントの非成功レスポンスまたはネットワーク障害
    ///
    /// 前回のレポートは保持され、自動リトライは行わない。
    #[error("リスク分析リクエストに失敗: {0}")]
    AnalysisRequestFailed(String),
}
