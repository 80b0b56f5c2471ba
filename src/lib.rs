//! trustcheck-live - ライブ通話リスク分析クライアント
//!
//! このクレートは、マイク音声をリアルタイムに文字起こしゲートウェイへ
//! ストリーミングし、成長する確定トランスクリプトを外部のリスク分析
//! エンドポイントへ逐次再送信するクライアントを提供します。
//! リスク判定そのものはリモートサービスが行い、このクレートは
//! キャプチャ・リサンプリング・エンコード・転送・組み立て・再分析の
//! スケジューリングだけを担当します。
//!
//! # 主な機能
//!
//! - **音声キャプチャ**: マイクからネイティブレートの固定長ブロックを取得
//! - **リサンプリング**: ブロック平均の間引きでゲートウェイの宣言レートへ変換
//! - **ストリーミング**: WebSocket上の制御メッセージ＋バイナリPCMフレーム
//! - **トランスクリプト組み立て**: 部分/確定イベントを2つの観測値へ畳み込み
//! - **再分析スケジューラ**: 閾値と重複排除付きの定期リスク分析
//! - **ファイル分析**: 署名付きURLへのアップロードとジョブポーリング
//!
//! # アーキテクチャ
//!
//! ```text
//! [Microphone] → [AudioCapture] → [Resampler] → [PCM Encoder]
//!                                                     ↓
//!                        [StreamingSession] ←─ binary frames
//!                                ↓
//!                    transcript / status / error
//!                                ↓
//!                        [TranscriptState]
//!                                ↓
//!                     [ReanalysisScheduler]
//!                                ↓
//!                         [RiskApiClient]
//!                                ↓
//!                          [RiskReport]
//! ```
//!
//! # 使用例
//!
//! ```no_run
//! use trustcheck_live::config::Config;
//!
//! // 設定ファイルを読み込み
//! let config = Config::load_or_default("config.toml").unwrap();
//!
//! // またはデフォルト設定を生成
//! Config::write_default("config.toml").unwrap();
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod gateway;
pub mod live;
pub mod pcm;
pub mod resampler;
pub mod risk_api;
pub mod scheduler;
pub mod transcript;
pub mod types;
pub mod upload;
