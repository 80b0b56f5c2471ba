use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// オーディオ入力設定
///
/// マイクデバイスからのキャプチャに関する設定。
///
/// # デフォルト値
///
/// - `device_id`: "default" (システムのデフォルトデバイス)
/// - `block_size`: 4096 サンプル
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default = "default_block_size")]
    pub block_size: u32,
}

/// ストリーミングゲートウェイ設定
///
/// 文字起こしゲートウェイへの永続接続に関する設定。
///
/// # デフォルト値
///
/// - `url`: 本番ゲートウェイのwssエンドポイント
/// - `language_code`: "en-US"
/// - `sample_rate`: 16000 Hz (ゲートウェイの推奨値)
/// - `connect_timeout_secs`: 10 秒
/// - `read_timeout_ms`: 50 ミリ秒（ソケットスレッドの読み取り周期）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default = "default_gateway_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// リスク分析設定
///
/// 分析エンドポイントと再分析スケジューラに関する設定。
///
/// # デフォルト値
///
/// - `interval_secs`: 5 秒（確定トランスクリプトの再分析周期）
/// - `min_chars`: 30 文字（これ未満の確定トランスクリプトは分析しない）
/// - `timeout_seconds`: 30 秒
/// - `poll_interval_secs`: 5 秒（メディアジョブのポーリング間隔）
/// - `max_poll_attempts`: 60 回
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_live_endpoint")]
    pub live_endpoint: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

/// 出力設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default functions
fn default_device_id() -> String {
    "default".to_string()
}

fn default_block_size() -> u32 {
    4096
}

fn default_gateway_url() -> String {
    "wss://trustcheck-streaming-gateway.onrender.com/stream".to_string()
}

fn default_language_code() -> String {
    "en-US".to_string()
}

fn default_gateway_sample_rate() -> u32 {
    16000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_ms() -> u64 {
    50
}

fn default_live_endpoint() -> String {
    "https://trustcheck-streaming-gateway.onrender.com/analyze-text".to_string()
}

fn default_api_base() -> String {
    "https://q4lp4xk3q4.execute-api.us-east-1.amazonaws.com/v1".to_string()
}

fn default_interval_secs() -> u64 {
    5
}

fn default_min_chars() -> usize {
    30
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_poll_attempts() -> u32 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            gateway: GatewayConfig::default(),
            analysis: AnalysisConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            block_size: default_block_size(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            language_code: default_language_code(),
            sample_rate: default_gateway_sample_rate(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            live_endpoint: default_live_endpoint(),
            api_base: default_api_base(),
            interval_secs: default_interval_secs(),
            min_chars: default_min_chars(),
            timeout_seconds: default_timeout_seconds(),
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// 設定ファイルから読み込み
    ///
    /// TOML形式の設定ファイルをパースしてConfig構造体を生成する。
    ///
    /// # Errors
    ///
    /// ファイルの読み込みまたはパースに失敗した場合にエラーを返す。
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use trustcheck_live::config::Config;
    /// let config = Config::from_file("config.toml").unwrap();
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("設定ファイルの読み込みに失敗: {:?}", path.as_ref()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "設定ファイルのパースに失敗")?;
        Ok(config)
    }

    /// デフォルト設定をファイルに書き出し
    ///
    /// 既存のファイルは上書きされる。
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use trustcheck_live::config::Config;
    /// Config::write_default("config.toml").unwrap();
    /// ```
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Config::default();
        let content =
            toml::to_string_pretty(&config).with_context(|| "設定のシリアライズに失敗")?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("設定ファイルの書き込みに失敗: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// 設定ファイルがあれば読み込み、なければデフォルトを使用
    ///
    /// ファイルが存在するがパースに失敗した場合はエラーを返す。
    /// ファイルが存在しない場合はエラーにならず、デフォルト設定を返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            log::warn!(
                "設定ファイルが見つかりません。デフォルト設定を使用します: {:?}",
                path.as_ref()
            );
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.audio.device_id, "default");
        assert_eq!(config.audio.block_size, 4096);
        assert_eq!(config.gateway.language_code, "en-US");
        assert_eq!(config.gateway.sample_rate, 16000);
        assert_eq!(config.analysis.interval_secs, 5);
        assert_eq!(config.analysis.min_chars, 30);
        assert_eq!(config.output.log_level, "info");
    }

    #[test]
    fn test_write_and_read_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        // デフォルト設定を書き込み
        Config::write_default(path).unwrap();

        // 読み込み
        let config = Config::from_file(path).unwrap();
        assert_eq!(config.gateway.sample_rate, 16000);
        assert_eq!(config.analysis.min_chars, 30);
    }

    #[test]
    fn test_custom_config() {
        let toml_content = r#"
[audio]
device_id = "test-device"
block_size = 2048

[gateway]
url = "ws://localhost:9090/stream"
language_code = "ja-JP"
sample_rate = 8000
connect_timeout_secs = 3
read_timeout_ms = 20

[analysis]
live_endpoint = "http://localhost:9091/analyze-text"
api_base = "http://localhost:9091/v1"
interval_secs = 2
min_chars = 10
timeout_seconds = 5
poll_interval_secs = 1
max_poll_attempts = 3

[output]
log_level = "debug"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.audio.device_id, "test-device");
        assert_eq!(config.audio.block_size, 2048);
        assert_eq!(config.gateway.url, "ws://localhost:9090/stream");
        assert_eq!(config.gateway.language_code, "ja-JP");
        assert_eq!(config.gateway.sample_rate, 8000);
        assert_eq!(config.analysis.min_chars, 10);
        assert_eq!(config.analysis.max_poll_attempts, 3);
        assert_eq!(config.output.log_level, "debug");
    }

    #[test]
    fn test_load_or_default_nonexistent() {
        let config = Config::load_or_default("nonexistent_file.toml").unwrap();
        // デフォルト設定が返されることを確認
        assert_eq!(config.gateway.sample_rate, 16000);
    }

    #[test]
    fn test_partial_config() {
        // 一部の設定のみ記述した場合、残りはデフォルト値が使われる
        let toml_content = r#"
[gateway]
language_code = "ja-JP"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();

        // 指定した値
        assert_eq!(config.gateway.language_code, "ja-JP");

        // デフォルト値
        assert_eq!(config.gateway.sample_rate, 16000);
        assert_eq!(config.audio.block_size, 4096);
        assert_eq!(config.analysis.interval_secs, 5);
    }
}
