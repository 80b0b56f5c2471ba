use anyhow::{Context, Result};
use env_logger::Env;
use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use trustcheck_live::capture::AudioCapture;
use trustcheck_live::config::Config;
use trustcheck_live::live::LiveSession;
use trustcheck_live::risk_api::RiskApiClient;
use trustcheck_live::types::MediaKind;
use trustcheck_live::upload::UploadClient;

#[tokio::main]
async fn main() -> Result<()> {
    // ロガーを初期化
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    // コマンドライン引数をパース
    let args: Vec<String> = std::env::args().collect();

    // デバイス一覧表示モード
    if args.len() > 1 && args[1] == "--show-interfaces" {
        AudioCapture::list_devices()?;
        return Ok(());
    }

    // 設定ファイル生成モード
    if args.len() > 1 && args[1] == "--generate-config" {
        let config_path = if args.len() > 2 {
            &args[2]
        } else {
            "config.toml"
        };
        Config::write_default(config_path)?;
        println!("設定ファイルを生成しました: {}", config_path);
        return Ok(());
    }

    // 設定ファイルのパス
    let config_path = if args.len() > 1 && !args[1].starts_with("--") {
        &args[1]
    } else {
        "config.toml"
    };

    // 設定を読み込み
    let config = Config::load_or_default(config_path)?;

    // テキスト一発分析モード
    if let Some(index) = args.iter().position(|a| a == "--analyze-text") {
        let text = args
            .get(index + 1)
            .context("--analyze-text にはテキストを指定してください")?;

        let client = RiskApiClient::new(&config.analysis)?;
        let report = client.analyze_text(text).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    // ファイル分析モード（アップロード → 分析 → 必要ならポーリング）
    if let Some(index) = args.iter().position(|a| a == "--analyze-file") {
        let path = args
            .get(index + 1)
            .context("--analyze-file にはファイルパスを指定してください")?;

        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();
        let kind = MediaKind::from_extension(&ext)
            .with_context(|| format!("サポートされていないファイル形式: {}", path))?;

        let bytes =
            std::fs::read(path).with_context(|| format!("ファイルの読み込みに失敗: {}", path))?;

        let client = UploadClient::new(&config.analysis)?;
        let report = client.upload_and_analyze(kind, bytes, &ext).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    // ライブ通話モード
    log::info!("trustcheck-live を起動します");

    // Ctrl+C ハンドラを設定
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        log::info!("停止シグナルを受信しました...");
        running_clone.store(false, Ordering::SeqCst);
    })?;

    let (mut session, mut event_rx, mut analysis_rx) =
        LiveSession::connect(&config).context("ゲートウェイへの接続に失敗")?;

    let (block_tx, mut block_rx) = mpsc::channel(1024);
    session
        .start_capture(block_tx)
        .context("キャプチャの開始に失敗")?;

    log::info!("ライブ配信を開始しました (Enter で手動分析, Ctrl+C で停止)");

    let mut ticker = tokio::time::interval(Duration::from_secs(config.analysis.interval_secs));
    let mut stdin_lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            Some(block) = block_rx.recv() => {
                session.handle_block(block);
            }
            Some(event) = event_rx.recv() => {
                if let Some(segment) = session.handle_event(event) {
                    // JSON形式で出力
                    if let Ok(json) = serde_json::to_string(&segment) {
                        println!("{}", json);
                    }
                }
                if !session.is_connected() {
                    log::warn!("接続が失われたため終了します");
                    break;
                }
            }
            Some(result) = analysis_rx.recv() => {
                if let Some(report) = session.apply_analysis(result) {
                    if let Ok(json) = serde_json::to_string(report) {
                        println!("{}", json);
                    }
                }
            }
            _ = ticker.tick() => {
                session.tick();
            }
            Ok(Some(_)) = stdin_lines.next_line() => {
                log::info!("手動分析をトリガーします");
                session.analyze_now();
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                // タイムアウト: ループを継続して running をチェック
            }
        }
    }

    // クリーンアップ
    log::info!("停止処理を開始します...");

    session.close();

    log::info!("trustcheck-live を終了しました");

    Ok(())
}
