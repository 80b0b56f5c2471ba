use crate::capture::AudioCapture;
use crate::config::{AudioConfig, Config};
use crate::error::LiveError;
use crate::gateway::{GatewayEvent, StreamingSession};
use crate::pcm;
use crate::resampler;
use crate::risk_api::RiskApiClient;
use crate::scheduler::ReanalysisScheduler;
use crate::transcript::TranscriptState;
use crate::types::{AudioBlock, ControlMessage, GatewayState, RiskReport, TranscriptSegment};
use std::time::SystemTime;
use tokio::sync::mpsc;

/// 分析結果チャンネルの容量
const ANALYSIS_CHANNEL_CAPACITY: usize = 8;

/// ライブ通話セッション
///
/// マイクキャプチャ・ゲートウェイ接続・トランスクリプト状態・
/// 再分析スケジューラを1つにまとめた、キャプチャ開始/停止の
/// ライフサイクルを持つオーケストレータ。
///
/// マイクデバイスとソケット接続はこのセッションが単独で所有する。
/// デバイス状態を変えるのはキャプチャだけ、接続状態を変えるのは
/// ゲートウェイだけ、という単一書き込み者の規律を守る。
pub struct LiveSession {
    audio_config: AudioConfig,
    capture: Option<AudioCapture>,
    gateway: StreamingSession,
    risk_client: RiskApiClient,
    analysis_tx: mpsc::Sender<Result<RiskReport, LiveError>>,
    transcript: TranscriptState,
    scheduler: ReanalysisScheduler,
    report: Option<RiskReport>,
    gateway_state: GatewayState,
    is_streaming: bool,
    language_code: String,
    target_sample_rate: u32,
    start_time: SystemTime,
}

impl LiveSession {
    /// ゲートウェイへ接続してセッションを作成
    ///
    /// 接続はセッション生涯で1回だけ試みる。失敗時のリトライはない。
    ///
    /// # Returns
    /// (セッション, ゲートウェイイベント受信, 分析結果受信) のタプル
    pub fn connect(
        config: &Config,
    ) -> Result<
        (
            Self,
            mpsc::Receiver<GatewayEvent>,
            mpsc::Receiver<Result<RiskReport, LiveError>>,
        ),
        LiveError,
    > {
        let (gateway, event_rx) = StreamingSession::connect(&config.gateway)?;
        let risk_client = RiskApiClient::new(&config.analysis)?;
        let (analysis_tx, analysis_rx) =
            mpsc::channel::<Result<RiskReport, LiveError>>(ANALYSIS_CHANNEL_CAPACITY);

        let session = Self {
            audio_config: config.audio.clone(),
            capture: None,
            gateway,
            risk_client,
            analysis_tx,
            transcript: TranscriptState::new(),
            scheduler: ReanalysisScheduler::new(config.analysis.min_chars),
            report: None,
            gateway_state: GatewayState::Idle,
            is_streaming: false,
            language_code: config.gateway.language_code.clone(),
            target_sample_rate: config.gateway.sample_rate,
            start_time: SystemTime::now(),
        };

        Ok((session, event_rx, analysis_rx))
    }

    /// キャプチャを開始
    ///
    /// 接続済みかつ未配信のときだけ有効。それ以外は何もしない
    /// （キューイングもしない）。デバイス取得に失敗した場合は
    /// `MicrophoneUnavailable` を返し、start制御メッセージは送られない。
    pub fn start_capture(&mut self, tx: mpsc::Sender<AudioBlock>) -> Result<(), LiveError> {
        if self.is_streaming || !self.gateway.is_connected() {
            log::warn!(
                "キャプチャを開始できません (streaming={}, connected={})",
                self.is_streaming,
                self.gateway.is_connected()
            );
            return Ok(());
        }

        // 新しいキャプチャセッションの開始で状態を初期化
        self.transcript.reset();
        self.report = None;

        // デバイスを先に取得する。失敗したらstartは送らない
        let mut capture = AudioCapture::new(&self.audio_config)?;

        self.gateway.send_control(ControlMessage::Start {
            language_code: self.language_code.clone(),
            sample_rate_hertz: self.target_sample_rate,
        });
        self.is_streaming = true;
        self.start_time = SystemTime::now();

        if let Err(e) = capture.start(tx) {
            self.capture = Some(capture);
            self.stop_capture(true);
            return Err(e);
        }

        self.capture = Some(capture);
        log::info!("ライブ配信を開始しました");

        Ok(())
    }

    /// 音声ブロックを処理して送信
    ///
    /// 停止直前にキューイングされていたブロックは、配信フラグを
    /// 先頭で読んで破棄する。リサンプリング→PCM化→バイナリフレーム送信。
    pub fn handle_block(&mut self, block: AudioBlock) {
        if !self.is_streaming {
            return;
        }

        let downsampled =
            resampler::downsample(&block.samples, block.sample_rate, self.target_sample_rate);
        let pcm16 = pcm::encode_i16(&downsampled);

        if self.gateway.is_connected() {
            self.gateway.send_audio(pcm::to_le_bytes(&pcm16));
        }
    }

    /// キャプチャを停止
    ///
    /// フラグを先に降ろし、デバイスを解放する。接続が生きていて
    /// `notify_server` が真のときだけstop制御メッセージを送る。
    /// 異常切断からの呼び出しでは `notify_server=false`
    /// （チャンネルはすでに失われている）。
    pub fn stop_capture(&mut self, notify_server: bool) {
        self.is_streaming = false;

        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }

        if notify_server && self.gateway.is_connected() {
            self.gateway.send_control(ControlMessage::Stop);
        }
    }

    /// ゲートウェイイベントを1件処理
    ///
    /// 文字起こしイベントの場合は表示用セグメントを返す。
    /// イベントは到着順に最後まで適用される。
    pub fn handle_event(&mut self, event: GatewayEvent) -> Option<TranscriptSegment> {
        match event {
            GatewayEvent::Status(state) => {
                log::info!("ゲートウェイ状態: {}", state.as_str());
                self.gateway_state = state;
                None
            }
            GatewayEvent::Transcript { text, is_partial } => {
                self.transcript.apply(&text, is_partial);
                Some(TranscriptSegment::new(text, is_partial, self.start_time))
            }
            GatewayEvent::Error(message) => {
                log::error!("{}", LiveError::Transport(message));
                self.stop_capture(false);
                None
            }
            GatewayEvent::Disconnected => {
                log::warn!("ゲートウェイから切断されました");
                if self.is_streaming {
                    // 配信はトランスポートより長生きできない。
                    // ローカル停止を強制し、stopは送らない
                    self.stop_capture(false);
                }
                None
            }
        }
    }

    /// 再分析の定期ティック
    ///
    /// 発火条件を満たした場合、分析リクエストをバックグラウンドで
    /// 送出する。結果は分析結果チャンネルに届く。
    pub fn tick(&mut self) {
        let final_text = self.transcript.final_text().to_string();
        if !self.scheduler.should_analyze(&final_text) {
            return;
        }
        self.dispatch_analysis(final_text);
    }

    /// 手動の分析トリガー
    ///
    /// 閾値と重複排除は迂回するが、確定トランスクリプトが空なら
    /// 何もしない。
    pub fn analyze_now(&mut self) {
        let final_text = self.transcript.final_text().to_string();
        if !self.scheduler.should_analyze_manual(&final_text) {
            log::warn!("確定トランスクリプトが空のため分析しません");
            return;
        }
        self.dispatch_analysis(final_text);
    }

    fn dispatch_analysis(&mut self, final_text: String) {
        // 飛行中のリクエストと同一テキストへの二重発火を防ぐため、
        // 送出前に重複排除キーを更新する
        self.scheduler.mark_dispatched(&final_text);

        let client = self.risk_client.clone();
        let tx = self.analysis_tx.clone();

        tokio::spawn(async move {
            let result = client.analyze_text(&final_text).await;
            let _ = tx.send(result).await;
        });
    }

    /// 分析結果を反映
    ///
    /// 成功時はレポートを置き換えて返す。失敗時は前回のレポートを
    /// 保持したままエラーをログに残す（自動リトライはしない）。
    pub fn apply_analysis(
        &mut self,
        result: Result<RiskReport, LiveError>,
    ) -> Option<&RiskReport> {
        match result {
            Ok(report) => {
                log::info!(
                    "リスクレポート更新: score={}, level={:?}",
                    report.risk_score,
                    report.risk_level
                );
                self.report = Some(report);
                self.report.as_ref()
            }
            Err(e) => {
                log::error!("{}", e);
                None
            }
        }
    }

    /// セッションを終了
    pub fn close(&mut self) {
        self.stop_capture(true);
        self.gateway.close();
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn is_connected(&self) -> bool {
        self.gateway.is_connected()
    }

    pub fn gateway_state(&self) -> GatewayState {
        self.gateway_state
    }

    pub fn final_transcript(&self) -> &str {
        self.transcript.final_text()
    }

    pub fn partial_transcript(&self) -> &str {
        self.transcript.partial()
    }

    pub fn report(&self) -> Option<&RiskReport> {
        self.report.as_ref()
    }

    /// デバイスなしで配信状態に入る（テスト用）
    #[cfg(test)]
    fn start_streaming_without_device(&mut self) {
        self.transcript.reset();
        self.report = None;
        self.gateway.send_control(ControlMessage::Start {
            language_code: self.language_code.clone(),
            sample_rate_hertz: self.target_sample_rate,
        });
        self.is_streaming = true;
        self.start_time = SystemTime::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalysisConfig, GatewayConfig};
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;
    use tiny_http::{Header, Response, Server};
    use tokio::time::timeout;
    use tungstenite::{Message, WebSocket};

    fn test_config(ws_port: u16, http_port: u16) -> Config {
        Config {
            gateway: GatewayConfig {
                url: format!("ws://127.0.0.1:{}/stream", ws_port),
                language_code: "en-US".to_string(),
                sample_rate: 16000,
                connect_timeout_secs: 5,
                read_timeout_ms: 10,
            },
            analysis: AnalysisConfig {
                live_endpoint: format!("http://127.0.0.1:{}/analyze-text", http_port),
                min_chars: 5,
                timeout_seconds: 5,
                ..AnalysisConfig::default()
            },
            ..Config::default()
        }
    }

    fn json_header() -> Header {
        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap()
    }

    /// 1リクエストだけ処理する分析エンドポイント代替。受信ボディを返す
    fn spawn_analysis_stub() -> (u16, std::thread::JoinHandle<String>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();

        let handle = std::thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let mut body = String::new();
            request.as_reader().read_to_string(&mut body).unwrap();

            let response = Response::from_string(
                r#"{"risk_score": 70, "risk_level": "high", "summary": "Payment pressure."}"#,
            )
            .with_header(json_header());
            request.respond(response).unwrap();

            body
        });

        (port, handle)
    }

    fn spawn_gateway<F, R>(handler: F) -> (u16, std::thread::JoinHandle<R>)
    where
        F: FnOnce(&mut WebSocket<TcpStream>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut socket = tungstenite::accept(stream).unwrap();
            handler(&mut socket)
        });

        (port, handle)
    }

    fn block_of(value: f32) -> AudioBlock {
        AudioBlock {
            samples: vec![value; 320],
            sample_rate: 16000,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_capture_transcribe_analyze() {
        // ゲートウェイ代替: start検証 → 5ブロック受信 → 文字起こしを返す
        let (ws_port, gateway_handle) = spawn_gateway(|socket| {
            let start = socket.read().unwrap().into_text().unwrap();
            let parsed: serde_json::Value = serde_json::from_str(start.as_str()).unwrap();
            assert_eq!(parsed["type"], "start");
            assert_eq!(parsed["sampleRateHertz"], 16000);

            // 5ブロックが送信順に届く（先頭サンプルが単調増加）
            let mut previous = i16::MIN;
            for _ in 0..5 {
                match socket.read().unwrap() {
                    Message::Binary(bytes) => {
                        let first = i16::from_le_bytes([bytes[0], bytes[1]]);
                        assert!(first > previous);
                        previous = first;
                    }
                    other => panic!("unexpected frame: {:?}", other),
                }
            }

            socket
                .send(Message::text(
                    r#"{"type":"transcript","text":"hello wor","isPartial":true}"#,
                ))
                .unwrap();
            socket
                .send(Message::text(
                    r#"{"type":"transcript","text":"hello world","isPartial":false}"#,
                ))
                .unwrap();
        });

        let (http_port, analysis_handle) = spawn_analysis_stub();
        let config = test_config(ws_port, http_port);

        let (mut session, mut event_rx, mut analysis_rx) = LiveSession::connect(&config).unwrap();
        session.start_streaming_without_device();
        assert!(session.is_streaming());

        // 5ブロックを順に処理（先頭サンプルが単調増加）
        for value in [0.1, 0.2, 0.3, 0.4, 0.5] {
            session.handle_block(block_of(value));
        }

        // 部分→確定の2イベントを受信
        for _ in 0..2 {
            let event = timeout(Duration::from_secs(5), event_rx.recv())
                .await
                .unwrap()
                .unwrap();
            session.handle_event(event);
        }

        assert_eq!(session.partial_transcript(), "");
        assert_eq!(session.final_transcript(), "hello world");

        // ティックで分析が1回だけ発火する
        session.tick();
        let result = timeout(Duration::from_secs(5), analysis_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let report = session.apply_analysis(result).unwrap();
        assert_eq!(report.risk_score, 70);

        // 送信されたボディは確定トランスクリプトそのもの
        let body = analysis_handle.join().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["text"], "hello world");

        // 2回目のティックは重複排除でスキップされる
        session.tick();
        assert!(
            timeout(Duration::from_millis(300), analysis_rx.recv())
                .await
                .is_err(),
            "同一テキストに対して分析が二重発火した"
        );

        gateway_handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_during_streaming_forces_local_stop() {
        let (ws_port, gateway_handle) = spawn_gateway(|socket| {
            // startを受信した後、クローズハンドシェイクなしで接続を破棄する
            let _ = socket.read().unwrap();
        });

        // 分析エンドポイントは使われない
        let config = test_config(ws_port, 1);

        let (mut session, mut event_rx, _analysis_rx) = LiveSession::connect(&config).unwrap();
        session.start_streaming_without_device();
        assert!(session.is_streaming());

        gateway_handle.join().unwrap();

        // 切断イベントが届き、配信がローカル停止される
        loop {
            let event = timeout(Duration::from_secs(5), event_rx.recv())
                .await
                .unwrap()
                .unwrap();
            let disconnected = matches!(event, GatewayEvent::Disconnected);
            session.handle_event(event);
            if disconnected {
                break;
            }
        }

        assert!(!session.is_streaming());
        assert!(!session.is_connected());

        // 停止後のブロックは破棄される（パニックせず、送信もされない）
        session.handle_block(block_of(0.1));
    }

    #[tokio::test]
    async fn test_gateway_error_stops_capture_without_stop_message() {
        let (ws_port, gateway_handle) = spawn_gateway(|socket| {
            // startを読んでからエラーイベントを返す
            let _ = socket.read().unwrap();
            socket
                .send(Message::text(
                    r#"{"type":"error","message":"upstream failed"}"#,
                ))
                .unwrap();

            // stopメッセージも音声フレームも届かないことを確認
            socket
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(300)))
                .unwrap();
            match socket.read() {
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    true
                }
                other => panic!("unexpected frame after error: {:?}", other),
            }
        });

        let config = test_config(ws_port, 1);
        let (mut session, mut event_rx, _analysis_rx) = LiveSession::connect(&config).unwrap();
        session.start_streaming_without_device();

        let event = timeout(Duration::from_secs(5), event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        match &event {
            GatewayEvent::Error(message) => assert_eq!(message, "upstream failed"),
            other => panic!("unexpected event: {:?}", other),
        }
        session.handle_event(event);

        // エラーでローカル停止。接続自体は生きている
        assert!(!session.is_streaming());
        assert!(session.is_connected());

        // 停止後のブロックは送信されない（サーバー側のタイムアウトで検証）
        session.handle_block(block_of(0.1));

        assert!(gateway_handle.join().unwrap());
    }

    #[tokio::test]
    async fn test_start_capture_noop_when_already_streaming() {
        let (ws_port, _gateway_handle) = spawn_gateway(|socket| {
            // 接続を維持する
            socket
                .get_ref()
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            while socket.read().is_ok() {}
        });

        let config = test_config(ws_port, 1);
        let (mut session, _event_rx, _analysis_rx) = LiveSession::connect(&config).unwrap();
        session.start_streaming_without_device();

        // すでに配信中の開始要求は何もしない（デバイス取得も行われない）
        let (tx, _rx) = mpsc::channel(8);
        assert!(session.start_capture(tx).is_ok());
        assert!(session.is_streaming());
    }

    #[tokio::test]
    async fn test_analyze_now_noop_on_empty_transcript() {
        let (ws_port, _gateway_handle) = spawn_gateway(|socket| {
            socket
                .get_ref()
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            while socket.read().is_ok() {}
        });

        let config = test_config(ws_port, 1);
        let (mut session, _event_rx, mut analysis_rx) = LiveSession::connect(&config).unwrap();

        // 確定トランスクリプトが空のままの手動トリガーは何もしない
        session.analyze_now();
        assert!(
            timeout(Duration::from_millis(300), analysis_rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_failed_analysis_keeps_previous_report() {
        let (ws_port, _gateway_handle) = spawn_gateway(|socket| {
            socket
                .get_ref()
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            while socket.read().is_ok() {}
        });

        let config = test_config(ws_port, 1);
        let (mut session, _event_rx, _analysis_rx) = LiveSession::connect(&config).unwrap();

        let previous: RiskReport = serde_json::from_str(
            r#"{"risk_score": 10, "risk_level": "low", "summary": "previous"}"#,
        )
        .unwrap();
        session.apply_analysis(Ok(previous));

        // 失敗結果を適用しても前回のレポートが残る
        let updated = session.apply_analysis(Err(LiveError::AnalysisRequestFailed(
            "connection refused".to_string(),
        )));
        assert!(updated.is_none());
        assert_eq!(session.report().unwrap().risk_score, 10);
    }
}
