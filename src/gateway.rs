use crate::config::GatewayConfig;
use crate::error::LiveError;
use crate::types::{ControlMessage, GatewayState, ServerMessage};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tungstenite::{Message, WebSocket};

/// イベントチャンネルの容量
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// ゲートウェイへ送信するフレーム
#[derive(Debug)]
pub enum OutboundFrame {
    /// JSON制御メッセージ（テキストフレーム）
    Control(ControlMessage),
    /// リトルエンディアン16bit PCM（バイナリフレーム）
    Audio(Vec<u8>),
    /// 切断要求
    Close,
}

/// ゲートウェイから受信したイベント
#[derive(Clone, Debug)]
pub enum GatewayEvent {
    /// サーバーが報告するセッション状態の更新
    Status(GatewayState),
    /// 文字起こし結果
    Transcript { text: String, is_partial: bool },
    /// ゲートウェイ側のエラー
    Error(String),
    /// トランスポートレベルの切断（1回だけ通知される）
    Disconnected,
}

/// プレーンTCPまたはTLS上のゲートウェイストリーム
enum GatewayStream {
    Plain(TcpStream),
    Tls(native_tls::TlsStream<TcpStream>),
}

impl GatewayStream {
    fn tcp(&self) -> &TcpStream {
        match self {
            GatewayStream::Plain(stream) => stream,
            GatewayStream::Tls(stream) => stream.get_ref(),
        }
    }
}

impl Read for GatewayStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            GatewayStream::Plain(stream) => stream.read(buf),
            GatewayStream::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for GatewayStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            GatewayStream::Plain(stream) => stream.write(buf),
            GatewayStream::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            GatewayStream::Plain(stream) => stream.flush(),
            GatewayStream::Tls(stream) => stream.flush(),
        }
    }
}

/// 文字起こしゲートウェイへの永続接続
///
/// 接続はページ（セッション）毎に1回だけ確立し、複数回の
/// キャプチャ開始/停止サイクルで使い回す。接続失敗時のリトライは
/// 行わない。切断イベントで状態が落ちるだけである。
///
/// ソケットスレッドが送信キューの排出とタイムアウト付き読み取りを
/// 交互に行い、受信イベントをtokioチャンネルへ流す。
pub struct StreamingSession {
    command_tx: crossbeam_channel::Sender<OutboundFrame>,
    connected: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamingSession {
    /// ゲートウェイへ接続してセッションを開始
    ///
    /// # Returns
    /// (セッション, イベント受信チャンネル) のタプル
    pub fn connect(
        config: &GatewayConfig,
    ) -> Result<(Self, mpsc::Receiver<GatewayEvent>), LiveError> {
        let socket = Self::open_socket(config)?;

        let (command_tx, command_rx) = crossbeam_channel::unbounded::<OutboundFrame>();
        let (event_tx, event_rx) = mpsc::channel::<GatewayEvent>(EVENT_CHANNEL_CAPACITY);

        let connected = Arc::new(AtomicBool::new(true));
        let connected_clone = Arc::clone(&connected);

        let handle = std::thread::Builder::new()
            .name("gateway-socket".to_string())
            .spawn(move || {
                run_socket_loop(socket, command_rx, event_tx, connected_clone);
            })
            .map_err(|e| LiveError::GatewayConnect(e.to_string()))?;

        log::info!("ゲートウェイに接続しました: {}", config.url);

        Ok((
            Self {
                command_tx,
                connected,
                handle: Some(handle),
            },
            event_rx,
        ))
    }

    /// TCP接続・TLSハンドシェイク・WebSocketハンドシェイクを行う
    fn open_socket(config: &GatewayConfig) -> Result<WebSocket<GatewayStream>, LiveError> {
        let url = url::Url::parse(&config.url)
            .map_err(|e| LiveError::GatewayConnect(format!("URLが不正です: {}", e)))?;

        let host = url
            .host_str()
            .ok_or_else(|| LiveError::GatewayConnect("URLにホストがありません".to_string()))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| LiveError::GatewayConnect("ポートを決定できません".to_string()))?;
        let use_tls = url.scheme() == "wss";

        use std::net::ToSocketAddrs;
        let addr = format!("{}:{}", host, port)
            .to_socket_addrs()
            .map_err(|e| LiveError::GatewayConnect(e.to_string()))?
            .next()
            .ok_or_else(|| {
                LiveError::GatewayConnect(format!("ホスト名を解決できません: {}", host))
            })?;

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let tcp_stream = TcpStream::connect_timeout(&addr, connect_timeout)
            .map_err(|e| LiveError::GatewayConnect(e.to_string()))?;

        // ハンドシェイク中は長めのタイムアウトを使う
        tcp_stream
            .set_read_timeout(Some(connect_timeout))
            .map_err(|e| LiveError::GatewayConnect(e.to_string()))?;
        tcp_stream
            .set_write_timeout(Some(connect_timeout))
            .map_err(|e| LiveError::GatewayConnect(e.to_string()))?;
        tcp_stream
            .set_nodelay(true)
            .map_err(|e| LiveError::GatewayConnect(e.to_string()))?;

        let stream = if use_tls {
            let connector = native_tls::TlsConnector::new()
                .map_err(|e| LiveError::GatewayConnect(e.to_string()))?;
            let tls_stream = connector
                .connect(&host, tcp_stream)
                .map_err(|e| LiveError::GatewayConnect(e.to_string()))?;
            GatewayStream::Tls(tls_stream)
        } else {
            GatewayStream::Plain(tcp_stream)
        };

        let (socket, _response) = tungstenite::client::client(config.url.as_str(), stream)
            .map_err(|e| LiveError::GatewayConnect(e.to_string()))?;

        // 接続後はソケットスレッドの周期に合わせた短い読み取りタイムアウトに切り替える
        socket
            .get_ref()
            .tcp()
            .set_read_timeout(Some(Duration::from_millis(config.read_timeout_ms)))
            .map_err(|e| LiveError::GatewayConnect(e.to_string()))?;

        Ok(socket)
    }

    /// 接続中かどうか
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// 制御メッセージを送信キューへ投入
    pub fn send_control(&self, message: ControlMessage) {
        self.send(OutboundFrame::Control(message));
    }

    /// PCMバイト列をバイナリフレームとして送信キューへ投入
    pub fn send_audio(&self, bytes: Vec<u8>) {
        self.send(OutboundFrame::Audio(bytes));
    }

    fn send(&self, frame: OutboundFrame) {
        if let Err(e) = self.command_tx.send(frame) {
            log::warn!("ゲートウェイ送信キューへの投入失敗: {}", e);
        }
    }

    /// 接続を閉じてソケットスレッドの終了を待つ
    pub fn close(&mut self) {
        self.send(OutboundFrame::Close);

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("ソケットスレッドの終了待機に失敗");
            }
        }
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// ソケットスレッドのメインループ
///
/// 送信キューの排出とタイムアウト付き読み取りを交互に繰り返す。
/// 読み取りタイムアウトが実質的なループ周期になる。
fn run_socket_loop(
    mut socket: WebSocket<GatewayStream>,
    command_rx: crossbeam_channel::Receiver<OutboundFrame>,
    event_tx: mpsc::Sender<GatewayEvent>,
    connected: Arc<AtomicBool>,
) {
    loop {
        // 1. 送信キューを排出
        while let Ok(frame) = command_rx.try_recv() {
            let result = match frame {
                OutboundFrame::Control(message) => match serde_json::to_string(&message) {
                    Ok(json) => socket.send(Message::text(json)),
                    Err(e) => {
                        log::error!("制御メッセージのシリアライズ失敗: {}", e);
                        Ok(())
                    }
                },
                OutboundFrame::Audio(bytes) => socket.send(Message::binary(bytes)),
                OutboundFrame::Close => {
                    log::debug!("ゲートウェイ接続をクローズします");
                    let _ = socket.close(None);
                    finish(&connected, &event_tx);
                    return;
                }
            };

            if let Err(e) = result {
                log::warn!("ゲートウェイへの送信失敗: {}", e);
                finish(&connected, &event_tx);
                return;
            }
        }

        // 2. 受信（タイムアウト付き）
        match socket.read() {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(text.as_str())
            {
                Ok(message) => dispatch_server_message(message, &event_tx),
                Err(e) => {
                    log::warn!("ゲートウェイメッセージのパース失敗: {} ({})", e, text);
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = socket.send(Message::Pong(payload));
            }
            Ok(Message::Close(_)) => {
                log::info!("ゲートウェイが接続を閉じました");
                finish(&connected, &event_tx);
                return;
            }
            Ok(other) => {
                log::debug!("ゲートウェイからの未処理フレーム: {:?}", other);
            }
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // 読み取りタイムアウト。送信キューの確認に戻る
            }
            Err(e) => {
                log::warn!("ゲートウェイ接続が切断されました: {}", e);
                finish(&connected, &event_tx);
                return;
            }
        }
    }
}

/// 受信メッセージをイベントへ変換して通知
fn dispatch_server_message(message: ServerMessage, event_tx: &mpsc::Sender<GatewayEvent>) {
    let event = match message {
        ServerMessage::Status { state } => GatewayEvent::Status(state),
        ServerMessage::Transcript { text, is_partial } => {
            GatewayEvent::Transcript { text, is_partial }
        }
        ServerMessage::Error { message } => GatewayEvent::Error(message),
    };

    if let Err(e) = event_tx.try_send(event) {
        log::warn!("ゲートウェイイベントの通知失敗: {}", e);
    }
}

/// 切断状態へ落として1回だけDisconnectedを通知
fn finish(connected: &AtomicBool, event_tx: &mpsc::Sender<GatewayEvent>) {
    if connected.swap(false, Ordering::SeqCst) {
        if event_tx.try_send(GatewayEvent::Disconnected).is_err() {
            log::warn!("切断イベントの通知失敗");
        }
    }
}
