use crate::config::AudioConfig;
use crate::error::LiveError;
use crate::types::AudioBlock;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SizedSample};
use regex_lite::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// マイクデバイスからの音声キャプチャ
///
/// デバイスを排他的に保持し、ネイティブレートの固定長ブロックを
/// 生成し続ける。コールバックは cpal のオーディオスレッドから届くため、
/// 停止判定には `active` フラグをコールバック先頭で毎回読む。
/// ストリームの unsubscribe 自体が非同期なので、フラグなしでは
/// 停止後にブロックが流れてしまう。
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    stream: Option<cpal::Stream>,
    active: Arc<AtomicBool>,
    num_channels: u16,
}

impl AudioCapture {
    /// 新しいAudioCaptureを作成
    ///
    /// デバイスの取得に失敗した場合（権限拒否・デバイス不在）は
    /// `LiveError::MicrophoneUnavailable` を返し、キャプチャは開始しない。
    pub fn new(config: &AudioConfig) -> Result<Self, LiveError> {
        let host = cpal::default_host();

        // デバイスを取得
        let device = if config.device_id == "default" {
            host.default_input_device().ok_or_else(|| {
                LiveError::MicrophoneUnavailable(
                    "デフォルト入力デバイスが見つかりません".to_string(),
                )
            })?
        } else {
            // デバイスIDが指定されている場合は、デバイス一覧から検索
            Self::input_devices()
                .map_err(|e| LiveError::MicrophoneUnavailable(e.to_string()))?
                .into_iter()
                .find(|d| d.name().ok().as_deref() == Some(&config.device_id))
                .ok_or_else(|| {
                    LiveError::MicrophoneUnavailable(format!(
                        "デバイスが見つかりません: {}",
                        config.device_id
                    ))
                })?
        };

        log::info!("入力デバイス: {:?}", device.name());

        // デバイスの設定を取得
        let default_config = device
            .default_input_config()
            .map_err(|e| LiveError::MicrophoneUnavailable(e.to_string()))?;

        log::info!(
            "デバイス設定: {:?}, {}Hz, {}ch",
            default_config.sample_format(),
            default_config.sample_rate().0,
            default_config.channels()
        );

        // ネイティブレートのままキャプチャする（リサンプリングは下流で行う）
        let num_channels = default_config.channels();
        let stream_config = cpal::StreamConfig {
            channels: num_channels,
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(config.block_size),
        };

        Ok(Self {
            device,
            config: stream_config,
            stream: None,
            active: Arc::new(AtomicBool::new(false)),
            num_channels,
        })
    }

    /// デバイスのネイティブサンプリングレート (Hz)
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// キャプチャ中かどうか
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// ストリームを開始
    ///
    /// すでにキャプチャ中の場合は何もしない（キューイングもしない）。
    ///
    /// # Arguments
    /// * `tx` - 音声ブロックの送信チャンネル
    pub fn start(&mut self, tx: mpsc::Sender<AudioBlock>) -> Result<(), LiveError> {
        if self.active.load(Ordering::SeqCst) {
            log::warn!("キャプチャはすでに開始されています");
            return Ok(());
        }

        // デバイスのデフォルトフォーマットを取得
        let default_config = self
            .device
            .default_input_config()
            .map_err(|e| LiveError::MicrophoneUnavailable(e.to_string()))?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.build_stream::<f32>(tx)?,
            cpal::SampleFormat::I16 => self.build_stream::<i16>(tx)?,
            cpal::SampleFormat::U16 => self.build_stream::<u16>(tx)?,
            cpal::SampleFormat::I32 => self.build_stream::<i32>(tx)?,
            other => {
                return Err(LiveError::MicrophoneUnavailable(format!(
                    "サポートされていないサンプルフォーマット: {:?}",
                    other
                )))
            }
        };

        // コールバックが届く前にフラグを立てる
        self.active.store(true, Ordering::SeqCst);

        stream
            .play()
            .map_err(|e| LiveError::MicrophoneUnavailable(e.to_string()))?;
        self.stream = Some(stream);

        log::info!("音声キャプチャを開始しました ({}Hz)", self.sample_rate());

        Ok(())
    }

    /// ストリームを構築
    fn build_stream<T>(&self, tx: mpsc::Sender<AudioBlock>) -> Result<cpal::Stream, LiveError>
    where
        T: SizedSample + Sample + Send + 'static,
        <T as Sample>::Float: Into<f32>,
    {
        let num_channels = self.num_channels as usize;
        let sample_rate = self.config.sample_rate.0;
        let active = Arc::clone(&self.active);

        let data_callback = move |data: &[T], _info: &cpal::InputCallbackInfo| {
            // 停止後にキューイング済みのコールバックが届くことがある。
            // ストリーム破棄のタイミングには頼らず、フラグで破棄する。
            if !active.load(Ordering::SeqCst) {
                return;
            }

            // インターリーブされたフレームの先頭チャンネルのみ使用（モノラル）
            let frames = data.len() / num_channels.max(1);
            let mut samples = Vec::with_capacity(frames);
            for frame in 0..frames {
                let idx = frame * num_channels;
                let f: f32 = data[idx].to_float_sample().into();
                samples.push(f);
            }

            let block = AudioBlock {
                samples,
                sample_rate,
            };

            // 非同期送信（ブロッキングしない）
            match tx.try_send(block) {
                Ok(_) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("音声ブロックの送信失敗: バッファ満杯");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::warn!("音声ブロックの送信失敗: チャンネルクローズ");
                }
            }
        };

        let error_callback = move |err| {
            log::error!("ストリームエラー: {}", err);
        };

        let stream = self
            .device
            .build_input_stream(&self.config, data_callback, error_callback, None)
            .map_err(|e| LiveError::MicrophoneUnavailable(e.to_string()))?;

        Ok(stream)
    }

    /// ストリームを停止してデバイスを解放
    ///
    /// フラグを先に降ろしてからストリームを破棄する。
    /// 呼び出し完了後にブロックが配送されることはない。
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);

        if let Some(stream) = self.stream.take() {
            drop(stream);
            log::info!("音声キャプチャを停止しました");
        }
    }

    /// デバイス一覧を表示
    pub fn list_devices() -> Result<()> {
        println!("利用可能な入力デバイス:");
        println!();

        for (idx, device) in Self::input_devices()?.into_iter().enumerate() {
            let name = device.name()?;
            println!("  [{}] {}", idx, name);

            device.supported_input_configs()?.for_each(|config_range| {
                println!(
                    "      フォーマット: {:?}, {}-{}Hz, {}ch",
                    config_range.sample_format(),
                    config_range.min_sample_rate().0,
                    config_range.max_sample_rate().0,
                    config_range.channels()
                );
            });
            println!();
        }

        Ok(())
    }

    /// MacBook Air 本体・WebCam など、通常入力デバイスとして利用してはいけないデバイスを除外したデバイス一覧を取得
    fn input_devices() -> Result<Vec<cpal::Device>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .context("入力デバイス一覧の取得に失敗")?
            .filter(|device| {
                if let Ok(name) = device.name() {
                    let excluded_names_regex = Regex::new("MacBook (Air|Pro)|AirPods|iPhone|Webcam|Background|Microsoft Teams|ZoomAudioDevice").unwrap();
                    !excluded_names_regex.is_match(&name)
                } else {
                    true
                }
            })
            .collect();
        Ok(devices)
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
