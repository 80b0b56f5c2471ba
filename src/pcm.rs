/// 浮動小数点サンプルを16ビット符号付きPCMへ変換
///
/// 各サンプルを -1.0 ～ 1.0 にクランプした後、負値は 32768 倍、
/// 非負値は 32767 倍する（2の補数表現の非対称なレンジに合わせる）。
/// 全域で定義された純粋関数でエラーは発生しない。
///
/// # Examples
///
/// ```
/// # use trustcheck_live::pcm::encode_i16;
/// assert_eq!(encode_i16(&[1.0, -1.0, 0.0]), vec![32767, -32768, 0]);
/// ```
pub fn encode_i16(input: &[f32]) -> Vec<i16> {
    input
        .iter()
        .map(|&sample| {
            let s = sample.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0) as i16
            } else {
                (s * 32767.0) as i16
            }
        })
        .collect()
}

/// PCMサンプル列をリトルエンディアンのバイト列へ変換
///
/// ゲートウェイへのバイナリフレームのペイロード形式。
pub fn to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}
