/// ブロック平均によるダウンサンプリング
///
/// 入力インデックス空間に出力サンプル毎の境界
/// `round((i+1) * input_rate / output_rate)` を取り、現在のカーソルから
/// 境界（手前）までの未消費サンプルの算術平均を出力サンプルとする。
/// 1パス・O(N)・先読みなしのボックスフィルタ間引きで、
/// ストリーミング処理向けの単純な実装。スペクトル特性は理想的ではない。
///
/// レートが一致する場合は入力をそのまま返す。
/// 境界が入力長を超えた場合は入力末尾で打ち切る
/// （最後の出力サンプルは平均に使うソースサンプルが少なくなる）。
///
/// # Examples
///
/// ```
/// # use trustcheck_live::resampler::downsample;
/// let input = vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
/// let output = downsample(&input, 8, 4);
/// assert_eq!(output, vec![0.5, 0.5, 0.5, 0.5]);
/// ```
pub fn downsample(input: &[f32], input_rate: u32, output_rate: u32) -> Vec<f32> {
    if input_rate == output_rate {
        return input.to_vec();
    }

    let ratio = input_rate as f64 / output_rate as f64;
    let output_len = (input.len() as f64 / ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);

    let mut cursor = 0usize;
    for i in 0..output_len {
        let next_boundary = ((i + 1) as f64 * ratio).round() as usize;
        let start = cursor.min(input.len());
        let end = next_boundary.min(input.len());

        if end > start {
            let sum: f32 = input[start..end].iter().sum();
            output.push(sum / (end - start) as f32);
        } else {
            // 空ウィンドウはカーソル位置のサンプルを繰り返す
            // (output_rate > input_rate のときのみ到達する)
            output.push(input.get(start).copied().unwrap_or(0.0));
        }

        cursor = next_boundary;
    }

    output
}
