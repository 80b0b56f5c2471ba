/// 再分析スケジューラのポリシー
///
/// 確定トランスクリプトを監視し、分析呼び出しを発火してよいかを判定する。
/// 発火条件は次の3つ全て:
///
/// 1. 確定トランスクリプトが非空
/// 2. 文字数が最小閾値以上
/// 3. 前回分析したテキストと異なる
///
/// 重複排除キー (`last_analyzed_text`) はリクエスト送出の直前に
/// 同期的にセットする。完了時ではなく送出時にセットすることで、
/// リクエスト飛行中のタイマーティックが同一テキストに対して
/// 二重発火するのを防ぐ。副作用として、失敗した分析はトランスクリプトが
/// さらに伸びるか手動トリガーがあるまで再試行されない。
pub struct ReanalysisScheduler {
    min_chars: usize,
    last_analyzed_text: String,
}

impl ReanalysisScheduler {
    pub fn new(min_chars: usize) -> Self {
        Self {
            min_chars,
            last_analyzed_text: String::new(),
        }
    }

    /// 定期ティックでの発火判定
    pub fn should_analyze(&self, final_text: &str) -> bool {
        !final_text.is_empty()
            && final_text.chars().count() >= self.min_chars
            && final_text != self.last_analyzed_text
    }

    /// 手動トリガーの発火判定
    ///
    /// 閾値と重複排除は迂回するが、空のトランスクリプトには発火しない。
    pub fn should_analyze_manual(&self, final_text: &str) -> bool {
        !final_text.trim().is_empty()
    }

    /// 分析リクエスト送出の直前に呼ぶ
    pub fn mark_dispatched(&mut self, text: &str) {
        self.last_analyzed_text = text.to_string();
    }

    pub fn last_analyzed_text(&self) -> &str {
        &self.last_analyzed_text
    }
}
