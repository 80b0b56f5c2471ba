/// 文字起こしの組み立て状態
///
/// ゲートウェイから交互に届く部分/確定イベントを2つの観測値に畳み込む。
///
/// - `partial`: 最新の未確定セグメント。部分イベント毎に全置換され、
///   確定イベントでクリアされる。
/// - `final_text`: 追記専用の確定テキスト。確定セグメントを1個の空白で
///   区切って追記する。新しいキャプチャセッション開始時の明示的な
///   リセット以外で縮むことはない。
///
/// # Examples
///
/// ```
/// # use trustcheck_live::transcript::TranscriptState;
/// let mut state = TranscriptState::new();
/// state.apply("hel", true);
/// state.apply("hello", true);
/// assert_eq!(state.partial(), "hello");
///
/// state.apply("hello world", false);
/// assert_eq!(state.partial(), "");
/// assert_eq!(state.final_text(), "hello world");
/// ```
#[derive(Clone, Debug, Default)]
pub struct TranscriptState {
    partial: String,
    final_text: String,
}

impl TranscriptState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 受信した文字起こしイベントを1件適用
    ///
    /// 部分イベントは `partial` を置換する。非空の確定イベントは
    /// `partial` をクリアし、`final_text` へ空白区切りで追記する。
    /// 空の確定イベントは何も変更しない（`partial` も残る）。
    pub fn apply(&mut self, text: &str, is_partial: bool) {
        if is_partial {
            self.partial = text.to_string();
        } else if !text.is_empty() {
            self.partial.clear();
            let segment = text.trim();
            if self.final_text.is_empty() {
                self.final_text = segment.to_string();
            } else {
                self.final_text = format!("{} {}", self.final_text.trim(), segment)
                    .trim()
                    .to_string();
            }
        }
    }

    /// 新しいキャプチャセッションの開始時に状態を初期化
    pub fn reset(&mut self) {
        self.partial.clear();
        self.final_text.clear();
    }

    pub fn partial(&self) -> &str {
        &self.partial
    }

    pub fn final_text(&self) -> &str {
        &self.final_text
    }
}
