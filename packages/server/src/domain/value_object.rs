//! Value Object 定義
//!
//! ID やメッセージ本文など、生成時にバリデーションを行う不変の値を定義します。

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use super::error::ValueObjectError;

const USER_ID_MAX_LEN: usize = 64;
const ROOM_ID_MAX_LEN: usize = 128;
const CLIENT_MESSAGE_ID_MAX_LEN: usize = 128;
const TEXT_MAX_CHARS: usize = 4000;

fn validate_identifier(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ValueObjectError> {
    if value.is_empty() {
        return Err(ValueObjectError::Empty(field));
    }
    if value.len() > max_len {
        return Err(ValueObjectError::TooLong {
            field,
            max: max_len,
        });
    }
    if value.chars().any(char::is_whitespace) {
        return Err(ValueObjectError::InvalidFormat {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal, $max:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: String) -> Result<Self, ValueObjectError> {
                validate_identifier($field, &value, $max)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValueObjectError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// 認証済みユーザーの ID
    UserId,
    "user_id",
    USER_ID_MAX_LEN
);

string_id!(
    /// ルーム（会話）の ID
    ///
    /// サーバーは中身を解釈しない。1 対 1 の会話では両クライアントが
    /// `tayori_shared::protocol::direct_room_id` で同じ ID を導出する。
    RoomId,
    "room_id",
    ROOM_ID_MAX_LEN
);

string_id!(
    /// クライアントが生成する冪等キー
    ClientMessageId,
    "client_message_id",
    CLIENT_MESSAGE_ID_MAX_LEN
);

/// 接続（トランスポートセッション）の ID
///
/// ハンドシェイク時に `ConnectionIdFactory::generate` で払い出される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// ConnectionId の生成
pub struct ConnectionIdFactory;

impl ConnectionIdFactory {
    pub fn generate() -> ConnectionId {
        ConnectionId(Uuid::new_v4())
    }
}

/// サーバーが払い出す配送 ID（冪等キーごとに 1 つ）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeliveryId(String);

impl DeliveryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for DeliveryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// 永続化層が払い出すレコード ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// メッセージ本文（テキスト・画像参照のどちらか、または両方）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageContent {
    text: Option<String>,
    image: Option<String>,
}

impl MessageContent {
    pub fn new(text: Option<String>, image: Option<String>) -> Result<Self, ValueObjectError> {
        let text = text.filter(|t| !t.trim().is_empty());
        let image = image.filter(|i| !i.trim().is_empty());

        if text.is_none() && image.is_none() {
            return Err(ValueObjectError::EmptyContent);
        }
        if let Some(t) = &text
            && t.chars().count() > TEXT_MAX_CHARS
        {
            return Err(ValueObjectError::TooLong {
                field: "text",
                max: TEXT_MAX_CHARS,
            });
        }

        Ok(Self { text, image })
    }

    pub fn text(text: impl Into<String>) -> Result<Self, ValueObjectError> {
        Self::new(Some(text.into()), None)
    }

    pub fn text_part(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn image_part(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn into_parts(self) -> (Option<String>, Option<String>) {
        (self.text, self.image)
    }
}

/// Unix タイムスタンプ（ミリ秒, UTC）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_rejects_empty_and_whitespace() {
        // テスト項目: 空文字や空白を含むユーザー ID は拒否される
        // given (前提条件):
        let empty = String::new();
        let spaced = "ali ce".to_string();

        // when (操作):
        let empty_result = UserId::new(empty);
        let spaced_result = UserId::new(spaced);

        // then (期待する結果):
        assert_eq!(empty_result, Err(ValueObjectError::Empty("user_id")));
        assert!(matches!(
            spaced_result,
            Err(ValueObjectError::InvalidFormat { field: "user_id", .. })
        ));
    }

    #[test]
    fn test_message_content_requires_text_or_image() {
        // テスト項目: テキストも画像もない本文は拒否され、画像のみは許可される
        // given (前提条件):
        let blank_text = Some("   ".to_string());
        let image = Some("https://img.example/cat.png".to_string());

        // when (操作):
        let blank = MessageContent::new(blank_text, None);
        let image_only = MessageContent::new(None, image);

        // then (期待する結果):
        assert_eq!(blank, Err(ValueObjectError::EmptyContent));
        let content = image_only.unwrap();
        assert_eq!(content.text_part(), None);
        assert_eq!(content.image_part(), Some("https://img.example/cat.png"));
    }

    #[test]
    fn test_message_content_rejects_oversized_text() {
        // テスト項目: 上限を超える長さのテキストは拒否される
        // given (前提条件):
        let text = "あ".repeat(TEXT_MAX_CHARS + 1);

        // when (操作):
        let result = MessageContent::text(text);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ValueObjectError::TooLong {
                field: "text",
                max: TEXT_MAX_CHARS
            })
        );
    }

    #[test]
    fn test_connection_ids_are_unique() {
        // テスト項目: 生成した ConnectionId が重複しない
        // given (前提条件):
        let first = ConnectionIdFactory::generate();

        // when (操作):
        let second = ConnectionIdFactory::generate();

        // then (期待する結果):
        assert_ne!(first, second);
    }
}
