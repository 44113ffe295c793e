//! ドメイン Entity とワイヤー DTO（`tayori_shared::protocol`）の相互変換

use tayori_shared::protocol as dto;

use crate::domain::{
    ClientMessageId, DeliveryResult, DeliveryStatus, Envelope, MessageContent, PresenceChange,
    StoredMessage, UserId, ValueObjectError,
};

// ========================================
// DTO → Domain Entity
// ========================================

impl TryFrom<dto::MessageContentDto> for MessageContent {
    type Error = ValueObjectError;

    fn try_from(dto: dto::MessageContentDto) -> Result<Self, Self::Error> {
        MessageContent::new(dto.text, dto.image)
    }
}

/// クライアントから届いた送信要求をドメインの Envelope に変換する
///
/// 送信者は認証済みの接続から決まるため、フレームの中身は信用しない。
pub fn envelope_from_dto(
    sender_id: UserId,
    dto: dto::OutboundEnvelope,
) -> Result<Envelope, ValueObjectError> {
    Ok(Envelope {
        client_message_id: ClientMessageId::new(dto.client_message_id)?,
        sender_id,
        receiver_id: UserId::new(dto.receiver_id)?,
        content: dto.content.try_into()?,
    })
}

// ========================================
// Domain Entity → DTO
// ========================================

impl From<MessageContent> for dto::MessageContentDto {
    fn from(model: MessageContent) -> Self {
        let (text, image) = model.into_parts();
        Self { text, image }
    }
}

impl From<DeliveryStatus> for dto::DeliveryStatus {
    fn from(model: DeliveryStatus) -> Self {
        match model {
            DeliveryStatus::Delivered => dto::DeliveryStatus::Delivered,
            DeliveryStatus::StoredOffline => dto::DeliveryStatus::StoredOffline,
            DeliveryStatus::DuplicateSuppressed => dto::DeliveryStatus::DuplicateSuppressed,
        }
    }
}

impl From<DeliveryResult> for dto::DeliveryReceipt {
    fn from(model: DeliveryResult) -> Self {
        Self {
            client_message_id: model.client_message_id.into_string(),
            delivery_id: model.delivery_id.into_string(),
            record_id: model.record_id.into_string(),
            created_at: model.created_at.value(),
            status: model.status.into(),
        }
    }
}

impl From<PresenceChange> for dto::RosterEntry {
    fn from(model: PresenceChange) -> Self {
        Self {
            user_id: model.user_id.into_string(),
            online: model.online,
            version: model.version,
        }
    }
}

impl From<StoredMessage> for dto::StoredMessageDto {
    fn from(model: StoredMessage) -> Self {
        Self {
            record_id: model.record_id.into_string(),
            sender_id: model.sender_id.into_string(),
            receiver_id: model.receiver_id.into_string(),
            content: model.content.into(),
            created_at: model.created_at.value(),
        }
    }
}

/// 受信者（と送信者の他の接続）へ配る `message-new` の中身を組み立てる
pub fn delivered_message(envelope: &Envelope, result: &DeliveryResult) -> dto::DeliveredMessage {
    dto::DeliveredMessage {
        delivery_id: result.delivery_id.as_str().to_string(),
        client_message_id: envelope.client_message_id.as_str().to_string(),
        record_id: result.record_id.as_str().to_string(),
        sender_id: envelope.sender_id.as_str().to_string(),
        receiver_id: envelope.receiver_id.as_str().to_string(),
        content: envelope.content.clone().into(),
        created_at: result.created_at.value(),
    }
}
