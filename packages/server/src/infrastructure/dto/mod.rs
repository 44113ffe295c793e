//! Data Transfer Objects
//!
//! WebSocket のフレームは `tayori_shared::protocol` に定義されており、
//! ここにはドメインとの変換と HTTP 専用のレスポンス型を置きます。
//! - `conversion`: ドメイン Entity ⇔ プロトコル DTO
//! - `http`: HTTP API レスポンス DTO

pub mod conversion;
pub mod http;
