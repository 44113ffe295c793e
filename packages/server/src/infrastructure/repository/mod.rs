//! Repository 実装
//!
//! - `inmemory`: プロセス内メモリを使った実装（開発・テスト用）

pub mod inmemory;

pub use inmemory::{InMemoryMessageRepository, InMemoryUserDirectory};
