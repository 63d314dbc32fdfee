//! トランスポートの実装
//!
//! ## 概要
//!
//! このモジュールは `TransportReader` / `TransportWriter` trait の具体的な実装を提供します。
//!
//! ## 実装
//!
//! - `websocket`: axum の WebSocket を使った実装

pub mod websocket;

pub use websocket::{WsReader, WsWriter, split};
