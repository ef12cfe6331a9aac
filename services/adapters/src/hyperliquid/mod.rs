//! Hyperliquid copy-trade feeds: WebSocket order updates + mids, and the
//! account-state REST query

mod info;
mod models;
mod stream;

pub use info::HyperliquidInfo;
pub use models::{
    parse_message, AllMids, AssetPosition, BasicOrder, ClearinghouseState, Leverage,
    OrderUpdate, PerpPosition, StreamEvent, WalletPosition,
};
pub use stream::{HyperliquidStream, StreamConfig};
