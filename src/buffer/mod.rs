//! Connection Buffers
//!
//! Each connection owns a pair of [`ElasticBuffer`]s:
//!
//! ```text
//!   socket ──read──> [ inbound  ] ──Inbound (Buf)────> TcpHandler
//!   socket <─write── [ outbound ] <─Outbound (BufMut)── TcpHandler
//! ```
//!
//! The inbound buffer is sized one page larger than the outbound one so a
//! full read still leaves room while a partial frame is being compacted.

pub mod elastic;
pub mod view;

pub use elastic::ElasticBuffer;
pub use view::{Inbound, Outbound};
