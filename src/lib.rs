//! dapp-gas: Block Gas Attribution for Ethereum (Address Labeling, Per-Dapp Coverage).

pub mod attribution;
pub mod collector;
pub mod config;
pub mod error;
pub mod labeler;
pub mod labels;
pub mod model;
pub mod report;
pub mod rpc;
pub mod storage;
pub mod util;
