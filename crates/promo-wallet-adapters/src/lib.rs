pub mod config;
pub mod dev_chain;
pub mod eip1193;
pub mod rpc;
pub mod surface;

pub use config::{RuntimeProfile, WalletConfig};
pub use dev_chain::{DevChain, MinedTx, ReceiptMode};
pub use eip1193::Eip1193Signer;
pub use rpc::{JsonRpcChain, RpcTransport};
pub use surface::{HeadlessSurface, SurfaceEvent, SurfaceListener};
