pub mod activity_log;
pub mod app;
pub mod config;
pub mod contract;
pub mod directory;
pub mod error;
pub mod events;
pub mod rpc;
pub mod snapshot;
pub mod subscription;
pub mod synchronizer;
pub mod ui;
pub mod wallet;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use activity_log::{
    ActivityLog,
    ActivityLogEntry,
};
pub use contract::{
    ContractClient,
    LotteryRpc,
};
pub use directory::{
    ContractDescriptor,
    ContractDirectory,
};
pub use error::{
    ClientError,
    RpcFailure,
};
pub use snapshot::{
    LotteryPhase,
    LotterySnapshot,
    RecentWinner,
};
pub use subscription::{
    EventSubscriptionManager,
    SyncHandle,
};
pub use synchronizer::LotterySynchronizer;
pub use wallet::WalletConnector;
