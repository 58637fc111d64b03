//! Application services: the coordination core — scheduler, worker
//! runtime, rate-limit coordination, merge refinery, and the dispatcher
//! that wires them together into the main control loop.

pub mod conflict_resolver;
pub mod dispatcher;
pub mod merge_queue;
pub mod merger;
pub mod name_pool;
pub mod pool_refinery;
pub mod rate_limit_coordinator;
pub mod rate_limit_detector;
pub mod refinery;
pub mod scheduler;
pub mod session_store;
pub mod worker;
pub mod working_copy_manager;

pub use conflict_resolver::{
    ConflictEvent, ConflictResolver, ConflictResolverConfig, RebaseExecutor, ResolveOutcome,
};
pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherStatus};
pub use merge_queue::MergeQueue;
pub use merger::{Merger, MergerConfig};
pub use name_pool::NamePool;
pub use pool_refinery::PoolRefineryBridge;
pub use rate_limit_coordinator::{RateLimitCoordinator, RateLimitEvent};
pub use refinery::{Refinery, RefineryConfig, RefineryEvent};
pub use scheduler::{Scheduler, SchedulerConfig, Track};
pub use session_store::SessionStore;
pub use worker::{Worker, WorkerEvent};
pub use working_copy_manager::WorkingCopyManager;
