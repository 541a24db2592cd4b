//! Core event loop: worker thread, scheduler capabilities and resource tracking.

pub mod cancel;
pub mod error;
pub mod event_loop;
pub mod scheduler;
pub mod tracker;
pub mod worker;

pub use cancel::{CancelRegistration, CancellationSource, CancellationToken, TokenId};
pub use error::{AppResult, LoopError, LoopResult};
pub use event_loop::{EventLoop, LoopHandle};
pub use scheduler::{
    Callback, Disposable, DisposeAction, ResourceFactory, ResourceTrackingScheduler, Scheduler,
    SchedulerExt,
};
pub use tracker::{ResourceTracker, UntrackHandle};
pub use worker::{Worker, WorkerHandle};
