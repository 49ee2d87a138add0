//! # Nebula Connection Pool
//!
//! Bounded pool of long-lived database connections for the Nebula workflow
//! engine. The pool grows on demand up to `max_size` and queues callers in
//! arrival order once it is exhausted.
//!
//! The pool is protocol-agnostic: a [`ConnectionFactory`] creates
//! connections, and each [`Connection`] knows how to reset and close itself.
//!
//! ```no_run
//! use nebula_pool::prelude::*;
//! use nebula_pool::testing::MockFactory;
//!
//! # async fn demo() -> nebula_pool::Result<()> {
//! let pool = Pool::new(MockFactory::new(), "db:1433".to_string(), PoolConfig::default())?;
//!
//! let conn = pool.acquire().await?;
//! println!("using connection {}", conn.serial());
//! pool.release(conn)?;
//!
//! pool.drain().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod context;
pub mod error;
pub mod events;
pub mod guard;
pub mod pool;
pub mod testing;
mod timer;

pub use connection::{BoxError, Connection, ConnectionFactory, ConnectionMonitor};
pub use context::ConnectContext;
pub use error::{Error, Result};
pub use events::{CleanupReason, EventBus, PoolEvent};
pub use guard::PooledConnection;
pub use pool::{Pool, PoolConfig, PoolStats, SlotId, SlotStatus};

/// Common imports for pool users and connection factory implementors.
pub mod prelude {
    pub use crate::connection::{BoxError, Connection, ConnectionFactory, ConnectionMonitor};
    pub use crate::context::ConnectContext;
    pub use crate::error::{Error, Result};
    pub use crate::events::{CleanupReason, PoolEvent};
    pub use crate::guard::PooledConnection;
    pub use crate::pool::{Pool, PoolConfig, PoolStats, SlotId};
}
