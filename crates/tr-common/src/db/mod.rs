pub mod pool;
pub mod processor;
pub mod tables;
pub mod tickets;
pub mod util;

pub use pool::{DbPoolError, PgPool, RENUMBER_POOL_SIZE, create_pool_from_url};
pub use processor::{ConcurrencyMode, PgDayProcessor, ProcessorOptions};
pub use tables::{DEFAULT_SCHEMA, TableNameError, TicketTables};
pub use tickets::{
    TicketStatements, TicketStorageError, assign_new_ids, last_new_id, lock_tickets,
    pending_tickets,
};
