pub mod health;
pub mod outcome;
pub mod query;

pub use health::{ConnectorInfo, HealthResult};
pub use outcome::{ErrorKind, OutcomeBuilder, RequestOutcome, TransferEvent};
pub use query::{ConnectorRef, QueryPattern, QuerySpec};
