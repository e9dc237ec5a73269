// Order decisions and position accounting
pub mod executor;
pub mod position_book;

pub use executor::{ExecutionAction, ExecutionDecision, Executor};
pub use position_book::{ExitPolicy, PositionBook};
