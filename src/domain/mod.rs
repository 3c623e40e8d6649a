mod attendance;
mod calendar;
mod ledger;
mod member;
mod money;
mod payment;

pub use attendance::*;
pub use calendar::*;
pub use ledger::*;
pub use member::*;
pub use money::*;
pub use payment::*;
