//! Transaction identities, handles and the shared error taxonomy.

mod errors;
#[allow(clippy::module_inception)]
mod txn;

pub use errors::{TxnError, TxnResult};
pub use txn::{SessionContext, Txn, TxnId};
