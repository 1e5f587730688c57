//! Export staging tables
//!
//! Each exported table is first loaded into a temp table, then copied into
//! the real table. The progress of every (jobflow instance, export table)
//! pair is kept in `export_temp_table` so that a later run or the recovery
//! tool can tell how far the previous attempt got:
//!
//! ```text
//! (absent) -> LOAD_EXIT -> BEFORE_COPY -> COPY_EXIT
//! ```
//!
//! | status        | resume by                                   |
//! |---------------|---------------------------------------------|
//! | absent        | dropping the temp tables and starting over  |
//! | `LOAD_EXIT`   | redoing the copy                            |
//! | `BEFORE_COPY` | retrying the copy, guarded by the flag table |
//! | `COPY_EXIT`   | nothing                                     |

mod plan;
mod state;
mod store;

pub use plan::{ExportPlan, ExportStep, JobflowRecovery, RecoveryDecision, RecoveryOutcome};
pub use state::{check_transition, TempTableRecord, TransitionError};
pub use store::{PgTempTableStore, TempTableStore};
