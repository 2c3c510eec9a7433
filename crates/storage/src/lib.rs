pub mod db;

pub use db::{
    count_records, create_db, create_memory_db, get_tag_totals, write_audit, AuditError, DbPool,
    TagTotalRow, TAG_VIEW, TRANSACTIONS_TABLE,
};
