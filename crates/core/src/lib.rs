pub mod money;
pub mod record;

pub use money::Money;
pub use record::{Field, FieldError, Origin, Record, TextField, DATE_FORMAT};
