use ledgerfold_core::Record;

/// Concatenates per-file batches in ingestion order and sorts by date.
///
/// The sort is stable: records sharing a date keep their ingestion order.
pub fn merge<I>(batches: I) -> Vec<Record>
where
    I: IntoIterator<Item = Vec<Record>>,
{
    let mut records: Vec<Record> = batches.into_iter().flatten().collect();
    records.sort_by_key(|r| r.date);
    records
}
