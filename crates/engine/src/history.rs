use stocktrail_core::{BatchId, ChangeDetails, ChangeRecord, EntityType};

/// Append-only audit log for one session.
///
/// Records are created only after a mutation commits; a rolled-back
/// mutation leaves no trace here. The batch id is never generated by this
/// component — it receives the caller's operation batch id verbatim, so
/// every record of one logical operation shares exactly one id regardless
/// of the entity mix.
#[derive(Debug, Default)]
pub struct HistoryLog {
    records: Vec<ChangeRecord>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<ChangeRecord>) -> Self {
        Self { records }
    }

    pub fn record(
        &mut self,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        details: ChangeDetails,
        batch: Option<BatchId>,
    ) -> &ChangeRecord {
        let record = ChangeRecord::new(entity_type, entity_id, details, batch);
        self.records.push(record);
        // Just pushed, so the list is non-empty.
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_batch_id_is_taken_verbatim() {
        let mut log = HistoryLog::new();
        let batch = BatchId::new();
        let a = log
            .record(
                EntityType::Product,
                "p-1",
                ChangeDetails::created("Soap", 5.0),
                Some(batch),
            )
            .clone();
        let b = log
            .record(
                EntityType::Lot,
                "l-1",
                ChangeDetails::quantity_adjusted("Soap", 5.0, 7.0),
                Some(batch),
            )
            .clone();
        assert_eq!(a.batch_id, batch);
        assert_eq!(b.batch_id, batch);
    }

    #[test]
    fn missing_batch_defaults_to_own_record_id() {
        let mut log = HistoryLog::new();
        let record = log.record(
            EntityType::Product,
            "p-1",
            ChangeDetails::created("Soap", 5.0),
            None,
        );
        assert_eq!(record.batch_id.as_uuid(), record.id.as_uuid());
    }
}
