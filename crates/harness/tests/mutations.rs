use chrono::NaiveDate;

use stocktrail_core::{ChangeDetails, KnownDetails, LotPayload, Unit, derive_quantity};
use stocktrail_engine::{EngineError, ProductDetailsUpdate};
use stocktrail_harness::{connected_session, local_session};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn lot_payload(quantity: f64) -> LotPayload {
    LotPayload {
        quantity,
        expiry_date: date(2026, 6, 1),
    }
}

// ============================================================================
// Creation and validation
// ============================================================================

#[test]
fn add_product_local_appends_and_records() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = local_session()?;
    let seeded = session.products().len();

    let id = session.add_product("Bleach", Unit::Liters, 10.0)?;

    assert_eq!(session.products().len(), seeded + 1);
    let product = session.product(id).unwrap();
    assert_eq!(product.name, "Bleach");
    assert_eq!(product.quantity, 10.0);

    let records = session.history_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].details.action(), Some("created"));
    // Standalone creation forms its own one-record batch.
    assert_eq!(records[0].batch_id.as_uuid(), records[0].id.as_uuid());
    Ok(())
}

#[test]
fn add_product_rejects_blank_name_and_negative_quantity()
-> Result<(), Box<dyn std::error::Error>> {
    let mut session = local_session()?;
    let before = session.products().len();

    assert!(matches!(
        session.add_product("   ", Unit::Liters, 1.0),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        session.add_product("Acid", Unit::Liters, -3.0),
        Err(EngineError::Validation(_))
    ));

    assert_eq!(session.products().len(), before);
    assert!(session.history_records().is_empty());
    Ok(())
}

#[test]
fn add_product_connected_adopts_server_snapshot() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, server) = connected_session()?;

    let id = session.add_product("Degreaser", Unit::Liters, 25.0)?;

    let server_products = server.products();
    assert_eq!(server_products.len(), 1);
    // The id the session ends up with is the server-assigned one.
    assert_eq!(server_products[0].id, id);
    assert_eq!(session.product(id).unwrap(), &server_products[0]);
    Ok(())
}

#[test]
fn create_product_rolls_back_on_remote_failure() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, server) = connected_session()?;

    server.fail_next_calls(1);
    let result = session.add_product("Ghost", Unit::Kilograms, 5.0);

    assert!(matches!(result, Err(EngineError::Remote(_))));
    assert!(session.products().is_empty());
    assert!(server.products().is_empty());
    assert!(session.history_records().is_empty());
    assert!(server.history_records().is_empty());
    Ok(())
}

// ============================================================================
// Quantity derivation
// ============================================================================

#[test]
fn quantity_follows_lots_after_each_commit() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = local_session()?;
    let id = session.add_product("Chlorine", Unit::Liters, 0.0)?;

    let first = session.create_lot(id, lot_payload(50.0), None)?;
    assert_eq!(session.product(id).unwrap().quantity, 50.0);

    session.create_lot(id, lot_payload(70.0), None)?;
    assert_eq!(session.product(id).unwrap().quantity, 120.0);

    session.update_lot(id, first, lot_payload(60.0), None)?;
    assert_eq!(session.product(id).unwrap().quantity, 130.0);

    session.delete_lot(id, first, None)?;
    assert_eq!(session.product(id).unwrap().quantity, 70.0);

    let product = session.product(id).unwrap();
    assert_eq!(product.quantity, derive_quantity(product));
    Ok(())
}

#[test]
fn update_quantity_rejected_for_lot_backed_product() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = local_session()?;
    let id = session.add_product("Chlorine", Unit::Liters, 0.0)?;
    session.create_lot(id, lot_payload(50.0), None)?;
    let history_len = session.history_records().len();

    assert!(matches!(
        session.update_product_quantity(id, 999.0, None),
        Err(EngineError::Validation(_))
    ));
    assert_eq!(session.product(id).unwrap().quantity, 50.0);
    assert_eq!(session.history_records().len(), history_len);
    Ok(())
}

#[test]
fn lot_with_non_positive_quantity_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = local_session()?;
    let id = session.add_product("Chlorine", Unit::Liters, 0.0)?;

    assert!(session.create_lot(id, lot_payload(0.0), None).is_err());
    assert!(session.create_lot(id, lot_payload(-4.0), None).is_err());
    assert!(session.product(id).unwrap().lots.is_empty());
    Ok(())
}

#[test]
fn scalar_remove_scenario() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = local_session()?;
    let id = session.add_product("P", Unit::Liters, 100.0)?;

    session.update_product_quantity(id, 80.0, None)?;

    assert_eq!(session.product(id).unwrap().quantity, 80.0);
    let record = session.history_records().last().unwrap().clone();
    match &record.details {
        ChangeDetails::Known(KnownDetails::Remove {
            quantity_changed,
            quantity_before,
            quantity_after,
            ..
        }) => {
            assert_eq!(*quantity_changed, 20.0);
            assert_eq!(*quantity_before, 100.0);
            assert_eq!(*quantity_after, 80.0);
        }
        other => panic!("expected remove details, got {other:?}"),
    }

    // The adjustment forms a one-record batch of its own.
    let groups = session.batch_groups(1, 10)?;
    let group = groups
        .groups
        .iter()
        .find(|g| g.batch_id == record.batch_id)
        .unwrap();
    assert_eq!(group.record_count, 1);
    Ok(())
}

// ============================================================================
// Rollback discipline
// ============================================================================

#[test]
fn failed_update_reverts_details_and_leaves_no_record() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, server) = connected_session()?;
    let id = session.add_product("Original", Unit::Liters, 5.0)?;

    server.fail_next_calls(1);
    let result = session.update_product_details(
        id,
        ProductDetailsUpdate {
            name: Some("Renamed".into()),
            unit: None,
        },
        None,
    );

    assert!(matches!(result, Err(EngineError::Remote(_))));
    assert_eq!(session.product(id).unwrap().name, "Original");
    assert_eq!(server.product(id).unwrap().name, "Original");
    // Only the creation left a trace.
    assert_eq!(session.history_records().len(), 1);
    assert_eq!(server.history_records().len(), 1);
    Ok(())
}

#[test]
fn failed_quantity_update_reverts_value() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, server) = connected_session()?;
    let id = session.add_product("P", Unit::Liters, 100.0)?;

    server.fail_next_calls(1);
    assert!(session.update_product_quantity(id, 80.0, None).is_err());
    assert_eq!(session.product(id).unwrap().quantity, 100.0);
    assert_eq!(server.product(id).unwrap().quantity, 100.0);
    Ok(())
}

#[test]
fn deleted_product_reinserted_at_original_index() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, server) = connected_session()?;
    let a = session.add_product("A", Unit::Liters, 1.0)?;
    let b = session.add_product("B", Unit::Liters, 2.0)?;
    let c = session.add_product("C", Unit::Liters, 3.0)?;

    server.fail_next_calls(1);
    assert!(session.remove_product(b, None).is_err());

    let ids: Vec<_> = session.products().iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![a, b, c]);
    Ok(())
}

#[test]
fn deleted_lot_reinserted_at_original_index() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, server) = connected_session()?;
    let id = session.add_product("Chlorine", Unit::Liters, 0.0)?;
    let first = session.create_lot(id, lot_payload(10.0), None)?;
    let second = session.create_lot(id, lot_payload(20.0), None)?;
    let third = session.create_lot(id, lot_payload(30.0), None)?;

    server.fail_next_calls(1);
    assert!(session.delete_lot(id, second, None).is_err());

    let lots: Vec<_> = session.product(id).unwrap().lots.iter().map(|l| l.id).collect();
    assert_eq!(lots, vec![first, second, third]);
    assert_eq!(session.product(id).unwrap().quantity, 60.0);
    Ok(())
}

#[test]
fn failed_lot_update_restores_previous_lot() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, server) = connected_session()?;
    let id = session.add_product("Chlorine", Unit::Liters, 0.0)?;
    let lot_id = session.create_lot(id, lot_payload(50.0), None)?;
    let before = session.product(id).unwrap().lots[0].clone();

    server.fail_next_calls(1);
    let result = session.update_lot(
        id,
        lot_id,
        LotPayload {
            quantity: 75.0,
            expiry_date: date(2027, 1, 1),
        },
        None,
    );

    assert!(matches!(result, Err(EngineError::Remote(_))));
    assert_eq!(session.product(id).unwrap().lots[0], before);
    assert_eq!(session.product(id).unwrap().quantity, 50.0);
    Ok(())
}

// ============================================================================
// Server snapshot authority
// ============================================================================

#[test]
fn committed_lot_update_matches_server_snapshot() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, server) = connected_session()?;
    let id = session.add_product("Chlorine", Unit::Liters, 0.0)?;
    let lot_id = session.create_lot(id, lot_payload(50.0), None)?;

    session.update_lot(id, lot_id, lot_payload(45.0), None)?;

    // The session holds the server's lot verbatim, timestamps included.
    let session_lot = session.product(id).unwrap().lots[0].clone();
    let server_lot = server.product(id).unwrap().lots[0].clone();
    assert_eq!(session_lot, server_lot);
    Ok(())
}

#[test]
fn partial_batch_failure_keeps_committed_members() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, server) = connected_session()?;
    let id = session.add_product("Chlorine", Unit::Liters, 0.0)?;
    let keep = session.create_lot(id, lot_payload(40.0), None)?;

    let batch = stocktrail_core::BatchId::new();
    let mut results = Vec::new();

    results.push(
        session
            .update_product_details(
                id,
                ProductDetailsUpdate {
                    name: Some("Pool Chlorine".into()),
                    unit: None,
                },
                Some(batch),
            )
            .is_ok(),
    );
    results.push(session.create_lot(id, lot_payload(15.0), Some(batch)).is_ok());

    server.fail_next_calls(1);
    results.push(session.delete_lot(id, keep, Some(batch)).is_ok());

    // The operation as a whole failed, but each member's outcome is final.
    assert_eq!(results, vec![true, true, false]);

    let in_batch: Vec<_> = session
        .history_records()
        .iter()
        .filter(|r| r.batch_id == batch)
        .collect();
    assert_eq!(in_batch.len(), 2);
    assert_eq!(in_batch[0].details.action(), Some("product_details_updated"));
    assert_eq!(in_batch[1].details.action(), Some("lote_created"));

    // The failed deletion rolled back: the lot is still there.
    assert!(session.product(id).unwrap().lot_index(keep).is_some());
    assert_eq!(session.product(id).unwrap().quantity, 55.0);
    Ok(())
}

#[test]
fn unknown_ids_are_validation_failures() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = local_session()?;
    let ghost = stocktrail_core::ProductId::new();

    assert!(matches!(
        session.update_product_quantity(ghost, 1.0, None),
        Err(EngineError::ProductNotFound(_))
    ));
    assert!(matches!(
        session.remove_product(ghost, None),
        Err(EngineError::ProductNotFound(_))
    ));

    let id = session.add_product("Real", Unit::Liters, 1.0)?;
    let ghost_lot = stocktrail_core::LotId::new();
    assert!(matches!(
        session.delete_lot(id, ghost_lot, None),
        Err(EngineError::LotNotFound(_))
    ));
    Ok(())
}
