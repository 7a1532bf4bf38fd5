mod common;

use assert_matches::assert_matches;
use sentra_api::entities::stock_movement::MovementType;
use sentra_api::ServiceError;
use uuid::Uuid;

#[tokio::test]
async fn add_and_reduce_track_quantity() {
    let (_pool, services) = common::setup().await;
    let (product, branch, actor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let record = services
        .stock
        .add_stock(product, branch, 50, MovementType::In, None, actor)
        .await
        .unwrap();
    assert_eq!(record.quantity, 50);

    let record = services
        .stock
        .reduce_stock(product, branch, 20, MovementType::Out, None, actor)
        .await
        .unwrap();
    assert_eq!(record.quantity, 30);
}

#[tokio::test]
async fn reduction_never_goes_negative() {
    let (_pool, services) = common::setup().await;
    let (product, branch, actor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    services
        .stock
        .add_stock(product, branch, 10, MovementType::In, None, actor)
        .await
        .unwrap();

    let err = services
        .stock
        .reduce_stock(product, branch, 11, MovementType::Out, None, actor)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            requested: 11,
            available: 10,
            ..
        }
    );

    // The failed operation left no trace.
    let record = services.stock.get_stock(product, branch).await.unwrap().unwrap();
    assert_eq!(record.quantity, 10);
    let movements = services.stock.movement_history(product, None, 10).await.unwrap();
    assert_eq!(movements.len(), 1);
}

#[tokio::test]
async fn reducing_unknown_stock_reports_zero_available() {
    let (_pool, services) = common::setup().await;

    let err = services
        .stock
        .reduce_stock(
            Uuid::new_v4(),
            Uuid::new_v4(),
            5,
            MovementType::Out,
            None,
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { available: 0, .. });
}

#[tokio::test]
async fn transfer_conserves_total_quantity() {
    let (_pool, services) = common::setup().await;
    let (product, actor) = (Uuid::new_v4(), Uuid::new_v4());
    let (branch_a, branch_b) = (Uuid::new_v4(), Uuid::new_v4());

    services
        .stock
        .add_stock(product, branch_a, 80, MovementType::In, None, actor)
        .await
        .unwrap();

    let transfer = services
        .stock
        .transfer_stock(product, branch_a, branch_b, 30, None, actor)
        .await
        .unwrap();
    assert_eq!(transfer.from_record.quantity, 50);
    assert_eq!(transfer.to_record.quantity, 30);
    assert_eq!(
        transfer.from_record.quantity + transfer.to_record.quantity,
        80
    );

    // One movement row carrying both branches.
    assert_eq!(transfer.movement.from_branch_id, Some(branch_a));
    assert_eq!(transfer.movement.to_branch_id, Some(branch_b));
    assert_eq!(transfer.movement.quantity, 30);
}

#[tokio::test]
async fn transfer_fails_whole_when_source_short() {
    let (_pool, services) = common::setup().await;
    let (product, actor) = (Uuid::new_v4(), Uuid::new_v4());
    let (branch_a, branch_b) = (Uuid::new_v4(), Uuid::new_v4());

    services
        .stock
        .add_stock(product, branch_a, 5, MovementType::In, None, actor)
        .await
        .unwrap();

    let err = services
        .stock
        .transfer_stock(product, branch_a, branch_b, 30, None, actor)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { .. });

    let a = services.stock.get_stock(product, branch_a).await.unwrap().unwrap();
    assert_eq!(a.quantity, 5);
    // Destination record may not even exist; it must not have gained stock.
    let b = services.stock.get_stock(product, branch_b).await.unwrap();
    assert_eq!(b.map(|r| r.quantity).unwrap_or(0), 0);
}

#[tokio::test]
async fn transfer_to_same_branch_is_rejected() {
    let (_pool, services) = common::setup().await;
    let branch = Uuid::new_v4();

    let err = services
        .stock
        .transfer_stock(Uuid::new_v4(), branch, branch, 1, None, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn opname_adjusts_only_differing_lines() {
    let (_pool, services) = common::setup().await;
    let (branch, actor) = (Uuid::new_v4(), Uuid::new_v4());
    let (product_a, product_b) = (Uuid::new_v4(), Uuid::new_v4());

    services
        .stock
        .add_stock(product_a, branch, 100, MovementType::In, None, actor)
        .await
        .unwrap();
    services
        .stock
        .add_stock(product_b, branch, 40, MovementType::In, None, actor)
        .await
        .unwrap();

    let adjustments = services
        .stock
        .stock_opname(
            branch,
            vec![
                sentra_api::services::stock::OpnameLine {
                    product_id: product_a,
                    physical_quantity: 95,
                },
                sentra_api::services::stock::OpnameLine {
                    product_id: product_b,
                    physical_quantity: 40,
                },
            ],
            actor,
        )
        .await
        .unwrap();

    // The matching line produced nothing.
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].product_id, product_a);
    assert_eq!(adjustments[0].previous_quantity, 100);
    assert_eq!(adjustments[0].physical_quantity, 95);
    assert_eq!(adjustments[0].difference, -5);

    let a = services.stock.get_stock(product_a, branch).await.unwrap().unwrap();
    assert_eq!(a.quantity, 95);
    let b = services.stock.get_stock(product_b, branch).await.unwrap().unwrap();
    assert_eq!(b.quantity, 40);
}

#[tokio::test]
async fn opname_matching_count_is_idempotent() {
    let (_pool, services) = common::setup().await;
    let (product, branch, actor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    services
        .stock
        .add_stock(product, branch, 25, MovementType::In, None, actor)
        .await
        .unwrap();
    let before = services.stock.movement_history(product, None, 10).await.unwrap().len();

    let adjustments = services
        .stock
        .stock_opname(
            branch,
            vec![sentra_api::services::stock::OpnameLine {
                product_id: product,
                physical_quantity: 25,
            }],
            actor,
        )
        .await
        .unwrap();

    assert!(adjustments.is_empty());
    let after = services.stock.movement_history(product, None, 10).await.unwrap().len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn movement_references_follow_the_shape() {
    let (_pool, services) = common::setup().await;
    let (product, branch, actor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    services
        .stock
        .add_stock(product, branch, 5, MovementType::In, None, actor)
        .await
        .unwrap();

    let movements = services.stock.movement_history(product, None, 10).await.unwrap();
    let reference = &movements[0].reference_number;
    let parts: Vec<&str> = reference.split('-').collect();
    assert_eq!(parts.len(), 3, "unexpected reference {}", reference);
    assert_eq!(parts[0], "MOV");
    assert_eq!(parts[1].len(), 8);
    assert_eq!(parts[2].len(), 6);
}

#[tokio::test]
async fn movement_history_scopes_to_branch() {
    let (_pool, services) = common::setup().await;
    let (product, actor) = (Uuid::new_v4(), Uuid::new_v4());
    let (branch_a, branch_b, branch_c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    services
        .stock
        .add_stock(product, branch_a, 10, MovementType::In, None, actor)
        .await
        .unwrap();
    services
        .stock
        .add_stock(product, branch_b, 10, MovementType::In, None, actor)
        .await
        .unwrap();
    services
        .stock
        .transfer_stock(product, branch_a, branch_c, 5, None, actor)
        .await
        .unwrap();

    let history = services
        .stock
        .movement_history(product, Some(branch_a), 10)
        .await
        .unwrap();
    // The inbound addition and the outbound transfer, not branch B's.
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|m| {
        m.from_branch_id == Some(branch_a) || m.to_branch_id == Some(branch_a)
    }));
}

#[tokio::test]
async fn low_stock_alerts_list_records_at_or_below_minimum() {
    let (pool, services) = common::setup().await;
    let (branch, actor) = (Uuid::new_v4(), Uuid::new_v4());
    let (product_low, product_ok) = (Uuid::new_v4(), Uuid::new_v4());

    services
        .stock
        .add_stock(product_low, branch, 3, MovementType::In, None, actor)
        .await
        .unwrap();
    services
        .stock
        .add_stock(product_ok, branch, 50, MovementType::In, None, actor)
        .await
        .unwrap();

    // Raise the minimum above the low product's quantity.
    {
        use sea_orm::{ActiveModelTrait, Set};
        use sentra_api::entities::stock;
        let record = services.stock.get_stock(product_low, branch).await.unwrap().unwrap();
        let mut active: stock::ActiveModel = record.into();
        active.minimum_stock = Set(5);
        active.update(&*pool).await.unwrap();
    }

    let alerts = services.stock.low_stock_alerts(Some(branch)).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].product_id, product_low);
}
