mod common;

use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use sentra_api::entities::sales_transaction::Entity as SalesTransaction;
use sentra_api::entities::stock_movement::MovementType;
use sentra_api::services::sales_transactions::{
    CreateTransactionRequest, TransactionItemRequest,
};
use sentra_api::ServiceError;
use uuid::Uuid;

fn sale_request(branch: Uuid, product: Uuid, quantity: i32) -> CreateTransactionRequest {
    CreateTransactionRequest {
        branch_id: branch,
        sales_id: Uuid::new_v4(),
        area_id: None,
        customer_name: "Racing customer".to_string(),
        customer_phone: None,
        transaction_number: None,
        payment_method: "cash".to_string(),
        discount: None,
        tax_rate: None,
        notes: None,
        items: vec![TransactionItemRequest {
            product_id: product,
            quantity,
            price: dec!(1000),
            discount: None,
        }],
    }
}

#[tokio::test]
async fn only_one_of_two_racing_creates_wins_the_last_stock() {
    let (pool, services) = common::setup().await;
    let (branch, product, actor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    services
        .stock
        .add_stock(product, branch, 100, MovementType::In, None, actor)
        .await
        .unwrap();

    // Both want all 100 units; only one can have them.
    let (left, right) = tokio::join!(
        services
            .transactions
            .create(sale_request(branch, product, 100), actor),
        services
            .transactions
            .create(sale_request(branch, product, 100), actor),
    );

    let outcomes = [left, right];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one create may win");
    let loser = outcomes
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one create must lose");
    assert!(matches!(loser, ServiceError::InsufficientStock { .. }));

    let record = services.stock.get_stock(product, branch).await.unwrap().unwrap();
    assert_eq!(record.quantity, 0);
    let rows = SalesTransaction::find().count(&*pool).await.unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn concurrent_reductions_stop_exactly_at_zero() {
    let (_pool, services) = common::setup().await;
    let (branch, product, actor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    services
        .stock
        .add_stock(product, branch, 10, MovementType::In, None, actor)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let stock = services.stock.clone();
        handles.push(tokio::spawn(async move {
            stock
                .reduce_stock(product, branch, 1, MovementType::Out, None, actor)
                .await
        }));
    }

    let mut successes = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(ServiceError::InsufficientStock { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(successes, 10);
    assert_eq!(insufficient, 10);

    let record = services.stock.get_stock(product, branch).await.unwrap().unwrap();
    assert_eq!(record.quantity, 0);
}

#[tokio::test]
async fn opname_racing_a_sale_still_reconciles_against_the_movement_log() {
    let (_pool, services) = common::setup().await;
    let (branch, product, actor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    services
        .stock
        .add_stock(product, branch, 100, MovementType::In, None, actor)
        .await
        .unwrap();

    // Whichever order these land in, the adjustment must be computed from
    // the quantity it actually overwrote, so replaying the movement log
    // always reproduces the final quantity.
    let (opname, reduction) = tokio::join!(
        services.stock.stock_opname(
            branch,
            vec![sentra_api::services::stock::OpnameLine {
                product_id: product,
                physical_quantity: 50,
            }],
            actor,
        ),
        services
            .stock
            .reduce_stock(product, branch, 10, MovementType::Out, None, actor),
    );
    opname.unwrap();
    reduction.unwrap();

    let record = services.stock.get_stock(product, branch).await.unwrap().unwrap();
    let movements = services
        .stock
        .movement_history(product, Some(branch), 50)
        .await
        .unwrap();
    let replayed: i32 = movements
        .iter()
        .map(|m| {
            if m.to_branch_id == Some(branch) {
                m.quantity
            } else {
                -m.quantity
            }
        })
        .sum();
    assert_eq!(replayed, record.quantity);
}

#[tokio::test]
async fn racing_transfers_conserve_the_total() {
    let (_pool, services) = common::setup().await;
    let (product, actor) = (Uuid::new_v4(), Uuid::new_v4());
    let (branch_a, branch_b) = (Uuid::new_v4(), Uuid::new_v4());

    services
        .stock
        .add_stock(product, branch_a, 60, MovementType::In, None, actor)
        .await
        .unwrap();

    let (x, y) = tokio::join!(
        services
            .stock
            .transfer_stock(product, branch_a, branch_b, 40, None, actor),
        services
            .stock
            .transfer_stock(product, branch_a, branch_b, 40, None, actor),
    );
    // Only one 40-unit transfer fits in 60.
    assert_eq!(x.is_ok() as u8 + y.is_ok() as u8, 1);

    let a = services.stock.get_stock(product, branch_a).await.unwrap().unwrap();
    let b = services.stock.get_stock(product, branch_b).await.unwrap().unwrap();
    assert_eq!(a.quantity + b.quantity, 60);
    assert_eq!(a.quantity, 20);
    assert_eq!(b.quantity, 40);
}
