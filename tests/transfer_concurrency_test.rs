mod common;

use common::TestApp;
use loyaltyhub_api::entities::product::Entity as ProductEntity;
use loyaltyhub_api::services::transfer::SubmitRequestCommand;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

// Ignored by default because it requires SQLite with migrations.
// Run with: cargo test -- --ignored transfer_concurrency
#[tokio::test]
#[ignore]
async fn transfer_concurrency_never_oversells() {
    let app = TestApp::new().await;
    let org = Uuid::new_v4();
    let product = app.seed_product(org, 10, dec!(10)).await;

    // 20 pending requests of 1 unit each against 10 units of stock.
    let mut request_ids = Vec::new();
    for _ in 0..20 {
        let request = app
            .transfer
            .submit(SubmitRequestCommand {
                product_id: product.id,
                client_id: Uuid::new_v4(),
                organization_id: org,
                quantity: 1,
                unit_price: dec!(10),
                notes: None,
            })
            .await
            .expect("submit");
        request_ids.push(request.id);
    }

    let mut tasks = Vec::new();
    for id in request_ids {
        let engine = app.transfer.clone();
        tasks.push(tokio::spawn(async move {
            engine.approve(id, Uuid::new_v4()).await.is_ok()
        }));
    }

    let mut success = 0;
    for t in tasks {
        if t.await.unwrap_or(false) {
            success += 1;
        }
    }
    assert_eq!(
        success, 10,
        "exactly 10 approvals should succeed; got {}",
        success
    );

    let prod = ProductEntity::find_by_id(product.id)
        .one(&*app.db)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(prod.stock, 0, "stock must never go negative");
}
