//! Reconciliation of guest and remote state at sign-in.

use atelier_core::{CartCommand, ProductId, UserId, WishlistCommand, WishlistState};
use atelier_integration_tests::{World, cart_of, eventually, line, quantities, wishlist_ids};
use atelier_sync::Phase;

fn user() -> UserId {
    UserId::new("u-42")
}

#[tokio::test]
async fn test_sign_in_unions_guest_and_remote_carts() {
    let world = World::new();
    world.seed_cart(&user(), &cart_of(&[("P1", 1), ("P3", 1)]));

    let device = world.device();
    device.engine.dispatch_cart(CartCommand::Add(line("P1")));
    device.engine.dispatch_cart(CartCommand::Add(line("P1")));

    device.engine.sign_in(user()).await.unwrap();

    let expected = vec![("P1".to_string(), 2), ("P3".to_string(), 1)];
    assert_eq!(quantities(&device.engine.cart()), expected);
    assert_eq!(quantities(&world.remote_cart(&user()).unwrap()), expected);
    assert_eq!(device.engine.phase(), Phase::Subscribed { user: user() });
}

#[tokio::test]
async fn test_sign_in_unions_wishlists() {
    let world = World::new();
    world.seed_wishlist(&user(), &WishlistState::from_ids([ProductId::new("P3")]));

    let device = world.device();
    device
        .engine
        .dispatch_wishlist(WishlistCommand::Toggle(ProductId::new("P1")));

    device.engine.sign_in(user()).await.unwrap();

    let expected = vec!["P1".to_string(), "P3".to_string()];
    assert_eq!(wishlist_ids(&device.engine.wishlist()), expected);
    assert_eq!(wishlist_ids(&world.remote_wishlist(&user()).unwrap()), expected);
}

#[tokio::test]
async fn test_second_sign_in_with_empty_guest_writes_nothing() {
    let world = World::new();
    world.seed_cart(&user(), &cart_of(&[("P1", 1), ("P3", 1)]));

    let first = world.device();
    first.engine.dispatch_cart(CartCommand::Add(line("P1")));
    first.engine.dispatch_cart(CartCommand::Add(line("P1")));
    first.engine.sign_in(user()).await.unwrap();
    let writes = world.remote.write_count();
    let stored = world.remote_cart(&user());

    let second = world.device();
    second.engine.sign_in(user()).await.unwrap();

    assert_eq!(world.remote.write_count(), writes);
    assert_eq!(world.remote_cart(&user()), stored);
    assert_eq!(
        quantities(&second.engine.cart()),
        vec![("P1".to_string(), 2), ("P3".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_new_account_with_empty_guest_creates_no_documents() {
    let world = World::new();
    let device = world.device();

    device.engine.sign_in(user()).await.unwrap();

    assert_eq!(world.remote.write_count(), 0);
    assert!(world.remote_cart(&user()).is_none());
    assert!(world.remote_wishlist(&user()).is_none());
}

#[tokio::test]
async fn test_merge_write_failure_keeps_guest_cart_and_retries() {
    let world = World::new();
    world.remote.fail_writes(true);

    let device = world.device();
    device.engine.dispatch_cart(CartCommand::Add(line("P1")));
    device.engine.dispatch_cart(CartCommand::Add(line("P1")));

    device.engine.sign_in(user()).await.unwrap();

    assert_eq!(quantities(&device.engine.cart()), vec![("P1".to_string(), 2)]);
    assert!(world.remote_cart(&user()).is_none());
    assert!(device.engine.has_pending_writes());

    world.remote.fail_writes(false);
    device.scheduler.run_all().await;

    assert_eq!(
        quantities(&world.remote_cart(&user()).unwrap()),
        vec![("P1".to_string(), 2)]
    );
}

#[tokio::test]
async fn test_unreachable_remote_keeps_guest_cart() {
    let world = World::new();
    world.remote.fail_reads(true);

    let device = world.device();
    device.engine.dispatch_cart(CartCommand::Add(line("P3")));

    device.engine.sign_in(user()).await.unwrap();

    assert_eq!(quantities(&device.engine.cart()), vec![("P3".to_string(), 1)]);
    assert_eq!(device.engine.phase(), Phase::Subscribed { user: user() });
}

#[tokio::test]
async fn test_failed_read_at_sign_in_merges_once_remote_recovers() {
    let world = World::new();
    world.seed_cart(&user(), &cart_of(&[("P3", 1)]));
    world.remote.fail_reads(true);

    let device = world.device();
    device.engine.dispatch_cart(CartCommand::Add(line("P1")));
    device.engine.sign_in(user()).await.unwrap();
    assert!(device.engine.has_pending_writes());

    world.remote.fail_reads(false);
    device.scheduler.run_all().await;

    let expected = vec![("P1".to_string(), 1), ("P3".to_string(), 1)];
    assert_eq!(quantities(&world.remote_cart(&user()).unwrap()), expected);
    eventually("local cart to hold both items", || {
        quantities(&device.engine.cart()) == expected
    })
    .await;
}

#[tokio::test]
async fn test_changes_while_merge_is_owed_never_drop_account_items() {
    let world = World::new();
    world.seed_cart(&user(), &cart_of(&[("P3", 1)]));
    world.remote.fail_reads(true);

    let device = world.device();
    device.engine.dispatch_cart(CartCommand::Add(line("P1")));
    device.engine.sign_in(user()).await.unwrap();

    // The live feed still works; its snapshot is unioned in, not adopted.
    eventually("account cart to be folded in", || {
        quantities(&device.engine.cart()) == vec![("P1".to_string(), 1), ("P3".to_string(), 1)]
    })
    .await;

    // Reads still fail: the retry gives up without writing.
    device.scheduler.run_all().await;
    assert_eq!(world.remote.write_count(), 0);
    assert_eq!(
        quantities(&world.remote_cart(&user()).unwrap()),
        vec![("P3".to_string(), 1)]
    );

    device.engine.dispatch_cart(CartCommand::Add(line("P1")));
    world.remote.fail_reads(false);
    device.scheduler.run_all().await;

    let expected = vec![("P1".to_string(), 2), ("P3".to_string(), 1)];
    assert_eq!(quantities(&world.remote_cart(&user()).unwrap()), expected);
    assert_eq!(quantities(&device.engine.cart()), expected);
}

#[tokio::test]
async fn test_switching_accounts_carries_local_cart() {
    let world = World::new();
    let other = UserId::new("u-7");
    let device = world.device();
    device.engine.dispatch_cart(CartCommand::Add(line("P1")));
    device.engine.sign_in(user()).await.unwrap();

    device.engine.sign_in(other.clone()).await.unwrap();

    assert_eq!(device.engine.phase(), Phase::Subscribed { user: other.clone() });
    assert_eq!(
        quantities(&world.remote_cart(&other).unwrap()),
        vec![("P1".to_string(), 1)]
    );
}
