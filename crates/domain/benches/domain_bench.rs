use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Cart, LifecycleEvent, Money, NewOrder, Order, OrderItem, OrderNumber, Product, UserId,
    order::lifecycle::{self, Lifecycle},
};
use std::hint::black_box;

fn sample_items(count: usize) -> Vec<OrderItem> {
    (0..count)
        .map(|i| {
            OrderItem::new(
                format!("SKU-{i:03}"),
                format!("Product {i}"),
                (i as u32 % 5) + 1,
                Money::from_minor(1000 + i as i64),
            )
            .unwrap()
        })
        .collect()
}

fn bench_place_order(c: &mut Criterion) {
    let items = sample_items(10);

    c.bench_function("domain/place_order_10_items", |b| {
        b.iter(|| {
            let order = Order::place(NewOrder {
                user_id: UserId::new(),
                order_number: OrderNumber::generate(),
                items: black_box(items.clone()),
                shipping_address: "1 Ship St".to_string(),
                billing_address: "1 Bill St".to_string(),
            })
            .unwrap();
            black_box(order);
        });
    });
}

fn bench_lifecycle(c: &mut Criterion) {
    let path = [
        LifecycleEvent::PaymentCompleted,
        LifecycleEvent::StartProcessing,
        LifecycleEvent::Ship,
        LifecycleEvent::Deliver,
        LifecycleEvent::Return,
    ];

    c.bench_function("domain/lifecycle_full_path", |b| {
        b.iter(|| {
            let mut current = Lifecycle::placed();
            for event in path {
                if let Ok(lifecycle::Step::Advanced(next)) = lifecycle::next(current, event) {
                    current = next;
                }
            }
            black_box(current);
        });
    });
}

fn bench_cart_merge(c: &mut Criterion) {
    let products: Vec<Product> = (0..20)
        .map(|i| {
            Product::new(
                format!("SKU-{i:03}"),
                format!("Product {i}"),
                Money::from_minor(500),
                1_000,
            )
        })
        .collect();

    c.bench_function("domain/cart_add_20_products_twice", |b| {
        b.iter(|| {
            let mut cart = Cart::new(UserId::new());
            for product in products.iter().chain(products.iter()) {
                cart.add_item(product, 3).unwrap();
            }
            black_box(cart.total_quantity());
        });
    });
}

criterion_group!(benches, bench_place_order, bench_lifecycle, bench_cart_merge);
criterion_main!(benches);
