use chrono::{DateTime, Duration as ChronoDuration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use storefront_api::entities::coupon::{self, DiscountType};
use storefront_api::entities::review::{self, ModerationStatus};
use storefront_api::services::{calculate_discount, sort_by_helpfulness, weighted_rating};
use uuid::Uuid;

fn sample_coupon(discount_type: DiscountType) -> coupon::Model {
    let now = Utc::now();
    coupon::Model {
        id: Uuid::new_v4(),
        code: "BENCH20".to_string(),
        description: None,
        discount_type,
        value: dec!(20),
        min_purchase_amount: dec!(10),
        max_discount_amount: Some(dec!(50)),
        usage_limit: Some(10_000),
        usage_count: 42,
        per_user_limit: Some(1),
        valid_from: now - ChronoDuration::days(30),
        valid_until: Some(now + ChronoDuration::days(30)),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn sample_reviews(count: usize, now: DateTime<Utc>) -> Vec<review::Model> {
    (0..count)
        .map(|i| review::Model {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            rating: (i % 6) as i16,
            title: None,
            body: "bench".to_string(),
            status: ModerationStatus::Approved,
            upvotes: (i % 17) as i32,
            downvotes: (i % 5) as i32,
            report_count: 0,
            verified_purchase: i % 2 == 0,
            created_at: now - ChronoDuration::days((i % 365) as i64),
            updated_at: now,
        })
        .collect()
}

fn discount_calculation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("calculate_discount");
    let now = Utc::now();

    for discount_type in [
        DiscountType::Percentage,
        DiscountType::Fixed,
        DiscountType::FreeShipping,
    ] {
        let coupon = sample_coupon(discount_type);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", discount_type)),
            &coupon,
            |b, coupon| {
                b.iter(|| {
                    calculate_discount(
                        black_box(coupon),
                        black_box(dec!(149.99)),
                        black_box(dec!(10)),
                        black_box(now),
                    )
                });
            },
        );
    }

    group.finish();
}

fn weighted_rating_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("weighted_rating");
    let now = Utc::now();

    for size in [10usize, 100, 1_000].iter() {
        let reviews = sample_reviews(*size, now);
        group.bench_with_input(BenchmarkId::from_parameter(size), &reviews, |b, reviews| {
            b.iter(|| weighted_rating(black_box(reviews), black_box(now)));
        });
    }

    group.finish();
}

fn helpfulness_sort_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_by_helpfulness");
    let now = Utc::now();

    for size in [10usize, 100, 1_000].iter() {
        let reviews = sample_reviews(*size, now);
        group.bench_with_input(BenchmarkId::from_parameter(size), &reviews, |b, reviews| {
            b.iter(|| sort_by_helpfulness(black_box(reviews.clone())));
        });
    }

    group.finish();
}

fn subtotal_scaling_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("discount_subtotal_scaling");
    let now = Utc::now();
    let coupon = sample_coupon(DiscountType::Percentage);

    for subtotal in [dec!(25), dec!(250), dec!(2500), dec!(25000)].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(subtotal),
            subtotal,
            |b, subtotal| {
                b.iter(|| {
                    calculate_discount(
                        black_box(&coupon),
                        black_box(*subtotal),
                        black_box(Decimal::ZERO),
                        black_box(now),
                    )
                });
            },
        );
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(100);
    targets =
        discount_calculation_benchmark,
        weighted_rating_benchmark,
        helpfulness_sort_benchmark,
        subtotal_scaling_benchmark
}

criterion_main!(benches);
