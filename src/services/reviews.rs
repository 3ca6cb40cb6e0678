//! Product reviews, votes, moderation and the rating aggregate.
//!
//! The scoring math is pure ([`weighted_rating`], [`sort_by_helpfulness`])
//! and the service owns every write to `products.rating` and
//! `products.review_count` through [`ReviewService::recalculate_product_rating`],
//! which runs inside the same transaction as each review mutation. A stale
//! aggregate is a correctness bug, so recalculation failures roll the whole
//! mutation back instead of being swallowed.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, JoinType, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{
    self, order, order_item, product, review, review_vote, ModerationStatus, OrderStatus,
    ReviewModel, VoteKind,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;

/// Weekly geometric decay applied to review weights.
const RATING_DECAY_PER_WEEK: f64 = 0.9;

/// Reports at which an approved review is automatically flagged.
const AUTO_FLAG_REPORT_THRESHOLD: i32 = 3;

/// Computes the decay-weighted average rating of a review set.
///
/// Each review weighs `0.9^w` where `w` is the number of whole weeks
/// between its creation and `now`, so older reviews count for less. The
/// result is rounded to one decimal place and is `0.0` for an empty set.
pub fn weighted_rating(reviews: &[ReviewModel], now: DateTime<Utc>) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }

    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for review in reviews {
        let weeks = (now - review.created_at).num_weeks().max(0) as i32;
        let weight = RATING_DECAY_PER_WEEK.powi(weeks);
        weighted_sum += f64::from(review.rating) * weight;
        weight_sum += weight;
    }

    ((weighted_sum / weight_sum) * 10.0).round() / 10.0
}

/// Orders reviews by net helpfulness (`upvotes - downvotes`) descending,
/// breaking ties by creation time, newest first. The sort is stable.
pub fn sort_by_helpfulness(mut reviews: Vec<ReviewModel>) -> Vec<ReviewModel> {
    reviews.sort_by(|a, b| {
        b.helpfulness()
            .cmp(&a.helpfulness())
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    reviews
}

#[derive(Debug, Clone)]
pub struct SubmitReviewInput {
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub title: Option<String>,
    pub body: String,
}

/// Sort order for public review listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSort {
    #[default]
    Recent,
    Helpful,
}

#[derive(Clone)]
pub struct ReviewService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ReviewService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a review for a product. Reviews start out `Pending` and
    /// only surface publicly once approved. One review per user and
    /// product; a second attempt fails with `Conflict`.
    #[instrument(skip(self, input), fields(product_id = %input.product_id, user_id = %input.user_id))]
    pub async fn submit_review(&self, input: SubmitReviewInput) -> Result<ReviewModel, ServiceError> {
        if !(0..=5).contains(&input.rating) {
            return Err(ServiceError::InvalidRating(input.rating));
        }
        let body = input.body.trim().to_string();
        if body.is_empty() {
            return Err(ServiceError::ValidationError(
                "Review body cannot be empty".into(),
            ));
        }

        let txn = self.db.begin().await?;

        let product = entities::Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        let already_reviewed = entities::Review::find()
            .filter(review::Column::ProductId.eq(input.product_id))
            .filter(review::Column::UserId.eq(input.user_id))
            .count(&txn)
            .await?
            > 0;
        if already_reviewed {
            return Err(ServiceError::Conflict(
                "You have already reviewed this product".into(),
            ));
        }

        let verified_purchase = self
            .has_purchased(&txn, input.user_id, input.product_id)
            .await?;

        let now = Utc::now();
        let created = review::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(input.product_id),
            user_id: Set(input.user_id),
            rating: Set(input.rating),
            title: Set(input.title),
            body: Set(body),
            status: Set(ModerationStatus::Pending),
            upvotes: Set(0),
            downvotes: Set(0),
            report_count: Set(0),
            verified_purchase: Set(verified_purchase),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let (rating, review_count) = self.recalculate_product_rating(&txn, product.id).await?;
        txn.commit().await?;

        metrics::REVIEWS_SUBMITTED_TOTAL.inc();
        info!(review_id = %created.id, verified_purchase, "Review submitted");
        self.event_sender
            .send_or_log(Event::ReviewSubmitted {
                review_id: created.id,
                product_id: created.product_id,
                user_id: created.user_id,
            })
            .await;
        self.event_sender
            .send_or_log(Event::ProductRatingRecalculated {
                product_id: product.id,
                rating,
                review_count,
            })
            .await;
        Ok(created)
    }

    /// Casts or switches a helpfulness vote. Re-voting the same direction
    /// is idempotent; switching direction moves the tallies.
    #[instrument(skip(self))]
    pub async fn vote_review(
        &self,
        review_id: Uuid,
        user_id: Uuid,
        vote: VoteKind,
    ) -> Result<ReviewModel, ServiceError> {
        let txn = self.db.begin().await?;

        let review = entities::Review::find_by_id(review_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::ReviewNotFound(review_id))?;

        let existing = entities::ReviewVote::find()
            .filter(review_vote::Column::ReviewId.eq(review_id))
            .filter(review_vote::Column::UserId.eq(user_id))
            .one(&txn)
            .await?;

        let now = Utc::now();
        match existing {
            Some(ref v) if v.vote == vote => {
                // Idempotent repeat; nothing changed.
                txn.commit().await?;
                return Ok(review);
            }
            Some(v) => {
                let mut active: review_vote::ActiveModel = v.into();
                active.vote = Set(vote);
                active.updated_at = Set(now);
                active.update(&txn).await?;
            }
            None => {
                review_vote::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    review_id: Set(review_id),
                    user_id: Set(user_id),
                    vote: Set(vote),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;
            }
        }

        let updated = self.sync_vote_tallies(&txn, &review).await?;
        self.recalculate_product_rating(&txn, review.product_id)
            .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ReviewVoted {
                review_id,
                product_id: review.product_id,
            })
            .await;
        Ok(updated)
    }

    /// Reports a review. The third report on an approved review flags it
    /// for re-moderation.
    #[instrument(skip(self))]
    pub async fn report_review(
        &self,
        review_id: Uuid,
        _reporter_id: Uuid,
    ) -> Result<ReviewModel, ServiceError> {
        let txn = self.db.begin().await?;

        let review = entities::Review::find_by_id(review_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::ReviewNotFound(review_id))?;

        let report_count = review.report_count + 1;
        let auto_flag = review.status == ModerationStatus::Approved
            && report_count >= AUTO_FLAG_REPORT_THRESHOLD;

        let product_id = review.product_id;
        let mut active: review::ActiveModel = review.into();
        active.report_count = Set(report_count);
        if auto_flag {
            active.status = Set(ModerationStatus::Flagged);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        self.recalculate_product_rating(&txn, product_id).await?;
        txn.commit().await?;

        if auto_flag {
            info!(%review_id, report_count, "Review auto-flagged");
            self.event_sender
                .send_or_log(Event::ReviewFlagged {
                    review_id,
                    product_id,
                    report_count,
                })
                .await;
        }
        Ok(updated)
    }

    /// Applies a moderator decision. Legal transitions are
    /// `pending -> approved | rejected`, `approved <-> flagged` and
    /// `flagged -> approved | rejected`.
    #[instrument(skip(self))]
    pub async fn moderate_review(
        &self,
        review_id: Uuid,
        next: ModerationStatus,
    ) -> Result<ReviewModel, ServiceError> {
        let txn = self.db.begin().await?;

        let review = entities::Review::find_by_id(review_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::ReviewNotFound(review_id))?;

        if !review.status.can_transition_to(next) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot transition review from {} to {}",
                review.status.as_str(),
                next.as_str()
            )));
        }

        let product_id = review.product_id;
        let author_id = review.user_id;
        let mut active: review::ActiveModel = review.into();
        active.status = Set(next);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        let (rating, review_count) = self.recalculate_product_rating(&txn, product_id).await?;
        txn.commit().await?;

        info!(%review_id, status = next.as_str(), "Review moderated");
        self.event_sender
            .send_or_log(Event::ReviewModerated {
                review_id,
                product_id,
                user_id: author_id,
                new_status: next.as_str().to_string(),
            })
            .await;
        self.event_sender
            .send_or_log(Event::ProductRatingRecalculated {
                product_id,
                rating,
                review_count,
            })
            .await;
        Ok(updated)
    }

    /// Deletes a review. Only the author or staff may delete; anyone else
    /// gets `UnauthorizedReviewDeletion`.
    #[instrument(skip(self))]
    pub async fn delete_review(
        &self,
        review_id: Uuid,
        actor_id: Uuid,
        actor_is_staff: bool,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let review = entities::Review::find_by_id(review_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::ReviewNotFound(review_id))?;

        if review.user_id != actor_id && !actor_is_staff {
            return Err(ServiceError::UnauthorizedReviewDeletion);
        }

        let product_id = review.product_id;
        review.delete(&txn).await?;
        self.recalculate_product_rating(&txn, product_id).await?;
        txn.commit().await?;

        info!(%review_id, "Review deleted");
        self.event_sender
            .send_or_log(Event::ReviewDeleted {
                review_id,
                product_id,
            })
            .await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_review(&self, review_id: Uuid) -> Result<ReviewModel, ServiceError> {
        entities::Review::find_by_id(review_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(ServiceError::ReviewNotFound(review_id))
    }

    /// Lists a product's approved reviews. `Helpful` ordering applies
    /// [`sort_by_helpfulness`] over the whole approved set before paging.
    #[instrument(skip(self))]
    pub async fn list_product_reviews(
        &self,
        product_id: Uuid,
        sort: ReviewSort,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ReviewModel>, u64), ServiceError> {
        let per_page = per_page.max(1);
        match sort {
            ReviewSort::Recent => {
                let paginator = entities::Review::find()
                    .filter(review::Column::ProductId.eq(product_id))
                    .filter(review::Column::Status.eq(ModerationStatus::Approved))
                    .order_by_desc(review::Column::CreatedAt)
                    .paginate(self.db.as_ref(), per_page);
                let total = paginator.num_items().await?;
                let reviews = paginator.fetch_page(page.saturating_sub(1)).await?;
                Ok((reviews, total))
            }
            ReviewSort::Helpful => {
                let approved = entities::Review::find()
                    .filter(review::Column::ProductId.eq(product_id))
                    .filter(review::Column::Status.eq(ModerationStatus::Approved))
                    .all(self.db.as_ref())
                    .await?;
                let total = approved.len() as u64;
                let start = (page.saturating_sub(1) * per_page) as usize;
                let reviews = sort_by_helpfulness(approved)
                    .into_iter()
                    .skip(start)
                    .take(per_page as usize)
                    .collect();
                Ok((reviews, total))
            }
        }
    }

    /// Lists reviews awaiting a moderator: `pending` and `flagged`.
    #[instrument(skip(self))]
    pub async fn moderation_queue(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ReviewModel>, u64), ServiceError> {
        let paginator = entities::Review::find()
            .filter(
                review::Column::Status
                    .is_in([ModerationStatus::Pending, ModerationStatus::Flagged]),
            )
            .order_by_asc(review::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let reviews = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((reviews, total))
    }

    async fn has_purchased<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let purchases = entities::OrderItem::find()
            .join(JoinType::InnerJoin, order_item::Relation::Order.def())
            .filter(order_item::Column::ProductId.eq(product_id))
            .filter(order::Column::UserId.eq(user_id))
            .filter(order::Column::Status.is_in([
                OrderStatus::Paid,
                OrderStatus::Shipped,
                OrderStatus::Delivered,
            ]))
            .count(conn)
            .await?;
        Ok(purchases > 0)
    }

    /// Recounts both vote directions from `review_votes` and persists the
    /// tallies on the review row.
    async fn sync_vote_tallies<C: ConnectionTrait>(
        &self,
        conn: &C,
        review: &ReviewModel,
    ) -> Result<ReviewModel, ServiceError> {
        let upvotes = entities::ReviewVote::find()
            .filter(review_vote::Column::ReviewId.eq(review.id))
            .filter(review_vote::Column::Vote.eq(VoteKind::Up))
            .count(conn)
            .await? as i32;
        let downvotes = entities::ReviewVote::find()
            .filter(review_vote::Column::ReviewId.eq(review.id))
            .filter(review_vote::Column::Vote.eq(VoteKind::Down))
            .count(conn)
            .await? as i32;

        let mut active: review::ActiveModel = review.clone().into();
        active.upvotes = Set(upvotes);
        active.downvotes = Set(downvotes);
        active.updated_at = Set(Utc::now());
        Ok(active.update(conn).await?)
    }

    /// Recomputes and persists the product's denormalized rating aggregate
    /// from its approved reviews. This is the only code path that writes
    /// `products.rating` and `products.review_count`; it must run inside
    /// the caller's transaction.
    async fn recalculate_product_rating<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
    ) -> Result<(f64, i32), ServiceError> {
        let approved = entities::Review::find()
            .filter(review::Column::ProductId.eq(product_id))
            .filter(review::Column::Status.eq(ModerationStatus::Approved))
            .all(conn)
            .await?;

        let rating = weighted_rating(&approved, Utc::now());
        let review_count = approved.len() as i32;

        entities::Product::update_many()
            .col_expr(product::Column::Rating, Expr::value(rating))
            .col_expr(product::Column::ReviewCount, Expr::value(review_count))
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;

        metrics::RATING_RECALCULATIONS_TOTAL.inc();
        Ok((rating, review_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn review_at(rating: i16, created_at: DateTime<Utc>) -> ReviewModel {
        ReviewModel {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            rating,
            title: None,
            body: "ok".into(),
            status: ModerationStatus::Approved,
            upvotes: 0,
            downvotes: 0,
            report_count: 0,
            verified_purchase: false,
            created_at,
            updated_at: created_at,
        }
    }

    fn voted(mut review: ReviewModel, upvotes: i32, downvotes: i32) -> ReviewModel {
        review.upvotes = upvotes;
        review.downvotes = downvotes;
        review
    }

    #[test]
    fn empty_review_set_scores_zero() {
        assert_eq!(weighted_rating(&[], Utc::now()), 0.0);
    }

    #[test]
    fn single_fresh_review_scores_its_own_rating() {
        let now = Utc::now();
        let reviews = vec![review_at(4, now)];
        assert_eq!(weighted_rating(&reviews, now), 4.0);
    }

    #[test]
    fn recent_reviews_outweigh_old_ones() {
        let now = Utc::now();
        let reviews = vec![
            review_at(5, now),
            review_at(1, now - Duration::weeks(10)),
        ];
        let rating = weighted_rating(&reviews, now);
        // 0.9^10 ~ 0.349, so the fresh 5 dominates the stale 1.
        assert!(rating > 3.0, "rating was {}", rating);
        assert!(rating <= 5.0);
    }

    #[test]
    fn unweighted_when_all_reviews_are_equally_fresh() {
        let now = Utc::now();
        let reviews = vec![review_at(5, now), review_at(2, now)];
        assert_eq!(weighted_rating(&reviews, now), 3.5);
    }

    #[test]
    fn partial_weeks_do_not_decay() {
        let now = Utc::now();
        let reviews = vec![review_at(3, now - Duration::days(6))];
        assert_eq!(weighted_rating(&reviews, now), 3.0);
    }

    #[test]
    fn future_created_at_is_treated_as_fresh() {
        let now = Utc::now();
        let reviews = vec![review_at(4, now + Duration::days(3))];
        assert_eq!(weighted_rating(&reviews, now), 4.0);
    }

    #[test]
    fn rating_rounds_to_one_decimal() {
        let now = Utc::now();
        let reviews = vec![review_at(5, now), review_at(5, now), review_at(4, now)];
        // Mean is 4.666..., which rounds to 4.7.
        assert_eq!(weighted_rating(&reviews, now), 4.7);
    }

    #[test]
    fn helpfulness_sort_breaks_ties_newest_first() {
        let t1 = Utc::now() - Duration::hours(3);
        let t2 = t1 + Duration::hours(1);
        let t3 = t1 + Duration::hours(2);

        let a = voted(review_at(5, t1), 10, 2);
        let b = voted(review_at(4, t2), 3, 1);
        let c = voted(review_at(3, t3), 10, 2);

        let sorted = sort_by_helpfulness(vec![a.clone(), b.clone(), c.clone()]);
        // Both +8 reviews precede the +2 one; of the tied pair the newer
        // (t3) comes first.
        assert_eq!(
            sorted.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![c.id, a.id, b.id]
        );
    }

    #[test]
    fn helpfulness_sort_is_stable_for_full_ties() {
        let t = Utc::now();
        let a = voted(review_at(5, t), 2, 0);
        let b = voted(review_at(4, t), 2, 0);

        let sorted = sort_by_helpfulness(vec![a.clone(), b.clone()]);
        assert_eq!(
            sorted.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![a.id, b.id]
        );
    }
}
