use crate::{
    db::DbPool,
    entities::visit::{self, Entity as Visit, VisitStatus, VisitType},
    errors::ServiceError,
    events::{Event, EventSender},
    services::sequence::{self, ReferencePrefix},
};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    Select, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateVisitRequest {
    pub branch_id: Uuid,
    pub sales_id: Uuid,
    pub area_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    pub visit_type: VisitType,
    pub visit_date: Option<NaiveDate>,
    pub purpose: Option<String>,
    pub notes: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub photo: Option<String>,
}

/// Visit counts for a rep or branch, with rolling calendar windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitStatistics {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub today: u64,
    pub this_week: u64,
    pub this_month: u64,
}

/// The field-visit workflow: create as pending, then a supervisor approves
/// or rejects. Both outcomes are terminal.
#[derive(Clone)]
pub struct VisitService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl VisitService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(branch_id = %request.branch_id, sales_id = %request.sales_id))]
    pub async fn create(
        &self,
        request: CreateVisitRequest,
        actor: Uuid,
    ) -> Result<visit::Model, ServiceError> {
        request.validate()?;

        let db = &*self.db_pool;
        let now = Utc::now();
        let visit_date = request.visit_date.unwrap_or_else(|| now.date_naive());
        let visit_id = Uuid::new_v4();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for visit creation");
            ServiceError::DatabaseError(e)
        })?;

        let visit_number = sequence::next_reference(&txn, ReferencePrefix::Vst, visit_date).await?;

        let row = visit::ActiveModel {
            id: Set(visit_id),
            visit_number: Set(visit_number.clone()),
            visit_date: Set(visit_date),
            branch_id: Set(request.branch_id),
            sales_id: Set(request.sales_id),
            area_id: Set(request.area_id),
            customer_name: Set(request.customer_name.clone()),
            visit_type: Set(request.visit_type.to_string()),
            status: Set(VisitStatus::Pending.to_string()),
            purpose: Set(request.purpose.clone()),
            result: Set(None),
            notes: Set(request.notes.clone()),
            rejection_reason: Set(None),
            latitude: Set(request.latitude),
            longitude: Set(request.longitude),
            photo: Set(request.photo.clone()),
            approved_at: Set(None),
            approved_by: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let visit = row.insert(&txn).await.map_err(|e| {
            error!(error = %e, visit_id = %visit_id, "Failed to persist visit");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(visit_id = %visit_id, visit_number = %visit_number, created_by = %actor, "Visit created");

        self.emit(Event::VisitCreated {
            visit_id,
            visit_number,
        })
        .await;

        Ok(visit)
    }

    /// Approves a pending visit, optionally recording the outcome text.
    #[instrument(skip(self, result), fields(visit_id = %id))]
    pub async fn approve(
        &self,
        id: Uuid,
        approver: Uuid,
        result: Option<String>,
    ) -> Result<visit::Model, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;
        let visit = self.fetch(&txn, id).await?;
        self.ensure_pending(&visit)?;

        let mut update = Visit::update_many()
            .col_expr(
                visit::Column::Status,
                Expr::value(VisitStatus::Approved.to_string()),
            )
            .col_expr(visit::Column::ApprovedAt, Expr::value(now))
            .col_expr(visit::Column::ApprovedBy, Expr::value(approver))
            .col_expr(visit::Column::UpdatedAt, Expr::value(now));
        if let Some(result) = result {
            update = update.col_expr(visit::Column::Result, Expr::value(result));
        }
        let claimed = update
            .filter(visit::Column::Id.eq(id))
            .filter(visit::Column::Status.eq(VisitStatus::Pending.to_string()))
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if claimed.rows_affected == 0 {
            return Err(ServiceError::UnauthorizedAction(format!(
                "Visit {} was concurrently finalized",
                visit.visit_number
            )));
        }

        let approved = self.fetch(&txn, id).await?;
        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(visit_id = %id, approved_by = %approver, "Visit approved");

        self.emit(Event::VisitApproved {
            visit_id: id,
            approved_by: approver,
        })
        .await;

        Ok(approved)
    }

    /// Rejects a pending visit. The reason lands in `rejection_reason`;
    /// `notes` is left untouched.
    #[instrument(skip(self, reason), fields(visit_id = %id))]
    pub async fn reject(
        &self,
        id: Uuid,
        rejecter: Uuid,
        reason: String,
    ) -> Result<visit::Model, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "A rejection reason is required".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;
        let visit = self.fetch(&txn, id).await?;
        self.ensure_pending(&visit)?;

        let claimed = Visit::update_many()
            .col_expr(
                visit::Column::Status,
                Expr::value(VisitStatus::Rejected.to_string()),
            )
            .col_expr(visit::Column::RejectionReason, Expr::value(reason.clone()))
            .col_expr(visit::Column::ApprovedBy, Expr::value(rejecter))
            .col_expr(visit::Column::UpdatedAt, Expr::value(now))
            .filter(visit::Column::Id.eq(id))
            .filter(visit::Column::Status.eq(VisitStatus::Pending.to_string()))
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if claimed.rows_affected == 0 {
            return Err(ServiceError::UnauthorizedAction(format!(
                "Visit {} was concurrently finalized",
                visit.visit_number
            )));
        }

        let rejected = self.fetch(&txn, id).await?;
        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(visit_id = %id, rejected_by = %rejecter, "Visit rejected");

        self.emit(Event::VisitRejected {
            visit_id: id,
            rejected_by: rejecter,
            reason,
        })
        .await;

        Ok(rejected)
    }

    /// Visit counts, optionally scoped to a branch and/or a sales rep.
    /// Calendar windows are computed from today: ISO week (Monday start)
    /// and calendar month, both half-open so visits dated outside the
    /// window on either side stay out.
    #[instrument(skip(self))]
    pub async fn statistics(
        &self,
        branch_id: Option<Uuid>,
        sales_id: Option<Uuid>,
    ) -> Result<VisitStatistics, ServiceError> {
        let db = &*self.db_pool;
        let today = Utc::now().date_naive();
        let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        let week_end = week_start + Duration::days(7);
        let month_start = today.with_day(1).ok_or_else(|| {
            ServiceError::InternalError("failed to compute month start".to_string())
        })?;
        let month_end = next_month_start(month_start)?;

        let scoped = || {
            let mut query = Visit::find();
            if let Some(branch_id) = branch_id {
                query = query.filter(visit::Column::BranchId.eq(branch_id));
            }
            if let Some(sales_id) = sales_id {
                query = query.filter(visit::Column::SalesId.eq(sales_id));
            }
            query
        };
        let by_status = |status: VisitStatus| {
            scoped().filter(visit::Column::Status.eq(status.to_string()))
        };

        Ok(VisitStatistics {
            total: count(db, scoped()).await?,
            pending: count(db, by_status(VisitStatus::Pending)).await?,
            approved: count(db, by_status(VisitStatus::Approved)).await?,
            rejected: count(db, by_status(VisitStatus::Rejected)).await?,
            today: count(db, scoped().filter(visit::Column::VisitDate.eq(today))).await?,
            this_week: count(
                db,
                scoped()
                    .filter(visit::Column::VisitDate.gte(week_start))
                    .filter(visit::Column::VisitDate.lt(week_end)),
            )
            .await?,
            this_month: count(
                db,
                scoped()
                    .filter(visit::Column::VisitDate.gte(month_start))
                    .filter(visit::Column::VisitDate.lt(month_end)),
            )
            .await?,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_visit(&self, id: Uuid) -> Result<visit::Model, ServiceError> {
        let db = &*self.db_pool;
        self.fetch(db, id).await
    }

    fn ensure_pending(&self, visit: &visit::Model) -> Result<(), ServiceError> {
        let status: VisitStatus = visit.status.parse().map_err(|_| {
            ServiceError::InternalError(format!("unknown visit status '{}'", visit.status))
        })?;
        if status != VisitStatus::Pending {
            return Err(ServiceError::UnauthorizedAction(format!(
                "Visit {} is already {}",
                visit.visit_number, visit.status
            )));
        }
        Ok(())
    }

    async fn fetch<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: Uuid,
    ) -> Result<visit::Model, ServiceError> {
        Visit::find_by_id(id)
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Visit {} not found", id)))
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send visit event");
            }
        }
    }
}

async fn count(db: &DbPool, query: Select<Visit>) -> Result<u64, ServiceError> {
    query.count(db).await.map_err(ServiceError::DatabaseError)
}

fn next_month_start(month_start: NaiveDate) -> Result<NaiveDate, ServiceError> {
    let (year, month) = if month_start.month() == 12 {
        (month_start.year() + 1, 1)
    } else {
        (month_start.year(), month_start.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        ServiceError::InternalError("failed to compute month end".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_window_upper_bound_rolls_over_the_year() {
        let december = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        assert_eq!(
            next_month_start(december).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
        let june = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(
            next_month_start(june).unwrap(),
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
        );
    }
}
