use crate::{
    db::DbPool,
    entities::{
        stock::{self, Entity as Stock},
        stock_movement::{self, Entity as StockMovement, MovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::sequence,
};
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// One line of a physical stock count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpnameLine {
    pub product_id: Uuid,
    pub physical_quantity: i32,
}

/// Outcome of reconciling one counted line that differed from the system.
#[derive(Debug, Clone, Serialize)]
pub struct StockAdjustment {
    pub product_id: Uuid,
    pub previous_quantity: i32,
    pub physical_quantity: i32,
    pub difference: i32,
    pub reference_number: String,
}

/// Result of a branch-to-branch transfer.
#[derive(Debug, Clone)]
pub struct StockTransfer {
    pub from_record: stock::Model,
    pub to_record: stock::Model,
    pub movement: stock_movement::Model,
}

const MOVEMENT_REFERENCE_ATTEMPTS: usize = 5;
const OPNAME_CONFLICT_ATTEMPTS: usize = 3;

/// The stock ledger. Sole owner of stock records and their movement log;
/// every quantity change in the system goes through one of its operations,
/// each of which runs as a single atomic unit of work.
#[derive(Clone)]
pub struct StockService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl StockService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Returns the stock record for a (product, branch) pair, creating an
    /// empty one on first use. Idempotent.
    #[instrument(skip(self))]
    pub async fn get_or_create(
        &self,
        product_id: Uuid,
        branch_id: Uuid,
    ) -> Result<stock::Model, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;
        let record = self.get_or_create_record(&txn, product_id, branch_id).await?;
        txn.commit().await.map_err(ServiceError::DatabaseError)?;
        Ok(record)
    }

    /// Increments stock and appends a movement with `to_branch_id` set.
    #[instrument(skip(self, notes), fields(product_id = %product_id, branch_id = %branch_id))]
    pub async fn add_stock(
        &self,
        product_id: Uuid,
        branch_id: Uuid,
        quantity: i32,
        movement_type: MovementType,
        notes: Option<String>,
        actor: Uuid,
    ) -> Result<stock::Model, ServiceError> {
        validate_positive_quantity(quantity)?;

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for stock addition");
            ServiceError::DatabaseError(e)
        })?;

        let (record, movement) = self
            .apply_addition(&txn, product_id, branch_id, quantity, movement_type, notes, actor)
            .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            product_id = %product_id,
            branch_id = %branch_id,
            quantity = quantity,
            new_quantity = record.quantity,
            "Stock added"
        );

        self.emit(Event::StockAdded {
            product_id,
            branch_id,
            quantity,
            new_quantity: record.quantity,
            reference_number: movement.reference_number.clone(),
        })
        .await;
        self.emit_low_stock(&record).await;

        Ok(record)
    }

    /// Decrements stock, failing with `InsufficientStock` when the record
    /// holds less than requested. The decrement is a conditional update, so
    /// two concurrent reductions can never drive the quantity negative.
    #[instrument(skip(self, notes), fields(product_id = %product_id, branch_id = %branch_id))]
    pub async fn reduce_stock(
        &self,
        product_id: Uuid,
        branch_id: Uuid,
        quantity: i32,
        movement_type: MovementType,
        notes: Option<String>,
        actor: Uuid,
    ) -> Result<stock::Model, ServiceError> {
        validate_positive_quantity(quantity)?;

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for stock reduction");
            ServiceError::DatabaseError(e)
        })?;

        let (record, movement) = self
            .apply_reduction(&txn, product_id, branch_id, quantity, movement_type, notes, actor)
            .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            product_id = %product_id,
            branch_id = %branch_id,
            quantity = quantity,
            new_quantity = record.quantity,
            "Stock reduced"
        );

        self.emit(Event::StockReduced {
            product_id,
            branch_id,
            quantity,
            new_quantity: record.quantity,
            reference_number: movement.reference_number.clone(),
        })
        .await;
        self.emit_low_stock(&record).await;

        Ok(record)
    }

    /// Moves stock between branches as one atomic unit recording a single
    /// `transfer` movement with both branch columns populated. Nothing
    /// mutates when the source has insufficient quantity.
    #[instrument(skip(self, notes), fields(product_id = %product_id))]
    pub async fn transfer_stock(
        &self,
        product_id: Uuid,
        from_branch_id: Uuid,
        to_branch_id: Uuid,
        quantity: i32,
        notes: Option<String>,
        actor: Uuid,
    ) -> Result<StockTransfer, ServiceError> {
        validate_positive_quantity(quantity)?;
        if from_branch_id == to_branch_id {
            return Err(ServiceError::ValidationError(
                "Source and destination branch must differ".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for stock transfer");
            ServiceError::DatabaseError(e)
        })?;

        let from_record = self
            .get_or_create_record(&txn, product_id, from_branch_id)
            .await?;
        self.try_decrement(&txn, &from_record, quantity).await?;

        let to_record = self
            .get_or_create_record(&txn, product_id, to_branch_id)
            .await?;
        self.bump_quantity(&txn, to_record.id, quantity).await?;

        let movement = self
            .record_movement(
                &txn,
                product_id,
                Some(from_branch_id),
                Some(to_branch_id),
                MovementType::Transfer,
                quantity,
                notes,
                actor,
            )
            .await?;

        let from_record = self.fetch_record(&txn, from_record.id).await?;
        let to_record = self.fetch_record(&txn, to_record.id).await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            product_id = %product_id,
            from_branch_id = %from_branch_id,
            to_branch_id = %to_branch_id,
            quantity = quantity,
            "Stock transferred"
        );

        self.emit(Event::StockTransferred {
            product_id,
            from_branch_id,
            to_branch_id,
            quantity,
            reference_number: movement.reference_number.clone(),
        })
        .await;
        self.emit_low_stock(&from_record).await;

        Ok(StockTransfer {
            from_record,
            to_record,
            movement,
        })
    }

    /// Reconciles a physical count against system quantities for one
    /// branch. Lines whose count matches the system produce no movement and
    /// are excluded from the result; the whole batch commits or rolls back
    /// together.
    #[instrument(skip(self, lines), fields(branch_id = %branch_id, lines = lines.len()))]
    pub async fn stock_opname(
        &self,
        branch_id: Uuid,
        lines: Vec<OpnameLine>,
        actor: Uuid,
    ) -> Result<Vec<StockAdjustment>, ServiceError> {
        for line in &lines {
            if line.physical_quantity < 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Physical quantity for product {} must not be negative",
                    line.product_id
                )));
            }
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for stock opname");
            ServiceError::DatabaseError(e)
        })?;

        let mut adjustments = Vec::new();

        for line in lines {
            let mut record = self
                .get_or_create_record(&txn, line.product_id, branch_id)
                .await?;
            let mut applied = None;

            // The overwrite is conditional on the quantity we computed the
            // difference from, so a mutation committed between the read and
            // the write cannot be clobbered; on a conflict re-read and
            // recompute, bounded.
            for _ in 0..OPNAME_CONFLICT_ATTEMPTS {
                let difference = line.physical_quantity - record.quantity;
                if difference == 0 {
                    applied = Some(None);
                    break;
                }

                let claimed = Stock::update_many()
                    .col_expr(stock::Column::Quantity, Expr::value(line.physical_quantity))
                    .col_expr(stock::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(stock::Column::Id.eq(record.id))
                    .filter(stock::Column::Quantity.eq(record.quantity))
                    .exec(&txn)
                    .await
                    .map_err(ServiceError::DatabaseError)?;
                if claimed.rows_affected == 0 {
                    record = self.fetch_record(&txn, record.id).await?;
                    continue;
                }

                let (from_branch, to_branch) = if difference < 0 {
                    (Some(branch_id), None)
                } else {
                    (None, Some(branch_id))
                };
                let movement = self
                    .record_movement(
                        &txn,
                        line.product_id,
                        from_branch,
                        to_branch,
                        MovementType::Adjustment,
                        difference.abs(),
                        Some(format!(
                            "Stock opname: system {} counted {}",
                            record.quantity, line.physical_quantity
                        )),
                        actor,
                    )
                    .await?;

                applied = Some(Some(StockAdjustment {
                    product_id: line.product_id,
                    previous_quantity: record.quantity,
                    physical_quantity: line.physical_quantity,
                    difference,
                    reference_number: movement.reference_number,
                }));
                break;
            }

            match applied {
                Some(Some(adjustment)) => adjustments.push(adjustment),
                Some(None) => {}
                None => {
                    return Err(ServiceError::InvalidOperation(format!(
                        "Concurrent stock activity kept invalidating the count for product {}",
                        line.product_id
                    )));
                }
            }
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            branch_id = %branch_id,
            adjusted = adjustments.len(),
            "Stock opname applied"
        );

        for adjustment in &adjustments {
            self.emit(Event::StockAdjusted {
                product_id: adjustment.product_id,
                branch_id,
                previous_quantity: adjustment.previous_quantity,
                new_quantity: adjustment.physical_quantity,
                reference_number: adjustment.reference_number.clone(),
            })
            .await;
        }

        Ok(adjustments)
    }

    /// Records at or below their minimum, lowest quantity first.
    #[instrument(skip(self))]
    pub async fn low_stock_alerts(
        &self,
        branch_id: Option<Uuid>,
    ) -> Result<Vec<stock::Model>, ServiceError> {
        let db = &*self.db_pool;

        let mut query = Stock::find().filter(
            Expr::col(stock::Column::Quantity).lte(Expr::col(stock::Column::MinimumStock)),
        );
        if let Some(branch_id) = branch_id {
            query = query.filter(stock::Column::BranchId.eq(branch_id));
        }

        query
            .order_by_asc(stock::Column::Quantity)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Current record for a pair, if any movement ever touched it.
    #[instrument(skip(self))]
    pub async fn get_stock(
        &self,
        product_id: Uuid,
        branch_id: Uuid,
    ) -> Result<Option<stock::Model>, ServiceError> {
        let db = &*self.db_pool;
        Stock::find()
            .filter(stock::Column::ProductId.eq(product_id))
            .filter(stock::Column::BranchId.eq(branch_id))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Recent movements for a product, newest first, optionally scoped to
    /// movements touching one branch on either side.
    #[instrument(skip(self))]
    pub async fn movement_history(
        &self,
        product_id: Uuid,
        branch_id: Option<Uuid>,
        limit: u64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let db = &*self.db_pool;

        let mut query = StockMovement::find()
            .filter(stock_movement::Column::ProductId.eq(product_id));
        if let Some(branch_id) = branch_id {
            query = query.filter(
                Condition::any()
                    .add(stock_movement::Column::FromBranchId.eq(branch_id))
                    .add(stock_movement::Column::ToBranchId.eq(branch_id)),
            );
        }

        query
            .order_by_desc(stock_movement::Column::CreatedAt)
            .order_by_desc(stock_movement::Column::Id)
            .limit(limit)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    // ---- transaction-scoped primitives -------------------------------------
    //
    // The sales transaction engine composes these on its own open
    // transaction; it never touches stock rows directly.

    pub(crate) async fn apply_addition<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        branch_id: Uuid,
        quantity: i32,
        movement_type: MovementType,
        notes: Option<String>,
        actor: Uuid,
    ) -> Result<(stock::Model, stock_movement::Model), ServiceError> {
        let record = self.get_or_create_record(conn, product_id, branch_id).await?;
        self.bump_quantity(conn, record.id, quantity).await?;
        let movement = self
            .record_movement(
                conn,
                product_id,
                None,
                Some(branch_id),
                movement_type,
                quantity,
                notes,
                actor,
            )
            .await?;
        let record = self.fetch_record(conn, record.id).await?;
        Ok((record, movement))
    }

    pub(crate) async fn apply_reduction<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        branch_id: Uuid,
        quantity: i32,
        movement_type: MovementType,
        notes: Option<String>,
        actor: Uuid,
    ) -> Result<(stock::Model, stock_movement::Model), ServiceError> {
        let record = self.get_or_create_record(conn, product_id, branch_id).await?;
        self.try_decrement(conn, &record, quantity).await?;
        let movement = self
            .record_movement(
                conn,
                product_id,
                Some(branch_id),
                None,
                movement_type,
                quantity,
                notes,
                actor,
            )
            .await?;
        let record = self.fetch_record(conn, record.id).await?;
        Ok((record, movement))
    }

    async fn get_or_create_record<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        branch_id: Uuid,
    ) -> Result<stock::Model, ServiceError> {
        let existing = Stock::find()
            .filter(stock::Column::ProductId.eq(product_id))
            .filter(stock::Column::BranchId.eq(branch_id))
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if let Some(record) = existing {
            return Ok(record);
        }

        let now = Utc::now();
        let fresh = stock::ActiveModel {
            product_id: Set(product_id),
            branch_id: Set(branch_id),
            quantity: Set(0),
            minimum_stock: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        // Losing the creation race must not fail the statement: a failed
        // insert would leave the caller's transaction aborted on Postgres.
        match Stock::insert(fresh)
            .on_conflict(
                OnConflict::columns([stock::Column::ProductId, stock::Column::BranchId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec(conn)
            .await
        {
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(err) => return Err(ServiceError::DatabaseError(err)),
        }

        Stock::find()
            .filter(stock::Column::ProductId.eq(product_id))
            .filter(stock::Column::BranchId.eq(branch_id))
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "stock record vanished for product {} branch {}",
                    product_id, branch_id
                ))
            })
    }

    async fn bump_quantity<C: ConnectionTrait>(
        &self,
        conn: &C,
        record_id: i64,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        Stock::update_many()
            .col_expr(
                stock::Column::Quantity,
                Expr::col(stock::Column::Quantity).add(quantity),
            )
            .col_expr(stock::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock::Column::Id.eq(record_id))
            .exec(conn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        Ok(())
    }

    /// Conditional decrement: only succeeds while the row still holds at
    /// least `quantity`, so the availability check and the write cannot be
    /// split by a concurrent writer.
    async fn try_decrement<C: ConnectionTrait>(
        &self,
        conn: &C,
        record: &stock::Model,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let updated = Stock::update_many()
            .col_expr(
                stock::Column::Quantity,
                Expr::col(stock::Column::Quantity).sub(quantity),
            )
            .col_expr(stock::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock::Column::Id.eq(record.id))
            .filter(stock::Column::Quantity.gte(quantity))
            .exec(conn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if updated.rows_affected == 0 {
            let current = self.fetch_record(conn, record.id).await?;
            warn!(
                product_id = %record.product_id,
                branch_id = %record.branch_id,
                requested = quantity,
                available = current.quantity,
                "Insufficient stock for reduction"
            );
            return Err(ServiceError::InsufficientStock {
                product_id: record.product_id,
                requested: quantity,
                available: current.quantity,
            });
        }
        Ok(())
    }

    async fn record_movement<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        from_branch_id: Option<Uuid>,
        to_branch_id: Option<Uuid>,
        movement_type: MovementType,
        quantity: i32,
        notes: Option<String>,
        actor: Uuid,
    ) -> Result<stock_movement::Model, ServiceError> {
        let today = Utc::now().date_naive();

        for _ in 0..MOVEMENT_REFERENCE_ATTEMPTS {
            let movement = stock_movement::ActiveModel {
                reference_number: Set(sequence::movement_reference(today)),
                product_id: Set(product_id),
                from_branch_id: Set(from_branch_id),
                to_branch_id: Set(to_branch_id),
                movement_type: Set(movement_type.to_string()),
                quantity: Set(quantity),
                notes: Set(notes.clone()),
                created_by: Set(actor),
                created_at: Set(Utc::now()),
                ..Default::default()
            };
            // do-nothing keeps a reference collision from failing the
            // statement and aborting the enclosing transaction on Postgres.
            match StockMovement::insert(movement)
                .on_conflict(
                    OnConflict::column(stock_movement::Column::ReferenceNumber)
                        .do_nothing()
                        .to_owned(),
                )
                .exec(conn)
                .await
            {
                Ok(inserted) => {
                    return StockMovement::find_by_id(inserted.last_insert_id)
                        .one(conn)
                        .await
                        .map_err(ServiceError::DatabaseError)?
                        .ok_or_else(|| {
                            ServiceError::InternalError(
                                "movement row vanished after insert".to_string(),
                            )
                        });
                }
                // Re-roll the random suffix on the rare reference collision.
                Err(DbErr::RecordNotInserted) => continue,
                Err(err) => return Err(ServiceError::DatabaseError(err)),
            }
        }

        Err(ServiceError::InternalError(
            "could not allocate a unique movement reference".to_string(),
        ))
    }

    async fn fetch_record<C: ConnectionTrait>(
        &self,
        conn: &C,
        record_id: i64,
    ) -> Result<stock::Model, ServiceError> {
        Stock::find_by_id(record_id)
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::InternalError(format!("stock record {} disappeared", record_id))
            })
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send stock event");
            }
        }
    }

    async fn emit_low_stock(&self, record: &stock::Model) {
        if record.is_low() {
            self.emit(Event::LowStockDetected {
                product_id: record.product_id,
                branch_id: record.branch_id,
                quantity: record.quantity,
                minimum_stock: record.minimum_stock,
            })
            .await;
        }
    }
}

fn validate_positive_quantity(quantity: i32) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_quantities() {
        assert!(matches!(
            validate_positive_quantity(0),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            validate_positive_quantity(-3),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(validate_positive_quantity(1).is_ok());
    }
}
