use crate::{
    db::DbPool,
    entities::{
        commission::{self, CommissionStatus},
        sales_transaction::{self, Entity as SalesTransaction, TransactionStatus},
        sales_transaction_item::{self, Entity as SalesTransactionItem},
        stock::{self, Entity as Stock},
        stock_movement::MovementType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        sequence::{self, ReferencePrefix},
        stock::StockService,
    },
};
use chrono::{NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
    pub discount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTransactionRequest {
    pub branch_id: Uuid,
    pub sales_id: Uuid,
    pub area_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    pub customer_phone: Option<String>,
    /// Callers may bring their own number; normally generated.
    pub transaction_number: Option<String>,
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method: String,
    /// Transaction-level discount, applied after item subtotals.
    pub discount: Option<Decimal>,
    /// Tax rate as a fraction (0.11 for 11%); tax is rounded half-up to 2dp.
    pub tax_rate: Option<Decimal>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "At least one line item is required"))]
    pub items: Vec<TransactionItemRequest>,
}

/// A transaction with its line items loaded.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetail {
    pub transaction: sales_transaction::Model,
    pub items: Vec<sales_transaction_item::Model>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    pub total_transactions: u64,
    pub total_sales: Decimal,
    pub average_transaction: Decimal,
}

/// The sales transaction engine. Owns transaction headers and items, drives
/// the pending → approved/cancelled state machine, and mutates inventory
/// only through the stock ledger's transaction-scoped primitives.
#[derive(Clone)]
pub struct SalesTransactionService {
    db_pool: Arc<DbPool>,
    stock: StockService,
    event_sender: Option<Arc<EventSender>>,
}

impl SalesTransactionService {
    pub fn new(
        db_pool: Arc<DbPool>,
        stock: StockService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            stock,
            event_sender,
        }
    }

    /// Creates a pending transaction: validates availability for every line
    /// in order, computes totals, persists header + items and reduces stock,
    /// all in one atomic unit. Any failure leaves no trace.
    #[instrument(skip(self, request), fields(branch_id = %request.branch_id, sales_id = %request.sales_id))]
    pub async fn create(
        &self,
        request: CreateTransactionRequest,
        actor: Uuid,
    ) -> Result<TransactionDetail, ServiceError> {
        request.validate()?;
        for item in &request.items {
            if item.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for product {} must be greater than zero",
                    item.product_id
                )));
            }
            if item.price < Decimal::ZERO || item.discount.unwrap_or(Decimal::ZERO) < Decimal::ZERO
            {
                return Err(ServiceError::ValidationError(format!(
                    "Price and discount for product {} must not be negative",
                    item.product_id
                )));
            }
        }

        let db = &*self.db_pool;
        let now = Utc::now();
        let today = now.date_naive();
        let transaction_id = Uuid::new_v4();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for sale creation");
            ServiceError::DatabaseError(e)
        })?;

        // Availability pass over all items, in line-item order, before any
        // mutation. The reductions below re-check under the conditional
        // update, so a race between the two passes still rolls back cleanly.
        for item in &request.items {
            let available = Stock::find()
                .filter(stock::Column::ProductId.eq(item.product_id))
                .filter(stock::Column::BranchId.eq(request.branch_id))
                .one(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?
                .map(|record| record.quantity)
                .unwrap_or(0);
            if available < item.quantity {
                return Err(ServiceError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available,
                });
            }
        }

        let mut subtotal_sum = Decimal::ZERO;
        let mut item_subtotals = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let line = Decimal::from(item.quantity) * item.price
                - item.discount.unwrap_or(Decimal::ZERO);
            subtotal_sum += line;
            item_subtotals.push(line);
        }
        let discount = request.discount.unwrap_or(Decimal::ZERO);
        let tax = request
            .tax_rate
            .map(|rate| round_money(subtotal_sum * rate))
            .unwrap_or(Decimal::ZERO);
        let total = subtotal_sum - discount + tax;

        let transaction_number = match request.transaction_number.clone() {
            Some(number) => number,
            None => sequence::next_reference(&txn, ReferencePrefix::Trx, today).await?,
        };

        let header = sales_transaction::ActiveModel {
            id: Set(transaction_id),
            transaction_number: Set(transaction_number.clone()),
            transaction_date: Set(today),
            branch_id: Set(request.branch_id),
            sales_id: Set(request.sales_id),
            area_id: Set(request.area_id),
            customer_name: Set(request.customer_name.clone()),
            customer_phone: Set(request.customer_phone.clone()),
            subtotal: Set(subtotal_sum),
            discount: Set(discount),
            tax: Set(tax),
            total: Set(total),
            payment_method: Set(request.payment_method.clone()),
            status: Set(TransactionStatus::Pending.to_string()),
            notes: Set(request.notes.clone()),
            approved_at: Set(None),
            approved_by: Set(None),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let transaction = header.insert(&txn).await.map_err(|e| {
            error!(error = %e, transaction_id = %transaction_id, "Failed to persist transaction header");
            ServiceError::DatabaseError(e)
        })?;

        let mut items = Vec::with_capacity(request.items.len());
        for (item, line_subtotal) in request.items.iter().zip(item_subtotals) {
            let row = sales_transaction_item::ActiveModel {
                transaction_id: Set(transaction_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                price: Set(item.price),
                discount: Set(item.discount.unwrap_or(Decimal::ZERO)),
                subtotal: Set(line_subtotal),
                ..Default::default()
            };
            let persisted = row.insert(&txn).await.map_err(ServiceError::DatabaseError)?;

            self.stock
                .apply_reduction(
                    &txn,
                    item.product_id,
                    request.branch_id,
                    item.quantity,
                    MovementType::Sale,
                    Some(format!("Sale {}", transaction_number)),
                    actor,
                )
                .await?;

            items.push(persisted);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, transaction_id = %transaction_id, "Failed to commit sale creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            transaction_id = %transaction_id,
            transaction_number = %transaction_number,
            total = %total,
            "Sales transaction created"
        );

        self.emit(Event::TransactionCreated {
            transaction_id,
            transaction_number,
            total,
        })
        .await;

        Ok(TransactionDetail { transaction, items })
    }

    /// Approves a pending transaction; terminal. When a commission
    /// percentage is supplied and positive, the derived commission row is
    /// written in the same unit of work.
    #[instrument(skip(self), fields(transaction_id = %id))]
    pub async fn approve(
        &self,
        id: Uuid,
        approver: Uuid,
        commission_percentage: Option<Decimal>,
    ) -> Result<sales_transaction::Model, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let transaction = self.fetch_active(&txn, id).await?;
        let status = parse_status(&transaction.status)?;
        if status != TransactionStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "Only pending transactions can be approved; {} is {}",
                transaction.transaction_number, transaction.status
            )));
        }

        // Conditional transition: only one terminal transition may win.
        let claimed = SalesTransaction::update_many()
            .col_expr(
                sales_transaction::Column::Status,
                Expr::value(TransactionStatus::Approved.to_string()),
            )
            .col_expr(sales_transaction::Column::ApprovedAt, Expr::value(now))
            .col_expr(sales_transaction::Column::ApprovedBy, Expr::value(approver))
            .col_expr(sales_transaction::Column::UpdatedAt, Expr::value(now))
            .filter(sales_transaction::Column::Id.eq(id))
            .filter(
                sales_transaction::Column::Status.eq(TransactionStatus::Pending.to_string()),
            )
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if claimed.rows_affected == 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "Transaction {} was concurrently finalized",
                transaction.transaction_number
            )));
        }

        if let Some(percentage) = commission_percentage.filter(|p| *p > Decimal::ZERO) {
            let amount = round_money(transaction.total * percentage / Decimal::from(100));
            let row = commission::ActiveModel {
                transaction_id: Set(id),
                sales_id: Set(transaction.sales_id),
                transaction_amount: Set(transaction.total),
                commission_percentage: Set(percentage),
                commission_amount: Set(amount),
                status: Set(CommissionStatus::Pending.to_string()),
                created_at: Set(now),
                ..Default::default()
            };
            row.insert(&txn).await.map_err(ServiceError::DatabaseError)?;
        }

        let approved = self.fetch_active(&txn, id).await?;
        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            transaction_id = %id,
            approved_by = %approver,
            "Sales transaction approved"
        );

        self.emit(Event::TransactionApproved {
            transaction_id: id,
            approved_by: approver,
            approved_at: now,
        })
        .await;

        Ok(approved)
    }

    /// Cancels a pending transaction, restoring every line's stock with
    /// `return` movements in the same atomic unit. Approved transactions
    /// are final and cannot be reversed through this path.
    #[instrument(skip(self, reason), fields(transaction_id = %id))]
    pub async fn cancel(
        &self,
        id: Uuid,
        actor: Uuid,
        reason: Option<String>,
    ) -> Result<sales_transaction::Model, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let transaction = self.fetch_active(&txn, id).await?;
        match parse_status(&transaction.status)? {
            TransactionStatus::Cancelled => {
                return Err(ServiceError::InvalidOperation(format!(
                    "Transaction {} is already cancelled",
                    transaction.transaction_number
                )));
            }
            TransactionStatus::Approved => {
                return Err(ServiceError::InvalidOperation(format!(
                    "Transaction {} is approved and cannot be cancelled",
                    transaction.transaction_number
                )));
            }
            TransactionStatus::Pending => {}
        }

        let notes = append_note(transaction.notes.clone(), reason.as_deref().map(|r| {
            format!("Cancelled: {}", r)
        }));

        let claimed = SalesTransaction::update_many()
            .col_expr(
                sales_transaction::Column::Status,
                Expr::value(TransactionStatus::Cancelled.to_string()),
            )
            .col_expr(sales_transaction::Column::Notes, Expr::value(notes))
            .col_expr(sales_transaction::Column::UpdatedAt, Expr::value(now))
            .filter(sales_transaction::Column::Id.eq(id))
            .filter(
                sales_transaction::Column::Status.eq(TransactionStatus::Pending.to_string()),
            )
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if claimed.rows_affected == 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "Transaction {} was concurrently finalized",
                transaction.transaction_number
            )));
        }

        let items = SalesTransactionItem::find()
            .filter(sales_transaction_item::Column::TransactionId.eq(id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        for item in &items {
            self.stock
                .apply_addition(
                    &txn,
                    item.product_id,
                    transaction.branch_id,
                    item.quantity,
                    MovementType::Return,
                    Some(format!(
                        "Restock from cancelled {}",
                        transaction.transaction_number
                    )),
                    actor,
                )
                .await?;
        }

        let cancelled = self.fetch_active(&txn, id).await?;
        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            transaction_id = %id,
            items_restocked = items.len(),
            "Sales transaction cancelled"
        );

        self.emit(Event::TransactionCancelled {
            transaction_id: id,
            reason,
        })
        .await;

        Ok(cancelled)
    }

    /// Per-rep sales summary over an optional date range.
    ///
    /// `total_transactions` counts every status while `total_sales` (and
    /// therefore the average's numerator) only sums approved transactions.
    /// This mirrors the established reporting behavior and is kept as is.
    #[instrument(skip(self))]
    pub async fn sales_summary(
        &self,
        sales_id: Uuid,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<SalesSummary, ServiceError> {
        let db = &*self.db_pool;

        let base = || {
            let mut query = SalesTransaction::find()
                .filter(sales_transaction::Column::SalesId.eq(sales_id))
                .filter(sales_transaction::Column::DeletedAt.is_null());
            if let Some(start) = start {
                query = query.filter(sales_transaction::Column::TransactionDate.gte(start));
            }
            if let Some(end) = end {
                query = query.filter(sales_transaction::Column::TransactionDate.lte(end));
            }
            query
        };

        use sea_orm::PaginatorTrait;
        let total_transactions = base()
            .count(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let approved = base()
            .filter(sales_transaction::Column::Status.eq(TransactionStatus::Approved.to_string()))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let total_sales: Decimal = approved.iter().map(|t| t.total).sum();

        let average_transaction = if total_transactions == 0 {
            Decimal::ZERO
        } else {
            round_money(total_sales / Decimal::from(total_transactions))
        };

        Ok(SalesSummary {
            total_transactions,
            total_sales,
            average_transaction,
        })
    }

    /// Loads a transaction with items. Soft-deleted rows are invisible
    /// unless explicitly requested.
    #[instrument(skip(self))]
    pub async fn get_transaction(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<TransactionDetail, ServiceError> {
        let db = &*self.db_pool;

        let mut query = SalesTransaction::find_by_id(id);
        if !include_deleted {
            query = query.filter(sales_transaction::Column::DeletedAt.is_null());
        }
        let transaction = query
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {} not found", id)))?;

        let items = SalesTransactionItem::find()
            .filter(sales_transaction_item::Column::TransactionId.eq(id))
            .order_by_asc(sales_transaction_item::Column::Id)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(TransactionDetail { transaction, items })
    }

    /// Marks a transaction soft-deleted. Does not touch stock; cancellation
    /// is the path that restores inventory.
    #[instrument(skip(self), fields(transaction_id = %id))]
    pub async fn soft_delete(&self, id: Uuid, actor: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;
        let transaction = self.fetch_active(&txn, id).await?;

        let mut active: sales_transaction::ActiveModel = transaction.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&txn).await.map_err(ServiceError::DatabaseError)?;
        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(transaction_id = %id, deleted_by = %actor, "Sales transaction soft-deleted");
        Ok(())
    }

    async fn fetch_active<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: Uuid,
    ) -> Result<sales_transaction::Model, ServiceError> {
        SalesTransaction::find_by_id(id)
            .filter(sales_transaction::Column::DeletedAt.is_null())
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {} not found", id)))
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send transaction event");
            }
        }
    }
}

/// Round-half-up to 2 fraction digits; the rounding used everywhere money
/// is derived (tax, commission, averages).
fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn parse_status(raw: &str) -> Result<TransactionStatus, ServiceError> {
    raw.parse().map_err(|_| {
        ServiceError::InternalError(format!("unknown transaction status '{}'", raw))
    })
}

fn append_note(existing: Option<String>, addition: Option<String>) -> Option<String> {
    match (existing, addition) {
        (Some(old), Some(new)) => Some(format!("{} | {}", old, new)),
        (None, Some(new)) => Some(new),
        (old, None) => old,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tax_rounds_half_up() {
        assert_eq!(round_money(dec!(10.005)), dec!(10.01));
        assert_eq!(round_money(dec!(10.004)), dec!(10.00));
        assert_eq!(round_money(dec!(27500.0)), dec!(27500.0));
    }

    #[test]
    fn append_note_joins_with_pipe() {
        assert_eq!(
            append_note(Some("urgent".into()), Some("Cancelled: oops".into())),
            Some("urgent | Cancelled: oops".to_string())
        );
        assert_eq!(
            append_note(None, Some("Cancelled: oops".into())),
            Some("Cancelled: oops".to_string())
        );
        assert_eq!(append_note(Some("urgent".into()), None), Some("urgent".to_string()));
        assert_eq!(append_note(None, None), None);
    }

    #[test]
    fn status_parsing() {
        assert_eq!(parse_status("pending").unwrap(), TransactionStatus::Pending);
        assert_eq!(parse_status("approved").unwrap(), TransactionStatus::Approved);
        assert!(parse_status("refunded").is_err());
        assert!(TransactionStatus::Approved.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
    }
}
