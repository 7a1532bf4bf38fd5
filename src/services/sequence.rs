use chrono::NaiveDate;
use rand::Rng;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};

use crate::entities::reference_counter::{self, Entity as ReferenceCounter};
use crate::errors::ServiceError;

/// Reference-number families. Transactions and visits use sequential
/// per-day numbers; stock movements use a random suffix (see
/// [`movement_reference`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ReferencePrefix {
    Trx,
    Vst,
    Stk,
    Mov,
}

const MOVEMENT_SUFFIX_LEN: usize = 6;
const MOVEMENT_SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Produces the next `{PREFIX}-{YYYYMMDD}-{NNNN}` reference for the given
/// day, backed by an atomic increment on the `(prefix, day)` counter row.
///
/// Must be called on the same open transaction that persists the numbered
/// entity so the number commits or rolls back with it. Two writers bumping
/// the same counter serialize on the row, so numbers never collide.
pub async fn next_reference<C: ConnectionTrait>(
    conn: &C,
    prefix: ReferencePrefix,
    date: NaiveDate,
) -> Result<String, ServiceError> {
    let sequence = next_sequence(conn, prefix.as_ref(), date).await?;
    Ok(format_reference(prefix, date, sequence))
}

async fn next_sequence<C: ConnectionTrait>(
    conn: &C,
    prefix: &str,
    date: NaiveDate,
) -> Result<i64, ServiceError> {
    // Seed the day's counter at zero. Losing to an existing row is the
    // normal case after the first number; do-nothing keeps the statement
    // from failing, which would poison the caller's open transaction on
    // Postgres.
    let seed = reference_counter::ActiveModel {
        prefix: Set(prefix.to_string()),
        period_date: Set(date),
        last_value: Set(0),
        ..Default::default()
    };
    match ReferenceCounter::insert(seed)
        .on_conflict(
            OnConflict::columns([
                reference_counter::Column::Prefix,
                reference_counter::Column::PeriodDate,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec(conn)
        .await
    {
        Ok(_) | Err(DbErr::RecordNotInserted) => {}
        Err(err) => return Err(ServiceError::DatabaseError(err)),
    }

    ReferenceCounter::update_many()
        .col_expr(
            reference_counter::Column::LastValue,
            Expr::col(reference_counter::Column::LastValue).add(1),
        )
        .filter(reference_counter::Column::Prefix.eq(prefix))
        .filter(reference_counter::Column::PeriodDate.eq(date))
        .exec(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    let counter = ReferenceCounter::find()
        .filter(reference_counter::Column::Prefix.eq(prefix))
        .filter(reference_counter::Column::PeriodDate.eq(date))
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| {
            ServiceError::InternalError(format!(
                "reference counter missing after increment for {}/{}",
                prefix, date
            ))
        })?;

    Ok(counter.last_value)
}

/// Formats a sequential reference: `TRX-20240131-0042`.
pub fn format_reference(prefix: ReferencePrefix, date: NaiveDate, sequence: i64) -> String {
    format!("{}-{}-{:04}", prefix, date.format("%Y%m%d"), sequence)
}

/// Produces a movement reference with a random 6-character suffix:
/// `MOV-20240131-7QX2AB`. Collisions are theoretically possible, so the
/// stock service re-rolls on a unique-constraint conflict.
pub fn movement_reference(date: NaiveDate) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..MOVEMENT_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..MOVEMENT_SUFFIX_CHARSET.len());
            MOVEMENT_SUFFIX_CHARSET[idx] as char
        })
        .collect();
    format!("{}-{}-{}", ReferencePrefix::Mov, date.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
    }

    #[test]
    fn sequential_reference_shape() {
        assert_eq!(
            format_reference(ReferencePrefix::Trx, day(), 42),
            "TRX-20240131-0042"
        );
        assert_eq!(
            format_reference(ReferencePrefix::Vst, day(), 1),
            "VST-20240131-0001"
        );
        // sequences past 4 digits widen rather than truncate
        assert_eq!(
            format_reference(ReferencePrefix::Stk, day(), 12345),
            "STK-20240131-12345"
        );
    }

    #[test]
    fn movement_reference_shape() {
        let reference = movement_reference(day());
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "MOV");
        assert_eq!(parts[1], "20240131");
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2]
            .bytes()
            .all(|b| MOVEMENT_SUFFIX_CHARSET.contains(&b)));
    }

    #[test]
    fn movement_references_vary() {
        let a = movement_reference(day());
        let b = movement_reference(day());
        let c = movement_reference(day());
        // Three draws from a 36^6 space colliding would point at a broken RNG.
        assert!(a != b || b != c);
    }
}
