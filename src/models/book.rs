//! Book catalog and copy registry types consumed by the lending engine

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::enums::CopyStatus;
use crate::error::AppError;

/// Catalog entry with its aggregate availability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    /// Per-copy (barcode-level) tracking enabled for this title
    pub copy_management: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct BookCopyRow {
    id: i32,
    book_id: i32,
    label: String,
    status: String,
    borrow_count: i32,
}

impl TryFrom<BookCopyRow> for BookCopy {
    type Error = AppError;

    fn try_from(row: BookCopyRow) -> Result<Self, Self::Error> {
        Ok(BookCopy {
            id: row.id,
            book_id: row.book_id,
            label: row.label,
            status: row.status.parse().map_err(AppError::Internal)?,
            borrow_count: row.borrow_count,
        })
    }
}

/// One physical copy of a title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BookCopy {
    pub id: i32,
    pub book_id: i32,
    /// Human-readable barcode / accession label
    pub label: String,
    pub status: CopyStatus,
    pub borrow_count: i32,
}
