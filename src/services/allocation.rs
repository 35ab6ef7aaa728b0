//! Copy allocation
//!
//! Titles either count availability at book level or track individual copies.
//! Both are driven through `CopyAllocator`, chosen per book (or per hold), so
//! callers never branch on the copy-management flag themselves.

use crate::{
    error::AppResult,
    models::{Book, BookCondition, CopyStatus, DamageSeverity, Reservation},
    repository::BooksStore,
};

/// A claim on one unit of a book's availability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hold {
    pub copy_id: Option<i32>,
    pub copy_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyAllocator {
    /// Decrement/increment `available_copies` only
    BookLevel,
    /// Reserve a concrete copy; the aggregate count follows it
    CopyLevel,
}

impl CopyAllocator {
    pub fn for_book(book: &Book) -> Self {
        if book.copy_management {
            CopyAllocator::CopyLevel
        } else {
            CopyAllocator::BookLevel
        }
    }

    /// Whichever variant produced the reservation's hold
    pub fn for_reservation(reservation: &Reservation) -> Self {
        if reservation.copy_id.is_some() {
            CopyAllocator::CopyLevel
        } else {
            CopyAllocator::BookLevel
        }
    }

    /// Atomically take one unit; `None` when nothing is left
    pub async fn allocate(&self, books: &dyn BooksStore, book_id: i32) -> AppResult<Option<Hold>> {
        match self {
            CopyAllocator::BookLevel => Ok(books.take_available(book_id).await?.then_some(Hold {
                copy_id: None,
                copy_label: None,
            })),
            CopyAllocator::CopyLevel => Ok(books.allocate_copy(book_id).await?.map(|copy| Hold {
                copy_id: Some(copy.id),
                copy_label: Some(copy.label),
            })),
        }
    }

    /// Give a held unit back
    pub async fn release(&self, books: &dyn BooksStore, book_id: i32, copy_id: Option<i32>) -> AppResult<()> {
        match (self, copy_id) {
            (CopyAllocator::CopyLevel, Some(copy_id)) => {
                if !books.release_copy(copy_id).await? {
                    tracing::warn!(copy_id, book_id, "copy was not held, nothing released");
                }
                Ok(())
            }
            _ => books.restore_available(book_id).await,
        }
    }

    /// Stamp the held copy as out on loan
    pub async fn mark_borrowed(&self, books: &dyn BooksStore, copy_id: Option<i32>) -> AppResult<()> {
        match (self, copy_id) {
            (CopyAllocator::CopyLevel, Some(copy_id)) => books.borrow_copy(copy_id).await,
            _ => Ok(()),
        }
    }

    /// Put the unit back or withdraw it, depending on the returned condition.
    /// Returns whether availability was restored.
    pub async fn settle_return(
        &self,
        books: &dyn BooksStore,
        reservation: &Reservation,
        condition: BookCondition,
    ) -> AppResult<bool> {
        if condition.returns_to_circulation() {
            self.release(books, reservation.book_id, reservation.copy_id).await?;
            return Ok(true);
        }

        if let (CopyAllocator::CopyLevel, Some(copy_id)) = (self, reservation.copy_id) {
            let status = match condition {
                BookCondition::Lost => CopyStatus::Lost,
                BookCondition::Damaged(DamageSeverity::Major) => CopyStatus::Damaged,
                BookCondition::Good | BookCondition::Damaged(_) => CopyStatus::Available,
            };
            books.retire_copy(copy_id, status).await?;
        }
        Ok(false)
    }
}
