//! Book catalog and copy registry repository

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::BooksStore;
use crate::{
    error::AppResult,
    models::{book::BookCopyRow, Book, BookCopy, CopyStatus},
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BooksStore for BooksRepository {
    async fn get(&self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, total_copies, available_copies, copy_management
            FROM books WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn take_available(&self, book_id: i32) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE books SET available_copies = available_copies - 1
            WHERE id = $1 AND available_copies > 0
            "#,
        )
        .bind(book_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn restore_available(&self, book_id: i32) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE books SET available_copies = LEAST(available_copies + 1, total_copies)
            WHERE id = $1
            "#,
        )
        .bind(book_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn allocate_copy(&self, book_id: i32) -> AppResult<Option<BookCopy>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, BookCopyRow>(
            r#"
            UPDATE book_copies SET status = $2
            WHERE id = (
                SELECT id FROM book_copies
                WHERE book_id = $1 AND status = $3
                ORDER BY borrow_count, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, book_id, label, status, borrow_count
            "#,
        )
        .bind(book_id)
        .bind(CopyStatus::Reserved.as_str())
        .bind(CopyStatus::Available.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let decremented = sqlx::query(
            r#"
            UPDATE books SET available_copies = available_copies - 1
            WHERE id = $1 AND available_copies > 0
            "#,
        )
        .bind(book_id)
        .execute(&mut *tx)
        .await?;

        if decremented.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(row.try_into()?))
    }

    async fn release_copy(&self, copy_id: i32) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let book_id: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE book_copies SET status = $2
            WHERE id = $1 AND status IN ($3, $4)
            RETURNING book_id
            "#,
        )
        .bind(copy_id)
        .bind(CopyStatus::Available.as_str())
        .bind(CopyStatus::Reserved.as_str())
        .bind(CopyStatus::Borrowed.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(book_id) = book_id else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE books SET available_copies = LEAST(available_copies + 1, total_copies)
            WHERE id = $1
            "#,
        )
        .bind(book_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn borrow_copy(&self, copy_id: i32) -> AppResult<()> {
        sqlx::query(
            "UPDATE book_copies SET status = $2, borrow_count = borrow_count + 1 WHERE id = $1",
        )
        .bind(copy_id)
        .bind(CopyStatus::Borrowed.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn retire_copy(&self, copy_id: i32, status: CopyStatus) -> AppResult<()> {
        sqlx::query("UPDATE book_copies SET status = $2 WHERE id = $1")
            .bind(copy_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
