//! PostgreSQL store

use std::time::Duration;

use async_trait::async_trait;
use shared::models::{
    CartItem, CartLine, Coupon, NewOrder, ORDER_STATUS_COMPLETED, Order, OrderDetail, OrderItem,
    Product, ProductCreate, User, UserCredentials, UserRole,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use super::{LockedProduct, Store, StoreResult, StoreTx};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// Connect a pool. `lock_timeout` bounds every row-lock wait inside
    /// transactions opened by [`Store::begin`].
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> Result<Self, BoxError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::from_pool(pool, lock_timeout))
    }

    pub fn from_pool(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub async fn migrate(&self) -> Result<(), BoxError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let mut tx = self.pool.begin().await?;

        // Scoped to this transaction only
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgTx { tx }))
    }

    // ── Users ──

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: UserRole,
    ) -> StoreResult<User> {
        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (email, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING id, email, role, account_status, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        let user: Option<User> = sqlx::query_as(
            "SELECT id, email, role, account_status, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<UserCredentials>> {
        let row: Option<UserCredentials> = sqlx::query_as(
            "SELECT id, email, password_hash, role, account_status FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ── Products ──

    async fn create_product(&self, product: &ProductCreate) -> StoreResult<Product> {
        let row: Product = sqlx::query_as(
            r#"
            INSERT INTO products (name, image_url, price, quantity_left)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, image_url, price, quantity_left, created_at, updated_at
            "#,
        )
        .bind(&product.name)
        .bind(&product.image_url)
        .bind(product.price)
        .bind(product.quantity_left)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        let rows: Vec<Product> = sqlx::query_as(
            "SELECT id, name, image_url, price, quantity_left, created_at, updated_at FROM products ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_product(&self, product_id: i64) -> StoreResult<Option<Product>> {
        let row: Option<Product> = sqlx::query_as(
            "SELECT id, name, image_url, price, quantity_left, created_at, updated_at FROM products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ── Cart ──

    async fn list_cart(&self, user_id: i64) -> StoreResult<Vec<CartItem>> {
        let rows: Vec<CartItem> = sqlx::query_as(
            r#"
            SELECT id, user_id, product_id, quantity, created_at, updated_at
            FROM cart_items
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_cart_item(&self, user_id: i64, product_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Coupons ──

    async fn create_coupon(
        &self,
        user_id: i64,
        code: &str,
        discount_percent: i32,
    ) -> StoreResult<Coupon> {
        let row: Coupon = sqlx::query_as(
            r#"
            INSERT INTO coupons (user_id, code, discount_percent)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, code, discount_percent, is_used, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(discount_percent)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_unused_coupons(&self, user_id: i64) -> StoreResult<Vec<Coupon>> {
        let rows: Vec<Coupon> = sqlx::query_as(
            r#"
            SELECT id, user_id, code, discount_percent, is_used, created_at, updated_at
            FROM coupons
            WHERE user_id = $1 AND NOT is_used
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_unused_coupons(&self, user_id: i64) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM coupons WHERE user_id = $1 AND NOT is_used")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn list_coupons(&self, limit: i64, offset: i64) -> StoreResult<Vec<Coupon>> {
        let rows: Vec<Coupon> = sqlx::query_as(
            r#"
            SELECT id, user_id, code, discount_percent, is_used, created_at, updated_at
            FROM coupons
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ── Orders ──

    async fn list_orders(&self, limit: i64, offset: i64) -> StoreResult<Vec<Order>> {
        let rows: Vec<Order> = sqlx::query_as(
            r#"
            SELECT id, user_id, status, subtotal_amount, discount_amount, total_amount,
                   coupon_id, created_at, updated_at
            FROM orders
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_user_orders(&self, user_id: i64) -> StoreResult<Vec<Order>> {
        let rows: Vec<Order> = sqlx::query_as(
            r#"
            SELECT id, user_id, status, subtotal_amount, discount_amount, total_amount,
                   coupon_id, created_at, updated_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_order(&self, user_id: i64, order_id: i64) -> StoreResult<Option<OrderDetail>> {
        let order: Option<Order> = sqlx::query_as(
            r#"
            SELECT id, user_id, status, subtotal_amount, discount_amount, total_amount,
                   coupon_id, created_at, updated_at
            FROM orders
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };

        let items: Vec<OrderItem> = sqlx::query_as(
            r#"
            SELECT id, order_id, product_id, quantity, unit_price, created_at
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(OrderDetail { order, items }))
    }

    async fn count_completed_orders(&self, user_id: i64) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1 AND status = $2")
                .bind(user_id)
                .bind(ORDER_STATUS_COMPLETED)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

/// Open PostgreSQL transaction. Dropping it without commit rolls back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_product(&mut self, product_id: i64) -> StoreResult<Option<LockedProduct>> {
        let row: Option<(i64, i64, i32)> = sqlx::query_as(
            "SELECT id, price, quantity_left FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(|(id, price, quantity_left)| LockedProduct {
            id,
            price,
            quantity_left,
        }))
    }

    async fn decrement_stock(&mut self, product_id: i64, quantity: i32) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE products SET quantity_left = quantity_left - $2, updated_at = now() WHERE id = $1",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound.into());
        }
        Ok(())
    }

    async fn lock_cart(&mut self, user_id: i64) -> StoreResult<()> {
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR NO KEY UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn cart_lines(&mut self, user_id: i64) -> StoreResult<Vec<CartLine>> {
        let rows: Vec<CartLine> = sqlx::query_as(
            r#"
            SELECT ci.product_id, ci.quantity, p.price AS unit_price
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.user_id = $1
            ORDER BY ci.product_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    async fn cart_item(&mut self, user_id: i64, product_id: i64) -> StoreResult<Option<CartItem>> {
        let row: Option<CartItem> = sqlx::query_as(
            r#"
            SELECT id, user_id, product_id, quantity, created_at, updated_at
            FROM cart_items
            WHERE user_id = $1 AND product_id = $2
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn upsert_cart_item(
        &mut self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> StoreResult<CartItem> {
        let row: CartItem = sqlx::query_as(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id)
            DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity, updated_at = now()
            RETURNING id, user_id, product_id, quantity, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn set_cart_quantity(
        &mut self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> StoreResult<Option<CartItem>> {
        let row: Option<CartItem> = sqlx::query_as(
            r#"
            UPDATE cart_items
            SET quantity = $3, updated_at = now()
            WHERE user_id = $1 AND product_id = $2
            RETURNING id, user_id, product_id, quantity, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn clear_cart(&mut self, user_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn lock_coupon_by_code(
        &mut self,
        user_id: i64,
        code: &str,
    ) -> StoreResult<Option<Coupon>> {
        let row: Option<Coupon> = sqlx::query_as(
            r#"
            SELECT id, user_id, code, discount_percent, is_used, created_at, updated_at
            FROM coupons
            WHERE code = $1 AND user_id = $2
            FOR UPDATE
            "#,
        )
        .bind(code)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn mark_coupon_used(&mut self, coupon_id: i64) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE coupons SET is_used = TRUE, updated_at = now() WHERE id = $1 AND NOT is_used",
        )
        .bind(coupon_id)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound.into());
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<Order> {
        let row: Order = sqlx::query_as(
            r#"
            INSERT INTO orders (user_id, status, subtotal_amount, discount_amount, total_amount, coupon_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, status, subtotal_amount, discount_amount, total_amount,
                      coupon_id, created_at, updated_at
            "#,
        )
        .bind(order.user_id)
        .bind(ORDER_STATUS_COMPLETED)
        .bind(order.subtotal_amount)
        .bind(order.discount_amount)
        .bind(order.total_amount)
        .bind(order.coupon_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn insert_order_item(
        &mut self,
        order_id: i64,
        line: &CartLine,
    ) -> StoreResult<OrderItem> {
        let row: OrderItem = sqlx::query_as(
            r#"
            INSERT INTO order_items (order_id, product_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, product_id, quantity, unit_price, created_at
            "#,
        )
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
