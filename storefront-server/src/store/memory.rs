//! In-process store
//!
//! Tables live behind one `parking_lot::Mutex`; row locks are per-row
//! `tokio::sync::Mutex`es held as owned guards by the transaction. A
//! transaction stages its writes privately and reads its own writes
//! through them; readers outside it keep seeing the last committed state.
//! Commit publishes the staged writes in one step before any row lock is
//! released, and rollback or drop simply discards them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use shared::models::{
    AccountStatus, CartItem, CartLine, Coupon, NewOrder, ORDER_STATUS_COMPLETED, Order,
    OrderDetail, OrderItem, Product, ProductCreate, User, UserCredentials, UserRole,
};
use tokio::sync::OwnedMutexGuard;

use super::{LockedProduct, Store, StoreError, StoreResult, StoreTx};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKind {
    Cart,
    Product,
    Coupon,
}

type RowLock = Arc<tokio::sync::Mutex<()>>;

struct UserRow {
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct Sequences {
    user: i64,
    product: i64,
    cart_item: i64,
    coupon: i64,
    order: i64,
    order_item: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

#[derive(Default)]
struct Tables {
    seq: Sequences,
    users: BTreeMap<i64, UserRow>,
    products: BTreeMap<i64, Product>,
    /// Keyed by `(user_id, product_id)`
    cart: BTreeMap<(i64, i64), CartItem>,
    coupons: BTreeMap<i64, Coupon>,
    orders: BTreeMap<i64, Order>,
    order_items: BTreeMap<i64, OrderItem>,
}

#[derive(Default)]
struct Faults {
    begin: AtomicBool,
    commit: AtomicBool,
    commit_delay_ms: AtomicU64,
    order_item: AtomicBool,
    create_coupon: AtomicBool,
    count_orders: AtomicBool,
}

impl Faults {
    fn commit_delay(&self) -> Duration {
        Duration::from_millis(self.commit_delay_ms.load(Ordering::SeqCst))
    }
}

fn injected(flag: &AtomicBool, what: &str) -> StoreResult<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(StoreError::Unavailable(format!("injected failure: {what}")));
    }
    Ok(())
}

struct Inner {
    tables: Mutex<Tables>,
    locks: Mutex<HashMap<(LockKind, i64), RowLock>>,
    faults: Faults,
    lock_timeout: Duration,
}

impl Inner {
    fn row_lock(&self, key: (LockKind, i64)) -> RowLock {
        self.locks.lock().entry(key).or_default().clone()
    }

    /// Forget a row lock nobody holds or waits for.
    fn prune(&self, key: (LockKind, i64)) {
        let mut locks = self.locks.lock();
        if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&key);
        }
    }
}

/// Held row lock. Dropping it releases the row.
struct RowGuard {
    inner: Arc<Inner>,
    key: (LockKind, i64),
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.inner.prune(self.key);
    }
}

async fn lock_row(inner: &Arc<Inner>, kind: LockKind, id: i64) -> StoreResult<RowGuard> {
    let key = (kind, id);
    let lock = inner.row_lock(key);
    match tokio::time::timeout(inner.lock_timeout, lock.lock_owned()).await {
        Ok(guard) => Ok(RowGuard {
            inner: inner.clone(),
            key,
            guard: Some(guard),
        }),
        Err(_) => {
            inner.prune(key);
            Err(StoreError::LockTimeout)
        }
    }
}

/// In-memory [`Store`] with the locking and read-committed visibility of
/// the Postgres backend.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::default()),
                locks: Mutex::new(HashMap::new()),
                faults: Faults::default(),
                lock_timeout,
            }),
        }
    }

    pub fn set_fail_on_begin(&self, fail: bool) {
        self.inner.faults.begin.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_commit(&self, fail: bool) {
        self.inner.faults.commit.store(fail, Ordering::SeqCst);
    }

    /// Stall every commit for `delay` before it publishes.
    pub fn set_commit_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.inner.faults.commit_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Fail order-item inserts, i.e. midway through a checkout.
    pub fn set_fail_on_order_item(&self, fail: bool) {
        self.inner.faults.order_item.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_create_coupon(&self, fail: bool) {
        self.inner.faults.create_coupon.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_count_orders(&self, fail: bool) {
        self.inner.faults.count_orders.store(fail, Ordering::SeqCst);
    }

    /// Change an account status. Returns `false` for an unknown user.
    pub fn set_account_status(&self, user_id: i64, status: AccountStatus) -> bool {
        let mut tables = self.inner.tables.lock();
        match tables.users.get_mut(&user_id) {
            Some(row) => {
                row.user.account_status = status.as_str().to_string();
                row.user.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Every coupon ever issued to a user, used or not.
    pub fn coupons_of(&self, user_id: i64) -> Vec<Coupon> {
        let tables = self.inner.tables.lock();
        tables
            .coupons
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn order_count(&self) -> usize {
        self.inner.tables.lock().orders.len()
    }

    pub fn order_item_count(&self) -> usize {
        self.inner.tables.lock().order_items.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        injected(&self.inner.faults.begin, "begin")?;
        Ok(Box::new(MemoryTx {
            inner: self.inner.clone(),
            staged: Staged::default(),
            held: HashSet::new(),
            guards: Vec::new(),
        }))
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: UserRole,
    ) -> StoreResult<User> {
        let mut tables = self.inner.tables.lock();
        if tables.users.values().any(|row| row.user.email == email) {
            return Err(StoreError::UniqueViolation("users_email_key".into()));
        }
        let now = Utc::now();
        let user = User {
            id: next(&mut tables.seq.user),
            email: email.to_string(),
            role: role.as_str().to_string(),
            account_status: AccountStatus::Active.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(
            user.id,
            UserRow {
                user: user.clone(),
                password_hash: password_hash.to_string(),
            },
        );
        Ok(user)
    }

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        let tables = self.inner.tables.lock();
        Ok(tables.users.get(&user_id).map(|row| row.user.clone()))
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<UserCredentials>> {
        let tables = self.inner.tables.lock();
        Ok(tables
            .users
            .values()
            .find(|row| row.user.email == email)
            .map(|row| UserCredentials {
                id: row.user.id,
                email: row.user.email.clone(),
                password_hash: row.password_hash.clone(),
                role: row.user.role.clone(),
                account_status: row.user.account_status.clone(),
            }))
    }

    async fn create_product(&self, product: &ProductCreate) -> StoreResult<Product> {
        let mut tables = self.inner.tables.lock();
        let now = Utc::now();
        let row = Product {
            id: next(&mut tables.seq.product),
            name: product.name.clone(),
            image_url: product.image_url.clone(),
            price: product.price,
            quantity_left: product.quantity_left,
            created_at: now,
            updated_at: now,
        };
        tables.products.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        Ok(self.inner.tables.lock().products.values().cloned().collect())
    }

    async fn get_product(&self, product_id: i64) -> StoreResult<Option<Product>> {
        Ok(self.inner.tables.lock().products.get(&product_id).cloned())
    }

    async fn list_cart(&self, user_id: i64) -> StoreResult<Vec<CartItem>> {
        let tables = self.inner.tables.lock();
        let mut items: Vec<CartItem> = tables
            .cart
            .range((user_id, i64::MIN)..=(user_id, i64::MAX))
            .map(|(_, item)| item.clone())
            .collect();
        items.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(items)
    }

    async fn delete_cart_item(&self, user_id: i64, product_id: i64) -> StoreResult<bool> {
        // Waits out an in-flight checkout of the same cart
        let _guard = lock_row(&self.inner, LockKind::Cart, user_id).await?;
        let removed = self
            .inner
            .tables
            .lock()
            .cart
            .remove(&(user_id, product_id))
            .is_some();
        Ok(removed)
    }

    async fn create_coupon(
        &self,
        user_id: i64,
        code: &str,
        discount_percent: i32,
    ) -> StoreResult<Coupon> {
        injected(&self.inner.faults.create_coupon, "create_coupon")?;
        let mut tables = self.inner.tables.lock();
        if tables.coupons.values().any(|c| c.code == code) {
            return Err(StoreError::UniqueViolation("coupons_code_key".into()));
        }
        let now = Utc::now();
        let coupon = Coupon {
            id: next(&mut tables.seq.coupon),
            user_id,
            code: code.to_string(),
            discount_percent,
            is_used: false,
            created_at: now,
            updated_at: now,
        };
        tables.coupons.insert(coupon.id, coupon.clone());
        Ok(coupon)
    }

    async fn list_unused_coupons(&self, user_id: i64) -> StoreResult<Vec<Coupon>> {
        let tables = self.inner.tables.lock();
        Ok(tables
            .coupons
            .values()
            .rev()
            .filter(|c| c.user_id == user_id && !c.is_used)
            .cloned()
            .collect())
    }

    async fn count_unused_coupons(&self, user_id: i64) -> StoreResult<i64> {
        let tables = self.inner.tables.lock();
        Ok(tables
            .coupons
            .values()
            .filter(|c| c.user_id == user_id && !c.is_used)
            .count() as i64)
    }

    async fn list_coupons(&self, limit: i64, offset: i64) -> StoreResult<Vec<Coupon>> {
        let tables = self.inner.tables.lock();
        Ok(tables
            .coupons
            .values()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_orders(&self, limit: i64, offset: i64) -> StoreResult<Vec<Order>> {
        let tables = self.inner.tables.lock();
        Ok(tables
            .orders
            .values()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_user_orders(&self, user_id: i64) -> StoreResult<Vec<Order>> {
        let tables = self.inner.tables.lock();
        Ok(tables
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_order(&self, user_id: i64, order_id: i64) -> StoreResult<Option<OrderDetail>> {
        let tables = self.inner.tables.lock();
        let Some(order) = tables.orders.get(&order_id).filter(|o| o.user_id == user_id) else {
            return Ok(None);
        };
        let items = tables
            .order_items
            .values()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect();
        Ok(Some(OrderDetail {
            order: order.clone(),
            items,
        }))
    }

    async fn count_completed_orders(&self, user_id: i64) -> StoreResult<i64> {
        injected(&self.inner.faults.count_orders, "count_completed_orders")?;
        let tables = self.inner.tables.lock();
        Ok(tables
            .orders
            .values()
            .filter(|o| o.user_id == user_id && o.status == ORDER_STATUS_COMPLETED)
            .count() as i64)
    }
}

/// Writes of one open transaction. Other readers see none of them until
/// commit publishes them in one step under the table lock.
#[derive(Default)]
struct Staged {
    products: BTreeMap<i64, Product>,
    /// `None` marks a deleted line
    cart: BTreeMap<(i64, i64), Option<CartItem>>,
    coupons: BTreeMap<i64, Coupon>,
    orders: BTreeMap<i64, Order>,
    order_items: BTreeMap<i64, OrderItem>,
}

impl Staged {
    fn product<'a>(&'a self, tables: &'a Tables, id: i64) -> Option<&'a Product> {
        self.products.get(&id).or_else(|| tables.products.get(&id))
    }

    fn coupon<'a>(&'a self, tables: &'a Tables, id: i64) -> Option<&'a Coupon> {
        self.coupons.get(&id).or_else(|| tables.coupons.get(&id))
    }

    fn cart_item(&self, tables: &Tables, key: (i64, i64)) -> Option<CartItem> {
        match self.cart.get(&key) {
            Some(staged) => staged.clone(),
            None => tables.cart.get(&key).cloned(),
        }
    }

    /// A user's cart lines as this transaction sees them
    fn cart_of(&self, tables: &Tables, user_id: i64) -> BTreeMap<(i64, i64), CartItem> {
        let range = (user_id, i64::MIN)..=(user_id, i64::MAX);
        let mut lines: BTreeMap<(i64, i64), CartItem> = tables
            .cart
            .range(range.clone())
            .map(|(key, item)| (*key, item.clone()))
            .collect();
        for (key, staged) in self.cart.range(range) {
            match staged {
                Some(item) => {
                    lines.insert(*key, item.clone());
                }
                None => {
                    lines.remove(key);
                }
            }
        }
        lines
    }

    fn publish(self, tables: &mut Tables) {
        tables.products.extend(self.products);
        for (key, item) in self.cart {
            match item {
                Some(item) => {
                    tables.cart.insert(key, item);
                }
                None => {
                    tables.cart.remove(&key);
                }
            }
        }
        tables.coupons.extend(self.coupons);
        tables.orders.extend(self.orders);
        tables.order_items.extend(self.order_items);
    }
}

pub struct MemoryTx {
    inner: Arc<Inner>,
    staged: Staged,
    held: HashSet<(LockKind, i64)>,
    guards: Vec<RowGuard>,
}

impl MemoryTx {
    /// Take a row lock once; re-locking a row this transaction holds is a no-op.
    async fn acquire(&mut self, kind: LockKind, id: i64) -> StoreResult<()> {
        if self.held.contains(&(kind, id)) {
            return Ok(());
        }
        let guard = lock_row(&self.inner, kind, id).await?;
        self.held.insert((kind, id));
        self.guards.push(guard);
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_product(&mut self, product_id: i64) -> StoreResult<Option<LockedProduct>> {
        let exists = self.inner.tables.lock().products.contains_key(&product_id);
        if !exists {
            return Ok(None);
        }
        self.acquire(LockKind::Product, product_id).await?;
        let tables = self.inner.tables.lock();
        Ok(self
            .staged
            .product(&tables, product_id)
            .map(|p| LockedProduct {
                id: p.id,
                price: p.price,
                quantity_left: p.quantity_left,
            }))
    }

    async fn decrement_stock(&mut self, product_id: i64, quantity: i32) -> StoreResult<()> {
        let mut product = {
            let tables = self.inner.tables.lock();
            self.staged
                .product(&tables, product_id)
                .cloned()
                .ok_or_else(|| StoreError::Unavailable(format!("product {product_id} missing")))?
        };
        let left = product.quantity_left - quantity;
        if left < 0 {
            return Err(StoreError::Unavailable(format!(
                "quantity_left check violated for product {product_id}"
            )));
        }
        product.quantity_left = left;
        product.updated_at = Utc::now();
        self.staged.products.insert(product_id, product);
        Ok(())
    }

    async fn lock_cart(&mut self, user_id: i64) -> StoreResult<()> {
        self.acquire(LockKind::Cart, user_id).await
    }

    async fn cart_lines(&mut self, user_id: i64) -> StoreResult<Vec<CartLine>> {
        let tables = self.inner.tables.lock();
        Ok(self
            .staged
            .cart_of(&tables, user_id)
            .into_values()
            .filter_map(|item| {
                self.staged
                    .product(&tables, item.product_id)
                    .map(|p| CartLine {
                        product_id: item.product_id,
                        quantity: item.quantity,
                        unit_price: p.price,
                    })
            })
            .collect())
    }

    async fn cart_item(&mut self, user_id: i64, product_id: i64) -> StoreResult<Option<CartItem>> {
        let tables = self.inner.tables.lock();
        Ok(self.staged.cart_item(&tables, (user_id, product_id)))
    }

    async fn upsert_cart_item(
        &mut self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> StoreResult<CartItem> {
        let key = (user_id, product_id);
        let now = Utc::now();
        let item = {
            let mut tables = self.inner.tables.lock();
            match self.staged.cart_item(&tables, key) {
                Some(existing) => CartItem {
                    quantity: existing.quantity.saturating_add(quantity),
                    updated_at: now,
                    ..existing
                },
                None => CartItem {
                    id: next(&mut tables.seq.cart_item),
                    user_id,
                    product_id,
                    quantity,
                    created_at: now,
                    updated_at: now,
                },
            }
        };
        self.staged.cart.insert(key, Some(item.clone()));
        Ok(item)
    }

    async fn set_cart_quantity(
        &mut self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> StoreResult<Option<CartItem>> {
        let key = (user_id, product_id);
        let existing = {
            let tables = self.inner.tables.lock();
            self.staged.cart_item(&tables, key)
        };
        let Some(mut item) = existing else {
            return Ok(None);
        };
        item.quantity = quantity;
        item.updated_at = Utc::now();
        self.staged.cart.insert(key, Some(item.clone()));
        Ok(Some(item))
    }

    async fn clear_cart(&mut self, user_id: i64) -> StoreResult<u64> {
        let keys: Vec<(i64, i64)> = {
            let tables = self.inner.tables.lock();
            self.staged.cart_of(&tables, user_id).into_keys().collect()
        };
        for key in &keys {
            self.staged.cart.insert(*key, None);
        }
        Ok(keys.len() as u64)
    }

    async fn lock_coupon_by_code(
        &mut self,
        user_id: i64,
        code: &str,
    ) -> StoreResult<Option<Coupon>> {
        // Coupons are only created outside transactions
        let coupon_id = {
            let tables = self.inner.tables.lock();
            tables
                .coupons
                .values()
                .find(|c| c.code == code && c.user_id == user_id)
                .map(|c| c.id)
        };
        let Some(coupon_id) = coupon_id else {
            return Ok(None);
        };
        self.acquire(LockKind::Coupon, coupon_id).await?;
        let tables = self.inner.tables.lock();
        Ok(self.staged.coupon(&tables, coupon_id).cloned())
    }

    async fn mark_coupon_used(&mut self, coupon_id: i64) -> StoreResult<()> {
        let mut coupon = {
            let tables = self.inner.tables.lock();
            self.staged
                .coupon(&tables, coupon_id)
                .filter(|c| !c.is_used)
                .cloned()
                .ok_or_else(|| {
                    StoreError::Unavailable(format!("coupon {coupon_id} not redeemable"))
                })?
        };
        coupon.is_used = true;
        coupon.updated_at = Utc::now();
        self.staged.coupons.insert(coupon_id, coupon);
        Ok(())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<Order> {
        let row = {
            let mut tables = self.inner.tables.lock();
            if order.coupon_id.is_some()
                && tables
                    .orders
                    .values()
                    .chain(self.staged.orders.values())
                    .any(|o| o.coupon_id == order.coupon_id)
            {
                return Err(StoreError::UniqueViolation("idx_orders_coupon".into()));
            }
            let now = Utc::now();
            Order {
                id: next(&mut tables.seq.order),
                user_id: order.user_id,
                status: ORDER_STATUS_COMPLETED.to_string(),
                subtotal_amount: order.subtotal_amount,
                discount_amount: order.discount_amount,
                total_amount: order.total_amount,
                coupon_id: order.coupon_id,
                created_at: now,
                updated_at: now,
            }
        };
        self.staged.orders.insert(row.id, row.clone());
        Ok(row)
    }

    async fn insert_order_item(
        &mut self,
        order_id: i64,
        line: &CartLine,
    ) -> StoreResult<OrderItem> {
        injected(&self.inner.faults.order_item, "insert_order_item")?;
        let id = next(&mut self.inner.tables.lock().seq.order_item);
        let row = OrderItem {
            id,
            order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            created_at: Utc::now(),
        };
        self.staged.order_items.insert(row.id, row.clone());
        Ok(row)
    }

    async fn commit(mut self: Box<Self>) -> StoreResult<()> {
        let delay = self.inner.faults.commit_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        injected(&self.inner.faults.commit, "commit")?;
        let staged = std::mem::take(&mut self.staged);
        staged.publish(&mut self.inner.tables.lock());
        // Row locks are released when `self` drops, after the publish
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
