use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderNumber, ProductId, UserId, Version};
use domain::{Cart, CartItem, Order, OrderItem, OrderRecord, Product, User};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderFilter, Result, StoreError,
    store::{Store, StoreTx},
};

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, payment_status, total_minor, \
     shipping_address, billing_address, gateway_session_id, gateway_payment_id, \
     created_at, updated_at, version";

const PRODUCT_COLUMNS: &str = "id, name, price_minor, stock_quantity, active";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Transaction over a [`PostgresStore`].
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        Ok(PostgresTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, email, phone FROM users WHERE id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row_to_user(&row)).transpose()
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, product_id).await
    }

    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        fetch_cart(&mut conn, user_id).await
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => Ok(Some(order_from_row(&mut conn, &row).await?)),
            None => Ok(None),
        }
    }

    async fn get_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
        ))
        .bind(order_number.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(Some(order_from_row(&mut conn, &row).await?)),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        if filter.user_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND user_id = ${param_count}"));
        }
        if filter.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        if filter.payment_status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND payment_status = ${param_count}"));
        }
        sql.push_str(" ORDER BY created_at DESC, order_number ASC");
        if filter.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if filter.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut query = sqlx::query(&sql);
        if let Some(user_id) = filter.user_id {
            query = query.bind(user_id.as_uuid());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(payment_status) = filter.payment_status {
            query = query.bind(payment_status.as_str());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(page_value(limit));
        }
        if let Some(offset) = filter.offset {
            query = query.bind(page_value(offset));
        }

        let mut conn = self.pool.acquire().await?;
        let rows = query.fetch_all(&mut *conn).await?;
        orders_from_rows(&mut conn, rows).await
    }

    async fn put_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, first_name, last_name, email, phone)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_minor, stock_quantity, active, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_minor = EXCLUDED.price_minor,
                stock_quantity = EXCLUDED.stock_quantity,
                active = EXCLUDED.active,
                updated_at = NOW()
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.price.minor_units())
        .bind(i64::from(product.stock_quantity))
        .bind(product.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn get_product(&mut self, product_id: &ProductId) -> Result<Option<Product>> {
        fetch_product(&mut self.tx, product_id).await
    }

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Cart> {
        sqlx::query(
            r#"
            INSERT INTO carts (user_id, updated_at) VALUES ($1, NOW())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_uuid())
        .execute(&mut *self.tx)
        .await?;

        sqlx::query("SELECT user_id FROM carts WHERE user_id = $1 FOR UPDATE")
            .bind(user_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        // Lines are read after the lock, so a checkout that committed while
        // we waited is already visible.
        fetch_cart(&mut self.tx, user_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("cart for user {user_id} vanished")))
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        sqlx::query("UPDATE carts SET updated_at = $2 WHERE user_id = $1")
            .bind(cart.user_id().as_uuid())
            .bind(cart.updated_at())
            .execute(&mut *self.tx)
            .await?;

        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(cart.user_id().as_uuid())
            .execute(&mut *self.tx)
            .await?;

        for (position, item) in cart.items().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO cart_items (user_id, product_id, quantity, position)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(cart.user_id().as_uuid())
            .bind(item.product_id.as_str())
            .bind(i64::from(item.quantity))
            .bind(position_value(position)?)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn get_order_for_update(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(order_from_row(&mut self.tx, &row).await?)),
            None => Ok(None),
        }
    }

    async fn reserve_stock(&mut self, product_id: &ProductId, quantity: u32) -> Result<u32> {
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity - $2, updated_at = NOW()
            WHERE id = $1 AND stock_quantity >= $2
            RETURNING stock_quantity
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(remaining) = remaining {
            return stock_value(remaining);
        }

        let available: Option<i64> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
                .bind(product_id.as_str())
                .fetch_optional(&mut *self.tx)
                .await?;

        match available {
            Some(available) => Err(StoreError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
                available: stock_value(available)?,
            }),
            None => Err(StoreError::ProductNotFound(product_id.clone())),
        }
    }

    async fn restore_stock(&mut self, product_id: &ProductId, quantity: u32) -> Result<u32> {
        let restored: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING stock_quantity
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("products_stock_quantity_check")
            {
                return StoreError::StockOverflow(product_id.clone());
            }
            StoreError::Database(e)
        })?;

        match restored {
            Some(restored) => stock_value(restored),
            None => Err(StoreError::ProductNotFound(product_id.clone())),
        }
    }

    async fn insert_order(&mut self, order: &Order) -> Result<Version> {
        if order.version() != Version::unsaved() {
            return Err(StoreError::ConcurrencyConflict {
                order_id: order.id(),
                expected: Version::unsaved(),
                actual: order.version(),
            });
        }

        let version = Version::inserted();
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, user_id, status, payment_status, total_minor,
                                shipping_address, billing_address, gateway_session_id,
                                gateway_payment_id, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.order_number().as_str())
        .bind(order.user_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.total_amount().minor_units())
        .bind(order.shipping_address())
        .bind(order.billing_address())
        .bind(order.gateway_session_id())
        .bind(order.gateway_payment_id())
        .bind(order.created_at())
        .bind(order.updated_at())
        .bind(version.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                match db_err.constraint() {
                    Some("unique_order_number") => {
                        return StoreError::DuplicateOrderNumber(order.order_number().clone());
                    }
                    Some("orders_pkey") => {
                        return StoreError::ConcurrencyConflict {
                            order_id: order.id(),
                            expected: Version::unsaved(),
                            actual: version,
                        };
                    }
                    _ => {}
                }
            }
            StoreError::Database(e)
        })?;

        for (position, item) in order.items().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, product_name, quantity,
                                         unit_price_minor, subtotal_minor)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(position_value(position)?)
            .bind(item.product_id().as_str())
            .bind(item.product_name())
            .bind(i64::from(item.quantity()))
            .bind(item.unit_price().minor_units())
            .bind(item.subtotal().minor_units())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(version)
    }

    async fn update_order(&mut self, order: &Order) -> Result<Version> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET status = $2, payment_status = $3, gateway_session_id = $4,
                gateway_payment_id = $5, updated_at = $6, version = version + 1
            WHERE id = $1 AND version = $7
            RETURNING version
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.gateway_session_id())
        .bind(order.gateway_payment_id())
        .bind(order.updated_at())
        .bind(order.version().as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(version) = updated {
            return Ok(Version::new(version));
        }

        let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
            .bind(order.id().as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        match actual {
            Some(actual) => {
                tracing::debug!(
                    order_id = %order.id(),
                    expected = %order.version(),
                    actual,
                    "order version mismatch"
                );
                Err(StoreError::ConcurrencyConflict {
                    order_id: order.id(),
                    expected: order.version(),
                    actual: Version::new(actual),
                })
            }
            None => Err(StoreError::OrderNotFound(order.id())),
        }
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn mark_event_processed(&mut self, event_key: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (event_key, processed_at)
            VALUES ($1, NOW())
            ON CONFLICT (event_key) DO NOTHING
            "#,
        )
        .bind(event_key)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

async fn fetch_product(conn: &mut PgConnection, product_id: &ProductId) -> Result<Option<Product>> {
    let row = sqlx::query(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(product_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|row| row_to_product(&row)).transpose()
}

async fn fetch_cart(conn: &mut PgConnection, user_id: UserId) -> Result<Option<Cart>> {
    let updated_at: Option<DateTime<Utc>> =
        sqlx::query_scalar("SELECT updated_at FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;

    let Some(updated_at) = updated_at else {
        return Ok(None);
    };

    let rows = sqlx::query(
        "SELECT product_id, quantity FROM cart_items WHERE user_id = $1 ORDER BY position ASC",
    )
    .bind(user_id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;

    let items = rows
        .iter()
        .map(|row| -> Result<CartItem> {
            Ok(CartItem {
                product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
                quantity: quantity_value(row.try_get("quantity")?)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Cart::from_items(user_id, items, updated_at)
        .map(Some)
        .map_err(StoreError::corrupt)
}

async fn orders_from_rows(conn: &mut PgConnection, rows: Vec<PgRow>) -> Result<Vec<Order>> {
    let mut orders = Vec::with_capacity(rows.len());
    for row in &rows {
        orders.push(order_from_row(conn, row).await?);
    }
    Ok(orders)
}

async fn order_from_row(conn: &mut PgConnection, row: &PgRow) -> Result<Order> {
    let order_id: Uuid = row.try_get("id")?;

    let item_rows = sqlx::query(
        r#"
        SELECT product_id, product_name, quantity, unit_price_minor, subtotal_minor
        FROM order_items
        WHERE order_id = $1
        ORDER BY position ASC
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    let items = item_rows
        .iter()
        .map(|item| -> Result<OrderItem> {
            Ok(OrderItem::from_stored(
                ProductId::new(item.try_get::<String, _>("product_id")?),
                item.try_get("product_name")?,
                quantity_value(item.try_get("quantity")?)?,
                Money::from_minor(item.try_get("unit_price_minor")?),
                Money::from_minor(item.try_get("subtotal_minor")?),
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let status: String = row.try_get("status")?;
    let payment_status: String = row.try_get("payment_status")?;

    let record = OrderRecord {
        id: OrderId::from_uuid(order_id),
        order_number: OrderNumber::new(row.try_get::<String, _>("order_number")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        items,
        status: status.parse().map_err(StoreError::corrupt)?,
        payment_status: payment_status.parse().map_err(StoreError::corrupt)?,
        total_amount: Money::from_minor(row.try_get("total_minor")?),
        shipping_address: row.try_get("shipping_address")?,
        billing_address: row.try_get("billing_address")?,
        gateway_session_id: row.try_get("gateway_session_id")?,
        gateway_payment_id: row.try_get("gateway_payment_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
    };

    Order::from_record(record).map_err(StoreError::corrupt)
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get::<String, _>("id")?),
        name: row.try_get("name")?,
        price: Money::from_minor(row.try_get("price_minor")?),
        stock_quantity: stock_value(row.try_get("stock_quantity")?)?,
        active: row.try_get("active")?,
    })
}

fn row_to_user(row: &PgRow) -> Result<User> {
    Ok(User {
        id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
    })
}

fn stock_value(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("stock level {value}")))
}

fn quantity_value(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("quantity {value}")))
}

fn page_value(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn position_value(position: usize) -> Result<i32> {
    i32::try_from(position).map_err(|_| StoreError::Corrupt(format!("line position {position}")))
}
