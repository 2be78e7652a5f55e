//! Inventory ledger.
//!
//! The only component that changes stock levels. Reservations and
//! restorations run inside the caller's transaction so they commit or roll
//! back together with the order change that caused them.

use common::ProductId;
use domain::Product;
use store::{Store, StoreTx};

use crate::error::{CheckoutError, Missing, Result};

/// Stock movements for orders and admin restocks.
#[derive(Clone)]
pub struct InventoryLedger<S: Store> {
    store: S,
}

impl<S: Store> InventoryLedger<S> {
    /// Creates a new ledger over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Takes `quantity` units out of stock within `tx`.
    ///
    /// Fails with `InsufficientStock` when fewer units are available; the
    /// decrement is conditional, so concurrent reservations can never drive
    /// the level below zero. Returns the remaining stock.
    #[tracing::instrument(skip(self, tx), fields(product_id = %product_id))]
    pub async fn reserve(
        &self,
        tx: &mut S::Tx,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<u32> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidQuantity(0));
        }

        match tx.reserve_stock(product_id, quantity).await {
            Ok(remaining) => {
                metrics::counter!("inventory_reservations_total").increment(1);
                tracing::debug!(quantity, remaining, "stock reserved");
                Ok(remaining)
            }
            Err(e) => {
                let err = CheckoutError::from(e);
                if matches!(err, CheckoutError::InsufficientStock { .. }) {
                    metrics::counter!("inventory_insufficient_stock_total").increment(1);
                    tracing::info!(quantity, "insufficient stock");
                }
                Err(err)
            }
        }
    }

    /// Puts `quantity` units back into stock within `tx`.
    #[tracing::instrument(skip(self, tx), fields(product_id = %product_id))]
    pub async fn restore(
        &self,
        tx: &mut S::Tx,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<u32> {
        let restored = tx.restore_stock(product_id, quantity).await?;
        metrics::counter!("inventory_restorations_total").increment(1);
        tracing::debug!(quantity, restored, "stock restored");
        Ok(restored)
    }

    /// Adds stock for a product in its own transaction.
    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    pub async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<Product> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidQuantity(0));
        }

        let mut tx = self.store.begin().await?;
        let mut product = tx
            .get_product(product_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound(Missing::Product(product_id.clone())))?;
        product.stock_quantity = tx.restore_stock(product_id, quantity).await?;
        tx.commit().await?;

        tracing::info!(quantity, stock = product.stock_quantity, "product restocked");
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use common::Money;
    use store::InMemoryStore;

    use super::*;

    async fn setup(stock: u32) -> (InMemoryStore, InventoryLedger<InMemoryStore>) {
        let store = InMemoryStore::new();
        store
            .put_product(&Product::new(
                "SKU-001",
                "Widget",
                Money::from_minor(1000),
                stock,
            ))
            .await
            .unwrap();
        (store.clone(), InventoryLedger::new(store))
    }

    async fn stock(store: &InMemoryStore) -> u32 {
        store
            .get_product(&ProductId::new("SKU-001"))
            .await
            .unwrap()
            .unwrap()
            .stock_quantity
    }

    #[tokio::test]
    async fn reserve_then_restore_round_trips_stock() {
        let (store, ledger) = setup(5).await;
        let id = ProductId::new("SKU-001");

        let mut tx = store.begin().await.unwrap();
        assert_eq!(ledger.reserve(&mut tx, &id, 2).await.unwrap(), 3);
        tx.commit().await.unwrap();
        assert_eq!(stock(&store).await, 3);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(ledger.restore(&mut tx, &id, 2).await.unwrap(), 5);
        tx.commit().await.unwrap();
        assert_eq!(stock(&store).await, 5);
    }

    #[tokio::test]
    async fn reserve_rejects_overdraw() {
        let (store, ledger) = setup(1).await;
        let id = ProductId::new("SKU-001");

        let mut tx = store.begin().await.unwrap();
        let err = ledger.reserve(&mut tx, &id, 2).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientStock { .. }));
        drop(tx);

        assert_eq!(stock(&store).await, 1);
    }

    #[tokio::test]
    async fn reserve_zero_is_invalid() {
        let (store, ledger) = setup(1).await;
        let mut tx = store.begin().await.unwrap();
        let err = ledger
            .reserve(&mut tx, &ProductId::new("SKU-001"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidQuantity(0)));
    }

    #[tokio::test]
    async fn restock_adds_units() {
        let (store, ledger) = setup(0).await;

        let product = ledger
            .restock(&ProductId::new("SKU-001"), 7)
            .await
            .unwrap();
        assert_eq!(product.stock_quantity, 7);
        assert_eq!(stock(&store).await, 7);

        let err = ledger
            .restock(&ProductId::new("missing"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound(Missing::Product(_))));
    }
}
