use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::wallet::{self, Entity as Wallet, Model as WalletModel},
    errors::ServiceError,
};

/// Coin ledger service.
///
/// Balance mutations are single conditional UPDATE statements, so the
/// non-negativity check is atomic with the decrement: two concurrent
/// debits on the same wallet can never both succeed past the balance.
/// Both mutations accept any `ConnectionTrait` so callers can run them
/// inside a larger transaction (checkout, lifecycle transitions).
#[derive(Clone)]
pub struct WalletService {
    db: Arc<DatabaseConnection>,
}

impl WalletService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Fetches a customer's wallet.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn get_wallet(&self, customer_id: Uuid) -> Result<WalletModel, ServiceError> {
        Wallet::find()
            .filter(wallet::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Wallet for customer {customer_id} not found"))
            })
    }

    /// Fetches a customer's wallet, creating an empty one on first use.
    ///
    /// Identity management is external, so wallets are provisioned lazily
    /// rather than on user creation. The unique index on `customer_id`
    /// resolves concurrent first-use races: the loser re-reads the row the
    /// winner inserted.
    pub async fn get_or_create_wallet<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
    ) -> Result<WalletModel, ServiceError> {
        if let Some(existing) = Wallet::find()
            .filter(wallet::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let fresh = wallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            balance: Set(0),
            lifetime_earned: Set(0),
            lifetime_spent: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match fresh.insert(conn).await {
            Ok(model) => Ok(model),
            Err(err) if err.sql_err().is_some() => Wallet::find()
                .filter(wallet::Column::CustomerId.eq(customer_id))
                .one(conn)
                .await?
                .ok_or_else(|| ServiceError::DatabaseError(err)),
            Err(err) => Err(err.into()),
        }
    }

    /// Debits `amount` coins from a customer's wallet.
    ///
    /// Executes `UPDATE wallets SET balance = balance - amount,
    /// lifetime_spent = lifetime_spent + amount WHERE customer_id = ?
    /// AND balance >= amount`; zero affected rows means the balance was
    /// insufficient (or the wallet missing) and nothing changed.
    #[instrument(skip(self, conn), fields(customer_id = %customer_id, amount = amount))]
    pub async fn debit<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
        amount: i64,
    ) -> Result<(), ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::InvalidInput(format!(
                "Debit amount must be positive, got {amount}"
            )));
        }

        let result = Wallet::update_many()
            .col_expr(
                wallet::Column::Balance,
                Expr::col(wallet::Column::Balance).sub(amount),
            )
            .col_expr(
                wallet::Column::LifetimeSpent,
                Expr::col(wallet::Column::LifetimeSpent).add(amount),
            )
            .col_expr(wallet::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(wallet::Column::CustomerId.eq(customer_id))
            .filter(wallet::Column::Balance.gte(amount))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            let wallet = Wallet::find()
                .filter(wallet::Column::CustomerId.eq(customer_id))
                .one(conn)
                .await?;

            return match wallet {
                Some(w) => Err(ServiceError::InsufficientCoins(format!(
                    "requested {amount}, available {}",
                    w.balance
                ))),
                None => Err(ServiceError::NotFound(format!(
                    "Wallet for customer {customer_id} not found"
                ))),
            };
        }

        info!(customer_id = %customer_id, amount = amount, "Wallet debited");
        Ok(())
    }

    /// Credits `amount` coins to a customer's wallet.
    ///
    /// Always succeeds for an existing wallet (balances have no upper
    /// bound); provisions the wallet first if the customer has none yet.
    #[instrument(skip(self, conn), fields(customer_id = %customer_id, amount = amount))]
    pub async fn credit<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
        amount: i64,
    ) -> Result<(), ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::InvalidInput(format!(
                "Credit amount must be positive, got {amount}"
            )));
        }

        self.get_or_create_wallet(conn, customer_id).await?;

        Wallet::update_many()
            .col_expr(
                wallet::Column::Balance,
                Expr::col(wallet::Column::Balance).add(amount),
            )
            .col_expr(
                wallet::Column::LifetimeEarned,
                Expr::col(wallet::Column::LifetimeEarned).add(amount),
            )
            .col_expr(wallet::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(wallet::Column::CustomerId.eq(customer_id))
            .exec(conn)
            .await?;

        info!(customer_id = %customer_id, amount = amount, "Wallet credited");
        Ok(())
    }

    /// Returns the current spendable balance, zero if no wallet exists yet.
    pub async fn balance(&self, customer_id: Uuid) -> Result<i64, ServiceError> {
        let wallet = Wallet::find()
            .filter(wallet::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?;

        Ok(wallet.map(|w| w.balance).unwrap_or(0))
    }
}
